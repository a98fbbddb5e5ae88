//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use pairline_core::constants::{
    DEFAULT_COMPLETION_GRACE, DEFAULT_IDLE_TTL, DEFAULT_MAX_CHUNK_BYTES, DEFAULT_MAX_CODE_ATTEMPTS,
};
use pairline_session::{LifecycleTiming, RouterConfig};
use pairline_settings::PairlineSettings;

/// Room for the JSON envelope around a base64 chunk.
const ENVELOPE_OVERHEAD: usize = 1024;

/// Runtime configuration for [`PairlineServer`](crate::PairlineServer).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Directory served for paths no route matches.
    pub static_dir: Option<PathBuf>,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a client silent for this many seconds.
    pub heartbeat_timeout_secs: u64,
    /// Outbound frames buffered per connection.
    pub send_queue_capacity: usize,
    /// Largest accepted chunk payload in bytes.
    pub max_chunk_bytes: usize,
    /// Session lifetime in seconds.
    pub idle_ttl_secs: u64,
    /// Teardown delay after a completion signal, in seconds.
    pub completion_grace_secs: u64,
    /// Code candidates tried per session creation.
    pub max_code_attempts: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            static_dir: None,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            send_queue_capacity: 256,
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            idle_ttl_secs: DEFAULT_IDLE_TTL.as_secs(),
            completion_grace_secs: DEFAULT_COMPLETION_GRACE.as_secs(),
            max_code_attempts: DEFAULT_MAX_CODE_ATTEMPTS,
        }
    }
}

impl ServerConfig {
    /// Flatten loaded settings into a server configuration.
    pub fn from_settings(settings: &PairlineSettings) -> Self {
        let server = &settings.server;
        let sessions = &settings.sessions;
        Self {
            host: server.host.clone(),
            port: server.port,
            static_dir: server.static_dir.as_ref().map(PathBuf::from),
            heartbeat_interval_secs: server.heartbeat_interval_secs,
            heartbeat_timeout_secs: server.heartbeat_timeout_secs,
            send_queue_capacity: server.send_queue_capacity,
            max_chunk_bytes: server.max_chunk_bytes,
            idle_ttl_secs: sessions.idle_ttl_secs,
            completion_grace_secs: sessions.completion_grace_secs,
            max_code_attempts: sessions.max_code_attempts,
        }
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Largest WebSocket message accepted: a base64 chunk plus its envelope.
    pub fn max_message_size(&self) -> usize {
        self.max_chunk_bytes
            .div_ceil(3)
            .saturating_mul(4)
            .saturating_add(ENVELOPE_OVERHEAD)
    }

    /// Interval between server pings.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Silence after which a client is dropped.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// Limits and timers for the event router.
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            timing: LifecycleTiming {
                idle_ttl: Duration::from_secs(self.idle_ttl_secs),
                completion_grace: Duration::from_secs(self.completion_grace_secs),
            },
            max_chunk_bytes: self.max_chunk_bytes,
            max_code_attempts: self.max_code_attempts,
        }
    }
}
