//! Settings types.
//!
//! Every struct is `#[serde(default)]`, so a settings file only needs the
//! keys it changes.

use std::fmt::Display;
use std::ops::RangeInclusive;

use pairline_core::constants::{
    DEFAULT_COMPLETION_GRACE, DEFAULT_IDLE_TTL, DEFAULT_MAX_CHUNK_BYTES,
    DEFAULT_MAX_CODE_ATTEMPTS,
};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};
use crate::limits;

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PairlineSettings {
    /// Network and gateway settings.
    pub server: ServerSettings,
    /// Session lifecycle settings.
    pub sessions: SessionSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl PairlineSettings {
    /// Reject values the relay cannot run with.
    ///
    /// Numeric fields must lie within the ranges in [`crate::limits`].
    pub fn validate(&self) -> Result<()> {
        let server = &self.server;
        let sessions = &self.sessions;
        check_range("server.maxChunkBytes", server.max_chunk_bytes, &limits::MAX_CHUNK_BYTES)?;
        check_range(
            "server.sendQueueCapacity",
            server.send_queue_capacity,
            &limits::SEND_QUEUE_CAPACITY,
        )?;
        check_range(
            "server.heartbeatIntervalSecs",
            server.heartbeat_interval_secs,
            &limits::HEARTBEAT_INTERVAL_SECS,
        )?;
        check_range(
            "server.heartbeatTimeoutSecs",
            server.heartbeat_timeout_secs,
            &limits::HEARTBEAT_TIMEOUT_SECS,
        )?;
        check_range("sessions.idleTtlSecs", sessions.idle_ttl_secs, &limits::IDLE_TTL_SECS)?;
        check_range(
            "sessions.completionGraceSecs",
            sessions.completion_grace_secs,
            &limits::COMPLETION_GRACE_SECS,
        )?;
        check_range(
            "sessions.maxCodeAttempts",
            sessions.max_code_attempts,
            &limits::MAX_CODE_ATTEMPTS,
        )?;

        if server.heartbeat_timeout_secs < server.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(format!(
                "server.heartbeatTimeoutSecs ({}) is shorter than server.heartbeatIntervalSecs ({})",
                server.heartbeat_timeout_secs, server.heartbeat_interval_secs
            )));
        }
        Ok(())
    }
}

fn check_range<T>(key: &str, value: T, range: &RangeInclusive<T>) -> Result<()>
where
    T: PartialOrd + Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(SettingsError::InvalidValue(format!(
            "{key} must be between {} and {}, got {value}",
            range.start(),
            range.end()
        )))
    }
}

/// Network and gateway settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP/WebSocket port (`0` picks a free port).
    pub port: u16,
    /// Directory served as static content for unmatched paths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<String>,
    /// Interval between server pings, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Disconnect a client silent for this long, in seconds.
    pub heartbeat_timeout_secs: u64,
    /// Outbound messages buffered per connection before drops begin.
    pub send_queue_capacity: usize,
    /// Largest accepted file chunk, in bytes.
    pub max_chunk_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            static_dir: None,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            send_queue_capacity: 256,
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
        }
    }
}

/// Session lifecycle settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Lifetime of a session measured from creation, in seconds.
    pub idle_ttl_secs: u64,
    /// Delay between a completion signal and teardown, in seconds.
    pub completion_grace_secs: u64,
    /// Code generation attempts before `create` gives up.
    pub max_code_attempts: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_ttl_secs: DEFAULT_IDLE_TTL.as_secs(),
            completion_grace_secs: DEFAULT_COMPLETION_GRACE.as_secs(),
            max_code_attempts: DEFAULT_MAX_CODE_ATTEMPTS,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (overridden by `RUST_LOG`).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol() {
        let s = PairlineSettings::default();
        assert_eq!(s.sessions.idle_ttl_secs, 300);
        assert_eq!(s.sessions.completion_grace_secs, 10);
        assert_eq!(s.server.max_chunk_bytes, 100 * 1024 * 1024);
        assert_eq!(s.server.port, 3000);
        assert!(s.server.static_dir.is_none());
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn defaults_validate() {
        PairlineSettings::default().validate().unwrap();
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(PairlineSettings::default()).unwrap();
        assert_eq!(json["sessions"]["idleTtlSecs"], 300);
        assert_eq!(json["server"]["maxChunkBytes"], 104_857_600);
        assert!(json["server"].get("staticDir").is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: PairlineSettings =
            serde_json::from_str(r#"{"server":{"port":8080}}"#).unwrap();
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.sessions, SessionSettings::default());
    }

    #[test]
    fn zero_ttl_is_invalid() {
        let mut s = PairlineSettings::default();
        s.sessions.idle_ttl_secs = 0;
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("idleTtlSecs"));
    }

    #[test]
    fn huge_ttl_is_invalid() {
        let mut s = PairlineSettings::default();
        s.sessions.idle_ttl_secs = u64::MAX;
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("sessions.idleTtlSecs must be between 1 and 86400"));
    }

    #[test]
    fn upper_bounds_match_limits() {
        let mut s = PairlineSettings::default();
        s.sessions.idle_ttl_secs = *limits::IDLE_TTL_SECS.end();
        s.sessions.completion_grace_secs = *limits::COMPLETION_GRACE_SECS.end();
        s.server.max_chunk_bytes = *limits::MAX_CHUNK_BYTES.end();
        s.validate().unwrap();

        s.sessions.completion_grace_secs += 1;
        assert!(s.validate().is_err());
        s.sessions.completion_grace_secs -= 1;
        s.server.max_chunk_bytes += 1;
        assert!(s.validate().is_err());
    }

    #[test]
    fn zero_heartbeat_interval_is_invalid() {
        let mut s = PairlineSettings::default();
        s.server.heartbeat_interval_secs = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn zero_grace_is_allowed() {
        let mut s = PairlineSettings::default();
        s.sessions.completion_grace_secs = 0;
        s.validate().unwrap();
    }

    #[test]
    fn heartbeat_timeout_shorter_than_interval_is_invalid() {
        let mut s = PairlineSettings::default();
        s.server.heartbeat_interval_secs = 60;
        s.server.heartbeat_timeout_secs = 30;
        assert!(matches!(s.validate(), Err(SettingsError::InvalidValue(_))));
    }

    #[test]
    fn zero_chunk_limit_is_invalid() {
        let mut s = PairlineSettings::default();
        s.server.max_chunk_bytes = 0;
        assert!(s.validate().is_err());
    }
}
