//! # pairline
//!
//! Pairline relay binary: loads settings, starts the HTTP/WebSocket server
//! and tears every session down on ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pairline_core::logging::{LogFormat, init_subscriber};
use pairline_server::{PairlineServer, ServerConfig};
use pairline_settings::PairlineSettings;

/// Pairline session relay.
#[derive(Parser, Debug)]
#[command(name = "pairline", about = "Two-party session relay", version)]
struct Cli {
    /// Settings file (defaults to `~/.pairline/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Directory of static client files (overrides settings).
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Log filter such as `info` or `pairline_session=debug`.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    /// Load the settings file and layer command-line flags on top.
    fn resolve_settings(&self) -> Result<PairlineSettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(pairline_settings::settings_path);
        let mut settings = pairline_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(dir) = &self.static_dir {
            settings.server.static_dir = Some(dir.to_string_lossy().into_owned());
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.log_json {
            settings.logging.json = true;
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.resolve_settings()?;

    init_subscriber(
        &settings.logging.level,
        LogFormat::from_json_flag(settings.logging.json),
    );

    let metrics = match pairline_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder unavailable, /metrics disabled");
            None
        }
    };

    let config = ServerConfig::from_settings(&settings);
    let server = PairlineServer::new(config, metrics);
    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;

    tracing::info!("Pairline relay listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let closed = server.close_sessions();
    server
        .shutdown()
        .graceful_shutdown(vec![handle], None)
        .await;

    tracing::info!(closed, "Shutdown complete");
    Ok(())
}
