//! # pairline-server
//!
//! Axum HTTP + `WebSocket` gateway in front of the session core.
//!
//! - `GET /ws`: the relay protocol, one [`websocket::session`] task per client
//! - `GET /health`: liveness with connection and session counts
//! - `GET /metrics`: Prometheus text, when a recorder is installed
//! - Optional static file serving for every other path
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::PairlineServer;
