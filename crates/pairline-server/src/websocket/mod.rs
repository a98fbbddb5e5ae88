//! WebSocket connection state, fan-out, and per-client session loop.

pub mod connection;
pub mod hub;
pub mod session;
