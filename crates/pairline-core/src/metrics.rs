//! Metric name constants to avoid typos across crates.

/// Sessions created (counter).
pub const SESSIONS_CREATED_TOTAL: &str = "sessions_created_total";
/// Sessions destroyed (counter, labels: reason).
pub const SESSIONS_DESTROYED_TOTAL: &str = "sessions_destroyed_total";
/// Currently registered sessions (gauge).
pub const SESSIONS_ACTIVE: &str = "sessions_active";
/// Rejected create/join requests (counter, labels: kind).
pub const SESSION_REQUESTS_REJECTED_TOTAL: &str = "session_requests_rejected_total";
/// Relayed payloads (counter, labels: kind).
pub const RELAY_EVENTS_TOTAL: &str = "relay_events_total";
/// Relay events dropped because the sender is not a member (counter).
pub const RELAY_DROPPED_TOTAL: &str = "relay_dropped_total";
/// Undecodable or oversized inbound frames (counter, labels: reason).
pub const FRAMES_REJECTED_TOTAL: &str = "frames_rejected_total";
/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Outbound messages dropped on a full or closed queue (counter).
pub const WS_DELIVERY_DROPS_TOTAL: &str = "ws_delivery_drops_total";
