//! Outbound delivery seam.

use pairline_core::{ConnectionId, OutboundEvent};

/// Delivers outbound events to connections.
///
/// Called with the session registry locked, so per-connection event order
/// matches the order of registry changes. Implementations must only enqueue:
/// they must not block and must never call back into the registry. A failure
/// for one recipient must not prevent delivery to the others.
pub trait Gateway: Send + Sync {
    /// Send `event` to every connection in `recipients`.
    ///
    /// Returns how many recipients accepted the event.
    fn deliver(&self, recipients: &[ConnectionId], event: &OutboundEvent) -> usize;
}
