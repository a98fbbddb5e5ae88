//! Recipient selection and fan-out.
//!
//! Every method here only enqueues through the [`Gateway`], so each one is
//! safe to call from a registry `notify` callback.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use pairline_core::metrics::{RELAY_DROPPED_TOTAL, RELAY_EVENTS_TOTAL};
use pairline_core::{Audience, ConnectionId, OutboundEvent, RelayPayload, SessionError};

use crate::gateway::Gateway;
use crate::registry::{DestroyedSession, SessionRegistry};

/// Turns session operations into outbound events.
#[derive(Clone)]
pub struct RelayDispatcher {
    registry: Arc<SessionRegistry>,
    gateway: Arc<dyn Gateway>,
}

impl RelayDispatcher {
    /// Dispatcher over `registry`, delivering through `gateway`.
    pub fn new(registry: Arc<SessionRegistry>, gateway: Arc<dyn Gateway>) -> Self {
        Self { registry, gateway }
    }

    /// Send one event to one connection.
    pub fn send_to(&self, connection: &ConnectionId, event: &OutboundEvent) -> bool {
        self.deliver(std::slice::from_ref(connection), event) == 1
    }

    /// Forward `payload` from `sender` within the session named `raw_code`.
    ///
    /// Signals and chunks go to the other participant, text goes to every
    /// participant. The event is queued while the session is locked, so it
    /// always precedes a `session-destroyed` for the same session. Fails with
    /// [`SessionError::NotMember`] when `sender` is not in that session;
    /// nothing is delivered in that case.
    pub fn relay(
        &self,
        sender: &ConnectionId,
        raw_code: &str,
        payload: RelayPayload,
    ) -> Result<usize, SessionError> {
        let kind = payload.kind();
        let audience = payload.audience();
        let event = payload.into_event();

        let relayed = self.registry.with_membership(raw_code, sender, |membership| {
            let recipients: Vec<ConnectionId> = match audience {
                Audience::Peer => membership
                    .participants
                    .iter()
                    .filter(|p| *p != sender)
                    .cloned()
                    .collect(),
                Audience::Everyone => membership.participants.clone(),
            };
            debug!(code = %membership.code, %sender, kind, recipients = recipients.len(), "relaying");
            self.deliver(&recipients, &event)
        });
        match relayed {
            Ok(delivered) => {
                counter!(RELAY_EVENTS_TOTAL, "kind" => kind).increment(1);
                Ok(delivered)
            }
            Err(err) => {
                counter!(RELAY_DROPPED_TOTAL).increment(1);
                Err(err)
            }
        }
    }

    /// Tell every participant how many participants there are.
    pub fn broadcast_count(&self, participants: &[ConnectionId]) -> usize {
        let event = OutboundEvent::ParticipantCount {
            count: participants.len(),
        };
        self.deliver(participants, &event)
    }

    /// Tell every participant a transfer finished.
    pub fn broadcast_completion(&self, participants: &[ConnectionId]) -> usize {
        self.deliver(participants, &OutboundEvent::TransferComplete)
    }

    /// Tell the former participants of a destroyed session why it ended.
    pub fn announce_destroyed(&self, destroyed: &DestroyedSession) -> usize {
        if destroyed.participants.is_empty() {
            return 0;
        }
        let event = OutboundEvent::SessionDestroyed {
            reason: destroyed.reason.as_str().to_owned(),
        };
        self.deliver(&destroyed.participants, &event)
    }

    fn deliver(&self, recipients: &[ConnectionId], event: &OutboundEvent) -> usize {
        if recipients.is_empty() {
            return 0;
        }
        let delivered = self.gateway.deliver(recipients, event);
        if delivered < recipients.len() {
            warn!(
                event = event.name(),
                expected = recipients.len(),
                delivered,
                "outbound delivery incomplete"
            );
        }
        delivered
    }
}
