//! Inbound event dispatch.
//!
//! The router owns no session state. It decodes frames, enforces the chunk
//! ceiling, and maps each event (plus the implicit disconnect) onto the
//! registry, lifecycle controller and dispatcher.

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use tracing::{debug, error, instrument};

use pairline_core::constants::{DEFAULT_MAX_CHUNK_BYTES, DEFAULT_MAX_CODE_ATTEMPTS};
use pairline_core::metrics::{FRAMES_REJECTED_TOTAL, SESSION_REQUESTS_REJECTED_TOTAL};
use pairline_core::{
    ConnectionId, DestroyReason, FrameError, InboundEvent, OutboundEvent, SessionError,
};

use crate::codes::{CodeGenerator, RandomCodes};
use crate::dispatcher::RelayDispatcher;
use crate::gateway::Gateway;
use crate::lifecycle::{LifecycleController, LifecycleTiming, log_destroyed};
use crate::registry::{LeaveOutcome, SessionRegistry};

/// Router limits and timer durations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouterConfig {
    /// Idle TTL and completion grace.
    pub timing: LifecycleTiming,
    /// Largest accepted chunk payload, in bytes.
    pub max_chunk_bytes: usize,
    /// Code candidates tried per `create-session`.
    pub max_code_attempts: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            timing: LifecycleTiming::default(),
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            max_code_attempts: DEFAULT_MAX_CODE_ATTEMPTS,
        }
    }
}

/// Entry point for everything a connection sends.
#[derive(Clone)]
pub struct EventRouter {
    registry: Arc<SessionRegistry>,
    lifecycle: LifecycleController,
    dispatcher: RelayDispatcher,
    max_chunk_bytes: usize,
}

impl EventRouter {
    /// Router with random session codes.
    pub fn new(gateway: Arc<dyn Gateway>, config: RouterConfig) -> Self {
        Self::with_code_generator(gateway, config, Box::new(RandomCodes::new()))
    }

    /// Router drawing session codes from `codes`.
    pub fn with_code_generator(
        gateway: Arc<dyn Gateway>,
        config: RouterConfig,
        codes: Box<dyn CodeGenerator>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::with_generator(codes, config.max_code_attempts));
        let dispatcher = RelayDispatcher::new(registry.clone(), gateway);
        let lifecycle = LifecycleController::new(registry.clone(), dispatcher.clone(), config.timing);
        Self {
            registry,
            lifecycle,
            dispatcher,
            max_chunk_bytes: config.max_chunk_bytes,
        }
    }

    /// The session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The lifecycle controller.
    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    /// Largest accepted chunk payload.
    pub fn max_chunk_bytes(&self) -> usize {
        self.max_chunk_bytes
    }

    /// Handle a text frame.
    pub fn handle_text(&self, connection: &ConnectionId, text: &str) {
        match InboundEvent::from_json(text).and_then(|event| self.admit(event)) {
            Ok(event) => self.handle(connection, event),
            Err(err) => self.reject_frame(connection, &err),
        }
    }

    /// Handle a binary chunk frame.
    pub fn handle_binary(&self, connection: &ConnectionId, frame: Bytes) {
        match InboundEvent::from_binary(frame).and_then(|event| self.admit(event)) {
            Ok(event) => self.handle(connection, event),
            Err(err) => self.reject_frame(connection, &err),
        }
    }

    /// Handle a decoded event.
    #[instrument(skip_all, fields(connection = %connection, event = event.name()))]
    pub fn handle(&self, connection: &ConnectionId, event: InboundEvent) {
        match event {
            InboundEvent::CreateSession => self.on_create(connection),
            InboundEvent::JoinSession { code } => self.on_join(connection, &code),
            InboundEvent::TransferComplete { code } => self.on_complete(connection, &code),
            relayed => {
                if let Some((code, payload)) = relayed.into_relay() {
                    if let Err(err) = self.dispatcher.relay(connection, &code, payload) {
                        self.reject(connection, &err);
                    }
                }
            }
        }
    }

    /// Remove a closed connection from its session.
    ///
    /// The remaining participant, if any, learns the new count before any
    /// later change to the session. A session left empty is destroyed.
    pub fn disconnect(&self, connection: &ConnectionId) {
        let outcome = self.registry.leave(connection, |outcome| {
            if let LeaveOutcome::Remaining { participants, .. } = outcome {
                let _ = self.dispatcher.broadcast_count(participants);
            }
        });
        if let Some(LeaveOutcome::Emptied(destroyed)) = outcome {
            log_destroyed(&destroyed);
        }
    }

    /// Destroy every session, telling participants the server is going away.
    pub fn shutdown(&self) -> usize {
        self.lifecycle.destroy_all(DestroyReason::Shutdown)
    }

    // ── Handlers ────────────────────────────────────────────────────

    fn on_create(&self, connection: &ConnectionId) {
        let opened = self.lifecycle.open(connection, |membership| {
            let created = OutboundEvent::SessionCreated {
                code: membership.code.clone(),
            };
            let _ = self.dispatcher.send_to(connection, &created);
            let _ = self.dispatcher.broadcast_count(&membership.participants);
        });
        if let Err(err) = opened {
            self.reject(connection, &err);
        }
    }

    fn on_join(&self, connection: &ConnectionId, raw_code: &str) {
        let joined = self.registry.join(raw_code, connection, |membership| {
            let joined = OutboundEvent::SessionJoined {
                code: membership.code.clone(),
            };
            let _ = self.dispatcher.send_to(connection, &joined);
            let _ = self.dispatcher.broadcast_count(&membership.participants);
        });
        if let Err(err) = joined {
            self.reject(connection, &err);
        }
    }

    fn on_complete(&self, connection: &ConnectionId, raw_code: &str) {
        let completed = self.registry.with_membership(raw_code, connection, |membership| {
            let _ = self.dispatcher.broadcast_completion(&membership.participants);
            membership.clone()
        });
        match completed {
            Ok(membership) => {
                let _ = self.lifecycle.complete(&membership);
            }
            Err(err) => self.reject(connection, &err),
        }
    }

    // ── Validation and rejection ────────────────────────────────────

    fn admit(&self, event: InboundEvent) -> Result<InboundEvent, FrameError> {
        if let InboundEvent::FileChunk { bytes, .. } = &event {
            if bytes.len() > self.max_chunk_bytes {
                return Err(FrameError::TooLarge {
                    len: bytes.len(),
                    limit: self.max_chunk_bytes,
                });
            }
        }
        Ok(event)
    }

    fn reject_frame(&self, connection: &ConnectionId, err: &FrameError) {
        let reason = err.client_reason();
        counter!(FRAMES_REJECTED_TOTAL, "reason" => reason).increment(1);
        debug!(%connection, error = %err, "rejected inbound frame");
        let _ = self.dispatcher.send_to(connection, &OutboundEvent::error(reason));
    }

    fn reject(&self, connection: &ConnectionId, err: &SessionError) {
        if let SessionError::NotMember { code } = err {
            debug!(%connection, code, "dropped event for foreign session");
            return;
        }
        counter!(SESSION_REQUESTS_REJECTED_TOTAL, "kind" => err.error_kind()).increment(1);
        if err.is_fatal() {
            error!(%connection, error = %err, "session request failed");
        } else {
            debug!(%connection, error = %err, "session request rejected");
        }
        let _ = self
            .dispatcher
            .send_to(connection, &OutboundEvent::error(err.client_reason()));
    }
}
