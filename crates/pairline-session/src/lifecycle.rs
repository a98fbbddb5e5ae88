//! Time-based session destruction.
//!
//! Every session gets an idle timer at creation. A completion signal may
//! replace it with an earlier teardown timer. Each timer is a tokio task
//! racing its deadline against the cancellation token held by the session's
//! [`ExpiryHandle`]; when the deadline wins, the task destroys the session
//! instance it was armed for. Participants are told inside the registry's
//! critical section, before the entry is removed.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use pairline_core::constants::{DEFAULT_COMPLETION_GRACE, DEFAULT_IDLE_TTL};
use pairline_core::{ConnectionId, DestroyReason, SessionCode, SessionError};

use crate::dispatcher::RelayDispatcher;
use crate::registry::{DestroyedSession, Membership, SessionRegistry};
use crate::timer::{ExpiryHandle, TimerKind};

/// Timer durations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LifecycleTiming {
    /// Session lifetime measured from creation.
    pub idle_ttl: Duration,
    /// Delay between a completion signal and teardown.
    pub completion_grace: Duration,
}

impl Default for LifecycleTiming {
    fn default() -> Self {
        Self {
            idle_ttl: DEFAULT_IDLE_TTL,
            completion_grace: DEFAULT_COMPLETION_GRACE,
        }
    }
}

/// Schedules, cancels and fires session timers.
#[derive(Clone)]
pub struct LifecycleController {
    registry: Arc<SessionRegistry>,
    dispatcher: RelayDispatcher,
    timing: LifecycleTiming,
}

impl LifecycleController {
    /// Controller over `registry`, announcing through `dispatcher`.
    pub fn new(registry: Arc<SessionRegistry>, dispatcher: RelayDispatcher, timing: LifecycleTiming) -> Self {
        Self {
            registry,
            dispatcher,
            timing,
        }
    }

    /// Configured durations.
    pub fn timing(&self) -> LifecycleTiming {
        self.timing
    }

    /// Create a session for `connection` with its idle timer armed.
    ///
    /// `notify` runs under the registry lock once the session exists. Fails
    /// with [`SessionError::TimerOverflow`] when the idle TTL does not fit
    /// in the clock. Must be called from within a tokio runtime.
    pub fn open<N>(&self, connection: &ConnectionId, notify: N) -> Result<SessionCode, SessionError>
    where
        N: FnOnce(&Membership),
    {
        let deadline = deadline_after(self.timing.idle_ttl)?;
        self.registry.create(
            connection,
            |code, generation| self.arm(code.clone(), generation, TimerKind::Idle, deadline),
            notify,
        )
    }

    /// Schedule teardown after a completion signal.
    ///
    /// Returns whether a new timer was armed; a repeated signal, or one
    /// arriving when the idle deadline is already sooner, arms nothing.
    pub fn complete(&self, membership: &Membership) -> bool {
        let deadline = match deadline_after(self.timing.completion_grace) {
            Ok(deadline) => deadline,
            Err(err) => {
                error!(code = %membership.code, error = %err, "teardown not scheduled");
                return false;
            }
        };
        let armed = self.registry.schedule_teardown(
            &membership.code,
            membership.generation,
            deadline,
            |code, generation| self.arm(code.clone(), generation, TimerKind::Teardown, deadline),
        );
        if armed {
            info!(
                code = %membership.code,
                grace_secs = self.timing.completion_grace.as_secs(),
                "transfer complete, teardown scheduled"
            );
        }
        armed
    }

    /// Destroy `code` and notify its participants. Idempotent.
    pub fn destroy(&self, code: &SessionCode, reason: DestroyReason) -> Option<DestroyedSession> {
        let destroyed = self.registry.destroy(code, reason, |d| self.announce(d))?;
        log_destroyed(&destroyed);
        Some(destroyed)
    }

    /// Destroy every session and notify all participants.
    pub fn destroy_all(&self, reason: DestroyReason) -> usize {
        let drained = self.registry.drain(reason, |d| self.announce(d));
        for destroyed in &drained {
            log_destroyed(destroyed);
        }
        drained.len()
    }

    /// Spawn a timer task for session instance `generation`.
    pub fn arm(&self, code: SessionCode, generation: u64, kind: TimerKind, deadline: Instant) -> ExpiryHandle {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let controller = self.clone();
        let _ = tokio::spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => {
                    debug!(%code, generation, ?kind, "timer cancelled");
                }
                () = tokio::time::sleep_until(deadline) => {
                    let _ = controller.fire(&code, generation, kind);
                }
            }
        });
        ExpiryHandle::new(kind, deadline, token)
    }

    /// Timer callback: destroy `code` if it is still instance `generation`.
    pub fn fire(&self, code: &SessionCode, generation: u64, kind: TimerKind) -> Option<DestroyedSession> {
        let destroyed =
            self.registry
                .destroy_generation(code, generation, kind.reason(), |d| self.announce(d))?;
        log_destroyed(&destroyed);
        Some(destroyed)
    }

    /// Queue `session-destroyed` for the participants of `destroyed`.
    ///
    /// Passed to the registry as the `notify` callback of a destroy.
    pub fn announce(&self, destroyed: &DestroyedSession) {
        let notified = self.dispatcher.announce_destroyed(destroyed);
        debug!(code = %destroyed.code, notified, "destruction announced");
    }
}

/// `now + after`, or an error when that instant is out of range.
fn deadline_after(after: Duration) -> Result<Instant, SessionError> {
    Instant::now()
        .checked_add(after)
        .ok_or(SessionError::TimerOverflow { secs: after.as_secs() })
}

/// Log a destruction once the registry lock is released.
pub fn log_destroyed(destroyed: &DestroyedSession) {
    info!(
        code = %destroyed.code,
        reason = %destroyed.reason,
        lifetime_secs = destroyed.lifetime.as_secs(),
        "session destroyed"
    );
}
