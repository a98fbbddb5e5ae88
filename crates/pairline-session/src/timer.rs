//! Scheduled destruction handles.
//!
//! A session owns at most one [`ExpiryHandle`]. The handle wraps a
//! [`DropGuard`]: dropping the handle (because the session was destroyed or
//! the timer was replaced) cancels the token the timer task is waiting on.

use std::fmt;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use pairline_core::DestroyReason;

/// Which timer a handle belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    /// Armed at creation, fires after the idle TTL.
    Idle,
    /// Armed by a completion signal, fires after the grace delay.
    Teardown,
}

impl TimerKind {
    /// Destroy reason reported when this timer fires.
    pub fn reason(self) -> DestroyReason {
        match self {
            Self::Idle => DestroyReason::IdleExpired,
            Self::Teardown => DestroyReason::TransferComplete,
        }
    }
}

/// Owned handle to a pending timer. Dropping it cancels the timer.
pub struct ExpiryHandle {
    kind: TimerKind,
    deadline: Instant,
    _guard: DropGuard,
}

impl ExpiryHandle {
    /// Wrap `token`; it is cancelled when the handle drops.
    pub fn new(kind: TimerKind, deadline: Instant, token: CancellationToken) -> Self {
        Self {
            kind,
            deadline,
            _guard: token.drop_guard(),
        }
    }

    /// A handle with no task behind it.
    pub fn detached(kind: TimerKind, deadline: Instant) -> Self {
        Self::new(kind, deadline, CancellationToken::new())
    }

    /// Timer kind.
    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    /// When the timer fires.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl fmt::Debug for ExpiryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiryHandle")
            .field("kind", &self.kind)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
