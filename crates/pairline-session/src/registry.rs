//! In-memory session registry.
//!
//! One `parking_lot::Mutex` guards the whole table. Every public method takes
//! the lock once and performs a single operation. Mutating methods accept a
//! `notify` callback that runs inside the same critical section, so the
//! events describing a change are queued before any later change to the same
//! connections can be observed. A destroyed session's `notify` runs before
//! its entry leaves the table.
//!
//! Callbacks must only enqueue (see [`Gateway`](crate::Gateway)); calling
//! back into the registry from one deadlocks.
//!
//! Invariants after every call:
//! - each session holds one or two participants
//! - codes are unique among active sessions
//! - a connection belongs to at most one session (`members` index)
//! - a session owns at most one pending [`ExpiryHandle`]

use std::collections::HashMap;
use std::time::Duration;

use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info};

use pairline_core::constants::{DEFAULT_MAX_CODE_ATTEMPTS, MAX_PARTICIPANTS};
use pairline_core::metrics::{SESSIONS_ACTIVE, SESSIONS_CREATED_TOTAL, SESSIONS_DESTROYED_TOTAL};
use pairline_core::{ConnectionId, DestroyReason, SessionCode, SessionError};

use crate::codes::{CodeGenerator, RandomCodes};
use crate::timer::{ExpiryHandle, TimerKind};

// ─────────────────────────────────────────────────────────────────────────────
// Public value types
// ─────────────────────────────────────────────────────────────────────────────

/// A connection's view of the session it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Membership {
    /// Session code.
    pub code: SessionCode,
    /// Generation of the session instance.
    pub generation: u64,
    /// Participants, in join order.
    pub participants: Vec<ConnectionId>,
}

/// Read-only copy of a session's state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Session code.
    pub code: SessionCode,
    /// Generation of the session instance.
    pub generation: u64,
    /// Participants, in join order.
    pub participants: Vec<ConnectionId>,
    /// Creation time.
    pub created_at: Instant,
    /// Kind of the pending timer, if any.
    pub pending: Option<TimerKind>,
}

/// A session removed from the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DestroyedSession {
    /// Code the session was registered under.
    pub code: SessionCode,
    /// Participants at the time of destruction.
    pub participants: Vec<ConnectionId>,
    /// Why it was destroyed.
    pub reason: DestroyReason,
    /// Time since creation.
    pub lifetime: Duration,
}

/// Result of removing a connection from its session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Others remain in the session.
    Remaining {
        /// Session code.
        code: SessionCode,
        /// Participants left behind.
        participants: Vec<ConnectionId>,
    },
    /// The connection was the last participant; the session is gone.
    Emptied(DestroyedSession),
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

struct Session {
    participants: Vec<ConnectionId>,
    created_at: Instant,
    generation: u64,
    expiry: Option<ExpiryHandle>,
}

impl Session {
    fn membership(&self, code: &SessionCode) -> Membership {
        Membership {
            code: code.clone(),
            generation: self.generation,
            participants: self.participants.clone(),
        }
    }

    fn snapshot(&self, code: &SessionCode) -> SessionSnapshot {
        SessionSnapshot {
            code: code.clone(),
            generation: self.generation,
            participants: self.participants.clone(),
            created_at: self.created_at,
            pending: self.expiry.as_ref().map(ExpiryHandle::kind),
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<SessionCode, Session>,
    members: HashMap<ConnectionId, SessionCode>,
    next_generation: u64,
}

impl RegistryInner {
    /// Remove a session and its index entries, calling `notify` first.
    /// Dropping the session drops its expiry handle, which cancels the
    /// pending timer.
    fn remove<N>(&mut self, code: &SessionCode, reason: DestroyReason, notify: N) -> Option<DestroyedSession>
    where
        N: FnOnce(&DestroyedSession),
    {
        let session = self.sessions.get(code)?;
        let destroyed = DestroyedSession {
            code: code.clone(),
            participants: session.participants.clone(),
            reason,
            lifetime: session.created_at.elapsed(),
        };
        notify(&destroyed);

        if let Some(session) = self.sessions.remove(code) {
            for participant in &session.participants {
                let _ = self.members.remove(participant);
            }
        }
        counter!(SESSIONS_DESTROYED_TOTAL, "reason" => reason.label()).increment(1);
        self.publish_len();
        Some(destroyed)
    }

    #[allow(clippy::cast_precision_loss)]
    fn publish_len(&self) {
        gauge!(SESSIONS_ACTIVE).set(self.sessions.len() as f64);
    }
}

/// Owner of every active session.
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
    codes: Box<dyn CodeGenerator>,
    max_code_attempts: usize,
}

impl SessionRegistry {
    /// Registry drawing random codes.
    pub fn new() -> Self {
        Self::with_generator(Box::new(RandomCodes::new()), DEFAULT_MAX_CODE_ATTEMPTS)
    }

    /// Registry drawing codes from `codes`, trying at most
    /// `max_code_attempts` candidates per `create`.
    pub fn with_generator(codes: Box<dyn CodeGenerator>, max_code_attempts: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            codes,
            max_code_attempts: max_code_attempts.max(1),
        }
    }

    /// Register a new session with `connection` as its only participant.
    ///
    /// `schedule` is called inside the critical section with the new code and
    /// generation and must return the idle-expiry handle for the session.
    /// `notify` then sees the new membership, still under the lock.
    pub fn create<F, N>(&self, connection: &ConnectionId, schedule: F, notify: N) -> Result<SessionCode, SessionError>
    where
        F: FnOnce(&SessionCode, u64) -> ExpiryHandle,
        N: FnOnce(&Membership),
    {
        let mut inner = self.inner.lock();
        if let Some(code) = inner.members.get(connection) {
            return Err(SessionError::AlreadyInSession { code: code.clone() });
        }

        let code = self.fresh_code(&inner)?;
        inner.next_generation += 1;
        let generation = inner.next_generation;
        let expiry = schedule(&code, generation);

        let session = Session {
            participants: vec![connection.clone()],
            created_at: Instant::now(),
            generation,
            expiry: Some(expiry),
        };
        notify(&session.membership(&code));
        let _ = inner.sessions.insert(code.clone(), session);
        let _ = inner.members.insert(connection.clone(), code.clone());
        counter!(SESSIONS_CREATED_TOTAL).increment(1);
        inner.publish_len();
        info!(%code, %connection, generation, "session created");
        Ok(code)
    }

    fn fresh_code(&self, inner: &RegistryInner) -> Result<SessionCode, SessionError> {
        for _ in 0..self.max_code_attempts {
            let candidate = self.codes.next_code();
            if !inner.sessions.contains_key(&candidate) {
                return Ok(candidate);
            }
            debug!(code = %candidate, "session code collision, retrying");
        }
        error!(
            attempts = self.max_code_attempts,
            active = inner.sessions.len(),
            "session code space exhausted"
        );
        Err(SessionError::CodeSpaceExhausted {
            attempts: self.max_code_attempts,
        })
    }

    /// Add `connection` to the session named by `raw_code`.
    ///
    /// The registry is unchanged on failure and `notify` is not called.
    pub fn join<N>(&self, raw_code: &str, connection: &ConnectionId, notify: N) -> Result<Membership, SessionError>
    where
        N: FnOnce(&Membership),
    {
        let mut inner = self.inner.lock();
        if let Some(code) = inner.members.get(connection) {
            return Err(SessionError::AlreadyInSession { code: code.clone() });
        }
        let not_found = || SessionError::NotFound {
            code: raw_code.to_owned(),
        };
        let code = SessionCode::parse(raw_code).map_err(|_| not_found())?;
        let session = inner.sessions.get_mut(&code).ok_or_else(not_found)?;
        if session.participants.len() >= MAX_PARTICIPANTS {
            return Err(SessionError::Full { code });
        }

        session.participants.push(connection.clone());
        let membership = session.membership(&code);
        let _ = inner.members.insert(connection.clone(), code);
        notify(&membership);
        info!(
            code = %membership.code,
            %connection,
            participants = membership.participants.len(),
            "session joined"
        );
        Ok(membership)
    }

    /// Membership of `sender` in the session named by `raw_code`.
    ///
    /// Fails with [`SessionError::NotMember`] when the code is malformed, the
    /// session does not exist, or `sender` is not one of its participants.
    pub fn membership(&self, raw_code: &str, sender: &ConnectionId) -> Result<Membership, SessionError> {
        self.with_membership(raw_code, sender, Membership::clone)
    }

    /// Run `f` on the membership of `sender` while the session is locked.
    ///
    /// Relays use this so a forwarded event is queued before the session can
    /// be destroyed underneath it. Fails like [`membership`](Self::membership)
    /// without calling `f`.
    pub fn with_membership<R, F>(&self, raw_code: &str, sender: &ConnectionId, f: F) -> Result<R, SessionError>
    where
        F: FnOnce(&Membership) -> R,
    {
        let not_member = || SessionError::NotMember {
            code: raw_code.to_owned(),
        };
        let code = SessionCode::parse(raw_code).map_err(|_| not_member())?;
        let inner = self.inner.lock();
        match inner.sessions.get(&code) {
            Some(session) if session.participants.contains(sender) => Ok(f(&session.membership(&code))),
            _ => Err(not_member()),
        }
    }

    /// Remove `connection` from its session, if it has one.
    ///
    /// Removing the last participant destroys the session in the same
    /// critical section, so an empty session is never observable. `notify`
    /// sees the outcome before the lock is released.
    pub fn leave<N>(&self, connection: &ConnectionId, notify: N) -> Option<LeaveOutcome>
    where
        N: FnOnce(&LeaveOutcome),
    {
        let mut inner = self.inner.lock();
        let code = inner.members.remove(connection)?;
        let session = inner.sessions.get_mut(&code)?;
        session.participants.retain(|p| p != connection);

        let outcome = if session.participants.is_empty() {
            LeaveOutcome::Emptied(inner.remove(&code, DestroyReason::AllParticipantsLeft, |_| {})?)
        } else {
            let participants = session.participants.clone();
            info!(%code, %connection, remaining = participants.len(), "participant left");
            LeaveOutcome::Remaining { code, participants }
        };
        notify(&outcome);
        Some(outcome)
    }

    /// Destroy the session named `code`. Unknown codes are a no-op.
    pub fn destroy<N>(&self, code: &SessionCode, reason: DestroyReason, notify: N) -> Option<DestroyedSession>
    where
        N: FnOnce(&DestroyedSession),
    {
        self.inner.lock().remove(code, reason, notify)
    }

    /// Destroy `code` only if it is still the session instance `generation`.
    ///
    /// Timers use this so that a timer outliving its session can never touch
    /// a later session that happens to reuse the code.
    pub fn destroy_generation<N>(
        &self,
        code: &SessionCode,
        generation: u64,
        reason: DestroyReason,
        notify: N,
    ) -> Option<DestroyedSession>
    where
        N: FnOnce(&DestroyedSession),
    {
        let mut inner = self.inner.lock();
        let current = inner.sessions.get(code)?.generation;
        if current != generation {
            debug!(%code, generation, current, "stale timer ignored");
            return None;
        }
        inner.remove(code, reason, notify)
    }

    /// Arm a teardown timer for session instance `generation`.
    ///
    /// The pending timer is replaced only when `deadline` is earlier than the
    /// idle deadline; an already pending teardown is left alone. Returns
    /// whether `schedule` was called.
    pub fn schedule_teardown<F>(
        &self,
        code: &SessionCode,
        generation: u64,
        deadline: Instant,
        schedule: F,
    ) -> bool
    where
        F: FnOnce(&SessionCode, u64) -> ExpiryHandle,
    {
        let mut inner = self.inner.lock();
        let Some(session) = inner.sessions.get_mut(code) else {
            return false;
        };
        if session.generation != generation {
            return false;
        }
        let replace = match &session.expiry {
            Some(pending) if pending.kind() == TimerKind::Teardown => false,
            Some(pending) => deadline < pending.deadline(),
            None => true,
        };
        if replace {
            session.expiry = Some(schedule(code, generation));
            debug!(%code, generation, "teardown scheduled");
        }
        replace
    }

    /// Destroy every session, calling `notify` for each before removal.
    pub fn drain<N>(&self, reason: DestroyReason, mut notify: N) -> Vec<DestroyedSession>
    where
        N: FnMut(&DestroyedSession),
    {
        let mut inner = self.inner.lock();
        let codes: Vec<SessionCode> = inner.sessions.keys().cloned().collect();
        codes
            .iter()
            .filter_map(|code| inner.remove(code, reason, &mut notify))
            .collect()
    }

    /// Snapshot of one session.
    pub fn get(&self, code: &SessionCode) -> Option<SessionSnapshot> {
        let inner = self.inner.lock();
        inner.sessions.get(code).map(|s| s.snapshot(code))
    }

    /// Code of the session `connection` belongs to.
    pub fn session_of(&self, connection: &ConnectionId) -> Option<SessionCode> {
        self.inner.lock().members.get(connection).cloned()
    }

    /// Snapshots of every session, ordered by code.
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        let inner = self.inner.lock();
        let mut all: Vec<_> = inner.sessions.iter().map(|(c, s)| s.snapshot(c)).collect();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        all
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    /// Whether no session is active.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCodes;
    use assert_matches::assert_matches;

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::from(id)
    }

    fn code(raw: &str) -> SessionCode {
        SessionCode::parse(raw).unwrap()
    }

    fn idle(_: &SessionCode, _: u64) -> ExpiryHandle {
        ExpiryHandle::detached(TimerKind::Idle, Instant::now() + Duration::from_secs(300))
    }

    fn registry(codes: &[&str]) -> SessionRegistry {
        SessionRegistry::with_generator(Box::new(ScriptedCodes::new(codes)), 4)
    }

    #[test]
    fn create_registers_single_participant() {
        let reg = registry(&["AB12CD"]);
        let created = reg.create(&conn("a"), idle, |_| {}).unwrap();
        assert_eq!(created, code("AB12CD"));

        let snap = reg.get(&created).unwrap();
        assert_eq!(snap.participants, vec![conn("a")]);
        assert_eq!(snap.pending, Some(TimerKind::Idle));
        assert_eq!(reg.session_of(&conn("a")), Some(created));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn create_retries_on_collision() {
        let reg = registry(&["AB12CD", "AB12CD", "ZZZZZZ"]);
        let _ = reg.create(&conn("a"), idle, |_| {}).unwrap();
        let second = reg.create(&conn("b"), idle, |_| {}).unwrap();
        assert_eq!(second, code("ZZZZZZ"));
    }

    #[test]
    fn create_gives_up_after_max_attempts() {
        let reg = registry(&["AB12CD", "AB12CD", "AB12CD", "AB12CD", "AB12CD"]);
        let _ = reg.create(&conn("a"), idle, |_| {}).unwrap();
        assert_matches!(
            reg.create(&conn("b"), idle, |_| {}),
            Err(SessionError::CodeSpaceExhausted { attempts: 4 })
        );
        assert_eq!(reg.len(), 1);
        assert!(reg.session_of(&conn("b")).is_none());
    }

    #[test]
    fn create_rejects_connection_already_in_session() {
        let reg = registry(&["AB12CD", "ZZZZZZ"]);
        let _ = reg.create(&conn("a"), idle, |_| {}).unwrap();
        assert_matches!(
            reg.create(&conn("a"), idle, |_| {}),
            Err(SessionError::AlreadyInSession { code: c }) if c == code("AB12CD")
        );
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn generations_increase() {
        let reg = registry(&["AB12CD", "ZZZZZZ"]);
        let a = reg.create(&conn("a"), idle, |_| {}).unwrap();
        let b = reg.create(&conn("b"), idle, |_| {}).unwrap();
        assert!(reg.get(&b).unwrap().generation > reg.get(&a).unwrap().generation);
    }

    #[test]
    fn join_adds_second_participant() {
        let reg = registry(&["AB12CD"]);
        let _ = reg.create(&conn("a"), idle, |_| {}).unwrap();
        let membership = reg.join("AB12CD", &conn("b"), |_| {}).unwrap();
        assert_eq!(membership.participants, vec![conn("a"), conn("b")]);
        assert_eq!(reg.session_of(&conn("b")), Some(code("AB12CD")));
    }

    #[test]
    fn join_normalizes_code() {
        let reg = registry(&["AB12CD"]);
        let _ = reg.create(&conn("a"), idle, |_| {}).unwrap();
        let membership = reg.join("  ab12cd ", &conn("b"), |_| {}).unwrap();
        assert_eq!(membership.code, code("AB12CD"));
    }

    #[test]
    fn join_unknown_code_is_not_found() {
        let reg = registry(&["AB12CD"]);
        let _ = reg.create(&conn("a"), idle, |_| {}).unwrap();
        assert_matches!(
            reg.join("ZZZZZZ", &conn("b"), |_| {}),
            Err(SessionError::NotFound { code }) if code == "ZZZZZZ"
        );
        assert_matches!(reg.join("nope!", &conn("b"), |_| {}), Err(SessionError::NotFound { .. }));
        assert!(reg.session_of(&conn("b")).is_none());
        assert_eq!(reg.get(&code("AB12CD")).unwrap().participants.len(), 1);
    }

    #[test]
    fn join_full_session_is_rejected_without_mutation() {
        let reg = registry(&["AB12CD"]);
        let _ = reg.create(&conn("a"), idle, |_| {}).unwrap();
        let _ = reg.join("AB12CD", &conn("b"), |_| {}).unwrap();
        let before = reg.get(&code("AB12CD")).unwrap();

        assert_matches!(reg.join("AB12CD", &conn("c"), |_| {}), Err(SessionError::Full { .. }));
        assert_eq!(reg.get(&code("AB12CD")).unwrap(), before);
        assert!(reg.session_of(&conn("c")).is_none());
    }

    #[test]
    fn join_own_session_is_rejected() {
        let reg = registry(&["AB12CD"]);
        let _ = reg.create(&conn("a"), idle, |_| {}).unwrap();
        assert_matches!(
            reg.join("AB12CD", &conn("a"), |_| {}),
            Err(SessionError::AlreadyInSession { .. })
        );
        assert_eq!(reg.get(&code("AB12CD")).unwrap().participants.len(), 1);
    }

    #[test]
    fn membership_checks_sender() {
        let reg = registry(&["AB12CD"]);
        let _ = reg.create(&conn("a"), idle, |_| {}).unwrap();
        assert!(reg.membership("ab12cd", &conn("a")).is_ok());
        assert_matches!(reg.membership("AB12CD", &conn("x")), Err(SessionError::NotMember { .. }));
        assert_matches!(reg.membership("ZZZZZZ", &conn("a")), Err(SessionError::NotMember { .. }));
        assert_matches!(reg.membership("", &conn("a")), Err(SessionError::NotMember { .. }));
    }

    #[test]
    fn leave_one_of_two_keeps_session() {
        let reg = registry(&["AB12CD"]);
        let _ = reg.create(&conn("a"), idle, |_| {}).unwrap();
        let _ = reg.join("AB12CD", &conn("b"), |_| {}).unwrap();

        assert_eq!(
            reg.leave(&conn("b"), |_| {}),
            Some(LeaveOutcome::Remaining {
                code: code("AB12CD"),
                participants: vec![conn("a")],
            })
        );
        assert_eq!(reg.len(), 1);
        assert!(reg.session_of(&conn("b")).is_none());
    }

    #[test]
    fn leave_last_participant_destroys_session() {
        let reg = registry(&["AB12CD"]);
        let _ = reg.create(&conn("a"), idle, |_| {}).unwrap();

        let outcome = reg.leave(&conn("a"), |_| {}).unwrap();
        assert_matches!(
            outcome,
            LeaveOutcome::Emptied(DestroyedSession { reason: DestroyReason::AllParticipantsLeft, ref participants, .. })
                if participants.is_empty()
        );
        assert!(reg.is_empty());
        assert!(reg.get(&code("AB12CD")).is_none());
    }

    #[test]
    fn leave_without_session_is_none() {
        let reg = registry(&[]);
        assert!(reg.leave(&conn("ghost"), |_| {}).is_none());
    }

    #[test]
    fn destroy_is_idempotent() {
        let reg = registry(&["AB12CD"]);
        let _ = reg.create(&conn("a"), idle, |_| {}).unwrap();
        let _ = reg.join("AB12CD", &conn("b"), |_| {}).unwrap();

        let destroyed = reg.destroy(&code("AB12CD"), DestroyReason::IdleExpired, |_| {}).unwrap();
        assert_eq!(destroyed.participants, vec![conn("a"), conn("b")]);
        assert_eq!(destroyed.reason, DestroyReason::IdleExpired);
        assert!(reg.session_of(&conn("a")).is_none());
        assert!(reg.session_of(&conn("b")).is_none());

        assert!(reg.destroy(&code("AB12CD"), DestroyReason::IdleExpired, |_| {}).is_none());
        assert!(reg.destroy(&code("ZZZZZZ"), DestroyReason::IdleExpired, |_| {}).is_none());
    }

    #[test]
    fn destroy_generation_ignores_reissued_code() {
        let reg = registry(&["AB12CD", "AB12CD"]);
        let _ = reg.create(&conn("a"), idle, |_| {}).unwrap();
        let old = reg.get(&code("AB12CD")).unwrap().generation;
        let _ = reg.destroy(&code("AB12CD"), DestroyReason::AllParticipantsLeft, |_| {});

        let _ = reg.create(&conn("b"), idle, |_| {}).unwrap();
        assert!(
            reg.destroy_generation(&code("AB12CD"), old, DestroyReason::IdleExpired, |_| {})
                .is_none()
        );
        assert_eq!(reg.len(), 1);

        let current = reg.get(&code("AB12CD")).unwrap().generation;
        assert!(
            reg.destroy_generation(&code("AB12CD"), current, DestroyReason::IdleExpired, |_| {})
                .is_some()
        );
    }

    #[test]
    fn destroy_drops_expiry_handle() {
        let reg = registry(&["AB12CD"]);
        let token = tokio_util::sync::CancellationToken::new();
        let watched = token.clone();
        let schedule = move |_: &SessionCode, _: u64| ExpiryHandle::new(TimerKind::Idle, Instant::now(), token);
        let _ = reg.create(&conn("a"), schedule, |_| {}).unwrap();
        assert!(!watched.is_cancelled());
        let _ = reg.destroy(&code("AB12CD"), DestroyReason::Shutdown, |_| {});
        assert!(watched.is_cancelled());
    }

    #[test]
    fn teardown_replaces_later_idle_timer_once() {
        let reg = registry(&["AB12CD"]);
        let created = reg.create(&conn("a"), idle, |_| {}).unwrap();
        let generation = reg.get(&created).unwrap().generation;
        let soon = Instant::now() + Duration::from_secs(10);
        let teardown = |_: &SessionCode, _: u64| ExpiryHandle::detached(TimerKind::Teardown, soon);

        assert!(reg.schedule_teardown(&created, generation, soon, teardown));
        assert_eq!(reg.get(&created).unwrap().pending, Some(TimerKind::Teardown));
        assert!(!reg.schedule_teardown(&created, generation, soon, teardown));
    }

    #[test]
    fn teardown_never_extends_idle_deadline() {
        let reg = registry(&["AB12CD"]);
        let soon = |_: &SessionCode, _: u64| {
            ExpiryHandle::detached(TimerKind::Idle, Instant::now() + Duration::from_secs(5))
        };
        let created = reg.create(&conn("a"), soon, |_| {}).unwrap();
        let generation = reg.get(&created).unwrap().generation;
        let late = Instant::now() + Duration::from_secs(10);
        let scheduled = reg.schedule_teardown(&created, generation, late, |_, _| {
            ExpiryHandle::detached(TimerKind::Teardown, late)
        });
        assert!(!scheduled);
        assert_eq!(reg.get(&created).unwrap().pending, Some(TimerKind::Idle));
    }

    #[test]
    fn teardown_for_stale_generation_is_ignored() {
        let reg = registry(&["AB12CD"]);
        let created = reg.create(&conn("a"), idle, |_| {}).unwrap();
        let generation = reg.get(&created).unwrap().generation;
        assert!(!reg.schedule_teardown(&created, generation + 1, Instant::now(), |_, _| {
            ExpiryHandle::detached(TimerKind::Teardown, Instant::now())
        }));
    }

    #[test]
    fn drain_destroys_everything() {
        let reg = registry(&["AB12CD", "ZZZZZZ"]);
        let _ = reg.create(&conn("a"), idle, |_| {}).unwrap();
        let _ = reg.create(&conn("b"), idle, |_| {}).unwrap();
        let _ = reg.join("ZZZZZZ", &conn("c"), |_| {}).unwrap();

        let drained = reg.drain(DestroyReason::Shutdown, |_| {});
        assert_eq!(drained.len(), 2);
        assert!(drained.iter().all(|d| d.reason == DestroyReason::Shutdown));
        assert!(reg.is_empty());
        assert!(reg.session_of(&conn("c")).is_none());
    }

    #[test]
    fn notify_sees_each_change_once() {
        let reg = registry(&["AB12CD"]);
        let mut seen = Vec::new();

        let _ = reg
            .create(&conn("a"), idle, |m| seen.push(m.participants.clone()))
            .unwrap();
        let _ = reg
            .join("AB12CD", &conn("b"), |m| seen.push(m.participants.clone()))
            .unwrap();
        assert_matches!(
            reg.join("AB12CD", &conn("c"), |_| panic!("failed join must not notify")),
            Err(SessionError::Full { .. })
        );
        let _ = reg.leave(&conn("b"), |outcome| {
            assert_matches!(outcome, LeaveOutcome::Remaining { participants, .. } if *participants == vec![conn("a")]);
            seen.push(Vec::new());
        });

        assert_eq!(
            seen,
            vec![vec![conn("a")], vec![conn("a"), conn("b")], Vec::new()]
        );
    }

    #[test]
    fn destroy_notifies_with_participants() {
        let reg = registry(&["AB12CD"]);
        let _ = reg.create(&conn("a"), idle, |_| {}).unwrap();
        let _ = reg.join("AB12CD", &conn("b"), |_| {}).unwrap();

        let mut notified = Vec::new();
        let destroyed = reg
            .destroy(&code("AB12CD"), DestroyReason::TransferComplete, |d| {
                notified.extend(d.participants.iter().cloned());
            })
            .unwrap();
        assert_eq!(notified, destroyed.participants);

        let calls = std::cell::Cell::new(0);
        assert!(
            reg.destroy(&code("AB12CD"), DestroyReason::TransferComplete, |_| calls.set(calls.get() + 1))
                .is_none()
        );
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn drain_notifies_every_session() {
        let reg = registry(&["AB12CD", "ZZZZZZ"]);
        let _ = reg.create(&conn("a"), idle, |_| {}).unwrap();
        let _ = reg.create(&conn("b"), idle, |_| {}).unwrap();

        let mut codes = Vec::new();
        let _ = reg.drain(DestroyReason::Shutdown, |d| codes.push(d.code.clone()));
        codes.sort();
        assert_eq!(codes, vec![code("AB12CD"), code("ZZZZZZ")]);
    }

    #[test]
    fn snapshots_are_sorted() {
        let reg = registry(&["ZZZZZZ", "AB12CD"]);
        let _ = reg.create(&conn("a"), idle, |_| {}).unwrap();
        let _ = reg.create(&conn("b"), idle, |_| {}).unwrap();
        let codes: Vec<_> = reg.snapshots().into_iter().map(|s| s.code).collect();
        assert_eq!(codes, vec![code("AB12CD"), code("ZZZZZZ")]);
    }

    // ── invariants under random operation sequences ─────────────────

    mod invariants {
        use super::*;
        use proptest::prelude::*;

        #[derive(Clone, Debug)]
        enum Op {
            Create(u8),
            Join(u8, u8),
            Leave(u8),
            Destroy(u8),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0u8..6).prop_map(Op::Create),
                (0u8..6, 0u8..4).prop_map(|(c, s)| Op::Join(c, s)),
                (0u8..6).prop_map(Op::Leave),
                (0u8..4).prop_map(Op::Destroy),
            ]
        }

        fn check(reg: &SessionRegistry, connections: &[ConnectionId]) {
            let snapshots = reg.snapshots();
            let mut seen = std::collections::HashSet::new();
            for snap in &snapshots {
                assert!((1..=MAX_PARTICIPANTS).contains(&snap.participants.len()));
                assert!(snap.pending.is_some());
                for p in &snap.participants {
                    assert!(seen.insert(p.clone()), "{p} in two sessions");
                    assert_eq!(reg.session_of(p).as_ref(), Some(&snap.code));
                }
            }
            for c in connections {
                if !seen.contains(c) {
                    assert!(reg.session_of(c).is_none());
                }
            }
        }

        proptest! {
            #[test]
            fn registry_invariants_hold(ops in proptest::collection::vec(op(), 1..60)) {
                let reg = SessionRegistry::with_generator(Box::new(RandomCodes::seeded(1)), 16);
                let connections: Vec<ConnectionId> =
                    (0..6).map(|i| ConnectionId::from(format!("c{i}"))).collect();
                let mut codes: Vec<SessionCode> = Vec::new();

                for op in ops {
                    match op {
                        Op::Create(c) => {
                            if let Ok(code) = reg.create(&connections[c as usize], idle, |_| {}) {
                                codes.push(code);
                            }
                        }
                        Op::Join(c, s) => {
                            if let Some(code) = codes.get(s as usize) {
                                let _ = reg.join(code.as_str(), &connections[c as usize], |_| {});
                            }
                        }
                        Op::Leave(c) => {
                            let _ = reg.leave(&connections[c as usize], |_| {});
                        }
                        Op::Destroy(s) => {
                            if let Some(code) = codes.get(s as usize) {
                                let _ = reg.destroy(code, DestroyReason::IdleExpired, |_| {});
                            }
                        }
                    }
                    check(&reg, &connections);
                }
            }
        }

        /// Last notification each connection received: `true` for a join.
        type Log = parking_lot::Mutex<Vec<(ConnectionId, bool)>>;

        fn last_seen(log: &Log, connection: &ConnectionId) -> Option<bool> {
            log.lock()
                .iter()
                .rev()
                .find(|(c, _)| c == connection)
                .map(|(_, joined)| *joined)
        }

        #[test]
        fn concurrent_destroy_join_and_leave_keep_invariants() {
            let connections: Vec<ConnectionId> =
                ["a", "b", "c"].into_iter().map(ConnectionId::from).collect();
            let (a, b, c) = (&connections[0], &connections[1], &connections[2]);

            for seed in 0..200 {
                let reg = SessionRegistry::with_generator(Box::new(RandomCodes::seeded(seed)), 16);
                let log = Log::default();
                let joined = |m: &Membership| {
                    if let Some(last) = m.participants.last() {
                        log.lock().push((last.clone(), true));
                    }
                };
                let destroyed = |d: &DestroyedSession| {
                    log.lock().extend(d.participants.iter().map(|p| (p.clone(), false)));
                };

                let code = reg.create(a, idle, joined).unwrap();
                let _ = reg.join(code.as_str(), b, joined).unwrap();
                let generation = reg.get(&code).unwrap().generation;
                let barrier = std::sync::Barrier::new(4);

                std::thread::scope(|s| {
                    let _ = s.spawn(|| {
                        barrier.wait();
                        let _ = reg.destroy_generation(&code, generation, DestroyReason::IdleExpired, destroyed);
                    });
                    let _ = s.spawn(|| {
                        barrier.wait();
                        let _ = reg.join(code.as_str(), c, joined);
                    });
                    let _ = s.spawn(|| {
                        barrier.wait();
                        let _ = reg.leave(a, |_| log.lock().push((a.clone(), false)));
                    });
                    let _ = s.spawn(|| {
                        barrier.wait();
                        let _ = reg.leave(b, |_| log.lock().push((b.clone(), false)));
                        let _ = reg.create(b, idle, joined);
                    });
                });

                check(&reg, &connections);
                for connection in &connections {
                    let member = reg.session_of(connection).is_some();
                    assert_eq!(
                        last_seen(&log, connection).unwrap_or(false),
                        member,
                        "{connection} was told the wrong final state (seed {seed})"
                    );
                }
            }
        }
    }
}
