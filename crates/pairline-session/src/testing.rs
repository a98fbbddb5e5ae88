//! In-memory doubles for tests.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

use pairline_core::{ConnectionId, OutboundEvent, SessionCode};

use crate::codes::{CodeGenerator, RandomCodes};
use crate::gateway::Gateway;

/// Gateway that records every delivery instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    log: Mutex<Vec<(ConnectionId, OutboundEvent)>>,
    failing: Mutex<HashSet<ConnectionId>>,
}

impl RecordingGateway {
    /// Empty gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later delivery to `connection` fail.
    pub fn fail(&self, connection: &ConnectionId) {
        let _ = self.failing.lock().insert(connection.clone());
    }

    /// Events delivered to `connection`, oldest first.
    pub fn received(&self, connection: &ConnectionId) -> Vec<OutboundEvent> {
        self.log
            .lock()
            .iter()
            .filter(|(to, _)| to == connection)
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Like [`received`](Self::received), but clears those entries.
    pub fn take(&self, connection: &ConnectionId) -> Vec<OutboundEvent> {
        let mut log = self.log.lock();
        let (mine, rest): (Vec<_>, Vec<_>) = log.drain(..).partition(|(to, _)| to == connection);
        *log = rest;
        mine.into_iter().map(|(_, event)| event).collect()
    }

    /// Every delivery, oldest first.
    pub fn deliveries(&self) -> Vec<(ConnectionId, OutboundEvent)> {
        self.log.lock().clone()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.log.lock().clear();
    }
}

impl Gateway for RecordingGateway {
    fn deliver(&self, recipients: &[ConnectionId], event: &OutboundEvent) -> usize {
        let failing = self.failing.lock();
        let mut log = self.log.lock();
        let mut delivered = 0;
        for recipient in recipients {
            if failing.contains(recipient) {
                continue;
            }
            log.push((recipient.clone(), event.clone()));
            delivered += 1;
        }
        delivered
    }
}

/// Code generator replaying a fixed list, then falling back to random codes.
#[derive(Debug)]
pub struct ScriptedCodes {
    queue: Mutex<VecDeque<SessionCode>>,
    fallback: RandomCodes,
}

impl ScriptedCodes {
    /// Replay `codes` in order. Panics on a malformed code.
    pub fn new(codes: &[&str]) -> Self {
        let queue = codes
            .iter()
            .map(|raw| {
                SessionCode::parse(raw)
                    .unwrap_or_else(|err| panic!("scripted code must be valid: {err}"))
            })
            .collect();
        Self {
            queue: Mutex::new(queue),
            fallback: RandomCodes::seeded(0),
        }
    }
}

impl CodeGenerator for ScriptedCodes {
    fn next_code(&self) -> SessionCode {
        self.queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.next_code())
    }
}
