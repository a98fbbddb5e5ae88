//! Accepted ranges for numeric settings.
//!
//! Shared by [`PairlineSettings::validate`](crate::PairlineSettings::validate)
//! and the `PAIRLINE_*` env parsers, so a value rejected from the environment
//! is also rejected from the settings file.

use std::ops::RangeInclusive;

/// `server.maxChunkBytes`.
pub const MAX_CHUNK_BYTES: RangeInclusive<usize> = 1..=(1 << 30);
/// `server.sendQueueCapacity`.
pub const SEND_QUEUE_CAPACITY: RangeInclusive<usize> = 1..=65_536;
/// `server.heartbeatIntervalSecs`.
pub const HEARTBEAT_INTERVAL_SECS: RangeInclusive<u64> = 1..=3_600;
/// `server.heartbeatTimeoutSecs`.
pub const HEARTBEAT_TIMEOUT_SECS: RangeInclusive<u64> = 1..=86_400;
/// `sessions.idleTtlSecs`.
pub const IDLE_TTL_SECS: RangeInclusive<u64> = 1..=86_400;
/// `sessions.completionGraceSecs`.
pub const COMPLETION_GRACE_SECS: RangeInclusive<u64> = 0..=3_600;
/// `sessions.maxCodeAttempts`.
pub const MAX_CODE_ATTEMPTS: RangeInclusive<usize> = 1..=1_024;
