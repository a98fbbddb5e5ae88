//! Protocol-wide constants and default limits.

use std::time::Duration;

/// Number of characters in a session code.
pub const CODE_LENGTH: usize = 6;

/// Characters a session code is drawn from (uppercase base-36).
pub const CODE_ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Hard capacity of a session. Pairline sessions are strictly two-party.
pub const MAX_PARTICIPANTS: usize = 2;

/// Default idle lifetime of a session, measured from creation.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(300);

/// Default delay between a completion signal and session teardown.
pub const DEFAULT_COMPLETION_GRACE: Duration = Duration::from_secs(10);

/// Default ceiling for a single binary chunk (100 MB).
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 100 * 1024 * 1024;

/// How many fresh codes `create` tries before giving up.
pub const DEFAULT_MAX_CODE_ATTEMPTS: usize = 16;
