//! Error types for session operations and frame decoding.
//!
//! Every [`SessionError`] variant maps to the reason string a client sees in
//! an `error` event ([`SessionError::client_reason`]) and to a short label
//! for logs and metrics ([`SessionError::error_kind`]).

use thiserror::Error;

use crate::ids::SessionCode;

/// Client-facing reason for a join/lookup against an unknown code.
pub const REASON_NOT_FOUND: &str = "session does not exist";
/// Client-facing reason for a join against a session at capacity.
pub const REASON_FULL: &str = "session is full";
/// Client-facing reason for create/join from a connection already in a session.
pub const REASON_ALREADY_IN_SESSION: &str = "already in a session";
/// Client-facing reason for an undecodable frame.
pub const REASON_MALFORMED: &str = "malformed event";
/// Client-facing reason for a chunk over the size ceiling.
pub const REASON_TOO_LARGE: &str = "payload too large";
/// Client-facing reason when no free code could be generated.
pub const REASON_NO_CODES: &str = "no session codes available";
/// Client-facing reason for a failure the client cannot act on.
pub const REASON_INTERNAL: &str = "internal error";

/// Failures of registry and relay operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The code does not name an active session.
    #[error("session {code} does not exist")]
    NotFound {
        /// The code as the client sent it.
        code: String,
    },

    /// The session already has two participants.
    #[error("session {code} is full")]
    Full {
        /// The full session.
        code: SessionCode,
    },

    /// The sender does not belong to the session named in a relay event.
    #[error("connection is not a member of session {code}")]
    NotMember {
        /// The code as the client sent it.
        code: String,
    },

    /// The connection already participates in a session.
    #[error("connection already belongs to session {code}")]
    AlreadyInSession {
        /// The session the connection currently belongs to.
        code: SessionCode,
    },

    /// Code generation kept colliding with active sessions.
    #[error("no free session code after {attempts} attempts")]
    CodeSpaceExhausted {
        /// How many codes were tried.
        attempts: usize,
    },

    /// A timer deadline does not fit in the clock's range.
    #[error("timer of {secs}s overflows the clock")]
    TimerOverflow {
        /// Requested duration in seconds.
        secs: u64,
    },
}

impl SessionError {
    /// Reason string carried by the outbound `error` event.
    pub fn client_reason(&self) -> &'static str {
        match self {
            Self::NotFound { .. } | Self::NotMember { .. } => REASON_NOT_FOUND,
            Self::Full { .. } => REASON_FULL,
            Self::AlreadyInSession { .. } => REASON_ALREADY_IN_SESSION,
            Self::CodeSpaceExhausted { .. } => REASON_NO_CODES,
            Self::TimerOverflow { .. } => REASON_INTERNAL,
        }
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Full { .. } => "full",
            Self::NotMember { .. } => "not_member",
            Self::AlreadyInSession { .. } => "already_in_session",
            Self::CodeSpaceExhausted { .. } => "code_space_exhausted",
            Self::TimerOverflow { .. } => "timer_overflow",
        }
    }

    /// Whether the error points at a misconfigured deployment rather than a
    /// bad request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CodeSpaceExhausted { .. } | Self::TimerOverflow { .. }
        )
    }
}

/// Failures decoding an inbound frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Text frame was not a recognized JSON event.
    #[error("malformed event: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary frame shorter than the code prefix.
    #[error("binary frame of {len} bytes is too short for a session code")]
    Truncated {
        /// Frame length.
        len: usize,
    },

    /// Chunk payload exceeds the configured ceiling.
    #[error("chunk of {len} bytes exceeds limit of {limit} bytes")]
    TooLarge {
        /// Payload length.
        len: usize,
        /// Configured ceiling.
        limit: usize,
    },
}

impl FrameError {
    /// Reason string carried by the outbound `error` event.
    pub fn client_reason(&self) -> &'static str {
        match self {
            Self::Json(_) | Self::Truncated { .. } => REASON_MALFORMED,
            Self::TooLarge { .. } => REASON_TOO_LARGE,
        }
    }
}
