//! Wire protocol.
//!
//! Text frames carry JSON objects tagged by `event`. Inbound objects put
//! their fields next to the tag; outbound objects nest the payload under
//! `data`:
//!
//! ```text
//! → {"event":"join-session","code":"AB12CD"}
//! ← {"event":"participant-count","data":{"count":2}}
//! ```
//!
//! File chunks travel as binary frames. Inbound chunk frames start with the
//! six ASCII bytes of the session code; outbound chunk frames carry only the
//! payload, since the receiver already knows which session it is in.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::CODE_LENGTH;
use crate::errors::FrameError;
use crate::ids::SessionCode;
use crate::payload::{RelayPayload, base64_bytes};

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// An event received from a client.
///
/// Codes stay raw strings here; the router parses them so that a malformed
/// code can be answered with "session does not exist" instead of a decoding
/// error.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum InboundEvent {
    /// Open a new session with the sender as its only participant.
    CreateSession,
    /// Join an existing session.
    JoinSession {
        /// Code of the session to join.
        code: String,
    },
    /// Connection-negotiation data for the other participant.
    Signal {
        /// Session code.
        code: String,
        /// Opaque signaling payload.
        data: Value,
    },
    /// Chat text for every participant.
    RoomMessage {
        /// Session code.
        code: String,
        /// Message body.
        message: String,
    },
    /// A binary chunk for the other participant.
    FileChunk {
        /// Session code.
        code: String,
        /// Chunk bytes (base64 in JSON form).
        #[serde(with = "base64_bytes")]
        bytes: Bytes,
    },
    /// The sender finished its transfer.
    TransferComplete {
        /// Session code.
        code: String,
    },
}

impl InboundEvent {
    /// Decode a text frame.
    pub fn from_json(text: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode a binary chunk frame: `code (6 bytes) ++ payload`.
    pub fn from_binary(frame: Bytes) -> Result<Self, FrameError> {
        if frame.len() < CODE_LENGTH {
            return Err(FrameError::Truncated { len: frame.len() });
        }
        let code = String::from_utf8_lossy(&frame[..CODE_LENGTH]).into_owned();
        Ok(Self::FileChunk {
            code,
            bytes: frame.slice(CODE_LENGTH..),
        })
    }

    /// Wire name of the event, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateSession => "create-session",
            Self::JoinSession { .. } => "join-session",
            Self::Signal { .. } => "signal",
            Self::RoomMessage { .. } => "room-message",
            Self::FileChunk { .. } => "file-chunk",
            Self::TransferComplete { .. } => "transfer-complete",
        }
    }

    /// Split a relay event into its session code and payload.
    ///
    /// Returns `None` for events that are not relayed.
    pub fn into_relay(self) -> Option<(String, RelayPayload)> {
        match self {
            Self::Signal { code, data } => Some((code, RelayPayload::Signal(data))),
            Self::RoomMessage { code, message } => Some((code, RelayPayload::Text(message))),
            Self::FileChunk { code, bytes } => Some((code, RelayPayload::Chunk(bytes))),
            Self::CreateSession | Self::JoinSession { .. } | Self::TransferComplete { .. } => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// An event sent to one or more clients.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum OutboundEvent {
    /// Reply to `create-session`.
    SessionCreated {
        /// The new session's code.
        code: SessionCode,
    },
    /// Reply to a successful `join-session`.
    SessionJoined {
        /// The joined session's code.
        code: SessionCode,
    },
    /// A request failed.
    Error {
        /// Human-readable reason.
        reason: String,
    },
    /// Current number of participants in the recipient's session.
    ParticipantCount {
        /// Participant count.
        count: usize,
    },
    /// Relayed signaling payload.
    Signal(Value),
    /// Relayed chat text.
    RoomMessage {
        /// Message body.
        message: String,
    },
    /// Relayed binary chunk. Sent as a binary frame by the gateway.
    FileChunk(#[serde(with = "base64_bytes")] Bytes),
    /// The other side (or the recipient itself) finished its transfer.
    TransferComplete,
    /// The recipient's session is gone.
    SessionDestroyed {
        /// Why the session ended.
        reason: String,
    },
}

impl OutboundEvent {
    /// Build an `error` event.
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }

    /// Wire name of the event, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionCreated { .. } => "session-created",
            Self::SessionJoined { .. } => "session-joined",
            Self::Error { .. } => "error",
            Self::ParticipantCount { .. } => "participant-count",
            Self::Signal(_) => "signal",
            Self::RoomMessage { .. } => "room-message",
            Self::FileChunk(_) => "file-chunk",
            Self::TransferComplete => "transfer-complete",
            Self::SessionDestroyed { .. } => "session-destroyed",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Destroy reasons
// ─────────────────────────────────────────────────────────────────────────────

/// Why a session was destroyed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DestroyReason {
    /// The last participant disconnected.
    AllParticipantsLeft,
    /// The idle TTL elapsed.
    IdleExpired,
    /// The grace delay after a completion signal elapsed.
    TransferComplete,
    /// The server is shutting down.
    Shutdown,
}

impl DestroyReason {
    /// Human-readable reason sent in `session-destroyed`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllParticipantsLeft => "all participants left",
            Self::IdleExpired => "session expired",
            Self::TransferComplete => "transfer complete",
            Self::Shutdown => "server shutting down",
        }
    }

    /// Short label for metrics.
    pub fn label(self) -> &'static str {
        match self {
            Self::AllParticipantsLeft => "all_left",
            Self::IdleExpired => "expired",
            Self::TransferComplete => "completed",
            Self::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for DestroyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
