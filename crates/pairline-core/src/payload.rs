//! Relay payloads.
//!
//! The relay never looks inside a payload. It only needs to know which
//! audience a payload goes to and how to wrap it for the wire.

use bytes::Bytes;
use serde_json::Value;

use crate::events::OutboundEvent;

/// Who receives a relayed payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Audience {
    /// Every participant except the sender.
    Peer,
    /// Every participant, sender included.
    Everyone,
}

/// Opaque data forwarded between participants.
#[derive(Clone, Debug, PartialEq)]
pub enum RelayPayload {
    /// Connection-negotiation data (SDP offers/answers, ICE candidates, ...).
    Signal(Value),
    /// Chat text.
    Text(String),
    /// A slice of a file transfer.
    Chunk(Bytes),
}

impl RelayPayload {
    /// Recipients of this kind of payload.
    pub fn audience(&self) -> Audience {
        match self {
            Self::Signal(_) | Self::Chunk(_) => Audience::Peer,
            Self::Text(_) => Audience::Everyone,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Signal(_) => "signal",
            Self::Text(_) => "message",
            Self::Chunk(_) => "chunk",
        }
    }

    /// Wrap the payload in the outbound event that carries it.
    pub fn into_event(self) -> OutboundEvent {
        match self {
            Self::Signal(data) => OutboundEvent::Signal(data),
            Self::Text(message) => OutboundEvent::RoomMessage { message },
            Self::Chunk(bytes) => OutboundEvent::FileChunk(bytes),
        }
    }
}

/// Serde adapter carrying [`Bytes`] as a base64 string in JSON frames.
pub mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as standard base64.
    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    /// Deserialize bytes from standard base64.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
