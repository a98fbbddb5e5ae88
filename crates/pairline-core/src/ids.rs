//! Identifier newtypes.
//!
//! [`ConnectionId`] is opaque and minted by the gateway for every accepted
//! socket. [`SessionCode`] is the short, human-typeable code a client hands
//! to its peer out of band.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{CODE_ALPHABET, CODE_LENGTH};

// ─────────────────────────────────────────────────────────────────────────────
// ConnectionId
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque identifier of one gateway connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Mint a new identifier (`conn_` + UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionCode
// ─────────────────────────────────────────────────────────────────────────────

/// Raised when a client-supplied string cannot be a session code.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid session code: {0:?}")]
pub struct InvalidSessionCode(pub String);

/// Six uppercase base-36 characters identifying an active session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionCode(String);

impl SessionCode {
    /// Draw a random code from `rng`.
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        let code = (0..CODE_LENGTH)
            .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
            .collect();
        Self(code)
    }

    /// Parse a client-supplied code.
    ///
    /// Surrounding whitespace is ignored and lowercase letters are folded to
    /// uppercase, so `" ab12cd"` and `"AB12CD"` name the same session.
    pub fn parse(raw: &str) -> Result<Self, InvalidSessionCode> {
        let normalized = raw.trim().to_ascii_uppercase();
        let well_formed = normalized.len() == CODE_LENGTH
            && normalized.bytes().all(|b| CODE_ALPHABET.contains(&b));
        if well_formed {
            Ok(Self(normalized))
        } else {
            Err(InvalidSessionCode(raw.to_owned()))
        }
    }

    /// Return the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encode the code as the fixed-width prefix of a binary chunk frame.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for SessionCode {
    type Err = InvalidSessionCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for SessionCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
