//! # pairline-core
//!
//! Foundation types shared by every Pairline crate:
//!
//! - **Identifiers**: [`ConnectionId`] for gateway connections and
//!   [`SessionCode`] for the short codes clients exchange out of band
//! - **Wire events**: [`InboundEvent`] and [`OutboundEvent`], the JSON/binary
//!   protocol spoken over the WebSocket
//! - **Payloads**: [`RelayPayload`], the tagged union the relay forwards
//!   without inspecting
//! - **Errors**: [`SessionError`] and friends via `thiserror`
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod metrics;
pub mod payload;

pub use errors::{FrameError, SessionError};
pub use events::{DestroyReason, InboundEvent, OutboundEvent};
pub use ids::{ConnectionId, InvalidSessionCode, SessionCode};
pub use payload::{Audience, RelayPayload};
