//! # pairline-session
//!
//! The relay core: everything between a decoded frame and the outbound
//! events it causes.
//!
//! - [`SessionRegistry`]: the single source of truth for active sessions,
//!   guarded by one lock under which outbound events are queued
//! - [`LifecycleController`]: idle expiry and post-completion teardown timers
//! - [`RelayDispatcher`]: recipient selection and fan-out through a [`Gateway`]
//! - [`EventRouter`]: maps inbound events and disconnects onto the above
//!
//! The transport plugs in through the [`Gateway`] trait. [`testing`] ships an
//! in-memory gateway for tests in this and downstream crates.

#![deny(unsafe_code)]

pub mod codes;
pub mod dispatcher;
pub mod gateway;
pub mod lifecycle;
pub mod registry;
pub mod router;
pub mod testing;
pub mod timer;

pub use codes::{CodeGenerator, RandomCodes};
pub use dispatcher::RelayDispatcher;
pub use gateway::Gateway;
pub use lifecycle::{LifecycleController, LifecycleTiming};
pub use registry::{DestroyedSession, LeaveOutcome, Membership, SessionRegistry, SessionSnapshot};
pub use router::{EventRouter, RouterConfig};
pub use timer::{ExpiryHandle, TimerKind};
