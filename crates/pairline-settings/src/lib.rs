//! # pairline-settings
//!
//! Configuration for the Pairline relay, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`PairlineSettings::default()`]
//! 2. **Settings file**: `~/.pairline/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `PAIRLINE_*` overrides (highest priority)
//!
//! The binary applies its command-line flags on top of the loaded value.

#![deny(unsafe_code)]

pub mod errors;
pub mod limits;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{LoggingSettings, PairlineSettings, ServerSettings, SessionSettings};
