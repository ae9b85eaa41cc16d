//! # switchboard-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** ([`Settings::default()`])
//! 2. **Settings file**: a JSON file given on the command line or through
//!    `SWITCHBOARD_CONFIG`
//! 3. **Environment variables**: `HOST`, `PORT`, `AUTH_SECRET`, ...

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, load_file, load_settings};
pub use types::*;
