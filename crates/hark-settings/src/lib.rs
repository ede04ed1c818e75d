//! # hark-settings
//!
//! Configuration management with layered sources for the hark transcription
//! pipeline.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`HarkSettings::default()`]
//! 2. **User file**: `~/.hark/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `HARK_*` overrides (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use hark_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("threads: {}", settings.runtime.thread_count);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_overrides, deep_merge, load_settings, load_settings_from_path, load_settings_with,
    settings_path,
};
pub use types::*;
