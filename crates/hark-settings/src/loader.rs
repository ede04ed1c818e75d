//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`HarkSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `HARK_*` environment variable overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{HarkSettings, parse_enum};

/// Resolve the path to the settings file (`~/.hark/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".hark").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HarkSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or an invalid value is an
/// error.
pub fn load_settings_from_path(path: &Path) -> Result<HarkSettings> {
    load_settings_with(path, |name| std::env::var(name).ok())
}

/// Load settings from `path`, reading overrides through `lookup`.
pub fn load_settings_with<F>(path: &Path, lookup: F) -> Result<HarkSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(HarkSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: HarkSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, lookup);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides read through `lookup`.
///
/// Integers must parse and fall inside their range; enums must use their
/// settings-file spelling. Invalid values are ignored with a warning.
pub fn apply_overrides<F>(settings: &mut HarkSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("HARK_MODEL_PATH") {
        settings.model.path = Some(v);
    }
    if let Some(v) = read("HARK_THREADS") {
        match parse_usize_range(&v, 1, 256) {
            Some(n) => settings.runtime.thread_count = n,
            None => warn!(key = "HARK_THREADS", value = %v, "invalid thread count, ignoring"),
        }
    }
    if let Some(v) = read("HARK_BACKEND") {
        match parse_enum(&v) {
            Some(b) => settings.runtime.backend = b,
            None => warn!(key = "HARK_BACKEND", value = %v, "unknown backend, ignoring"),
        }
    }
    if let Some(v) = read("HARK_SCRATCH_CAPACITY") {
        match parse_usize_range(&v, 1, 10_000_000) {
            Some(n) => settings.runtime.scratch_capacity = n,
            None => {
                warn!(key = "HARK_SCRATCH_CAPACITY", value = %v, "invalid capacity, ignoring");
            }
        }
    }
    if let Some(v) = read("HARK_INPUT_LAYOUT") {
        match parse_enum(&v) {
            Some(l) => settings.runtime.input_layout = l,
            None => warn!(key = "HARK_INPUT_LAYOUT", value = %v, "unknown layout, ignoring"),
        }
    }
    if let Some(v) = read("HARK_RUN_TIMEOUT_MS") {
        match parse_u64_range(&v, 100, 3_600_000) {
            Some(n) => settings.runtime.run_timeout_ms = n,
            None => warn!(key = "HARK_RUN_TIMEOUT_MS", value = %v, "invalid timeout, ignoring"),
        }
    }
    if let Some(v) = read("HARK_WAV_MODE") {
        match parse_enum(&v) {
            Some(m) => settings.audio.wav_mode = m,
            None => warn!(key = "HARK_WAV_MODE", value = %v, "unknown wav mode, ignoring"),
        }
    }
    if let Some(v) = read("HARK_LOG_LEVEL") {
        match parse_enum(&v.to_lowercase()) {
            Some(l) => settings.logging.level = l,
            None => warn!(key = "HARK_LOG_LEVEL", value = %v, "unknown log level, ignoring"),
        }
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
