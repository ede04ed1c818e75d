//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` for the JSON file
//! format and `#[serde(default)]` so partial JSON is accepted; missing
//! fields get their compiled default during deserialization.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Scratch buffer size (output cells) used when nothing else is configured.
pub const DEFAULT_SCRATCH_CAPACITY: usize = 50_000;

/// Root settings type.
///
/// Example `~/.hark/settings.json`:
///
/// ```json
/// {
///   "runtime": { "threadCount": 2, "backend": "optimized-cpu" },
///   "audio": { "wavMode": "resample" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HarkSettings {
    /// Settings schema version.
    pub version: String,
    /// Model location.
    pub model: ModelSettings,
    /// Inference engine configuration.
    pub runtime: RuntimeSettings,
    /// Audio ingestion configuration.
    pub audio: AudioSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for HarkSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            model: ModelSettings::default(),
            runtime: RuntimeSettings::default(),
            audio: AudioSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl HarkSettings {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.runtime.thread_count == 0 {
            return Err(SettingsError::InvalidValue(
                "runtime.threadCount must be at least 1".into(),
            ));
        }
        if self.runtime.scratch_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "runtime.scratchCapacity must be at least 1".into(),
            ));
        }
        if self.runtime.run_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "runtime.runTimeoutMs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Where the serialized model lives.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSettings {
    /// Path to the ONNX model file (may contain `~`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ModelSettings {
    /// Resolve the model path, expanding `~/` to the home directory.
    pub fn resolved_path(&self) -> Option<String> {
        let path = self.path.as_deref()?;
        if let Some(rest) = path.strip_prefix("~/") {
            if let Ok(home) = std::env::var("HOME") {
                return Some(format!("{home}/{rest}"));
            }
        }
        Some(path.to_string())
    }
}

/// Execution strategy used by the inference engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccelerationBackend {
    /// The engine's stock CPU kernels.
    #[default]
    Default,
    /// Optimized CPU kernels (XNNPACK).
    OptimizedCpu,
    /// The operating system's inference engine (CoreML, NNAPI).
    SystemProvided,
}

impl AccelerationBackend {
    /// Stable name as written in settings files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::OptimizedCpu => "optimized-cpu",
            Self::SystemProvided => "system-provided",
        }
    }
}

impl std::fmt::Display for AccelerationBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape the audio signal is bound to on the model input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    /// `[n]`
    #[default]
    Flat,
    /// `[1, n]`
    Batched,
}

/// How WAV containers are turned into samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WavMode {
    /// Skip a fixed 44-byte header and read 16-bit PCM with no checks.
    Raw,
    /// Parse the header and reject anything but 16 kHz mono 16-bit PCM.
    #[default]
    Strict,
    /// Decode any supported container, mix to mono, resample to 16 kHz.
    Resample,
}

/// Inference engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeSettings {
    /// Intra-op thread count.
    pub thread_count: usize,
    /// Acceleration backend.
    pub backend: AccelerationBackend,
    /// Maximum output cells a single run may produce.
    pub scratch_capacity: usize,
    /// Input tensor layout.
    pub input_layout: InputLayout,
    /// Upper bound on a single run when dispatched through the async service.
    pub run_timeout_ms: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            thread_count: 4,
            backend: AccelerationBackend::Default,
            scratch_capacity: DEFAULT_SCRATCH_CAPACITY,
            input_layout: InputLayout::Flat,
            run_timeout_ms: 30_000,
        }
    }
}

/// Audio ingestion configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioSettings {
    /// WAV handling mode.
    pub wav_mode: WavMode,
}

/// Log level for the stderr subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace-level (most verbose).
    Trace,
    /// Debug-level.
    Debug,
    /// Info-level.
    Info,
    /// Warning-level (default).
    #[default]
    Warn,
    /// Error-level.
    Error,
}

impl LogLevel {
    /// Convert to a tracing filter string.
    pub fn as_filter_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level written to stderr (overridden by `RUST_LOG`).
    pub level: LogLevel,
}

/// Parse a settings enum from its JSON spelling (e.g. `"optimized-cpu"`).
pub fn parse_enum<T: serde::de::DeserializeOwned>(value: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = HarkSettings::default();
        assert_eq!(s.version, "0.1.0");
        assert_eq!(s.runtime.thread_count, 4);
        assert_eq!(s.runtime.backend, AccelerationBackend::Default);
        assert_eq!(s.runtime.scratch_capacity, 50_000);
        assert_eq!(s.runtime.input_layout, InputLayout::Flat);
        assert_eq!(s.runtime.run_timeout_ms, 30_000);
        assert_eq!(s.audio.wav_mode, WavMode::Strict);
        assert_eq!(s.logging.level, LogLevel::Warn);
        assert!(s.model.path.is_none());
        assert!(s.validate().is_ok());
    }

    #[test]
    fn serde_camel_case() {
        let value = serde_json::to_value(HarkSettings::default()).unwrap();
        assert!(value["runtime"].get("threadCount").is_some());
        assert!(value["runtime"].get("scratchCapacity").is_some());
        assert!(value["audio"].get("wavMode").is_some());
        assert!(value["runtime"].get("thread_count").is_none());
        // unset model path is omitted
        assert!(value["model"].get("path").is_none());
    }

    #[test]
    fn backend_spelling() {
        assert_eq!(
            parse_enum::<AccelerationBackend>("optimized-cpu"),
            Some(AccelerationBackend::OptimizedCpu)
        );
        assert_eq!(
            parse_enum::<AccelerationBackend>("system-provided"),
            Some(AccelerationBackend::SystemProvided)
        );
        assert_eq!(parse_enum::<AccelerationBackend>("gpu"), None);
        assert_eq!(AccelerationBackend::OptimizedCpu.to_string(), "optimized-cpu");
    }

    #[test]
    fn wav_mode_and_layout_spelling() {
        assert_eq!(parse_enum::<WavMode>("raw"), Some(WavMode::Raw));
        assert_eq!(parse_enum::<WavMode>("resample"), Some(WavMode::Resample));
        assert_eq!(parse_enum::<InputLayout>("batched"), Some(InputLayout::Batched));
        assert_eq!(parse_enum::<InputLayout>("Batched"), None);
    }

    #[test]
    fn validate_rejects_zero_threads() {
        let mut s = HarkSettings::default();
        s.runtime.thread_count = 0;
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("threadCount"));
    }

    #[test]
    fn validate_rejects_zero_scratch() {
        let mut s = HarkSettings::default();
        s.runtime.scratch_capacity = 0;
        assert!(matches!(s.validate(), Err(SettingsError::InvalidValue(_))));
    }

    #[test]
    fn model_path_absolute_passthrough() {
        let m = ModelSettings {
            path: Some("/models/stt.onnx".into()),
        };
        assert_eq!(m.resolved_path().as_deref(), Some("/models/stt.onnx"));
    }

    #[test]
    fn model_path_expands_tilde() {
        let m = ModelSettings {
            path: Some("~/models/stt.onnx".into()),
        };
        let resolved = m.resolved_path().unwrap();
        assert!(!resolved.starts_with('~'), "tilde should be expanded: {resolved}");
        assert!(resolved.ends_with("/models/stt.onnx"));
    }

    #[test]
    fn log_level_filter() {
        assert_eq!(LogLevel::Debug.as_filter_str(), "debug");
        assert_eq!(LogLevel::default().as_filter_str(), "warn");
    }
}
