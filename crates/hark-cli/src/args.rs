//! Command-line arguments and how they layer over settings.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use hark_settings::{
    AccelerationBackend, HarkSettings, InputLayout, LogLevel, WavMode, load_settings_from_path,
    parse_enum, settings_path,
};
use serde::de::DeserializeOwned;

/// Transcribe WAV files with an on-device ONNX model.
#[derive(Parser, Debug)]
#[command(name = "hark", version, about = "Transcribe WAV files with an on-device ONNX model")]
pub struct Cli {
    /// Serialized model (ONNX). Falls back to `model.path` in settings.
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// WAV files to transcribe, in order.
    #[arg(required = true)]
    pub audio: Vec<PathBuf>,

    /// Intra-op thread count.
    #[arg(long)]
    pub threads: Option<usize>,

    /// Acceleration backend: default, optimized-cpu, system-provided.
    #[arg(long, value_parser = setting_enum::<AccelerationBackend>)]
    pub backend: Option<AccelerationBackend>,

    /// Maximum output cells per run.
    #[arg(long)]
    pub scratch_capacity: Option<usize>,

    /// Input tensor layout: flat or batched.
    #[arg(long, value_parser = setting_enum::<InputLayout>)]
    pub input_layout: Option<InputLayout>,

    /// WAV handling: raw, strict, resample.
    #[arg(long, value_parser = setting_enum::<WavMode>)]
    pub wav_mode: Option<WavMode>,

    /// Per-file timeout in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Log level: trace, debug, info, warn, error. `RUST_LOG` wins.
    #[arg(long, value_parser = setting_enum::<LogLevel>)]
    pub log_level: Option<LogLevel>,

    /// Print one JSON object per file instead of plain text.
    #[arg(long)]
    pub json: bool,

    /// Settings file (default `~/.hark/settings.json`).
    #[arg(long)]
    pub settings: Option<PathBuf>,
}

impl Cli {
    /// Load settings (file, then env) and apply flags on top.
    pub fn resolve_settings(&self) -> Result<HarkSettings> {
        let path = match &self.settings {
            Some(path) => {
                if !path.exists() {
                    bail!("settings file not found: {}", path.display());
                }
                path.clone()
            }
            None => settings_path(),
        };
        let mut settings = load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        self.apply(&mut settings);
        settings.validate().context("Invalid option")?;
        Ok(settings)
    }

    /// Overwrite every setting the user passed a flag for.
    pub fn apply(&self, settings: &mut HarkSettings) {
        if let Some(model) = &self.model {
            settings.model.path = Some(model.to_string_lossy().into_owned());
        }
        if let Some(threads) = self.threads {
            settings.runtime.thread_count = threads;
        }
        if let Some(backend) = self.backend {
            settings.runtime.backend = backend;
        }
        if let Some(capacity) = self.scratch_capacity {
            settings.runtime.scratch_capacity = capacity;
        }
        if let Some(layout) = self.input_layout {
            settings.runtime.input_layout = layout;
        }
        if let Some(mode) = self.wav_mode {
            settings.audio.wav_mode = mode;
        }
        if let Some(ms) = self.timeout_ms {
            settings.runtime.run_timeout_ms = ms;
        }
        if let Some(level) = self.log_level {
            settings.logging.level = level;
        }
    }
}

/// Model path from resolved settings.
pub fn model_path(settings: &HarkSettings) -> Result<PathBuf> {
    settings
        .model
        .resolved_path()
        .map(PathBuf::from)
        .context("No model given: pass --model or set HARK_MODEL_PATH")
}

fn setting_enum<T: DeserializeOwned>(value: &str) -> std::result::Result<T, String> {
    parse_enum(value).ok_or_else(|| format!("unrecognized value `{value}`"))
}
