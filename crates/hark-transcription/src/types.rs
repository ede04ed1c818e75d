//! Core types for the transcription pipeline.

use std::fmt;

/// Result of transcribing one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    /// The decoded text. Empty when the model emitted only padding.
    pub text: String,
    /// Duration of the input audio in seconds.
    pub duration_seconds: f64,
    /// Number of output cells the model declared for this call.
    pub token_count: usize,
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Normalized mono samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSignal {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioSignal {
    /// Wrap samples recorded at `sample_rate` Hz.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// The samples, in original order.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when no samples were decoded.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds.
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Integer token codes read back from the model, exactly as many as the model
/// declared for the call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputTensor {
    tokens: Vec<i32>,
}

impl OutputTensor {
    /// Token codes in output order.
    pub fn as_slice(&self) -> &[i32] {
        &self.tokens
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True for a zero-length output.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl From<Vec<i32>> for OutputTensor {
    fn from(tokens: Vec<i32>) -> Self {
        Self { tokens }
    }
}

/// Errors that can occur during transcription.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    /// The audio byte source could not be read.
    #[error("audio read error: {0}")]
    AudioRead(String),

    /// The audio container or sample format is not what the pipeline accepts.
    #[error("malformed audio: {0}")]
    MalformedAudio(String),

    /// The model blob is invalid, the options are invalid, or the requested
    /// backend is unavailable.
    #[error("model load error: {0}")]
    ModelLoad(String),

    /// Resize, allocation, execution or read-back failed, or the run timed out.
    #[error("inference error: {0}")]
    InferenceRuntime(String),

    /// An operation was invoked in the wrong lifecycle state.
    #[error("invalid state: {0}")]
    State(String),
}

impl TranscriptionError {
    /// Whether the caller may retry, typically with a different backend.
    ///
    /// Audio and state errors will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ModelLoad(_) | Self::InferenceRuntime(_))
    }
}

/// Extension trait to reduce `.map_err()` boilerplate when wrapping errors into `TranscriptionError`.
pub trait ResultExt<T> {
    /// Wrap the error as [`TranscriptionError::AudioRead`] with `context` prefix.
    fn audio_read(self, context: &str) -> Result<T, TranscriptionError>;
    /// Wrap the error as [`TranscriptionError::MalformedAudio`] with `context` prefix.
    fn malformed(self, context: &str) -> Result<T, TranscriptionError>;
    /// Wrap the error as [`TranscriptionError::ModelLoad`] with `context` prefix.
    fn model_load(self, context: &str) -> Result<T, TranscriptionError>;
    /// Wrap the error as [`TranscriptionError::InferenceRuntime`] with `context` prefix.
    fn inference(self, context: &str) -> Result<T, TranscriptionError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn audio_read(self, context: &str) -> Result<T, TranscriptionError> {
        self.map_err(|e| TranscriptionError::AudioRead(format!("{context}: {e}")))
    }
    fn malformed(self, context: &str) -> Result<T, TranscriptionError> {
        self.map_err(|e| TranscriptionError::MalformedAudio(format!("{context}: {e}")))
    }
    fn model_load(self, context: &str) -> Result<T, TranscriptionError> {
        self.map_err(|e| TranscriptionError::ModelLoad(format!("{context}: {e}")))
    }
    fn inference(self, context: &str) -> Result<T, TranscriptionError> {
        self.map_err(|e| TranscriptionError::InferenceRuntime(format!("{context}: {e}")))
    }
}
