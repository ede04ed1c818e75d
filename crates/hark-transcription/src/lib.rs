//! On-device speech-to-text over a single ONNX model.
//!
//! # Architecture
//!
//! ```text
//! WAV bytes → AudioDecoder (16 kHz mono f32)
//! → ModelRuntime (resize input to [n], forward pass, read back i32 cells)
//! → TranscriptDecoder (non-zero cell → code point)
//! → Transcript
//! ```
//!
//! [`InferencePipeline`] composes the stages and is blocking.
//! [`TranscriptionService`] hosts it on the tokio blocking pool with a
//! per-run timeout.

#![deny(unsafe_code)]

pub mod audio;
pub mod blob;
pub mod decoder;
pub mod onnx;
pub mod pipeline;
pub mod runtime;
pub mod service;
pub mod types;

#[cfg(test)]
mod test_support;

pub use audio::{AudioDecoder, TARGET_SAMPLE_RATE, read_audio_file};
pub use blob::ModelBlob;
pub use decoder::{CodePointDecoder, TokenDecoder, TranscriptDecoder};
pub use onnx::OrtEngine;
pub use pipeline::InferencePipeline;
pub use runtime::{
    ExecutionSession, InferenceEngine, ModelInfo, ModelRuntime, RuntimeOptions, RuntimeStatus,
};
pub use service::TranscriptionService;
pub use types::{AudioSignal, OutputTensor, ResultExt, Transcript, TranscriptionError};

pub use hark_settings::{AccelerationBackend, InputLayout, WavMode};
