//! WAV bytes in, transcript out.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::audio::AudioDecoder;
use crate::blob::ModelBlob;
use crate::decoder::{TokenDecoder, TranscriptDecoder};
use crate::onnx::OrtEngine;
use crate::runtime::{InferenceEngine, ModelRuntime, RuntimeOptions};
use crate::types::{AudioSignal, Transcript, TranscriptionError};

/// Blob digest and options the runtime was loaded with.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    digest: String,
    options: RuntimeOptions,
}

/// Composes audio decoding, the model runtime and token decoding.
///
/// The first successful call loads the model; every later call reuses it.
/// A pipeline is bound to one model for life: asking it for a different blob
/// or different options is a [`TranscriptionError::State`].
///
/// Blocking by contract. Async hosts go through
/// [`TranscriptionService`](crate::service::TranscriptionService).
pub struct InferencePipeline {
    audio: AudioDecoder,
    runtime: ModelRuntime,
    decoder: TranscriptDecoder,
    binding: Mutex<Option<Binding>>,
}

impl InferencePipeline {
    /// Pipeline over an arbitrary engine.
    pub fn new(engine: Arc<dyn InferenceEngine>, audio: AudioDecoder) -> Self {
        Self {
            audio,
            runtime: ModelRuntime::new(engine),
            decoder: TranscriptDecoder::default(),
            binding: Mutex::new(None),
        }
    }

    /// Pipeline over ONNX Runtime.
    pub fn onnx(audio: AudioDecoder) -> Self {
        Self::new(Arc::new(OrtEngine), audio)
    }

    /// Replace the token rule.
    #[must_use]
    pub fn with_token_decoder(mut self, rule: impl TokenDecoder + 'static) -> Self {
        self.decoder = TranscriptDecoder::new(rule);
        self
    }

    /// The underlying runtime, for status checks.
    pub fn runtime(&self) -> &ModelRuntime {
        &self.runtime
    }

    /// Load `blob` with `options` unless already bound to exactly them.
    pub fn prepare(
        &self,
        blob: &ModelBlob,
        options: &RuntimeOptions,
    ) -> Result<(), TranscriptionError> {
        let mut binding = self.binding.lock();
        if let Some(bound) = binding.as_ref() {
            if bound.digest == blob.digest() && bound.options == *options {
                return Ok(());
            }
            warn!(
                bound = bound.digest.as_str(),
                requested = blob.digest(),
                "pipeline already bound to another model or options"
            );
            return Err(TranscriptionError::State(
                "pipeline is bound to a different model or options".into(),
            ));
        }

        let _ = self.runtime.load(blob, options)?;
        *binding = Some(Binding {
            digest: blob.digest().to_string(),
            options: options.clone(),
        });
        Ok(())
    }

    /// Decode `audio`, load the model on first use, run, decode tokens.
    ///
    /// Audio is decoded before the model is touched, so a malformed file
    /// never triggers a load.
    pub fn transcribe(
        &self,
        audio: &[u8],
        blob: &ModelBlob,
        options: &RuntimeOptions,
    ) -> Result<Transcript, TranscriptionError> {
        let signal = self.audio.decode(audio)?;
        self.prepare(blob, options)?;
        self.transcribe_signal(&signal)
    }

    /// Transcribe with the model bound by an earlier [`prepare`](Self::prepare).
    pub fn transcribe_loaded(&self, audio: &[u8]) -> Result<Transcript, TranscriptionError> {
        let signal = self.audio.decode(audio)?;
        self.transcribe_signal(&signal)
    }

    /// Run an already-decoded signal.
    pub fn transcribe_signal(&self, signal: &AudioSignal) -> Result<Transcript, TranscriptionError> {
        let output = self.runtime.run(signal)?;
        let transcript = self.decoder.decode(&output, signal.duration_seconds());
        debug!(
            samples = signal.len(),
            tokens = transcript.token_count,
            chars = transcript.text.chars().count(),
            "transcribed"
        );
        Ok(transcript)
    }

    /// Release the model. Terminal for this pipeline.
    pub fn release(&self) -> Result<(), TranscriptionError> {
        self.runtime.release()
    }
}

impl std::fmt::Debug for InferencePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferencePipeline")
            .field("audio", &self.audio)
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use assert_matches::assert_matches;
    use hark_settings::{AccelerationBackend, WavMode};

    use super::*;
    use crate::runtime::RuntimeStatus;
    use crate::test_support::{ScriptedEngine, scripted_blob, wav_bytes};

    fn one_second() -> Vec<u8> {
        wav_bytes(16_000, 1, 16, &vec![0; 16_000])
    }

    #[test]
    fn hello_end_to_end() {
        let engine = ScriptedEngine::new(vec![72, 101, 108, 108, 111, 0, 0]);
        let pipeline = InferencePipeline::new(Arc::new(engine), AudioDecoder::default());
        let t = pipeline
            .transcribe(&one_second(), &scripted_blob(), &RuntimeOptions::default())
            .unwrap();
        assert_eq!(t.text, "Hello");
        assert_eq!(t.token_count, 7);
        assert!((t.duration_seconds - 1.0).abs() < 1e-9);
    }

    #[test]
    fn loads_once_across_calls() {
        let engine = ScriptedEngine::new(vec![72, 0, 73, 0, 0]);
        let loads = Arc::clone(&engine.loads);
        let runs = Arc::clone(&engine.runs);
        let pipeline = InferencePipeline::new(Arc::new(engine), AudioDecoder::default());

        for _ in 0..3 {
            let t = pipeline
                .transcribe(&one_second(), &scripted_blob(), &RuntimeOptions::default())
                .unwrap();
            assert_eq!(t.text, "HI");
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn non_model_bytes_fail_without_running() {
        let engine = ScriptedEngine::new(vec![1]);
        let runs = Arc::clone(&engine.runs);
        let pipeline = InferencePipeline::new(Arc::new(engine), AudioDecoder::default());
        let err = pipeline
            .transcribe(
                &one_second(),
                &ModelBlob::new(b"garbage".to_vec()),
                &RuntimeOptions::default(),
            )
            .unwrap_err();
        assert_matches!(err, TranscriptionError::ModelLoad(_));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.runtime().status(), RuntimeStatus::Unloaded);
    }

    #[test]
    fn malformed_audio_never_loads() {
        let engine = ScriptedEngine::new(vec![1]);
        let loads = Arc::clone(&engine.loads);
        let pipeline = InferencePipeline::new(Arc::new(engine), AudioDecoder::default());
        let stereo = wav_bytes(16_000, 2, 16, &[0; 64]);
        let err = pipeline
            .transcribe(&stereo, &scripted_blob(), &RuntimeOptions::default())
            .unwrap_err();
        assert_matches!(err, TranscriptionError::MalformedAudio(_));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rebinding_is_state_error() {
        let pipeline = InferencePipeline::new(
            Arc::new(ScriptedEngine::new(vec![1])),
            AudioDecoder::default(),
        );
        pipeline
            .prepare(&scripted_blob(), &RuntimeOptions::default())
            .unwrap();

        let mut other = crate::test_support::MODEL_MAGIC.to_vec();
        other.extend_from_slice(b"-other");
        assert_matches!(
            pipeline.prepare(&ModelBlob::new(other), &RuntimeOptions::default()),
            Err(TranscriptionError::State(_))
        );
        assert_matches!(
            pipeline.prepare(
                &scripted_blob(),
                &RuntimeOptions::default().with_backend(AccelerationBackend::OptimizedCpu)
            ),
            Err(TranscriptionError::State(_))
        );
        pipeline
            .prepare(&scripted_blob(), &RuntimeOptions::default())
            .unwrap();
    }

    #[test]
    fn transcribe_loaded_before_prepare_is_state_error() {
        let pipeline = InferencePipeline::new(
            Arc::new(ScriptedEngine::new(vec![1])),
            AudioDecoder::default(),
        );
        assert_matches!(
            pipeline.transcribe_loaded(&one_second()),
            Err(TranscriptionError::State(_))
        );
    }

    #[test]
    fn release_then_transcribe_is_state_error() {
        let pipeline = InferencePipeline::new(
            Arc::new(ScriptedEngine::new(vec![65])),
            AudioDecoder::default(),
        );
        pipeline
            .prepare(&scripted_blob(), &RuntimeOptions::default())
            .unwrap();
        assert_eq!(pipeline.transcribe_loaded(&one_second()).unwrap().text, "A");
        pipeline.release().unwrap();
        assert_matches!(
            pipeline.transcribe(&one_second(), &scripted_blob(), &RuntimeOptions::default()),
            Err(TranscriptionError::State(_))
        );
    }

    #[test]
    fn empty_raw_signal_is_clean_runtime_error() {
        let pipeline = InferencePipeline::new(
            Arc::new(ScriptedEngine::new(vec![1])),
            AudioDecoder::new(WavMode::Raw),
        );
        let err = pipeline
            .transcribe(&wav_bytes(16_000, 1, 16, &[]), &scripted_blob(), &RuntimeOptions::default())
            .unwrap_err();
        assert_matches!(err, TranscriptionError::InferenceRuntime(_));
        assert_eq!(pipeline.runtime().status(), RuntimeStatus::Loaded);
    }

    #[test]
    fn custom_token_decoder() {
        struct Upper;
        impl TokenDecoder for Upper {
            fn decode(&self, tokens: &[i32]) -> String {
                crate::decoder::CodePointDecoder.decode(tokens).to_uppercase()
            }
        }
        let pipeline = InferencePipeline::new(
            Arc::new(ScriptedEngine::new(vec![104, 105])),
            AudioDecoder::default(),
        )
        .with_token_decoder(Upper);
        let t = pipeline
            .transcribe(&one_second(), &scripted_blob(), &RuntimeOptions::default())
            .unwrap();
        assert_eq!(t.text, "HI");
    }
}
