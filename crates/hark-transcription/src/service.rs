//! Async host around the blocking pipeline.

use std::sync::Arc;
use std::time::Duration;

use hark_settings::HarkSettings;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::audio::AudioDecoder;
use crate::blob::ModelBlob;
use crate::pipeline::InferencePipeline;
use crate::runtime::RuntimeOptions;
use crate::types::{ResultExt, Transcript, TranscriptionError};

/// Loads a model once, then serves transcriptions from the tokio blocking
/// pool with a per-run timeout.
///
/// Requests are admitted one at a time, and a request's timer starts only
/// once it is admitted, so time spent queued behind other requests does not
/// count against it. A run that times out keeps its blocking thread and its
/// admission until the engine returns; the next request waits behind it
/// before its own timer starts.
#[derive(Debug, Clone)]
pub struct TranscriptionService {
    pipeline: Arc<InferencePipeline>,
    admission: Arc<Semaphore>,
    run_timeout: Duration,
}

impl TranscriptionService {
    /// Load `blob` into `pipeline` on a blocking thread.
    pub async fn start(
        pipeline: InferencePipeline,
        blob: ModelBlob,
        options: RuntimeOptions,
        run_timeout: Duration,
    ) -> Result<Self, TranscriptionError> {
        let pipeline = Arc::new(pipeline);
        let loader = Arc::clone(&pipeline);
        tokio::task::spawn_blocking(move || loader.prepare(&blob, &options))
            .await
            .inference("load task")??;
        info!(timeout_ms = run_timeout.as_millis(), "transcription service ready");
        Ok(Self {
            pipeline,
            admission: Arc::new(Semaphore::new(1)),
            run_timeout,
        })
    }

    /// ONNX Runtime service configured from settings.
    pub async fn from_settings(
        settings: &HarkSettings,
        blob: ModelBlob,
    ) -> Result<Self, TranscriptionError> {
        let pipeline = InferencePipeline::onnx(AudioDecoder::new(settings.audio.wav_mode));
        Self::start(
            pipeline,
            blob,
            RuntimeOptions::from_settings(&settings.runtime),
            Duration::from_millis(settings.runtime.run_timeout_ms),
        )
        .await
    }

    /// Transcribe WAV bytes.
    pub async fn transcribe(&self, audio: Vec<u8>) -> Result<Transcript, TranscriptionError> {
        let permit = Arc::clone(&self.admission)
            .acquire_owned()
            .await
            .inference("admission gate")?;
        debug!(bytes = audio.len(), "transcription admitted");

        let pipeline = Arc::clone(&self.pipeline);
        let task = tokio::task::spawn_blocking(move || {
            let result = pipeline.transcribe_loaded(&audio);
            drop(permit);
            result
        });
        match tokio::time::timeout(self.run_timeout, task).await {
            Ok(joined) => joined.inference("inference task")?,
            Err(_) => {
                warn!(timeout_ms = self.run_timeout.as_millis(), "transcription timed out");
                Err(TranscriptionError::InferenceRuntime(format!(
                    "timed out after {} ms",
                    self.run_timeout.as_millis()
                )))
            }
        }
    }

    /// Release the model, waiting for any in-flight run.
    pub async fn release(&self) -> Result<(), TranscriptionError> {
        let pipeline = Arc::clone(&self.pipeline);
        tokio::task::spawn_blocking(move || pipeline.release())
            .await
            .inference("release task")?
    }

    /// The shared pipeline.
    pub fn pipeline(&self) -> &Arc<InferencePipeline> {
        &self.pipeline
    }
}
