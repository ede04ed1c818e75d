//! Fixtures shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::blob::ModelBlob;
use crate::runtime::{ExecutionSession, InferenceEngine, RuntimeOptions};
use crate::types::TranscriptionError;

/// Prefix a blob must carry for [`ScriptedEngine`] to accept it.
pub(crate) const MODEL_MAGIC: &[u8] = b"HARKTEST";

pub(crate) fn scripted_blob() -> ModelBlob {
    let mut bytes = MODEL_MAGIC.to_vec();
    bytes.extend_from_slice(b"-graph");
    ModelBlob::new(bytes)
}

/// Canonical 44-byte-header PCM WAV. `samples` are interleaved; for 8-bit
/// output each sample keeps its high byte, offset to unsigned.
pub(crate) fn wav_bytes(sample_rate: u32, channels: u16, bits: u16, samples: &[i16]) -> Vec<u8> {
    let bytes_per_sample = u32::from(bits / 8);
    let block_align = u32::from(channels) * bytes_per_sample;
    let byte_rate = sample_rate * block_align;
    let data_len = u32::try_from(samples.len()).unwrap() * bytes_per_sample;

    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&u16::try_from(block_align).unwrap().to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for &s in samples {
        if bits == 8 {
            out.push(((s >> 8) as u8) ^ 0x80);
        } else {
            out.extend_from_slice(&s.to_le_bytes());
        }
    }
    out
}

/// Engine that accepts blobs starting with [`MODEL_MAGIC`] and replays a
/// fixed token sequence on every run.
pub(crate) struct ScriptedEngine {
    tokens: Vec<i32>,
    delay: Duration,
    sparse: bool,
    pub loads: Arc<AtomicUsize>,
    pub runs: Arc<AtomicUsize>,
    pub prepared: Arc<Mutex<Vec<usize>>>,
    pub peak_concurrency: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    pub(crate) fn new(tokens: Vec<i32>) -> Self {
        Self {
            tokens,
            delay: Duration::ZERO,
            sparse: false,
            loads: Arc::default(),
            runs: Arc::default(),
            prepared: Arc::default(),
            peak_concurrency: Arc::default(),
            active: Arc::default(),
        }
    }

    /// Sleep this long inside every run.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Declare every token but write only the first.
    pub(crate) fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }
}

impl InferenceEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn load(
        &self,
        blob: &ModelBlob,
        _options: &RuntimeOptions,
    ) -> Result<Box<dyn ExecutionSession>, TranscriptionError> {
        let _ = self.loads.fetch_add(1, Ordering::SeqCst);
        if !blob.as_bytes().starts_with(MODEL_MAGIC) {
            return Err(TranscriptionError::ModelLoad("unrecognized model format".into()));
        }
        Ok(Box::new(ScriptedSession {
            tokens: self.tokens.clone(),
            delay: self.delay,
            sparse: self.sparse,
            bound: None,
            runs: Arc::clone(&self.runs),
            prepared: Arc::clone(&self.prepared),
            peak_concurrency: Arc::clone(&self.peak_concurrency),
            active: Arc::clone(&self.active),
        }))
    }
}

struct ScriptedSession {
    tokens: Vec<i32>,
    delay: Duration,
    sparse: bool,
    bound: Option<usize>,
    runs: Arc<AtomicUsize>,
    prepared: Arc<Mutex<Vec<usize>>>,
    peak_concurrency: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
}

impl ExecutionSession for ScriptedSession {
    fn prepare(&mut self, len: usize) -> Result<(), TranscriptionError> {
        if len == 0 {
            return Err(TranscriptionError::InferenceRuntime("empty input".into()));
        }
        self.prepared.lock().push(len);
        self.bound = Some(len);
        Ok(())
    }

    fn execute(
        &mut self,
        input: &[f32],
        scratch: &mut [i32],
    ) -> Result<Vec<usize>, TranscriptionError> {
        assert_eq!(self.bound, Some(input.len()), "execute without matching prepare");
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.peak_concurrency.fetch_max(now, Ordering::SeqCst);
        let _ = self.runs.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let written = if self.sparse { 1 } else { self.tokens.len() };
        for (dst, &src) in scratch.iter_mut().zip(self.tokens.iter().take(written)) {
            *dst = src;
        }

        let _ = self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![self.tokens.len()])
    }
}
