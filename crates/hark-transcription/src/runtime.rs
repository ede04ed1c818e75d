//! Model runtime lifecycle: load a blob into an engine session, run it over a
//! signal, release it.
//!
//! The runtime is engine-agnostic. An [`InferenceEngine`] turns a
//! [`ModelBlob`] into an [`ExecutionSession`]; the runtime owns that session
//! together with a preallocated integer scratch buffer and enforces the
//! `Unloaded -> Loaded -> Released` state machine around it.
//!
//! Runs are serialized: the session sits behind a mutex and each run holds it
//! for the full resize/execute/read-back sequence. [`ModelRuntime::release`]
//! first marks the runtime as closing, so runs that have not yet started fail
//! with [`TranscriptionError::State`], then waits for an in-flight run to
//! finish before dropping the session.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use hark_settings::{
    AccelerationBackend, DEFAULT_SCRATCH_CAPACITY, InputLayout, RuntimeSettings,
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::blob::ModelBlob;
use crate::types::{AudioSignal, OutputTensor, TranscriptionError};

/// Options applied when a model is loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Intra-op thread count. Must be at least 1.
    pub thread_count: usize,
    /// Acceleration backend.
    pub backend: AccelerationBackend,
    /// Output cells preallocated for read-back. Must be at least 1.
    pub scratch_capacity: usize,
    /// Shape the signal is bound to on the model input.
    pub input_layout: InputLayout,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            thread_count: 4,
            backend: AccelerationBackend::Default,
            scratch_capacity: DEFAULT_SCRATCH_CAPACITY,
            input_layout: InputLayout::Flat,
        }
    }
}

impl RuntimeOptions {
    /// Options from the runtime section of the settings file.
    pub fn from_settings(settings: &RuntimeSettings) -> Self {
        Self {
            thread_count: settings.thread_count,
            backend: settings.backend,
            scratch_capacity: settings.scratch_capacity,
            input_layout: settings.input_layout,
        }
    }

    /// Set the thread count.
    #[must_use]
    pub fn with_threads(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    /// Set the acceleration backend.
    #[must_use]
    pub fn with_backend(mut self, backend: AccelerationBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Set the scratch capacity.
    #[must_use]
    pub fn with_scratch_capacity(mut self, scratch_capacity: usize) -> Self {
        self.scratch_capacity = scratch_capacity;
        self
    }

    /// Set the input layout.
    #[must_use]
    pub fn with_input_layout(mut self, input_layout: InputLayout) -> Self {
        self.input_layout = input_layout;
        self
    }

    /// Reject options no engine could honor.
    pub fn validate(&self) -> Result<(), TranscriptionError> {
        if self.thread_count == 0 {
            return Err(TranscriptionError::ModelLoad(
                "thread count must be at least 1".into(),
            ));
        }
        if self.scratch_capacity == 0 {
            return Err(TranscriptionError::ModelLoad(
                "scratch capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Builds execution sessions from serialized models.
///
/// Implemented by [`OrtEngine`](crate::onnx::OrtEngine) for ONNX Runtime.
/// Other engines (or test doubles) plug in here.
pub trait InferenceEngine: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &'static str;

    /// Parse `blob` and build a session configured by `options`.
    ///
    /// Malformed bytes, an unavailable backend, or a graph the engine cannot
    /// execute are [`TranscriptionError::ModelLoad`].
    fn load(
        &self,
        blob: &ModelBlob,
        options: &RuntimeOptions,
    ) -> Result<Box<dyn ExecutionSession>, TranscriptionError>;
}

/// A loaded model with one float input and one integer output.
pub trait ExecutionSession: Send {
    /// Resize the input binding to `len` samples and allocate execution
    /// buffers for that shape.
    fn prepare(&mut self, len: usize) -> Result<(), TranscriptionError>;

    /// Run one forward pass with `input` as the sole input, writing output
    /// cells into `scratch` in order. Returns the output shape the model
    /// declared for this call, which may describe more cells than `scratch`
    /// holds.
    fn execute(
        &mut self,
        input: &[f32],
        scratch: &mut [i32],
    ) -> Result<Vec<usize>, TranscriptionError>;
}

/// Lifecycle state of a [`ModelRuntime`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeStatus {
    /// No model bound. A failed load leaves the runtime here.
    Unloaded,
    /// A session is bound and runs are accepted.
    Loaded,
    /// Terminal. The session has been dropped.
    Released,
}

impl RuntimeStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Loaded,
            2 => Self::Released,
            _ => Self::Unloaded,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Unloaded => 0,
            Self::Loaded => 1,
            Self::Released => 2,
        }
    }
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unloaded => "unloaded",
            Self::Loaded => "loaded",
            Self::Released => "released",
        })
    }
}

/// What was loaded, for logs and callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelInfo {
    /// Engine that built the session.
    pub engine: &'static str,
    /// SHA-256 of the model bytes.
    pub digest: String,
    /// Options the session was built with.
    pub options: RuntimeOptions,
}

struct LoadedModel {
    session: Box<dyn ExecutionSession>,
    scratch: Vec<i32>,
    info: ModelInfo,
}

enum State {
    Unloaded,
    Loaded(Box<LoadedModel>),
    Released,
}

/// Owns one execution session and its output scratch buffer.
pub struct ModelRuntime {
    engine: Arc<dyn InferenceEngine>,
    state: Mutex<State>,
    status: AtomicU8,
    closing: AtomicBool,
}

impl ModelRuntime {
    /// An unloaded runtime backed by `engine`.
    pub fn new(engine: Arc<dyn InferenceEngine>) -> Self {
        Self {
            engine,
            state: Mutex::new(State::Unloaded),
            status: AtomicU8::new(RuntimeStatus::Unloaded.as_u8()),
            closing: AtomicBool::new(false),
        }
    }

    /// Current lifecycle state. Does not wait for an in-flight run.
    pub fn status(&self) -> RuntimeStatus {
        RuntimeStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    /// Details of the bound model, if loaded.
    pub fn model_info(&self) -> Option<ModelInfo> {
        match &*self.state.lock() {
            State::Loaded(model) => Some(model.info.clone()),
            State::Unloaded | State::Released => None,
        }
    }

    /// Parse `blob` and bind the resulting session.
    ///
    /// Only valid from `Unloaded`. On failure the runtime stays `Unloaded` and
    /// a later load may be attempted, for example with another backend.
    pub fn load(
        &self,
        blob: &ModelBlob,
        options: &RuntimeOptions,
    ) -> Result<ModelInfo, TranscriptionError> {
        options.validate()?;

        let mut state = self.state.lock();
        match &*state {
            State::Unloaded => {}
            State::Loaded(_) => {
                return Err(TranscriptionError::State(
                    "load called on a runtime that already holds a model".into(),
                ));
            }
            State::Released => {
                return Err(TranscriptionError::State(
                    "load called after release".into(),
                ));
            }
        }

        info!(
            engine = self.engine.name(),
            digest = blob.short_digest(),
            bytes = blob.len(),
            backend = %options.backend,
            threads = options.thread_count,
            "loading model"
        );
        let session = self.engine.load(blob, options)?;

        let info = ModelInfo {
            engine: self.engine.name(),
            digest: blob.digest().to_string(),
            options: options.clone(),
        };
        *state = State::Loaded(Box::new(LoadedModel {
            session,
            scratch: vec![0; options.scratch_capacity],
            info: info.clone(),
        }));
        self.status
            .store(RuntimeStatus::Loaded.as_u8(), Ordering::SeqCst);
        info!(scratch_capacity = options.scratch_capacity, "model ready");
        Ok(info)
    }

    /// Run the model over `signal` and read back the declared output cells.
    ///
    /// The input binding is resized to the signal length before every run.
    /// An output that declares more cells than the scratch capacity is an
    /// overflow error; nothing is truncated.
    pub fn run(&self, signal: &AudioSignal) -> Result<OutputTensor, TranscriptionError> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(TranscriptionError::State("run called after release".into()));
        }

        let mut state = self.state.lock();
        let model = match &mut *state {
            State::Loaded(model) => model,
            State::Unloaded => {
                return Err(TranscriptionError::State("run called before load".into()));
            }
            State::Released => {
                return Err(TranscriptionError::State("run called after release".into()));
            }
        };

        let len = signal.len();
        model.session.prepare(len)?;
        model.scratch.fill(0);
        let shape = model.session.execute(signal.samples(), &mut model.scratch)?;

        let declared = declared_cells(&shape)?;
        let capacity = model.scratch.len();
        if declared > capacity {
            return Err(TranscriptionError::InferenceRuntime(format!(
                "output overflow: model declared {declared} cells {shape:?}, scratch holds {capacity}"
            )));
        }

        debug!(samples = len, ?shape, cells = declared, "run complete");
        Ok(OutputTensor::from(model.scratch[..declared].to_vec()))
    }

    /// Drop the session and scratch buffer. Terminal.
    ///
    /// New runs are rejected as soon as this is called; a run already holding
    /// the session completes first.
    pub fn release(&self) -> Result<(), TranscriptionError> {
        let was_closing = self.closing.swap(true, Ordering::SeqCst);

        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, State::Released) {
            State::Loaded(model) => {
                self.status
                    .store(RuntimeStatus::Released.as_u8(), Ordering::SeqCst);
                info!(engine = model.info.engine, "model released");
                drop(model);
                Ok(())
            }
            State::Unloaded => {
                *state = State::Unloaded;
                self.closing.store(was_closing, Ordering::SeqCst);
                Err(TranscriptionError::State(
                    "release called before load".into(),
                ))
            }
            State::Released => Err(TranscriptionError::State(
                "release called twice".into(),
            )),
        }
    }

    /// Scratch capacity of the bound model, if loaded.
    pub fn scratch_capacity(&self) -> Option<usize> {
        match &*self.state.lock() {
            State::Loaded(model) => Some(model.scratch.len()),
            State::Unloaded | State::Released => None,
        }
    }
}

impl fmt::Debug for ModelRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRuntime")
            .field("engine", &self.engine.name())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Cell count described by an output shape. A rank-0 output is one cell.
fn declared_cells(shape: &[usize]) -> Result<usize, TranscriptionError> {
    shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| {
            TranscriptionError::InferenceRuntime(format!(
                "output shape {shape:?} overflows the address space"
            ))
        })
}
