//! ONNX Runtime engine.

use hark_settings::{AccelerationBackend, InputLayout};
use ort::session::Session;
use ort::session::builder::SessionBuilder;
use ort::value::Tensor;
use tracing::debug;

use crate::blob::ModelBlob;
use crate::runtime::{ExecutionSession, InferenceEngine, RuntimeOptions};
use crate::types::{ResultExt, TranscriptionError};

/// Builds ONNX Runtime sessions from in-memory model bytes.
///
/// `OptimizedCpu` needs the `xnnpack` feature. `SystemProvided` needs
/// `coreml` on Apple targets or `nnapi` on Android. Requesting a backend the
/// build lacks fails the load; there is no silent fallback to the default
/// kernels.
#[derive(Clone, Copy, Debug, Default)]
pub struct OrtEngine;

impl InferenceEngine for OrtEngine {
    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn load(
        &self,
        blob: &ModelBlob,
        options: &RuntimeOptions,
    ) -> Result<Box<dyn ExecutionSession>, TranscriptionError> {
        let builder = Session::builder()
            .model_load("session builder")?
            .with_intra_threads(options.thread_count)
            .model_load("set threads")?;
        let builder = with_backend(builder, options.backend)?;
        let session = builder
            .commit_from_memory(blob.as_bytes())
            .model_load("parse model")?;
        debug!(backend = %options.backend, layout = ?options.input_layout, "onnx session built");

        Ok(Box::new(OrtSession {
            session,
            layout: options.input_layout,
            bound: None,
        }))
    }
}

fn with_backend(
    builder: SessionBuilder,
    backend: AccelerationBackend,
) -> Result<SessionBuilder, TranscriptionError> {
    match backend {
        AccelerationBackend::Default => Ok(builder),
        AccelerationBackend::OptimizedCpu => optimized_cpu(builder),
        AccelerationBackend::SystemProvided => system_provided(builder),
    }
}

#[cfg(feature = "xnnpack")]
fn optimized_cpu(builder: SessionBuilder) -> Result<SessionBuilder, TranscriptionError> {
    builder
        .with_execution_providers([ort::ep::XNNPACK::default().build().error_on_failure()])
        .model_load("register XNNPACK")
}

#[cfg(not(feature = "xnnpack"))]
fn optimized_cpu(_builder: SessionBuilder) -> Result<SessionBuilder, TranscriptionError> {
    Err(unavailable(AccelerationBackend::OptimizedCpu, "xnnpack"))
}

#[cfg(all(feature = "coreml", any(target_os = "macos", target_os = "ios")))]
fn system_provided(builder: SessionBuilder) -> Result<SessionBuilder, TranscriptionError> {
    builder
        .with_execution_providers([ort::ep::CoreML::default().build().error_on_failure()])
        .model_load("register CoreML")
}

#[cfg(all(feature = "nnapi", target_os = "android"))]
fn system_provided(builder: SessionBuilder) -> Result<SessionBuilder, TranscriptionError> {
    builder
        .with_execution_providers([ort::ep::NNAPI::default().build().error_on_failure()])
        .model_load("register NNAPI")
}

#[cfg(not(any(
    all(feature = "coreml", any(target_os = "macos", target_os = "ios")),
    all(feature = "nnapi", target_os = "android")
)))]
fn system_provided(_builder: SessionBuilder) -> Result<SessionBuilder, TranscriptionError> {
    Err(unavailable(
        AccelerationBackend::SystemProvided,
        "coreml (Apple) or nnapi (Android)",
    ))
}

#[cfg(any(
    not(feature = "xnnpack"),
    not(any(
        all(feature = "coreml", any(target_os = "macos", target_os = "ios")),
        all(feature = "nnapi", target_os = "android")
    ))
))]
fn unavailable(backend: AccelerationBackend, feature: &str) -> TranscriptionError {
    TranscriptionError::ModelLoad(format!(
        "backend {backend} unavailable: built without the {feature} feature"
    ))
}

struct OrtSession {
    session: Session,
    layout: InputLayout,
    bound: Option<usize>,
}

impl OrtSession {
    fn input_shape(&self, len: usize) -> Result<Vec<i64>, TranscriptionError> {
        let n = i64::try_from(len).inference("input length")?;
        Ok(match self.layout {
            InputLayout::Flat => vec![n],
            InputLayout::Batched => vec![1, n],
        })
    }
}

impl ExecutionSession for OrtSession {
    fn prepare(&mut self, len: usize) -> Result<(), TranscriptionError> {
        if len == 0 {
            return Err(TranscriptionError::InferenceRuntime(
                "cannot bind an empty signal".into(),
            ));
        }
        let _ = self.input_shape(len)?;
        self.bound = Some(len);
        Ok(())
    }

    fn execute(
        &mut self,
        input: &[f32],
        scratch: &mut [i32],
    ) -> Result<Vec<usize>, TranscriptionError> {
        if self.bound != Some(input.len()) {
            return Err(TranscriptionError::InferenceRuntime(format!(
                "input of {} samples does not match prepared binding {:?}",
                input.len(),
                self.bound
            )));
        }
        let shape = self.input_shape(input.len())?;
        let tensor = Tensor::from_array((shape, input.to_vec())).inference("input tensor")?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .inference("forward pass")?;
        let output = &outputs[0];

        if let Ok((shape, cells)) = output.try_extract_tensor::<i32>() {
            for (dst, &src) in scratch.iter_mut().zip(cells) {
                *dst = src;
            }
            return output_dims(shape);
        }

        let (shape, cells) = output
            .try_extract_tensor::<i64>()
            .inference("read output (expected int32 or int64)")?;
        for (dst, &src) in scratch.iter_mut().zip(cells) {
            *dst = i32::try_from(src).inference("narrow int64 output cell")?;
        }
        output_dims(shape)
    }
}

fn output_dims(shape: &[i64]) -> Result<Vec<usize>, TranscriptionError> {
    shape
        .iter()
        .map(|&d| usize::try_from(d).inference("output dimension"))
        .collect()
}
