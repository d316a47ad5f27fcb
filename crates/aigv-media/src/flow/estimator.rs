//! Optical-flow estimators.

use std::path::Path;
use std::sync::Mutex;

use image::RgbImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use super::field::FlowField;
use super::padder::DEFAULT_PAD_MULTIPLE;
use crate::error::{MediaError, MediaResult};

/// Maps a pair of consecutive frames to a dense motion field.
///
/// Implementations are called from the blocking pool and must accept
/// inputs whose dimensions are a multiple of [`FlowEstimator::pad_multiple`].
pub trait FlowEstimator: Send + Sync {
    /// Estimator name for logging.
    fn name(&self) -> &'static str;

    /// Required input multiple; callers pad frames up to it.
    fn pad_multiple(&self) -> u32 {
        DEFAULT_PAD_MULTIPLE
    }

    /// Motion from `first` to `second`, at the inputs' resolution.
    fn estimate(&self, first: &RgbImage, second: &RgbImage) -> MediaResult<FlowField>;
}

/// RAFT-style estimator exported to ONNX.
///
/// Expects two `[1, 3, H, W]` float inputs with pixel values in `0..=255`
/// and produces a `[1, 2, H, W]` flow output.
pub struct OnnxFlowEstimator {
    session: Mutex<Session>,
    output_name: String,
}

impl OnnxFlowEstimator {
    /// Load a model from disk.
    pub fn new(model_path: impl AsRef<Path>) -> MediaResult<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(MediaError::model_not_found(model_path.display().to_string()));
        }

        let session = create_session(model_path)?;
        // Exports that return every refinement iteration list the final one last
        let output_name = session
            .outputs
            .last()
            .map(|o| o.name.clone())
            .ok_or_else(|| MediaError::internal("Flow model has no outputs"))?;

        info!(
            model_path = %model_path.display(),
            output = %output_name,
            "Flow estimator initialized"
        );

        Ok(Self {
            session: Mutex::new(session),
            output_name,
        })
    }
}

impl FlowEstimator for OnnxFlowEstimator {
    fn name(&self) -> &'static str {
        "onnx_raft"
    }

    fn estimate(&self, first: &RgbImage, second: &RgbImage) -> MediaResult<FlowField> {
        if first.dimensions() != second.dimensions() {
            return Err(MediaError::internal(format!(
                "Frame pair dimensions differ: {:?} vs {:?}",
                first.dimensions(),
                second.dimensions()
            )));
        }
        let (width, height) = first.dimensions();

        let a = image_tensor(first)?;
        let b = image_tensor(second)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::internal("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![a, b])
            .map_err(|e| MediaError::internal(format!("ONNX inference failed: {}", e)))?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| MediaError::internal(format!("Missing {} tensor", self.output_name)))?;

        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::internal(format!("Failed to extract tensor: {}", e)))?;

        FlowField::from_planar(width as usize, height as usize, data.to_vec())
    }
}

/// NCHW float tensor with raw 0..255 pixel values.
fn image_tensor(image: &RgbImage) -> MediaResult<Value> {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let mut chw_data: Vec<f32> = Vec::with_capacity(3 * h * w);

    for c in 0..3 {
        for pixel in image.pixels() {
            chw_data.push(pixel[c] as f32);
        }
    }

    let shape = vec![1usize, 3, h, w];
    Tensor::from_array((shape, chw_data.into_boxed_slice()))
        .map(Value::from)
        .map_err(|e| MediaError::internal(format!("Failed to create tensor: {}", e)))
}

/// Create ONNX Runtime session, preferring CUDA when compiled in.
fn create_session(model_path: &Path) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| MediaError::internal(format!("Failed to read model file: {}", e)))?;

    let builder = Session::builder()
        .map_err(|e| MediaError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::internal(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for flow estimation");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, using CPU");
    }

    debug!("Using CPU execution provider for flow estimation");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::internal(format!("Failed to load ONNX model: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model() {
        let result = OnnxFlowEstimator::new("/nonexistent/raft.onnx");
        assert!(matches!(result, Err(MediaError::ModelNotFound(_))));
    }
}
