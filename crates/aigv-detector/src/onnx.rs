//! ONNX Runtime classifier adapter.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use aigv_models::Branch;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use crate::classifier::{sigmoid, BranchClassifier};
use crate::error::{DetectError, DetectResult};
use crate::preprocess::ImageTensor;

/// Binary classifier exported to ONNX.
///
/// Takes one `[1, 3, H, W]` float input and returns a single logit.
pub struct OnnxBranchClassifier {
    session: Mutex<Session>,
    output_name: String,
    branch: Branch,
    model_path: PathBuf,
}

impl OnnxBranchClassifier {
    pub fn new(model_path: &Path, branch: Branch) -> DetectResult<Self> {
        let session = create_session(model_path)
            .map_err(|e| DetectError::classifier(branch, model_path, e))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| DetectError::classifier(branch, model_path, "model has no outputs"))?;

        info!(
            branch = %branch,
            model_path = %model_path.display(),
            "ONNX branch classifier initialized"
        );

        Ok(Self {
            session: Mutex::new(session),
            output_name,
            branch,
            model_path: model_path.to_path_buf(),
        })
    }

    fn error(&self, message: impl Into<String>) -> DetectError {
        DetectError::classifier(self.branch, &self.model_path, message)
    }
}

impl BranchClassifier for OnnxBranchClassifier {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn classify(&self, input: &ImageTensor) -> DetectResult<f32> {
        let tensor: Value = Tensor::from_array((input.shape().to_vec(), input.data().to_vec().into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| self.error(format!("Failed to create tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| self.error("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| self.error(format!("ONNX inference failed: {}", e)))?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| self.error(format!("Missing {} tensor", self.output_name)))?;

        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| self.error(format!("Failed to extract tensor: {}", e)))?;

        let logit = data
            .first()
            .copied()
            .ok_or_else(|| self.error("Empty output tensor"))?;

        Ok(sigmoid(logit))
    }
}

/// Create ONNX Runtime session, preferring CUDA when compiled in.
fn create_session(model_path: &Path) -> Result<Session, String> {
    let model_bytes =
        std::fs::read(model_path).map_err(|e| format!("Failed to read model file: {}", e))?;

    let builder = Session::builder()
        .map_err(|e| format!("Failed to create session builder: {}", e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| format!("Failed to set optimization level: {}", e))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for branch classifier");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, using CPU");
    }

    debug!("Using CPU execution provider for branch classifier");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| format!("Failed to load ONNX model: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_model_bytes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.onnx");
        std::fs::write(&path, b"definitely not protobuf").unwrap();

        let result = OnnxBranchClassifier::new(&path, Branch::Original);
        assert!(matches!(result, Err(DetectError::Classifier { .. })));
    }
}
