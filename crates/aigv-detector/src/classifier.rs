//! Branch classifier capability and adapter selection.

use std::path::Path;

use aigv_models::{Branch, ComputeDevice};

use crate::candle::CandleBranchClassifier;
use crate::error::{DetectError, DetectResult};
use crate::onnx::OnnxBranchClassifier;
use crate::preprocess::ImageTensor;

/// Maps one preprocessed image to a fake-probability in `[0, 1]`.
///
/// The RGB and flow branches use the same capability with different
/// weights.
pub trait BranchClassifier: Send + Sync {
    /// Adapter name for logging.
    fn name(&self) -> &'static str;

    /// Sigmoid-activated probability that `input` is AI-generated.
    fn classify(&self, input: &ImageTensor) -> DetectResult<f32>;
}

/// Logistic function.
pub fn sigmoid(logit: f32) -> f32 {
    1.0 / (1.0 + (-logit).exp())
}

/// Options shared by every adapter.
#[derive(Debug, Clone)]
pub struct ClassifierOptions {
    /// Backbone architecture; checked against what the adapter can run.
    pub arch: String,
    pub device: ComputeDevice,
}

/// Load a classifier, picking the adapter from the checkpoint extension.
///
/// `.onnx` files run on ONNX Runtime; `.safetensors` files are checkpoints
/// written by the trainer and run on candle.
pub fn load_branch_classifier(
    path: &Path,
    branch: Branch,
    options: &ClassifierOptions,
) -> DetectResult<Box<dyn BranchClassifier>> {
    if !path.exists() {
        return Err(DetectError::classifier(branch, path, "checkpoint not found"));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "onnx" => Ok(Box::new(OnnxBranchClassifier::new(path, branch)?)),
        "safetensors" => Ok(Box::new(CandleBranchClassifier::load(
            path,
            branch,
            &options.arch,
            options.device,
        )?)),
        other => Err(DetectError::config(format!(
            "Unsupported checkpoint format '{}' for {} branch: {}",
            other,
            branch,
            path.display()
        ))),
    }
}
