//! candle classifier adapter for trainer checkpoints.

use std::path::{Path, PathBuf};

use aigv_models::{Branch, ComputeDevice};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use tracing::info;

use crate::classifier::{sigmoid, BranchClassifier};
use crate::error::{DetectError, DetectResult};
use crate::net::{batch_tensor, select_device, CompactCnn, ARCH};
use crate::preprocess::ImageTensor;

/// Runs a [`CompactCnn`] loaded from a `.safetensors` checkpoint.
pub struct CandleBranchClassifier {
    net: CompactCnn,
    device: Device,
    branch: Branch,
    model_path: PathBuf,
}

impl CandleBranchClassifier {
    pub fn load(
        model_path: &Path,
        branch: Branch,
        arch: &str,
        device: ComputeDevice,
    ) -> DetectResult<Self> {
        if arch != ARCH {
            return Err(DetectError::config(format!(
                "Unsupported architecture '{}' (available: {})",
                arch, ARCH
            )));
        }

        let device = select_device(device);
        // SAFETY: the checkpoint is not modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[model_path], DType::F32, &device)
        }
        .map_err(|e| DetectError::classifier(branch, model_path, e.to_string()))?;
        let net = CompactCnn::new(vb)
            .map_err(|e| DetectError::classifier(branch, model_path, e.to_string()))?;

        info!(
            branch = %branch,
            model_path = %model_path.display(),
            "candle branch classifier loaded"
        );

        Ok(Self {
            net,
            device,
            branch,
            model_path: model_path.to_path_buf(),
        })
    }
}

impl BranchClassifier for CandleBranchClassifier {
    fn name(&self) -> &'static str {
        "candle"
    }

    fn classify(&self, input: &ImageTensor) -> DetectResult<f32> {
        let logit = batch_tensor(std::slice::from_ref(input), &self.device)
            .and_then(|xs| self.net.forward(&xs, false))
            .and_then(|logits| logits.to_vec1::<f32>())
            .map_err(|e| DetectError::classifier(self.branch, &self.model_path, e.to_string()))?;

        logit
            .first()
            .copied()
            .map(sigmoid)
            .ok_or_else(|| DetectError::classifier(self.branch, &self.model_path, "empty output"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::VarMap;

    #[test]
    fn test_loads_saved_weights() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("model.safetensors");

        let var_map = VarMap::new();
        let trained = CompactCnn::new_trainable(&var_map, &Device::Cpu).unwrap();
        var_map.save(&path).unwrap();

        let classifier =
            CandleBranchClassifier::load(&path, Branch::Original, ARCH, ComputeDevice::Cpu).unwrap();

        let input = ImageTensor::from_chw(8, 8, vec![0.5; 3 * 64]).unwrap();
        let probability = classifier.classify(&input).unwrap();
        assert!((0.0..=1.0).contains(&probability));

        let xs = batch_tensor(std::slice::from_ref(&input), &Device::Cpu).unwrap();
        let logit: Vec<f32> = trained.forward(&xs, false).unwrap().to_vec1().unwrap();
        assert!((sigmoid(logit[0]) - probability).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_unknown_arch() {
        let result = CandleBranchClassifier::load(
            Path::new("/nonexistent.safetensors"),
            Branch::OpticalFlow,
            "resnet50",
            ComputeDevice::Cpu,
        );
        assert!(matches!(result, Err(DetectError::Config(_))));
    }
}
