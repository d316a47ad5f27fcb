//! Compact convolutional backbone used by the candle adapter and the trainer.
//!
//! Architecture: 4 × (Conv3x3 stride 2 → ReLU) → global mean pool →
//! Dropout → Linear(128 → 1). Output is one logit per image.

use aigv_models::ComputeDevice;
use candle_core::{DType, Device, Tensor};
use candle_nn::{conv2d, linear, Conv2d, Conv2dConfig, Dropout, Linear, Module, VarBuilder, VarMap};
use tracing::{debug, warn};

use crate::preprocess::ImageTensor;

/// Architecture name accepted by `--arch`.
pub const ARCH: &str = "compact_cnn";

const CHANNELS: [usize; 5] = [3, 16, 32, 64, 128];
const DROPOUT: f32 = 0.2;

/// Small binary image classifier.
pub struct CompactCnn {
    convs: Vec<Conv2d>,
    head: Linear,
    dropout: Dropout,
}

impl std::fmt::Debug for CompactCnn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CompactCnn({} convs → 1)", self.convs.len())
    }
}

impl CompactCnn {
    /// Build the network from `vb`. Works for fresh `VarMap`s and for
    /// mmaped checkpoints alike.
    pub fn new(vb: VarBuilder) -> candle_core::Result<Self> {
        let config = Conv2dConfig {
            padding: 1,
            stride: 2,
            ..Default::default()
        };

        let mut convs = Vec::with_capacity(CHANNELS.len() - 1);
        for (i, pair) in CHANNELS.windows(2).enumerate() {
            convs.push(conv2d(pair[0], pair[1], 3, config, vb.pp(format!("conv{i}")))?);
        }
        let head = linear(CHANNELS[CHANNELS.len() - 1], 1, vb.pp("head"))?;

        Ok(Self {
            convs,
            head,
            dropout: Dropout::new(DROPOUT),
        })
    }

    /// Fresh trainable network registered in `var_map`.
    pub fn new_trainable(var_map: &VarMap, device: &Device) -> candle_core::Result<Self> {
        Self::new(VarBuilder::from_varmap(var_map, DType::F32, device))
    }

    /// Logits of shape `(B,)` for an `(B, 3, H, W)` batch. Dropout is only
    /// active when `train` is set.
    pub fn forward(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let mut xs = xs.clone();
        for conv in &self.convs {
            xs = conv.forward(&xs)?.relu()?;
        }
        let pooled = xs.mean((2, 3))?;
        let pooled = self.dropout.forward(&pooled, train)?;
        self.head.forward(&pooled)?.squeeze(1)
    }
}

/// Stack equally sized images into one `(B, 3, H, W)` tensor.
pub fn batch_tensor(images: &[ImageTensor], device: &Device) -> candle_core::Result<Tensor> {
    let first = images
        .first()
        .ok_or_else(|| candle_core::Error::Msg("empty batch".to_string()))?;
    let (width, height) = (first.width(), first.height());

    let mut data = Vec::with_capacity(images.len() * 3 * width * height);
    for image in images {
        if (image.width(), image.height()) != (width, height) {
            return Err(candle_core::Error::Msg(format!(
                "batch images differ in size: {}x{} vs {}x{}",
                image.width(),
                image.height(),
                width,
                height
            )));
        }
        data.extend_from_slice(image.data());
    }

    Tensor::from_vec(data, (images.len(), 3, height, width), device)
}

/// Resolve the configured compute device, falling back to CPU.
pub fn select_device(device: ComputeDevice) -> Device {
    match device {
        ComputeDevice::Cpu => Device::Cpu,
        ComputeDevice::Gpu => match Device::cuda_if_available(0) {
            Ok(device) => {
                debug!(cuda = device.is_cuda(), "Selected compute device");
                device
            }
            Err(e) => {
                warn!("CUDA device unavailable, using CPU: {}", e);
                Device::Cpu
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_shape() {
        let device = Device::Cpu;
        let var_map = VarMap::new();
        let net = CompactCnn::new_trainable(&var_map, &device).unwrap();

        let xs = Tensor::zeros((2, 3, 32, 32), DType::F32, &device).unwrap();
        let logits = net.forward(&xs, false).unwrap();
        assert_eq!(logits.dims(), &[2]);
        assert_eq!(var_map.all_vars().len(), 10);
    }

    #[test]
    fn test_eval_forward_is_deterministic() {
        let device = Device::Cpu;
        let var_map = VarMap::new();
        let net = CompactCnn::new_trainable(&var_map, &device).unwrap();

        let xs = Tensor::ones((1, 3, 16, 16), DType::F32, &device).unwrap();
        let a: Vec<f32> = net.forward(&xs, false).unwrap().to_vec1().unwrap();
        let b: Vec<f32> = net.forward(&xs, false).unwrap().to_vec1().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_batch_tensor_rejects_mixed_sizes() {
        let a = ImageTensor::from_chw(2, 2, vec![0.0; 12]).unwrap();
        let b = ImageTensor::from_chw(3, 2, vec![0.0; 18]).unwrap();
        assert!(batch_tensor(&[a.clone(), b], &Device::Cpu).is_err());

        let batch = batch_tensor(&[a.clone(), a], &Device::Cpu).unwrap();
        assert_eq!(batch.dims(), &[2, 3, 2, 2]);
    }

    #[test]
    fn test_cpu_device() {
        assert!(matches!(select_device(ComputeDevice::Cpu), Device::Cpu));
    }
}
