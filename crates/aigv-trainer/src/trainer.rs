//! Trainable models.

use std::path::Path;

use aigv_detector::{batch_tensor, select_device, CompactCnn, ARCH};
use aigv_models::TrainConfig;
use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};
use tracing::info;

use crate::dataset::Batch;
use crate::error::{TrainError, TrainResult};

/// A binary classifier the training loop can drive.
pub trait Trainable {
    /// One forward/backward/optimizer step. Returns the batch loss.
    fn train_step(&mut self, batch: &Batch) -> TrainResult<f64>;

    fn set_learning_rate(&mut self, lr: f64);

    fn learning_rate(&self) -> f64;

    /// Toggle train-only behaviour such as dropout.
    fn set_train_mode(&mut self, train: bool);

    /// Fake-probabilities for each image, without gradient updates.
    fn predict(&self, batch: &Batch) -> TrainResult<Vec<f64>>;

    fn save_weights(&self, path: &Path) -> TrainResult<()>;

    fn load_weights(&mut self, path: &Path) -> TrainResult<()>;
}

/// [`CompactCnn`] trained with AdamW on binary cross-entropy with logits.
pub struct CandleTrainer {
    var_map: VarMap,
    net: CompactCnn,
    optimizer: AdamW,
    device: Device,
    train_mode: bool,
}

impl CandleTrainer {
    pub fn new(config: &TrainConfig) -> TrainResult<Self> {
        if config.arch != ARCH {
            return Err(TrainError::config(format!(
                "Unsupported architecture '{}' (available: {})",
                config.arch, ARCH
            )));
        }

        let device = select_device(config.device);
        let var_map = VarMap::new();
        let net = CompactCnn::new_trainable(&var_map, &device)?;
        let optimizer = AdamW::new(
            var_map.all_vars(),
            ParamsAdamW {
                lr: config.lr,
                beta1: config.beta1,
                weight_decay: config.weight_decay,
                ..Default::default()
            },
        )?;

        info!(
            arch = ARCH,
            params = var_map.all_vars().iter().map(|v| v.elem_count()).sum::<usize>(),
            cuda = device.is_cuda(),
            "Model initialized"
        );

        Ok(Self {
            var_map,
            net,
            optimizer,
            device,
            train_mode: true,
        })
    }

    fn inputs(&self, batch: &Batch) -> TrainResult<Tensor> {
        if batch.is_empty() {
            return Err(TrainError::data("empty batch"));
        }
        Ok(batch_tensor(&batch.images, &self.device)?)
    }
}

impl Trainable for CandleTrainer {
    fn train_step(&mut self, batch: &Batch) -> TrainResult<f64> {
        let xs = self.inputs(batch)?;
        let targets: Vec<f32> = batch.labels.iter().map(|&l| if l { 1.0 } else { 0.0 }).collect();
        let targets = Tensor::from_vec(targets, batch.len(), &self.device)?;

        let logits = self.net.forward(&xs, self.train_mode)?;
        let loss = candle_nn::loss::binary_cross_entropy_with_logit(&logits, &targets)?;
        self.optimizer.backward_step(&loss)?;

        Ok(loss.to_dtype(DType::F64)?.to_scalar::<f64>()?)
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.optimizer.set_learning_rate(lr);
    }

    fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    fn set_train_mode(&mut self, train: bool) {
        self.train_mode = train;
    }

    fn predict(&self, batch: &Batch) -> TrainResult<Vec<f64>> {
        let xs = self.inputs(batch)?;
        let logits = self.net.forward(&xs, false)?;
        let probabilities = candle_nn::ops::sigmoid(&logits)?.to_vec1::<f32>()?;
        Ok(probabilities.into_iter().map(f64::from).collect())
    }

    fn save_weights(&self, path: &Path) -> TrainResult<()> {
        Ok(self.var_map.save(path)?)
    }

    fn load_weights(&mut self, path: &Path) -> TrainResult<()> {
        Ok(self.var_map.load(path)?)
    }
}
