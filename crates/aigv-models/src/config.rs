//! Training configuration.
//!
//! The trainer is driven entirely by this object. Every field has a default
//! except `dataset_root`; binaries layer a config file and environment
//! variables over the defaults before calling [`TrainConfig::validate_config`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use validator::Validate;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<validator::ValidationErrors> for ConfigError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ConfigError::Invalid(errors.to_string())
    }
}

/// Dataset split a loader reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum DatasetSplit {
    #[default]
    Train,
    Val,
    Test,
}

impl DatasetSplit {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetSplit::Train => "train",
            DatasetSplit::Val => "val",
            DatasetSplit::Test => "test",
        }
    }
}

/// Device models run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComputeDevice {
    Cpu,
    /// First accelerator if one is available, CPU otherwise.
    #[default]
    Gpu,
}

/// Validation metric the early stopper tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum MonitoredMetric {
    Ap,
    #[default]
    Acc,
    Auc,
    Tpr,
    Tnr,
}

/// Structured configuration for a training run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct TrainConfig {
    /// Experiment name; output lands under `output_dir/exp_name`.
    #[validate(length(min = 1))]
    #[serde(default = "default_exp_name")]
    pub exp_name: String,

    /// Root containing `train/` and `val/` splits.
    #[validate(length(min = 1))]
    pub dataset_root: String,

    /// Parent directory for experiment outputs.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Split this loader reads.
    #[serde(default)]
    pub split: DatasetSplit,

    /// Backbone architecture name.
    #[serde(default = "default_arch")]
    pub arch: String,

    #[validate(range(min = 1))]
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Number of epochs.
    #[validate(range(min = 1))]
    #[serde(default = "default_nepoch")]
    pub nepoch: usize,

    /// Save `latest` every this many optimizer steps.
    #[validate(range(min = 1))]
    #[serde(default = "default_save_latest_freq")]
    pub save_latest_freq: u64,

    /// Save `latest` and the epoch snapshot every this many epochs.
    #[validate(range(min = 1))]
    #[serde(default = "default_save_epoch_freq")]
    pub save_epoch_freq: usize,

    /// Enable early stopping with learning-rate restarts.
    #[serde(default = "default_true")]
    pub earlystop: bool,

    /// Patience, in validations, before a restart is attempted.
    #[validate(range(min = 1))]
    #[serde(default = "default_earlystop_epoch")]
    pub earlystop_epoch: usize,

    /// Signed improvement threshold for the first early stopper.
    #[serde(default = "default_earlystop_delta")]
    pub earlystop_delta: f64,

    /// Signed improvement threshold after each learning-rate restart.
    #[serde(default = "default_restart_delta")]
    pub restart_delta: f64,

    #[serde(default)]
    pub earlystop_metric: MonitoredMetric,

    /// Run the warmup + cosine schedule once per epoch.
    #[serde(default)]
    pub warmup: bool,

    #[serde(default = "default_warmup_epoch")]
    pub warmup_epoch: usize,

    /// Initial learning rate.
    #[validate(range(exclusive_min = 0.0))]
    #[serde(default = "default_lr")]
    pub lr: f64,

    /// Floor below which a learning-rate decay is refused.
    #[validate(range(exclusive_min = 0.0))]
    #[serde(default = "default_min_lr")]
    pub min_lr: f64,

    /// Divisor applied on each learning-rate decay.
    #[validate(range(exclusive_min = 1.0))]
    #[serde(default = "default_lr_decay_factor")]
    pub lr_decay_factor: f64,

    /// Cosine annealing floor.
    #[serde(default = "default_min_lr")]
    pub eta_min: f64,

    #[serde(default = "default_beta1")]
    pub beta1: f64,

    #[serde(default)]
    pub weight_decay: f64,

    /// Square crop fed to the classifier.
    #[validate(range(min = 8))]
    #[serde(default = "default_crop_size")]
    pub crop_size: u32,

    /// Normalise by ImageNet channel mean/std.
    #[serde(default = "default_true")]
    pub aug_norm: bool,

    /// Random horizontal flips.
    #[serde(default = "default_true")]
    pub aug_flip: bool,

    /// Random crops instead of centre crops.
    #[serde(default = "default_true")]
    pub aug_crop: bool,

    /// Shuffle sample order every epoch.
    #[serde(default = "default_true")]
    pub shuffle: bool,

    /// Resume weights and state from the `latest` checkpoint.
    #[serde(default)]
    pub continue_train: bool,

    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default)]
    pub device: ComputeDevice,
}

fn default_exp_name() -> String {
    "aigvdet".to_string()
}
fn default_output_dir() -> String {
    "data/exp".to_string()
}
fn default_arch() -> String {
    "compact_cnn".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_nepoch() -> usize {
    100
}
fn default_save_latest_freq() -> u64 {
    2000
}
fn default_save_epoch_freq() -> usize {
    20
}
fn default_true() -> bool {
    true
}
fn default_earlystop_epoch() -> usize {
    5
}
fn default_earlystop_delta() -> f64 {
    -0.001
}
fn default_restart_delta() -> f64 {
    -0.002
}
fn default_warmup_epoch() -> usize {
    3
}
fn default_lr() -> f64 {
    1e-4
}
fn default_min_lr() -> f64 {
    1e-6
}
fn default_lr_decay_factor() -> f64 {
    10.0
}
fn default_beta1() -> f64 {
    0.9
}
fn default_crop_size() -> u32 {
    448
}
fn default_seed() -> u64 {
    42
}

impl TrainConfig {
    /// Defaults for everything except the dataset root.
    pub fn with_dataset_root(dataset_root: impl Into<String>) -> Self {
        Self {
            exp_name: default_exp_name(),
            dataset_root: dataset_root.into(),
            output_dir: default_output_dir(),
            split: DatasetSplit::Train,
            arch: default_arch(),
            batch_size: default_batch_size(),
            nepoch: default_nepoch(),
            save_latest_freq: default_save_latest_freq(),
            save_epoch_freq: default_save_epoch_freq(),
            earlystop: true,
            earlystop_epoch: default_earlystop_epoch(),
            earlystop_delta: default_earlystop_delta(),
            restart_delta: default_restart_delta(),
            earlystop_metric: MonitoredMetric::Acc,
            warmup: false,
            warmup_epoch: default_warmup_epoch(),
            lr: default_lr(),
            min_lr: default_min_lr(),
            lr_decay_factor: default_lr_decay_factor(),
            eta_min: default_min_lr(),
            beta1: default_beta1(),
            weight_decay: 0.0,
            crop_size: default_crop_size(),
            aug_norm: true,
            aug_flip: true,
            aug_crop: true,
            shuffle: true,
            continue_train: false,
            seed: default_seed(),
            device: ComputeDevice::Gpu,
        }
    }

    /// Field-level and cross-field validation.
    pub fn validate_config(&self) -> Result<(), ConfigError> {
        self.validate()?;

        if self.warmup && self.warmup_epoch >= self.nepoch {
            return Err(ConfigError::Invalid(format!(
                "warmup_epoch ({}) must be smaller than nepoch ({})",
                self.warmup_epoch, self.nepoch
            )));
        }
        if self.min_lr >= self.lr {
            return Err(ConfigError::Invalid(format!(
                "min_lr ({}) must be below lr ({})",
                self.min_lr, self.lr
            )));
        }
        if self.restart_delta > self.earlystop_delta {
            return Err(ConfigError::Invalid(format!(
                "restart_delta ({}) must be at least as strict as earlystop_delta ({})",
                self.restart_delta, self.earlystop_delta
            )));
        }
        Ok(())
    }

    /// Configuration for the held-out validation loader.
    ///
    /// Same model-facing settings, `val` split, deterministic order and no
    /// random augmentation.
    pub fn val_config(&self) -> Self {
        Self {
            split: DatasetSplit::Val,
            shuffle: false,
            aug_flip: false,
            aug_crop: false,
            ..self.clone()
        }
    }

    /// Directory holding the configured split.
    pub fn split_root(&self) -> PathBuf {
        PathBuf::from(&self.dataset_root).join(self.split.as_str())
    }

    /// Experiment output directory.
    pub fn exp_dir(&self) -> PathBuf {
        PathBuf::from(&self.output_dir).join(&self.exp_name)
    }

    /// Checkpoint directory.
    pub fn ckpt_dir(&self) -> PathBuf {
        self.exp_dir().join("ckpt")
    }

    /// Line-oriented run log.
    pub fn logs_path(&self) -> PathBuf {
        self.exp_dir().join("logs.txt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let cfg = TrainConfig::with_dataset_root("data/aigv");
        cfg.validate_config().unwrap();
        assert_eq!(cfg.crop_size, 448);
        assert_eq!(cfg.earlystop_delta, -0.001);
        assert_eq!(cfg.restart_delta, -0.002);
    }

    #[test]
    fn test_rejects_zero_batch_and_epochs() {
        let mut cfg = TrainConfig::with_dataset_root("data/aigv");
        cfg.batch_size = 0;
        assert!(matches!(cfg.validate_config(), Err(ConfigError::Invalid(_))));

        let mut cfg = TrainConfig::with_dataset_root("data/aigv");
        cfg.nepoch = 0;
        assert!(cfg.validate_config().is_err());
    }

    #[test]
    fn test_rejects_empty_dataset_root() {
        let cfg = TrainConfig::with_dataset_root("");
        assert!(cfg.validate_config().is_err());
    }

    #[test]
    fn test_rejects_lax_restart_delta() {
        let mut cfg = TrainConfig::with_dataset_root("d");
        cfg.restart_delta = 0.0;
        assert!(cfg.validate_config().is_err());
    }

    #[test]
    fn test_val_config_disables_randomness() {
        let cfg = TrainConfig::with_dataset_root("data/aigv");
        let val = cfg.val_config();
        assert_eq!(val.split, DatasetSplit::Val);
        assert!(!val.shuffle && !val.aug_flip && !val.aug_crop);
        assert_eq!(val.split_root(), PathBuf::from("data/aigv/val"));
        assert_eq!(cfg.split_root(), PathBuf::from("data/aigv/train"));
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let cfg: TrainConfig =
            serde_json::from_str(r#"{"dataset_root": "d", "batch_size": 8}"#).unwrap();
        assert_eq!(cfg.batch_size, 8);
        assert_eq!(cfg.nepoch, 100);
        assert_eq!(cfg.earlystop_metric, MonitoredMetric::Acc);
        assert_eq!(cfg.ckpt_dir(), PathBuf::from("data/exp/aigvdet/ckpt"));
    }
}
