//! Branch classifier training.
//!
//! This crate provides:
//! - Layered configuration loading (file + `AIGV__*` environment)
//! - Image-folder datasets and a seeded, parallel batch loader
//! - The `Trainable` capability and a candle implementation
//! - Early stopping with learning-rate decay restarts and a warmup schedule
//! - Checkpoint persistence and pluggable metric sinks
//! - The `TrainingLoop` state machine tying them together

pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod early_stop;
pub mod error;
pub mod lr;
pub mod sinks;
pub mod trainer;
pub mod training_loop;
pub mod validate;

pub use checkpoint::CheckpointStore;
pub use config::{load_config, CONFIG_PATH_ENV};
pub use dataset::{Batch, BatchLoader, BatchSource, ImageFolderDataset, LoaderOptions, Sample};
pub use early_stop::{EarlyStopping, StopDecision};
pub use error::{TrainError, TrainResult};
pub use lr::{LrController, WarmupCosine};
pub use sinks::{MetricSink, PrometheusSink, RunLog, ScalarEvent, ScalarLog, SinkSet};
pub use trainer::{CandleTrainer, Trainable};
pub use training_loop::{Phase, TerminationReason, TrainingLoop, TrainingSummary};
pub use validate::{DatasetValidator, Validator};
