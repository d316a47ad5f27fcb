//! Shared data models for AI-generated video detection.
//!
//! This crate provides Serde-serializable types for:
//! - Frame and flow-image naming in the frame stores
//! - Branch probabilities, fusion results and verdicts
//! - Validation metrics and the named scalar events emitted during training
//! - Training state, checkpoint labels and run identifiers
//! - Training configuration with validation

pub mod config;
pub mod frame;
pub mod fusion;
pub mod metrics;
pub mod training;

// Re-export common types
pub use config::{ComputeDevice, ConfigError, DatasetSplit, MonitoredMetric, TrainConfig};
pub use frame::{frame_file_name, is_image_file, parse_frame_index, IMAGE_EXTENSIONS};
pub use fusion::{
    validate_threshold, Branch, FusionResult, Verdict, DEFAULT_THRESHOLD, FLOW_BRANCH_WEIGHT,
    ORIGINAL_BRANCH_WEIGHT,
};
pub use metrics::{events, MetricsError, ValidationMetrics};
pub use training::{CheckpointLabel, CheckpointMeta, RunId, TrainingState};
