//! Training run identity, state and checkpoint labels.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a training run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random run ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which snapshot a checkpoint file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointLabel {
    /// Rolling snapshot, overwritten at every save cadence.
    Latest,
    /// Best validation score seen so far.
    Best,
    /// End of a specific (0-based) epoch.
    Epoch(usize),
}

impl CheckpointLabel {
    /// File stem used by the checkpoint store.
    pub fn file_stem(&self) -> String {
        format!("model_epoch_{}", self)
    }
}

impl fmt::Display for CheckpointLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointLabel::Latest => f.write_str("latest"),
            CheckpointLabel::Best => f.write_str("best"),
            CheckpointLabel::Epoch(n) => write!(f, "{}", n),
        }
    }
}

/// Mutable state of a training run.
///
/// Only the training loop mutates this; checkpoints persist a copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct TrainingState {
    /// Current (0-based) epoch. In a checkpoint this is the epoch that was
    /// running when the snapshot was taken; resuming trains it again.
    pub epoch: usize,
    /// Optimizer steps taken across all epochs.
    pub total_steps: u64,
    /// Best monitored validation score seen by the current early stopper.
    pub best_validation_score: Option<f64>,
    /// Consecutive non-improving validations.
    pub early_stop_counter: usize,
    /// Label of the most recently written checkpoint.
    pub current_checkpoint: Option<CheckpointLabel>,
    /// Base learning rate currently in effect.
    pub learning_rate: f64,
    /// Number of learning-rate decays performed.
    #[serde(default)]
    pub lr_decays: u32,
}

/// JSON sidecar written next to checkpoint weights.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CheckpointMeta {
    pub run_id: RunId,
    pub exp_name: String,
    pub label: CheckpointLabel,
    pub state: TrainingState,
    pub saved_at: DateTime<Utc>,
}
