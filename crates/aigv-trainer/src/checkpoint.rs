//! Checkpoint persistence.
//!
//! Each snapshot is `ckpt_dir/model_epoch_{label}.safetensors` plus a JSON
//! sidecar with the training state. Weights are written first, so a sidecar
//! never points at missing weights.

use std::fs;
use std::path::{Path, PathBuf};

use aigv_models::{CheckpointLabel, CheckpointMeta, RunId, TrainingState};
use chrono::Utc;
use tracing::{debug, info};

use crate::error::{TrainError, TrainResult};
use crate::trainer::Trainable;

const WEIGHTS_EXTENSION: &str = "safetensors";
const META_EXTENSION: &str = "json";

/// Writes and restores labelled snapshots for one run.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    run_id: RunId,
    exp_name: String,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>, run_id: RunId, exp_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            run_id,
            exp_name: exp_name.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn weights_path(&self, label: CheckpointLabel) -> PathBuf {
        self.dir
            .join(format!("{}.{}", label.file_stem(), WEIGHTS_EXTENSION))
    }

    pub fn meta_path(&self, label: CheckpointLabel) -> PathBuf {
        self.dir.join(format!("{}.{}", label.file_stem(), META_EXTENSION))
    }

    /// Persist `model` and `state` under `label`.
    ///
    /// Every failure is a non-fatal [`TrainError::CheckpointIo`].
    pub fn save(
        &self,
        label: CheckpointLabel,
        model: &dyn Trainable,
        state: &TrainingState,
    ) -> TrainResult<PathBuf> {
        let weights = self.weights_path(label);
        let io_err = |path: &Path, e: &dyn std::fmt::Display| {
            TrainError::checkpoint_io(label, path, e.to_string())
        };

        fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, &e))?;
        model
            .save_weights(&weights)
            .map_err(|e| io_err(&weights, &e))?;

        let meta = CheckpointMeta {
            run_id: self.run_id.clone(),
            exp_name: self.exp_name.clone(),
            label,
            state: TrainingState {
                current_checkpoint: Some(label),
                ..state.clone()
            },
            saved_at: Utc::now(),
        };
        let meta_path = self.meta_path(label);
        let body = serde_json::to_vec_pretty(&meta).map_err(|e| io_err(&meta_path, &e))?;
        fs::write(&meta_path, body).map_err(|e| io_err(&meta_path, &e))?;

        debug!(label = %label, path = %weights.display(), "Checkpoint saved");
        Ok(weights)
    }

    /// Sidecar for `label`, if one exists.
    pub fn read_meta(&self, label: CheckpointLabel) -> TrainResult<Option<CheckpointMeta>> {
        let path = self.meta_path(label);
        if !path.exists() {
            return Ok(None);
        }
        let body = fs::read(&path)?;
        let meta = serde_json::from_slice(&body)
            .map_err(|e| TrainError::config(format!("Corrupt checkpoint sidecar {}: {}", path.display(), e)))?;
        Ok(Some(meta))
    }

    /// Load weights and state saved under `label` into `model`.
    ///
    /// Returns `None` when no such checkpoint exists.
    pub fn restore(
        &self,
        label: CheckpointLabel,
        model: &mut dyn Trainable,
    ) -> TrainResult<Option<TrainingState>> {
        let Some(meta) = self.read_meta(label)? else {
            return Ok(None);
        };
        let weights = self.weights_path(label);
        if !weights.exists() {
            return Err(TrainError::config(format!(
                "Checkpoint sidecar without weights: {}",
                weights.display()
            )));
        }
        model.load_weights(&weights)?;

        info!(
            label = %label,
            epoch = meta.state.epoch,
            total_steps = meta.state.total_steps,
            saved_at = %meta.saved_at,
            "Checkpoint restored"
        );
        Ok(Some(meta.state))
    }
}
