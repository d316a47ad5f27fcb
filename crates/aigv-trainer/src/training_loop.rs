//! The training state machine.
//!
//! ```text
//! TrainEpoch -> Validate -> EarlyStopCheck -> Schedule -> TrainEpoch ...
//!                                 |                |
//!                                 +-> Terminated <-+
//! ```
//!
//! Checkpoints are written inside `TrainEpoch` (step cadence and epoch
//! boundary) and in `EarlyStopCheck` (`best`). A stopper trigger first tries
//! a learning-rate decay; the run terminates only when the decay is refused.

use std::path::PathBuf;
use std::time::Instant;

use aigv_models::{events, CheckpointLabel, RunId, TrainConfig, TrainingState, ValidationMetrics};
use tracing::{info, warn};

use crate::checkpoint::CheckpointStore;
use crate::dataset::BatchSource;
use crate::early_stop::{EarlyStopping, StopDecision};
use crate::error::TrainResult;
use crate::lr::{LrController, WarmupCosine};
use crate::sinks::{ScalarEvent, SinkSet};
use crate::trainer::Trainable;
use crate::validate::Validator;

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    EpochsExhausted,
    EarlyStopped,
}

/// Loop phase.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    TrainEpoch,
    Validate,
    EarlyStopCheck(ValidationMetrics),
    Schedule,
    Terminated(TerminationReason),
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub run_id: RunId,
    pub state: TrainingState,
    pub reason: TerminationReason,
    pub last_metrics: Option<ValidationMetrics>,
    pub best_checkpoint: Option<PathBuf>,
    /// Step-cadence `latest` saves, in step order.
    pub step_saves: Vec<u64>,
    pub checkpoint_failures: usize,
}

/// Drives one model through epochs, validation, checkpoints, early stopping
/// and the learning-rate schedule.
pub struct TrainingLoop<M, B, V> {
    config: TrainConfig,
    run_id: RunId,
    model: M,
    batches: B,
    validator: V,
    checkpoints: CheckpointStore,
    sinks: SinkSet,
    stopper: EarlyStopping,
    lr: LrController,
    schedule: Option<WarmupCosine>,
    state: TrainingState,
    last_metrics: Option<ValidationMetrics>,
    best_checkpoint: Option<PathBuf>,
    step_saves: Vec<u64>,
    checkpoint_failures: usize,
}

impl<M, B, V> TrainingLoop<M, B, V>
where
    M: Trainable,
    B: BatchSource,
    V: Validator,
{
    pub fn new(
        config: TrainConfig,
        run_id: RunId,
        model: M,
        batches: B,
        validator: V,
        checkpoints: CheckpointStore,
        sinks: SinkSet,
    ) -> Self {
        let stopper = EarlyStopping::new(config.earlystop_epoch, config.earlystop_delta);
        let lr = LrController::new(config.lr, config.min_lr, config.lr_decay_factor);
        let schedule = config
            .warmup
            .then(|| WarmupCosine::new(config.warmup_epoch, config.nepoch, config.eta_min));
        let state = TrainingState {
            learning_rate: config.lr,
            ..TrainingState::default()
        };

        Self {
            config,
            run_id,
            model,
            batches,
            validator,
            checkpoints,
            sinks,
            stopper,
            lr,
            schedule,
            state,
            last_metrics: None,
            best_checkpoint: None,
            step_saves: Vec::new(),
            checkpoint_failures: 0,
        }
    }

    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Continue from the `latest` checkpoint, if there is one.
    ///
    /// Restores weights, step counter, base learning rate and stopper
    /// counters. The snapshot's epoch is trained again from its start, so
    /// `total_steps` keeps counting the steps of the interrupted (or
    /// already finished) epoch as well. A step-cadence `latest` can be taken
    /// mid-epoch, and the snapshot does not record how far the epoch got.
    pub fn resume_latest(&mut self) -> TrainResult<bool> {
        let Some(state) = self.checkpoints.restore(CheckpointLabel::Latest, &mut self.model)? else {
            info!("No latest checkpoint to resume from; starting fresh");
            return Ok(false);
        };

        let delta = if state.lr_decays > 0 {
            self.config.restart_delta
        } else {
            self.config.earlystop_delta
        };
        self.stopper = EarlyStopping::resume(
            self.config.earlystop_epoch,
            delta,
            state.best_validation_score,
            state.early_stop_counter,
        );
        self.lr = LrController::resume(
            state.learning_rate,
            self.config.min_lr,
            self.config.lr_decay_factor,
            state.lr_decays,
        );
        self.state = state;

        info!(
            epoch = self.state.epoch,
            total_steps = self.state.total_steps,
            lr = self.state.learning_rate,
            "Resuming training; epoch {} restarts from its first batch",
            self.state.epoch
        );
        Ok(true)
    }

    /// Run to termination.
    pub fn run(mut self) -> TrainResult<TrainingSummary> {
        self.sinks.config(&self.run_id, &self.config);
        self.sinks.message(&format!(
            "Num of training images = {}",
            self.batches.num_samples()
        ));

        if self.state.epoch >= self.config.nepoch {
            return Ok(self.finish(TerminationReason::EpochsExhausted));
        }

        self.apply_learning_rate(self.state.epoch);
        self.model.set_train_mode(true);

        let mut phase = Phase::TrainEpoch;
        loop {
            phase = match phase {
                Phase::TrainEpoch => {
                    self.train_epoch()?;
                    Phase::Validate
                }
                Phase::Validate => Phase::EarlyStopCheck(self.validate()?),
                Phase::EarlyStopCheck(metrics) => self.early_stop_check(&metrics),
                Phase::Schedule => self.schedule_step(),
                Phase::Terminated(reason) => return Ok(self.finish(reason)),
            };
        }
    }

    fn train_epoch(&mut self) -> TrainResult<()> {
        let epoch = self.state.epoch;
        let started = Instant::now();
        let batches = self.batches.num_batches();
        info!(epoch, total = self.config.nepoch, batches, "Epoch started");

        let mut loss_sum = 0.0;
        for index in 0..batches {
            let batch = self.batches.batch(epoch, index)?;
            let loss = self.model.train_step(&batch)?;
            self.state.total_steps += 1;
            loss_sum += loss;

            self.sinks.scalar(ScalarEvent::new(
                events::TRAIN_LOSS,
                loss,
                self.state.total_steps,
                epoch,
            ));

            if self.state.total_steps % self.config.save_latest_freq == 0 {
                self.sinks.message(&format!(
                    "saving the latest model {} (epoch {}, model.total_steps {})",
                    self.config.exp_name, epoch, self.state.total_steps
                ));
                if self.save(CheckpointLabel::Latest).is_some() {
                    self.step_saves.push(self.state.total_steps);
                }
            }
        }

        if epoch % self.config.save_epoch_freq == 0 {
            self.sinks.message(&format!(
                "saving the model at the end of epoch {}, iters {}",
                epoch, self.state.total_steps
            ));
            self.save(CheckpointLabel::Latest);
            self.save(CheckpointLabel::Epoch(epoch));
        }

        info!(
            epoch,
            steps = self.state.total_steps,
            mean_loss = if batches > 0 { loss_sum / batches as f64 } else { 0.0 },
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Epoch finished"
        );
        Ok(())
    }

    fn validate(&mut self) -> TrainResult<ValidationMetrics> {
        self.model.set_train_mode(false);
        let metrics = self.validator.validate(&self.model)?;

        for (name, value) in metrics.events() {
            self.sinks.scalar(ScalarEvent::new(
                name,
                value,
                self.state.total_steps,
                self.state.epoch,
            ));
        }
        self.sinks.message(&format!(
            "(Val @ epoch {}) AP: {}; ACC: {}",
            self.state.epoch, metrics.ap, metrics.acc
        ));
        info!(
            epoch = self.state.epoch,
            ap = metrics.ap,
            acc = metrics.acc,
            auc = metrics.auc,
            tpr = metrics.tpr,
            tnr = metrics.tnr,
            "Validation results"
        );

        self.last_metrics = Some(metrics);
        Ok(metrics)
    }

    fn early_stop_check(&mut self, metrics: &ValidationMetrics) -> Phase {
        let score = metrics.get(self.config.earlystop_metric);

        match self.stopper.observe(score) {
            StopDecision::Improved { best } => {
                self.sync_stopper_state();
                // `best` is kept with early stopping off too; only triggers
                // are ignored then
                if let Some(path) = self.save(CheckpointLabel::Best) {
                    self.sinks.best_artifact(&path, self.state.epoch, best);
                    self.best_checkpoint = Some(path);
                }
            }
            StopDecision::Stalled { counter } => {
                self.sync_stopper_state();
                info!(
                    counter,
                    patience = self.stopper.patience(),
                    "EarlyStopping counter"
                );
            }
            StopDecision::Triggered => {
                self.sync_stopper_state();
                if !self.config.earlystop {
                    return Phase::Schedule;
                }
                if self.lr.decay() {
                    self.state.learning_rate = self.lr.current();
                    self.state.lr_decays = self.lr.decays();
                    self.model.set_learning_rate(self.lr.current());
                    self.stopper.restart(self.config.restart_delta);
                    self.sync_stopper_state();

                    info!(lr = self.lr.current(), "Learning rate dropped, continuing training");
                    self.sinks.message(&format!(
                        "Learning rate dropped by {}, continue training...",
                        self.config.lr_decay_factor
                    ));
                } else {
                    info!(lr = self.lr.current(), "Early stopping triggered");
                    self.sinks.message("Early stopping.");
                    return Phase::Terminated(TerminationReason::EarlyStopped);
                }
            }
        }

        Phase::Schedule
    }

    fn schedule_step(&mut self) -> Phase {
        self.state.epoch += 1;
        if self.state.epoch >= self.config.nepoch {
            return Phase::Terminated(TerminationReason::EpochsExhausted);
        }
        if self.schedule.is_some() {
            self.apply_learning_rate(self.state.epoch);
        }
        self.model.set_train_mode(true);
        Phase::TrainEpoch
    }

    /// Set the optimizer rate for `epoch` from the base rate and schedule.
    fn apply_learning_rate(&mut self, epoch: usize) {
        let lr = match &self.schedule {
            Some(schedule) => schedule.lr_at(epoch, self.lr.current()),
            None => self.lr.current(),
        };
        self.model.set_learning_rate(lr);
        metrics::gauge!("aigv_learning_rate").set(lr);
    }

    fn sync_stopper_state(&mut self) {
        self.state.best_validation_score = self.stopper.best_score();
        self.state.early_stop_counter = self.stopper.counter();
    }

    /// Best-effort save. Failures are logged and counted.
    fn save(&mut self, label: CheckpointLabel) -> Option<PathBuf> {
        match self.checkpoints.save(label, &self.model, &self.state) {
            Ok(path) => {
                self.state.current_checkpoint = Some(label);
                Some(path)
            }
            Err(e) => {
                self.checkpoint_failures += 1;
                metrics::counter!("aigv_checkpoint_failures_total").increment(1);
                warn!(label = %label, error = %e, "Checkpoint save failed; continuing");
                self.sinks.message(&format!("checkpoint {} failed: {}", label, e));
                None
            }
        }
    }

    fn finish(mut self, reason: TerminationReason) -> TrainingSummary {
        info!(
            ?reason,
            epoch = self.state.epoch,
            total_steps = self.state.total_steps,
            best = ?self.state.best_validation_score,
            "Training finished"
        );
        self.sinks.finish();

        TrainingSummary {
            run_id: self.run_id,
            state: self.state,
            reason,
            last_metrics: self.last_metrics,
            best_checkpoint: self.best_checkpoint,
            step_saves: self.step_saves,
            checkpoint_failures: self.checkpoint_failures,
        }
    }
}
