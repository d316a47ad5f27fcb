//! Training loop behaviour with stub model, data and validator.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use aigv_models::{events, CheckpointLabel, RunId, TrainConfig, ValidationMetrics};
use aigv_trainer::{
    Batch, BatchSource, CheckpointStore, MetricSink, ScalarEvent, SinkSet, TerminationReason,
    Trainable, TrainResult, TrainingLoop, Validator,
};
use tempfile::TempDir;

#[derive(Default)]
struct Log {
    learning_rates: Vec<f64>,
    train_modes: Vec<bool>,
}

/// Records every learning rate and mode it is given.
struct StubModel {
    log: Arc<Mutex<Log>>,
    lr: f64,
}

impl StubModel {
    fn new() -> (Self, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        (
            Self {
                log: log.clone(),
                lr: 0.0,
            },
            log,
        )
    }
}

impl Trainable for StubModel {
    fn train_step(&mut self, _batch: &Batch) -> TrainResult<f64> {
        Ok(0.25)
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.lr = lr;
        self.log.lock().unwrap().learning_rates.push(lr);
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }

    fn set_train_mode(&mut self, train: bool) {
        self.log.lock().unwrap().train_modes.push(train);
    }

    fn predict(&self, batch: &Batch) -> TrainResult<Vec<f64>> {
        Ok(vec![0.5; batch.len()])
    }

    fn save_weights(&self, path: &Path) -> TrainResult<()> {
        Ok(fs::write(path, b"stub")?)
    }

    fn load_weights(&mut self, _path: &Path) -> TrainResult<()> {
        Ok(())
    }
}

/// `batches` empty batches per epoch.
struct Steps(usize);

impl BatchSource for Steps {
    fn num_batches(&self) -> usize {
        self.0
    }

    fn num_samples(&self) -> usize {
        self.0
    }

    fn batch(&self, _epoch: usize, _index: usize) -> TrainResult<Batch> {
        Ok(Batch::default())
    }
}

/// Returns scripted ACC values, then repeats the last one.
struct Scripted {
    scores: VecDeque<f64>,
    last: f64,
}

impl Scripted {
    fn new(scores: &[f64]) -> Self {
        Self {
            scores: scores.iter().copied().collect(),
            last: scores.last().copied().unwrap_or(0.5),
        }
    }
}

impl Validator for Scripted {
    fn validate(&mut self, _model: &dyn Trainable) -> TrainResult<ValidationMetrics> {
        let acc = self.scores.pop_front().unwrap_or(self.last);
        Ok(ValidationMetrics {
            ap: acc,
            acc,
            auc: acc,
            tpr: acc,
            tnr: acc,
        })
    }
}

/// Captures scalar events and messages.
#[derive(Clone, Default)]
struct Capture {
    scalars: Arc<Mutex<Vec<ScalarEvent>>>,
    messages: Arc<Mutex<Vec<String>>>,
    best: Arc<Mutex<Vec<usize>>>,
}

impl MetricSink for Capture {
    fn name(&self) -> &'static str {
        "capture"
    }

    fn log_scalar(&mut self, event: &ScalarEvent) -> TrainResult<()> {
        self.scalars.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn log_message(&mut self, message: &str) -> TrainResult<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }

    fn log_best_artifact(&mut self, _path: &Path, epoch: usize, _score: f64) -> TrainResult<()> {
        self.best.lock().unwrap().push(epoch);
        Ok(())
    }
}

fn config(dir: &TempDir) -> TrainConfig {
    let mut config = TrainConfig::with_dataset_root("unused");
    config.output_dir = dir.path().to_string_lossy().into_owned();
    config.exp_name = "exp".to_string();
    config
}

fn store(config: &TrainConfig) -> CheckpointStore {
    CheckpointStore::new(config.ckpt_dir(), RunId::from_string("test"), &config.exp_name)
}

#[test]
fn step_cadence_saves_latest_at_multiples() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.nepoch = 1;
    config.save_latest_freq = 100;
    config.earlystop = false;

    let (model, _) = StubModel::new();
    let summary = TrainingLoop::new(
        config.clone(),
        RunId::new(),
        model,
        Steps(250),
        Scripted::new(&[0.5]),
        store(&config),
        SinkSet::new(),
    )
    .run()
    .unwrap();

    assert_eq!(summary.state.total_steps, 250);
    assert_eq!(summary.step_saves, [100, 200]);
    assert_eq!(summary.reason, TerminationReason::EpochsExhausted);

    // Epoch 0 is also an epoch-boundary save
    let ckpt = config.ckpt_dir();
    assert!(ckpt.join("model_epoch_latest.safetensors").exists());
    assert!(ckpt.join("model_epoch_0.safetensors").exists());
    assert!(ckpt.join("model_epoch_best.safetensors").exists());
}

#[test]
fn early_stop_decays_once_then_terminates() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.nepoch = 50;
    config.earlystop_epoch = 2;
    config.lr = 1e-4;
    config.min_lr = 1e-5;

    let (model, log) = StubModel::new();
    let capture = Capture::default();
    let summary = TrainingLoop::new(
        config.clone(),
        RunId::new(),
        model,
        Steps(1),
        Scripted::new(&[0.8, 0.7, 0.7, 0.7, 0.7]),
        store(&config),
        SinkSet::new().with(capture.clone()),
    )
    .run()
    .unwrap();

    // Epoch 0 best, 1-2 stall -> decay + restart, 3 best of new phase,
    // 4-5 stall -> decay refused at the floor
    assert_eq!(summary.reason, TerminationReason::EarlyStopped);
    assert_eq!(summary.state.epoch, 5);
    assert_eq!(summary.state.lr_decays, 1);
    assert!((summary.state.learning_rate - 1e-5).abs() < 1e-18);
    assert_eq!(summary.state.early_stop_counter, 2);
    assert_eq!(summary.state.best_validation_score, Some(0.7));

    let learning_rates = log.lock().unwrap().learning_rates.clone();
    assert_eq!(learning_rates.len(), 2);
    assert!((learning_rates[1] - 1e-5).abs() < 1e-18);

    assert_eq!(*capture.best.lock().unwrap(), [0, 3]);
    let messages = capture.messages.lock().unwrap();
    assert!(messages.iter().any(|m| m.starts_with("Learning rate dropped")));
    assert_eq!(messages.last().map(String::as_str), Some("Early stopping."));
}

#[test]
fn scalar_events_are_monotonic() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.nepoch = 3;
    config.earlystop = false;

    let (model, _) = StubModel::new();
    let capture = Capture::default();
    TrainingLoop::new(
        config.clone(),
        RunId::new(),
        model,
        Steps(4),
        Scripted::new(&[0.6, 0.7, 0.8]),
        store(&config),
        SinkSet::new().with(capture.clone()),
    )
    .run()
    .unwrap();

    let scalars = capture.scalars.lock().unwrap();
    let losses: Vec<u64> = scalars
        .iter()
        .filter(|e| e.name == events::TRAIN_LOSS)
        .map(|e| e.step)
        .collect();
    assert_eq!(losses, (1..=12).collect::<Vec<u64>>());

    let val_names: Vec<&str> = scalars
        .iter()
        .filter(|e| e.epoch == 1 && e.group() == "val")
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(
        val_names,
        [events::VAL_AP, events::VAL_ACC, events::VAL_AUC, events::VAL_TPR, events::VAL_TNR]
    );
    assert!(scalars.windows(2).all(|w| w[0].step <= w[1].step));
}

#[test]
fn checkpoint_failures_do_not_stop_training() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.nepoch = 2;
    config.save_latest_freq = 1;
    config.earlystop = false;
    // A file where the checkpoint directory should be
    fs::write(dir.path().join("blocked"), b"x").unwrap();
    let checkpoints = CheckpointStore::new(dir.path().join("blocked").join("ckpt"), RunId::new(), "exp");

    let (model, _) = StubModel::new();
    let summary = TrainingLoop::new(
        config,
        RunId::new(),
        model,
        Steps(2),
        Scripted::new(&[0.5, 0.6]),
        checkpoints,
        SinkSet::new(),
    )
    .run()
    .unwrap();

    assert_eq!(summary.reason, TerminationReason::EpochsExhausted);
    assert_eq!(summary.state.total_steps, 4);
    assert!(summary.step_saves.is_empty());
    assert!(summary.checkpoint_failures > 0);
    assert!(summary.best_checkpoint.is_none());
}

#[test]
fn warmup_schedule_runs_each_epoch() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.nepoch = 6;
    config.warmup = true;
    config.warmup_epoch = 2;
    config.lr = 1e-3;
    config.eta_min = 1e-6;
    config.earlystop = false;

    let (model, log) = StubModel::new();
    TrainingLoop::new(
        config.clone(),
        RunId::new(),
        model,
        Steps(1),
        Scripted::new(&[0.5]),
        store(&config),
        SinkSet::new(),
    )
    .run()
    .unwrap();

    let log = log.lock().unwrap();
    let rates = &log.learning_rates;
    assert_eq!(rates.len(), 6);
    assert!((rates[0] - 5e-4).abs() < 1e-15);
    assert!((rates[1] - 1e-3).abs() < 1e-15);
    assert!(rates[2..].windows(2).all(|w| w[1] < w[0]));
    assert!((rates[5] - 1e-6).abs() < 1e-12);

    // Eval for validation, back to train for the next epoch
    assert_eq!(&log.train_modes[..3], [true, false, true]);
}

#[test]
fn resume_continues_from_latest() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.nepoch = 2;
    config.save_epoch_freq = 1;
    config.earlystop = false;

    let (model, _) = StubModel::new();
    let first = TrainingLoop::new(
        config.clone(),
        RunId::new(),
        model,
        Steps(3),
        Scripted::new(&[0.5]),
        store(&config),
        SinkSet::new(),
    )
    .run()
    .unwrap();
    assert_eq!(first.state.total_steps, 6);

    let latest = store(&config).read_meta(CheckpointLabel::Latest).unwrap().unwrap();
    assert_eq!(latest.state.epoch, 1);
    assert_eq!(latest.state.total_steps, 6);

    config.nepoch = 3;
    config.continue_train = true;
    let (model, _) = StubModel::new();
    let mut resumed = TrainingLoop::new(
        config.clone(),
        RunId::new(),
        model,
        Steps(3),
        Scripted::new(&[0.5]),
        store(&config),
        SinkSet::new(),
    );
    assert!(resumed.resume_latest().unwrap());
    assert_eq!(resumed.state().total_steps, 6);

    // Epoch 1 is trained again, then epoch 2
    let summary = resumed.run().unwrap();
    assert_eq!(summary.state.total_steps, 12);
    assert_eq!(summary.state.epoch, 3);
}
