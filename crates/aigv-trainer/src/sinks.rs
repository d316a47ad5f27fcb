//! Metric sinks.
//!
//! The training loop emits named scalar events, the run config and
//! best-checkpoint notifications; sinks decide where they go. Sink failures
//! are logged and never stop training.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use aigv_models::{RunId, TrainConfig};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::error::TrainResult;

/// One named scalar at a step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalarEvent {
    pub name: String,
    pub value: f64,
    /// Global optimizer step.
    pub step: u64,
    pub epoch: usize,
}

impl ScalarEvent {
    pub fn new(name: impl Into<String>, value: f64, step: u64, epoch: usize) -> Self {
        Self {
            name: name.into(),
            value,
            step,
            epoch,
        }
    }

    /// Part before the first `/`, e.g. `train` for `train/loss`.
    pub fn group(&self) -> &str {
        self.name.split_once('/').map(|(g, _)| g).unwrap_or("misc")
    }
}

/// Destination for training telemetry.
pub trait MetricSink: Send {
    fn name(&self) -> &'static str;

    fn log_config(&mut self, _run_id: &RunId, _config: &TrainConfig) -> TrainResult<()> {
        Ok(())
    }

    fn log_scalar(&mut self, event: &ScalarEvent) -> TrainResult<()>;

    /// Free-form progress line.
    fn log_message(&mut self, _message: &str) -> TrainResult<()> {
        Ok(())
    }

    /// A new best checkpoint was written.
    fn log_best_artifact(&mut self, _path: &Path, _epoch: usize, _score: f64) -> TrainResult<()> {
        Ok(())
    }

    fn finish(&mut self) -> TrainResult<()> {
        Ok(())
    }
}

/// Line-oriented append log (`exp_dir/logs.txt`).
pub struct RunLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl RunLog {
    pub fn open(path: impl Into<PathBuf>) -> TrainResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn line(&mut self, line: &str) -> TrainResult<()> {
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(())
    }
}

impl MetricSink for RunLog {
    fn name(&self) -> &'static str {
        "run_log"
    }

    fn log_config(&mut self, run_id: &RunId, config: &TrainConfig) -> TrainResult<()> {
        let body = serde_json::to_string(config).unwrap_or_default();
        self.line(&format!("Run {} config: {}", run_id, body))
    }

    fn log_scalar(&mut self, event: &ScalarEvent) -> TrainResult<()> {
        // Per-step losses belong in the scalar log
        if event.group() == "train" {
            return Ok(());
        }
        self.line(&format!(
            "({} @ epoch {}, step {}) {}: {}",
            event.group(),
            event.epoch,
            event.step,
            event.name,
            event.value
        ))
    }

    fn log_message(&mut self, message: &str) -> TrainResult<()> {
        self.line(message)
    }

    fn log_best_artifact(&mut self, path: &Path, epoch: usize, score: f64) -> TrainResult<()> {
        self.line(&format!(
            "Best model at epoch {} (score {}): {}",
            epoch,
            score,
            path.display()
        ))
    }
}

#[derive(Serialize)]
struct ScalarRecord<'a> {
    name: &'a str,
    value: f64,
    step: u64,
    epoch: usize,
    wall_time: f64,
}

/// JSONL time series, one file per group: `exp_dir/{train,val}/scalars.jsonl`.
pub struct ScalarLog {
    root: PathBuf,
    writers: Vec<(String, BufWriter<File>)>,
}

impl ScalarLog {
    pub const FILE_NAME: &'static str = "scalars.jsonl";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            writers: Vec::new(),
        }
    }

    pub fn path_for(&self, group: &str) -> PathBuf {
        self.root.join(group).join(Self::FILE_NAME)
    }

    fn writer(&mut self, group: &str) -> TrainResult<&mut BufWriter<File>> {
        let position = match self.writers.iter().position(|(g, _)| g == group) {
            Some(position) => position,
            None => {
                let path = self.path_for(group);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                self.writers.push((group.to_string(), BufWriter::new(file)));
                self.writers.len() - 1
            }
        };
        Ok(&mut self.writers[position].1)
    }
}

impl MetricSink for ScalarLog {
    fn name(&self) -> &'static str {
        "scalar_log"
    }

    fn log_scalar(&mut self, event: &ScalarEvent) -> TrainResult<()> {
        let record = ScalarRecord {
            name: &event.name,
            value: event.value,
            step: event.step,
            epoch: event.epoch,
            wall_time: Utc::now().timestamp_millis() as f64 / 1000.0,
        };
        let line = serde_json::to_string(&record).map_err(std::io::Error::other)?;
        let writer = self.writer(event.group())?;
        writeln!(writer, "{}", line)?;
        Ok(())
    }

    fn finish(&mut self) -> TrainResult<()> {
        for (_, writer) in &mut self.writers {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for ScalarLog {
    fn drop(&mut self) {
        for (_, writer) in &mut self.writers {
            let _ = writer.flush();
        }
    }
}

/// Mirrors events onto the `metrics` facade.
#[derive(Debug, Default)]
pub struct PrometheusSink;

impl MetricSink for PrometheusSink {
    fn name(&self) -> &'static str {
        "prometheus"
    }

    fn log_scalar(&mut self, event: &ScalarEvent) -> TrainResult<()> {
        match event.name.as_str() {
            aigv_models::events::TRAIN_LOSS => {
                metrics::gauge!("aigv_train_loss").set(event.value);
                metrics::counter!("aigv_train_steps_total").increment(1);
            }
            name => {
                metrics::gauge!("aigv_validation_metric", "metric" => name.to_string())
                    .set(event.value);
            }
        }
        metrics::gauge!("aigv_train_epoch").set(event.epoch as f64);
        Ok(())
    }

    fn log_best_artifact(&mut self, _path: &Path, _epoch: usize, score: f64) -> TrainResult<()> {
        metrics::gauge!("aigv_best_validation_score").set(score);
        metrics::counter!("aigv_best_checkpoints_total").increment(1);
        Ok(())
    }
}

/// Fans every call out to all sinks in order.
#[derive(Default)]
pub struct SinkSet {
    sinks: Vec<Box<dyn MetricSink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl MetricSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn push(&mut self, sink: Box<dyn MetricSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    fn each(&mut self, op: &str, mut f: impl FnMut(&mut dyn MetricSink) -> TrainResult<()>) {
        for sink in &mut self.sinks {
            if let Err(e) = f(sink.as_mut()) {
                warn!(sink = sink.name(), op, error = %e, "Metric sink failed");
            }
        }
    }

    pub fn config(&mut self, run_id: &RunId, config: &TrainConfig) {
        self.each("config", |s| s.log_config(run_id, config));
    }

    pub fn scalar(&mut self, event: ScalarEvent) {
        self.each("scalar", |s| s.log_scalar(&event));
    }

    pub fn message(&mut self, message: &str) {
        self.each("message", |s| s.log_message(message));
    }

    pub fn best_artifact(&mut self, path: &Path, epoch: usize, score: f64) {
        self.each("best_artifact", |s| s.log_best_artifact(path, epoch, score));
    }

    pub fn finish(&mut self) {
        self.each("finish", |s| s.finish());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aigv_models::events;

    #[test]
    fn test_scalar_log_splits_groups() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut log = ScalarLog::new(dir.path());
        log.log_scalar(&ScalarEvent::new(events::TRAIN_LOSS, 0.7, 1, 0)).unwrap();
        log.log_scalar(&ScalarEvent::new(events::TRAIN_LOSS, 0.6, 2, 0)).unwrap();
        log.log_scalar(&ScalarEvent::new(events::VAL_ACC, 0.9, 2, 0)).unwrap();
        log.finish().unwrap();

        let train = fs::read_to_string(log.path_for("train")).unwrap();
        let lines: Vec<serde_json::Value> =
            train.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["step"], 2);
        assert_eq!(lines[1]["name"], "train/loss");

        let val = fs::read_to_string(log.path_for("val")).unwrap();
        assert_eq!(val.lines().count(), 1);
    }

    #[test]
    fn test_run_log_appends() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("exp").join("logs.txt");

        let mut log = RunLog::open(&path).unwrap();
        log.log_message("first").unwrap();
        log.log_scalar(&ScalarEvent::new(events::TRAIN_LOSS, 0.5, 1, 0)).unwrap();
        log.log_scalar(&ScalarEvent::new(events::VAL_AP, 0.75, 10, 3)).unwrap();
        drop(log);

        let mut log = RunLog::open(&path).unwrap();
        log.log_message("second").unwrap();

        let body = fs::read_to_string(&path).unwrap();
        assert_eq!(
            body.lines().collect::<Vec<_>>(),
            ["first", "(val @ epoch 3, step 10) val/AP: 0.75", "second"]
        );
    }

    struct Failing;

    impl MetricSink for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn log_scalar(&mut self, _event: &ScalarEvent) -> TrainResult<()> {
            Err(std::io::Error::other("offline").into())
        }
    }

    #[test]
    fn test_failing_sink_does_not_block_others() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut sinks = SinkSet::new().with(Failing).with(ScalarLog::new(dir.path()));
        sinks.scalar(ScalarEvent::new(events::VAL_TNR, 0.5, 3, 1));
        sinks.finish();

        let val = fs::read_to_string(dir.path().join("val").join(ScalarLog::FILE_NAME)).unwrap();
        assert_eq!(val.lines().count(), 1);
    }
}
