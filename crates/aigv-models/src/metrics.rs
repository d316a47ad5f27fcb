//! Validation metrics and named scalar events.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::MonitoredMetric;

/// Probability above which a sample is predicted fake.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Names of the scalar events emitted to metric sinks.
pub mod events {
    pub const TRAIN_LOSS: &str = "train/loss";
    pub const VAL_AP: &str = "val/AP";
    pub const VAL_ACC: &str = "val/ACC";
    pub const VAL_AUC: &str = "val/AUC";
    pub const VAL_TPR: &str = "val/TPR";
    pub const VAL_TNR: &str = "val/TNR";
}

/// Errors computing metrics from a prediction set.
#[derive(Debug, Error, PartialEq)]
pub enum MetricsError {
    #[error("no predictions to score")]
    Empty,

    #[error("labels and predictions differ in length: {labels} vs {predictions}")]
    LengthMismatch { labels: usize, predictions: usize },

    #[error("only one class present in labels; AUC is undefined")]
    SingleClass,
}

/// Metrics over a held-out split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub struct ValidationMetrics {
    /// Average precision.
    pub ap: f64,
    /// Accuracy at the 0.5 decision threshold.
    pub acc: f64,
    /// Area under the ROC curve.
    pub auc: f64,
    /// Accuracy over fake samples.
    pub tpr: f64,
    /// Accuracy over real samples.
    pub tnr: f64,
}

impl ValidationMetrics {
    /// Score fake-probabilities against labels (`true` = fake).
    pub fn from_predictions(labels: &[bool], predictions: &[f64]) -> Result<Self, MetricsError> {
        if labels.len() != predictions.len() {
            return Err(MetricsError::LengthMismatch {
                labels: labels.len(),
                predictions: predictions.len(),
            });
        }
        if labels.is_empty() {
            return Err(MetricsError::Empty);
        }

        let positives = labels.iter().filter(|&&l| l).count();
        let negatives = labels.len() - positives;
        if positives == 0 || negatives == 0 {
            return Err(MetricsError::SingleClass);
        }

        let mut correct = 0usize;
        let mut fake_correct = 0usize;
        let mut real_correct = 0usize;
        for (&label, &p) in labels.iter().zip(predictions) {
            let predicted_fake = p > DECISION_THRESHOLD;
            if predicted_fake == label {
                correct += 1;
                if label {
                    fake_correct += 1;
                } else {
                    real_correct += 1;
                }
            }
        }

        Ok(Self {
            ap: average_precision(labels, predictions, positives),
            acc: correct as f64 / labels.len() as f64,
            auc: roc_auc(labels, predictions, positives, negatives),
            tpr: fake_correct as f64 / positives as f64,
            tnr: real_correct as f64 / negatives as f64,
        })
    }

    /// Value of the metric the early stopper monitors.
    pub fn get(&self, metric: MonitoredMetric) -> f64 {
        match metric {
            MonitoredMetric::Ap => self.ap,
            MonitoredMetric::Acc => self.acc,
            MonitoredMetric::Auc => self.auc,
            MonitoredMetric::Tpr => self.tpr,
            MonitoredMetric::Tnr => self.tnr,
        }
    }

    /// All five metrics as named scalar events, in emission order.
    pub fn events(&self) -> [(&'static str, f64); 5] {
        [
            (events::VAL_AP, self.ap),
            (events::VAL_ACC, self.acc),
            (events::VAL_AUC, self.auc),
            (events::VAL_TPR, self.tpr),
            (events::VAL_TNR, self.tnr),
        ]
    }
}

/// Step-wise average precision: sum of (R_n - R_{n-1}) * P_n over
/// descending distinct thresholds.
fn average_precision(labels: &[bool], predictions: &[f64], positives: usize) -> f64 {
    let mut order: Vec<usize> = (0..predictions.len()).collect();
    order.sort_by(|&a, &b| predictions[b].total_cmp(&predictions[a]));

    let mut ap = 0.0;
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut prev_recall = 0.0;
    let mut i = 0;
    while i < order.len() {
        let threshold = predictions[order[i]];
        // Ties share one operating point
        while i < order.len() && predictions[order[i]] == threshold {
            if labels[order[i]] {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        let recall = tp as f64 / positives as f64;
        let precision = tp as f64 / (tp + fp) as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
    }
    ap
}

/// ROC AUC via the rank-sum statistic with averaged ranks for ties.
fn roc_auc(labels: &[bool], predictions: &[f64], positives: usize, negatives: usize) -> f64 {
    let mut order: Vec<usize> = (0..predictions.len()).collect();
    order.sort_by(|&a, &b| predictions[a].total_cmp(&predictions[b]));

    let mut positive_rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j < order.len() && predictions[order[j]] == predictions[order[i]] {
            j += 1;
        }
        // Ranks are 1-based; tied block i..j shares the mean rank
        let mean_rank = (i + 1 + j) as f64 / 2.0;
        for &idx in &order[i..j] {
            if labels[idx] {
                positive_rank_sum += mean_rank;
            }
        }
        i = j;
    }

    let p = positives as f64;
    (positive_rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64)
}
