//! Held-out validation.

use std::time::Instant;

use aigv_models::ValidationMetrics;
use tracing::debug;

use crate::dataset::BatchSource;
use crate::error::{TrainError, TrainResult};
use crate::trainer::Trainable;

/// Scores a model on held-out data.
pub trait Validator {
    fn validate(&mut self, model: &dyn Trainable) -> TrainResult<ValidationMetrics>;
}

/// Runs the model over every batch of a validation source.
pub struct DatasetValidator<B> {
    source: B,
}

impl<B: BatchSource> DatasetValidator<B> {
    pub fn new(source: B) -> Self {
        Self { source }
    }
}

impl<B: BatchSource> Validator for DatasetValidator<B> {
    fn validate(&mut self, model: &dyn Trainable) -> TrainResult<ValidationMetrics> {
        let started = Instant::now();
        let mut labels = Vec::with_capacity(self.source.num_samples());
        let mut predictions = Vec::with_capacity(self.source.num_samples());

        for index in 0..self.source.num_batches() {
            let batch = self.source.batch(0, index)?;
            let probabilities = model.predict(&batch)?;
            if probabilities.len() != batch.len() {
                return Err(TrainError::validation(format!(
                    "model returned {} predictions for {} samples",
                    probabilities.len(),
                    batch.len()
                )));
            }
            labels.extend_from_slice(&batch.labels);
            predictions.extend(probabilities);
        }

        let metrics = ValidationMetrics::from_predictions(&labels, &predictions)?;
        debug!(
            samples = labels.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Validation pass complete"
        );
        Ok(metrics)
    }
}
