//! Two-branch detection fusion.
//!
//! Both branches share one scoring path: preprocess every image, classify it,
//! and average the probabilities. The two branch means are then combined with
//! fixed equal weights into the final verdict.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use aigv_models::{Branch, FusionResult, DEFAULT_THRESHOLD};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::classifier::BranchClassifier;
use crate::error::{DetectError, DetectResult};
use crate::image_set::load_image_set;
use crate::preprocess::Preprocessor;

/// Images decoded in parallel before classification.
const PREPROCESS_CHUNK: usize = 32;

/// Runs both branch classifiers and fuses their means.
pub struct DetectionFusion {
    original: Arc<dyn BranchClassifier>,
    flow: Arc<dyn BranchClassifier>,
    preprocessor: Preprocessor,
    threshold: f64,
}

impl DetectionFusion {
    pub fn new(original: Arc<dyn BranchClassifier>, flow: Arc<dyn BranchClassifier>) -> Self {
        Self {
            original,
            flow,
            preprocessor: Preprocessor::default(),
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    /// Decision threshold; a combined probability equal to it is fake.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score both image sets and combine.
    ///
    /// The original branch is scored first; any failure aborts before the
    /// flow branch runs.
    pub fn detect(
        &self,
        original_paths: &[PathBuf],
        flow_paths: &[PathBuf],
    ) -> DetectResult<FusionResult> {
        let original_mean = self.score_branch(Branch::Original, original_paths)?;
        let flow_mean = self.score_branch(Branch::OpticalFlow, flow_paths)?;

        let result = FusionResult::combine(
            original_mean,
            flow_mean,
            self.threshold,
            original_paths.len(),
            flow_paths.len(),
        );

        info!(
            original = original_mean,
            flow = flow_mean,
            combined = result.combined_probability,
            threshold = self.threshold,
            verdict = %result.verdict,
            "Fusion complete"
        );

        Ok(result)
    }

    /// Load both sets from directories, then [`detect`](Self::detect).
    pub fn detect_dirs(&self, original_dir: &Path, flow_dir: &Path) -> DetectResult<FusionResult> {
        let original = load_image_set(original_dir)?;
        let flow = load_image_set(flow_dir)?;
        self.detect(&original, &flow)
    }

    /// Mean fake-probability over one branch's images.
    pub fn score_branch(&self, branch: Branch, paths: &[PathBuf]) -> DetectResult<f64> {
        if paths.is_empty() {
            return Err(DetectError::empty_input(branch));
        }

        let classifier = match branch {
            Branch::Original => &self.original,
            Branch::OpticalFlow => &self.flow,
        };
        let started = Instant::now();
        let mut total = 0.0f64;

        for chunk in paths.chunks(PREPROCESS_CHUNK) {
            let tensors: Vec<_> = chunk
                .par_iter()
                .map(|path| self.preprocessor.load(path))
                .collect();

            // Sequential so the summation order is fixed
            for (path, tensor) in chunk.iter().zip(tensors) {
                let tensor = tensor?;
                let probability = classifier
                    .classify(&tensor)
                    .map_err(|e| DetectError::classifier(branch, path, e.to_string()))?;

                if !(0.0..=1.0).contains(&probability) {
                    return Err(DetectError::classifier(
                        branch,
                        path,
                        format!("probability {} outside [0, 1]", probability),
                    ));
                }
                total += probability as f64;
            }
        }

        let mean = total / paths.len() as f64;
        let elapsed = started.elapsed();

        metrics::counter!("aigv_classified_images_total", "branch" => branch.as_str())
            .increment(paths.len() as u64);
        metrics::histogram!("aigv_branch_seconds", "branch" => branch.as_str())
            .record(elapsed.as_secs_f64());

        debug!(
            branch = %branch,
            adapter = classifier.name(),
            images = paths.len(),
            mean,
            elapsed_ms = elapsed.as_millis() as u64,
            "Branch scored"
        );

        Ok(mean)
    }
}
