//! Frame sequence to flow-image sequence.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::color_wheel::FlowRenderer;
use super::estimator::FlowEstimator;
use super::padder::{InputPadder, PadMode};
use crate::error::{MediaError, MediaResult};
use crate::frames::{Frame, FrameSource, FrameStore};

/// What to do when estimation fails for one pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowErrorPolicy {
    /// Stop the pipeline and return the error.
    #[default]
    Abort,
    /// Record the pair as skipped and continue. Leaves a gap in the flow
    /// index sequence.
    SkipPair,
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowReport {
    /// Frames pulled from the source
    pub frames_seen: usize,
    /// Indices of those frames, in the order they were seen
    pub frame_indices: Vec<usize>,
    /// Flow images written, in index order
    pub flow_paths: Vec<PathBuf>,
    /// First-frame indices of pairs skipped under [`FlowErrorPolicy::SkipPair`]
    pub skipped: Vec<usize>,
}

impl FlowReport {
    pub fn flow_count(&self) -> usize {
        self.flow_paths.len()
    }

    /// Where `store` keeps the frames of this run. Images left in the
    /// store by earlier runs are not included.
    pub fn frame_paths(&self, store: &FrameStore) -> Vec<PathBuf> {
        self.frame_indices.iter().map(|&i| store.path_for(i)).collect()
    }
}

/// Estimates and renders flow for every consecutive frame pair.
///
/// Pair `i` is `(frame[i], frame[i + 1])`; its image is stored under
/// frame `i`'s file name so flow and frame indices line up.
pub struct FlowPipeline {
    estimator: Arc<dyn FlowEstimator>,
    renderer: Arc<FlowRenderer>,
    pad_mode: PadMode,
    policy: FlowErrorPolicy,
}

impl FlowPipeline {
    pub fn new(estimator: Arc<dyn FlowEstimator>) -> Self {
        Self {
            estimator,
            renderer: Arc::new(FlowRenderer::default()),
            pad_mode: PadMode::default(),
            policy: FlowErrorPolicy::default(),
        }
    }

    pub fn with_renderer(mut self, renderer: FlowRenderer) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    pub fn with_pad_mode(mut self, pad_mode: PadMode) -> Self {
        self.pad_mode = pad_mode;
        self
    }

    pub fn with_policy(mut self, policy: FlowErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Drain `frames`, writing one flow image per pair into `store`.
    pub async fn run<S>(&self, frames: &mut S, store: &FrameStore) -> MediaResult<FlowReport>
    where
        S: FrameSource + ?Sized,
    {
        let mut report = FlowReport::default();
        let mut previous: Option<Frame> = None;

        info!(
            estimator = self.estimator.name(),
            policy = ?self.policy,
            store = %store.dir().display(),
            "Flow pipeline started"
        );

        while let Some(frame) = frames.next_frame().await? {
            report.frames_seen += 1;
            report.frame_indices.push(frame.index);

            if let Some(first) = previous.take() {
                let pair = first.index;
                let started = Instant::now();

                match self.render_pair(&first, &frame).await {
                    Ok(image) => {
                        let path = store.save(pair, Arc::new(image)).await?;
                        metrics::counter!("aigv_flow_pairs_total", "status" => "ok").increment(1);
                        metrics::histogram!("aigv_flow_pair_seconds")
                            .record(started.elapsed().as_secs_f64());
                        debug!(pair, path = %path.display(), "Flow image written");
                        report.flow_paths.push(path);
                    }
                    Err(e) => {
                        metrics::counter!("aigv_flow_pairs_total", "status" => "error").increment(1);
                        match self.policy {
                            FlowErrorPolicy::Abort => return Err(e),
                            FlowErrorPolicy::SkipPair => {
                                warn!(pair, error = %e, "Skipping frame pair");
                                report.skipped.push(pair);
                            }
                        }
                    }
                }
            }

            previous = Some(frame);
        }

        info!(
            frames = report.frames_seen,
            flow_images = report.flow_count(),
            skipped = report.skipped.len(),
            "Flow pipeline complete"
        );

        Ok(report)
    }

    /// Pad, estimate, crop and render one pair on the blocking pool.
    async fn render_pair(&self, first: &Frame, second: &Frame) -> MediaResult<RgbImage> {
        let pair = first.index;
        if first.image.dimensions() != second.image.dimensions() {
            return Err(MediaError::estimation(
                pair,
                format!(
                    "frame sizes differ: {:?} vs {:?}",
                    first.image.dimensions(),
                    second.image.dimensions()
                ),
            ));
        }

        let (width, height) = first.image.dimensions();
        let padder = InputPadder::new(width, height, self.pad_mode, self.estimator.pad_multiple());
        let (padded_width, padded_height) = padder.padded_dims();
        let estimator = Arc::clone(&self.estimator);
        let renderer = Arc::clone(&self.renderer);
        let a = Arc::clone(&first.image);
        let b = Arc::clone(&second.image);

        tokio::task::spawn_blocking(move || -> MediaResult<RgbImage> {
            let field = estimator.estimate(&padder.pad(&a), &padder.pad(&b))?;
            if (field.width(), field.height()) != (padded_width as usize, padded_height as usize) {
                return Err(MediaError::estimation(
                    pair,
                    format!(
                        "estimator returned a {}x{} field for {}x{} input",
                        field.width(),
                        field.height(),
                        padded_width,
                        padded_height
                    ),
                ));
            }
            let field = padder.unpad(&field)?;
            Ok(renderer.render(&field))
        })
        .await
        .map_err(|e| MediaError::estimation(pair, format!("estimation task failed: {}", e)))?
        .map_err(|e| e.for_pair(pair))
    }
}
