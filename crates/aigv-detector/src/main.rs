//! AI-generated video detection binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{error, info};

use aigv_detector::{
    init_tracing, load_branch_classifier, ClassifierOptions, DetectionFusion, Preprocessor, ARCH,
    DEFAULT_CROP_SIZE,
};
use aigv_media::{
    check_ffmpeg, check_ffprobe, ChannelOrder, FlowErrorPolicy, FlowPipeline, FlowRenderer,
    FrameExtractor, FrameStore, OnnxFlowEstimator, PadMode,
};
use aigv_models::{validate_threshold, Branch, ComputeDevice, FusionResult, DEFAULT_THRESHOLD};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    Abort,
    SkipPair,
}

impl From<PolicyArg> for FlowErrorPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Abort => FlowErrorPolicy::Abort,
            PolicyArg::SkipPair => FlowErrorPolicy::SkipPair,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PadModeArg {
    Sintel,
    Kitti,
}

impl From<PadModeArg> for PadMode {
    fn from(arg: PadModeArg) -> Self {
        match arg {
            PadModeArg::Sintel => PadMode::Sintel,
            PadModeArg::Kitti => PadMode::Kitti,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ChannelOrderArg {
    Rgb,
    Bgr,
}

impl From<ChannelOrderArg> for ChannelOrder {
    fn from(arg: ChannelOrderArg) -> Self {
        match arg {
            ChannelOrderArg::Rgb => ChannelOrder::Rgb,
            ChannelOrderArg::Bgr => ChannelOrder::Bgr,
        }
    }
}

/// Detect whether a video is AI-generated.
#[derive(Debug, Parser)]
#[command(name = "aigv-detect", version, about)]
struct Args {
    /// Optical-flow estimator (ONNX)
    #[arg(long = "flow-model", default_value = "raft_model/raft-things.onnx")]
    flow_model: PathBuf,

    /// Input video
    #[arg(short = 'p', long, default_value = "video/000000.mp4")]
    path: PathBuf,

    /// Directory for extracted frames
    #[arg(short = 'f', long, default_value = "frame/000000")]
    folder_original_path: PathBuf,

    /// Directory for flow images
    #[arg(long, default_value = "optical_result/000000")]
    folder_optical_flow_path: PathBuf,

    /// Flow-branch classifier checkpoint (.onnx or .safetensors)
    #[arg(long = "model-optical-flow-path", visible_alias = "mop", default_value = "checkpoints/optical.onnx")]
    model_optical_flow_path: PathBuf,

    /// RGB-branch classifier checkpoint (.onnx or .safetensors)
    #[arg(long = "model-original-path", visible_alias = "mor", default_value = "checkpoints/original.onnx")]
    model_original_path: PathBuf,

    /// Combined probabilities at or above this are fake. Must be within
    /// [0, 1]; other values would make the verdict constant.
    #[arg(short = 't', long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,

    /// Run on CPU instead of GPU
    #[arg(long)]
    use_cpu: bool,

    /// Classifier architecture for .safetensors checkpoints
    #[arg(long, default_value = ARCH)]
    arch: String,

    /// Apply ImageNet normalisation before classification
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    aug_norm: bool,

    /// Classifier input size
    #[arg(long, default_value_t = DEFAULT_CROP_SIZE)]
    crop_size: u32,

    /// Behaviour when flow estimation fails on a frame pair
    #[arg(long, value_enum, default_value = "abort")]
    flow_error_policy: PolicyArg,

    /// Vertical padding placement for the flow estimator
    #[arg(long, value_enum, default_value = "sintel")]
    pad_mode: PadModeArg,

    /// Channel order of written flow images. BGR matches flow images
    /// produced by OpenCV-based tooling.
    #[arg(long, value_enum, default_value = "bgr")]
    flow_channel_order: ChannelOrderArg,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn device(&self) -> ComputeDevice {
        if self.use_cpu {
            ComputeDevice::Cpu
        } else {
            ComputeDevice::Gpu
        }
    }
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let args = Args::parse();

    info!(
        video = %args.path.display(),
        device = ?args.device(),
        threshold = args.threshold,
        "Starting aigv-detect"
    );

    match run(args).await {
        Ok((result, json)) => {
            if json {
                match serde_json::to_string_pretty(&result) {
                    Ok(body) => println!("{}", body),
                    Err(e) => {
                        error!("Failed to serialize result: {}", e);
                        std::process::exit(1);
                    }
                }
            }
            println!("{}", result.verdict);
        }
        Err(e) => {
            error!("Detection failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> anyhow::Result<(FusionResult, bool)> {
    validate_threshold(args.threshold)?;
    check_ffmpeg()?;
    check_ffprobe()?;

    let estimator = Arc::new(
        OnnxFlowEstimator::new(&args.flow_model).context("Failed to load flow estimator")?,
    );

    let frame_store = FrameStore::create(&args.folder_original_path).await?;
    let flow_store = FrameStore::create(&args.folder_optical_flow_path).await?;

    let pipeline = FlowPipeline::new(estimator)
        .with_renderer(FlowRenderer::new(args.flow_channel_order.into()))
        .with_pad_mode(args.pad_mode.into())
        .with_policy(args.flow_error_policy.into());

    let mut frames = FrameExtractor::new(&args.path)
        .with_store(frame_store.clone())
        .open()
        .await
        .context("Failed to open video")?;

    let report = pipeline.run(&mut frames, &flow_store).await?;
    let original_paths = report.frame_paths(&frame_store);

    info!(
        frames = original_paths.len(),
        flows = report.flow_count(),
        skipped = report.skipped.len(),
        "Frames and flow images ready"
    );

    let options = ClassifierOptions {
        arch: args.arch.clone(),
        device: args.device(),
    };
    let preprocessor = Preprocessor::new(args.crop_size, args.aug_norm);
    let threshold = args.threshold;
    let original_model = args.model_original_path.clone();
    let flow_model = args.model_optical_flow_path.clone();
    let flow_paths = report.flow_paths;

    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<FusionResult> {
        let original = load_branch_classifier(&original_model, Branch::Original, &options)?;
        let flow = load_branch_classifier(&flow_model, Branch::OpticalFlow, &options)?;

        let fusion = DetectionFusion::new(Arc::from(original), Arc::from(flow))
            .with_preprocessor(preprocessor)
            .with_threshold(threshold);

        Ok(fusion.detect(&original_paths, &flow_paths)?)
    })
    .await
    .context("Detection task panicked")??;

    info!(
        original = result.original_mean_probability,
        flow = result.flow_mean_probability,
        combined = result.combined_probability,
        "Detection complete"
    );

    Ok((result, args.json))
}
