//! FFmpeg frame extraction and optical-flow rendering.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and FFprobe stream inspection
//! - Lazy RGB frame extraction with progress parsing from `-progress pipe:2`
//! - A PNG frame store keyed by zero-padded frame index
//! - Flow fields, input padding and Middlebury colour-wheel rendering
//! - A pairwise flow pipeline over pluggable flow estimators

pub mod command;
pub mod error;
pub mod flow;
pub mod frames;
pub mod probe;
pub mod progress;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand};
pub use error::{MediaError, MediaResult};
pub use flow::{
    ChannelOrder, FlowErrorPolicy, FlowEstimator, FlowField, FlowPipeline, FlowRenderer,
    FlowReport, InputPadder, OnnxFlowEstimator, PadMode,
};
pub use frames::{Frame, FrameExtractor, FrameSource, FrameStore, FrameStream};
pub use probe::{probe_video, VideoInfo};
pub use progress::ExtractionProgress;
