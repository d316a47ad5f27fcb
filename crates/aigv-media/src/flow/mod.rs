//! Optical flow: estimation, padding, colour-wheel rendering and the
//! pairwise pipeline that ties them to a frame sequence.

pub mod color_wheel;
pub mod estimator;
pub mod field;
pub mod padder;
pub mod pipeline;

pub use color_wheel::{ChannelOrder, FlowRenderer};
pub use estimator::{FlowEstimator, OnnxFlowEstimator};
pub use field::FlowField;
pub use padder::{InputPadder, PadMode, DEFAULT_PAD_MULTIPLE};
pub use pipeline::{FlowErrorPolicy, FlowPipeline, FlowReport};
