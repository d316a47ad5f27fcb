//! Two-branch AI-generated video detection.
//!
//! This crate provides:
//! - Image preprocessing (centre crop, tensor conversion, normalisation)
//! - The `BranchClassifier` capability with ONNX Runtime and candle adapters
//! - The compact CNN backbone shared with the trainer
//! - `DetectionFusion`, which averages each branch and fuses the means

pub mod candle;
pub mod classifier;
pub mod error;
pub mod fusion;
pub mod image_set;
pub mod net;
pub mod onnx;
pub mod preprocess;
pub mod telemetry;

pub use candle::CandleBranchClassifier;
pub use classifier::{load_branch_classifier, sigmoid, BranchClassifier, ClassifierOptions};
pub use error::{DetectError, DetectResult};
pub use fusion::DetectionFusion;
pub use image_set::load_image_set;
pub use net::{batch_tensor, select_device, CompactCnn, ARCH};
pub use onnx::OnnxBranchClassifier;
pub use preprocess::{Augmentation, ImageTensor, Preprocessor, DEFAULT_CROP_SIZE};
pub use telemetry::init_tracing;
