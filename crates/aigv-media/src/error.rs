//! Error types for media operations.

use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during frame extraction and flow estimation.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    /// The video could not be opened or decoding stopped mid-stream.
    #[error("Decode failed: {message}")]
    Decode {
        message: String,
        stderr: Option<String>,
    },

    /// Flow estimation failed for the pair starting at frame `pair`.
    #[error("Flow estimation failed for pair {pair}: {message}")]
    Estimation { pair: usize, message: String },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a decode error.
    pub fn decode(message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::Decode {
            message: message.into(),
            stderr,
        }
    }

    /// Create an estimation error for the pair starting at `pair`.
    pub fn estimation(pair: usize, message: impl Into<String>) -> Self {
        Self::Estimation {
            pair,
            message: message.into(),
        }
    }

    /// Create a model not found error.
    pub fn model_not_found(path: impl Into<String>) -> Self {
        Self::ModelNotFound(path.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Attach a pair index to an error raised inside an estimator.
    pub fn for_pair(self, pair: usize) -> Self {
        match self {
            Self::Estimation { message, .. } => Self::Estimation { pair, message },
            other => Self::Estimation {
                pair,
                message: other.to_string(),
            },
        }
    }
}
