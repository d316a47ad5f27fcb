//! Error types for detection.

use std::path::PathBuf;

use aigv_media::MediaError;
use aigv_models::Branch;
use thiserror::Error;

/// Result type for detection operations.
pub type DetectResult<T> = Result<T, DetectError>;

/// Errors that can occur while classifying and fusing branches.
#[derive(Debug, Error)]
pub enum DetectError {
    /// A branch had no images to average over.
    #[error("No images available for the {branch} branch")]
    EmptyInput { branch: Branch },

    #[error("{branch} classifier failed on {path}: {message}")]
    Classifier {
        branch: Branch,
        path: PathBuf,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Failed to load image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DetectError {
    /// Create an empty-input error.
    pub fn empty_input(branch: Branch) -> Self {
        Self::EmptyInput { branch }
    }

    /// Create a classifier error.
    pub fn classifier(branch: Branch, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Classifier {
            branch,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an image load error.
    pub fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Image {
            path: path.into(),
            source,
        }
    }
}
