//! Trainer error types.

use std::path::PathBuf;

use aigv_models::{CheckpointLabel, ConfigError, MetricsError};
use thiserror::Error;

pub type TrainResult<T> = Result<T, TrainError>;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Checkpoint '{label}' I/O failed at {path}: {message}")]
    CheckpointIo {
        label: CheckpointLabel,
        path: PathBuf,
        message: String,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrainError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn checkpoint_io(
        label: CheckpointLabel,
        path: impl Into<PathBuf>,
        msg: impl Into<String>,
    ) -> Self {
        Self::CheckpointIo {
            label,
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// Whether the error must stop the run.
    ///
    /// Checkpoint writes are best-effort; everything else is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TrainError::CheckpointIo { .. })
    }
}

impl From<ConfigError> for TrainError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<MetricsError> for TrainError {
    fn from(e: MetricsError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<candle_core::Error> for TrainError {
    fn from(e: candle_core::Error) -> Self {
        Self::Model(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_checkpoint_io_is_non_fatal() {
        assert!(!TrainError::checkpoint_io(CheckpointLabel::Latest, "/x", "disk full").is_fatal());
        assert!(TrainError::validation("empty").is_fatal());
        assert!(TrainError::config("bad").is_fatal());
        assert!(TrainError::from(MetricsError::Empty).is_fatal());
    }
}
