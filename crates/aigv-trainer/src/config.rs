//! Training configuration loading.
//!
//! Sources, lowest precedence first: built-in defaults, an optional config
//! file (`AIGV_TRAIN_CONFIG` or the path given on the command line), then
//! `AIGV__*` environment variables (`AIGV__BATCH_SIZE=32`).

use std::path::{Path, PathBuf};

use aigv_models::TrainConfig;
use config::{Config, Environment, File};
use tracing::info;

use crate::error::{TrainError, TrainResult};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "AIGV_TRAIN_CONFIG";

/// Prefix of per-field environment overrides.
pub const ENV_PREFIX: &str = "AIGV";

/// Resolve the config file: an explicit path wins over the environment.
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
}

/// Load and validate the training configuration.
pub fn load_config(explicit: Option<&Path>) -> TrainResult<TrainConfig> {
    let path = config_path(explicit);

    let mut builder = Config::builder();
    if let Some(path) = &path {
        if !path.exists() {
            return Err(TrainError::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config: TrainConfig = builder
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| TrainError::config(e.to_string()))?;
    config.validate_config()?;

    info!(
        exp_name = %config.exp_name,
        dataset_root = %config.dataset_root,
        source = ?path,
        "Training config loaded"
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_loads_file_with_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("train.json");
        fs::write(
            &path,
            r#"{"dataset_root": "data/aigv", "batch_size": 16, "earlystop_metric": "auc"}"#,
        )
        .unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.dataset_root, "data/aigv");
        assert_eq!(cfg.batch_size, 16);
        assert_eq!(cfg.nepoch, 100);
        assert_eq!(cfg.earlystop_metric, aigv_models::MonitoredMetric::Auc);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("train.toml");
        fs::write(&path, "dataset_root = \"d\"\nbatch_size = 0\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, TrainError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Some(Path::new("/nonexistent/train.toml"))).unwrap_err();
        assert!(matches!(err, TrainError::Config(_)));
    }
}
