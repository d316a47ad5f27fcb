//! Branch classifier training binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};

use aigv_detector::init_tracing;
use aigv_models::{RunId, TrainConfig};
use aigv_trainer::{
    load_config, BatchLoader, CandleTrainer, CheckpointStore, DatasetValidator, PrometheusSink,
    RunLog, ScalarLog, SinkSet, TrainingLoop,
};

/// Train a branch classifier.
#[derive(Debug, Parser)]
#[command(name = "aigv-train", version, about)]
struct Args {
    /// Config file (TOML/JSON/YAML). Falls back to `AIGV_TRAIN_CONFIG`.
    config: Option<PathBuf>,

    /// Print the configuration JSON schema and exit
    #[arg(long)]
    schema: bool,
}

fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let args = Args::parse();

    if args.schema {
        let schema = schemars::schema_for!(TrainConfig);
        match serde_json::to_string_pretty(&schema) {
            Ok(body) => println!("{}", body),
            Err(e) => {
                error!("Failed to render schema: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    info!("Starting aigv-train");

    if let Err(e) = run(args) {
        error!("Training failed: {:#}", e);
        std::process::exit(1);
    }
}

fn install_metrics_exporter() {
    let Ok(addr) = std::env::var("METRICS_ADDR") else {
        return;
    };
    match addr.parse::<SocketAddr>() {
        Ok(addr) => match PrometheusBuilder::new().with_http_listener(addr).install() {
            Ok(()) => info!(%addr, "Prometheus exporter listening"),
            Err(e) => warn!("Failed to install Prometheus exporter: {}", e),
        },
        Err(e) => warn!("Invalid METRICS_ADDR '{}': {}", addr, e),
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    install_metrics_exporter();

    let run_id = RunId::new();
    info!(run_id = %run_id, exp_dir = %config.exp_dir().display(), "Run initialized");

    let train_loader = BatchLoader::from_config(&config).context("Failed to load training data")?;
    let val_loader =
        BatchLoader::from_config(&config.val_config()).context("Failed to load validation data")?;

    let sinks = SinkSet::new()
        .with(RunLog::open(config.logs_path())?)
        .with(ScalarLog::new(config.exp_dir()))
        .with(PrometheusSink);

    let model = CandleTrainer::new(&config)?;
    let checkpoints = CheckpointStore::new(config.ckpt_dir(), run_id.clone(), &config.exp_name);
    let continue_train = config.continue_train;

    let mut training = TrainingLoop::new(
        config,
        run_id,
        model,
        train_loader,
        DatasetValidator::new(val_loader),
        checkpoints,
        sinks,
    );
    if continue_train {
        training.resume_latest()?;
    }

    let summary = training.run()?;
    info!(
        reason = ?summary.reason,
        epochs = summary.state.epoch,
        total_steps = summary.state.total_steps,
        best = ?summary.state.best_validation_score,
        best_checkpoint = ?summary.best_checkpoint,
        checkpoint_failures = summary.checkpoint_failures,
        "Training complete"
    );
    Ok(())
}
