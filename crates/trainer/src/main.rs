//! Trip-duration training CLI
//!
//! Runs the training pipeline once and prints the finalized run id on stdout.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use taxi_duration_trainer::{run_pipeline, PipelineConfig};
use taxi_duration_tracking::TRACKING_URI_ENV;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "train-duration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train the taxi trip-duration model and log it to the tracking store", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Training split (URL or local path, .parquet or .csv)
    #[arg(long)]
    train_source: Option<String>,

    /// Validation split (URL or local path, .parquet or .csv)
    #[arg(long)]
    valid_source: Option<String>,

    /// Tracking server URI or local tracking directory
    #[arg(long, env = TRACKING_URI_ENV)]
    tracking_uri: Option<String>,

    /// Experiment name
    #[arg(long)]
    experiment: Option<String>,

    /// Number of boosting rounds
    #[arg(long)]
    num_boost_round: Option<usize>,

    /// Early stopping patience in rounds
    #[arg(long)]
    early_stopping_rounds: Option<usize>,

    /// Local directory for the preprocessor file
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Display name of the run
    #[arg(long)]
    run_name: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(source) = self.train_source {
            config.data.train_source = source;
        }
        if let Some(source) = self.valid_source {
            config.data.valid_source = source;
        }
        if let Some(uri) = self.tracking_uri {
            config.tracking.tracking_uri = uri;
        }
        if let Some(name) = self.experiment {
            config.tracking.experiment_name = name;
        }
        if let Some(rounds) = self.num_boost_round {
            config.training.num_boost_round = rounds;
        }
        if let Some(patience) = self.early_stopping_rounds {
            config.training.early_stopping_rounds = Some(patience);
        }
        if let Some(dir) = self.models_dir {
            config.artifacts.models_dir = dir;
        }
        if self.run_name.is_some() {
            config.artifacts.run_name = self.run_name;
        }

        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Trip-duration trainer v{}", env!("CARGO_PKG_VERSION"));

    let config = args.into_config()?;
    config.validate().context("Invalid configuration")?;

    info!("Training configuration:");
    info!("  Train source: {}", config.data.train_source);
    info!("  Validation source: {}", config.data.valid_source);
    info!("  Tracking URI: {}", config.tracking.tracking_uri);
    info!("  Experiment: {}", config.tracking.experiment_name);
    info!("  Boost rounds: {}", config.training.num_boost_round);
    info!("  Max depth: {}", config.training.params.max_depth);
    info!("  Learning rate: {}", config.training.params.learning_rate);

    let outcome = run_pipeline(&config).context("Training pipeline failed")?;

    info!("Training completed successfully");
    info!("  Run: {}", outcome.run_id);
    info!("  RMSE: {:.4}", outcome.rmse);
    info!("  Best iteration: {}", outcome.best_iteration);
    info!("  Model: {} ({})", outcome.model.model_uri, outcome.model.model_hash);
    info!("  Preprocessor: {}", outcome.preprocessor_path.display());

    println!("{}", outcome.run_id);
    Ok(())
}
