//! Register a trained run's model in the model registry
//!
//! Configured through `MLFLOW_TRACKING_URI`, `RUN_ID`, `MODEL_NAME` and
//! `MODEL_ARTIFACT_PATH`. Exits 1 when a required variable is missing and 0
//! otherwise, even if registration fails. On success the new version number
//! is printed on stdout.

use clap::Parser;
use std::process::ExitCode;
use taxi_duration_registry::{run_promotion, PromoterConfig, RegistrationOutcome};
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "register-model")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Register a trained run's model in the model registry", long_about = None)]
struct Args {
    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
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
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {err}");
    }

    let config = match PromoterConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return ExitCode::from(1);
        }
    };

    let outcome = run_promotion(&config);
    if let RegistrationOutcome::Registered(version) = &outcome.registration {
        println!("{}", version.version);
    }
    ExitCode::from(outcome.exit_code())
}
