//! Trip-duration trainer
//!
//! Loads taxi trip records, engineers the `PU_DO` and `trip_distance`
//! features, trains a deterministic GBDT regressor with early stopping and
//! records the run in an experiment tracking store.

pub mod cart;
pub mod config;
pub mod dataset;
pub mod deterministic;
pub mod engineering;
pub mod errors;
pub mod pipeline;
pub mod predictor;
pub mod trainer;

pub use config::{ArtifactConfig, DataConfig, PipelineConfig};
pub use dataset::{ColumnConfig, DataFormat, DataSource, TripLoader, TripRecord, TripTable};
pub use deterministic::{LcgRng, SplitTieBreaker};
pub use engineering::{prepare_features, trip_duration_minutes, FeatureRecord, PreparedSplit, Ride};
pub use errors::{Result, TrainerError};
pub use pipeline::{run_pipeline, train_and_log, PipelineOutcome};
pub use predictor::DurationPredictor;
pub use trainer::{
    BoosterParams, GbdtTrainer, LabeledMatrix, Objective, TrainedBooster, TrainerConfig,
};
