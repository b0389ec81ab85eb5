//! Experiment tracking for trip-duration training runs
//!
//! Provides a [`TrackingStore`] abstraction with two backends:
//! a local directory store and an MLflow REST client. The
//! [`ExperimentRecorder`] opens runs against a store and guarantees
//! that every run it opens is finalized.

pub mod config;
pub mod errors;
pub mod file_store;
pub mod mlflow;
pub mod recorder;
pub mod store;
pub mod types;

pub use config::{
    open_store, TrackingConfig, TrackingUri, DEFAULT_EXPERIMENT_NAME, DEFAULT_TRACKING_URI,
    TRACKING_URI_ENV,
};
pub use errors::{Result, TrackingError};
pub use file_store::FileTrackingStore;
pub use mlflow::MlflowClient;
pub use recorder::{
    ActiveRun, ExperimentRecorder, LoggedModel, ModelDescriptor, RecordedRun, MLMODEL_FILE,
    MODEL_FILE,
};
pub use store::TrackingStore;
pub use types::{Experiment, Metric, Run, RunData, RunInfo, RunStatus};
