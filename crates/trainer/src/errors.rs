use taxi_duration_core::CoreError;
use taxi_duration_tracking::TrackingError;
use thiserror::Error;

/// Errors returned by the loader, the trainer and the pipeline.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("missing column {column:?} in {origin}")]
    MissingColumn { column: String, origin: String },

    #[error("unsupported data format: {0}")]
    UnsupportedFormat(String),

    #[error("fetch error: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("training error: {0}")]
    Training(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("invalid ride: {0}")]
    InvalidRide(String),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Tracking(#[from] TrackingError),
}

pub type Result<T> = std::result::Result<T, TrainerError>;
