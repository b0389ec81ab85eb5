//! Error types for experiment tracking

use taxi_duration_core::CoreError;
use thiserror::Error;

/// Errors returned by tracking stores and the experiment recorder
#[derive(Error, Debug)]
pub enum TrackingError {
    /// Tracking URI could not be interpreted
    #[error("Invalid tracking URI: {0}")]
    InvalidUri(String),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// MLflow answered with an error payload
    #[error("MLflow API error ({status}): {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Experiment not found
    #[error("Experiment not found: {0}")]
    ExperimentNotFound(String),

    /// Run not found
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// Run was already finalized
    #[error("Run {0} is not active")]
    RunNotActive(String),

    /// Params are write-once
    #[error("Param {key} already logged as {existing:?}, refusing {attempted:?}")]
    ParamConflict {
        key: String,
        existing: String,
        attempted: String,
    },

    /// Artifact path escapes the run's artifact root or is malformed
    #[error("Invalid artifact path: {0}")]
    InvalidArtifactPath(String),

    /// Artifact URI scheme has no uploader
    #[error("Unsupported artifact location: {0}")]
    UnsupportedArtifactUri(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Model serialization error
    #[error("Model error: {0}")]
    Core(#[from] CoreError),
}

impl TrackingError {
    /// MLflow error code for "does not exist"
    pub const RESOURCE_DOES_NOT_EXIST: &'static str = "RESOURCE_DOES_NOT_EXIST";
    /// MLflow error code for "already exists"
    pub const RESOURCE_ALREADY_EXISTS: &'static str = "RESOURCE_ALREADY_EXISTS";

    /// Whether the failure may go away on its own (network, overload, server fault)
    pub fn is_transient(&self) -> bool {
        match self {
            TrackingError::Http(err) => {
                err.is_connect()
                    || err.is_timeout()
                    || err.is_request()
                    || err.status().is_some_and(|s| s.is_server_error())
            }
            TrackingError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Whether this is an MLflow API error with the given code
    pub fn has_code(&self, expected: &str) -> bool {
        matches!(self, TrackingError::Api { code, .. } if code == expected)
    }
}

/// Result type for tracking operations
pub type Result<T> = std::result::Result<T, TrackingError>;
