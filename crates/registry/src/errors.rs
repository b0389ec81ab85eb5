//! Error types for the model registry

use taxi_duration_tracking::TrackingError;
use thiserror::Error;

/// Errors raised while registering a model version
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Model URI is not of the form `runs:/<run_id>/<path>`
    #[error("Invalid model URI: {0}")]
    InvalidModelUri(String),

    /// Registered model names must be non-empty
    #[error("Invalid model name: {0:?}")]
    InvalidModelName(String),

    /// The run exists but holds nothing at the artifact path
    #[error("No artifact at {artifact_path:?} in run {run_id}")]
    ArtifactNotFound {
        run_id: String,
        artifact_path: String,
    },

    /// Registry answered with something that is not a model version
    #[error("Malformed registry response: {0}")]
    MalformedResponse(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Tracking store or MLflow failure
    #[error(transparent)]
    Tracking(#[from] TrackingError),
}

impl RegistryError {
    /// Whether retrying later could succeed (network failure, HTTP 5xx or 429)
    pub fn is_transient(&self) -> bool {
        match self {
            RegistryError::Tracking(err) => err.is_transient(),
            _ => false,
        }
    }
}

impl From<sled::Error> for RegistryError {
    fn from(err: sled::Error) -> Self {
        RegistryError::Database(err.to_string())
    }
}

/// Missing or unusable promoter settings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    MissingVar(&'static str),
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let overloaded = RegistryError::Tracking(TrackingError::Api {
            status: 429,
            code: "REQUEST_LIMIT_EXCEEDED".into(),
            message: "slow down".into(),
        });
        let rejected = RegistryError::Tracking(TrackingError::Api {
            status: 400,
            code: "INVALID_PARAMETER_VALUE".into(),
            message: "bad name".into(),
        });

        assert!(overloaded.is_transient());
        assert!(!rejected.is_transient());
        assert!(!RegistryError::InvalidModelName(String::new()).is_transient());
        assert!(!RegistryError::Database("locked".into()).is_transient());
    }
}
