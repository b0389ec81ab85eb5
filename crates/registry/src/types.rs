//! Model URIs and registered versions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::RegistryError;

const RUNS_SCHEME: &str = "runs:/";

/// Reference to a model artifact logged under a run: `runs:/<run_id>/<path>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelUri {
    pub run_id: String,
    pub artifact_path: String,
}

impl ModelUri {
    pub fn new(run_id: impl Into<String>, artifact_path: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            artifact_path: artifact_path.into(),
        }
    }
}

impl fmt::Display for ModelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{RUNS_SCHEME}{}/{}", self.run_id, self.artifact_path)
    }
}

impl FromStr for ModelUri {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RegistryError::InvalidModelUri(s.to_string());
        let rest = s.strip_prefix(RUNS_SCHEME).ok_or_else(invalid)?;
        let (run_id, artifact_path) = rest
            .trim_start_matches('/')
            .split_once('/')
            .ok_or_else(invalid)?;
        let artifact_path = artifact_path.trim_matches('/');
        if run_id.is_empty() || artifact_path.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(run_id, artifact_path))
    }
}

/// One registered version of a named model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    /// Starts at 1 and increases by one per registration of `name`
    pub version: u64,
    /// The `runs:/` URI the version was registered from
    pub source: String,
    pub run_id: String,
    /// Milliseconds since the Unix epoch
    pub creation_timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_uri_format() {
        let uri = ModelUri::new("abc123", "models_mlflow");
        assert_eq!(uri.to_string(), "runs:/abc123/models_mlflow");
        assert_eq!("runs:/abc123/models_mlflow".parse::<ModelUri>().unwrap(), uri);
    }

    #[test]
    fn test_nested_artifact_path() {
        let uri: ModelUri = "runs:/abc123/models/gbdt/".parse().unwrap();
        assert_eq!(uri.artifact_path, "models/gbdt");
    }

    #[test]
    fn test_rejects_malformed_uris() {
        for raw in ["models:/taxi/1", "runs:/abc123", "runs://models", "runs:/abc123/"] {
            assert!(raw.parse::<ModelUri>().is_err(), "{raw} should not parse");
        }
    }
}
