//! Tracking store abstraction

use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::Result;
use crate::types::{Metric, Run, RunInfo, RunStatus};

/// Backend that persists experiments, runs and their artifacts.
///
/// Implementations must reject writes to runs in a terminal status.
pub trait TrackingStore {
    /// Experiment id for `name`, creating the experiment if needed
    fn get_or_create_experiment(&self, name: &str) -> Result<String>;

    /// Start a new run in `RUNNING` status
    fn create_run(&self, experiment_id: &str, run_name: Option<&str>) -> Result<RunInfo>;

    /// Fetch a run with its logged data
    fn get_run(&self, run_id: &str) -> Result<Run>;

    /// Log params; a key already logged with a different value is an error
    fn log_params(&self, run_id: &str, params: &BTreeMap<String, String>) -> Result<()>;

    fn log_metric(&self, run_id: &str, metric: &Metric) -> Result<()>;

    fn set_tag(&self, run_id: &str, key: &str, value: &str) -> Result<()>;

    /// Upload a local file under `artifact_path` (the artifact root when `None`)
    fn log_artifact(&self, run_id: &str, local_path: &Path, artifact_path: Option<&str>)
        -> Result<()>;

    /// Whether anything exists at `artifact_path` in the run's artifacts
    fn artifact_exists(&self, run_id: &str, artifact_path: &str) -> Result<bool>;

    /// Move the run to `status`, stamping the end time for terminal statuses
    fn update_run(&self, run_id: &str, status: RunStatus) -> Result<RunInfo>;
}

/// Reject artifact paths that are absolute or climb out of the artifact root
pub(crate) fn check_artifact_path(artifact_path: &str) -> Result<()> {
    let invalid = artifact_path.starts_with('/')
        || artifact_path.contains('\\')
        || artifact_path.split('/').any(|part| part == "..");
    if invalid {
        return Err(crate::errors::TrackingError::InvalidArtifactPath(
            artifact_path.to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_artifact_path() {
        assert!(check_artifact_path("models_mlflow").is_ok());
        assert!(check_artifact_path("a/b").is_ok());
        assert!(check_artifact_path("../escape").is_err());
        assert!(check_artifact_path("/abs").is_err());
    }
}
