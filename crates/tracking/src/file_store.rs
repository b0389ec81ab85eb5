//! Local directory tracking store
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<experiment_id>/meta.json
//! <root>/<experiment_id>/<run_id>/meta.json
//! <root>/<experiment_id>/<run_id>/params.json
//! <root>/<experiment_id>/<run_id>/metrics.json
//! <root>/<experiment_id>/<run_id>/tags.json
//! <root>/<experiment_id>/<run_id>/artifacts/...
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::errors::{Result, TrackingError};
use crate::store::{check_artifact_path, TrackingStore};
use crate::types::{now_millis, Experiment, Metric, Run, RunData, RunInfo, RunStatus};

const META_FILE: &str = "meta.json";
const PARAMS_FILE: &str = "params.json";
const METRICS_FILE: &str = "metrics.json";
const TAGS_FILE: &str = "tags.json";
const ARTIFACTS_DIR: &str = "artifacts";

/// Tracking store backed by a directory tree
#[derive(Debug, Clone)]
pub struct FileTrackingStore {
    root: PathBuf,
}

impl FileTrackingStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        let root = fs::canonicalize(root.as_ref())?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local directory holding a run's artifacts
    pub fn artifact_dir(&self, run_id: &str) -> Result<PathBuf> {
        Ok(self.run_dir(run_id)?.join(ARTIFACTS_DIR))
    }

    fn experiments(&self) -> Result<Vec<Experiment>> {
        let mut experiments = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let meta = entry?.path().join(META_FILE);
            if meta.is_file() {
                experiments.push(read_json::<Experiment>(&meta)?);
            }
        }
        experiments.sort_by(|a, b| a.experiment_id.cmp(&b.experiment_id));
        Ok(experiments)
    }

    fn run_dir(&self, run_id: &str) -> Result<PathBuf> {
        if run_id.is_empty() || run_id.contains(['/', '\\', '.']) {
            return Err(TrackingError::RunNotFound(run_id.to_string()));
        }

        for experiment in self.experiments()? {
            let dir = self.root.join(&experiment.experiment_id).join(run_id);
            if dir.join(META_FILE).is_file() {
                return Ok(dir);
            }
        }
        Err(TrackingError::RunNotFound(run_id.to_string()))
    }

    fn active_run_dir(&self, run_id: &str) -> Result<PathBuf> {
        let dir = self.run_dir(run_id)?;
        let info: RunInfo = read_json(&dir.join(META_FILE))?;
        if info.status.is_terminal() {
            return Err(TrackingError::RunNotActive(run_id.to_string()));
        }
        Ok(dir)
    }
}

impl TrackingStore for FileTrackingStore {
    fn get_or_create_experiment(&self, name: &str) -> Result<String> {
        let experiments = self.experiments()?;
        if let Some(existing) = experiments.iter().find(|e| e.name == name) {
            return Ok(existing.experiment_id.clone());
        }

        let next_id = experiments
            .iter()
            .filter_map(|e| e.experiment_id.parse::<u64>().ok())
            .max()
            .map_or(1, |id| id + 1);
        let experiment_id = next_id.to_string();
        let dir = self.root.join(&experiment_id);
        fs::create_dir_all(&dir)?;

        let experiment = Experiment {
            experiment_id: experiment_id.clone(),
            name: name.to_string(),
            artifact_location: file_uri(&dir)?,
            creation_time: now_millis(),
        };
        write_json(&dir.join(META_FILE), &experiment)?;

        tracing::info!(experiment_id = %experiment_id, name, "Created experiment");
        Ok(experiment_id)
    }

    fn create_run(&self, experiment_id: &str, run_name: Option<&str>) -> Result<RunInfo> {
        let experiment_dir = self.root.join(experiment_id);
        if !experiment_dir.join(META_FILE).is_file() {
            return Err(TrackingError::ExperimentNotFound(experiment_id.to_string()));
        }

        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let run_dir = experiment_dir.join(&run_id);
        let artifacts = run_dir.join(ARTIFACTS_DIR);
        fs::create_dir_all(&artifacts)?;

        let info = RunInfo {
            run_id,
            experiment_id: experiment_id.to_string(),
            run_name: run_name.map(str::to_string),
            status: RunStatus::Running,
            start_time: now_millis(),
            end_time: None,
            artifact_uri: file_uri(&artifacts)?,
        };

        write_json(&run_dir.join(META_FILE), &info)?;
        write_json(&run_dir.join(PARAMS_FILE), &BTreeMap::<String, String>::new())?;
        write_json(&run_dir.join(METRICS_FILE), &Vec::<Metric>::new())?;
        write_json(&run_dir.join(TAGS_FILE), &BTreeMap::<String, String>::new())?;

        Ok(info)
    }

    fn get_run(&self, run_id: &str) -> Result<Run> {
        let dir = self.run_dir(run_id)?;
        Ok(Run {
            info: read_json(&dir.join(META_FILE))?,
            data: RunData {
                params: read_json(&dir.join(PARAMS_FILE))?,
                metrics: read_json(&dir.join(METRICS_FILE))?,
                tags: read_json(&dir.join(TAGS_FILE))?,
            },
        })
    }

    fn log_params(&self, run_id: &str, params: &BTreeMap<String, String>) -> Result<()> {
        let path = self.active_run_dir(run_id)?.join(PARAMS_FILE);
        let mut stored: BTreeMap<String, String> = read_json(&path)?;

        for (key, value) in params {
            match stored.get(key) {
                Some(existing) if existing != value => {
                    return Err(TrackingError::ParamConflict {
                        key: key.clone(),
                        existing: existing.clone(),
                        attempted: value.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    stored.insert(key.clone(), value.clone());
                }
            }
        }

        write_json(&path, &stored)
    }

    fn log_metric(&self, run_id: &str, metric: &Metric) -> Result<()> {
        let path = self.active_run_dir(run_id)?.join(METRICS_FILE);
        let mut metrics: Vec<Metric> = read_json(&path)?;
        metrics.push(metric.clone());
        write_json(&path, &metrics)
    }

    fn set_tag(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        let path = self.active_run_dir(run_id)?.join(TAGS_FILE);
        let mut tags: BTreeMap<String, String> = read_json(&path)?;
        tags.insert(key.to_string(), value.to_string());
        write_json(&path, &tags)
    }

    fn log_artifact(
        &self,
        run_id: &str,
        local_path: &Path,
        artifact_path: Option<&str>,
    ) -> Result<()> {
        let artifacts = self.active_run_dir(run_id)?.join(ARTIFACTS_DIR);
        copy_artifact(&artifacts, local_path, artifact_path)
    }

    fn artifact_exists(&self, run_id: &str, artifact_path: &str) -> Result<bool> {
        check_artifact_path(artifact_path)?;
        Ok(self.artifact_dir(run_id)?.join(artifact_path).exists())
    }

    fn update_run(&self, run_id: &str, status: RunStatus) -> Result<RunInfo> {
        let path = self.active_run_dir(run_id)?.join(META_FILE);
        let mut info: RunInfo = read_json(&path)?;

        info.status = status;
        if status.is_terminal() {
            info.end_time = Some(now_millis());
        }
        write_json(&path, &info)?;
        Ok(info)
    }
}

/// Copy `local_path` into `artifact_root/artifact_path/`
pub(crate) fn copy_artifact(
    artifact_root: &Path,
    local_path: &Path,
    artifact_path: Option<&str>,
) -> Result<()> {
    let file_name = local_path.file_name().ok_or_else(|| {
        TrackingError::InvalidArtifactPath(local_path.display().to_string())
    })?;

    let dest_dir = match artifact_path {
        Some(path) => {
            check_artifact_path(path)?;
            artifact_root.join(path)
        }
        None => artifact_root.to_path_buf(),
    };
    fs::create_dir_all(&dest_dir)?;
    fs::copy(local_path, dest_dir.join(file_name))?;
    Ok(())
}

fn file_uri(path: &Path) -> Result<String> {
    Url::from_file_path(path)
        .map(|u| u.to_string())
        .map_err(|_| TrackingError::InvalidUri(path.display().to_string()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}
