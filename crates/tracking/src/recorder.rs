//! Experiment recorder with scoped runs
//!
//! A run opened through [`ExperimentRecorder`] is always finalized:
//! [`ExperimentRecorder::with_run`] marks it `FINISHED` or `FAILED`
//! depending on the closure's result, and dropping an unfinished
//! [`ActiveRun`] marks it `FAILED`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use taxi_duration_core::Model;
use tracing::{info, warn};

use crate::config::{open_store, TrackingConfig};
use crate::errors::Result;
use crate::store::TrackingStore;
use crate::types::{Metric, RunInfo, RunStatus};

/// File name of the serialized model inside a model artifact
pub const MODEL_FILE: &str = "model.json";
/// Descriptor file written next to the model
pub const MLMODEL_FILE: &str = "MLmodel";
/// Flavor name recorded in the descriptor
pub const MODEL_FLAVOR: &str = "taxi_duration_gbdt";
/// Run tag listing the models logged by the run
pub const LOG_MODEL_HISTORY_TAG: &str = "mlflow.log-model.history";

/// Records runs of one experiment into a tracking store
pub struct ExperimentRecorder {
    store: Box<dyn TrackingStore>,
    experiment_id: String,
    experiment_name: String,
}

/// Outcome of [`ExperimentRecorder::with_run`]: the finalized run id and the closure's value
#[derive(Debug, Clone)]
pub struct RecordedRun<T> {
    pub run_id: String,
    pub value: T,
}

impl ExperimentRecorder {
    /// Resolve (or create) `experiment_name` in `store`
    pub fn new(store: Box<dyn TrackingStore>, experiment_name: &str) -> Result<Self> {
        let experiment_id = store.get_or_create_experiment(experiment_name)?;
        Ok(Self {
            store,
            experiment_id,
            experiment_name: experiment_name.to_string(),
        })
    }

    /// Open the store `config` points at and resolve its experiment
    pub fn open(config: &TrackingConfig) -> Result<Self> {
        Self::new(open_store(config)?, &config.experiment_name)
    }

    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    pub fn experiment_name(&self) -> &str {
        &self.experiment_name
    }

    pub fn store(&self) -> &dyn TrackingStore {
        self.store.as_ref()
    }

    /// Start a run. Prefer [`with_run`](Self::with_run); a run started here
    /// is marked failed on drop unless [`ActiveRun::finish`] is called.
    pub fn start_run(&self, run_name: Option<&str>) -> Result<ActiveRun<'_>> {
        let info = self.store.create_run(&self.experiment_id, run_name)?;
        info!(
            run_id = %info.run_id,
            experiment = %self.experiment_name,
            "Started run"
        );
        Ok(ActiveRun {
            store: self.store.as_ref(),
            info,
            closed: false,
        })
    }

    /// Run `f` inside a fresh run and finalize it on every exit path
    pub fn with_run<T, E, F>(
        &self,
        run_name: Option<&str>,
        f: F,
    ) -> std::result::Result<RecordedRun<T>, E>
    where
        F: FnOnce(&mut ActiveRun<'_>) -> std::result::Result<T, E>,
        E: From<crate::errors::TrackingError>,
    {
        let mut run = self.start_run(run_name)?;

        match f(&mut run) {
            Ok(value) => {
                let run_id = run.finish()?;
                Ok(RecordedRun { run_id, value })
            }
            Err(err) => {
                let run_id = run.run_id().to_string();
                if let Err(close_err) = run.end(RunStatus::Failed) {
                    warn!(run_id = %run_id, error = %close_err, "Failed to mark run as failed");
                }
                Err(err)
            }
        }
    }
}

/// Model artifact logged by [`ActiveRun::log_model`]
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedModel {
    pub run_id: String,
    pub artifact_path: String,
    /// `runs:/{run_id}/{artifact_path}`
    pub model_uri: String,
    pub model_hash: String,
}

/// Flavor section of the model descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlavorSpec {
    pub model_file: String,
    pub format_version: i32,
    pub scale: i64,
    pub num_trees: usize,
    pub num_features: usize,
    pub model_hash: String,
    pub code_version: String,
}

/// Descriptor stored next to a logged model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub artifact_path: String,
    pub run_id: String,
    pub utc_time_created: String,
    pub model_uuid: String,
    pub flavors: BTreeMap<String, FlavorSpec>,
}

/// A run that is open for logging
pub struct ActiveRun<'s> {
    store: &'s dyn TrackingStore,
    info: RunInfo,
    closed: bool,
}

impl<'s> ActiveRun<'s> {
    pub fn run_id(&self) -> &str {
        &self.info.run_id
    }

    pub fn info(&self) -> &RunInfo {
        &self.info
    }

    pub fn log_params(&self, params: &BTreeMap<String, String>) -> Result<()> {
        self.store.log_params(&self.info.run_id, params)
    }

    pub fn log_metric(&self, key: &str, value: f64) -> Result<()> {
        self.log_metric_at(key, value, 0)
    }

    pub fn log_metric_at(&self, key: &str, value: f64, step: u64) -> Result<()> {
        self.store
            .log_metric(&self.info.run_id, &Metric::now(key, value, step))
    }

    pub fn set_tag(&self, key: &str, value: &str) -> Result<()> {
        self.store.set_tag(&self.info.run_id, key, value)
    }

    pub fn log_artifact(&self, local_path: &Path, artifact_path: Option<&str>) -> Result<()> {
        self.store
            .log_artifact(&self.info.run_id, local_path, artifact_path)
    }

    /// Store `model` under `artifact_path` with its descriptor
    pub fn log_model(&self, model: &Model, artifact_path: &str) -> Result<LoggedModel> {
        let model_hash = model.hash_hex()?;
        let staging = tempfile::tempdir()?;

        let model_path = staging.path().join(MODEL_FILE);
        model.save_json(&model_path)?;

        let descriptor = ModelDescriptor {
            artifact_path: artifact_path.to_string(),
            run_id: self.info.run_id.clone(),
            utc_time_created: chrono::Utc::now()
                .format("%Y-%m-%d %H:%M:%S%.6f")
                .to_string(),
            model_uuid: uuid::Uuid::new_v4().simple().to_string(),
            flavors: BTreeMap::from([(
                MODEL_FLAVOR.to_string(),
                FlavorSpec {
                    model_file: MODEL_FILE.to_string(),
                    format_version: model.version,
                    scale: model.scale,
                    num_trees: model.num_trees(),
                    num_features: model.num_features,
                    model_hash: model_hash.clone(),
                    code_version: taxi_duration_core::VERSION.to_string(),
                },
            )]),
        };
        let descriptor_path = staging.path().join(MLMODEL_FILE);
        fs::write(&descriptor_path, serde_yaml::to_string(&descriptor)?)?;

        self.log_artifact(&model_path, Some(artifact_path))?;
        self.log_artifact(&descriptor_path, Some(artifact_path))?;
        self.set_tag(
            LOG_MODEL_HISTORY_TAG,
            &serde_json::to_string(&[&descriptor])?,
        )?;

        let logged = LoggedModel {
            run_id: self.info.run_id.clone(),
            artifact_path: artifact_path.to_string(),
            model_uri: format!("runs:/{}/{}", self.info.run_id, artifact_path),
            model_hash,
        };
        info!(model_uri = %logged.model_uri, "Logged model");
        Ok(logged)
    }

    /// Finalize as `FINISHED` and return the run id
    pub fn finish(self) -> Result<String> {
        self.end(RunStatus::Finished)
    }

    /// Finalize with `status` and return the run id
    pub fn end(mut self, status: RunStatus) -> Result<String> {
        self.close(status)?;
        Ok(self.info.run_id.clone())
    }

    fn close(&mut self, status: RunStatus) -> Result<()> {
        self.closed = true;
        self.info = self.store.update_run(&self.info.run_id, status)?;
        info!(run_id = %self.info.run_id, status = status.as_str(), "Closed run");
        Ok(())
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        warn!(run_id = %self.info.run_id, "Run dropped while active; marking as failed");
        if let Err(err) = self.close(RunStatus::Failed) {
            warn!(run_id = %self.info.run_id, error = %err, "Failed to mark run as failed");
        }
    }
}
