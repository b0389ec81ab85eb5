//! Pipeline configuration
//!
//! Loaded from TOML; every section and field is optional and falls back to
//! the defaults below. `MLFLOW_TRACKING_URI` overrides the tracking URI.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use taxi_duration_tracking::{TrackingConfig, TrackingUri};
use tracing::info;

use crate::dataset::ColumnConfig;
use crate::errors::{Result, TrainerError};
use crate::trainer::TrainerConfig;

/// Default training split: green taxi trips, January 2021
pub const DEFAULT_TRAIN_SOURCE: &str =
    "https://d37ci6vzurychx.cloudfront.net/trip-data/green_tripdata_2021-01.parquet";
/// Default validation split: green taxi trips, February 2021
pub const DEFAULT_VALID_SOURCE: &str =
    "https://d37ci6vzurychx.cloudfront.net/trip-data/green_tripdata_2021-02.parquet";

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub tracking: TrackingConfig,
    pub training: TrainerConfig,
    pub artifacts: ArtifactConfig,
}

/// Where the two splits come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// URL or local path of the training split
    pub train_source: String,
    /// URL or local path of the validation split
    pub valid_source: String,
    pub columns: ColumnConfig,
    /// Download timeout in seconds
    pub download_timeout_secs: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            train_source: DEFAULT_TRAIN_SOURCE.to_string(),
            valid_source: DEFAULT_VALID_SOURCE.to_string(),
            columns: ColumnConfig::default(),
            download_timeout_secs: 300,
        }
    }
}

impl DataConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// Local and tracked artifact locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Local directory receiving the preprocessor file
    pub models_dir: PathBuf,
    pub preprocessor_file: String,
    /// Run artifact path of the preprocessor
    pub preprocessor_artifact_path: String,
    /// Run artifact path of the model
    pub model_artifact_path: String,
    /// Optional display name of the run
    pub run_name: Option<String>,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            preprocessor_file: "preprocessor.json".to_string(),
            preprocessor_artifact_path: "preprocessor".to_string(),
            model_artifact_path: "models_mlflow".to_string(),
            run_name: None,
        }
    }
}

impl ArtifactConfig {
    pub fn preprocessor_path(&self) -> PathBuf {
        self.models_dir.join(&self.preprocessor_file)
    }
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check the configuration before any data is fetched
    pub fn validate(&self) -> Result<()> {
        if self.data.train_source.trim().is_empty() {
            return Err(TrainerError::Config("data.train_source is empty".to_string()));
        }
        if self.data.valid_source.trim().is_empty() {
            return Err(TrainerError::Config("data.valid_source is empty".to_string()));
        }
        if self.tracking.experiment_name.trim().is_empty() {
            return Err(TrainerError::Config(
                "tracking.experiment_name is empty".to_string(),
            ));
        }
        TrackingUri::parse(&self.tracking.tracking_uri)?;

        for (key, value) in [
            ("artifacts.preprocessor_file", &self.artifacts.preprocessor_file),
            (
                "artifacts.preprocessor_artifact_path",
                &self.artifacts.preprocessor_artifact_path,
            ),
            (
                "artifacts.model_artifact_path",
                &self.artifacts.model_artifact_path,
            ),
        ] {
            if value.trim().is_empty() {
                return Err(TrainerError::Config(format!("{key} is empty")));
            }
        }

        self.training.validate()
    }
}
