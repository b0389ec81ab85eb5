//! Tracking configuration
//!
//! The tracking target is passed explicitly to whoever opens a store, so
//! several pipelines in one process can log to different backends.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::errors::{Result, TrackingError};
use crate::file_store::FileTrackingStore;
use crate::mlflow::MlflowClient;
use crate::store::TrackingStore;

/// Default MLflow tracking server
pub const DEFAULT_TRACKING_URI: &str = "http://localhost:5000";

/// Default experiment name
pub const DEFAULT_EXPERIMENT_NAME: &str = "nyc-taxi-experiment";

/// Environment variable overriding the tracking URI
pub const TRACKING_URI_ENV: &str = "MLFLOW_TRACKING_URI";

/// Where and under which experiment runs are recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// `http(s)://` MLflow server, `file://` URI or a bare directory path
    pub tracking_uri: String,
    /// Experiment the runs are grouped under
    pub experiment_name: String,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tracking_uri: DEFAULT_TRACKING_URI.to_string(),
            experiment_name: DEFAULT_EXPERIMENT_NAME.to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl TrackingConfig {
    /// Config targeting `tracking_uri` with default experiment settings
    pub fn with_uri(tracking_uri: impl Into<String>) -> Self {
        Self {
            tracking_uri: tracking_uri.into(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parsed tracking target
    pub fn target(&self) -> Result<TrackingUri> {
        TrackingUri::parse(&self.tracking_uri)
    }
}

/// Backend a tracking URI points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingUri {
    /// MLflow REST server
    Http(Url),
    /// Local directory tree
    File(PathBuf),
}

impl TrackingUri {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TrackingError::InvalidUri("empty tracking URI".to_string()));
        }

        match Url::parse(raw) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Ok(TrackingUri::Http(url)),
                "file" => url
                    .to_file_path()
                    .map(TrackingUri::File)
                    .map_err(|_| TrackingError::InvalidUri(raw.to_string())),
                other => Err(TrackingError::InvalidUri(format!(
                    "unsupported scheme {other:?} in {raw}"
                ))),
            },
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Ok(TrackingUri::File(PathBuf::from(raw)))
            }
            Err(err) => Err(TrackingError::InvalidUri(format!("{raw}: {err}"))),
        }
    }
}

/// Open the store a config points at
pub fn open_store(config: &TrackingConfig) -> Result<Box<dyn TrackingStore>> {
    match config.target()? {
        TrackingUri::Http(url) => {
            tracing::debug!(%url, "Using MLflow tracking server");
            Ok(Box::new(MlflowClient::new(url, config.request_timeout())?))
        }
        TrackingUri::File(path) => {
            tracing::debug!(path = %path.display(), "Using local file tracking store");
            Ok(Box::new(FileTrackingStore::open(path)?))
        }
    }
}
