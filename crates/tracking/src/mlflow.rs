//! MLflow REST API client
//!
//! Speaks the `api/2.0/mlflow` tracking endpoints with a blocking HTTP
//! client. Artifacts go through the tracking server's `mlflow-artifacts`
//! proxy, or are copied directly when the run's artifact root is a local
//! path.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::errors::{Result, TrackingError};
use crate::file_store::copy_artifact;
use crate::store::{check_artifact_path, TrackingStore};
use crate::types::{now_millis, Metric, Run, RunData, RunInfo, RunStatus};

const API_PREFIX: &str = "api/2.0/mlflow";
const ARTIFACTS_PROXY_PREFIX: &str = "api/2.0/mlflow-artifacts/artifacts";
const PROXY_SCHEME: &str = "mlflow-artifacts:";

/// Blocking MLflow REST client
#[derive(Debug, Clone)]
pub struct MlflowClient {
    base: Url,
    http: reqwest::blocking::Client,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

impl MlflowClient {
    pub fn new(base: Url, timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { base, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url> {
        let joined = format!("{}/{}", self.base.as_str().trim_end_matches('/'), path);
        Url::parse(&joined).map_err(|e| TrackingError::InvalidUri(format!("{joined}: {e}")))
    }

    /// POST a JSON body to `api/2.0/mlflow/{endpoint}`
    pub fn post<B, R>(&self, endpoint: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(&format!("{API_PREFIX}/{endpoint}"))?;
        tracing::debug!(%url, "POST");
        let response = self.http.post(url).json(body).send()?;
        decode(response)
    }

    /// GET `api/2.0/mlflow/{endpoint}` with query parameters
    pub fn get<R>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let url = self.url(&format!("{API_PREFIX}/{endpoint}"))?;
        tracing::debug!(%url, "GET");
        let response = self.http.get(url).query(query).send()?;
        decode(response)
    }

    fn upload_proxied(&self, proxy_path: &str, local_path: &Path, artifact_path: Option<&str>)
        -> Result<()>
    {
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TrackingError::InvalidArtifactPath(local_path.display().to_string()))?;

        let mut target = format!("{ARTIFACTS_PROXY_PREFIX}/{}", proxy_path.trim_matches('/'));
        if let Some(path) = artifact_path {
            target.push('/');
            target.push_str(path.trim_matches('/'));
        }
        target.push('/');
        target.push_str(file_name);

        let url = self.url(&target)?;
        tracing::debug!(%url, "PUT artifact");
        let response = self.http.put(url).body(fs::read(local_path)?).send()?;
        decode::<Value>(response).map(|_| ())
    }
}

fn decode<R: DeserializeOwned>(response: reqwest::blocking::Response) -> Result<R> {
    let status = response.status();
    if status.is_success() {
        let text = response.text()?;
        let text = if text.trim().is_empty() { "{}" } else { text.as_str() };
        return Ok(serde_json::from_str(text)?);
    }

    let text = response.text().unwrap_or_default();
    let body = serde_json::from_str::<ApiErrorBody>(&text).unwrap_or(ApiErrorBody {
        error_code: status.canonical_reason().unwrap_or("UNKNOWN").to_string(),
        message: text,
    });

    Err(TrackingError::Api {
        status: status.as_u16(),
        code: body.error_code,
        message: body.message,
    })
}

/// Local directory for `file:` URIs and bare absolute paths
fn local_artifact_root(artifact_uri: &str) -> Option<PathBuf> {
    if artifact_uri.starts_with('/') {
        return Some(PathBuf::from(artifact_uri));
    }
    Url::parse(artifact_uri)
        .ok()
        .filter(|u| u.scheme() == "file")
        .and_then(|u| u.to_file_path().ok())
}

// -- wire types ---------------------------------------------------------------

fn lenient_i64<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
struct WireRunInfo {
    run_id: String,
    experiment_id: String,
    #[serde(default)]
    run_name: Option<String>,
    status: RunStatus,
    #[serde(default, deserialize_with = "lenient_i64")]
    start_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    end_time: Option<i64>,
    #[serde(default)]
    artifact_uri: String,
}

impl From<WireRunInfo> for RunInfo {
    fn from(w: WireRunInfo) -> Self {
        RunInfo {
            run_id: w.run_id,
            experiment_id: w.experiment_id,
            run_name: w.run_name,
            status: w.status,
            start_time: w.start_time.unwrap_or_default(),
            end_time: w.end_time,
            artifact_uri: w.artifact_uri,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyValue {
    key: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct WireMetric {
    key: String,
    value: f64,
    #[serde(default, deserialize_with = "lenient_i64")]
    timestamp: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    step: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct WireRunData {
    #[serde(default)]
    params: Vec<KeyValue>,
    #[serde(default)]
    metrics: Vec<WireMetric>,
    #[serde(default)]
    tags: Vec<KeyValue>,
}

#[derive(Debug, Deserialize)]
struct WireRun {
    info: WireRunInfo,
    #[serde(default)]
    data: WireRunData,
}

#[derive(Debug, Deserialize)]
struct RunEnvelope {
    run: WireRun,
}

#[derive(Debug, Deserialize)]
struct RunInfoEnvelope {
    run_info: WireRunInfo,
}

#[derive(Debug, Deserialize)]
struct ExperimentIdEnvelope {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct ExperimentEnvelope {
    experiment: ExperimentIdEnvelope,
}

#[derive(Debug, Deserialize)]
struct ListArtifacts {
    #[serde(default)]
    files: Vec<Value>,
}

impl From<WireRun> for Run {
    fn from(w: WireRun) -> Self {
        Run {
            info: w.info.into(),
            data: RunData {
                params: w.data.params.into_iter().map(|kv| (kv.key, kv.value)).collect(),
                metrics: w
                    .data
                    .metrics
                    .into_iter()
                    .map(|m| Metric {
                        key: m.key,
                        value: m.value,
                        timestamp: m.timestamp.unwrap_or_default(),
                        step: m.step.unwrap_or_default().max(0) as u64,
                    })
                    .collect(),
                tags: w.data.tags.into_iter().map(|kv| (kv.key, kv.value)).collect(),
            },
        }
    }
}

impl TrackingStore for MlflowClient {
    fn get_or_create_experiment(&self, name: &str) -> Result<String> {
        match self.get::<ExperimentEnvelope>(
            "experiments/get-by-name",
            &[("experiment_name", name)],
        ) {
            Ok(found) => Ok(found.experiment.experiment_id),
            Err(err) if err.has_code(TrackingError::RESOURCE_DOES_NOT_EXIST) => {
                let created: ExperimentIdEnvelope =
                    self.post("experiments/create", &json!({ "name": name }))?;
                tracing::info!(experiment_id = %created.experiment_id, name, "Created experiment");
                Ok(created.experiment_id)
            }
            Err(err) => Err(err),
        }
    }

    fn create_run(&self, experiment_id: &str, run_name: Option<&str>) -> Result<RunInfo> {
        let mut body = json!({
            "experiment_id": experiment_id,
            "start_time": now_millis(),
            "tags": [{ "key": "mlflow.source.name", "value": "train-duration" }],
        });
        if let Some(name) = run_name {
            body["run_name"] = json!(name);
        }

        let created: RunEnvelope = self.post("runs/create", &body)?;
        Ok(created.run.info.into())
    }

    fn get_run(&self, run_id: &str) -> Result<Run> {
        match self.get::<RunEnvelope>("runs/get", &[("run_id", run_id)]) {
            Ok(found) => Ok(found.run.into()),
            Err(err) if err.has_code(TrackingError::RESOURCE_DOES_NOT_EXIST) => {
                Err(TrackingError::RunNotFound(run_id.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    fn log_params(&self, run_id: &str, params: &BTreeMap<String, String>) -> Result<()> {
        let params: Vec<KeyValue> = params
            .iter()
            .map(|(k, v)| KeyValue {
                key: k.clone(),
                value: v.clone(),
            })
            .collect();

        self.post::<_, Value>("runs/log-batch", &json!({ "run_id": run_id, "params": params }))?;
        Ok(())
    }

    fn log_metric(&self, run_id: &str, metric: &Metric) -> Result<()> {
        self.post::<_, Value>(
            "runs/log-metric",
            &json!({
                "run_id": run_id,
                "key": metric.key,
                "value": metric.value,
                "timestamp": metric.timestamp,
                "step": metric.step,
            }),
        )?;
        Ok(())
    }

    fn set_tag(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        self.post::<_, Value>(
            "runs/set-tag",
            &json!({ "run_id": run_id, "key": key, "value": value }),
        )?;
        Ok(())
    }

    fn log_artifact(
        &self,
        run_id: &str,
        local_path: &Path,
        artifact_path: Option<&str>,
    ) -> Result<()> {
        if let Some(path) = artifact_path {
            check_artifact_path(path)?;
        }

        let run = self.get_run(run_id)?;
        let artifact_uri = run.info.artifact_uri;

        if let Some(proxy_path) = artifact_uri.strip_prefix(PROXY_SCHEME) {
            return self.upload_proxied(proxy_path, local_path, artifact_path);
        }
        if let Some(root) = local_artifact_root(&artifact_uri) {
            return copy_artifact(&root, local_path, artifact_path);
        }
        Err(TrackingError::UnsupportedArtifactUri(artifact_uri))
    }

    fn artifact_exists(&self, run_id: &str, artifact_path: &str) -> Result<bool> {
        check_artifact_path(artifact_path)?;
        match self.get::<ListArtifacts>(
            "artifacts/list",
            &[("run_id", run_id), ("path", artifact_path)],
        ) {
            Ok(listing) => Ok(!listing.files.is_empty()),
            Err(err) if err.has_code(TrackingError::RESOURCE_DOES_NOT_EXIST) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn update_run(&self, run_id: &str, status: RunStatus) -> Result<RunInfo> {
        let mut body = json!({ "run_id": run_id, "status": status.as_str() });
        if status.is_terminal() {
            body["end_time"] = json!(now_millis());
        }

        let updated: RunInfoEnvelope = self.post("runs/update", &body)?;
        Ok(updated.run_info.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_envelope_decoding() {
        let body = r#"{
            "run": {
                "info": {
                    "run_id": "abc123",
                    "run_uuid": "abc123",
                    "experiment_id": "1",
                    "run_name": "bold-owl-42",
                    "status": "RUNNING",
                    "start_time": "1700000000000",
                    "artifact_uri": "mlflow-artifacts:/1/abc123/artifacts",
                    "lifecycle_stage": "active"
                },
                "data": {
                    "params": [{"key": "max_depth", "value": "30"}],
                    "metrics": [{"key": "rmse", "value": 6.1, "timestamp": 1700000000001, "step": 0}]
                }
            }
        }"#;

        let run: Run = serde_json::from_str::<RunEnvelope>(body).unwrap().run.into();
        assert_eq!(run.info.run_id, "abc123");
        assert_eq!(run.info.start_time, 1_700_000_000_000);
        assert_eq!(run.info.status, RunStatus::Running);
        assert_eq!(run.data.params["max_depth"], "30");
        assert_eq!(run.data.metrics[0].value, 6.1);
        assert!(run.data.tags.is_empty());
    }

    #[test]
    fn test_local_artifact_root() {
        assert_eq!(
            local_artifact_root("file:///srv/mlruns/1/abc/artifacts"),
            Some(PathBuf::from("/srv/mlruns/1/abc/artifacts"))
        );
        assert_eq!(
            local_artifact_root("/srv/mlruns/1/abc/artifacts"),
            Some(PathBuf::from("/srv/mlruns/1/abc/artifacts"))
        );
        assert_eq!(local_artifact_root("s3://bucket/1/abc/artifacts"), None);
    }

    #[test]
    fn test_url_join_keeps_base_path() {
        let client = MlflowClient::new(
            Url::parse("http://tracking.local/mlflow/").unwrap(),
            Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(
            client.url("api/2.0/mlflow/runs/get").unwrap().as_str(),
            "http://tracking.local/mlflow/api/2.0/mlflow/runs/get"
        );
    }
}
