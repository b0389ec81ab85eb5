//! MLflow Model Registry over the REST API

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use taxi_duration_tracking::{MlflowClient, TrackingError, TrackingStore};
use url::Url;

use crate::errors::{RegistryError, Result};
use crate::types::{ModelUri, ModelVersion};
use crate::{check_model_name, ModelRegistry};

/// Registry on an MLflow tracking server
#[derive(Debug, Clone)]
pub struct MlflowRegistry {
    client: MlflowClient,
}

#[derive(Debug, Deserialize)]
struct ModelVersionEnvelope {
    model_version: WireModelVersion,
}

/// MLflow sends numeric fields of model versions as strings
#[derive(Debug, Deserialize)]
struct WireModelVersion {
    name: String,
    version: String,
    #[serde(default)]
    creation_timestamp: Option<serde_json::Value>,
    #[serde(default)]
    run_id: Option<String>,
}

impl MlflowRegistry {
    pub fn new(base: Url, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: MlflowClient::new(base, timeout)?,
        })
    }

    /// Create the registered model, tolerating one that already exists
    fn ensure_registered_model(&self, name: &str) -> Result<()> {
        match self
            .client
            .post::<_, serde_json::Value>("registered-models/create", &json!({ "name": name }))
        {
            Ok(_) => {
                tracing::info!(name, "Created registered model");
                Ok(())
            }
            Err(err) if err.has_code(TrackingError::RESOURCE_ALREADY_EXISTS) => {
                tracing::debug!(name, "Registered model already exists");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl ModelRegistry for MlflowRegistry {
    fn register_model(&self, uri: &ModelUri, name: &str) -> Result<ModelVersion> {
        check_model_name(name)?;

        let run = self.client.get_run(&uri.run_id)?;
        let source = format!(
            "{}/{}",
            run.info.artifact_uri.trim_end_matches('/'),
            uri.artifact_path
        );

        self.ensure_registered_model(name)?;
        let created: ModelVersionEnvelope = self.client.post(
            "model-versions/create",
            &json!({
                "name": name,
                "source": source,
                "run_id": uri.run_id,
            }),
        )?;

        let registered = convert(created.model_version, uri)?;
        tracing::info!(name, version = registered.version, %source, "Registered model version");
        Ok(registered)
    }
}

fn convert(wire: WireModelVersion, uri: &ModelUri) -> Result<ModelVersion> {
    let version = wire.version.parse::<u64>().map_err(|_| {
        RegistryError::MalformedResponse(format!("version {:?}", wire.version))
    })?;
    let creation_timestamp = match wire.creation_timestamp {
        Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or_default(),
        Some(serde_json::Value::String(s)) => s.parse().unwrap_or_default(),
        _ => 0,
    };

    Ok(ModelVersion {
        name: wire.name,
        version,
        source: uri.to_string(),
        run_id: wire.run_id.unwrap_or_else(|| uri.run_id.clone()),
        creation_timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_string_fields() {
        let envelope: ModelVersionEnvelope = serde_json::from_str(
            r#"{"model_version": {"name": "taxi-duration", "version": "3",
                "creation_timestamp": "1700000000000", "run_id": "abc",
                "status": "READY"}}"#,
        )
        .unwrap();
        let uri = ModelUri::new("abc", "models_mlflow");

        let version = convert(envelope.model_version, &uri).unwrap();
        assert_eq!(version.version, 3);
        assert_eq!(version.creation_timestamp, 1_700_000_000_000);
        assert_eq!(version.source, "runs:/abc/models_mlflow");
    }

    #[test]
    fn test_convert_rejects_non_numeric_version() {
        let wire = WireModelVersion {
            name: "taxi-duration".into(),
            version: "latest".into(),
            creation_timestamp: None,
            run_id: None,
        };
        let err = convert(wire, &ModelUri::new("abc", "models_mlflow")).unwrap_err();
        assert!(matches!(err, RegistryError::MalformedResponse(_)));
    }

    #[test]
    fn test_unreachable_server_is_transient() {
        let registry = MlflowRegistry::new(
            Url::parse("http://127.0.0.1:1").unwrap(),
            Duration::from_secs(2),
        )
        .unwrap();

        let err = registry
            .register_model(&ModelUri::new("abc", "models_mlflow"), "taxi-duration")
            .unwrap_err();
        assert!(err.is_transient(), "{err}");
    }
}
