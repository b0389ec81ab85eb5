//! Promote a trained run into the model registry
//!
//! Settings come from the environment:
//!
//! | variable | required | default |
//! |---|---|---|
//! | `MLFLOW_TRACKING_URI` | no | `http://localhost:5000` |
//! | `RUN_ID` | yes | |
//! | `MODEL_NAME` | yes | |
//! | `MODEL_ARTIFACT_PATH` | no | `models_mlflow` |
//!
//! Missing required settings are a [`ConfigError`]. Once settings are
//! valid, a registry failure is reported in the outcome and never turns
//! into an error: the training run itself already succeeded.

use std::time::Duration;
use taxi_duration_tracking::{TrackingUri, DEFAULT_TRACKING_URI, TRACKING_URI_ENV};
use tracing::{info, warn};

use crate::errors::{ConfigError, RegistryError, Result};
use crate::local::LocalRegistry;
use crate::mlflow::MlflowRegistry;
use crate::types::{ModelUri, ModelVersion};
use crate::ModelRegistry;

pub const RUN_ID_ENV: &str = "RUN_ID";
pub const MODEL_NAME_ENV: &str = "MODEL_NAME";
pub const MODEL_ARTIFACT_PATH_ENV: &str = "MODEL_ARTIFACT_PATH";

/// Artifact path the trainer logs its model under
pub const DEFAULT_MODEL_ARTIFACT_PATH: &str = "models_mlflow";

const REGISTRY_TIMEOUT: Duration = Duration::from_secs(30);

/// What to register and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoterConfig {
    pub tracking_uri: String,
    pub run_id: String,
    pub model_name: String,
    pub artifact_path: String,
}

impl PromoterConfig {
    /// Read settings from the process environment
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> std::result::Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let run_id = var(RUN_ID_ENV).ok_or(ConfigError::MissingVar(RUN_ID_ENV))?;
        let model_name = var(MODEL_NAME_ENV).ok_or(ConfigError::MissingVar(MODEL_NAME_ENV))?;

        Ok(Self {
            tracking_uri: var(TRACKING_URI_ENV)
                .unwrap_or_else(|| DEFAULT_TRACKING_URI.to_string()),
            run_id,
            model_name,
            artifact_path: var(MODEL_ARTIFACT_PATH_ENV)
                .unwrap_or_else(|| DEFAULT_MODEL_ARTIFACT_PATH.to_string()),
        })
    }

    pub fn model_uri(&self) -> ModelUri {
        ModelUri::new(&self.run_id, self.artifact_path.trim_matches('/'))
    }
}

/// Result of the registry call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered(ModelVersion),
    Failed {
        error: String,
        /// Network failure or an overloaded/failing server; retrying may help
        transient: bool,
    },
}

impl RegistrationOutcome {
    fn from_error(err: &RegistryError) -> Self {
        RegistrationOutcome::Failed {
            error: err.to_string(),
            transient: err.is_transient(),
        }
    }
}

/// A trained run and what became of its registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionOutcome {
    pub run_id: String,
    pub model_name: String,
    pub model_uri: ModelUri,
    pub registration: RegistrationOutcome,
}

impl PromotionOutcome {
    pub fn is_registered(&self) -> bool {
        matches!(self.registration, RegistrationOutcome::Registered(_))
    }

    /// Process exit code; the run was trained either way, so always success
    pub fn exit_code(&self) -> u8 {
        match self.registration {
            RegistrationOutcome::Registered(_) | RegistrationOutcome::Failed { .. } => 0,
        }
    }
}

/// Registry for a tracking URI: MLflow for `http(s)`, sled beside a local store otherwise
pub fn open_registry(tracking_uri: &str) -> Result<Box<dyn ModelRegistry>> {
    match TrackingUri::parse(tracking_uri)? {
        TrackingUri::Http(url) => Ok(Box::new(MlflowRegistry::new(url, REGISTRY_TIMEOUT)?)),
        TrackingUri::File(path) => Ok(Box::new(LocalRegistry::open(path)?)),
    }
}

/// Register the configured run's model once through `registry`
pub fn promote(config: &PromoterConfig, registry: &dyn ModelRegistry) -> PromotionOutcome {
    let model_uri = config.model_uri();
    info!("Registering model...");
    info!("  Tracking URI: {}", config.tracking_uri);
    info!("  Run ID: {}", config.run_id);
    info!("  Model URI: {}", model_uri);
    info!("  Model Name: {}", config.model_name);

    let registration = match registry.register_model(&model_uri, &config.model_name) {
        Ok(version) => {
            info!(
                name = %version.name,
                version = version.version,
                run_id = %config.run_id,
                "Model registered successfully"
            );
            RegistrationOutcome::Registered(version)
        }
        Err(err) => failed(&err, &config.run_id),
    };

    PromotionOutcome {
        run_id: config.run_id.clone(),
        model_name: config.model_name.clone(),
        model_uri,
        registration,
    }
}

/// Open the registry for `config` and promote; failing to open counts as a failed registration
pub fn run_promotion(config: &PromoterConfig) -> PromotionOutcome {
    match open_registry(&config.tracking_uri) {
        Ok(registry) => promote(config, registry.as_ref()),
        Err(err) => PromotionOutcome {
            run_id: config.run_id.clone(),
            model_name: config.model_name.clone(),
            model_uri: config.model_uri(),
            registration: failed(&err, &config.run_id),
        },
    }
}

fn failed(err: &RegistryError, run_id: &str) -> RegistrationOutcome {
    let outcome = RegistrationOutcome::from_error(err);
    warn!(
        error = %err,
        transient = err.is_transient(),
        run_id,
        "Model registration failed; the model was still trained successfully"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashMap;
    use taxi_duration_tracking::TrackingError;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    struct CountingRegistry {
        calls: Cell<usize>,
        fail_with: Option<fn() -> RegistryError>,
    }

    impl CountingRegistry {
        fn new(fail_with: Option<fn() -> RegistryError>) -> Self {
            Self {
                calls: Cell::new(0),
                fail_with,
            }
        }
    }

    impl ModelRegistry for CountingRegistry {
        fn register_model(&self, uri: &ModelUri, name: &str) -> Result<ModelVersion> {
            self.calls.set(self.calls.get() + 1);
            if let Some(fail) = self.fail_with {
                return Err(fail());
            }
            Ok(ModelVersion {
                name: name.to_string(),
                version: self.calls.get() as u64,
                source: uri.to_string(),
                run_id: uri.run_id.clone(),
                creation_timestamp: 0,
            })
        }
    }

    fn unavailable() -> RegistryError {
        RegistryError::Tracking(TrackingError::Api {
            status: 503,
            code: "TEMPORARILY_UNAVAILABLE".into(),
            message: "registry down".into(),
        })
    }

    fn missing_artifact() -> RegistryError {
        RegistryError::ArtifactNotFound {
            run_id: "abc123".into(),
            artifact_path: "models_mlflow".into(),
        }
    }

    fn config() -> PromoterConfig {
        PromoterConfig::from_lookup(lookup(&[
            ("RUN_ID", "abc123"),
            ("MODEL_NAME", "taxi-duration"),
        ]))
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = config();
        assert_eq!(config.tracking_uri, "http://localhost:5000");
        assert_eq!(config.artifact_path, "models_mlflow");
        assert_eq!(config.model_uri().to_string(), "runs:/abc123/models_mlflow");
    }

    #[test]
    fn test_overrides() {
        let config = PromoterConfig::from_lookup(lookup(&[
            ("RUN_ID", "abc123"),
            ("MODEL_NAME", "taxi-duration"),
            ("MLFLOW_TRACKING_URI", "http://mlflow:5000"),
            ("MODEL_ARTIFACT_PATH", "model"),
        ]))
        .unwrap();
        assert_eq!(config.tracking_uri, "http://mlflow:5000");
        assert_eq!(config.model_uri().to_string(), "runs:/abc123/model");
    }

    #[test]
    fn test_missing_required_vars() {
        assert_eq!(
            PromoterConfig::from_lookup(lookup(&[("MODEL_NAME", "taxi-duration")])),
            Err(ConfigError::MissingVar("RUN_ID"))
        );
        assert_eq!(
            PromoterConfig::from_lookup(lookup(&[("RUN_ID", "abc123"), ("MODEL_NAME", " ")])),
            Err(ConfigError::MissingVar("MODEL_NAME"))
        );
    }

    #[test]
    fn test_successful_promotion() {
        let registry = CountingRegistry::new(None);
        let outcome = promote(&config(), &registry);

        assert_eq!(registry.calls.get(), 1);
        assert!(outcome.is_registered());
        assert_eq!(outcome.run_id, "abc123");
        assert_eq!(outcome.exit_code(), 0);
    }

    #[test]
    fn test_registry_failure_is_not_fatal() {
        let registry = CountingRegistry::new(Some(unavailable as fn() -> RegistryError));
        let outcome = promote(&config(), &registry);

        assert_eq!(registry.calls.get(), 1);
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(outcome.run_id, "abc123");
        match outcome.registration {
            RegistrationOutcome::Failed { error, transient } => {
                assert!(transient);
                assert!(error.contains("registry down"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_permanent_failure() {
        let registry = CountingRegistry::new(Some(missing_artifact as fn() -> RegistryError));
        let outcome = promote(&config(), &registry);
        assert!(matches!(
            outcome.registration,
            RegistrationOutcome::Failed {
                transient: false,
                ..
            }
        ));
    }

    #[test]
    fn test_unparseable_tracking_uri_fails_softly() {
        let mut config = config();
        config.tracking_uri = "s3://bucket/mlruns".to_string();
        let outcome = run_promotion(&config);
        assert!(!outcome.is_registered());
        assert_eq!(outcome.exit_code(), 0);
    }
}
