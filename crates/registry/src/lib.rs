//! Model registry for trip-duration models
//!
//! A [`ModelRegistry`] gives a model artifact logged under a tracking run a
//! named, versioned slot. [`LocalRegistry`] keeps versions in a sled
//! database next to a local tracking store; [`MlflowRegistry`] talks to an
//! MLflow server. The [`promoter`] drives one registration from environment
//! settings and never lets a registry failure fail the caller.

pub mod errors;
pub mod local;
pub mod mlflow;
pub mod promoter;
pub mod types;

pub use errors::{ConfigError, RegistryError, Result};
pub use local::LocalRegistry;
pub use mlflow::MlflowRegistry;
pub use promoter::{
    open_registry, promote, run_promotion, PromoterConfig, PromotionOutcome,
    RegistrationOutcome, DEFAULT_MODEL_ARTIFACT_PATH, MODEL_ARTIFACT_PATH_ENV, MODEL_NAME_ENV,
    RUN_ID_ENV,
};
pub use types::{ModelUri, ModelVersion};

/// Registry assigning versions to models logged under runs
pub trait ModelRegistry {
    /// Register the artifact behind `uri` as the next version of `name`
    fn register_model(&self, uri: &ModelUri, name: &str) -> Result<ModelVersion>;
}

pub(crate) fn check_model_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(RegistryError::InvalidModelName(name.to_string()));
    }
    Ok(())
}
