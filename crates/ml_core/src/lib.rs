//! Core model primitives for the trip-duration pipeline
//!
//! Modules:
//! - `features`: Feature values and dictionaries produced by feature engineering
//! - `sparse`: Compressed sparse row matrix used as model input
//! - `vectorizer`: Dictionary vectorizer with a fit/transform phase split
//! - `gbdt`: Fixed-point Gradient Boosted Decision Tree model format
//! - `serde_canon`: Canonical JSON serialization and blake3 hashing
//! - `metrics`: Regression metrics (RMSE)

pub mod errors;
pub mod features;
pub mod gbdt;
pub mod metrics;
pub mod serde_canon;
pub mod sparse;
pub mod vectorizer;

pub use errors::{CoreError, Result};
pub use features::{FeatureDict, FeatureValue};
pub use gbdt::{from_fixed, to_fixed, Model, Node, Tree, SCALE};
pub use metrics::rmse;
pub use sparse::CsrMatrix;
pub use vectorizer::{DictVectorizer, FittedDictVectorizer};

/// Crate version string recorded in model artifacts
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
