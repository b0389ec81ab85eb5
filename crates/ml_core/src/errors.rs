//! Error types for the core model primitives

use thiserror::Error;

/// Errors raised by vectorization, model handling and evaluation
#[derive(Error, Debug)]
pub enum CoreError {
    /// Two inputs that must line up have different lengths
    #[error("Shape mismatch: {left} predictions vs {right} labels")]
    ShapeMismatch { left: usize, right: usize },

    /// A metric was requested over no samples
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Model validation failed
    #[error("Model validation failed: {0}")]
    ValidationFailed(String),

    /// Canonical serialization failed
    #[error("Canonical serialization error: {0}")]
    Canonical(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
