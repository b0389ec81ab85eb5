//! Regression metrics

use crate::errors::{CoreError, Result};

/// Root-mean-squared error between `predictions` and `actual`.
///
/// Inputs must have the same, non-zero length.
pub fn rmse(predictions: &[f64], actual: &[f64]) -> Result<f64> {
    if predictions.len() != actual.len() {
        return Err(CoreError::ShapeMismatch {
            left: predictions.len(),
            right: actual.len(),
        });
    }
    if predictions.is_empty() {
        return Err(CoreError::EmptyInput("rmse over zero samples".to_string()));
    }

    let sum_sq: f64 = predictions
        .iter()
        .zip(actual)
        .map(|(p, a)| (p - a) * (p - a))
        .sum();

    Ok((sum_sq / predictions.len() as f64).sqrt())
}
