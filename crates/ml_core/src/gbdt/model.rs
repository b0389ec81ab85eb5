//! GBDT model with deterministic fixed-point inference
//!
//! Thresholds, leaf values and the bias are integers at `scale`
//! precision. The model is serialized as canonical JSON and identified
//! by the blake3 hash of that JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::tree::Tree;
use crate::errors::{CoreError, Result};
use crate::serde_canon::{hash_canonical_hex, to_canonical_json};
use crate::sparse::CsrMatrix;

/// Default scale factor for fixed-point arithmetic (1e6)
pub const SCALE: i64 = 1_000_000;

/// Convert a real value to fixed-point at [`SCALE`]
pub fn to_fixed(value: f64) -> i64 {
    (value * SCALE as f64).round() as i64
}

/// Convert a fixed-point value at [`SCALE`] back to a real value
pub fn from_fixed(value: i64) -> f64 {
    value as f64 / SCALE as f64
}

/// Convert one sparse matrix row to fixed-point `(column, value)` pairs
pub fn fixed_row(matrix: &CsrMatrix, row: usize) -> Vec<(usize, i64)> {
    matrix.row(row).map(|(col, v)| (col, to_fixed(v))).collect()
}

/// Fixed-point GBDT ensemble
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Model {
    /// Model format version (always 1 for now)
    pub version: i32,

    /// Fixed-point scale factor
    pub scale: i64,

    /// Decision trees in the ensemble
    pub trees: Vec<Tree>,

    /// Bias term (fixed-point integer)
    pub bias: i64,

    /// Scale of the score returned by [`Model::score`]
    pub post_scale: i64,

    /// Width of the feature vectors the model was trained on
    #[serde(default)]
    pub num_features: usize,
}

impl Model {
    pub fn new(trees: Vec<Tree>, bias: i64, num_features: usize) -> Self {
        Self {
            version: 1,
            scale: SCALE,
            trees,
            bias,
            post_scale: SCALE,
            num_features,
        }
    }

    /// Validate model structure
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(CoreError::ValidationFailed(format!(
                "Unsupported model version: {}",
                self.version
            )));
        }

        if self.scale <= 0 {
            return Err(CoreError::ValidationFailed(format!(
                "Invalid scale: {}",
                self.scale
            )));
        }

        if self.post_scale <= 0 {
            return Err(CoreError::ValidationFailed(format!(
                "Invalid post_scale: {}",
                self.post_scale
            )));
        }

        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate().map_err(|e| {
                CoreError::ValidationFailed(format!("Tree {} validation failed: {}", i, e))
            })?;
        }

        Ok(())
    }

    /// Fixed-point score for a sparse fixed-point row.
    ///
    /// Accumulates `leaf * tree_weight / scale` over all trees on top of the bias.
    pub fn score_sparse(&self, row: &[(usize, i64)]) -> i64 {
        self.trees.iter().fold(self.bias, |sum, tree| {
            let weighted = (tree.evaluate_sparse(row) as i128 * tree.weight as i128)
                / self.scale as i128;
            sum.saturating_add(weighted as i64)
        })
    }

    /// Fixed-point score for a dense fixed-point feature vector
    pub fn score(&self, features: &[i64]) -> i64 {
        self.trees.iter().fold(self.bias, |sum, tree| {
            let weighted =
                (tree.evaluate(features) as i128 * tree.weight as i128) / self.scale as i128;
            sum.saturating_add(weighted as i64)
        })
    }

    /// Predict real-valued targets for every row of `matrix`
    pub fn predict(&self, matrix: &CsrMatrix) -> Vec<f64> {
        (0..matrix.n_rows())
            .map(|row| {
                let score = self.score_sparse(&fixed_row(matrix, row));
                score as f64 / self.post_scale as f64
            })
            .collect()
    }

    /// Serialize model to canonical JSON (sorted keys, no whitespace)
    pub fn to_canonical_json(&self) -> Result<String> {
        to_canonical_json(self)
    }

    /// Blake3 hash of the canonical JSON as hex
    pub fn hash_hex(&self) -> Result<String> {
        hash_canonical_hex(self)
    }

    /// Save model to JSON file with canonical serialization
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_canonical_json()?)?;
        Ok(())
    }

    /// Load and validate a model from a JSON file
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let model: Model = serde_json::from_str(&json)?;
        model.validate()?;
        Ok(model)
    }

    /// Get number of trees in the model
    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }
}
