//! Dictionary vectorizer
//!
//! Turns feature dictionaries into sparse rows. Fitting consumes the
//! unfitted [`DictVectorizer`] and returns a [`FittedDictVectorizer`];
//! only the fitted type can transform, and it does so through `&self`,
//! so the column mapping is fixed once fitting returns.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::errors::Result;
use crate::features::FeatureDict;
use crate::serde_canon::to_canonical_json;
use crate::sparse::CsrMatrix;

/// Default separator between a categorical key and its value
pub const DEFAULT_SEPARATOR: &str = "=";

/// Unfitted vectorizer
#[derive(Debug, Clone)]
pub struct DictVectorizer {
    separator: String,
}

impl Default for DictVectorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl DictVectorizer {
    pub fn new() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }

    /// Use a custom key/value separator for categorical column names
    pub fn with_separator(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }

    /// Learn the column mapping from `records` and encode them.
    ///
    /// Columns are the sorted set of discovered feature names.
    pub fn fit_transform(self, records: &[FeatureDict]) -> (FittedDictVectorizer, CsrMatrix) {
        let mut names = BTreeSet::new();
        for record in records {
            for (key, value) in record {
                names.insert(value.column_name(key, &self.separator));
            }
        }

        let feature_names: Vec<String> = names.into_iter().collect();
        let vocabulary = feature_names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();

        let fitted = FittedDictVectorizer {
            separator: self.separator,
            feature_names,
            vocabulary,
        };

        tracing::debug!(
            rows = records.len(),
            columns = fitted.n_features(),
            "Fitted dictionary vectorizer"
        );

        let matrix = fitted.transform(records);
        (fitted, matrix)
    }
}

/// Vectorizer with a frozen feature-name to column mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedDictVectorizer {
    separator: String,
    feature_names: Vec<String>,
    vocabulary: BTreeMap<String, usize>,
}

impl FittedDictVectorizer {
    /// Encode `records` with the fitted columns.
    ///
    /// Names not seen during fitting are ignored, so an unseen
    /// categorical value encodes as all zeros for that feature.
    pub fn transform(&self, records: &[FeatureDict]) -> CsrMatrix {
        let mut matrix = CsrMatrix::new(self.n_features());
        let mut entries = Vec::new();

        for record in records {
            entries.clear();
            for (key, value) in record {
                let name = value.column_name(key, &self.separator);
                if let Some(&col) = self.vocabulary.get(&name) {
                    entries.push((col, value.column_value()));
                }
            }
            matrix.push_row(&entries);
        }

        matrix
    }

    /// Encode a single record
    pub fn transform_one(&self, record: &FeatureDict) -> CsrMatrix {
        self.transform(std::slice::from_ref(record))
    }

    /// Sorted column names
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Column index for a feature name
    pub fn column_of(&self, name: &str) -> Option<usize> {
        self.vocabulary.get(name).copied()
    }

    /// Number of output columns
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Canonical JSON representation of the fitted state
    pub fn to_canonical_json(&self) -> Result<String> {
        to_canonical_json(self)
    }

    /// Persist the fitted state as canonical JSON
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_canonical_json()?)?;
        Ok(())
    }

    /// Load a previously saved fitted state
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
