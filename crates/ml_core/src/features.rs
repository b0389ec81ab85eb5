//! Feature values passed between feature engineering and the vectorizer

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single feature value: numeric features keep their value,
/// categorical ones are one-hot encoded by the vectorizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Numeric(f64),
    Categorical(String),
}

impl FeatureValue {
    /// Column name this value occupies once vectorized.
    ///
    /// Numeric values use the key itself; categorical values use
    /// `key{separator}value`.
    pub fn column_name(&self, key: &str, separator: &str) -> String {
        match self {
            FeatureValue::Numeric(_) => key.to_string(),
            FeatureValue::Categorical(value) => format!("{key}{separator}{value}"),
        }
    }

    /// Value written into the column
    pub fn column_value(&self) -> f64 {
        match self {
            FeatureValue::Numeric(value) => *value,
            FeatureValue::Categorical(_) => 1.0,
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Numeric(value)
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        FeatureValue::Categorical(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Categorical(value.to_string())
    }
}

/// One record's features keyed by name. Sorted keys keep vectorization order stable.
pub type FeatureDict = BTreeMap<String, FeatureValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_names() {
        let cat = FeatureValue::from("10_50");
        let num = FeatureValue::from(5.5);

        assert_eq!(cat.column_name("PU_DO", "="), "PU_DO=10_50");
        assert_eq!(num.column_name("trip_distance", "="), "trip_distance");
        assert_eq!(cat.column_value(), 1.0);
        assert_eq!(num.column_value(), 5.5);
    }

    #[test]
    fn test_untagged_serde() {
        let json = r#"{"PU_DO":"10_50","trip_distance":40.0}"#;
        let dict: FeatureDict = serde_json::from_str(json).unwrap();

        assert_eq!(dict["PU_DO"], FeatureValue::Categorical("10_50".into()));
        assert_eq!(dict["trip_distance"], FeatureValue::Numeric(40.0));
    }
}
