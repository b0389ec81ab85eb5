//! Canonical JSON for saved artifacts
//!
//! Artifacts are written with object keys sorted at every depth and no
//! whitespace, so the same vectorizer or model always produces the same
//! bytes and the same blake3 digest.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::{CoreError, Result};

pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value).map_err(|e| CoreError::Canonical(e.to_string()))?;
    serde_json::to_string(&sorted(value)).map_err(|e| CoreError::Canonical(e.to_string()))
}

fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sorted(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

/// Hex blake3 digest of the canonical JSON of `value`
pub fn hash_canonical_hex<T: Serialize>(value: &T) -> Result<String> {
    let json = to_canonical_json(value)?;
    Ok(hex::encode(blake3::hash(json.as_bytes()).as_bytes()))
}
