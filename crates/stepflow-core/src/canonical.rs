//! Canonical JSON form and content hashing.
//!
//! Two semantically identical workflows authored with differently ordered
//! object keys must hash identically; array order is semantically meaningful
//! (step ordering) and is preserved. The normalizer is an explicit recursive
//! descent that rebuilds every object with sorted keys rather than relying
//! on the serializer's map iteration order.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Rebuild a JSON value with object keys sorted at every nesting level.
///
/// Arrays keep their element order; scalars pass through unchanged.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(obj) => {
            let mut keys: Vec<&String> = obj.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&obj[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Serialize a value in canonical form (sorted keys, compact separators).
pub fn canonical_string(value: &Value) -> String {
    // Canonical Value objects serialize their entries in insertion order,
    // which `canonicalize` guarantees is sorted.
    serde_json::to_string(&canonicalize(value)).unwrap_or_default()
}

/// Compute the content hash of a value: `sha256:<lowercase hex>` over the
/// canonical serialization.
pub fn content_hash(value: &Value) -> String {
    let digest = Sha256::digest(canonical_string(value).as_bytes());
    format!("sha256:{digest:x}")
}

/// Normalize a caller-supplied hash: accepted bare or `sha256:`-prefixed.
pub fn normalize_hash(hash: &str) -> String {
    if hash.starts_with("sha256:") {
        hash.to_string()
    } else {
        format!("sha256:{hash}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
