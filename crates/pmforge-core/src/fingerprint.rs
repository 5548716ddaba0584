//! Content fingerprints
//!
//! A fingerprint is the SHA-512 hex digest of a value's canonical JSON text.
//! Object keys are sorted before hashing so two documents that differ only in
//! key order share a fingerprint.

use serde_json::{Map, Value};
use sha2::{Digest, Sha512};

/// Length of a fingerprint in hex characters.
pub const FINGERPRINT_LEN: usize = 128;

/// Fingerprint of a JSON value.
#[must_use]
pub fn fingerprint_value(value: &Value) -> String {
    fingerprint_str(&canonicalize(value).to_string())
}

/// Fingerprint of raw text.
#[must_use]
pub fn fingerprint_str(text: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(text.as_bytes());
    to_hex(&hasher.finalize())
}

/// Deterministic uuid-shaped identifier derived from the given parts.
///
/// Used for script, item and collection ids so that regenerating a
/// collection from identical inputs yields identical ids.
#[must_use]
pub fn stable_id(parts: &[&str]) -> String {
    let digest = fingerprint_str(&parts.join("\u{0}"));
    format!(
        "{}-{}-{}-{}-{}",
        &digest[0..8],
        &digest[8..12],
        &digest[12..16],
        &digest[16..20],
        &digest[20..32]
    )
}

/// Copy of `value` with every object's keys sorted.
#[must_use]
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(obj) => {
            let mut keys: Vec<&String> = obj.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(obj.len());
            for key in keys {
                if let Some(v) = obj.get(key) {
                    sorted.insert(key.clone(), canonicalize(v));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sha512_hex_length() {
        let fp = fingerprint_str("abc");
        assert_eq!(fp.len(), FINGERPRINT_LEN);
        assert!(fp.starts_with("ddaf35a193617aba"));
    }

    #[test]
    fn key_order_does_not_matter() {
        let a = json!({"a": 1, "b": {"x": [1, 2], "y": null}});
        let b = json!({"b": {"y": null, "x": [1, 2]}, "a": 1});
        assert_eq!(fingerprint_value(&a), fingerprint_value(&b));
    }

    #[test]
    fn array_order_matters() {
        assert_ne!(
            fingerprint_value(&json!([1, 2])),
            fingerprint_value(&json!([2, 1]))
        );
    }

    #[test]
    fn stable_id_shape() {
        let id = stable_id(&["Status code is 200", "pm.test(...)"]);
        assert_eq!(id.len(), 36);
        assert_eq!(id.matches('-').count(), 4);
        assert_eq!(id, stable_id(&["Status code is 200", "pm.test(...)"]));
        assert_ne!(id, stable_id(&["Status code is 201", "pm.test(...)"]));
    }

    #[test]
    fn stable_id_separates_parts() {
        assert_ne!(stable_id(&["ab", "c"]), stable_id(&["a", "bc"]));
    }

    proptest::proptest! {
        #[test]
        fn insertion_order_never_changes_fingerprint(
            entries in proptest::collection::btree_map("[a-z]{1,6}", -100i64..100, 0..8)
        ) {
            let forward: Map<String, Value> =
                entries.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            let reverse: Map<String, Value> =
                entries.iter().rev().map(|(k, v)| (k.clone(), json!(v))).collect();
            proptest::prop_assert_eq!(
                fingerprint_value(&Value::Object(forward)),
                fingerprint_value(&Value::Object(reverse))
            );
        }
    }
}
