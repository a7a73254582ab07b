//! Deterministic input hashing for cache/idempotency keys.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hashes a normalized request payload to a 16-hex-char key.
///
/// Object keys are sorted lexicographically (recursively) before
/// hashing, so key order in the source value never affects the result.
/// SHA-256 truncated to 64 bits: the cache is advisory, and lookups
/// are by the compound (kind, hash) key, so the shortened digest only
/// risks a spurious cache miss, never incorrectness.
pub fn input_hash(value: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);

    let digest = Sha256::digest(canonical.as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (key, val)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_is_key_order_independent() {
        assert_eq!(
            input_hash(&json!({"x": 1, "y": 2})),
            input_hash(&json!({"y": 2, "x": 1}))
        );
    }

    #[test]
    fn test_hash_is_key_order_independent_when_nested() {
        assert_eq!(
            input_hash(&json!({"outer": {"a": 1, "b": [true, null]}})),
            input_hash(&json!({"outer": {"b": [true, null], "a": 1}}))
        );
    }

    #[test]
    fn test_hash_differs_on_value_change() {
        assert_ne!(
            input_hash(&json!({"x": 1, "y": 2})),
            input_hash(&json!({"x": 1, "y": 3}))
        );
    }

    #[test]
    fn test_hash_differs_on_key_change() {
        assert_ne!(
            input_hash(&json!({"x": 1})),
            input_hash(&json!({"z": 1}))
        );
    }

    #[test]
    fn test_hash_is_16_lowercase_hex_chars() {
        let hash = input_hash(&json!({"resume": "text", "role": "engineer"}));
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_hash_array_order_matters() {
        // Arrays are ordered data; only object keys are normalized.
        assert_ne!(
            input_hash(&json!({"skills": ["rust", "sql"]})),
            input_hash(&json!({"skills": ["sql", "rust"]}))
        );
    }
}
