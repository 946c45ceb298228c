//! Canonical JSON encoding and content hashing.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::errors::{EvalError, ErrorInfo};

fn serde_error(code: &str, err: impl ToString) -> EvalError {
    EvalError::Config(ErrorInfo::new(code, "serialization failure").with_hint(err.to_string()))
}

/// Re-inserts object entries in key order, recursively. Needed because
/// `serde_json` keeps insertion order when `preserve_order` is enabled
/// anywhere in the build.
fn sort_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = std::mem::take(map).into_iter().collect();
            entries.sort_by(|left, right| left.0.cmp(&right.0));
            for (key, mut nested) in entries {
                sort_keys(&mut nested);
                map.insert(key, nested);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(sort_keys),
        _ => {}
    }
}

/// Serializes a value into JSON bytes with object keys sorted recursively, so
/// structurally equal values always produce identical bytes.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, EvalError> {
    let mut value =
        serde_json::to_value(value).map_err(|err| serde_error("json_serialize", err))?;
    sort_keys(&mut value);
    serde_json::to_vec(&value).map_err(|err| serde_error("json_write", err))
}

/// Renders a JSON value canonically. Unlike [`to_canonical_json_bytes`] this
/// cannot fail, because the input is already a JSON value.
pub fn canonical_value_string(value: &Value) -> String {
    let mut value = value.clone();
    sort_keys(&mut value);
    value.to_string()
}

/// Computes a stable hexadecimal SHA-256 digest of the canonical JSON form.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, EvalError> {
    let bytes = to_canonical_json_bytes(value)?;
    Ok(format!("{:x}", Sha256::digest(bytes)))
}

/// Hashes raw byte segments with a separator, for keys built from plain strings.
pub fn digest_parts(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}
