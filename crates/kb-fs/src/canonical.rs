//! Canonical serialization and SHA-256 hashing
//!
//! Two logically-equal structures must hash identically regardless of the
//! order their fields were inserted in. The canonical form sorts object
//! keys lexicographically, keeps array order, and drops `null` object
//! members so that an absent optional field and an explicit `null` are the
//! same thing.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::{Error, Result};

/// Serialize a JSON value into its canonical string form.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, _)| k)
                .collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Strings serialize infallibly
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
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

/// Hash raw bytes, returning lowercase hex.
pub fn hash_bytes(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Hash any serializable value through its canonical form.
pub fn hash_value<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let json = serde_json::to_value(value)?;
    Ok(hash_bytes(canonicalize(&json).as_bytes()))
}

/// Hash a file's raw contents.
pub fn hash_file(path: &Path) -> Result<String> {
    let content = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    Ok(hash_bytes(&content))
}

/// Hash a file's raw contents, returning an empty string when it is absent.
///
/// Used for optional invalidation inputs (lockfile, config, plugin state)
/// where "no file" is a legitimate, stable state.
pub async fn hash_optional_file(path: &Path) -> Result<String> {
    match tokio::fs::read(path).await {
        Ok(content) => Ok(hash_bytes(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(Error::io(path, e)),
    }
}
