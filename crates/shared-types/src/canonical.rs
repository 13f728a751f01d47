//! Canonical JSON: whitespace-free, object keys sorted.
//!
//! Goes through `serde_json::Value`, whose maps are ordered, so two
//! structurally equal values always produce identical bytes.

use crate::errors::ProtocolError;
use serde::Serialize;
use serde_json::Value;

/// Canonical bytes of any serializable value.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    let v = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&v)?)
}

/// Canonical bytes with the named top-level keys removed.
pub fn canonical_bytes_without<T: Serialize + ?Sized>(
    value: &T,
    strip: &[&str],
) -> Result<Vec<u8>, ProtocolError> {
    let mut v = serde_json::to_value(value)?;
    if let Value::Object(map) = &mut v {
        for key in strip {
            map.remove(*key);
        }
    }
    Ok(serde_json::to_vec(&v)?)
}
