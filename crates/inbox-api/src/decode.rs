//! Response-shape normalisation.
//!
//! Endpoints return collections either bare (`[...]`) or wrapped
//! (`{"data": [...]}` / `{"<key>": [...]}`), and counts either bare or as
//! `{"count": n}` / `{"unread_count": n}`.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

/// Decode a collection, unwrapping `data` or `key` envelopes.
pub fn decode_collection<T: DeserializeOwned>(value: Value, key: &str) -> Result<Vec<T>, ApiError> {
    let items = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => {
            let inner = map
                .remove("data")
                .filter(Value::is_array)
                .or_else(|| map.remove(key).filter(Value::is_array));
            match inner {
                Some(items) => items,
                None => {
                    return Err(ApiError::Shape(format!(
                        "expected array, `data` or `{key}` field"
                    )));
                }
            }
        }
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(ApiError::Shape(format!(
                "expected collection, got {}",
                type_name(&other)
            )));
        }
    };
    Ok(serde_json::from_value(items)?)
}

/// Decode an unread counter.
pub fn decode_count(value: &Value) -> Result<u64, ApiError> {
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    for field in ["count", "unread_count", "unread"] {
        if let Some(n) = value.get(field).and_then(Value::as_u64) {
            return Ok(n);
        }
    }
    if let Some(data) = value.get("data") {
        return decode_count(data);
    }
    Err(ApiError::Shape(format!(
        "expected unread count, got {}",
        type_name(value)
    )))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
