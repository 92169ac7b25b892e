//! Store backend implementations.

pub mod azure;
pub mod filesystem;
pub mod gcs;
pub mod inline;
pub mod memory;
pub mod object;
pub mod s3;

use serde_json::Value;

use crate::{StoreError, StoreResult};

/// Text of a value bound for a file or object.
///
/// These media hold text and read it back as `Value::String`, so only
/// string values survive a round trip.
pub(crate) fn text_value<'a>(backend: &str, value: &'a Value) -> StoreResult<&'a str> {
    match value {
        Value::String(text) => Ok(text),
        other => Err(StoreError::ValueType {
            reason: format!(
                "{} stores string values only; serialize the value before storing it, got {}",
                backend,
                json_kind(other)
            ),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_text_value() {
        assert_eq!(text_value("TestBackend", &json!("plain text")).unwrap(), "plain text");

        let err = text_value("TestBackend", &json!({"a": [1, 2]})).unwrap_err();
        assert!(err.is_value_type());
        assert!(err.to_string().contains("an object"));
        assert!(text_value("TestBackend", &json!(123)).unwrap_err().is_value_type());
        assert!(text_value("TestBackend", &json!(null)).unwrap_err().is_value_type());
    }
}
