//! Tuple keys addressing values in a store backend.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{StoreError, StoreResult};

/// Sole segment of the reserved key holding a backend's persisted id.
pub const STORE_BACKEND_ID_KEY: &str = ".ge_store_backend_id";

/// Prefix of the value persisted under the reserved id key.
pub const STORE_BACKEND_ID_PREFIX: &str = "store_backend_id = ";

/// Id reported when the backend id could not be read or persisted.
pub const STORE_BACKEND_INVALID_CONFIGURATION_ID: &str = "00000000-0000-0000-0000-00000000e003";

/// An ordered tuple of string segments.
///
/// Keys compare and hash structurally. The empty key is valid and addresses
/// singleton stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreKey(Vec<String>);

impl StoreKey {
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// The reserved `(".ge_store_backend_id",)` key.
    pub fn store_backend_id() -> Self {
        Self(vec![STORE_BACKEND_ID_KEY.to_string()])
    }

    pub fn is_store_backend_id(&self) -> bool {
        self.0.len() == 1 && self.0[0] == STORE_BACKEND_ID_KEY
    }

    /// Validates an untyped key and converts it.
    ///
    /// Only arrays whose elements are all strings are accepted. A bare
    /// string, `null`, numbers and nested containers are rejected.
    pub fn from_value(value: &Value) -> StoreResult<Self> {
        let Value::Array(items) = value else {
            return Err(StoreError::KeyType {
                reason: format!("key must be a tuple, got {}", json_type_name(value)),
            });
        };
        let mut segments = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::String(s) => segments.push(s.clone()),
                other => {
                    return Err(StoreError::KeyType {
                        reason: format!(
                            "key elements must be strings, got {} in {}",
                            json_type_name(other),
                            value
                        ),
                    })
                }
            }
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn starts_with(&self, prefix: &StoreKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.0.iter().cloned().map(Value::String).collect())
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "'{}'", segment)?;
        }
        if self.0.len() == 1 {
            write!(f, ",")?;
        }
        write!(f, ")")
    }
}

impl From<Vec<String>> for StoreKey {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl From<&[&str]> for StoreKey {
    fn from(segments: &[&str]) -> Self {
        segments.iter().copied().collect()
    }
}

impl<const N: usize> From<[&str; N]> for StoreKey {
    fn from(segments: [&str; N]) -> Self {
        segments.into_iter().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for StoreKey {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl TryFrom<&Value> for StoreKey {
    type Error = StoreError;

    fn try_from(value: &Value) -> StoreResult<Self> {
        Self::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_from_value_accepts_string_tuples() {
        let key = StoreKey::from_value(&json!(["I", "am", "a", "string", "tuple"])).unwrap();
        assert_eq!(key.len(), 5);

        // zero-length tuple is allowed
        let key = StoreKey::from_value(&json!([])).unwrap();
        assert!(key.is_empty());
    }

    #[test]
    fn test_from_value_rejects_malformed_keys() {
        assert!(StoreKey::from_value(&json!("nope")).unwrap_err().is_key_type());
        assert!(StoreKey::from_value(&json!(["I", "am", "a", "string", 100]))
            .unwrap_err()
            .is_key_type());
        assert!(StoreKey::from_value(&json!(["I", "am", "a", "string", null]))
            .unwrap_err()
            .is_key_type());
        assert!(StoreKey::from_value(&json!([["nested"]]))
            .unwrap_err()
            .is_key_type());
    }

    #[test]
    fn test_display_matches_tuple_literal() {
        assert_eq!(StoreKey::from(["AAA"]).to_string(), "('AAA',)");
        assert_eq!(StoreKey::from(["A", "B"]).to_string(), "('A', 'B')");
        assert_eq!(StoreKey::empty().to_string(), "()");
    }

    #[test]
    fn test_structural_prefix() {
        let key = StoreKey::from(["a", "b", "c"]);
        assert!(key.starts_with(&StoreKey::from(["a", "b"])));
        assert!(key.starts_with(&StoreKey::empty()));
        assert!(!key.starts_with(&StoreKey::from(["a", "c"])));
        assert!(StoreKey::store_backend_id().is_store_backend_id());
    }
}
