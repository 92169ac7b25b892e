//! Error types for store backend operations.

use crate::StoreKey;

/// Result type for store backend operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store backend operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// No value is stored under the key.
    #[error("Unable to retrieve object from {backend} with the following key: {key}")]
    InvalidKey { backend: String, key: StoreKey },

    /// The key does not have the shape of a store key.
    #[error("Invalid key type: {reason}")]
    KeyType { reason: String },

    /// The backend's medium cannot hold the value.
    #[error("Invalid value type: {reason}")]
    ValueType { reason: String },

    /// The key or path cannot be mapped by the backend's path codec.
    #[error("{reason}")]
    InvalidPath { reason: String },

    /// The operation violates the backend's contract.
    #[error("{message}")]
    StoreBackend { message: String },

    /// The backend has no notion of the requested capability.
    #[error("{message}")]
    NotSupported { message: String },

    /// The source key of a move does not exist.
    #[error("Key not found: {key}")]
    KeyNotFound { key: StoreKey },

    /// Backend configuration was rejected.
    #[error("Invalid store backend configuration: {reason}")]
    Config { reason: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Object store error: {source}")]
    ObjectStore {
        #[from]
        source: object_store::Error,
    },

    #[error("Serialization error: {source}")]
    Serialization { source: anyhow::Error },
}

impl StoreError {
    pub fn invalid_key(backend: &str, key: &StoreKey) -> Self {
        Self::InvalidKey {
            backend: backend.to_string(),
            key: key.clone(),
        }
    }

    pub fn store_backend(message: impl Into<String>) -> Self {
        Self::StoreBackend {
            message: message.into(),
        }
    }

    pub fn invalid_path(reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    pub fn is_invalid_key(&self) -> bool {
        matches!(self, Self::InvalidKey { .. })
    }

    pub fn is_key_type(&self) -> bool {
        matches!(self, Self::KeyType { .. })
    }

    pub fn is_value_type(&self) -> bool {
        matches!(self, Self::ValueType { .. })
    }

    pub fn is_invalid_path(&self) -> bool {
        matches!(self, Self::InvalidPath { .. })
    }

    pub fn is_store_backend_error(&self) -> bool {
        matches!(self, Self::StoreBackend { .. })
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported { .. })
    }

    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }

    /// True when the underlying medium reported a missing object.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io { source } => source.kind() == std::io::ErrorKind::NotFound,
            Self::ObjectStore {
                source: object_store::Error::NotFound { .. },
            } => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization {
            source: anyhow::Error::from(err),
        }
    }
}

impl From<serde_yaml::Error> for StoreError {
    fn from(err: serde_yaml::Error) -> Self {
        StoreError::Serialization {
            source: anyhow::Error::from(err),
        }
    }
}

impl From<url::ParseError> for StoreError {
    fn from(err: url::ParseError) -> Self {
        StoreError::Config {
            reason: err.to_string(),
        }
    }
}

impl From<object_store::path::Error> for StoreError {
    fn from(err: object_store::path::Error) -> Self {
        StoreError::InvalidPath {
            reason: err.to_string(),
        }
    }
}
