//! Per-instance store backend id.

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    SetOptions,
    StoreBackend,
    StoreKey,
    STORE_BACKEND_ID_PREFIX,
    STORE_BACKEND_INVALID_CONFIGURATION_ID,
};

/// Lazily derived id of one backend instance.
///
/// The id is read from the reserved key on first access. When the key is
/// missing a fresh UUIDv4 (or the manually configured id) is written there.
/// If the medium cannot be read or written the sentinel
/// [`STORE_BACKEND_INVALID_CONFIGURATION_ID`] is used instead. Whatever comes
/// out of the first resolution is kept for the lifetime of the instance.
#[derive(Debug, Default)]
pub struct BackendIdentity {
    cell: OnceCell<String>,
    manual: Option<String>,
}

impl BackendIdentity {
    pub fn new(manually_initialize_store_backend_id: Option<String>) -> Self {
        Self {
            cell: OnceCell::new(),
            manual: manually_initialize_store_backend_id.filter(|id| !id.is_empty()),
        }
    }

    /// Id with nothing read from or written to the medium.
    pub fn ephemeral() -> Self {
        let identity = Self::default();
        let _ = identity.cell.set(Uuid::new_v4().to_string());
        identity
    }

    /// The cached id, if it was already resolved.
    pub fn get(&self) -> Option<&str> {
        self.cell.get().map(String::as_str)
    }

    pub async fn resolve<B: StoreBackend + ?Sized>(&self, backend: &B) -> String {
        self.cell
            .get_or_init(|| self.derive(backend))
            .await
            .clone()
    }

    async fn derive<B: StoreBackend + ?Sized>(&self, backend: &B) -> String {
        let key = StoreKey::store_backend_id();
        match backend.fetch(&key).await {
            Ok(value) => parse_persisted_id(&value),
            Err(err) if err.is_invalid_key() => {
                let id = self
                    .manual
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                let value = Value::String(format!("{}{}", STORE_BACKEND_ID_PREFIX, id));
                match backend.store(&key, &value, &SetOptions::default()).await {
                    Ok(_) => {
                        debug!(backend = backend.class_name(), store_backend_id = %id, "persisted new store backend id");
                        id
                    }
                    Err(err) => {
                        warn!(
                            backend = backend.class_name(),
                            error = %err,
                            "unable to persist store backend id"
                        );
                        STORE_BACKEND_INVALID_CONFIGURATION_ID.to_string()
                    }
                }
            }
            Err(err) => {
                warn!(
                    backend = backend.class_name(),
                    error = %err,
                    "unable to read store backend id"
                );
                STORE_BACKEND_INVALID_CONFIGURATION_ID.to_string()
            }
        }
    }
}

fn parse_persisted_id(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let text = text.trim();
    text.strip_prefix(STORE_BACKEND_ID_PREFIX)
        .unwrap_or(text)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_persisted_id() {
        assert_eq!(
            parse_persisted_id(&json!("store_backend_id = 7f3c1d2e-0000-4000-8000-000000000001\n")),
            "7f3c1d2e-0000-4000-8000-000000000001"
        );
        assert_eq!(parse_persisted_id(&json!("plain")), "plain");
    }

    #[test]
    fn test_ephemeral_is_resolved() {
        let identity = BackendIdentity::ephemeral();
        let id = identity.get().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }
}
