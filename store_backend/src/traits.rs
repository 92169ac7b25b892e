//! Core store backend trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::{BackendIdentity, StoreError, StoreKey, StoreResult};

/// Content headers attached to objects written to cloud stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOptions {
    pub content_type: String,
    pub content_encoding: String,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            content_type: "application/json".to_string(),
            content_encoding: "utf-8".to_string(),
        }
    }
}

/// Tuple-keyed key/value persistence over one storage medium.
///
/// Implementors provide the medium-level primitives (`fetch`, `store`,
/// `contains`, `list`, `delete`). Callers use the provided methods (`get`,
/// `set`, `add`, `update`, `has_key`, `list_keys`, `remove_key`, `move_key`),
/// which validate keys before any I/O and then delegate.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Name reported in error messages and in [`StoreBackend::config`].
    fn class_name(&self) -> &'static str;

    /// Normalized configuration, always carrying `class_name` and
    /// `module_name`.
    fn config(&self) -> Value;

    fn identity(&self) -> &BackendIdentity;

    /// Medium-specific key checks, e.g. forbidden substrings.
    fn check_key(&self, _key: &StoreKey) -> StoreResult<()> {
        Ok(())
    }

    /// Rejects values the medium cannot store and read back unchanged.
    fn check_value(&self, _value: &Value) -> StoreResult<()> {
        Ok(())
    }

    /// Reads the value under `key`. Absent keys are [`StoreError::InvalidKey`].
    async fn fetch(&self, key: &StoreKey) -> StoreResult<Value>;

    /// Writes `value` and returns a native reference to it.
    async fn store(&self, key: &StoreKey, value: &Value, options: &SetOptions) -> StoreResult<String>;

    async fn contains(&self, key: &StoreKey) -> StoreResult<bool>;

    /// Every stored key structurally starting with `prefix`.
    async fn list(&self, prefix: &StoreKey) -> StoreResult<Vec<StoreKey>>;

    /// Returns whether something was removed.
    async fn delete(&self, key: &StoreKey) -> StoreResult<bool>;

    /// Renames an existing `source` to `dest`, overwriting `dest`.
    async fn rename(&self, source: &StoreKey, dest: &StoreKey) -> StoreResult<()>;

    async fn get_url_for_key(&self, key: &StoreKey, _protocol: Option<&str>) -> StoreResult<String> {
        self.validate_key(key)?;
        Err(StoreError::NotSupported {
            message: format!("{} does not support get_url_for_key", self.class_name()),
        })
    }

    /// URL under `base_public_path`, or `None` when no public root is
    /// configured.
    async fn public_url_for_key(&self, _key: &StoreKey) -> StoreResult<Option<String>> {
        Ok(None)
    }

    fn validate_key(&self, key: &StoreKey) -> StoreResult<()> {
        self.check_key(key)
    }

    fn build_key(&self, name: &str) -> StoreKey {
        StoreKey::from([name])
    }

    async fn store_backend_id(&self) -> String {
        self.identity().resolve(self).await
    }

    async fn get(&self, key: &StoreKey) -> StoreResult<Value> {
        self.validate_key(key)?;
        self.fetch(key).await
    }

    async fn set(&self, key: &StoreKey, value: &Value) -> StoreResult<String> {
        self.set_with_options(key, value, &SetOptions::default()).await
    }

    async fn set_with_options(
        &self,
        key: &StoreKey,
        value: &Value,
        options: &SetOptions,
    ) -> StoreResult<String> {
        self.validate_key(key)?;
        self.check_value(value)?;
        self.store(key, value, options).await
    }

    /// Like `set`, but fails if the key already holds a value.
    async fn add(&self, key: &StoreKey, value: &Value) -> StoreResult<String> {
        self.validate_key(key)?;
        self.check_value(value)?;
        if self.contains(key).await? {
            return Err(StoreError::store_backend(format!(
                "Store already has the following key: {}.",
                key
            )));
        }
        self.store(key, value, &SetOptions::default()).await
    }

    /// Like `set`, but fails unless the key already holds a value.
    async fn update(&self, key: &StoreKey, value: &Value) -> StoreResult<String> {
        self.validate_key(key)?;
        self.check_value(value)?;
        if !self.contains(key).await? {
            return Err(StoreError::store_backend(format!(
                "Store does not have a value associated the following key: {}.",
                key
            )));
        }
        self.store(key, value, &SetOptions::default()).await
    }

    async fn add_or_update(&self, key: &StoreKey, value: &Value) -> StoreResult<String> {
        self.set(key, value).await
    }

    async fn has_key(&self, key: &StoreKey) -> StoreResult<bool> {
        self.validate_key(key)?;
        self.contains(key).await
    }

    async fn list_keys(&self, prefix: &StoreKey) -> StoreResult<Vec<StoreKey>> {
        self.list(prefix).await
    }

    async fn remove_key(&self, key: &StoreKey) -> StoreResult<bool> {
        self.validate_key(key)?;
        self.delete(key).await
    }

    async fn move_key(&self, source: &StoreKey, dest: &StoreKey) -> StoreResult<()> {
        self.validate_key(source)?;
        self.validate_key(dest)?;
        if !self.contains(source).await? {
            return Err(StoreError::KeyNotFound { key: source.clone() });
        }
        self.rename(source, dest).await
    }

    async fn get_public_url_for_key(&self, key: &StoreKey) -> StoreResult<String> {
        self.validate_key(key)?;
        match self.public_url_for_key(key).await? {
            Some(url) => Ok(url),
            None => self.get_url_for_key(key, None).await,
        }
    }
}
