//! In-process store backend.

use std::{collections::BTreeMap, sync::OnceLock};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    config::{config_document, reject_unrecognized},
    BackendIdentity,
    InMemoryConfig,
    SetOptions,
    StoreBackend,
    StoreError,
    StoreKey,
    StoreResult,
};

const CLASS_NAME: &str = "InMemoryStoreBackend";

/// Ordered map from keys to values, kept for the lifetime of the instance.
///
/// With `fixed_length_key`, the first stored key fixes the arity of every
/// later key.
pub struct InMemoryStoreBackend {
    store: RwLock<BTreeMap<StoreKey, Value>>,
    arity: OnceLock<usize>,
    config: InMemoryConfig,
    identity: BackendIdentity,
}

impl InMemoryStoreBackend {
    pub async fn new(config: InMemoryConfig) -> StoreResult<Self> {
        reject_unrecognized(CLASS_NAME, &config.unrecognized)?;
        let backend = Self {
            store: RwLock::new(BTreeMap::new()),
            arity: OnceLock::new(),
            identity: BackendIdentity::new(config.manually_initialize_store_backend_id.clone()),
            config,
        };
        if !backend.config.suppress_store_backend_id {
            backend.identity.resolve(&backend).await;
        }
        debug!(store_name = ?backend.config.store_name, "created in-memory store backend");
        Ok(backend)
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    fn check_arity(&self, key: &StoreKey, arity: usize) -> StoreResult<()> {
        if key.len() != arity {
            return Err(StoreError::invalid_path(format!(
                "Key {} has length {}, but {} requires keys of length {}",
                key,
                key.len(),
                CLASS_NAME,
                arity
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreBackend for InMemoryStoreBackend {
    fn class_name(&self) -> &'static str {
        CLASS_NAME
    }

    fn config(&self) -> Value {
        config_document(CLASS_NAME, module_path!(), &self.config)
    }

    fn identity(&self) -> &BackendIdentity {
        &self.identity
    }

    fn check_key(&self, key: &StoreKey) -> StoreResult<()> {
        match self.arity.get() {
            Some(arity) if self.config.fixed_length_key && !key.is_store_backend_id() => {
                self.check_arity(key, *arity)
            }
            _ => Ok(()),
        }
    }

    async fn fetch(&self, key: &StoreKey) -> StoreResult<Value> {
        self.store
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::invalid_key(CLASS_NAME, key))
    }

    async fn store(&self, key: &StoreKey, value: &Value, _options: &SetOptions) -> StoreResult<String> {
        if self.config.fixed_length_key && !key.is_store_backend_id() {
            self.check_arity(key, *self.arity.get_or_init(|| key.len()))?;
        }
        self.store.write().await.insert(key.clone(), value.clone());
        Ok(key.to_string())
    }

    async fn contains(&self, key: &StoreKey) -> StoreResult<bool> {
        Ok(self.store.read().await.contains_key(key))
    }

    async fn list(&self, prefix: &StoreKey) -> StoreResult<Vec<StoreKey>> {
        Ok(self
            .store
            .read()
            .await
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &StoreKey) -> StoreResult<bool> {
        Ok(self.store.write().await.remove(key).is_some())
    }

    async fn rename(&self, source: &StoreKey, dest: &StoreKey) -> StoreResult<()> {
        let mut store = self.store.write().await;
        let value = store
            .remove(source)
            .ok_or_else(|| StoreError::KeyNotFound { key: source.clone() })?;
        store.insert(dest.clone(), value);
        Ok(())
    }
}
