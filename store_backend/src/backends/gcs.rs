//! Google Cloud Storage store backend.

use std::sync::Arc;

use async_trait::async_trait;
use object_store::{gcp::GoogleCloudStorageBuilder, ObjectStore};
use serde_json::Value;
use tracing::debug;

use super::object::ObjectStoreCore;
use crate::{
    config::{config_document, reject_unrecognized},
    url_path::{escape_url_path, join_url},
    BackendIdentity,
    SetOptions,
    StoreBackend,
    StoreError,
    StoreKey,
    StoreResult,
    TupleGcsConfig,
};

const CLASS_NAME: &str = "TupleGCSStoreBackend";

const GCS_URL_ROOT: &str = "https://storage.googleapis.com";

/// One object per key in a GCS bucket, below an optional prefix.
pub struct TupleGcsStoreBackend {
    core: ObjectStoreCore,
    config: TupleGcsConfig,
    identity: BackendIdentity,
}

impl TupleGcsStoreBackend {
    /// Builds a GCS client from the configuration and the `GOOGLE_*`
    /// environment.
    pub async fn new(config: TupleGcsConfig) -> StoreResult<Self> {
        reject_unrecognized(CLASS_NAME, &config.unrecognized)?;
        let store = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(&config.bucket)
            .build()?;
        Self::with_object_store(config, Arc::new(store)).await
    }

    pub async fn with_object_store(config: TupleGcsConfig, store: Arc<dyn ObjectStore>) -> StoreResult<Self> {
        reject_unrecognized(CLASS_NAME, &config.unrecognized)?;
        if config.bucket.is_empty() {
            return Err(StoreError::config("TupleGCSStoreBackend requires a bucket"));
        }
        let core = ObjectStoreCore::new(
            CLASS_NAME,
            store,
            &config.prefix,
            &config.tuple,
            config.put_options.clone(),
            config.list_page_size,
        )?;
        let backend = Self {
            core,
            identity: BackendIdentity::new(config.tuple.manually_initialize_store_backend_id.clone()),
            config,
        };
        if !backend.config.tuple.suppress_store_backend_id {
            backend.identity.resolve(&backend).await;
        }
        debug!(
            bucket = %backend.config.bucket,
            prefix = %backend.core.prefix(),
            project = ?backend.config.project,
            "created GCS store backend"
        );
        Ok(backend)
    }

    /// `bucket/prefix/path` for the key.
    fn bucket_path(&self, key: &StoreKey) -> StoreResult<String> {
        Ok(format!("{}/{}", self.config.bucket, self.core.object_key(key)?))
    }
}

#[async_trait]
impl StoreBackend for TupleGcsStoreBackend {
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
        self.core.codec().validate_key(key)
    }

    fn check_value(&self, value: &Value) -> StoreResult<()> {
        self.core.check_value(value)
    }

    async fn fetch(&self, key: &StoreKey) -> StoreResult<Value> {
        self.core.get(key).await
    }

    async fn store(&self, key: &StoreKey, value: &Value, options: &SetOptions) -> StoreResult<String> {
        self.core.put(key, value, options).await
    }

    async fn contains(&self, key: &StoreKey) -> StoreResult<bool> {
        self.core.exists(key).await
    }

    async fn list(&self, prefix: &StoreKey) -> StoreResult<Vec<StoreKey>> {
        self.core.list(prefix).await
    }

    async fn delete(&self, key: &StoreKey) -> StoreResult<bool> {
        self.core.delete(key).await
    }

    async fn rename(&self, source: &StoreKey, dest: &StoreKey) -> StoreResult<()> {
        self.core.rename(source, dest).await
    }

    async fn get_url_for_key(&self, key: &StoreKey, _protocol: Option<&str>) -> StoreResult<String> {
        Ok(join_url(GCS_URL_ROOT, &escape_url_path(&self.bucket_path(key)?)))
    }

    async fn public_url_for_key(&self, key: &StoreKey) -> StoreResult<Option<String>> {
        let Some(base) = &self.config.tuple.base_public_path else {
            return Ok(None);
        };
        Ok(Some(join_url(base, &escape_url_path(&self.bucket_path(key)?))))
    }
}
