//! Builds store backends from configuration.

use std::sync::Arc;

use opentelemetry::metrics::Meter;
use tracing::info;

use crate::{
    InMemoryStoreBackend,
    InlineStoreBackend,
    InstrumentedStoreBackend,
    StoreBackend,
    StoreBackendConfig,
    StoreResult,
    TupleAzureBlobStoreBackend,
    TupleFilesystemStoreBackend,
    TupleGcsStoreBackend,
    TupleS3StoreBackend,
};

/// Constructs the backend named by the configuration's `class_name`.
pub async fn build_store_backend(config: StoreBackendConfig) -> StoreResult<Arc<dyn StoreBackend>> {
    let class_name = config.class_name();
    let backend: Arc<dyn StoreBackend> = match config {
        StoreBackendConfig::InMemoryStoreBackend(config) => Arc::new(InMemoryStoreBackend::new(config).await?),
        StoreBackendConfig::TupleFilesystemStoreBackend(config) => {
            Arc::new(TupleFilesystemStoreBackend::new(config).await?)
        }
        StoreBackendConfig::TupleS3StoreBackend(config) => Arc::new(TupleS3StoreBackend::new(config).await?),
        StoreBackendConfig::TupleGcsStoreBackend(config) => Arc::new(TupleGcsStoreBackend::new(config).await?),
        StoreBackendConfig::TupleAzureBlobStoreBackend(config) => {
            Arc::new(TupleAzureBlobStoreBackend::new(config).await?)
        }
        StoreBackendConfig::InlineStoreBackend(config) => Arc::new(InlineStoreBackend::new(config).await?),
    };
    info!(class_name, "initialized store backend");
    Ok(backend)
}

/// Like [`build_store_backend`], with operation metrics recorded on `meter`.
pub async fn build_instrumented_store_backend(
    config: StoreBackendConfig,
    meter: &Meter,
) -> StoreResult<Arc<dyn StoreBackend>> {
    let backend = build_store_backend(config).await?;
    Ok(Arc::new(InstrumentedStoreBackend::new(backend, meter)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::StoreKey;

    #[tokio::test]
    async fn test_build_from_yaml() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let yaml = format!(
            "class_name: TupleFilesystemStoreBackend\nbase_directory: {}\nfilepath_suffix: .json\n",
            dir.path().display()
        );
        let config: StoreBackendConfig = serde_yaml::from_str(&yaml)?;
        let backend = build_store_backend(config).await?;
        assert_eq!(backend.class_name(), "TupleFilesystemStoreBackend");

        backend.set(&StoreKey::from(["suite"]), &json!(r#"{"a": 1}"#)).await?;
        assert!(dir.path().join("suite.json").is_file());
        Ok(())
    }

    #[tokio::test]
    async fn test_unrecognized_option_fails_construction() -> anyhow::Result<()> {
        let config: StoreBackendConfig =
            serde_yaml::from_str("class_name: InMemoryStoreBackend\nbase_directory: nope\n")?;
        let err = build_store_backend(config).await.err().unwrap();
        assert!(err.to_string().contains("base_directory"));
        Ok(())
    }

    #[tokio::test]
    async fn test_instrumented_in_memory() -> anyhow::Result<()> {
        let meter = opentelemetry::global::meter("store_backend_test");
        let config: StoreBackendConfig = serde_yaml::from_str("class_name: InMemoryStoreBackend\n")?;
        let backend = build_instrumented_store_backend(config, &meter).await?;
        assert_eq!(backend.list_keys(&StoreKey::empty()).await?, vec![StoreKey::store_backend_id()]);
        Ok(())
    }
}
