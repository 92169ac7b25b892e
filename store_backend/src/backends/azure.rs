//! Azure Blob Storage store backend.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use object_store::{azure::MicrosoftAzureBuilder, ObjectStore};
use serde_json::Value;
use tracing::debug;
use url::Url;

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
    TupleAzureBlobConfig,
};

const CLASS_NAME: &str = "TupleAzureBlobStoreBackend";

const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Storage account addressed by a connection string or an account URL.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AzureAccount {
    name: String,
    endpoint_suffix: String,
    access_key: Option<String>,
}

impl AzureAccount {
    fn from_config(config: &TupleAzureBlobConfig) -> StoreResult<Self> {
        if let Some(connection_string) = &config.connection_string {
            return Self::from_connection_string(connection_string);
        }
        if let Some(account_url) = &config.account_url {
            return Self::from_account_url(account_url);
        }
        Err(StoreError::store_backend(
            "Unable to initialize ServiceClient, AZURE_STORAGE_CONNECTION_STRING should be set",
        ))
    }

    /// Parses `AccountName=...;AccountKey=...;EndpointSuffix=...`.
    fn from_connection_string(connection_string: &str) -> StoreResult<Self> {
        let fields: BTreeMap<&str, &str> = connection_string
            .split(';')
            .filter_map(|part| part.split_once('='))
            .map(|(name, value)| (name.trim(), value.trim()))
            .collect();
        let name = fields
            .get("AccountName")
            .filter(|name| !name.is_empty())
            .ok_or_else(|| StoreError::config("Azure connection string has no AccountName"))?;
        Ok(Self {
            name: name.to_string(),
            endpoint_suffix: fields
                .get("EndpointSuffix")
                .unwrap_or(&DEFAULT_ENDPOINT_SUFFIX)
                .to_string(),
            access_key: fields.get("AccountKey").map(|key| key.to_string()),
        })
    }

    /// Parses `https://{account}.blob.{endpoint_suffix}`.
    fn from_account_url(account_url: &str) -> StoreResult<Self> {
        let url = Url::parse(account_url)?;
        let host = url
            .host_str()
            .ok_or_else(|| StoreError::config(format!("account_url {} has no host", account_url)))?;
        let (name, endpoint_suffix) = host
            .split_once(".blob.")
            .ok_or_else(|| StoreError::config(format!("account_url {} is not a blob endpoint", account_url)))?;
        Ok(Self {
            name: name.to_string(),
            endpoint_suffix: endpoint_suffix.to_string(),
            access_key: None,
        })
    }

    fn blob_endpoint(&self) -> String {
        format!("https://{}.blob.{}", self.name, self.endpoint_suffix)
    }
}

/// One blob per key in an Azure container, below an optional prefix.
pub struct TupleAzureBlobStoreBackend {
    core: ObjectStoreCore,
    account: AzureAccount,
    config: TupleAzureBlobConfig,
    identity: BackendIdentity,
}

impl TupleAzureBlobStoreBackend {
    /// Builds a client for the configured account. Credentials not in the
    /// connection string come from the `AZURE_*` environment.
    pub async fn new(config: TupleAzureBlobConfig) -> StoreResult<Self> {
        reject_unrecognized(CLASS_NAME, &config.unrecognized)?;
        let account = AzureAccount::from_config(&config)?;
        let mut builder = MicrosoftAzureBuilder::from_env()
            .with_account(&account.name)
            .with_container_name(&config.container);
        if let Some(key) = &account.access_key {
            builder = builder.with_access_key(key);
        }
        let store = builder.build()?;
        Self::with_object_store(config, Arc::new(store)).await
    }

    pub async fn with_object_store(
        config: TupleAzureBlobConfig,
        store: Arc<dyn ObjectStore>,
    ) -> StoreResult<Self> {
        reject_unrecognized(CLASS_NAME, &config.unrecognized)?;
        let account = AzureAccount::from_config(&config)?;
        if config.container.is_empty() {
            return Err(StoreError::config("TupleAzureBlobStoreBackend requires a container"));
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
            account,
            identity: BackendIdentity::new(config.tuple.manually_initialize_store_backend_id.clone()),
            config,
        };
        if !backend.config.tuple.suppress_store_backend_id {
            backend.identity.resolve(&backend).await;
        }
        debug!(
            account = %backend.account.name,
            container = %backend.config.container,
            prefix = %backend.core.prefix(),
            "created Azure blob store backend"
        );
        Ok(backend)
    }
}

#[async_trait]
impl StoreBackend for TupleAzureBlobStoreBackend {
    fn class_name(&self) -> &'static str {
        CLASS_NAME
    }

    fn config(&self) -> Value {
        let mut config = self.config.clone();
        if config.connection_string.is_some() {
            config.connection_string = Some("***".to_string());
        }
        config_document(CLASS_NAME, module_path!(), &config)
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
        let path = format!("{}/{}", self.config.container, self.core.object_key(key)?);
        Ok(join_url(&self.account.blob_endpoint(), &escape_url_path(&path)))
    }

    async fn public_url_for_key(&self, key: &StoreKey) -> StoreResult<Option<String>> {
        let Some(base) = &self.config.tuple.base_public_path else {
            return Ok(None);
        };
        Ok(Some(join_url(base, &escape_url_path(&self.core.object_key(key)?))))
    }
}

#[cfg(test)]
mod tests {
    use object_store::memory::InMemory;
    use serde_json::json;

    use super::*;

    const CONNECTION_STRING: &str =
        "DefaultEndpointsProtocol=https;AccountName=dummy;AccountKey=c2VjcmV0;EndpointSuffix=core.windows.net";

    fn azure_config(prefix: &str) -> TupleAzureBlobConfig {
        TupleAzureBlobConfig {
            container: "container".to_string(),
            prefix: prefix.to_string(),
            connection_string: Some(CONNECTION_STRING.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_connection_string() {
        let account = AzureAccount::from_connection_string(CONNECTION_STRING).unwrap();
        assert_eq!(account.name, "dummy");
        assert_eq!(account.endpoint_suffix, "core.windows.net");
        assert_eq!(account.access_key.as_deref(), Some("c2VjcmV0"));
        assert!(AzureAccount::from_connection_string("AccountKey=abc").is_err());
    }

    #[test]
    fn test_parse_account_url() {
        let account = AzureAccount::from_account_url("https://myaccount.blob.core.chinacloudapi.cn").unwrap();
        assert_eq!(account.name, "myaccount");
        assert_eq!(account.blob_endpoint(), "https://myaccount.blob.core.chinacloudapi.cn");
    }

    #[tokio::test]
    async fn test_azure_store_backend() -> anyhow::Result<()> {
        let backend =
            TupleAzureBlobStoreBackend::with_object_store(azure_config("this_is_a_test_prefix"), Arc::new(InMemory::new()))
                .await?;

        backend.set(&StoreKey::from(["AAA"]), &json!("aaa")).await?;
        assert_eq!(backend.get(&StoreKey::from(["AAA"])).await?, json!("aaa"));
        assert!(backend.has_key(&StoreKey::from(["AAA"])).await?);
        assert_eq!(
            backend.list_keys(&StoreKey::empty()).await?,
            vec![StoreKey::store_backend_id(), StoreKey::from(["AAA"])]
        );
        assert_eq!(
            backend.get_url_for_key(&StoreKey::from(["AAA"]), None).await?,
            "https://dummy.blob.core.windows.net/container/this_is_a_test_prefix/AAA"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_public_url() -> anyhow::Result<()> {
        let mut config = azure_config("prefix");
        config.tuple.base_public_path = Some("http://www.test.com/".to_string());
        let backend = TupleAzureBlobStoreBackend::with_object_store(config, Arc::new(InMemory::new())).await?;
        assert_eq!(
            backend.get_public_url_for_key(&StoreKey::from(["a b"])).await?,
            "http://www.test.com/prefix/a%20b"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let config = TupleAzureBlobConfig {
            container: "container".to_string(),
            ..Default::default()
        };
        let err = TupleAzureBlobStoreBackend::with_object_store(config, Arc::new(InMemory::new()))
            .await
            .err()
            .unwrap();
        assert!(err.is_store_backend_error());
        assert!(err
            .to_string()
            .contains("Unable to initialize ServiceClient, AZURE_STORAGE_CONNECTION_STRING should be set"));
    }

    #[tokio::test]
    async fn test_config_masks_connection_string() -> anyhow::Result<()> {
        let backend = TupleAzureBlobStoreBackend::with_object_store(azure_config(""), Arc::new(InMemory::new())).await?;
        assert_eq!(backend.config()["connection_string"], "***");
        Ok(())
    }
}
