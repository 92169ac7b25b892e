//! Amazon S3 store backend.

use std::sync::Arc;

use async_trait::async_trait;
use object_store::{
    aws::{AmazonS3Builder, AmazonS3ConfigKey},
    ObjectStore,
};
use serde_json::Value;
use tracing::debug;

use super::object::ObjectStoreCore;
use crate::{
    config::{config_document, reject_unrecognized},
    url_path::{escape_url_path, join_url},
    BackendIdentity,
    PutOptionsConfig,
    SetOptions,
    StoreBackend,
    StoreError,
    StoreKey,
    StoreResult,
    TupleS3Config,
};

const CLASS_NAME: &str = "TupleS3StoreBackend";

/// `s3_put_options` applied through the client's encryption settings, with
/// the client configuration key each one maps to.
const ENCRYPTION_PUT_OPTIONS: &[(&str, &str)] = &[
    ("ServerSideEncryption", "aws_server_side_encryption"),
    ("SSEKMSKeyId", "aws_sse_kms_key_id"),
    ("BucketKeyEnabled", "aws_sse_bucket_key_enabled"),
    ("SSECustomerKey", "aws_sse_customer_key_base64"),
];

const SERVER_SIDE_ENCRYPTION_TYPES: &[&str] = &["AES256", "aws:kms", "aws:kms:dsse", "sse-c"];

/// `s3_put_options` split into client encryption settings and options
/// applied to each object.
#[derive(Debug)]
struct S3PutOptions {
    encryption: Vec<(AmazonS3ConfigKey, String)>,
    object: PutOptionsConfig,
}

impl S3PutOptions {
    fn split(options: &PutOptionsConfig) -> StoreResult<Self> {
        let mut encryption = Vec::new();
        let mut object = PutOptionsConfig::new();
        for (name, value) in options {
            let Some((_, config_key)) = ENCRYPTION_PUT_OPTIONS.iter().find(|(option, _)| *option == name.as_str()) else {
                object.insert(name.clone(), value.clone());
                continue;
            };
            let text = match value {
                Value::String(text) => text.clone(),
                Value::Bool(flag) => flag.to_string(),
                _ => {
                    return Err(StoreError::config(format!(
                        "{}: s3_put_options.{} must be a string",
                        CLASS_NAME, name
                    )))
                }
            };
            if name == "ServerSideEncryption" && !SERVER_SIDE_ENCRYPTION_TYPES.contains(&text.as_str()) {
                return Err(StoreError::config(format!(
                    "{}: ServerSideEncryption must be one of {}, got {}",
                    CLASS_NAME,
                    SERVER_SIDE_ENCRYPTION_TYPES.join(", "),
                    text
                )));
            }
            encryption.push((config_key.parse::<AmazonS3ConfigKey>()?, text));
        }
        Ok(Self { encryption, object })
    }
}

/// One object per key in an S3 bucket, below an optional prefix.
pub struct TupleS3StoreBackend {
    core: ObjectStoreCore,
    config: TupleS3Config,
    identity: BackendIdentity,
}

impl TupleS3StoreBackend {
    /// Builds an S3 client from the configuration and the `AWS_*`
    /// environment.
    pub async fn new(config: TupleS3Config) -> StoreResult<Self> {
        reject_unrecognized(CLASS_NAME, &config.unrecognized)?;
        let put_options = S3PutOptions::split(&config.s3_put_options)?;
        let store = Self::build_client(&config, &put_options)?;
        Self::with_parts(config, Arc::new(store), put_options.object).await
    }

    /// Uses `store` as the bucket. Encryption settings among
    /// `s3_put_options` are validated but left to the caller's client.
    pub async fn with_object_store(config: TupleS3Config, store: Arc<dyn ObjectStore>) -> StoreResult<Self> {
        reject_unrecognized(CLASS_NAME, &config.unrecognized)?;
        let put_options = S3PutOptions::split(&config.s3_put_options)?;
        Self::with_parts(config, store, put_options.object).await
    }

    async fn with_parts(
        config: TupleS3Config,
        store: Arc<dyn ObjectStore>,
        object_put_options: PutOptionsConfig,
    ) -> StoreResult<Self> {
        if config.bucket.is_empty() {
            return Err(StoreError::config("TupleS3StoreBackend requires a bucket"));
        }
        let core = ObjectStoreCore::new(
            CLASS_NAME,
            store,
            &config.prefix,
            &config.tuple,
            object_put_options,
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
            "created S3 store backend"
        );
        Ok(backend)
    }

    fn build_client(config: &TupleS3Config, put_options: &S3PutOptions) -> StoreResult<object_store::aws::AmazonS3> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&config.bucket);
        for (key, value) in &put_options.encryption {
            builder = builder.with_config(*key, value);
        }
        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        Ok(builder.build()?)
    }

    /// Root of every object URL: the endpoint (or regional S3 host) and the
    /// bucket.
    fn bucket_url(&self) -> String {
        match &self.config.endpoint_url {
            Some(endpoint) => join_url(endpoint, &self.config.bucket),
            None => {
                let location = match &self.config.region {
                    Some(region) if !region.is_empty() => format!("s3-{}", region),
                    _ => "s3".to_string(),
                };
                format!("https://{}.amazonaws.com/{}", location, self.config.bucket)
            }
        }
    }
}

#[async_trait]
impl StoreBackend for TupleS3StoreBackend {
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
        let object_key = self.core.object_key(key)?;
        Ok(join_url(&self.bucket_url(), &escape_url_path(&object_key)))
    }

    async fn public_url_for_key(&self, key: &StoreKey) -> StoreResult<Option<String>> {
        let Some(base) = &self.config.tuple.base_public_path else {
            return Ok(None);
        };
        let path = self.core.encode(key)?;
        Ok(Some(join_url(base, &escape_url_path(&path))))
    }
}
