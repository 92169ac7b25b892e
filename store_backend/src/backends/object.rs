//! Shared plumbing for the cloud object-store backends.
//!
//! S3, GCS and Azure differ only in how the client is built and how URLs are
//! formed. Reading, writing, listing and deleting objects go through
//! [`ObjectStoreCore`] over an `Arc<dyn ObjectStore>`, which also lets tests
//! swap in `object_store::memory::InMemory`.

use std::{borrow::Cow, path::MAIN_SEPARATOR, sync::Arc};

use async_stream::try_stream;
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use object_store::{path::Path as ObjectPath, Attribute, Attributes, ObjectMeta, ObjectStore, PutOptions, PutPayload, TagSet};
use serde_json::{Map, Value};
use tracing::debug;

use super::text_value;
use crate::{PathCodec, PutOptionsConfig, SetOptions, StoreError, StoreKey, StoreResult, TupleStoreOptions};

/// Put options applied to every written object.
const SUPPORTED_PUT_OPTIONS: &[&str] = &[
    "Metadata",
    "Tagging",
    "CacheControl",
    "ContentDisposition",
    "ContentEncoding",
    "ContentLanguage",
    "ContentType",
    "StorageClass",
];

/// Object client, container prefix and key codec of one backend.
pub struct ObjectStoreCore {
    class_name: &'static str,
    store: Arc<dyn ObjectStore>,
    prefix: String,
    codec: PathCodec,
    put_options: PutOptionsConfig,
    list_page_size: usize,
}

impl ObjectStoreCore {
    pub fn new(
        class_name: &'static str,
        store: Arc<dyn ObjectStore>,
        prefix: &str,
        tuple: &TupleStoreOptions,
        put_options: PutOptionsConfig,
        list_page_size: usize,
    ) -> StoreResult<Self> {
        if list_page_size == 0 {
            return Err(StoreError::config("list_page_size must be at least 1"));
        }
        let core = Self {
            class_name,
            store,
            prefix: normalize_prefix(prefix, tuple.platform_specific_separator),
            codec: PathCodec::new(class_name, tuple, false)?,
            put_options,
            list_page_size,
        };
        core.build_put_options(&SetOptions::default())?;
        Ok(core)
    }

    pub fn codec(&self) -> &PathCodec {
        &self.codec
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Path of the key relative to the container prefix.
    pub fn encode(&self, key: &StoreKey) -> StoreResult<String> {
        self.codec.encode(key)
    }

    /// Full object name, container prefix included.
    pub fn object_key(&self, key: &StoreKey) -> StoreResult<String> {
        let path = self.codec.encode(key)?;
        if self.prefix.is_empty() {
            Ok(path)
        } else {
            Ok(format!("{}/{}", self.prefix, path))
        }
    }

    fn object_path(&self, key: &StoreKey) -> StoreResult<ObjectPath> {
        Ok(ObjectPath::parse(self.object_key(key)?)?)
    }

    fn build_put_options(&self, options: &SetOptions) -> StoreResult<PutOptions> {
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, options.content_type.clone().into());
        attributes.insert(Attribute::ContentEncoding, options.content_encoding.clone().into());

        let mut tags = TagSet::default();
        for (name, value) in &self.put_options {
            let attribute = match name.as_str() {
                "Metadata" => {
                    for (field, field_value) in self.option_mapping(name, value)? {
                        attributes.insert(
                            Attribute::Metadata(Cow::Owned(field.clone())),
                            self.option_text(field, field_value)?.into(),
                        );
                    }
                    continue;
                }
                "Tagging" => {
                    for (tag, tag_value) in self.option_mapping(name, value)? {
                        tags.push(tag, &self.option_text(tag, tag_value)?);
                    }
                    continue;
                }
                "CacheControl" => Attribute::CacheControl,
                "ContentDisposition" => Attribute::ContentDisposition,
                "ContentEncoding" => Attribute::ContentEncoding,
                "ContentLanguage" => Attribute::ContentLanguage,
                "ContentType" => Attribute::ContentType,
                "StorageClass" => Attribute::StorageClass,
                other => {
                    return Err(StoreError::config(format!(
                        "{} does not support the put option {}; supported options are {}",
                        self.class_name,
                        other,
                        SUPPORTED_PUT_OPTIONS.join(", ")
                    )))
                }
            };
            attributes.insert(attribute, self.option_text(name, value)?.into());
        }

        Ok(PutOptions {
            attributes,
            tags,
            ..Default::default()
        })
    }

    fn option_mapping<'a>(&self, name: &str, value: &'a Value) -> StoreResult<&'a Map<String, Value>> {
        value.as_object().ok_or_else(|| {
            StoreError::config(format!("{}: {} put option must be a mapping", self.class_name, name))
        })
    }

    fn option_text(&self, name: &str, value: &Value) -> StoreResult<String> {
        match value {
            Value::String(text) => Ok(text.clone()),
            Value::Bool(_) | Value::Number(_) => Ok(value.to_string()),
            _ => Err(StoreError::config(format!(
                "{}: put option {} must be a string, number or boolean",
                self.class_name, name
            ))),
        }
    }

    pub fn check_value(&self, value: &Value) -> StoreResult<()> {
        text_value(self.class_name, value).map(|_| ())
    }

    pub async fn get(&self, key: &StoreKey) -> StoreResult<Value> {
        let path = self.object_path(key)?;
        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StoreError::invalid_key(self.class_name, key))
            }
            Err(e) => return Err(e.into()),
        };
        let bytes = result.bytes().await?;
        let text = String::from_utf8(bytes.to_vec()).map_err(|e| StoreError::Serialization {
            source: anyhow::Error::from(e),
        })?;
        Ok(Value::String(text))
    }

    pub async fn put(&self, key: &StoreKey, value: &Value, options: &SetOptions) -> StoreResult<String> {
        let payload = Bytes::from(text_value(self.class_name, value)?.to_owned());
        let path = self.object_path(key)?;
        let put_options = self.build_put_options(options)?;
        self.store
            .put_opts(&path, PutPayload::from(payload), put_options)
            .await?;
        debug!(backend = self.class_name, object = %path, "wrote object");
        Ok(path.to_string())
    }

    pub async fn exists(&self, key: &StoreKey) -> StoreResult<bool> {
        let path = self.object_path(key)?;
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, key: &StoreKey) -> StoreResult<bool> {
        if !self.exists(key).await? {
            return Ok(false);
        }
        let path = self.object_path(key)?;
        match self.store.delete(&path).await {
            Ok(()) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn rename(&self, source: &StoreKey, dest: &StoreKey) -> StoreResult<()> {
        let from = self.object_path(source)?;
        let to = self.object_path(dest)?;
        match self.store.rename(&from, &to).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Err(StoreError::KeyNotFound { key: source.clone() }),
            Err(e) => Err(e.into()),
        }
    }

    /// Object names under the container prefix, a page at a time.
    ///
    /// Each page holds at most `list_page_size` names and resumes after the
    /// last name of the previous page. The stream ends after the first short
    /// page.
    pub fn list_object_pages(&self) -> impl Stream<Item = StoreResult<Vec<String>>> + Send + '_ {
        try_stream! {
            let list_prefix = if self.prefix.is_empty() {
                None
            } else {
                Some(ObjectPath::parse(&self.prefix)?)
            };
            let mut cursor: Option<ObjectPath> = None;
            loop {
                let listing = match &cursor {
                    Some(offset) => self.store.list_with_offset(list_prefix.as_ref(), offset),
                    None => self.store.list(list_prefix.as_ref()),
                };
                let page: Vec<ObjectMeta> = listing.take(self.list_page_size).try_collect().await?;
                let exhausted = page.len() < self.list_page_size;
                cursor = page.last().map(|meta| meta.location.clone());
                let names: Vec<String> = page.into_iter().map(|meta| meta.location.to_string()).collect();
                if !names.is_empty() {
                    yield names;
                }
                if exhausted {
                    break;
                }
            }
        }
    }

    /// Every key under the container prefix that starts with `prefix`.
    ///
    /// Objects whose names do not decode are skipped.
    pub async fn list(&self, prefix: &StoreKey) -> StoreResult<Vec<StoreKey>> {
        let object_prefix = if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        };

        let mut keys = Vec::new();
        let mut pages = Box::pin(self.list_object_pages());
        while let Some(page) = pages.next().await {
            for name in page? {
                let Some(relative) = name.strip_prefix(&object_prefix) else {
                    continue;
                };
                match self.codec.decode(relative) {
                    Ok(key) if key.starts_with(prefix) => keys.push(key),
                    Ok(_) => {}
                    Err(err) => debug!(backend = self.class_name, object = %name, error = %err, "skipping undecodable object"),
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Strips leading and trailing separators from a bucket or container prefix.
pub fn normalize_prefix(prefix: &str, platform_specific_separator: bool) -> String {
    let prefix = if platform_specific_separator {
        prefix.trim_matches(MAIN_SEPARATOR)
    } else {
        prefix
    };
    prefix.trim_matches('/').to_string()
}
