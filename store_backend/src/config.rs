//! Store backend configuration.
//!
//! Every backend has its own configuration struct. Options shared by the
//! tuple-keyed backends live in [`TupleStoreOptions`] and are flattened into
//! the backend structs, so a YAML document reads as a single flat mapping:
//!
//! ```yaml
//! class_name: TupleS3StoreBackend
//! bucket: my-bucket
//! prefix: validations
//! filepath_suffix: .json
//! ```
//!
//! Unrecognized fields are collected during deserialization and rejected when
//! the backend is constructed.

use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ProjectVariable, StoreError, StoreResult};

/// Objects returned by a single listing call on cloud object stores.
pub const DEFAULT_LIST_PAGE_SIZE: usize = 1000;

/// Options shared by every tuple-keyed backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TupleStoreOptions {
    /// Positional pattern such as `{0}/{1}/foo-{1}.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filepath_template: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filepath_prefix: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filepath_suffix: Option<String>,

    /// Substrings no key segment may contain, in addition to `/` and `\`.
    pub forbidden_substrings: Vec<String>,

    pub platform_specific_separator: bool,

    /// Only valid together with `filepath_template`, which fixes the arity.
    pub fixed_length_key: bool,

    pub suppress_store_backend_id: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub manually_initialize_store_backend_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_public_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
}

impl Default for TupleStoreOptions {
    fn default() -> Self {
        Self {
            filepath_template: None,
            filepath_prefix: None,
            filepath_suffix: None,
            forbidden_substrings: vec!["/".to_string(), "\\".to_string()],
            platform_specific_separator: true,
            fixed_length_key: false,
            suppress_store_backend_id: false,
            manually_initialize_store_backend_id: None,
            base_public_path: None,
            store_name: None,
        }
    }
}

/// Pass-through options applied to every object written to a cloud store.
///
/// `Metadata` (a mapping), `StorageClass` and the standard HTTP headers
/// `CacheControl`, `ContentDisposition`, `ContentEncoding`,
/// `ContentLanguage` and `ContentType` become object attributes. `Tagging`
/// (a mapping) becomes object tags. S3 additionally accepts the encryption
/// settings `ServerSideEncryption`, `SSEKMSKeyId`, `BucketKeyEnabled` and
/// `SSECustomerKey`. Any other option fails construction.
pub type PutOptionsConfig = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryConfig {
    pub fixed_length_key: bool,

    pub suppress_store_backend_id: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub manually_initialize_store_backend_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,

    #[serde(flatten)]
    pub unrecognized: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TupleFilesystemConfig {
    /// Directory holding the stored files. Relative paths are resolved
    /// against `root_directory`.
    pub base_directory: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_directory: Option<String>,

    #[serde(flatten)]
    pub tuple: TupleStoreOptions,

    #[serde(flatten)]
    pub unrecognized: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TupleS3Config {
    pub bucket: String,

    pub prefix: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Custom endpoint (MinIO, localstack). URLs become path-style under it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub s3_put_options: PutOptionsConfig,

    pub list_page_size: usize,

    #[serde(flatten)]
    pub tuple: TupleStoreOptions,

    #[serde(flatten)]
    pub unrecognized: BTreeMap<String, Value>,
}

impl Default for TupleS3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            prefix: String::new(),
            region: None,
            endpoint_url: None,
            s3_put_options: BTreeMap::new(),
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
            tuple: TupleStoreOptions::default(),
            unrecognized: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TupleGcsConfig {
    pub bucket: String,

    pub prefix: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub put_options: PutOptionsConfig,

    pub list_page_size: usize,

    #[serde(flatten)]
    pub tuple: TupleStoreOptions,

    #[serde(flatten)]
    pub unrecognized: BTreeMap<String, Value>,
}

impl Default for TupleGcsConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            prefix: String::new(),
            project: None,
            put_options: BTreeMap::new(),
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
            tuple: TupleStoreOptions::default(),
            unrecognized: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TupleAzureBlobConfig {
    pub container: String,

    pub prefix: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_url: Option<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub put_options: PutOptionsConfig,

    pub list_page_size: usize,

    #[serde(flatten)]
    pub tuple: TupleStoreOptions,

    #[serde(flatten)]
    pub unrecognized: BTreeMap<String, Value>,
}

impl Default for TupleAzureBlobConfig {
    fn default() -> Self {
        Self {
            container: String::new(),
            prefix: String::new(),
            connection_string: None,
            account_url: None,
            put_options: BTreeMap::new(),
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
            tuple: TupleStoreOptions::default(),
            unrecognized: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InlineConfig {
    /// Section of the project document addressed by this backend.
    pub resource_type: ProjectVariable,

    /// YAML file holding the project document. Without one the document
    /// lives only in memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_config_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,

    #[serde(flatten)]
    pub unrecognized: BTreeMap<String, Value>,
}

/// Configuration of any backend, tagged by `class_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class_name")]
pub enum StoreBackendConfig {
    InMemoryStoreBackend(InMemoryConfig),
    TupleFilesystemStoreBackend(TupleFilesystemConfig),
    TupleS3StoreBackend(TupleS3Config),
    #[serde(rename = "TupleGCSStoreBackend")]
    TupleGcsStoreBackend(TupleGcsConfig),
    TupleAzureBlobStoreBackend(TupleAzureBlobConfig),
    InlineStoreBackend(InlineConfig),
}

impl StoreBackendConfig {
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::InMemoryStoreBackend(_) => "InMemoryStoreBackend",
            Self::TupleFilesystemStoreBackend(_) => "TupleFilesystemStoreBackend",
            Self::TupleS3StoreBackend(_) => "TupleS3StoreBackend",
            Self::TupleGcsStoreBackend(_) => "TupleGCSStoreBackend",
            Self::TupleAzureBlobStoreBackend(_) => "TupleAzureBlobStoreBackend",
            Self::InlineStoreBackend(_) => "InlineStoreBackend",
        }
    }
}

/// Fails when deserialization left fields no backend option claimed.
///
/// `module_name` is tolerated because configuration documents commonly
/// carry it next to `class_name`.
pub(crate) fn reject_unrecognized(
    class_name: &str,
    unrecognized: &BTreeMap<String, Value>,
) -> StoreResult<()> {
    let unknown: Vec<&str> = unrecognized
        .keys()
        .map(String::as_str)
        .filter(|k| *k != "module_name")
        .collect();
    if unknown.is_empty() {
        return Ok(());
    }
    Err(StoreError::config(format!(
        "{} does not recognize the option(s): {}",
        class_name,
        unknown.join(", ")
    )))
}

/// Renders a backend configuration as the normalized JSON object reported by
/// `StoreBackend::config`.
pub(crate) fn config_document<C: Serialize>(
    class_name: &str,
    module_name: &str,
    config: &C,
) -> Value {
    let mut document = match serde_json::to_value(config) {
        Ok(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    document.insert("class_name".to_string(), Value::String(class_name.to_string()));
    document.insert("module_name".to_string(), Value::String(module_name.to_string()));
    Value::Object(document)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_tuple_defaults() {
        let options = TupleStoreOptions::default();
        assert!(options.platform_specific_separator);
        assert_eq!(options.forbidden_substrings, vec!["/", "\\"]);
        assert!(options.filepath_template.is_none());
    }

    #[test]
    fn test_deserialize_flat_yaml() {
        let yaml = r#"
class_name: TupleS3StoreBackend
bucket: leakybucket
prefix: this_is_a_test_prefix
filepath_template: "my_file_{0}"
s3_put_options:
  Metadata:
    test: testMetadata
"#;
        let config: StoreBackendConfig = serde_yaml::from_str(yaml).unwrap();
        let StoreBackendConfig::TupleS3StoreBackend(s3) = config else {
            panic!("expected an S3 configuration");
        };
        assert_eq!(s3.bucket, "leakybucket");
        assert_eq!(s3.prefix, "this_is_a_test_prefix");
        assert_eq!(s3.tuple.filepath_template.as_deref(), Some("my_file_{0}"));
        assert_eq!(s3.list_page_size, DEFAULT_LIST_PAGE_SIZE);
        assert_eq!(s3.s3_put_options["Metadata"], json!({"test": "testMetadata"}));
        assert!(s3.unrecognized.is_empty());
    }

    #[test]
    fn test_unrecognized_fields_are_collected() {
        let yaml = r#"
class_name: TupleFilesystemStoreBackend
module_name: some.module
base_directory: expectations
bsae_public_path: http://typo
"#;
        let config: StoreBackendConfig = serde_yaml::from_str(yaml).unwrap();
        let StoreBackendConfig::TupleFilesystemStoreBackend(fs) = config else {
            panic!("expected a filesystem configuration");
        };
        let err = reject_unrecognized("TupleFilesystemStoreBackend", &fs.unrecognized).unwrap_err();
        assert!(err.to_string().contains("bsae_public_path"));
        assert!(!err.to_string().contains("module_name"));
    }

    #[test]
    fn test_config_document_carries_identifiers() {
        let document = config_document("InMemoryStoreBackend", "store_backend::memory", &InMemoryConfig::default());
        assert_eq!(
            document,
            json!({
                "class_name": "InMemoryStoreBackend",
                "module_name": "store_backend::memory",
                "fixed_length_key": false,
                "suppress_store_backend_id": false,
            })
        );
    }
}
