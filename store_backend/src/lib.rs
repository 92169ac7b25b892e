//! Tuple-keyed store backends.
//!
//! This crate provides one key/value contract, [`StoreBackend`], over several
//! storage media:
//!
//! - In-process map ([`InMemoryStoreBackend`])
//! - Local directory tree ([`TupleFilesystemStoreBackend`])
//! - S3, GCS and Azure Blob containers ([`TupleS3StoreBackend`],
//!   [`TupleGcsStoreBackend`], [`TupleAzureBlobStoreBackend`])
//! - The project configuration document ([`InlineStoreBackend`])
//!
//! # Architecture
//!
//! Keys are tuples of strings ([`StoreKey`]). File and object backends map
//! them to native paths through a [`PathCodec`], which honours the optional
//! `filepath_template`, `filepath_prefix` and `filepath_suffix` options and
//! decodes listed paths back into keys. Every backend persists a UUID under
//! the reserved `(".ge_store_backend_id",)` key and reports it through
//! [`StoreBackend::store_backend_id`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use serde_json::json;
//! use store_backend::{build_store_backend, StoreBackend, StoreBackendConfig, StoreKey};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config: StoreBackendConfig = serde_yaml::from_str(
//!     "class_name: TupleFilesystemStoreBackend\nbase_directory: /tmp/validations\nfilepath_suffix: .json\n",
//! )?;
//! let store = build_store_backend(config).await?;
//!
//! let key = StoreKey::from(["my_suite", "20230315T205136Z"]);
//! // File and object media hold text, so structured values are serialized first.
//! store.set(&key, &json!(json!({"success": true}).to_string())).await?;
//! let keys = store.list_keys(&StoreKey::empty()).await?;
//! # Ok(())
//! # }
//! ```

mod backend_id;
mod backends;
mod codec;
mod config;
mod document;
mod error;
mod factory;
mod key;
mod metrics;
mod traits;
mod url_path;

pub use backend_id::BackendIdentity;
pub use backends::{
    azure::TupleAzureBlobStoreBackend,
    filesystem::TupleFilesystemStoreBackend,
    gcs::TupleGcsStoreBackend,
    inline::InlineStoreBackend,
    memory::InMemoryStoreBackend,
    object::{normalize_prefix, ObjectStoreCore},
    s3::TupleS3StoreBackend,
};
pub use codec::{FilepathTemplate, PathCodec};
pub use config::{
    InMemoryConfig,
    InlineConfig,
    PutOptionsConfig,
    StoreBackendConfig,
    TupleAzureBlobConfig,
    TupleFilesystemConfig,
    TupleGcsConfig,
    TupleS3Config,
    TupleStoreOptions,
    DEFAULT_LIST_PAGE_SIZE,
};
pub use document::{
    AnonymousUsageStatistics,
    ConcurrencyConfig,
    IncludeRenderedContentConfig,
    ProgressBarsConfig,
    ProjectConfig,
    ProjectDocument,
    ProjectVariable,
};
pub use error::{StoreError, StoreResult};
pub use factory::{build_instrumented_store_backend, build_store_backend};
pub use key::{StoreKey, STORE_BACKEND_ID_KEY, STORE_BACKEND_ID_PREFIX, STORE_BACKEND_INVALID_CONFIGURATION_ID};
pub use metrics::InstrumentedStoreBackend;
pub use traits::{SetOptions, StoreBackend};
pub use url_path::{escape_url_path, join_url};
