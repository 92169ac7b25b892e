//! Local filesystem store backend.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::text_value;
use crate::{
    config::{config_document, reject_unrecognized},
    url_path::{escape_url_path, join_url},
    BackendIdentity,
    PathCodec,
    SetOptions,
    StoreBackend,
    StoreError,
    StoreKey,
    StoreResult,
    TupleFilesystemConfig,
};

const CLASS_NAME: &str = "TupleFilesystemStoreBackend";

/// Directory names never descended into while listing.
const IGNORED_DIRECTORIES: &[&str] = &[".ipynb_checkpoints"];

/// One file per key beneath a base directory.
pub struct TupleFilesystemStoreBackend {
    base_directory: PathBuf,
    codec: PathCodec,
    config: TupleFilesystemConfig,
    identity: BackendIdentity,
}

impl TupleFilesystemStoreBackend {
    /// Creates the backend, creating its base directory if needed.
    pub async fn new(config: TupleFilesystemConfig) -> StoreResult<Self> {
        reject_unrecognized(CLASS_NAME, &config.unrecognized)?;
        let codec = PathCodec::new(
            CLASS_NAME,
            &config.tuple,
            config.tuple.platform_specific_separator,
        )?;

        let base_directory = Self::resolve_base_directory(&config)?;
        tokio::fs::create_dir_all(&base_directory).await?;

        let backend = Self {
            base_directory,
            codec,
            identity: BackendIdentity::new(config.tuple.manually_initialize_store_backend_id.clone()),
            config,
        };
        if !backend.config.tuple.suppress_store_backend_id {
            backend.identity.resolve(&backend).await;
        }

        debug!(
            base_directory = %backend.base_directory.display(),
            "created filesystem store backend"
        );
        Ok(backend)
    }

    fn resolve_base_directory(config: &TupleFilesystemConfig) -> StoreResult<PathBuf> {
        let base = Path::new(&config.base_directory);
        if base.is_absolute() {
            return Ok(base.to_path_buf());
        }
        match &config.root_directory {
            Some(root) => Ok(Path::new(root).join(base)),
            None => Ok(std::env::current_dir()?.join(base)),
        }
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    fn full_path(&self, key: &StoreKey) -> StoreResult<PathBuf> {
        Ok(self.base_directory.join(self.codec.encode(key)?))
    }

    /// Relative path of a file beneath the base directory, joined with the
    /// codec's separator.
    fn relative_native_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_directory).ok()?;
        let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
        Some(parts?.join(&self.codec.native_separator().to_string()))
    }

    /// Removes empty directories from `path`'s parent up to the base.
    async fn prune_empty_parents(&self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == self.base_directory.as_path() || !dir.starts_with(&self.base_directory) {
                break;
            }
            if tokio::fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

fn to_url_path(path: &str) -> String {
    if MAIN_SEPARATOR == '/' {
        path.to_string()
    } else {
        path.replace(MAIN_SEPARATOR, "/")
    }
}

#[async_trait]
impl StoreBackend for TupleFilesystemStoreBackend {
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
        self.codec.validate_key(key)
    }

    fn check_value(&self, value: &Value) -> StoreResult<()> {
        text_value(CLASS_NAME, value).map(|_| ())
    }

    async fn fetch(&self, key: &StoreKey) -> StoreResult<Value> {
        let path = self.full_path(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Value::String(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::invalid_key(CLASS_NAME, key))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, key: &StoreKey, value: &Value, _options: &SetOptions) -> StoreResult<String> {
        let text = text_value(CLASS_NAME, value)?;
        let path = self.full_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, text).await?;
        debug!(path = %path.display(), "wrote store file");
        Ok(path.display().to_string())
    }

    async fn contains(&self, key: &StoreKey) -> StoreResult<bool> {
        let path = self.full_path(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &StoreKey) -> StoreResult<Vec<StoreKey>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.base_directory.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    let ignored = entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| IGNORED_DIRECTORIES.contains(&name));
                    if !ignored {
                        pending.push(path);
                    }
                    continue;
                }

                let Some(relative) = self.relative_native_path(&path) else {
                    continue;
                };
                match self.codec.decode(&relative) {
                    Ok(key) if key.starts_with(prefix) => keys.push(key),
                    Ok(_) => {}
                    Err(err) => debug!(path = %relative, error = %err, "skipping undecodable file"),
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &StoreKey) -> StoreResult<bool> {
        let path = self.full_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                self.prune_empty_parents(&path).await;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn rename(&self, source: &StoreKey, dest: &StoreKey) -> StoreResult<()> {
        let source_path = self.full_path(source)?;
        let dest_path = self.full_path(dest)?;
        if let Some(parent) = dest_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::rename(&source_path, &dest_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::KeyNotFound { key: source.clone() })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_url_for_key(&self, key: &StoreKey, protocol: Option<&str>) -> StoreResult<String> {
        let path = self.full_path(key)?;
        let protocol = protocol.unwrap_or("file:");
        let url_path = escape_url_path(&to_url_path(&path.display().to_string()));
        Ok(format!("{}//{}", protocol, url_path))
    }

    async fn public_url_for_key(&self, key: &StoreKey) -> StoreResult<Option<String>> {
        let Some(base) = &self.config.tuple.base_public_path else {
            return Ok(None);
        };
        let path = to_url_path(&self.codec.encode(key)?);
        Ok(Some(join_url(base, &escape_url_path(&path))))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use serde_json::json;

    use super::*;
    use crate::{TupleStoreOptions, STORE_BACKEND_ID_PREFIX};

    fn config_for(dir: &Path) -> TupleFilesystemConfig {
        TupleFilesystemConfig {
            base_directory: dir.display().to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_filesystem_store_backend() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = TupleFilesystemStoreBackend::new(config_for(dir.path())).await?;

        backend.set(&StoreKey::from(["AAA"]), &json!("aaa")).await?;
        backend.set(&StoreKey::from(["BBB"]), &json!("bbb")).await?;
        assert_eq!(backend.get(&StoreKey::from(["AAA"])).await?, json!("aaa"));

        let keys: BTreeSet<StoreKey> = backend.list_keys(&StoreKey::empty()).await?.into_iter().collect();
        assert_eq!(
            keys,
            BTreeSet::from([
                StoreKey::store_backend_id(),
                StoreKey::from(["AAA"]),
                StoreKey::from(["BBB"]),
            ])
        );

        assert!(backend.remove_key(&StoreKey::from(["BBB"])).await?);
        let err = backend.get(&StoreKey::from(["BBB"])).await.unwrap_err();
        assert!(err.is_invalid_key());
        assert!(err
            .to_string()
            .contains("Unable to retrieve object from TupleFilesystemStoreBackend with the following key: ('BBB',)"));
        assert!(!backend.remove_key(&StoreKey::from(["BBB"])).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_backend_id_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = TupleFilesystemStoreBackend::new(config_for(dir.path())).await?;

        let id = backend.store_backend_id().await;
        let contents = std::fs::read_to_string(dir.path().join(".ge_store_backend_id"))?;
        assert_eq!(contents, format!("{}{}", STORE_BACKEND_ID_PREFIX, id));

        let other = TupleFilesystemStoreBackend::new(config_for(dir.path())).await?;
        assert_eq!(other.store_backend_id().await, id);
        Ok(())
    }

    #[tokio::test]
    async fn test_relative_base_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = TupleFilesystemStoreBackend::new(TupleFilesystemConfig {
            base_directory: "uncommitted/validations".to_string(),
            root_directory: Some(dir.path().display().to_string()),
            ..Default::default()
        })
        .await?;
        assert_eq!(backend.base_directory(), dir.path().join("uncommitted/validations").as_path());
        assert!(backend.base_directory().is_dir());
        Ok(())
    }

    #[tokio::test]
    async fn test_template_and_nested_keys() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = TupleFilesystemStoreBackend::new(TupleFilesystemConfig {
            tuple: TupleStoreOptions {
                filepath_template: Some("{0}/{1}/{2}/foo-{2}-expectations.txt".to_string()),
                ..Default::default()
            },
            ..config_for(dir.path())
        })
        .await?;

        let key = StoreKey::from(["A", "B", "C"]);
        backend.set(&key, &json!("nested")).await?;
        assert!(dir.path().join("A/B/C/foo-C-expectations.txt").is_file());

        std::fs::write(dir.path().join("stray.txt"), "not a key")?;
        let keys = backend.list_keys(&StoreKey::empty()).await?;
        assert_eq!(keys, vec![StoreKey::store_backend_id(), key.clone()]);

        assert!(backend.remove_key(&key).await?);
        assert!(!dir.path().join("A").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_checkpoint_directories_are_skipped() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = TupleFilesystemStoreBackend::new(TupleFilesystemConfig {
            tuple: TupleStoreOptions {
                filepath_suffix: Some(".json".to_string()),
                ..Default::default()
            },
            ..config_for(dir.path())
        })
        .await?;

        backend.set(&StoreKey::from(["suite", "run"]), &json!(r#"{"ok":true}"#)).await?;
        let checkpoints = dir.path().join("suite/.ipynb_checkpoints");
        std::fs::create_dir_all(&checkpoints)?;
        std::fs::write(checkpoints.join("run-checkpoint.json"), "{}")?;

        let keys = backend.list_keys(&StoreKey::empty()).await?;
        assert_eq!(keys, vec![StoreKey::store_backend_id(), StoreKey::from(["suite", "run"])]);
        assert_eq!(
            backend.get(&StoreKey::from(["suite", "run"])).await?,
            json!(r#"{"ok":true}"#)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_values_round_trip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = TupleFilesystemStoreBackend::new(config_for(dir.path())).await?;

        let key = StoreKey::from(["B"]);
        let value = json!("{\"x\": 1}\nsecond line");
        backend.set(&key, &value).await?;
        assert_eq!(backend.get(&key).await?, value);

        for rejected in [json!({"x": 1}), json!(123), json!(null), json!(["a"])] {
            let err = backend.set(&StoreKey::from(["C"]), &rejected).await.unwrap_err();
            assert!(err.is_value_type());
            let err = backend.add(&StoreKey::from(["C"]), &rejected).await.unwrap_err();
            assert!(err.is_value_type());
        }
        assert!(!dir.path().join("C").exists());
        assert!(backend.update(&key, &json!(1)).await.unwrap_err().is_value_type());
        assert_eq!(backend.get(&key).await?, value);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_with_prefix() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = TupleFilesystemStoreBackend::new(config_for(dir.path())).await?;
        backend.set(&StoreKey::from(["a", "1"]), &json!("x")).await?;
        backend.set(&StoreKey::from(["a", "2"]), &json!("y")).await?;
        backend.set(&StoreKey::from(["b", "1"]), &json!("z")).await?;

        let keys = backend.list_keys(&StoreKey::from(["a"])).await?;
        assert_eq!(keys, vec![StoreKey::from(["a", "1"]), StoreKey::from(["a", "2"])]);
        Ok(())
    }

    #[tokio::test]
    async fn test_filepath_prefix_may_not_end_with_separator() {
        for prefix in ["invalid_prefix_ends_with/", "invalid_prefix_ends_with\\"] {
            let dir = tempfile::tempdir().unwrap();
            let err = TupleFilesystemStoreBackend::new(TupleFilesystemConfig {
                tuple: TupleStoreOptions {
                    filepath_prefix: Some(prefix.to_string()),
                    ..Default::default()
                },
                ..config_for(dir.path())
            })
            .await
            .err()
            .unwrap();
            assert!(err.is_store_backend_error());
        }
    }

    #[tokio::test]
    async fn test_move() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = TupleFilesystemStoreBackend::new(config_for(dir.path())).await?;
        let (source, dest) = (StoreKey::from(["a", "b"]), StoreKey::from(["c", "d"]));

        backend.set(&source, &json!("moving")).await?;
        backend.move_key(&source, &dest).await?;
        assert!(!backend.has_key(&source).await?);
        assert_eq!(backend.get(&dest).await?, json!("moving"));
        assert!(backend.move_key(&source, &dest).await.unwrap_err().is_key_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_urls() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = TupleFilesystemStoreBackend::new(TupleFilesystemConfig {
            tuple: TupleStoreOptions {
                base_public_path: Some("http://www.test.com/".to_string()),
                ..Default::default()
            },
            ..config_for(dir.path())
        })
        .await?;

        let key = StoreKey::from(["validations", "default_pandas_datasource-#ephemeral_pandas_asset.html"]);
        let url = backend.get_url_for_key(&key, None).await?;
        assert!(url.starts_with("file:///"));
        assert!(url.ends_with("/validations/default_pandas_datasource-%23ephemeral_pandas_asset.html"));

        assert_eq!(
            backend.get_public_url_for_key(&key).await?,
            "http://www.test.com/validations/default_pandas_datasource-%23ephemeral_pandas_asset.html"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_forbidden_segment_is_rejected_before_io() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = TupleFilesystemStoreBackend::new(config_for(dir.path())).await?;
        let err = backend.set(&StoreKey::from(["a/b"]), &json!("x")).await.unwrap_err();
        assert!(err.is_invalid_path());
        assert!(!dir.path().join("a").exists());

        let unguarded = TupleFilesystemStoreBackend::new(TupleFilesystemConfig {
            tuple: TupleStoreOptions {
                forbidden_substrings: vec![],
                ..Default::default()
            },
            ..config_for(dir.path())
        })
        .await?;
        for segment in ["a/b", "a\\b"] {
            let err = unguarded.set(&StoreKey::from([segment]), &json!("x")).await.unwrap_err();
            assert!(err.is_invalid_path());
        }
        assert!(!dir.path().join("a").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_key_is_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = TupleFilesystemStoreBackend::new(config_for(dir.path())).await?;

        let err = backend.set(&StoreKey::empty(), &json!("x")).await.unwrap_err();
        assert!(err.is_invalid_path());
        assert!(backend.get(&StoreKey::empty()).await.unwrap_err().is_invalid_path());

        let err = backend.set(&StoreKey::from([""]), &json!("x")).await.unwrap_err();
        assert!(err.is_invalid_path());
        assert!(dir.path().is_dir());
        Ok(())
    }
}
