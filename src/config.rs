use std::path::Path;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use store_backend::StoreBackendConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorectlConfig {
    #[serde(default)]
    pub structured_logging: bool,

    /// Wrap the backend so every operation is timed.
    #[serde(default)]
    pub enable_metrics: bool,

    pub store_backend: StoreBackendConfig,
}

impl StorectlConfig {
    pub fn from_path(path: &Path) -> Result<StorectlConfig> {
        let config_str = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&config_str)
    }

    /// Values from `STORECTL_`-prefixed environment variables override the
    /// YAML. Nested fields are separated by `__`, as in
    /// `STORECTL_STORE_BACKEND__BUCKET`.
    pub fn from_yaml_str(config_str: &str) -> Result<StorectlConfig> {
        let config: StorectlConfig = Figment::new()
            .merge(Yaml::string(config_str))
            .merge(Env::prefixed("STORECTL_").split("__"))
            .extract()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filesystem_config() -> Result<()> {
        let config = StorectlConfig::from_yaml_str(
            r#"
structured_logging: true
store_backend:
  class_name: TupleFilesystemStoreBackend
  base_directory: uncommitted/validations
  filepath_suffix: .json
"#,
        )?;
        assert!(config.structured_logging);
        assert!(!config.enable_metrics);
        let StoreBackendConfig::TupleFilesystemStoreBackend(fs) = config.store_backend else {
            panic!("expected a filesystem backend");
        };
        assert_eq!(fs.base_directory, "uncommitted/validations");
        assert_eq!(fs.tuple.filepath_suffix.as_deref(), Some(".json"));
        Ok(())
    }

    #[test]
    fn test_missing_backend_is_an_error() {
        assert!(StorectlConfig::from_yaml_str("structured_logging: false\n").is_err());
    }

    #[test]
    fn test_from_path() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("storectl.yaml");
        std::fs::write(&path, "store_backend:\n  class_name: InMemoryStoreBackend\n")?;
        let config = StorectlConfig::from_path(&path)?;
        assert_eq!(config.store_backend.class_name(), "InMemoryStoreBackend");
        Ok(())
    }
}
