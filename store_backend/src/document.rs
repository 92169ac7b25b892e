//! The project configuration document behind the inline backend.
//!
//! A [`ProjectDocument`] holds one typed [`ProjectConfig`]. Mutations are
//! applied to a JSON rendering of the document and accepted only if the
//! result deserializes back into a valid `ProjectConfig`. When the document
//! is bound to a file, every accepted mutation rewrites that file as YAML.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use tokio::sync::RwLock;
use tracing::debug;

use crate::{StoreError, StoreResult};

/// Top-level variables of the project document.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProjectVariable {
    ConfigVersion,
    Datasources,
    FluentDatasources,
    ExpectationsStoreName,
    ValidationsStoreName,
    EvaluationParameterStoreName,
    CheckpointStoreName,
    PluginsDirectory,
    Stores,
    DataDocsSites,
    ConfigVariablesFilePath,
    AnonymousUsageStatistics,
    Notebooks,
    Concurrency,
    ProgressBars,
    IncludeRenderedContent,
    /// The whole document.
    #[default]
    #[serde(rename = "data_context_variables")]
    #[strum(serialize = "data_context_variables")]
    AllVariables,
}

impl ProjectVariable {
    /// The sixteen addressable variables, in document order.
    pub fn variables() -> impl Iterator<Item = ProjectVariable> {
        Self::iter().filter(|v| *v != Self::AllVariables)
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Whether the variable is a name-keyed collection.
    pub fn is_map(&self) -> bool {
        matches!(
            self,
            Self::Datasources | Self::FluentDatasources | Self::Stores | Self::DataDocsSites
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnonymousUsageStatistics {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_context_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_statistics_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConcurrencyConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgressBarsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub globally: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profilers: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_calculations: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IncludeRenderedContentConfig {
    #[serde(default)]
    pub globally: bool,

    #[serde(default)]
    pub expectation_suite: bool,

    #[serde(default)]
    pub expectation_validation_result: bool,
}

type Section = Map<String, Value>;

/// Typed project configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ProjectConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_version: Option<f64>,

    pub datasources: BTreeMap<String, Section>,

    pub fluent_datasources: BTreeMap<String, Section>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expectations_store_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub validations_store_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation_parameter_store_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_store_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugins_directory: Option<String>,

    pub stores: BTreeMap<String, Section>,

    pub data_docs_sites: BTreeMap<String, Section>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_variables_file_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymous_usage_statistics: Option<AnonymousUsageStatistics>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub notebooks: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<ConcurrencyConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_bars: Option<ProgressBarsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_rendered_content: Option<IncludeRenderedContentConfig>,
}

impl ProjectConfig {
    pub fn data_context_id(&self) -> Option<&str> {
        self.anonymous_usage_statistics
            .as_ref()
            .and_then(|stats| stats.data_context_id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

/// Process-wide owner of the project configuration.
#[derive(Debug)]
pub struct ProjectDocument {
    config: RwLock<ProjectConfig>,
    path: Option<PathBuf>,
}

impl ProjectDocument {
    /// A document that lives only in memory.
    pub fn new(config: ProjectConfig) -> Self {
        Self {
            config: RwLock::new(config),
            path: None,
        }
    }

    /// Loads the document from a YAML file, or starts an empty one bound to
    /// that file when it does not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let config = match tokio::fs::read_to_string(&path).await {
            Ok(text) if text.trim().is_empty() => ProjectConfig::default(),
            Ok(text) => serde_yaml::from_str(&text)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => ProjectConfig::default(),
            Err(err) => return Err(err.into()),
        };
        debug!(path = %path.display(), "opened project document");
        Ok(Self {
            config: RwLock::new(config),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn snapshot(&self) -> ProjectConfig {
        self.config.read().await.clone()
    }

    /// JSON rendering of the whole document.
    pub async fn to_value(&self) -> StoreResult<Value> {
        let config = self.config.read().await;
        Ok(serde_json::to_value(&*config)?)
    }

    /// Applies `edit` to the JSON rendering of the document, validates the
    /// result and saves it.
    ///
    /// The in-memory document only changes once the save succeeds.
    pub async fn mutate<F>(&self, edit: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Map<String, Value>) -> StoreResult<()> + Send,
    {
        let mut config = self.config.write().await;
        let mut candidate = match serde_json::to_value(&*config)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        edit(&mut candidate)?;
        let validated: ProjectConfig = serde_json::from_value(Value::Object(candidate)).map_err(|err| {
            StoreError::store_backend(format!("ValueError while calling set on store backend: {}", err))
        })?;
        self.save(&validated).await?;
        *config = validated;
        Ok(())
    }

    async fn save(&self, config: &ProjectConfig) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let yaml = serde_yaml::to_string(config)?;
        tokio::fs::write(path, yaml).await?;
        debug!(path = %path.display(), "saved project document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_variable_names() {
        assert_eq!(ProjectVariable::variables().count(), 16);
        assert_eq!(ProjectVariable::DataDocsSites.to_string(), "data_docs_sites");
        assert_eq!(
            ProjectVariable::from_str("data_context_variables").unwrap(),
            ProjectVariable::AllVariables
        );
        assert!(ProjectVariable::from_str("not_a_variable").is_err());
        assert!(ProjectVariable::Stores.is_map());
        assert!(!ProjectVariable::PluginsDirectory.is_map());
    }

    #[tokio::test]
    async fn test_mutation_is_validated() {
        let document = ProjectDocument::new(ProjectConfig::default());
        document
            .mutate(|doc| {
                doc.insert("plugins_directory".to_string(), json!("plugins/"));
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(document.snapshot().await.plugins_directory.as_deref(), Some("plugins/"));

        let err = document
            .mutate(|doc| {
                doc.insert("config_version".to_string(), json!("not a number"));
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("ValueError while calling set on store backend"));
        assert_eq!(document.snapshot().await.config_version, None);
    }

    #[tokio::test]
    async fn test_file_bound_document_is_saved() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("great_expectations.yml");

        let document = ProjectDocument::open(&path).await?;
        document
            .mutate(|doc| {
                doc.insert("expectations_store_name".to_string(), json!("my_store"));
                Ok(())
            })
            .await?;

        let reopened = ProjectDocument::open(&path).await?;
        assert_eq!(
            reopened.snapshot().await.expectations_store_name.as_deref(),
            Some("my_store")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_save_keeps_document() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("great_expectations.yml");

        let document = ProjectDocument::open(&path).await?;
        tokio::fs::create_dir(&path).await?;

        let result = document
            .mutate(|doc| {
                doc.insert("expectations_store_name".to_string(), json!("my_store"));
                Ok(())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(document.snapshot().await, ProjectConfig::default());
        assert!(path.is_dir());
        Ok(())
    }
}
