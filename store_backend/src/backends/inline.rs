//! Store backend whose medium is the project configuration document.
//!
//! The backend addresses one [`ProjectVariable`] of a shared
//! [`ProjectDocument`]. The empty key (or `("",)`) addresses the whole
//! variable; `(name,)` addresses an entry of a map-valued variable, or a
//! variable when the backend addresses the whole document.

use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    config::{config_document, reject_unrecognized},
    BackendIdentity,
    InlineConfig,
    ProjectDocument,
    ProjectVariable,
    SetOptions,
    StoreBackend,
    StoreError,
    StoreKey,
    StoreResult,
};

const CLASS_NAME: &str = "InlineStoreBackend";

/// Location within the document a key resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Document,
    Variable(ProjectVariable),
    Entry(ProjectVariable, String),
}

pub struct InlineStoreBackend {
    document: Arc<ProjectDocument>,
    config: InlineConfig,
    identity: BackendIdentity,
}

impl InlineStoreBackend {
    /// Opens the document named by `project_config_path`, or an empty
    /// in-memory document when none is configured.
    pub async fn new(config: InlineConfig) -> StoreResult<Self> {
        reject_unrecognized(CLASS_NAME, &config.unrecognized)?;
        let document = match &config.project_config_path {
            Some(path) => ProjectDocument::open(path).await?,
            None => ProjectDocument::new(Default::default()),
        };
        Self::with_document(config, Arc::new(document))
    }

    /// Addresses `config.resource_type` within an already open document.
    pub fn with_document(config: InlineConfig, document: Arc<ProjectDocument>) -> StoreResult<Self> {
        reject_unrecognized(CLASS_NAME, &config.unrecognized)?;
        debug!(resource_type = %config.resource_type, "created inline store backend");
        Ok(Self {
            document,
            config,
            identity: BackendIdentity::ephemeral(),
        })
    }

    pub fn document(&self) -> &Arc<ProjectDocument> {
        &self.document
    }

    pub fn resource_type(&self) -> ProjectVariable {
        self.config.resource_type
    }

    fn resolve(&self, key: &StoreKey) -> StoreResult<Target> {
        let name = match key.segments() {
            [] => None,
            [name] if name.is_empty() => None,
            [name] => Some(name.as_str()),
            _ => {
                return Err(StoreError::invalid_path(format!(
                    "{} keys have at most one element, got {}",
                    CLASS_NAME, key
                )))
            }
        };
        let resource = self.config.resource_type;
        Ok(match (resource, name) {
            (ProjectVariable::AllVariables, None) => Target::Document,
            (ProjectVariable::AllVariables, Some(name)) => match ProjectVariable::from_str(name) {
                Ok(variable) if variable != ProjectVariable::AllVariables => Target::Variable(variable),
                _ => return Err(StoreError::invalid_key(CLASS_NAME, key)),
            },
            (variable, None) => Target::Variable(variable),
            (variable, Some(name)) => Target::Entry(variable, name.to_string()),
        })
    }

    fn is_top_level(&self, target: &Target) -> bool {
        matches!(target, Target::Document | Target::Variable(_))
    }
}

fn lookup(document: &Value, target: &Target) -> Option<Value> {
    match target {
        Target::Document => Some(document.clone()),
        Target::Variable(variable) => Some(document.get(variable.as_str()).cloned().unwrap_or(Value::Null)),
        Target::Entry(variable, name) => document.get(variable.as_str())?.get(name).cloned(),
    }
}

#[async_trait]
impl StoreBackend for InlineStoreBackend {
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
        match self.resolve(key) {
            Err(err) if !err.is_invalid_key() => Err(err),
            _ => Ok(()),
        }
    }

    async fn fetch(&self, key: &StoreKey) -> StoreResult<Value> {
        let target = self.resolve(key)?;
        let document = self.document.to_value().await?;
        lookup(&document, &target).ok_or_else(|| StoreError::invalid_key(CLASS_NAME, key))
    }

    async fn store(&self, key: &StoreKey, value: &Value, _options: &SetOptions) -> StoreResult<String> {
        let target = self.resolve(key)?;
        let value = value.clone();
        self.document
            .mutate(move |document| {
                match target {
                    Target::Document => {
                        let Value::Object(replacement) = value else {
                            return Err(StoreError::store_backend(
                                "ValueError while calling set on store backend: the project document must be a mapping",
                            ));
                        };
                        *document = replacement;
                    }
                    Target::Variable(variable) => {
                        document.insert(variable.to_string(), value);
                    }
                    Target::Entry(variable, name) => {
                        if !variable.is_map() {
                            return Err(StoreError::store_backend(format!(
                                "ValueError while calling set on store backend: {} has no named entries",
                                variable
                            )));
                        }
                        let section = document
                            .entry(variable.to_string())
                            .or_insert_with(|| Value::Object(Map::new()));
                        match section {
                            Value::Object(entries) => {
                                entries.insert(name, value);
                            }
                            other => {
                                let mut entries = Map::new();
                                entries.insert(name, value);
                                *other = Value::Object(entries);
                            }
                        }
                    }
                }
                Ok(())
            })
            .await?;
        debug!(resource_type = %self.config.resource_type, key = %key, "updated project document");
        Ok(self
            .document
            .path()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| self.config.resource_type.to_string()))
    }

    async fn contains(&self, key: &StoreKey) -> StoreResult<bool> {
        let target = match self.resolve(key) {
            Ok(target) => target,
            Err(err) if err.is_invalid_key() => return Ok(false),
            Err(err) => return Err(err),
        };
        if self.is_top_level(&target) {
            return Ok(true);
        }
        let document = self.document.to_value().await?;
        Ok(lookup(&document, &target).is_some())
    }

    async fn list(&self, prefix: &StoreKey) -> StoreResult<Vec<StoreKey>> {
        let resource = self.config.resource_type;
        let keys: Vec<StoreKey> = if resource == ProjectVariable::AllVariables {
            ProjectVariable::variables()
                .map(|variable| StoreKey::from([variable.as_str()]))
                .collect()
        } else if resource.is_map() {
            let document = self.document.to_value().await?;
            match document.get(resource.as_str()) {
                Some(Value::Object(entries)) => entries.keys().map(|name| StoreKey::from([name.as_str()])).collect(),
                _ => Vec::new(),
            }
        } else {
            Vec::new()
        };
        Ok(keys.into_iter().filter(|key| key.starts_with(prefix)).collect())
    }

    async fn delete(&self, key: &StoreKey) -> StoreResult<bool> {
        let target = self.resolve(key)?;
        let Target::Entry(variable, name) = target else {
            return Err(StoreError::store_backend(format!(
                "{} does not support the deletion of top level keys; please use update to modify {}",
                CLASS_NAME, key
            )));
        };
        let missing = || StoreError::store_backend(format!("Could not find a value associated with key `{}`", key));
        self.document
            .mutate(move |document| {
                let removed = document
                    .get_mut(variable.as_str())
                    .and_then(Value::as_object_mut)
                    .and_then(|entries| entries.remove(&name));
                removed.map(|_| ()).ok_or_else(missing)
            })
            .await?;
        Ok(true)
    }

    async fn rename(&self, source: &StoreKey, dest: &StoreKey) -> StoreResult<()> {
        Err(StoreError::store_backend(format!(
            "{} does not support moving of keys; attempted to move {} to {}",
            CLASS_NAME, source, dest
        )))
    }

    async fn move_key(&self, source: &StoreKey, dest: &StoreKey) -> StoreResult<()> {
        self.rename(source, dest).await
    }

    async fn store_backend_id(&self) -> String {
        let config = self.document.snapshot().await;
        match config.data_context_id() {
            Some(id) => id.to_string(),
            None => self.identity.resolve(self).await,
        }
    }
}
