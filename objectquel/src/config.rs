use crate::error::{Error, Result};
use objectquel_query::QueryOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding [`Config::json_source_dir`].
pub const JSON_DIR_ENV: &str = "OBJECTQUEL_JSON_DIR";

/// Session configuration.
///
/// ```json
/// { "entity_namespaces": ["App\\Entity"], "json_source_dir": "data", "log_sql": true }
/// ```
///
/// Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Namespaces tried, in order, for short entity names.
    pub entity_namespaces: Vec<String>,
    /// Base directory for relative `JSON_SOURCE` paths.
    pub json_source_dir: Option<PathBuf>,
    /// Log compiled SQL at `info`.
    pub log_sql: bool,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::Config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn entity_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.entity_namespaces.push(namespace.into());
        self
    }

    pub fn json_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.json_source_dir = Some(dir.into());
        self
    }

    pub fn log_sql(mut self, enabled: bool) -> Self {
        self.log_sql = enabled;
        self
    }

    /// Applies `OBJECTQUEL_JSON_DIR` when set.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::with_env_overrides`] with a custom variable lookup.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(JSON_DIR_ENV).filter(|d| !d.trim().is_empty()) {
            self.json_source_dir = Some(PathBuf::from(dir));
        }
        self
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            entity_namespaces: self.entity_namespaces.clone(),
            json_source_dir: self.json_source_dir.clone(),
            log_sql: self.log_sql,
        }
    }
}
