//! Configuration Store
//!
//! Loads the TOML configuration file, deep-merges the JSON secrets file over
//! it and validates the merged tree against [`Settings`]. Values are
//! addressed with dotted paths such as `aws.access_key_id`.

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml::{Table, Value};
use tracing::{debug, info, warn};

use crate::config::settings::Settings;

/// Secrets file looked up next to the config file when none is given
pub const SECRETS_FILE_NAME: &str = "secret.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to parse secrets file {path}: {source}")]
    Secrets {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Accessor interface over the merged configuration tree
pub trait ConfigAccess {
    /// Value at a dotted path
    fn get(&self, key: &str) -> Option<&Value>;

    /// Typed value at a dotted path, or `default` when absent or of the wrong type
    fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|value| value.clone().try_into().ok())
            .unwrap_or(default)
    }

    /// Set a value in memory. The file on disk is left untouched.
    fn set(&mut self, key: &str, value: Value) -> Result<(), ConfigError>;

    /// Re-read the configuration and secrets files
    fn reload(&mut self) -> Result<(), ConfigError>;
}

/// Merged configuration tree plus its typed view
#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: Option<PathBuf>,
    secret_path: Option<PathBuf>,
    tree: Table,
    settings: Settings,
}

impl ConfigStore {
    /// Load a TOML config file and merge the optional JSON secrets file over it
    pub fn load(
        config_path: impl AsRef<Path>,
        secret_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let config_path = config_path.as_ref().to_path_buf();
        let base = read_toml(&config_path)?;
        let mut store = Self::build(base, secret_path.map(Path::to_path_buf))?;
        info!(path = %config_path.display(), "Configuration loaded");
        store.config_path = Some(config_path);
        Ok(store)
    }

    /// Build a store from an in-memory table
    pub fn from_table(base: Table, secret_path: Option<&Path>) -> Result<Self, ConfigError> {
        let store = Self::build(base, secret_path.map(Path::to_path_buf))?;
        debug!("Configuration loaded from memory");
        Ok(store)
    }

    fn build(mut tree: Table, secret_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        merge_secrets(&mut tree, secret_path.as_deref())?;
        let settings = validate(&tree)?;
        Ok(Self {
            config_path: None,
            secret_path,
            tree,
            settings,
        })
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn secret_path(&self) -> Option<&Path> {
        self.secret_path.as_deref()
    }

    /// Typed view of the merged tree
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// `secret.json` next to the config file, if it exists
    pub fn sibling_secrets(config_path: &Path) -> Option<PathBuf> {
        let dir = config_path.parent().unwrap_or_else(|| Path::new("."));
        let candidate = dir.join(SECRETS_FILE_NAME);
        candidate.is_file().then_some(candidate)
    }
}

impl ConfigAccess for ConfigStore {
    fn get(&self, key: &str) -> Option<&Value> {
        let mut parts = key.split('.');
        let mut current = self.tree.get(parts.next()?)?;
        for part in parts {
            current = current.as_table()?.get(part)?;
        }
        Some(current)
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), ConfigError> {
        let parts: Vec<&str> = key.split('.').collect();
        let (last, parents) = match parts.split_last() {
            Some(split) if parts.iter().all(|p| !p.is_empty()) => split,
            _ => return Err(ConfigError::Configuration(format!("invalid key `{}`", key))),
        };

        let mut tree = self.tree.clone();
        let mut table = &mut tree;
        for part in parents {
            let entry = table
                .entry(part.to_string())
                .or_insert(Value::Table(Table::new()));
            table = entry.as_table_mut().ok_or_else(|| {
                ConfigError::Configuration(format!("`{}` in `{}` is not a table", part, key))
            })?;
        }
        table.insert(last.to_string(), value);

        self.settings = validate(&tree)?;
        self.tree = tree;
        debug!(key = %key, "Configuration value set");
        Ok(())
    }

    fn reload(&mut self) -> Result<(), ConfigError> {
        let Some(config_path) = self.config_path.clone() else {
            warn!("Reload skipped: configuration was built in memory");
            return Ok(());
        };
        let base = read_toml(&config_path)?;
        let mut reloaded = Self::build(base, self.secret_path.clone())?;
        reloaded.config_path = Some(config_path);
        *self = reloaded;
        info!("Configuration reloaded");
        Ok(())
    }
}

fn read_toml(path: &Path) -> Result<Table, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn merge_secrets(tree: &mut Table, secret_path: Option<&Path>) -> Result<(), ConfigError> {
    let secret_path = secret_path.filter(|p| p.exists());

    let Some(secret_path) = secret_path else {
        if endpoint_configured(tree) && !uses_instance_profile(tree) {
            return Err(ConfigError::Configuration(
                "search endpoint configured but the secrets file is missing".to_string(),
            ));
        }
        warn!("Secrets file not found; search credentials will not be loaded");
        return Ok(());
    };

    let content = std::fs::read_to_string(secret_path).map_err(|source| ConfigError::Io {
        path: secret_path.to_path_buf(),
        source,
    })?;
    let secrets: serde_json::Value =
        serde_json::from_str(&content).map_err(|source| ConfigError::Secrets {
            path: secret_path.to_path_buf(),
            source,
        })?;

    match json_to_toml(secrets) {
        Some(Value::Table(overrides)) => merge_tables(tree, overrides),
        _ => {
            return Err(ConfigError::Configuration(format!(
                "secrets file {} must contain a JSON object",
                secret_path.display()
            )))
        }
    }
    info!(path = %secret_path.display(), "Secrets merged");

    if endpoint_configured(tree) && !uses_instance_profile(tree) {
        let has = |key: &str| {
            lookup(tree, &["aws", key])
                .and_then(Value::as_str)
                .map_or(false, |v| !v.is_empty())
        };
        if !has("access_key_id") || !has("secret_access_key") {
            return Err(ConfigError::Configuration(
                "search endpoint configured but aws.access_key_id/aws.secret_access_key \
                 are missing from the secrets file"
                    .to_string(),
            ));
        }
    }

    Ok(())
}

/// Recursively merge `overrides` into `base`; override values win
fn merge_tables(base: &mut Table, overrides: Table) {
    for (key, value) in overrides {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                merge_tables(existing, incoming)
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// JSON nulls have no TOML counterpart and are dropped
fn json_to_toml(value: serde_json::Value) -> Option<Value> {
    use serde_json::Value as Json;
    match value {
        Json::Null => None,
        Json::Bool(b) => Some(Value::Boolean(b)),
        Json::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Float)),
        Json::String(s) => Some(Value::String(s)),
        Json::Array(items) => Some(Value::Array(
            items.into_iter().filter_map(json_to_toml).collect(),
        )),
        Json::Object(map) => Some(Value::Table(
            map.into_iter()
                .filter_map(|(k, v)| json_to_toml(v).map(|v| (k, v)))
                .collect(),
        )),
    }
}

fn lookup<'a>(tree: &'a Table, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = tree.get(*first)?;
    for part in rest {
        current = current.as_table()?.get(*part)?;
    }
    Some(current)
}

fn endpoint_configured(tree: &Table) -> bool {
    [
        &["aws", "opensearch_endpoint"][..],
        &["aws", "opensearch", "endpoint"][..],
    ]
    .iter()
    .any(|path| {
        lookup(tree, path)
            .and_then(Value::as_str)
            .map_or(false, |v| !v.trim().is_empty())
    })
}

fn uses_instance_profile(tree: &Table) -> bool {
    lookup(tree, &["aws", "credentials", "use_instance_profile"])
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn validate(tree: &Table) -> Result<Settings, ConfigError> {
    let settings: Settings = Value::Table(tree.clone())
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Configuration(e.to_string()))?;
    settings
        .resources
        .thresholds()
        .map_err(|e| ConfigError::Configuration(e.to_string()))?;
    settings
        .logging
        .level
        .parse::<tracing::Level>()
        .map_err(|_| {
            ConfigError::Configuration(format!(
                "logging.level `{}` is not one of trace, debug, info, warn, error",
                settings.logging.level
            ))
        })?;
    Ok(settings)
}
