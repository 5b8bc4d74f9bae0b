//! CLI Configuration
//!
//! Operator preferences stored in ~/.ids/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_AGENT_URL: &str = "http://localhost:8080";

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    /// Status API of the agent queried by `ids status`
    pub agent_url: Option<String>,
}

impl Config {
    /// Get the config file path (~/.ids/config.toml)
    pub fn path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".ids").join("config.toml"))
    }

    /// Load config from disk
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config at {}", path.display()))?;
        Ok(config)
    }

    /// Agent base URL without a trailing slash
    pub fn agent_url(&self) -> &str {
        self.agent_url
            .as_deref()
            .unwrap_or(DEFAULT_AGENT_URL)
            .trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_default_url() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.agent_url(), "http://localhost:8080");
    }

    #[test]
    fn test_agent_url_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "agent_url = \"http://10.0.0.7:8080/\"\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.agent_url(), "http://10.0.0.7:8080");
    }
}
