//! Client configuration for vibehost
//!
//! Located at `~/.config/vibehost/config.json`

use crate::{ConfigError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Client-side vibehost configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Host used when a target has no `@host` part
    #[serde(skip_serializing_if = "String::is_empty")]
    pub default_host: String,
    /// Short alias -> ssh host (e.g. `prod` -> `root@10.0.0.4`)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub hosts: BTreeMap<String, String>,
    /// Agent provider run inside the container (empty means `codex`)
    #[serde(skip_serializing_if = "String::is_empty")]
    pub agent_provider: String,
}

impl ClientConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self =
            serde_json::from_str(&content).map_err(|e| ConfigError::JsonParseError {
                path: path.to_path_buf(),
                source: e,
            })?;

        tracing::debug!(
            "Loaded config from {:?}: default_host={:?}, {} host aliases",
            path,
            config.default_host,
            config.hosts.len()
        );

        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let mut content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        content.push('\n');

        std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "vibehost").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.json"))
    }

    /// Get the data directory path (holds server-side state)
    pub fn data_dir() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "vibehost").ok_or(ConfigError::NoDataDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Look up a host alias, falling back to the literal token
    pub fn resolve_alias<'a>(&'a self, host: &'a str) -> &'a str {
        self.hosts.get(host).map(String::as_str).unwrap_or(host)
    }

    /// Apply an `alias=host` mapping
    pub fn set_host_mapping(&mut self, entry: &str) -> Result<()> {
        let invalid = || {
            ConfigError::Invalid(format!(
                "invalid host mapping {:?} (expected alias=host)",
                entry
            ))
        };
        let (alias, host) = entry.split_once('=').ok_or_else(invalid)?;
        let alias = alias.trim();
        let host = host.trim();
        if alias.is_empty() || host.is_empty() {
            return Err(invalid());
        }
        self.hosts.insert(alias.to_string(), host.to_string());
        Ok(())
    }
}
