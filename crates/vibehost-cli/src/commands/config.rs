//! `vibehost config`: show or update the client configuration

use anyhow::{Context, Result};
use std::path::Path;
use vibehost_config::ClientConfig;
use vibehost_core::AgentProvider;

/// Requested changes; all empty means "show"
#[derive(Debug, Default, Clone)]
pub struct ConfigUpdate {
    pub default_host: Option<String>,
    pub agent: Option<String>,
    pub set_hosts: Vec<String>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.default_host.is_none() && self.agent.is_none() && self.set_hosts.is_empty()
    }

    /// Apply to `config`, validating every field first
    pub fn apply(&self, config: &mut ClientConfig) -> Result<()> {
        if let Some(agent) = &self.agent {
            let agent = AgentProvider::parse(agent)?;
            config.agent_provider = agent.to_string();
        }
        if let Some(host) = &self.default_host {
            config.default_host = host.trim().to_string();
        }
        for entry in &self.set_hosts {
            config.set_host_mapping(entry)?;
        }
        Ok(())
    }
}

pub fn config(update: ConfigUpdate) -> Result<()> {
    let path = ClientConfig::config_path()?;
    config_at(&path, update)
}

/// Show or update the config stored at `path`
pub fn config_at(path: &Path, update: ConfigUpdate) -> Result<()> {
    let mut config = ClientConfig::load_from(path)?;

    if update.is_empty() {
        let exists = path.exists();
        println!(
            "# Config file: {:?}{}\n",
            path,
            if exists { "" } else { " (not created yet)" }
        );
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    update.apply(&mut config)?;
    config
        .save_to(path)
        .with_context(|| format!("Failed to save config to {:?}", path))?;
    println!("Saved config to {:?}", path);
    Ok(())
}
