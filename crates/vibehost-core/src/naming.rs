//! App identity and the names derived from it
//!
//! The container name is the only link between an app and the engine's
//! namespace, so the mapping must stay stable across releases.

use crate::{CoreError, Result};

/// Prefix shared by every app container
pub const CONTAINER_PREFIX: &str = "vibehost-";
/// Prefix of the per-app snapshot image repository
pub const SNAPSHOT_REPO_PREFIX: &str = "snapshot-";

/// A trimmed, non-empty app name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppName(String);

impl AppName {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidTarget("app name is required".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Engine container name for this app
    pub fn container_name(&self) -> String {
        format!("{}{}", CONTAINER_PREFIX, self.0)
    }

    /// Image repository holding this app's snapshots
    pub fn snapshot_repo(&self) -> String {
        format!("{}{}", SNAPSHOT_REPO_PREFIX, self.0)
    }

    /// Inverse of [`AppName::container_name`]
    pub fn from_container_name(name: &str) -> Option<Self> {
        name.strip_prefix(CONTAINER_PREFIX)
            .filter(|app| !app.trim().is_empty())
            .map(|app| Self(app.to_string()))
    }
}

impl std::fmt::Display for AppName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for AppName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
