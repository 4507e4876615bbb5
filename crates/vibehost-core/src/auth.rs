//! Agent credential bundle
//!
//! The client packs the agent's local credential files into one base64 token
//! (`VIBEHOST_AUTH_BUNDLE`); the server unpacks it into a freshly created
//! container so the agent starts logged in.

use crate::{AgentProvider, CoreError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use vibehost_provider::ContainerEngine;

/// Home directory of the agent user inside app containers
pub const CONTAINER_HOME: &str = "/root";

/// Credential files per agent, relative to the home directory
pub fn credential_paths(agent: AgentProvider) -> &'static [&'static str] {
    match agent {
        AgentProvider::Codex => &[".codex/auth.json"],
        AgentProvider::Claude => &[".claude/.credentials.json", ".claude.json"],
        AgentProvider::Gemini => &[".gemini/oauth_creds.json", ".gemini/settings.json"],
    }
}

/// One credential file; `path` is absolute inside the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthFile {
    pub path: String,
    /// base64 of the raw file content
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthBundle {
    pub agent: String,
    pub files: Vec<AuthFile>,
}

impl AuthBundle {
    /// Collect the agent's credential files under `home`; `None` when there are none
    pub fn discover(agent: AgentProvider, home: &Path) -> Result<Option<Self>> {
        let mut files = Vec::new();
        for rel in credential_paths(agent) {
            let local = home.join(rel);
            if !local.is_file() {
                continue;
            }
            let content = std::fs::read(&local)?;
            tracing::debug!("Found {} credentials at {:?}", agent, local);
            files.push(AuthFile {
                path: format!("{}/{}", CONTAINER_HOME, rel),
                content: STANDARD.encode(content),
            });
        }

        if files.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self {
            agent: agent.to_string(),
            files,
        }))
    }

    /// Discover under the current user's home directory
    pub fn discover_local(agent: AgentProvider) -> Result<Option<Self>> {
        let dirs = directories::BaseDirs::new()
            .ok_or_else(|| CoreError::Usage("cannot determine home directory".to_string()))?;
        Self::discover(agent, dirs.home_dir())
    }

    /// Container paths, for telling the user what will be copied
    pub fn describe(&self) -> String {
        self.files
            .iter()
            .map(|f| f.path.replacen(CONTAINER_HOME, "~", 1))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn encode(&self) -> Result<String> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }

    pub fn decode(token: &str) -> Result<Self> {
        let raw = STANDARD
            .decode(token.trim())
            .map_err(|e| CoreError::Usage(format!("invalid auth bundle encoding: {}", e)))?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// Map a container path to a relative path under [`CONTAINER_HOME`]
fn home_relative(path: &str) -> Option<PathBuf> {
    let rel = Path::new(path).strip_prefix(CONTAINER_HOME).ok()?;
    let clean = rel
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    (clean && rel.components().next().is_some()).then(|| rel.to_path_buf())
}

/// Copy the bundle's files into the container. Returns how many were copied.
///
/// Files are staged in a temp tree mirroring the home directory and copied in
/// one go, so missing parent directories are created by the engine.
pub async fn apply_auth_bundle(
    engine: &dyn ContainerEngine,
    name: &str,
    bundle: &AuthBundle,
) -> Result<usize> {
    let staging = tempfile::tempdir()?;
    let mut staged = 0;

    for file in &bundle.files {
        let Some(rel) = home_relative(&file.path) else {
            tracing::warn!("skipping credential file outside {}: {}", CONTAINER_HOME, file.path);
            continue;
        };
        let content = match STANDARD.decode(&file.content) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("skipping undecodable credential file {}: {}", file.path, e);
                continue;
            }
        };
        let target = staging.path().join(&rel);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, content)?;
        staged += 1;
    }

    if staged == 0 {
        return Ok(0);
    }

    engine
        .copy_into(name, &staging.path().join("."), CONTAINER_HOME)
        .await?;
    tracing::info!("Copied {} {} credential file(s) into {}", staged, bundle.agent, name);
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockCall, MockEngine};

    fn write(home: &Path, rel: &str, content: &str) {
        let path = home.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_discover_nothing() {
        let home = tempfile::tempdir().unwrap();
        assert!(AuthBundle::discover(AgentProvider::Codex, home.path())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_discover_claude_files() {
        let home = tempfile::tempdir().unwrap();
        write(home.path(), ".claude/.credentials.json", "{\"token\":1}");
        write(home.path(), ".claude.json", "{}");
        write(home.path(), ".codex/auth.json", "ignored");

        let bundle = AuthBundle::discover(AgentProvider::Claude, home.path())
            .unwrap()
            .unwrap();
        assert_eq!(bundle.agent, "claude");
        let paths: Vec<&str> = bundle.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/root/.claude/.credentials.json", "/root/.claude.json"]);
        assert_eq!(bundle.describe(), "~/.claude/.credentials.json, ~/.claude.json");
    }

    #[test]
    fn test_encode_decode() {
        let home = tempfile::tempdir().unwrap();
        write(home.path(), ".codex/auth.json", "{\"key\":\"secret\"}");
        let bundle = AuthBundle::discover(AgentProvider::Codex, home.path())
            .unwrap()
            .unwrap();

        let token = bundle.encode().unwrap();
        assert!(!token.contains(' '));
        assert_eq!(AuthBundle::decode(&token).unwrap(), bundle);
        assert!(AuthBundle::decode("%%%").is_err());
    }

    #[test]
    fn test_home_relative_rejects_escapes() {
        assert_eq!(
            home_relative("/root/.codex/auth.json"),
            Some(PathBuf::from(".codex/auth.json"))
        );
        assert_eq!(home_relative("/root/../etc/passwd"), None);
        assert_eq!(home_relative("/etc/passwd"), None);
        assert_eq!(home_relative("/root"), None);
    }

    #[tokio::test]
    async fn test_apply_copies_decoded_files() {
        let engine = MockEngine::new();
        engine.add_container("vibehost-demo", true, Some(8080));
        let bundle = AuthBundle {
            agent: "codex".to_string(),
            files: vec![
                AuthFile {
                    path: "/root/.codex/auth.json".to_string(),
                    content: STANDARD.encode("{\"key\":1}"),
                },
                AuthFile {
                    path: "/etc/shadow".to_string(),
                    content: STANDARD.encode("nope"),
                },
            ],
        };

        let copied = apply_auth_bundle(&engine, "vibehost-demo", &bundle).await.unwrap();

        assert_eq!(copied, 1);
        assert!(engine.was_called(&MockCall::CopyInto {
            name: "vibehost-demo".to_string(),
            dest: "/root".to_string(),
        }));
        let files = engine.copied_files.lock().unwrap().clone();
        assert_eq!(files.len(), 1);
        assert!(files[0].0.ends_with("auth.json"));
        assert!(files[0].0.contains(".codex"));
        assert_eq!(files[0].1, b"{\"key\":1}".to_vec());
    }

    #[tokio::test]
    async fn test_apply_with_nothing_valid_skips_copy() {
        let engine = MockEngine::new();
        let bundle = AuthBundle {
            agent: "codex".to_string(),
            files: vec![AuthFile {
                path: "/root/.codex/auth.json".to_string(),
                content: "***".to_string(),
            }],
        };

        assert_eq!(apply_auth_bundle(&engine, "vibehost-demo", &bundle).await.unwrap(), 0);
        assert!(engine.get_calls().is_empty());
    }
}
