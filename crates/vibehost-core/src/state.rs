//! Server-side port state
//!
//! Persists the app -> host port mapping to `~/.local/share/vibehost/state.json`.
//! The store is a read-through cache over the container engine: it is
//! authoritative for apps it already knows, and the engine is only consulted
//! to discover apps it does not.

use crate::{AppName, CoreError, Result, APP_PORT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vibehost_config::ClientConfig;
use vibehost_provider::ContainerEngine;

/// First host port handed out to a new app
pub const BASE_PORT: u16 = 8080;

/// Write content to a file atomically using a temp-file-then-rename pattern.
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(content)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut lock = path.as_os_str().to_owned();
    lock.push(".lock");
    PathBuf::from(lock)
}

/// Exclusive single-writer lock over a state file.
///
/// An advisory `flock` on a sibling `*.lock` file. The kernel releases it when
/// the holding process exits, however it exits. The file itself is left in
/// place and only records the holder's PID.
pub struct StateLock {
    #[cfg(unix)]
    _lock: nix::fcntl::Flock<std::fs::File>,
    #[cfg(not(unix))]
    _file: std::fs::File,
}

impl StateLock {
    const ATTEMPTS: u32 = 200;
    const RETRY_DELAY: Duration = Duration::from_millis(50);

    /// Take the lock, waiting while another invocation holds it
    pub async fn acquire(path: &Path) -> std::io::Result<Self> {
        for _ in 0..Self::ATTEMPTS {
            if let Some(lock) = Self::try_acquire(path)? {
                return Ok(lock);
            }
            tokio::time::sleep(Self::RETRY_DELAY).await;
        }
        Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("timed out waiting for lock {}", lock_path_for(path).display()),
        ))
    }

    /// Take the lock if no live process holds it
    pub fn try_acquire(path: &Path) -> std::io::Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path_for(path))?;
        Self::lock_file(file)
    }

    #[cfg(unix)]
    fn lock_file(file: std::fs::File) -> std::io::Result<Option<Self>> {
        use nix::errno::Errno;
        use nix::fcntl::{Flock, FlockArg};

        let lock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => lock,
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => return Ok(None),
            Err((_, errno)) => return Err(errno.into()),
        };
        lock.set_len(0)?;
        (&*lock).write_all(std::process::id().to_string().as_bytes())?;
        Ok(Some(Self { _lock: lock }))
    }

    #[cfg(not(unix))]
    fn lock_file(file: std::fs::File) -> std::io::Result<Option<Self>> {
        Ok(Some(Self { _file: file }))
    }
}

/// On-disk shape of the state file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerState {
    #[serde(default)]
    pub ports: BTreeMap<String, u16>,
}

/// In-memory port state with dirty tracking
#[derive(Debug)]
pub struct PortStateStore {
    path: PathBuf,
    state: ServerState,
    dirty: bool,
}

impl PortStateStore {
    /// Get the default state file path
    pub fn state_path() -> Result<PathBuf> {
        Ok(ClientConfig::data_dir()?.join("state.json"))
    }

    /// Load state from a specific path; a missing file is an empty store
    pub fn load_from(path: &Path) -> Result<Self> {
        let state = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content).map_err(|e| CoreError::StateCorrupted {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
        } else {
            tracing::debug!("State file not found at {:?}, starting empty", path);
            ServerState::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            state,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ports(&self) -> &BTreeMap<String, u16> {
        &self.state.ports
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn port_for_app(&self, app: &AppName) -> Option<u16> {
        self.state.ports.get(app.as_str()).copied()
    }

    pub fn set_port(&mut self, app: &AppName, port: u16) {
        let previous = self.state.ports.insert(app.to_string(), port);
        if previous != Some(port) {
            self.dirty = true;
        }
    }

    /// Allocate the first port at or above [`BASE_PORT`] that no app holds
    pub fn assign_port(&mut self, app: &AppName) -> Result<u16> {
        let used: std::collections::BTreeSet<u16> = self.state.ports.values().copied().collect();
        let port = (BASE_PORT..=u16::MAX)
            .find(|p| !used.contains(p))
            .ok_or_else(|| CoreError::Port("no free host port left to assign".to_string()))?;
        tracing::info!("Assigned port {} to app {}", port, app);
        self.state.ports.insert(app.to_string(), port);
        self.dirty = true;
        Ok(port)
    }

    /// Drop an app's port entry
    pub fn remove(&mut self, app: &AppName) -> Option<u16> {
        let removed = self.state.ports.remove(app.as_str());
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Adopt published ports of live app containers the store has no entry for.
    ///
    /// Read-only towards the engine and only ever adds entries. Returns the
    /// number of adopted apps.
    pub async fn sync_from_live_containers(&mut self, engine: &dyn ContainerEngine) -> Result<usize> {
        let names = engine.list_names().await?;
        let mut adopted = 0;

        for name in names {
            let Some(app) = AppName::from_container_name(&name) else {
                continue;
            };
            if self.port_for_app(&app).is_some() {
                continue;
            }
            match engine.published_port(&name, APP_PORT).await {
                Ok(Some(port)) => {
                    tracing::info!("Recovered port {} for app {} from container", port, app);
                    self.set_port(&app, port);
                    adopted += 1;
                }
                Ok(None) => {
                    tracing::debug!("Container {} has no published port for {}", name, APP_PORT);
                }
                Err(e) => {
                    tracing::debug!("Skipping port discovery for {}: {}", name, e);
                }
            }
        }

        Ok(adopted)
    }

    /// Write the state back if anything changed. Returns whether a write happened.
    pub fn save(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.state)?;
        atomic_write(&self.path, content.as_bytes())?;
        self.dirty = false;
        Ok(true)
    }
}
