//! Server-side handling of one `vibehost-server` invocation
//!
//! Stdout is the reply channel for probes, so everything written to `out` is
//! protocol text. Diagnostics go through `tracing` (stderr).

use crate::auth::{apply_auth_bundle, AuthBundle};
use crate::lifecycle::ready_relay_socket;
use crate::protocol::{encode_bool_reply, tmux_session_args, AGENT_SESSION, SHELL_SESSION};
use crate::state::{PortStateStore, StateLock};
use crate::transport::normalize_term;
use crate::{
    AgentProvider, AppName, ContainerLifecycle, CoreError, RemoteAction, Result, SnapshotManager,
    APP_PORT, DEFAULT_IMAGE,
};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use vibehost_config::{SessionEnv, ENV_AGENT_CHECK};
use vibehost_provider::ContainerEngine;

/// A parsed server invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    pub app: AppName,
    pub agent: AgentProvider,
    pub action: RemoteAction,
}

/// Host port resolved for this invocation
#[derive(Debug, Clone, Copy)]
struct PortLease {
    port: u16,
    /// Newly handed out by this invocation
    assigned: bool,
}

impl PortLease {
    fn kept(port: u16) -> Self {
        Self {
            port,
            assigned: false,
        }
    }
}

fn required_lease(lease: Option<PortLease>, app: &AppName) -> Result<PortLease> {
    lease.ok_or_else(|| CoreError::Port(format!("no host port resolved for {}", app)))
}

pub struct Server<'a> {
    engine: &'a dyn ContainerEngine,
    env: SessionEnv,
    state_path: PathBuf,
    /// Whether our stdin/stdout are a terminal
    tty: bool,
}

impl<'a> Server<'a> {
    pub fn new(engine: &'a dyn ContainerEngine, env: SessionEnv, state_path: PathBuf, tty: bool) -> Self {
        Self {
            engine,
            env,
            state_path,
            tty,
        }
    }

    fn image(&self) -> &str {
        self.env.image.as_deref().unwrap_or(DEFAULT_IMAGE)
    }

    /// Execute the action. Returns the process exit code.
    ///
    /// The state lock covers only load, reconcile, port resolution and save.
    /// Prompts and engine work that can take long run without it.
    /// `confirm_create` is asked before creating a missing container unless
    /// the client already confirmed (`VIBEHOST_AUTO_CREATE=1`).
    pub async fn run<W, F>(&self, opts: &ServerOptions, out: &mut W, confirm_create: F) -> Result<i32>
    where
        W: Write,
        F: FnOnce(&AppName) -> bool,
    {
        let app = &opts.app;
        let name = app.container_name();
        let lifecycle = ContainerLifecycle::new(self.engine, self.image());
        let snapshots = SnapshotManager::new(self.engine);

        let (exists, lease) = {
            let _lock = StateLock::acquire(&self.state_path).await?;
            let mut store = PortStateStore::load_from(&self.state_path)?;
            let adopted = store.sync_from_live_containers(self.engine).await?;
            if adopted > 0 {
                tracing::debug!("Recovered {} port mapping(s) from live containers", adopted);
            }

            let exists = lifecycle.exists(&name).await?;
            let lease = match &opts.action {
                RemoteAction::Exists
                | RemoteAction::Snapshot
                | RemoteAction::Snapshots
                | RemoteAction::Delete => None,
                _ => Some(self.resolve_port(&mut store, app, &name, exists).await?),
            };

            match store.save() {
                Ok(_) => {}
                Err(e) if opts.action.is_interactive() => {
                    tracing::error!("failed to save server state: {}", e);
                }
                Err(e) => return Err(e),
            }
            (exists, lease)
        };

        match &opts.action {
            RemoteAction::Exists => {
                writeln!(out, "{}", encode_bool_reply(exists))?;
                Ok(0)
            }
            RemoteAction::Snapshot => {
                if !exists {
                    return Err(CoreError::Snapshot(
                        "cannot snapshot: app container does not exist".to_string(),
                    ));
                }
                let reference = snapshots.create(&name, app).await?;
                writeln!(out, "Snapshot created: {}", reference)?;
                Ok(0)
            }
            RemoteAction::Snapshots => {
                let tags = snapshots.list(app).await?;
                if tags.is_empty() {
                    writeln!(out, "No snapshots found for {}", app)?;
                } else {
                    writeln!(out, "Snapshots for {}:", app)?;
                    for tag in tags {
                        writeln!(out, "  {} {}", app, tag)?;
                    }
                }
                Ok(0)
            }
            RemoteAction::Delete => {
                if exists {
                    lifecycle.delete(&name).await?;
                }
                let removed = snapshots.delete_all(app).await?;
                tracing::debug!("Removed {} snapshot(s) of {}", removed, app);
                self.release_port(app, None).await?;
                writeln!(out, "Deleted app {}", app)?;
                Ok(0)
            }
            RemoteAction::Port => {
                let lease = required_lease(lease, app)?;
                writeln!(out, "{}", lease.port)?;
                Ok(0)
            }
            RemoteAction::Restore(requested) => {
                let lease = required_lease(lease, app)?;
                let reference = snapshots.resolve_ref(app, requested).await?;
                let lifecycle = lifecycle.with_relay_socket(ready_relay_socket(&self.env).await);
                snapshots
                    .restore(&lifecycle, &name, app, lease.port, &reference)
                    .await?;
                writeln!(out, "Restored app {} from {}", app, reference)?;
                Ok(0)
            }
            RemoteAction::Attach | RemoteAction::Shell => {
                let lease = required_lease(lease, app)?;
                let relay = if exists {
                    None
                } else {
                    ready_relay_socket(&self.env).await
                };
                let lifecycle = lifecycle.with_relay_socket(relay);
                let auto_create = self.env.auto_create;
                let ensured = lifecycle
                    .ensure_running(&name, app, lease.port, exists, |app| {
                        auto_create || confirm_create(app)
                    })
                    .await;
                let created = match ensured {
                    Ok(created) => created,
                    Err(e) => {
                        if lease.assigned {
                            if let Err(release) = self.release_port(app, Some(lease.port)).await {
                                tracing::warn!("failed to release port {}: {}", lease.port, release);
                            }
                        }
                        return Err(e);
                    }
                };
                if created {
                    self.apply_auth(&name).await;
                }

                let command = self.session_command(opts);
                lifecycle
                    .exec_into(&name, command, self.tty, self.exec_env())
                    .await
            }
        }
    }

    /// Stored port, else the live container's published port, else a new one
    async fn resolve_port(
        &self,
        store: &mut PortStateStore,
        app: &AppName,
        name: &str,
        exists: bool,
    ) -> Result<PortLease> {
        if let Some(port) = store.port_for_app(app) {
            return Ok(PortLease::kept(port));
        }
        if exists {
            return match self.engine.published_port(name, APP_PORT).await? {
                Some(port) => {
                    store.set_port(app, port);
                    Ok(PortLease::kept(port))
                }
                None => Err(CoreError::Port(format!(
                    "container {} exists but publishes no port for {}",
                    name, APP_PORT
                ))),
            };
        }
        Ok(PortLease {
            port: store.assign_port(app)?,
            assigned: true,
        })
    }

    /// Drop the app's stored port under the lock. With `only`, the entry is
    /// dropped only while it still holds that port.
    async fn release_port(&self, app: &AppName, only: Option<u16>) -> Result<()> {
        let _lock = StateLock::acquire(&self.state_path).await?;
        let mut store = PortStateStore::load_from(&self.state_path)?;
        if only.map_or(true, |port| store.port_for_app(app) == Some(port)) {
            store.remove(app);
        }
        store.save()?;
        Ok(())
    }

    async fn apply_auth(&self, name: &str) {
        let Some(token) = self.env.auth_bundle.as_deref() else {
            return;
        };
        let bundle = match AuthBundle::decode(token) {
            Ok(bundle) => bundle,
            Err(e) => {
                tracing::warn!("ignoring auth bundle: {}", e);
                return;
            }
        };
        if let Err(e) = apply_auth_bundle(self.engine, name, &bundle).await {
            tracing::warn!("failed to copy {} credentials: {}", bundle.agent, e);
        }
    }

    fn session_command(&self, opts: &ServerOptions) -> Vec<String> {
        let (session, program) = match opts.action {
            RemoteAction::Shell => (SHELL_SESSION, "/bin/bash"),
            _ => (AGENT_SESSION, opts.agent.command()),
        };
        // tmux needs a terminal
        if self.tty {
            tmux_session_args(session, program)
        } else {
            vec![program.to_string()]
        }
    }

    fn exec_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if self.tty {
            env.insert(
                "TERM".to_string(),
                normalize_term(self.env.term.as_deref().unwrap_or_default()),
            );
            if let Some(colorterm) = &self.env.colorterm {
                env.insert("COLORTERM".to_string(), colorterm.clone());
            }
        }
        if let Some(check) = &self.env.agent_check {
            env.insert(ENV_AGENT_CHECK.to_string(), check.clone());
        }
        env
    }
}
