//! App container lifecycle: absent -> running <-> stopped, and back to absent

use crate::{AppName, CoreError, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use vibehost_config::{SessionEnv, ENV_XDG_OPEN_SOCKET};
use vibehost_provider::{ContainerEngine, ExecConfig, MountConfig, PortBinding, RunConfig};

/// Port the app listens on inside its container
pub const APP_PORT: u16 = 8080;

/// Base image for new app containers unless `VIBEHOST_IMAGE` overrides it
pub const DEFAULT_IMAGE: &str = "vibehost:latest";

const SOCKET_WAIT_ATTEMPTS: u32 = 10;
const SOCKET_WAIT_DELAY: Duration = Duration::from_millis(100);

/// Build the creation request for an app container.
///
/// The container runs systemd as PID 1 and may run its own docker, hence the
/// privileged flag, host cgroup namespace, tmpfs `/run` and the socket mounts.
pub fn run_config(
    name: &str,
    app: &AppName,
    port: u16,
    image: &str,
    relay_socket: Option<&str>,
) -> RunConfig {
    let mut env = BTreeMap::from([
        ("VIBEHOST_APP".to_string(), app.to_string()),
        ("VIBEHOST_CONTAINER".to_string(), name.to_string()),
        ("VIBEHOST_APP_PORT".to_string(), APP_PORT.to_string()),
        ("VIBEHOST_HOST_PORT".to_string(), port.to_string()),
        ("VIBEHOST_PORT".to_string(), port.to_string()),
    ]);

    let mut mounts = vec![
        MountConfig::tmpfs("/run"),
        MountConfig::tmpfs("/run/lock"),
        MountConfig::bind("/sys/fs/cgroup", "/sys/fs/cgroup"),
        MountConfig::bind("/var/run/docker.sock", "/var/run/docker.sock"),
    ];

    if let Some(socket) = relay_socket {
        mounts.push(MountConfig::bind(socket, socket));
        env.insert(ENV_XDG_OPEN_SOCKET.to_string(), socket.to_string());
    }

    RunConfig {
        name: name.to_string(),
        image: image.to_string(),
        ports: vec![PortBinding {
            host_port: port,
            container_port: APP_PORT,
        }],
        mounts,
        env,
        privileged: true,
        cgroupns_host: true,
        cmd: vec!["/sbin/init".to_string()],
    }
}

#[cfg(unix)]
fn is_socket(path: &Path) -> bool {
    use std::os::unix::fs::FileTypeExt;
    std::fs::metadata(path)
        .map(|m| m.file_type().is_socket())
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_socket(_path: &Path) -> bool {
    false
}

/// Poll until `path` is a Unix socket. Returns false once attempts run out.
pub async fn wait_for_socket(path: &Path, attempts: u32, delay: Duration) -> bool {
    for attempt in 0..attempts {
        if is_socket(path) {
            return true;
        }
        if attempt + 1 < attempts {
            tokio::time::sleep(delay).await;
        }
    }
    false
}

/// The relay socket forwarded by the client, once it is actually listening
pub async fn ready_relay_socket(env: &SessionEnv) -> Option<String> {
    let socket = env.xdg_open_socket.as_deref()?;
    if wait_for_socket(Path::new(socket), SOCKET_WAIT_ATTEMPTS, SOCKET_WAIT_DELAY).await {
        Some(socket.to_string())
    } else {
        tracing::warn!(
            "open relay socket {} is not ready; browser opens from the app are disabled",
            socket
        );
        None
    }
}

/// Drives one app container through the engine
pub struct ContainerLifecycle<'a> {
    engine: &'a dyn ContainerEngine,
    image: String,
    relay_socket: Option<String>,
}

impl<'a> ContainerLifecycle<'a> {
    pub fn new(engine: &'a dyn ContainerEngine, image: impl Into<String>) -> Self {
        Self {
            engine,
            image: image.into(),
            relay_socket: None,
        }
    }

    /// Mount and advertise this relay socket in containers created from now on
    pub fn with_relay_socket(mut self, socket: Option<String>) -> Self {
        self.relay_socket = socket;
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.engine.exists(name).await?)
    }

    pub async fn is_running(&self, name: &str) -> Result<bool> {
        Ok(self.engine.is_running(name).await?)
    }

    /// Create and start the container from the base image
    pub async fn create(&self, name: &str, app: &AppName, port: u16) -> Result<()> {
        self.create_from_image(name, app, port, &self.image).await
    }

    /// Create and start the container from an arbitrary image
    pub async fn create_from_image(
        &self,
        name: &str,
        app: &AppName,
        port: u16,
        image: &str,
    ) -> Result<()> {
        let config = run_config(name, app, port, image, self.relay_socket.as_deref());
        tracing::info!("Creating container {} from {} on port {}", name, image, port);
        self.engine.run(&config).await?;
        Ok(())
    }

    pub async fn start(&self, name: &str) -> Result<()> {
        tracing::info!("Starting container {}", name);
        Ok(self.engine.start(name).await?)
    }

    /// Bring the container to running, creating it if absent.
    ///
    /// `confirm_create` is only consulted when the container does not exist;
    /// a refusal yields [`CoreError::Aborted`]. Returns whether the container
    /// was created.
    pub async fn ensure_running<F>(
        &self,
        name: &str,
        app: &AppName,
        port: u16,
        exists: bool,
        confirm_create: F,
    ) -> Result<bool>
    where
        F: FnOnce(&AppName) -> bool,
    {
        if !exists {
            if !confirm_create(app) {
                return Err(CoreError::Aborted);
            }
            self.create(name, app, port).await?;
            return Ok(true);
        }

        if !self.is_running(name).await? {
            self.start(name).await?;
        }
        Ok(false)
    }

    /// Run `command` inside the container attached to our stdio.
    /// The command's exit code is returned as-is.
    pub async fn exec_into(
        &self,
        name: &str,
        command: Vec<String>,
        tty: bool,
        env: BTreeMap<String, String>,
    ) -> Result<i32> {
        let config = ExecConfig {
            cmd: command,
            env,
            tty,
            stdin: true,
        };
        Ok(self.engine.exec_interactive(name, &config).await?)
    }

    /// Force-remove the container. Returns false when it was already gone;
    /// any other engine failure is an error.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        match self.engine.remove(name).await {
            Ok(()) => {
                tracing::info!("Removed container {}", name);
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!("Container {} already gone: {}", name, e);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
