//! Container engine trait and implementations for vibehost
//!
//! The engine is never reimplemented: every operation is an invocation of the
//! engine's command line, with replies interpreted from exit status and text.

mod cli_engine;
mod error;
mod types;

pub use cli_engine::{parse_port_mapping, CliEngine};
pub use error::*;
pub use types::*;

use async_trait::async_trait;
use std::path::Path;

/// Trait for container engines (docker, podman)
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Whether a container with this name exists in any state.
    /// A "no such object" reply is `Ok(false)`, anything else is an error.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Whether the container is currently running
    async fn is_running(&self, name: &str) -> Result<bool>;

    /// Host port published for `container_port/tcp`, if any
    async fn published_port(&self, name: &str, container_port: u16) -> Result<Option<u16>>;

    /// Names of all containers, running or not
    async fn list_names(&self) -> Result<Vec<String>>;

    /// Create and start a detached container
    async fn run(&self, config: &RunConfig) -> Result<()>;

    /// Start an existing, stopped container
    async fn start(&self, name: &str) -> Result<()>;

    /// Force-remove a container. A missing container is `ProviderError::NotFound`.
    async fn remove(&self, name: &str) -> Result<()>;

    /// Commit the container's filesystem into an image reference
    async fn commit(&self, name: &str, reference: &str) -> Result<()>;

    /// Raw tag column for every image under `repo`
    async fn image_tags(&self, repo: &str) -> Result<Vec<String>>;

    /// Force-remove an image reference
    async fn remove_image(&self, reference: &str) -> Result<()>;

    /// Copy a host file into a container
    async fn copy_into(&self, name: &str, src: &Path, dest: &str) -> Result<()>;

    /// Run a command attached to the caller's stdio, returning its exit code
    async fn exec_interactive(&self, name: &str, config: &ExecConfig) -> Result<i32>;

    /// Get engine information
    fn info(&self) -> EngineInfo;
}

/// Create the default engine (docker), checking its binary is installed
pub fn create_default_engine() -> Result<Box<dyn ContainerEngine>> {
    let engine = CliEngine::new_docker()?;
    tracing::debug!("Using container engine: {}", engine.info().program);
    Ok(Box::new(engine))
}
