//! Common types for container engines

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Engine type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    Docker,
    Podman,
}

impl std::fmt::Display for EngineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Docker => write!(f, "docker"),
            Self::Podman => write!(f, "podman"),
        }
    }
}

impl std::str::FromStr for EngineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            _ => Err(format!("Unknown engine type: {}", s)),
        }
    }
}

/// Engine information
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub engine_type: EngineType,
    /// Binary invoked for every engine operation
    pub program: String,
}

/// Publish a container port on the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    pub host_port: u16,
    pub container_port: u16,
}

/// Mount type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountType {
    Bind,
    Tmpfs,
}

/// A mount attached at container creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    pub mount_type: MountType,
    /// Host path (ignored for tmpfs)
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

impl MountConfig {
    pub fn bind(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            mount_type: MountType::Bind,
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }

    pub fn tmpfs(target: impl Into<String>) -> Self {
        Self {
            mount_type: MountType::Tmpfs,
            source: String::new(),
            target: target.into(),
            read_only: false,
        }
    }
}

/// Everything needed to create and start a detached container in one step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub name: String,
    pub image: String,
    pub ports: Vec<PortBinding>,
    pub mounts: Vec<MountConfig>,
    pub env: BTreeMap<String, String>,
    pub privileged: bool,
    /// Share the host cgroup namespace (needed for systemd as PID 1)
    pub cgroupns_host: bool,
    pub cmd: Vec<String>,
}

/// Configuration for running a command inside a container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecConfig {
    pub cmd: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub tty: bool,
    pub stdin: bool,
}
