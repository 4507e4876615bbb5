//! CLI-based container engine
//!
//! Every operation shells out to the engine binary (`docker` by default) and
//! interprets its exit status and plain-text output.

use crate::{
    ContainerEngine, EngineInfo, EngineType, ExecConfig, MountType, ProviderError, Result,
    RunConfig,
};
use async_trait::async_trait;
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::process::Command;

/// Container engine driven through its command line
pub struct CliEngine {
    /// Command to use ("docker" or "podman")
    cmd: String,
    engine_type: EngineType,
}

impl CliEngine {
    /// Create a docker engine, failing if `docker` is not on PATH
    pub fn new_docker() -> Result<Self> {
        Self::new(EngineType::Docker)
    }

    /// Create an engine for the given type, failing if its binary is not on PATH
    pub fn new(engine_type: EngineType) -> Result<Self> {
        let cmd = engine_type.to_string();
        which::which(&cmd).map_err(|_| ProviderError::BinaryNotFound(cmd.clone()))?;
        Ok(Self { cmd, engine_type })
    }

    /// Run a command and capture its raw output, whatever the exit status
    async fn run_raw(&self, args: &[&str]) -> Result<Output> {
        tracing::debug!("{} {}", self.cmd, args.join(" "));
        let output = Command::new(&self.cmd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        Ok(output)
    }

    /// Run a command and get stdout, mapping failure to a runtime error
    async fn run_cmd(&self, args: &[&str]) -> Result<String> {
        let output = self.run_raw(args).await?;
        if !output.status.success() {
            return Err(ProviderError::Runtime(failure_detail(&output)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Build the argument list for a detached `run`
    pub fn run_args(config: &RunConfig) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            config.name.clone(),
        ];

        for port in &config.ports {
            args.push("-p".to_string());
            args.push(format!("{}:{}", port.host_port, port.container_port));
        }

        if config.privileged {
            args.push("--privileged".to_string());
        }
        if config.cgroupns_host {
            args.push("--cgroupns=host".to_string());
        }

        for mount in config
            .mounts
            .iter()
            .filter(|m| m.mount_type == MountType::Tmpfs)
        {
            args.push("--tmpfs".to_string());
            args.push(mount.target.clone());
        }
        for mount in config
            .mounts
            .iter()
            .filter(|m| m.mount_type == MountType::Bind)
        {
            let mode = if mount.read_only { "ro" } else { "rw" };
            args.push("-v".to_string());
            args.push(format!("{}:{}:{}", mount.source, mount.target, mode));
        }

        for (key, value) in &config.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        args.push(config.image.clone());
        args.extend(config.cmd.iter().cloned());
        args
    }

    /// Build the argument list for an interactive `exec`
    pub fn exec_args(name: &str, config: &ExecConfig) -> Vec<String> {
        let mut args = vec!["exec".to_string()];
        if config.stdin {
            args.push("-i".to_string());
        }
        if config.tty {
            args.push("-t".to_string());
        }
        for (key, value) in &config.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(name.to_string());
        if config.cmd.is_empty() {
            args.push("/bin/bash".to_string());
        } else {
            args.extend(config.cmd.iter().cloned());
        }
        args
    }
}

#[async_trait]
impl ContainerEngine for CliEngine {
    async fn exists(&self, name: &str) -> Result<bool> {
        let output = self.run_raw(&["inspect", "--type", "container", name]).await?;
        if output.status.success() {
            return Ok(true);
        }
        let detail = failure_detail(&output);
        if is_not_found(&detail) {
            return Ok(false);
        }
        Err(ProviderError::Inspect(detail))
    }

    async fn is_running(&self, name: &str) -> Result<bool> {
        let output = self
            .run_raw(&["inspect", "-f", "{{.State.Running}}", name])
            .await?;
        if !output.status.success() {
            return Err(ProviderError::Inspect(failure_detail(&output)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    async fn published_port(&self, name: &str, container_port: u16) -> Result<Option<u16>> {
        let spec = format!("{}/tcp", container_port);
        let output = self.run_raw(&["port", name, &spec]).await?;
        if !output.status.success() {
            let detail = failure_detail(&output);
            if detail.to_lowercase().contains("no public port") {
                return Ok(None);
            }
            return Err(ProviderError::Inspect(detail));
        }
        Ok(parse_port_mapping(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn list_names(&self) -> Result<Vec<String>> {
        let output = self
            .run_cmd(&["ps", "-a", "--format", "{{.Names}}"])
            .await?;
        Ok(parse_lines(&output))
    }

    async fn run(&self, config: &RunConfig) -> Result<()> {
        let args = Self::run_args(config);
        let args_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
        let output = self.run_raw(&args_refs).await?;
        if !output.status.success() {
            return Err(ProviderError::Create(failure_detail(&output)));
        }
        tracing::debug!(
            "Started container {} ({})",
            config.name,
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        let output = self.run_raw(&["start", name]).await?;
        if !output.status.success() {
            return Err(ProviderError::Start(failure_detail(&output)));
        }
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let output = self.run_raw(&["rm", "-f", name]).await?;
        if !output.status.success() {
            return Err(removal_error(failure_detail(&output)));
        }
        Ok(())
    }

    async fn commit(&self, name: &str, reference: &str) -> Result<()> {
        let output = self.run_raw(&["commit", name, reference]).await?;
        if !output.status.success() {
            return Err(ProviderError::Commit(failure_detail(&output)));
        }
        Ok(())
    }

    async fn image_tags(&self, repo: &str) -> Result<Vec<String>> {
        let output = self
            .run_cmd(&["images", "--format", "{{.Tag}}", repo])
            .await?;
        Ok(parse_lines(&output))
    }

    async fn remove_image(&self, reference: &str) -> Result<()> {
        self.run_cmd(&["rmi", "-f", reference]).await?;
        Ok(())
    }

    async fn copy_into(&self, name: &str, src: &Path, dest: &str) -> Result<()> {
        let src = src.to_string_lossy();
        let target = format!("{}:{}", name, dest);
        self.run_cmd(&["cp", &src, &target]).await?;
        Ok(())
    }

    async fn exec_interactive(&self, name: &str, config: &ExecConfig) -> Result<i32> {
        let args = Self::exec_args(name, config);
        tracing::debug!("{} {}", self.cmd, args.join(" "));
        let status = Command::new(&self.cmd)
            .args(&args)
            .status()
            .await
            .map_err(|e| ProviderError::Exec(e.to_string()))?;
        Ok(status.code().unwrap_or(1))
    }

    fn info(&self) -> EngineInfo {
        EngineInfo {
            engine_type: self.engine_type,
            program: self.cmd.clone(),
        }
    }
}

/// Trimmed stderr, falling back to stdout and then the exit status
fn failure_detail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !stderr.is_empty() {
        return stderr;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !stdout.is_empty() {
        return stdout;
    }
    format!("exited with {}", output.status)
}

fn is_not_found(detail: &str) -> bool {
    let lower = detail.to_lowercase();
    lower.contains("no such object") || lower.contains("no such container")
}

/// A failed `rm` is `NotFound` only when the engine says so
fn removal_error(detail: String) -> ProviderError {
    if is_not_found(&detail) {
        ProviderError::NotFound(detail)
    } else {
        ProviderError::Runtime(detail)
    }
}

/// Parse `docker port` output (`0.0.0.0:49153`, `[::]:49153`) into the first host port
pub fn parse_port_mapping(output: &str) -> Option<u16> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find_map(|line| {
            let (_, port) = line.rsplit_once(':')?;
            if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            port.parse::<u16>().ok().filter(|p| *p > 0)
        })
}

/// Split line-oriented engine output, dropping blanks
fn parse_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MountConfig, PortBinding};
    use std::collections::BTreeMap;

    #[test]
    fn test_parse_port_mapping_ipv4() {
        assert_eq!(parse_port_mapping("0.0.0.0:49153\n"), Some(49153));
    }

    #[test]
    fn test_parse_port_mapping_prefers_first_valid_line() {
        let output = "\n[::]:8081\n0.0.0.0:8082\n";
        assert_eq!(parse_port_mapping(output), Some(8081));
    }

    #[test]
    fn test_parse_port_mapping_skips_garbage() {
        assert_eq!(parse_port_mapping("no mapping here"), None);
        assert_eq!(parse_port_mapping("host:abc\n0.0.0.0:9000"), Some(9000));
        assert_eq!(parse_port_mapping(""), None);
    }

    #[test]
    fn test_parse_lines_drops_blanks() {
        let names = parse_lines("vibehost-a\n\n  vibehost-b  \nother\n");
        assert_eq!(names, vec!["vibehost-a", "vibehost-b", "other"]);
    }

    #[test]
    fn test_is_not_found_variants() {
        assert!(is_not_found("Error: No such object: vibehost-x"));
        assert!(is_not_found("Error response from daemon: No such container: x"));
        assert!(!is_not_found("Cannot connect to the Docker daemon"));
    }

    #[test]
    fn test_removal_error_classification() {
        let err = removal_error("Error response from daemon: No such container: x".to_string());
        assert!(err.is_not_found());

        let err = removal_error("Error response from daemon: device or resource busy".to_string());
        assert!(!err.is_not_found());
        assert!(matches!(err, ProviderError::Runtime(_)));
    }

    #[test]
    fn test_run_args_layout() {
        let mut env = BTreeMap::new();
        env.insert("VIBEHOST_APP".to_string(), "demo".to_string());
        let config = RunConfig {
            name: "vibehost-demo".to_string(),
            image: "vibehost:latest".to_string(),
            ports: vec![PortBinding {
                host_port: 8081,
                container_port: 8080,
            }],
            mounts: vec![
                MountConfig::tmpfs("/run"),
                MountConfig::bind("/sys/fs/cgroup", "/sys/fs/cgroup"),
            ],
            env,
            privileged: true,
            cgroupns_host: true,
            cmd: vec!["/sbin/init".to_string()],
        };

        let args = CliEngine::run_args(&config);
        assert_eq!(
            args,
            vec![
                "run",
                "-d",
                "--name",
                "vibehost-demo",
                "-p",
                "8081:8080",
                "--privileged",
                "--cgroupns=host",
                "--tmpfs",
                "/run",
                "-v",
                "/sys/fs/cgroup:/sys/fs/cgroup:rw",
                "-e",
                "VIBEHOST_APP=demo",
                "vibehost:latest",
                "/sbin/init",
            ]
        );
    }

    #[test]
    fn test_exec_args_tty_and_env() {
        let mut env = BTreeMap::new();
        env.insert("TERM".to_string(), "xterm-256color".to_string());
        let config = ExecConfig {
            cmd: vec!["tmux".to_string(), "attach".to_string()],
            env,
            tty: true,
            stdin: true,
        };
        let args = CliEngine::exec_args("vibehost-demo", &config);
        assert_eq!(
            args,
            vec![
                "exec",
                "-i",
                "-t",
                "-e",
                "TERM=xterm-256color",
                "vibehost-demo",
                "tmux",
                "attach"
            ]
        );
    }

    #[test]
    fn test_exec_args_defaults_to_shell() {
        let config = ExecConfig {
            stdin: true,
            ..Default::default()
        };
        let args = CliEngine::exec_args("vibehost-demo", &config);
        assert_eq!(args, vec!["exec", "-i", "vibehost-demo", "/bin/bash"]);
    }
}
