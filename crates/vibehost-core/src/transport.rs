//! ssh session assembly and execution
//!
//! Argument order is fixed: mode flag, forward clauses, host, remote command.

use crate::protocol::{decode_bool_reply, decode_port_reply, probe_failure_detail};
use crate::{CoreError, RemoteAction, RemoteCommand, Result};
use std::process::Stdio;
use vibehost_config::SessionEnv;

/// Terminal type substituted for ones remote tooling does not know
pub const FALLBACK_TERM: &str = "xterm-256color";

const INCOMPATIBLE_TERMS: &[&str] = &["xterm-ghostty", "ghostty"];

/// `-L local:remote_host:remote_port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalForward {
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
}

impl LocalForward {
    /// Forward a local port to the same port on the remote host's loopback
    pub fn same_port(port: u16) -> Self {
        Self {
            local_port: port,
            remote_host: "localhost".to_string(),
            remote_port: port,
        }
    }

    fn clause(&self) -> String {
        format!("{}:{}:{}", self.local_port, self.remote_host, self.remote_port)
    }
}

/// `-R remote_path:local_host:local_port`, used by the open bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSocketForward {
    pub remote_path: String,
    pub local_host: String,
    pub local_port: u16,
}

impl RemoteSocketForward {
    pub fn to_local_port(remote_path: impl Into<String>, local_port: u16) -> Self {
        Self {
            remote_path: remote_path.into(),
            local_host: "localhost".to_string(),
            local_port,
        }
    }

    fn clause(&self) -> String {
        format!("{}:{}:{}", self.remote_path, self.local_host, self.local_port)
    }
}

/// Everything that shapes one ssh invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSpec {
    pub host: String,
    pub remote_args: Vec<String>,
    pub tty: bool,
    pub local_forward: Option<LocalForward>,
    pub socket_forward: Option<RemoteSocketForward>,
}

/// Build the ssh argument vector (without the program name)
pub fn build_args(spec: &SessionSpec) -> Vec<String> {
    let mut args = vec![if spec.tty { "-tt" } else { "-T" }.to_string()];

    if let Some(forward) = &spec.local_forward {
        args.push("-L".to_string());
        args.push(forward.clause());
    }

    if let Some(forward) = &spec.socket_forward {
        // a stale socket left by an earlier session would block the bind
        args.push("-o".to_string());
        args.push("StreamLocalBindUnlink=yes".to_string());
        args.push("-R".to_string());
        args.push(forward.clause());
    }

    args.push(spec.host.clone());
    // ssh joins these with spaces and hands them to the remote shell
    args.extend(
        spec.remote_args
            .iter()
            .map(|arg| shell_words::quote(arg).into_owned()),
    );
    args
}

/// Replace terminal types the remote side mishandles; empty means unknown
pub fn normalize_term(term: &str) -> String {
    let term = term.trim();
    if term.is_empty() || INCOMPATIBLE_TERMS.contains(&term.to_lowercase().as_str()) {
        FALLBACK_TERM.to_string()
    } else {
        term.to_string()
    }
}

/// Whether `host` designates this machine, so no port forward is needed
pub fn is_local_host(host: &str) -> bool {
    let mut host = host.trim();
    if let Some((_, rest)) = host.rsplit_once('@') {
        host = rest;
    }
    if let Some(inner) = host.strip_prefix('[') {
        host = inner.split(']').next().unwrap_or(inner);
    } else if host.matches(':').count() == 1 {
        // host:port; bare IPv6 literals have several colons
        host = host.split(':').next().unwrap_or(host);
    }
    matches!(
        host.to_lowercase().as_str(),
        "localhost" | "127.0.0.1" | "::1"
    )
}

/// Runs ssh for probes and interactive sessions
#[derive(Debug, Clone)]
pub struct SshTransport {
    program: String,
    term: Option<String>,
}

impl SshTransport {
    /// Locate `ssh` on PATH
    pub fn new(env: &SessionEnv) -> Result<Self> {
        let program = which::which("ssh")
            .map_err(|_| CoreError::MissingBinary("ssh".to_string()))?
            .to_string_lossy()
            .to_string();
        Ok(Self::with_program(program, env))
    }

    pub fn with_program(program: impl Into<String>, env: &SessionEnv) -> Self {
        Self {
            program: program.into(),
            term: env.term.as_deref().map(normalize_term),
        }
    }

    /// Run a non-interactive invocation and return its stdout
    pub async fn probe(&self, host: &str, command: &RemoteCommand, context: &str) -> Result<String> {
        let args = build_args(&SessionSpec {
            host: host.to_string(),
            remote_args: command.to_args(),
            ..Default::default()
        });
        tracing::debug!("Probe: {} {}", self.program, args.join(" "));

        let output = tokio::process::Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| CoreError::Probe(format!("failed to {}: {}", context, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = probe_failure_detail(&stdout, &stderr, &output.status.to_string());
            return Err(CoreError::Probe(format!("failed to {}: {}", context, detail)));
        }
        Ok(stdout)
    }

    /// Ask the server for the app's host port
    pub async fn query_port(&self, host: &str, command: &RemoteCommand) -> Result<u16> {
        let command = RemoteCommand {
            action: RemoteAction::Port,
            ..command.clone()
        };
        let stdout = self.probe(host, &command, "resolve host port").await?;
        decode_port_reply(&stdout)
    }

    /// Ask the server whether the app container exists
    pub async fn query_exists(&self, host: &str, command: &RemoteCommand) -> Result<bool> {
        let command = RemoteCommand {
            action: RemoteAction::Exists,
            ..command.clone()
        };
        let stdout = self.probe(host, &command, "check app").await?;
        Ok(decode_bool_reply(&stdout))
    }

    /// Run a session attached to our stdio and return ssh's exit code
    pub async fn run(&self, spec: &SessionSpec) -> Result<i32> {
        let args = build_args(spec);
        tracing::debug!("Session: {} {}", self.program, args.join(" "));

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(term) = &self.term {
            cmd.env("TERM", term);
        }

        let status = cmd
            .status()
            .await
            .map_err(|e| CoreError::Transport(e.to_string()))?;
        Ok(status.code().unwrap_or(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_interactive_with_local_forward() {
        let spec = SessionSpec {
            host: "h".to_string(),
            remote_args: strings(&["vibehost-server", "--agent", "codex", "demo"]),
            tty: true,
            local_forward: Some(LocalForward::same_port(8080)),
            socket_forward: None,
        };
        assert_eq!(
            build_args(&spec),
            strings(&[
                "-tt",
                "-L",
                "8080:localhost:8080",
                "h",
                "vibehost-server",
                "--agent",
                "codex",
                "demo",
            ])
        );
    }

    #[test]
    fn test_non_interactive_without_forward() {
        let spec = SessionSpec {
            host: "h".to_string(),
            remote_args: strings(&["vibehost-server", "--agent", "codex", "demo", "port"]),
            ..Default::default()
        };
        let args = build_args(&spec);
        assert_eq!(&args[..2], &strings(&["-T", "h"])[..]);
    }

    #[test]
    fn test_both_forwards_compose_in_order() {
        let spec = SessionSpec {
            host: "root@box".to_string(),
            remote_args: vec![],
            tty: true,
            local_forward: Some(LocalForward::same_port(8081)),
            socket_forward: Some(RemoteSocketForward::to_local_port(
                "/tmp/vibehost-open-1.sock",
                40000,
            )),
        };
        assert_eq!(
            build_args(&spec),
            strings(&[
                "-tt",
                "-L",
                "8081:localhost:8081",
                "-o",
                "StreamLocalBindUnlink=yes",
                "-R",
                "/tmp/vibehost-open-1.sock:localhost:40000",
                "root@box",
            ])
        );
    }

    #[test]
    fn test_remote_args_are_shell_quoted() {
        let spec = SessionSpec {
            host: "h".to_string(),
            remote_args: strings(&["vibehost-server", "my app"]),
            ..Default::default()
        };
        let args = build_args(&spec);
        assert_eq!(args.last().unwrap(), "'my app'");
        assert_eq!(
            shell_words::split(&args[2..].join(" ")).unwrap(),
            strings(&["vibehost-server", "my app"])
        );
    }

    #[test]
    fn test_normalize_term() {
        assert_eq!(normalize_term("xterm-ghostty"), FALLBACK_TERM);
        assert_eq!(normalize_term("Ghostty"), FALLBACK_TERM);
        assert_eq!(normalize_term(""), FALLBACK_TERM);
        assert_eq!(normalize_term("screen-256color"), "screen-256color");
    }

    #[test]
    fn test_transport_carries_normalized_term() {
        let env = SessionEnv::from_vars([("TERM", "xterm-ghostty")]);
        let transport = SshTransport::with_program("ssh", &env);
        assert_eq!(transport.term.as_deref(), Some(FALLBACK_TERM));

        let transport = SshTransport::with_program("ssh", &SessionEnv::default());
        assert_eq!(transport.term, None);
    }

    #[test]
    fn test_is_local_host() {
        for host in [
            "localhost",
            "LOCALHOST",
            "127.0.0.1",
            "::1",
            "[::1]",
            "[::1]:22",
            "root@localhost",
            "user@127.0.0.1:2222",
        ] {
            assert!(is_local_host(host), "{}", host);
        }
        for host in ["box", "10.0.0.4", "root@lab.local", "fe80::1", "localhost.example"] {
            assert!(!is_local_host(host), "{}", host);
        }
    }

    #[tokio::test]
    async fn test_run_reports_spawn_failure_as_transport_error() {
        let transport =
            SshTransport::with_program("/nonexistent/vibehost-test-ssh", &SessionEnv::default());
        let err = transport
            .run(&SessionSpec {
                host: "h".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Transport(_)));
    }
}
