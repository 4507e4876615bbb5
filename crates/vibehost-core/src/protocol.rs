//! The command line exchanged between client and server
//!
//! There is no RPC channel: the client encodes one `vibehost-server`
//! invocation, runs it over ssh and reads back a single line of stdout.
//! Everything that crosses that boundary is defined here.

use crate::{AppName, CoreError, Result};
use std::collections::BTreeMap;

/// Program run on the remote host
pub const SERVER_BINARY: &str = "vibehost-server";

/// tmux session hosting the agent
pub const AGENT_SESSION: &str = "vibehost-agent";
/// tmux session hosting the `shell` action
pub const SHELL_SESSION: &str = "vibehost-shell";

pub const SERVER_USAGE: &str =
    "usage: vibehost-server [--agent <provider>] <app> [snapshot|snapshots|restore <ref>|shell|port|exists|delete]";
pub const CLIENT_USAGE: &str =
    "usage: vibehost [--agent <provider>] <app>[@host] [snapshot|snapshots|restore <ref>|shell] [--delete [-y]]";

/// Coding agent started inside the app container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AgentProvider {
    #[default]
    Codex,
    Claude,
    Gemini,
}

impl AgentProvider {
    /// Parse a provider name; empty means the default
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "" | "codex" => Ok(Self::Codex),
            "claude" | "claude-code" => Ok(Self::Claude),
            "gemini" => Ok(Self::Gemini),
            _ => Err(CoreError::InvalidAgent(raw.trim().to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Codex => "codex",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        }
    }

    /// Executable started for this agent
    pub fn command(&self) -> &'static str {
        self.as_str()
    }
}

impl std::fmt::Display for AgentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `tmux new-session -A` so reconnecting reattaches to the same session
pub fn tmux_session_args(session: &str, command: &str) -> Vec<String> {
    ["tmux", "new-session", "-A", "-s", session, command]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// What the server does for the app
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RemoteAction {
    /// Run the agent interactively (no action token)
    #[default]
    Attach,
    Shell,
    Snapshot,
    Snapshots,
    Restore(String),
    Port,
    Exists,
    Delete,
}

impl RemoteAction {
    /// Action tokens following the app name
    pub fn tokens(&self) -> Vec<String> {
        match self {
            Self::Attach => vec![],
            Self::Shell => vec!["shell".to_string()],
            Self::Snapshot => vec!["snapshot".to_string()],
            Self::Snapshots => vec!["snapshots".to_string()],
            Self::Restore(reference) => vec!["restore".to_string(), reference.clone()],
            Self::Port => vec!["port".to_string()],
            Self::Exists => vec!["exists".to_string()],
            Self::Delete => vec!["delete".to_string()],
        }
    }

    /// Parse the tokens after the app name on the server side
    pub fn parse(tokens: &[String]) -> Result<Self> {
        let usage = || CoreError::Usage(SERVER_USAGE.to_string());
        let tokens: Vec<&str> = tokens.iter().map(|t| t.trim()).collect();
        match tokens.as_slice() {
            [] => Ok(Self::Attach),
            ["shell"] => Ok(Self::Shell),
            ["snapshot"] => Ok(Self::Snapshot),
            ["snapshots"] => Ok(Self::Snapshots),
            ["restore", reference] if !reference.is_empty() => {
                Ok(Self::Restore(reference.to_string()))
            }
            ["port"] => Ok(Self::Port),
            ["exists"] => Ok(Self::Exists),
            ["delete"] => Ok(Self::Delete),
            _ => Err(usage()),
        }
    }

    /// Parse a user-facing action; probe verbs and delete are not accepted
    pub fn parse_user(tokens: &[String]) -> Result<Self> {
        match Self::parse(tokens) {
            Ok(Self::Port | Self::Exists | Self::Delete) | Err(_) => {
                Err(CoreError::Usage(CLIENT_USAGE.to_string()))
            }
            Ok(action) => Ok(action),
        }
    }

    /// Whether the action attaches a terminal to the container
    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Attach | Self::Shell)
    }
}

/// A fully encoded server invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub app: AppName,
    pub agent: AgentProvider,
    pub action: RemoteAction,
    /// Variables prepended with `env`; a remote ssh command has no ambient env
    pub env: BTreeMap<String, String>,
}

impl RemoteCommand {
    pub fn new(app: AppName, agent: AgentProvider, action: RemoteAction) -> Self {
        Self {
            app,
            agent,
            action,
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Unquoted argument vector; quoting happens when the transport joins it
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if !self.env.is_empty() {
            args.push("env".to_string());
            args.extend(self.env.iter().map(|(k, v)| format!("{}={}", k, v)));
        }
        args.push(SERVER_BINARY.to_string());
        args.push("--agent".to_string());
        args.push(self.agent.as_str().to_string());
        args.push(self.app.to_string());
        args.extend(self.action.tokens());
        args
    }
}

/// Decode the reply of a `port` probe
pub fn decode_port_reply(stdout: &str) -> Result<u16> {
    let reply = stdout.trim();
    match reply.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(CoreError::Probe(format!(
            "unexpected port response: {:?}",
            reply
        ))),
    }
}

/// Decode the reply of an `exists` probe
pub fn decode_bool_reply(stdout: &str) -> bool {
    matches!(
        stdout.trim().to_lowercase().as_str(),
        "true" | "yes" | "1"
    )
}

pub fn encode_bool_reply(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Failure detail for a probe: captured output first, then the process error
pub fn probe_failure_detail(stdout: &str, stderr: &str, fallback: &str) -> String {
    let combined = format!("{}\n{}", stderr.trim(), stdout.trim());
    let combined = combined.trim();
    if combined.is_empty() {
        fallback.to_string()
    } else {
        combined.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn demo() -> AppName {
        AppName::parse("demo").unwrap()
    }

    #[test]
    fn test_agent_provider_parse() {
        assert_eq!(AgentProvider::parse("").unwrap(), AgentProvider::Codex);
        assert_eq!(AgentProvider::parse("Codex").unwrap(), AgentProvider::Codex);
        assert_eq!(AgentProvider::parse("claude-code").unwrap(), AgentProvider::Claude);
        assert_eq!(AgentProvider::parse(" gemini ").unwrap(), AgentProvider::Gemini);

        let err = AgentProvider::parse("copilot").unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_tmux_session_args() {
        assert_eq!(
            tmux_session_args(AGENT_SESSION, "codex"),
            strings(&["tmux", "new-session", "-A", "-s", "vibehost-agent", "codex"])
        );
    }

    #[test]
    fn test_action_tokens_parse_back() {
        let actions = [
            RemoteAction::Attach,
            RemoteAction::Shell,
            RemoteAction::Snapshot,
            RemoteAction::Snapshots,
            RemoteAction::Restore("latest".to_string()),
            RemoteAction::Port,
            RemoteAction::Exists,
            RemoteAction::Delete,
        ];
        for action in actions {
            assert_eq!(RemoteAction::parse(&action.tokens()).unwrap(), action);
        }
    }

    #[test]
    fn test_action_parse_rejects_malformed() {
        for tokens in [
            vec!["bogus"],
            vec!["restore"],
            vec!["restore", " "],
            vec!["snapshot", "extra"],
            vec!["restore", "a", "b"],
        ] {
            let err = RemoteAction::parse(&strings(&tokens)).unwrap_err();
            assert!(matches!(err, CoreError::Usage(_)), "{:?}", tokens);
        }
    }

    #[test]
    fn test_user_actions_exclude_probes() {
        assert_eq!(
            RemoteAction::parse_user(&strings(&["restore", "v1"])).unwrap(),
            RemoteAction::Restore("v1".to_string())
        );
        assert!(RemoteAction::parse_user(&strings(&["port"])).is_err());
        assert!(RemoteAction::parse_user(&strings(&["exists"])).is_err());
        assert!(RemoteAction::parse_user(&strings(&["delete"])).is_err());
    }

    #[test]
    fn test_command_to_args() {
        let command = RemoteCommand::new(demo(), AgentProvider::Claude, RemoteAction::Snapshots);
        assert_eq!(
            command.to_args(),
            strings(&["vibehost-server", "--agent", "claude", "demo", "snapshots"])
        );
    }

    #[test]
    fn test_command_env_prefix() {
        let command = RemoteCommand::new(demo(), AgentProvider::Codex, RemoteAction::Attach)
            .with_env("VIBEHOST_XDG_OPEN_SOCKET", "/tmp/x.sock")
            .with_env("VIBEHOST_AUTO_CREATE", "1");
        assert_eq!(
            command.to_args(),
            strings(&[
                "env",
                "VIBEHOST_AUTO_CREATE=1",
                "VIBEHOST_XDG_OPEN_SOCKET=/tmp/x.sock",
                "vibehost-server",
                "--agent",
                "codex",
                "demo",
            ])
        );
    }

    #[test]
    fn test_decode_port_reply() {
        assert_eq!(decode_port_reply("8081\n").unwrap(), 8081);
        assert_eq!(decode_port_reply("  9000  ").unwrap(), 9000);
        assert!(decode_port_reply("0").is_err());
        assert!(decode_port_reply("-1").is_err());
        assert!(decode_port_reply("").is_err());
        assert!(decode_port_reply("port: 80").is_err());
    }

    #[test]
    fn test_decode_bool_reply() {
        for yes in ["true", "TRUE\n", " yes ", "1"] {
            assert!(decode_bool_reply(yes), "{:?}", yes);
        }
        for no in ["false", "", "no", "0", "maybe"] {
            assert!(!decode_bool_reply(no), "{:?}", no);
        }
        assert!(decode_bool_reply(encode_bool_reply(true)));
        assert!(!decode_bool_reply(encode_bool_reply(false)));
    }

    #[test]
    fn test_probe_failure_detail() {
        assert_eq!(
            probe_failure_detail("", "docker: command not found\n", "exit status: 127"),
            "docker: command not found"
        );
        assert_eq!(probe_failure_detail(" ", "", "exit status: 255"), "exit status: 255");
    }
}
