//! Client side: resolve the target and run the server over ssh

use anyhow::{bail, Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::io::IsTerminal;
use std::sync::Arc;
use vibehost_config::{ClientConfig, SessionEnv, ENV_AUTH_BUNDLE, ENV_AUTO_CREATE, ENV_XDG_OPEN_SOCKET};
use vibehost_core::open_bridge::new_socket_path;
use vibehost_core::prompt;
use vibehost_core::protocol::CLIENT_USAGE;
use vibehost_core::transport::is_local_host;
use vibehost_core::{
    resolve_target, AgentProvider, AppName, AuthBundle, CoreError, DesktopOpener, LocalForward,
    OpenBridge, RemoteAction, RemoteCommand, RemoteSocketForward, SessionSpec, SshTransport,
};

/// Parsed client invocation
#[derive(Debug, Clone, Default)]
pub struct SessionArgs {
    /// `app` or `app@host`
    pub target: String,
    pub action: Vec<String>,
    pub agent: Option<String>,
    pub delete: bool,
    pub yes: bool,
}

/// Decide the remote action from the positional tokens and `--delete`
pub fn client_action(args: &SessionArgs) -> Result<RemoteAction> {
    if args.delete {
        if !args.action.is_empty() {
            return Err(CoreError::Usage(CLIENT_USAGE.to_string()).into());
        }
        return Ok(RemoteAction::Delete);
    }
    Ok(RemoteAction::parse_user(&args.action)?)
}

/// Run one client session. Returns the exit code of the remote command.
pub async fn session(args: SessionArgs, config: &ClientConfig, env: &SessionEnv) -> Result<i32> {
    let target = resolve_target(&args.target, config)?;
    let agent = AgentProvider::parse(args.agent.as_deref().unwrap_or(&config.agent_provider))?;
    let action = client_action(&args)?;
    let transport = SshTransport::new(env)?;
    tracing::debug!("Target {} on {}", target.app, target.host);

    let command = RemoteCommand::new(target.app.clone(), agent, action.clone());

    if !action.is_interactive() {
        if action == RemoteAction::Delete && !args.yes && !confirm_delete(&target.app)? {
            return Err(CoreError::Aborted.into());
        }
        let spec = SessionSpec {
            host: target.host.clone(),
            remote_args: command.to_args(),
            ..Default::default()
        };
        return Ok(transport.run(&spec).await?);
    }

    if !std::io::stdin().is_terminal() || !std::io::stdout().is_terminal() {
        bail!("interactive sessions require a terminal");
    }

    let mut command = command;
    let exists = transport.query_exists(&target.host, &command).await?;
    let create_env = if exists {
        None
    } else {
        let question = format!("App {} does not exist on {}. Create?", target.app, target.host);
        if !prompt::confirm(&question, true) {
            return Err(CoreError::Aborted.into());
        }
        Some(offer_credentials(agent, &target.app))
    };

    let local_forward = if is_local_host(&target.host) {
        None
    } else {
        let port = transport.query_port(&target.host, &command).await?;
        ensure_local_port_free(port)?;
        Some(LocalForward::same_port(port))
    };

    if let Some(bundle) = create_env {
        command = command.with_env(ENV_AUTO_CREATE, "1");
        if let Some(token) = bundle {
            command = command.with_env(ENV_AUTH_BUNDLE, token);
        }
    }

    let bridge = match OpenBridge::start(Arc::new(DesktopOpener)).await {
        Ok(bridge) => Some(bridge),
        Err(e) => {
            tracing::warn!("browser open relay unavailable: {}", e);
            None
        }
    };

    let socket_forward = bridge.as_ref().map(|bridge| {
        let path = new_socket_path();
        command = command.clone().with_env(ENV_XDG_OPEN_SOCKET, path.clone());
        RemoteSocketForward::to_local_port(path, bridge.port())
    });

    let spec = SessionSpec {
        host: target.host.clone(),
        remote_args: command.to_args(),
        tty: true,
        local_forward,
        socket_forward,
    };
    run_attached(&transport, &spec, bridge).await
}

/// Run the interactive session, then close the open bridge whatever the
/// outcome of ssh.
pub async fn run_attached(
    transport: &SshTransport,
    spec: &SessionSpec,
    bridge: Option<OpenBridge>,
) -> Result<i32> {
    let result = transport.run(spec).await;

    if let Some(bridge) = bridge {
        bridge.shutdown().await;
    }
    Ok(result?)
}

fn confirm_delete(app: &AppName) -> Result<bool> {
    let question = format!("Delete {} and all snapshots?", app);
    if !std::io::stdin().is_terminal() {
        return Ok(prompt::confirm(&question, false));
    }
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(question)
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

/// Offer to copy local agent credentials into a new container.
/// Problems only warn; the session goes ahead without credentials.
fn offer_credentials(agent: AgentProvider, app: &AppName) -> Option<String> {
    let bundle = match AuthBundle::discover_local(agent) {
        Ok(Some(bundle)) => bundle,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!("could not read local {} credentials: {}", agent, e);
            return None;
        }
    };

    let question = format!(
        "Copy local {} credentials ({}) into {}?",
        agent,
        bundle.describe(),
        app
    );
    if !prompt::confirm(&question, true) {
        return None;
    }

    match bundle.encode() {
        Ok(token) => Some(token),
        Err(e) => {
            tracing::warn!("could not encode {} credentials: {}", agent, e);
            None
        }
    }
}

/// The local forward needs the app's port free on this machine
fn ensure_local_port_free(port: u16) -> Result<()> {
    match std::net::TcpListener::bind(("127.0.0.1", port)) {
        Ok(_) => Ok(()),
        Err(e) => bail!(
            "local port {} is not available for forwarding ({}); stop whatever is using it and retry",
            port,
            e
        ),
    }
}
