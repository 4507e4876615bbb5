//! `vibehost-server`: runs on the host that owns the app containers

use anyhow::Result;
use std::io::IsTerminal;
use vibehost_config::SessionEnv;
use vibehost_core::{
    prompt, AgentProvider, AppName, PortStateStore, RemoteAction, Server, ServerOptions,
};

/// Raw server arguments as given on the command line
#[derive(Debug, Clone, Default)]
pub struct ServerArgs {
    pub agent: String,
    pub app: String,
    pub action: Vec<String>,
}

/// Validate the raw arguments. Malformed input is a usage error.
pub fn server_options(args: &ServerArgs) -> Result<ServerOptions> {
    Ok(ServerOptions {
        app: AppName::parse(&args.app)?,
        agent: AgentProvider::parse(&args.agent)?,
        action: RemoteAction::parse(&args.action)?,
    })
}

pub async fn serve(args: ServerArgs, env: SessionEnv) -> Result<i32> {
    let opts = server_options(&args)?;
    let engine = vibehost_provider::create_default_engine()?;
    let state_path = PortStateStore::state_path()?;
    let tty = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();

    let server = Server::new(engine.as_ref(), env, state_path, tty);
    let mut stdout = std::io::stdout();
    let code = server
        .run(&opts, &mut stdout, |app| {
            prompt::confirm(&format!("App {} does not exist. Create?", app), true)
        })
        .await?;
    Ok(code)
}
