//! vibehost-server - manages app containers on the host, invoked over ssh

use clap::Parser;
use vibehost_cli::commands::{self, ServerArgs};
use vibehost_cli::{exit_code_for, init_logging};
use vibehost_config::SessionEnv;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "vibehost-server")]
#[command(author, version, about = "Host-side vibehost command", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Agent provider (codex, claude, gemini)
    #[arg(long, default_value = "codex")]
    agent: String,

    /// App name
    app: String,

    /// snapshot | snapshots | restore <ref> | shell | port | exists | delete
    #[arg(trailing_var_arg = true)]
    action: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let args = ServerArgs {
        agent: cli.agent,
        app: cli.app,
        action: cli.action,
    };
    match commands::serve(args, SessionEnv::from_env()).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(exit_code_for(&e));
        }
    }
}
