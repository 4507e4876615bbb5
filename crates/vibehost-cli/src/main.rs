//! vibehost - attach to agent app containers on remote hosts

use clap::{Parser, Subcommand};
use vibehost_cli::commands::{self, ConfigUpdate, SessionArgs};
use vibehost_cli::{exit_code_for, init_logging};
use vibehost_config::{ClientConfig, SessionEnv};
use vibehost_core::protocol::CLIENT_USAGE;
use vibehost_core::CoreError;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "vibehost")]
#[command(author, version, about = "Attach to agent app containers on remote hosts", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Agent provider (codex, claude, gemini)
    #[arg(long)]
    agent: Option<String>,

    /// Delete the app container and all its snapshots
    #[arg(long)]
    delete: bool,

    /// Skip the delete confirmation
    #[arg(short = 'y', long, requires = "delete")]
    yes: bool,

    /// App to attach to, as <app> or <app>@<host>
    target: Option<String>,

    /// snapshot | snapshots | restore <ref> | shell
    #[arg(trailing_var_arg = true)]
    action: Vec<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or update the client configuration
    Config {
        /// Host used when the target has no @host
        #[arg(long)]
        default_host: Option<String>,
        /// Default agent provider
        #[arg(long)]
        agent: Option<String>,
        /// Add a host alias
        #[arg(long = "set-host", value_name = "ALIAS=HOST")]
        set_host: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(exit_code_for(&e));
        }
    }
}

async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(Commands::Config {
        default_host,
        agent,
        set_host,
    }) = cli.command
    {
        commands::config(ConfigUpdate {
            default_host,
            agent,
            set_hosts: set_host,
        })?;
        return Ok(0);
    }

    let Some(target) = cli.target else {
        return Err(CoreError::Usage(CLIENT_USAGE.to_string()).into());
    };

    let config = ClientConfig::load()?;
    let env = SessionEnv::from_env();
    commands::session(
        SessionArgs {
            target,
            action: cli.action,
            agent: cli.agent,
            delete: cli.delete,
            yes: cli.yes,
        },
        &config,
        &env,
    )
    .await
}
