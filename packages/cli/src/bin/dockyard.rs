use clap::{Parser, Subcommand};
use colored::*;
use dockyard_config::ServiceConfig;
use std::process;

mod cli;

use cli::challenge::ChallengeCommands;
use cli::config::ConfigCommands;

#[derive(Parser)]
#[command(name = "dockyard")]
#[command(about = "Dockyard - per-user challenge containers for CTF platforms")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API and run the expiry sweeper
    Serve,
    /// Reclaim expired containers once and exit
    Sweep,
    /// Remove runtime workloads that no ledger record accounts for
    Orphans {
        #[arg(long, help = "Report orphans without removing them")]
        dry_run: bool,
    },
    /// Manage runtime configuration
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Manage the challenge catalog
    #[command(subcommand)]
    Challenge(ChallengeCommands),
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    dockyard_cli::init_logging();

    let cli = Cli::parse();

    if let Err(e) = handle_command(cli.command).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn handle_command(command: Commands) -> anyhow::Result<()> {
    let config = ServiceConfig::from_env()?;

    match command {
        Commands::Serve => cli::serve::serve_command(config).await,
        Commands::Sweep => cli::maintenance::sweep_command(config).await,
        Commands::Orphans { dry_run } => cli::maintenance::orphans_command(config, dry_run).await,
        Commands::Config(cmd) => cli::config::handle_config_command(config, cmd).await,
        Commands::Challenge(cmd) => cli::challenge::handle_challenge_command(config, cmd).await,
    }
}
