// ABOUTME: CLI commands for the challenge catalog
// ABOUTME: Registers docker-backed challenges that players can launch

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use dockyard_config::ServiceConfig;
use dockyard_lifecycle::{Challenge, ChallengeState, DockerSpec};

#[derive(Subcommand)]
pub enum ChallengeCommands {
    /// Add or replace a docker-backed challenge
    Add {
        #[arg(long)]
        id: i64,

        #[arg(long)]
        name: String,

        /// Image to run, e.g. ctf/web-easy:latest
        #[arg(long)]
        image: String,

        /// Port the service listens on inside the container
        #[arg(long)]
        port: u16,

        /// Memory limit in Docker notation
        #[arg(long, default_value = "128m")]
        memory: String,

        /// CPU cores
        #[arg(long, default_value = "0.5")]
        cpu: f64,

        /// visible, hidden or locked
        #[arg(long, default_value = "visible")]
        state: String,
    },
}

pub async fn handle_challenge_command(
    config: ServiceConfig,
    command: ChallengeCommands,
) -> Result<()> {
    match command {
        ChallengeCommands::Add {
            id,
            name,
            image,
            port,
            memory,
            cpu,
            state,
        } => {
            let state = ChallengeState::from_str(&state)
                .with_context(|| format!("Unknown challenge state: {}", state))?;
            let challenge = Challenge {
                id,
                name,
                state,
                docker: Some(DockerSpec {
                    image,
                    redirect_port: port,
                    memory_limit: memory,
                    cpu_limit: cpu,
                }),
            };

            let manager = dockyard_cli::build_manager(&config).await?;
            manager.challenges().save(&challenge).await?;
            println!(
                "{} Challenge {} ({}) saved as {}",
                "✓".green(),
                challenge.id,
                challenge.name,
                challenge.state.as_str()
            );
        }
    }
    Ok(())
}
