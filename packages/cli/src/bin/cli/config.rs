// ABOUTME: CLI commands for the runtime configuration table
// ABOUTME: Lists and updates the docker_* keys read by the lifecycle manager

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use dockyard_config::ServiceConfig;
use std::collections::BTreeMap;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show every configuration key
    List,

    /// Set one configuration key
    Set {
        /// Key, e.g. docker_max_renew_count
        key: String,
        /// New value
        value: String,
    },
}

pub async fn handle_config_command(config: ServiceConfig, command: ConfigCommands) -> Result<()> {
    let manager = dockyard_cli::build_manager(&config).await?;

    match command {
        ConfigCommands::List => {
            let configs = manager.list_configs().await?;
            let width = configs.keys().map(String::len).max().unwrap_or(0);
            for (key, value) in configs {
                println!("{:width$}  {}", key.bold(), value, width = width);
            }
        }
        ConfigCommands::Set { key, value } => {
            manager
                .save_configs(BTreeMap::from([(key.clone(), value.clone())]))
                .await?;
            println!("{} {} = {}", "✓".green(), key, value);
        }
    }
    Ok(())
}
