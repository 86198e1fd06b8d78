// ABOUTME: The serve command: HTTP API plus the background expiry sweeper
// ABOUTME: Runs until Ctrl-C, then stops the sweeper before exiting

use anyhow::{Context, Result};
use colored::*;
use dockyard_config::ServiceConfig;
use dockyard_lifecycle::ExpirySweeper;
use tracing::info;

pub async fn serve_command(config: ServiceConfig) -> Result<()> {
    let manager = dockyard_cli::build_manager(&config).await?;

    let sweeper = ExpirySweeper::new(manager.clone(), config.sweep_interval);
    sweeper.start().await;

    let app = dockyard_api::create_router(manager);
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    println!(
        "{} Dockyard listening on http://{}",
        "✓".green(),
        config.bind_addr
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.stop().await;
    info!("Expiry sweeper stopped");

    served.context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
