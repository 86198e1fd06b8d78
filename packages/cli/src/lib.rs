// ABOUTME: Process bootstrap shared by every dockyard subcommand
// ABOUTME: Logging setup and wiring of config, storage, Docker runtime and lifecycle manager

use anyhow::{Context, Result};
use dockyard_config::ServiceConfig;
use dockyard_lifecycle::{ContainerManager, DockerRuntime, PortAllocator, SettingsStore};
use dockyard_storage::StorageConfig;
use std::sync::Arc;
use tracing::info;

/// Install the global tracing subscriber, `info` unless RUST_LOG says otherwise
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Open the database and assemble a manager backed by the Docker daemon
pub async fn build_manager(config: &ServiceConfig) -> Result<Arc<ContainerManager>> {
    let pool = dockyard_storage::connect(&config.database_url, &StorageConfig::default())
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;

    let settings = Arc::new(SettingsStore::new(pool.clone()));
    let runtime = Arc::new(DockerRuntime::new(settings, config.docker_timeout_secs));

    let manager = ContainerManager::builder(pool, runtime)
        .cooldown(config.rate_limit_window)
        .port_allocator(PortAllocator::new(
            config.port_range.clone(),
            config.port_max_attempts,
            config.port_probe_timeout,
        ))
        .build();

    info!(
        "Container manager ready (ports {}-{}, cooldown {}s)",
        config.port_range.start(),
        config.port_range.end(),
        config.rate_limit_window.as_secs()
    );
    Ok(Arc::new(manager))
}
