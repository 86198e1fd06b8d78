// ABOUTME: Docker implementation of the container runtime capability
// ABOUTME: Uses bollard against the endpoint named by the docker_api_url setting

use super::{
    ContainerRuntime, NetworkHandle, Result, RuntimeError, WorkloadFilter, WorkloadHandle,
    WorkloadSpec,
};
use crate::settings::{SettingsStore, DOCKER_API_URL};
use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
        StartContainerOptions,
    },
    image::CreateImageOptions,
    network::{DisconnectNetworkOptions, ListNetworksOptions},
    Docker, API_DEFAULT_VERSION,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Upper bound on a single image pull
const PULL_TIMEOUT: Duration = Duration::from_secs(600);

pub struct DockerRuntime {
    settings: Arc<SettingsStore>,
    /// Client for the most recently seen endpoint; `None` key means local defaults
    client: RwLock<Option<(Option<String>, Docker)>>,
    /// Transport timeout for every Docker API call, in seconds
    timeout_secs: u64,
    /// Images known to be present locally, with the time they were confirmed
    image_cache: Arc<RwLock<HashMap<String, chrono::DateTime<chrono::Utc>>>>,
}

impl DockerRuntime {
    pub fn new(settings: Arc<SettingsStore>, timeout_secs: u64) -> Self {
        Self {
            settings,
            client: RwLock::new(None),
            timeout_secs,
            image_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Client for the currently configured endpoint, reconnecting when the setting changed
    async fn client(&self) -> Result<Docker> {
        let url = match self.settings.get_config(DOCKER_API_URL).await {
            Ok(value) => Some(value.trim().to_string()).filter(|v| !v.is_empty()),
            Err(crate::error::LifecycleError::NotFound(_)) => None,
            Err(e) => {
                return Err(RuntimeError::Unreachable(format!(
                    "cannot read runtime endpoint: {}",
                    e
                )))
            }
        };

        {
            let cached = self.client.read().await;
            if let Some((cached_url, docker)) = cached.as_ref() {
                if *cached_url == url {
                    return Ok(docker.clone());
                }
            }
        }

        let docker = connect(url.as_deref(), self.timeout_secs)?;
        info!(
            "Connected to Docker at {}",
            url.as_deref().unwrap_or("local defaults")
        );
        *self.client.write().await = Some((url, docker.clone()));
        Ok(docker)
    }

    async fn ensure_image(&self, docker: &Docker, image: &str) -> Result<()> {
        if self.image_cache.read().await.contains_key(image) {
            debug!("Image {} found in cache, skipping pull", image);
            return Ok(());
        }

        match docker.inspect_image(image).await {
            Ok(_) => {
                self.image_cache
                    .write()
                    .await
                    .insert(image.to_string(), chrono::Utc::now());
                return Ok(());
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(e) => return Err(map_error(e)),
        }

        info!("Pulling image: {} (timeout: {:?})", image, PULL_TIMEOUT);

        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let stream = docker.create_image(Some(options), None, None);

        let result = tokio::time::timeout(PULL_TIMEOUT, async {
            let mut stream = stream;
            let mut last_status = String::new();

            while let Some(result) = stream.next().await {
                let info = match result {
                    Ok(info) => info,
                    Err(e) => {
                        return Err(RuntimeError::Image(format!(
                            "Failed to pull image {}: {}",
                            image, e
                        )))
                    }
                };
                if let Some(status) = &info.status {
                    if status != &last_status {
                        debug!("Pull status: {}", status);
                        last_status = status.clone();
                    }
                }
                if let Some(error) = info.error {
                    return Err(RuntimeError::Image(format!(
                        "Failed to pull image {}: {}",
                        image, error
                    )));
                }
            }

            Ok(())
        })
        .await;

        match result {
            Ok(Ok(())) => {
                info!("Successfully pulled image: {}", image);
                self.image_cache
                    .write()
                    .await
                    .insert(image.to_string(), chrono::Utc::now());
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RuntimeError::Image(format!(
                "Timeout pulling image {} after {:?}",
                image, PULL_TIMEOUT
            ))),
        }
    }
}

fn connect(url: Option<&str>, timeout_secs: u64) -> Result<Docker> {
    let result = match url {
        None => Docker::connect_with_defaults(),
        Some(url) if url.starts_with("unix://") => {
            Docker::connect_with_socket(url, timeout_secs, API_DEFAULT_VERSION)
        }
        Some(url) => Docker::connect_with_http(url, timeout_secs, API_DEFAULT_VERSION),
    };

    result.map_err(|e| RuntimeError::Unreachable(e.to_string()))
}

/// Map bollard errors onto the runtime error kinds
fn map_error(err: bollard::errors::Error) -> RuntimeError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message,
        } => RuntimeError::NotFound(message),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => RuntimeError::Rejected {
            status: status_code,
            message,
        },
        other => RuntimeError::Unreachable(other.to_string()),
    }
}

fn to_bollard_config(spec: &WorkloadSpec) -> Config<String> {
    let container_port = format!("{}/tcp", spec.container_port);

    let exposed_ports = HashMap::from([(container_port.clone(), HashMap::new())]);
    let port_bindings = HashMap::from([(
        container_port,
        Some(vec![bollard::models::PortBinding {
            host_ip: Some("0.0.0.0".to_string()),
            host_port: Some(spec.host_port.to_string()),
        }]),
    )]);

    let mut env: Vec<String> = spec
        .env
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    env.sort();

    let host_config = bollard::models::HostConfig {
        port_bindings: Some(port_bindings),
        memory: Some(spec.memory_bytes),
        nano_cpus: Some(spec.nano_cpus),
        auto_remove: Some(spec.auto_remove),
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        env: Some(env),
        labels: Some(spec.labels.clone()),
        exposed_ports: Some(exposed_ports),
        host_config: Some(host_config),
        ..Default::default()
    }
}

fn filter_map(filter: &WorkloadFilter) -> HashMap<String, Vec<String>> {
    match filter {
        WorkloadFilter::Name(name) => HashMap::from([("name".to_string(), vec![name.clone()])]),
        WorkloadFilter::Label(label) => {
            HashMap::from([("label".to_string(), vec![label.clone()])])
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<WorkloadHandle> {
        info!("Creating workload: {}", spec.name);
        let docker = self.client().await?;

        self.ensure_image(&docker, &spec.image).await?;

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let container = docker
            .create_container(Some(options), to_bollard_config(spec))
            .await
            .map_err(map_error)?;

        for warning in &container.warnings {
            warn!("Docker warning for {}: {}", spec.name, warning);
        }

        docker
            .start_container(&container.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(map_error)?;

        debug!("Started workload {} ({})", spec.name, container.id);

        Ok(WorkloadHandle {
            id: container.id,
            name: spec.name.clone(),
            labels: spec.labels.clone(),
        })
    }

    async fn list_workloads(&self, filter: &WorkloadFilter) -> Result<Vec<WorkloadHandle>> {
        let docker = self.client().await?;

        let options = ListContainersOptions {
            all: true,
            filters: filter_map(filter),
            ..Default::default()
        };

        let containers = docker
            .list_containers(Some(options))
            .await
            .map_err(map_error)?;

        Ok(containers
            .into_iter()
            .filter_map(|summary| {
                let id = summary.id?;
                let name = summary
                    .names
                    .and_then(|names| names.into_iter().next())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default();
                Some(WorkloadHandle {
                    id,
                    name,
                    labels: summary.labels.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn remove_workload(&self, id: &str, force: bool) -> Result<()> {
        info!("Removing workload: {} (force: {})", id, force);
        let docker = self.client().await?;

        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };

        docker
            .remove_container(id, Some(options))
            .await
            .map_err(map_error)
    }

    async fn list_networks(&self, name: &str) -> Result<Vec<NetworkHandle>> {
        let docker = self.client().await?;

        let options = ListNetworksOptions {
            filters: HashMap::from([("name".to_string(), vec![name.to_string()])]),
        };

        let networks = docker
            .list_networks(Some(options))
            .await
            .map_err(map_error)?;

        Ok(networks
            .into_iter()
            .filter_map(|network| {
                Some(NetworkHandle {
                    id: network.id?,
                    name: network.name.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn disconnect_network(&self, network_id: &str, peer: &str) -> Result<()> {
        debug!("Disconnecting {} from network {}", peer, network_id);
        let docker = self.client().await?;

        docker
            .disconnect_network(
                network_id,
                DisconnectNetworkOptions {
                    container: peer.to_string(),
                    force: true,
                },
            )
            .await
            .map_err(map_error)
    }

    async fn remove_network(&self, network_id: &str) -> Result<()> {
        info!("Removing network: {}", network_id);
        let docker = self.client().await?;

        docker.remove_network(network_id).await.map_err(map_error)
    }
}
