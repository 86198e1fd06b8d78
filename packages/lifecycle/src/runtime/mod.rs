// ABOUTME: Container runtime capability used by the runtime adapter
// ABOUTME: Workload create/list/remove plus the network operations needed for teardown

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

pub mod docker;

pub use docker::DockerRuntime;

/// Label present on every workload this service creates
pub const MANAGED_LABEL: &str = "dockyard.managed";
pub const OWNER_LABEL: &str = "dockyard.owner";
pub const TOKEN_LABEL: &str = "dockyard.token";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Container runtime unreachable: {0}")]
    Unreachable(String),

    #[error("Not found in container runtime: {0}")]
    NotFound(String),

    #[error("Container runtime rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Image error: {0}")]
    Image(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Runtime name of the workload for an owner and correlation token
pub fn workload_name(owner: &str, token: &str) -> String {
    format!("{}-{}", owner, token)
}

/// Everything needed to create and start one challenge workload
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadSpec {
    pub name: String,
    pub image: String,
    pub env: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    pub memory_bytes: i64,
    pub nano_cpus: i64,
    /// Port the service listens on inside the workload
    pub container_port: u16,
    /// Externally reachable port mapped onto `container_port`
    pub host_port: u16,
    pub auto_remove: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadHandle {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
}

impl WorkloadHandle {
    pub fn token(&self) -> Option<&str> {
        self.labels.get(TOKEN_LABEL).map(String::as_str)
    }

    pub fn owner(&self) -> Option<&str> {
        self.labels.get(OWNER_LABEL).map(String::as_str)
    }
}

/// How workloads are looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadFilter {
    /// Workloads whose name contains the value
    Name(String),
    /// Workloads carrying the label, either `key` or `key=value`
    Label(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHandle {
    pub id: String,
    pub name: String,
}

/// Container runtime backend
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and start a workload
    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<WorkloadHandle>;

    /// Workloads matching the filter, including stopped ones
    async fn list_workloads(&self, filter: &WorkloadFilter) -> Result<Vec<WorkloadHandle>>;

    async fn remove_workload(&self, id: &str, force: bool) -> Result<()>;

    /// Networks whose name contains `name`
    async fn list_networks(&self, name: &str) -> Result<Vec<NetworkHandle>>;

    /// Detach a peer container from a network
    async fn disconnect_network(&self, network_id: &str, peer: &str) -> Result<()>;

    async fn remove_network(&self, network_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workload_name() {
        assert_eq!(workload_name("42", "abc"), "42-abc");
    }

    #[test]
    fn test_handle_label_accessors() {
        let handle = WorkloadHandle {
            id: "c1".to_string(),
            name: "42-abc".to_string(),
            labels: HashMap::from([
                (OWNER_LABEL.to_string(), "42".to_string()),
                (TOKEN_LABEL.to_string(), "abc".to_string()),
            ]),
        };

        assert_eq!(handle.owner(), Some("42"));
        assert_eq!(handle.token(), Some("abc"));
    }
}
