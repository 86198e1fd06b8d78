// ABOUTME: Translates lifecycle intents into container runtime calls
// ABOUTME: Compensates failed starts and runs best-effort teardown with a single retry

use crate::challenges::DockerSpec;
use crate::error::{LifecycleError, Result};
use crate::runtime::{
    self, workload_name, ContainerRuntime, RuntimeError, WorkloadFilter, WorkloadHandle,
    WorkloadSpec, MANAGED_LABEL, OWNER_LABEL, TOKEN_LABEL,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Environment variable the credential is injected as
pub const FLAG_ENV: &str = "FLAG";

/// Everything needed to launch one owner's workload
#[derive(Debug, Clone)]
pub struct WorkloadRequest {
    pub owner: String,
    pub token: String,
    pub challenge: DockerSpec,
    pub credential: String,
    pub port: u16,
}

impl WorkloadRequest {
    pub fn workload_ref(&self) -> WorkloadRef {
        WorkloadRef {
            owner: self.owner.clone(),
            token: self.token.clone(),
        }
    }
}

/// Identifies a workload independently of the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadRef {
    pub owner: String,
    pub token: String,
}

impl WorkloadRef {
    pub fn new(owner: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            token: token.into(),
        }
    }

    /// Workload name, network name and correlation label all share this value
    pub fn runtime_name(&self) -> String {
        workload_name(&self.owner, &self.token)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TeardownOutcome {
    Completed {
        workloads_removed: usize,
        network_removed: bool,
    },
    /// Both attempts failed; the leak is left for the sweeper or an administrator
    Abandoned(RuntimeError),
}

impl TeardownOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

pub struct RuntimeAdapter {
    runtime: Arc<dyn ContainerRuntime>,
}

impl RuntimeAdapter {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Start the workload, cleaning up anything partially created if the runtime fails
    pub async fn start_workload(&self, request: &WorkloadRequest) -> Result<WorkloadHandle> {
        let spec = build_spec(request)?;
        info!(
            "Starting workload {} (image: {}, port: {})",
            spec.name, spec.image, spec.host_port
        );

        match self.runtime.create_workload(&spec).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                warn!("Failed to start workload {}: {}", spec.name, e);
                let outcome = self.stop_workload(&request.workload_ref(), &[]).await;
                debug!("Compensating teardown of {}: {:?}", spec.name, outcome);
                Err(LifecycleError::RuntimeFailure(e))
            }
        }
    }

    /// Remove the workload and its per-owner network, retrying the whole sequence once
    ///
    /// Never fails: a second failure is logged and reported as `Abandoned`.
    pub async fn stop_workload(&self, target: &WorkloadRef, auto_connect_peers: &[String]) -> TeardownOutcome {
        let first = match self.teardown(target, auto_connect_peers).await {
            Ok(outcome) => return outcome,
            Err(e) => e,
        };

        warn!(
            "Teardown of {} failed, retrying once: {}",
            target.runtime_name(),
            first
        );

        match self.teardown(target, auto_connect_peers).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    "Teardown of {} failed twice, leaving it for reconciliation: {}",
                    target.runtime_name(),
                    e
                );
                TeardownOutcome::Abandoned(e)
            }
        }
    }

    async fn teardown(&self, target: &WorkloadRef, peers: &[String]) -> runtime::Result<TeardownOutcome> {
        let name = target.runtime_name();
        let networks = self.runtime.list_networks(&name).await?;

        if networks.is_empty() {
            let workloads = self
                .runtime
                .list_workloads(&WorkloadFilter::Name(name.clone()))
                .await?;
            let removed = self.remove_all(&workloads).await?;
            debug!("Removed {} workload(s) named {}", removed, name);

            return Ok(TeardownOutcome::Completed {
                workloads_removed: removed,
                network_removed: false,
            });
        }

        let workloads = self
            .runtime
            .list_workloads(&WorkloadFilter::Label(name.clone()))
            .await?;
        let removed = self.remove_all(&workloads).await?;

        for network in &networks {
            for peer in peers {
                match self.runtime.disconnect_network(&network.id, peer).await {
                    Ok(()) | Err(RuntimeError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }
            match self.runtime.remove_network(&network.id).await {
                Ok(()) | Err(RuntimeError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        debug!(
            "Removed {} workload(s) and {} network(s) for {}",
            removed,
            networks.len(),
            name
        );

        Ok(TeardownOutcome::Completed {
            workloads_removed: removed,
            network_removed: true,
        })
    }

    /// Force-remove each workload; one that vanished in the meantime counts as removed
    async fn remove_all(&self, workloads: &[WorkloadHandle]) -> runtime::Result<usize> {
        for workload in workloads {
            match self.runtime.remove_workload(&workload.id, true).await {
                Ok(()) | Err(RuntimeError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(workloads.len())
    }

    /// Managed workloads whose correlation token is not in `known_tokens`
    pub async fn orphaned_workloads(&self, known_tokens: &HashSet<String>) -> Result<Vec<WorkloadHandle>> {
        let label = format!("{}=true", MANAGED_LABEL);
        let workloads = self
            .runtime
            .list_workloads(&WorkloadFilter::Label(label))
            .await
            .map_err(LifecycleError::RuntimeFailure)?;

        Ok(workloads
            .into_iter()
            .filter(|w| w.token().map_or(true, |t| !known_tokens.contains(t)))
            .collect())
    }
}

fn build_spec(request: &WorkloadRequest) -> Result<WorkloadSpec> {
    let name = workload_name(&request.owner, &request.token);

    let labels = HashMap::from([
        (MANAGED_LABEL.to_string(), "true".to_string()),
        (OWNER_LABEL.to_string(), request.owner.clone()),
        (TOKEN_LABEL.to_string(), request.token.clone()),
        (name.clone(), String::new()),
    ]);

    Ok(WorkloadSpec {
        name,
        image: request.challenge.image.clone(),
        env: HashMap::from([(FLAG_ENV.to_string(), request.credential.clone())]),
        labels,
        memory_bytes: request.challenge.memory_bytes()?,
        nano_cpus: request.challenge.nano_cpus(),
        container_port: request.challenge.redirect_port,
        host_port: request.port,
        auto_remove: true,
    })
}
