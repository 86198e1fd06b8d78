//! Test utilities: an in-memory container runtime, a manually driven clock and database helpers

use crate::challenges::{Challenge, ChallengeState, ChallengeStore, DockerSpec};
use crate::clock::Clock;
use crate::runtime::{
    ContainerRuntime, NetworkHandle, Result, RuntimeError, WorkloadFilter, WorkloadHandle,
    WorkloadSpec,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::SqlitePool;
use std::sync::{Mutex, MutexGuard};

/// Every call the fake runtime received, in order
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeCall {
    CreateWorkload(String),
    ListWorkloads(WorkloadFilter),
    RemoveWorkload(String),
    ListNetworks(String),
    DisconnectNetwork(String, String),
    RemoveNetwork(String),
}

#[derive(Debug, Default)]
struct FakeState {
    workloads: Vec<(WorkloadHandle, WorkloadSpec)>,
    networks: Vec<NetworkHandle>,
    calls: Vec<RuntimeCall>,
    fail_creates: usize,
    fail_network_lists: usize,
    fail_removes: usize,
    next_id: u64,
}

/// In-memory `ContainerRuntime` with failure injection
///
/// A failed create still registers the workload, like a container that was
/// created but could not be started, so compensation paths have something to remove.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the next `n` creates fail
    pub fn fail_creates(&self, n: usize) {
        self.state().fail_creates = n;
    }

    /// Make the next `n` network lookups fail as unreachable
    pub fn fail_network_lists(&self, n: usize) {
        self.state().fail_network_lists = n;
    }

    /// Make the next `n` workload removals fail as unreachable
    pub fn fail_removes(&self, n: usize) {
        self.state().fail_removes = n;
    }

    /// Register a network and return its id
    pub fn add_network(&self, name: &str) -> String {
        let mut state = self.state();
        state.next_id += 1;
        let id = format!("net-{}", state.next_id);
        state.networks.push(NetworkHandle {
            id: id.clone(),
            name: name.to_string(),
        });
        id
    }

    pub fn workloads(&self) -> Vec<WorkloadHandle> {
        self.state().workloads.iter().map(|(h, _)| h.clone()).collect()
    }

    /// Spec the named workload was created with
    pub fn spec_of(&self, name: &str) -> Option<WorkloadSpec> {
        self.state()
            .workloads
            .iter()
            .find(|(h, _)| h.name == name)
            .map(|(_, s)| s.clone())
    }

    pub fn networks(&self) -> Vec<NetworkHandle> {
        self.state().networks.clone()
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&RuntimeCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }
}

fn matches_filter(handle: &WorkloadHandle, filter: &WorkloadFilter) -> bool {
    match filter {
        WorkloadFilter::Name(name) => handle.name.contains(name.as_str()),
        WorkloadFilter::Label(label) => match label.split_once('=') {
            Some((key, value)) => handle.labels.get(key).map(String::as_str) == Some(value),
            None => handle.labels.contains_key(label),
        },
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<WorkloadHandle> {
        let mut state = self.state();
        state.calls.push(RuntimeCall::CreateWorkload(spec.name.clone()));

        if state.workloads.iter().any(|(h, _)| h.name == spec.name) {
            return Err(RuntimeError::Rejected {
                status: 409,
                message: format!("name {} already in use", spec.name),
            });
        }

        state.next_id += 1;
        let handle = WorkloadHandle {
            id: format!("ctr-{}", state.next_id),
            name: spec.name.clone(),
            labels: spec.labels.clone(),
        };
        state.workloads.push((handle.clone(), spec.clone()));

        if state.fail_creates > 0 {
            state.fail_creates -= 1;
            return Err(RuntimeError::Rejected {
                status: 500,
                message: "injected start failure".to_string(),
            });
        }

        Ok(handle)
    }

    async fn list_workloads(&self, filter: &WorkloadFilter) -> Result<Vec<WorkloadHandle>> {
        let mut state = self.state();
        state.calls.push(RuntimeCall::ListWorkloads(filter.clone()));

        Ok(state
            .workloads
            .iter()
            .filter(|(h, _)| matches_filter(h, filter))
            .map(|(h, _)| h.clone())
            .collect())
    }

    async fn remove_workload(&self, id: &str, _force: bool) -> Result<()> {
        let mut state = self.state();
        state.calls.push(RuntimeCall::RemoveWorkload(id.to_string()));

        if state.fail_removes > 0 {
            state.fail_removes -= 1;
            return Err(RuntimeError::Unreachable("injected remove failure".to_string()));
        }

        let before = state.workloads.len();
        state.workloads.retain(|(h, _)| h.id != id);
        if state.workloads.len() == before {
            return Err(RuntimeError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_networks(&self, name: &str) -> Result<Vec<NetworkHandle>> {
        let mut state = self.state();
        state.calls.push(RuntimeCall::ListNetworks(name.to_string()));

        if state.fail_network_lists > 0 {
            state.fail_network_lists -= 1;
            return Err(RuntimeError::Unreachable("injected network failure".to_string()));
        }

        Ok(state
            .networks
            .iter()
            .filter(|n| n.name.contains(name))
            .cloned()
            .collect())
    }

    async fn disconnect_network(&self, network_id: &str, peer: &str) -> Result<()> {
        self.state().calls.push(RuntimeCall::DisconnectNetwork(
            network_id.to_string(),
            peer.to_string(),
        ));
        Ok(())
    }

    async fn remove_network(&self, network_id: &str) -> Result<()> {
        let mut state = self.state();
        state
            .calls
            .push(RuntimeCall::RemoveNetwork(network_id.to_string()));
        state.networks.retain(|n| n.id != network_id);
        Ok(())
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// A clock at a fixed, round instant
    pub fn at_epoch() -> Self {
        Self::new(test_epoch())
    }

    pub fn set(&self, time: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = time;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

pub fn test_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Migrated in-memory database
pub async fn setup_test_db() -> SqlitePool {
    dockyard_storage::connect_in_memory()
        .await
        .unwrap_or_else(|e| panic!("failed to create test database: {}", e))
}

pub fn docker_spec() -> DockerSpec {
    DockerSpec {
        image: "nginx:alpine".to_string(),
        redirect_port: 80,
        memory_limit: "128m".to_string(),
        cpu_limit: 0.5,
    }
}

/// Store a docker challenge with the given id and state
pub async fn seed_challenge(pool: &SqlitePool, id: i64, state: ChallengeState) {
    let challenge = Challenge {
        id,
        name: format!("challenge-{}", id),
        state,
        docker: Some(docker_spec()),
    };
    ChallengeStore::new(pool.clone())
        .save(&challenge)
        .await
        .unwrap_or_else(|e| panic!("failed to seed challenge {}: {}", id, e));
}
