// ABOUTME: Challenge container lifecycle controller orchestrating ledger, ports and runtime
// ABOUTME: Enforces one container per user, global capacity, renewal caps and the request cooldown

use crate::adapter::{RuntimeAdapter, TeardownOutcome, WorkloadRef, WorkloadRequest};
use crate::challenges::ChallengeStore;
use crate::clock::{Clock, SystemClock};
use crate::error::{LifecycleError, Result};
use crate::ledger::{ContainerLedger, ContainerRecord, NewContainer};
use crate::pagination::{PageRequest, PaginationMeta};
use crate::ports::PortAllocator;
use crate::rate_limit::{Cooldown, DEFAULT_COOLDOWN};
use crate::runtime::ContainerRuntime;
use crate::settings::{DockerSettings, SettingsStore};
use crate::sweeper::SweepReport;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Where a user reaches their container and for how long
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
    pub remaining_seconds: i64,
}

/// One row of the administrative listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveContainer {
    #[serde(flatten)]
    pub record: ContainerRecord,
    pub remaining_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerPage {
    pub containers: Vec<LiveContainer>,
    pub meta: PaginationMeta,
}

/// Result of reconciling runtime workloads against the ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrphanReport {
    pub found: usize,
    pub removed: usize,
    pub errors: Vec<String>,
}

/// Which ledger rows a teardown deletes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordScope {
    /// Every row of the owner, used when the owner asked for removal or replacement
    Owner,
    /// Only the torn-down record, so a sweep never deletes a newer container
    Token,
}

pub struct ContainerManagerBuilder {
    pool: SqlitePool,
    runtime: Arc<dyn ContainerRuntime>,
    ports: PortAllocator,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
}

impl ContainerManagerBuilder {
    pub fn port_allocator(mut self, ports: PortAllocator) -> Self {
        self.ports = ports;
        self
    }

    /// Cooldown window shared by create, remove and renew; zero disables it
    pub fn cooldown(mut self, window: Duration) -> Self {
        self.cooldown = window;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> ContainerManager {
        ContainerManager {
            settings: Arc::new(SettingsStore::new(self.pool.clone())),
            challenges: Arc::new(ChallengeStore::new(self.pool.clone())),
            ledger: Arc::new(ContainerLedger::new(self.pool)),
            adapter: RuntimeAdapter::new(self.runtime),
            ports: self.ports,
            cooldown: Cooldown::new(self.cooldown, self.clock.clone()),
            clock: self.clock,
            owner_locks: Mutex::new(HashMap::new()),
        }
    }
}

/// Lifecycle controller for challenge containers
pub struct ContainerManager {
    settings: Arc<SettingsStore>,
    challenges: Arc<ChallengeStore>,
    ledger: Arc<ContainerLedger>,
    adapter: RuntimeAdapter,
    ports: PortAllocator,
    cooldown: Cooldown,
    clock: Arc<dyn Clock>,
    /// Serialises every mutation for one owner; different owners run in parallel
    owner_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ContainerManager {
    pub fn builder(pool: SqlitePool, runtime: Arc<dyn ContainerRuntime>) -> ContainerManagerBuilder {
        ContainerManagerBuilder {
            pool,
            runtime,
            ports: PortAllocator::default(),
            cooldown: DEFAULT_COOLDOWN,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn challenges(&self) -> &ChallengeStore {
        &self.challenges
    }

    pub fn ledger(&self) -> &ContainerLedger {
        &self.ledger
    }

    async fn owner_lock(&self, owner: &str) -> Arc<Mutex<()>> {
        let mut locks = self.owner_locks.lock().await;
        // Entries only the map still references are idle
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(owner.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// The owner's record if it is still inside its lifetime window
    async fn live_record(&self, owner: &str, settings: &DockerSettings) -> Result<Option<ContainerRecord>> {
        let now = self.clock.now();
        Ok(self
            .ledger
            .find_by_owner(owner)
            .await?
            .filter(|r| !r.is_expired(now, settings.lifetime_chrono())))
    }

    fn connection_info(&self, record: &ContainerRecord, settings: &DockerSettings) -> ConnectionInfo {
        ConnectionInfo {
            host: settings.client_ip.clone(),
            port: record.port,
            remaining_seconds: record.remaining_seconds(self.clock.now(), settings.lifetime_chrono()),
        }
    }

    /// Tear down the record's workload, then drop ledger rows in `scope`. Caller holds the owner lock.
    ///
    /// Every reclamation, user or sweep initiated, goes through here. A teardown the
    /// runtime abandons still deletes the rows and is reported back to the caller.
    async fn teardown_record(
        &self,
        record: &ContainerRecord,
        settings: &DockerSettings,
        scope: RecordScope,
    ) -> Result<TeardownOutcome> {
        let target = WorkloadRef::new(&record.user_id, &record.uuid);
        let outcome = self
            .adapter
            .stop_workload(&target, &settings.auto_connect_containers)
            .await;
        if !outcome.is_completed() {
            warn!(
                "Workload {} may have leaked, deleting its record anyway",
                target.runtime_name()
            );
        }

        let deleted = match scope {
            RecordScope::Owner => self.ledger.delete_by_owner(&record.user_id).await?,
            RecordScope::Token => self.ledger.delete_by_token(&record.uuid).await?,
        };
        debug!("Deleted {} record(s) for user {}", deleted, record.user_id);
        Ok(outcome)
    }

    /// Launch a container for the owner, replacing any container they already have
    pub async fn request_create(&self, owner: &str, challenge_id: i64) -> Result<ConnectionInfo> {
        self.cooldown.try_acquire(owner)?;

        let spec = self.challenges.eligible_docker_challenge(challenge_id).await?;
        let settings = self.settings.docker_settings().await?;

        let lock = self.owner_lock(owner).await;
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let lifetime = settings.lifetime_chrono();
        let existing = self.ledger.find_by_owner(owner).await?;

        // The owner's own live container is about to be replaced, so it does not count
        let alive = self.ledger.count_alive(settings.expiry_threshold(now)).await?;
        let own_alive = existing.as_ref().map_or(false, |r| !r.is_expired(now, lifetime));
        if alive - i64::from(own_alive) >= settings.max_container_count {
            info!(
                "Rejecting container for user {}: capacity {} reached",
                owner, settings.max_container_count
            );
            return Err(LifecycleError::CapacityExceeded {
                max: settings.max_container_count,
            });
        }

        if let Some(prior) = existing {
            info!(
                "Replacing container {} of user {} (challenge {})",
                prior.uuid, owner, prior.challenge_id
            );
            self.teardown_record(&prior, &settings, RecordScope::Owner)
                .await?;
        }

        let request = WorkloadRequest {
            owner: owner.to_string(),
            token: Uuid::new_v4().to_string(),
            challenge: spec,
            credential: format!("flag{{{}}}", Uuid::new_v4()),
            port: self
                .ports
                .allocate(&settings.client_ip, &self.ledger.reserved_ports().await?)
                .await?,
        };

        if let Err(e) = self.adapter.start_workload(&request).await {
            error!(
                "Container start for user {} (challenge {}) failed: {}",
                owner, challenge_id, e
            );
            self.ledger.delete_by_owner(owner).await?;
            return Err(e);
        }

        let inserted = self
            .ledger
            .insert(NewContainer {
                user_id: owner.to_string(),
                challenge_id,
                port: request.port,
                flag: request.credential.clone(),
                uuid: request.token.clone(),
                start_time: self.clock.now(),
            })
            .await;

        let record = match inserted {
            Ok(record) => record,
            Err(e) => {
                error!("Failed to record container for user {}: {}", owner, e);
                self.adapter
                    .stop_workload(&request.workload_ref(), &settings.auto_connect_containers)
                    .await;
                return Err(e);
            }
        };

        info!(
            "Started container {} for user {} (challenge {}) on port {}",
            record.uuid, owner, challenge_id, record.port
        );

        Ok(self.connection_info(&record, &settings))
    }

    /// Destroy the owner's container; succeeds when there is nothing to destroy
    pub async fn request_remove(&self, owner: &str) -> Result<()> {
        self.cooldown.try_acquire(owner)?;
        self.remove_owner(owner).await.map(|_| ())
    }

    async fn remove_owner(&self, owner: &str) -> Result<bool> {
        let settings = self.settings.docker_settings().await?;

        let lock = self.owner_lock(owner).await;
        let _guard = lock.lock().await;

        match self.ledger.find_by_owner(owner).await? {
            Some(record) => {
                info!("Removing container {} of user {}", record.uuid, owner);
                self.teardown_record(&record, &settings, RecordScope::Owner)
                    .await?;
                Ok(true)
            }
            None => {
                debug!("User {} has no container to remove", owner);
                Ok(false)
            }
        }
    }

    /// Extend the owner's container lifetime
    pub async fn request_renew(&self, owner: &str, challenge_id: i64) -> Result<ConnectionInfo> {
        self.cooldown.try_acquire(owner)?;
        self.renew_owner(owner, challenge_id).await
    }

    async fn renew_owner(&self, owner: &str, challenge_id: i64) -> Result<ConnectionInfo> {
        let settings = self.settings.docker_settings().await?;

        let lock = self.owner_lock(owner).await;
        let _guard = lock.lock().await;

        let record = self
            .live_record(owner, &settings)
            .await?
            .ok_or(LifecycleError::NoActiveContainer)?;

        if record.challenge_id != challenge_id {
            return Err(LifecycleError::ChallengeMismatch {
                requested: challenge_id,
                active: record.challenge_id,
            });
        }

        let max = settings.max_renew_count;
        if record.renew_count >= max {
            return Err(LifecycleError::RenewalLimitExceeded { max });
        }

        // Never grant more than one full window from now
        let now = self.clock.now();
        let new_start = (record.start_time + settings.lifetime_chrono()).min(now);

        if !self.ledger.renew(owner, challenge_id, new_start, max).await? {
            return Err(LifecycleError::RenewalLimitExceeded { max });
        }

        info!(
            "Renewed container {} of user {} ({}/{})",
            record.uuid,
            owner,
            record.renew_count + 1,
            max
        );

        let renewed = ContainerRecord {
            start_time: new_start,
            renew_count: record.renew_count + 1,
            ..record
        };
        Ok(self.connection_info(&renewed, &settings))
    }

    /// Connection details when the owner's live container belongs to `challenge_id`
    ///
    /// A container for a different challenge reads as absent and is left untouched.
    pub async fn request_status(&self, owner: &str, challenge_id: i64) -> Result<Option<ConnectionInfo>> {
        let settings = self.settings.docker_settings().await?;

        Ok(self
            .live_record(owner, &settings)
            .await?
            .filter(|r| r.challenge_id == challenge_id)
            .map(|r| self.connection_info(&r, &settings)))
    }

    pub async fn list_configs(&self) -> Result<BTreeMap<String, String>> {
        self.settings.list_configs().await
    }

    /// Save configuration pairs after checking the merged result still parses
    pub async fn save_configs(&self, configs: BTreeMap<String, String>) -> Result<()> {
        let mut merged = self.settings.list_configs().await?;
        merged.extend(configs.clone());
        DockerSettings::from_map(&merged)?;

        self.settings.save_configs(configs).await?;
        info!("Container configuration updated");
        Ok(())
    }

    pub async fn list_live_containers(&self, page: PageRequest) -> Result<ContainerPage> {
        let settings = self.settings.docker_settings().await?;
        let now = self.clock.now();
        let lifetime = settings.lifetime_chrono();
        let threshold = settings.expiry_threshold(now);

        let total = self.ledger.count_alive(threshold).await?;
        let (limit, offset) = page.limit_offset();
        let records = self.ledger.list_alive_page(threshold, limit, offset).await?;

        Ok(ContainerPage {
            containers: records
                .into_iter()
                .map(|record| LiveContainer {
                    remaining_seconds: record.remaining_seconds(now, lifetime),
                    record,
                })
                .collect(),
            meta: PaginationMeta::new(&page, total),
        })
    }

    /// Administrative removal, bypassing the cooldown. Returns whether a container existed.
    pub async fn force_remove(&self, owner: &str) -> Result<bool> {
        self.remove_owner(owner).await
    }

    /// Administrative renewal, bypassing the cooldown but not the renewal cap
    pub async fn force_renew(&self, owner: &str, challenge_id: i64) -> Result<ConnectionInfo> {
        self.renew_owner(owner, challenge_id).await
    }

    /// Reclaim every record past its lifetime window
    ///
    /// Each record is handled under its owner's lock and re-checked there, so a
    /// container created or renewed since the scan is left alone.
    pub async fn sweep_expired(&self) -> Result<SweepReport> {
        let settings = self.settings.docker_settings().await?;
        let lifetime = settings.lifetime_chrono();
        let expired = self
            .ledger
            .list_expired(settings.expiry_threshold(self.clock.now()))
            .await?;

        let mut report = SweepReport {
            expired: expired.len(),
            ..Default::default()
        };

        if expired.is_empty() {
            debug!("Sweep found no expired containers");
            return Ok(report);
        }

        for record in expired {
            let lock = self.owner_lock(&record.user_id).await;
            let _guard = lock.lock().await;

            let current = match self.ledger.find_by_token(&record.uuid).await {
                Ok(current) => current,
                Err(e) => {
                    warn!("Sweep could not re-read container {}: {}", record.uuid, e);
                    report.failed += 1;
                    continue;
                }
            };

            let still_expired = current
                .as_ref()
                .is_some_and(|c| c.is_expired(self.clock.now(), lifetime));
            if !still_expired {
                debug!("Container {} changed since the scan, skipping", record.uuid);
                report.skipped += 1;
                continue;
            }

            match self
                .teardown_record(&record, &settings, RecordScope::Token)
                .await
            {
                Ok(outcome) => {
                    report.reclaimed += 1;
                    if !outcome.is_completed() {
                        report.leaked += 1;
                    }
                    info!(
                        "Reclaimed expired container {} of user {}",
                        record.uuid, record.user_id
                    );
                }
                Err(e) => {
                    warn!("Failed to delete expired record {}: {}", record.uuid, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Remove managed workloads the ledger does not know about
    pub async fn cleanup_orphaned_workloads(&self, dry_run: bool) -> Result<OrphanReport> {
        let known = self.ledger.tokens().await?;
        let orphans = self.adapter.orphaned_workloads(&known).await?;

        let mut report = OrphanReport {
            found: orphans.len(),
            ..Default::default()
        };

        for orphan in orphans {
            warn!("Found orphaned workload: {} ({})", orphan.name, orphan.id);
            if dry_run {
                continue;
            }

            // A create in flight starts its workload before recording it
            let lock = match orphan.owner() {
                Some(owner) => Some(self.owner_lock(owner).await),
                None => None,
            };
            let _guard = match &lock {
                Some(lock) => Some(lock.lock().await),
                None => None,
            };
            if let Some(token) = orphan.token() {
                if self.ledger.tokens().await?.contains(token) {
                    report.found -= 1;
                    continue;
                }
            }

            match self.adapter.runtime().remove_workload(&orphan.id, true).await {
                Ok(()) => {
                    info!("Removed orphaned workload: {}", orphan.id);
                    report.removed += 1;
                }
                Err(e) => {
                    let message = format!("Failed to remove orphaned workload {}: {}", orphan.id, e);
                    warn!("{}", message);
                    report.errors.push(message);
                }
            }
        }

        if dry_run {
            info!("Dry run complete: found {} orphaned workloads (none removed)", report.found);
        } else {
            info!(
                "Cleanup complete: found {} orphaned workloads, removed {} (failed: {})",
                report.found,
                report.removed,
                report.errors.len()
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenges::ChallengeState;
    use crate::test_utils::{seed_challenge, setup_test_db, FakeRuntime, ManualClock, RuntimeCall};
    use pretty_assertions::assert_eq;

    struct Harness {
        manager: ContainerManager,
        runtime: Arc<FakeRuntime>,
        clock: Arc<ManualClock>,
    }

    async fn harness(cooldown: Duration) -> Harness {
        let pool = setup_test_db().await;
        seed_challenge(&pool, 1, ChallengeState::Visible).await;
        seed_challenge(&pool, 2, ChallengeState::Visible).await;
        seed_challenge(&pool, 3, ChallengeState::Hidden).await;

        let runtime = Arc::new(FakeRuntime::new());
        let clock = Arc::new(ManualClock::at_epoch());
        let manager = ContainerManager::builder(pool, runtime.clone())
            .cooldown(cooldown)
            .clock(clock.clone())
            .port_allocator(PortAllocator::new(30000..=30999, 64, Duration::from_millis(100)))
            .build();

        Harness {
            manager,
            runtime,
            clock,
        }
    }

    #[test]
    fn test_live_container_serializes_flat() {
        let live = LiveContainer {
            record: ContainerRecord {
                id: 1,
                user_id: "alice".to_string(),
                challenge_id: 2,
                port: 20001,
                flag: "flag{x}".to_string(),
                uuid: "tok".to_string(),
                start_time: crate::test_utils::test_epoch(),
                renew_count: 0,
            },
            remaining_seconds: 42,
        };

        let json = serde_json::to_value(&live).unwrap();
        assert_eq!(json["user_id"], "alice");
        assert_eq!(json["port"], 20001);
        assert_eq!(json["remaining_seconds"], 42);
    }

    #[tokio::test]
    async fn test_create_records_and_starts_workload() {
        let h = harness(Duration::ZERO).await;

        let info = h.manager.request_create("alice", 1).await.unwrap();
        assert_eq!(info.host, "127.0.0.1");
        assert_eq!(info.remaining_seconds, 3600);
        assert!((30000..=30999).contains(&info.port));

        let record = h.manager.ledger().find_by_owner("alice").await.unwrap().unwrap();
        assert_eq!(record.renew_count, 0);
        assert!(record.flag.starts_with("flag{") && record.flag.ends_with('}'));

        let spec = h
            .runtime
            .spec_of(&format!("alice-{}", record.uuid))
            .unwrap();
        assert_eq!(spec.env["FLAG"], record.flag);
        assert_eq!(spec.host_port, record.port);
    }

    #[tokio::test]
    async fn test_create_rejects_ineligible_challenge() {
        let h = harness(Duration::ZERO).await;

        for id in [3, 42] {
            assert!(matches!(
                h.manager.request_create("alice", id).await,
                Err(LifecycleError::ChallengeNotEligible(_))
            ));
        }
        assert!(h.runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cooldown_applies_to_create_remove_and_renew() {
        let h = harness(Duration::from_secs(60)).await;

        h.manager.request_create("alice", 1).await.unwrap();
        h.clock.advance_secs(10);

        assert!(matches!(
            h.manager.request_remove("alice").await,
            Err(LifecycleError::RateLimited { retry_after_secs: 50 })
        ));
        assert!(matches!(
            h.manager.request_renew("alice", 1).await,
            Err(LifecycleError::RateLimited { .. })
        ));
        assert!(h.manager.ledger().find_by_owner("alice").await.unwrap().is_some());

        h.clock.advance_secs(50);
        h.manager.request_remove("alice").await.unwrap();
        assert!(h.manager.ledger().find_by_owner("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_capacity_excludes_own_container() {
        let h = harness(Duration::ZERO).await;
        h.manager
            .save_configs(BTreeMap::from([(
                "docker_max_container_count".to_string(),
                "1".to_string(),
            )]))
            .await
            .unwrap();

        h.manager.request_create("alice", 1).await.unwrap();
        // Replacing her own container is allowed at capacity
        h.manager.request_create("alice", 2).await.unwrap();

        assert!(matches!(
            h.manager.request_create("bob", 1).await,
            Err(LifecycleError::CapacityExceeded { max: 1 })
        ));
        assert!(h.manager.ledger().find_by_owner("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_runtime_failure_leaves_no_record() {
        let h = harness(Duration::ZERO).await;
        h.runtime.fail_creates(1);

        assert!(matches!(
            h.manager.request_create("alice", 1).await,
            Err(LifecycleError::RuntimeFailure(_))
        ));
        assert!(h.manager.ledger().find_by_owner("alice").await.unwrap().is_none());
        assert!(h.runtime.workloads().is_empty());
    }

    #[tokio::test]
    async fn test_renew_checks_challenge_and_cap() {
        let h = harness(Duration::ZERO).await;
        h.manager
            .save_configs(BTreeMap::from([(
                "docker_max_renew_count".to_string(),
                "1".to_string(),
            )]))
            .await
            .unwrap();

        assert!(matches!(
            h.manager.request_renew("alice", 1).await,
            Err(LifecycleError::NoActiveContainer)
        ));

        h.manager.request_create("alice", 1).await.unwrap();
        h.clock.advance_secs(600);

        assert!(matches!(
            h.manager.request_renew("alice", 2).await,
            Err(LifecycleError::ChallengeMismatch { requested: 2, active: 1 })
        ));

        let info = h.manager.request_renew("alice", 1).await.unwrap();
        assert_eq!(info.remaining_seconds, 3600);

        assert!(matches!(
            h.manager.request_renew("alice", 1).await,
            Err(LifecycleError::RenewalLimitExceeded { max: 1 })
        ));
        let record = h.manager.ledger().find_by_owner("alice").await.unwrap().unwrap();
        assert_eq!(record.renew_count, 1);
    }

    #[tokio::test]
    async fn test_status_for_other_challenge_is_absent() {
        let h = harness(Duration::ZERO).await;
        h.manager.request_create("alice", 2).await.unwrap();
        h.runtime.clear_calls();

        assert_eq!(h.manager.request_status("alice", 1).await.unwrap(), None);
        assert!(h.manager.request_status("alice", 2).await.unwrap().is_some());
        assert!(h.runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_save_configs_rejects_invalid_values() {
        let h = harness(Duration::ZERO).await;

        let result = h
            .manager
            .save_configs(BTreeMap::from([(
                "docker_max_renew_count".to_string(),
                "many".to_string(),
            )]))
            .await;

        assert!(matches!(result, Err(LifecycleError::InvalidConfig(_))));
        assert_eq!(
            h.manager.list_configs().await.unwrap()["docker_max_renew_count"],
            "5"
        );
    }

    #[tokio::test]
    async fn test_list_live_containers_pages() {
        let h = harness(Duration::ZERO).await;
        h.manager.request_create("alice", 1).await.unwrap();
        h.clock.advance_secs(5);
        h.manager.request_create("bob", 2).await.unwrap();

        let page = h.manager.list_live_containers(PageRequest::default()).await.unwrap();
        assert_eq!(page.meta.total_items, 2);
        assert_eq!(page.containers[0].record.user_id, "alice");
        assert_eq!(page.containers[0].remaining_seconds, 3595);
        assert_eq!(page.containers[1].record.user_id, "bob");

        let second = h.manager.list_live_containers(PageRequest::new(2)).await.unwrap();
        assert!(second.containers.is_empty());
    }

    #[tokio::test]
    async fn test_listing_far_page_is_empty() {
        let h = harness(Duration::ZERO).await;
        h.manager.request_create("alice", 1).await.unwrap();

        let page = h
            .manager
            .list_live_containers(PageRequest::new(i64::MAX))
            .await
            .unwrap();

        assert!(page.containers.is_empty());
        assert_eq!(page.meta.total_items, 1);
        assert!(!page.meta.has_next_page);
    }

    #[tokio::test]
    async fn test_force_operations_bypass_cooldown() {
        let h = harness(Duration::from_secs(60)).await;
        h.manager.request_create("alice", 1).await.unwrap();

        h.manager.force_renew("alice", 1).await.unwrap();
        assert!(h.manager.force_remove("alice").await.unwrap());
        assert!(!h.manager.force_remove("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_reclaims_expired_container() {
        let h = harness(Duration::ZERO).await;
        h.manager.request_create("alice", 1).await.unwrap();
        h.clock.advance_secs(3601);

        let report = h.manager.sweep_expired().await.unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(report.reclaimed, 1);
        assert!(h.runtime.workloads().is_empty());

        let empty = h.manager.sweep_expired().await.unwrap();
        assert_eq!(empty, SweepReport::default());
    }

    #[tokio::test]
    async fn test_sweep_continues_past_failed_teardown() {
        let h = harness(Duration::ZERO).await;
        h.manager.request_create("alice", 1).await.unwrap();
        h.manager.request_create("bob", 1).await.unwrap();
        h.clock.advance_secs(3601);

        // Both attempts at alice's teardown fail, bob's goes through
        h.runtime.fail_removes(2);
        let report = h.manager.sweep_expired().await.unwrap();

        assert_eq!(report.expired, 2);
        assert_eq!(report.reclaimed, 2);
        assert_eq!(report.leaked, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(h.manager.ledger().find_by_owner("alice").await.unwrap(), None);
        assert_eq!(h.manager.ledger().find_by_owner("bob").await.unwrap(), None);

        let leftover = h.runtime.workloads();
        assert_eq!(leftover.len(), 1);
        assert_eq!(leftover[0].owner(), Some("alice"));
    }

    #[tokio::test]
    async fn test_sweep_skips_record_renewed_after_scan() {
        let h = harness(Duration::ZERO).await;
        h.manager.request_create("alice", 1).await.unwrap();
        h.manager.request_create("bob", 1).await.unwrap();
        h.clock.advance_secs(3601);
        let manager = Arc::new(h.manager);

        let lock = manager.owner_lock("alice").await;
        let guard = lock.lock().await;

        let sweep = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.sweep_expired().await })
        };

        // The sweep has scanned once it holds a handle to alice's lock
        while Arc::strong_count(&lock) < 3 {
            tokio::task::yield_now().await;
        }
        let renewed = manager
            .ledger()
            .renew("alice", 1, h.clock.now(), 5)
            .await
            .unwrap();
        assert!(renewed);
        drop(guard);

        let report = sweep.await.unwrap().unwrap();
        assert_eq!(report.expired, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.reclaimed, 1);
        assert!(manager.ledger().find_by_owner("alice").await.unwrap().is_some());
        assert_eq!(manager.ledger().find_by_owner("bob").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_lifetime_is_rejected_and_sweep_keeps_working() {
        let h = harness(Duration::ZERO).await;
        h.manager.request_create("alice", 1).await.unwrap();

        let result = h
            .manager
            .save_configs(BTreeMap::from([(
                "docker_timeout".to_string(),
                "10000000000000000".to_string(),
            )]))
            .await;
        assert!(matches!(result, Err(LifecycleError::InvalidConfig(_))));

        h.clock.advance_secs(3601);
        let report = h.manager.sweep_expired().await.unwrap();
        assert_eq!(report.reclaimed, 1);
    }

    #[tokio::test]
    async fn test_cleanup_orphaned_workloads() {
        let h = harness(Duration::ZERO).await;
        h.manager.request_create("alice", 1).await.unwrap();
        h.manager.request_create("bob", 1).await.unwrap();
        h.manager.ledger().delete_by_owner("bob").await.unwrap();

        let dry = h.manager.cleanup_orphaned_workloads(true).await.unwrap();
        assert_eq!(dry.found, 1);
        assert_eq!(dry.removed, 0);
        assert_eq!(h.runtime.workloads().len(), 2);

        let report = h.manager.cleanup_orphaned_workloads(false).await.unwrap();
        assert_eq!(report.removed, 1);
        let remaining = h.runtime.workloads();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].owner(), Some("alice"));
        assert!(h
            .runtime
            .calls()
            .iter()
            .any(|c| matches!(c, RuntimeCall::RemoveWorkload(_))));
    }
}
