// ABOUTME: Configuration store for container settings backed by SQLite
// ABOUTME: Key/value CRUD plus a typed view of the docker_* keys the controller depends on

use crate::error::{LifecycleError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

pub const DOCKER_API_URL: &str = "docker_api_url";
pub const DOCKER_CLIENT_IP: &str = "docker_client_ip";
pub const DOCKER_MAX_CONTAINER_COUNT: &str = "docker_max_container_count";
pub const DOCKER_MAX_RENEW_COUNT: &str = "docker_max_renew_count";
pub const DOCKER_AUTO_CONNECT_CONTAINERS: &str = "docker_auto_connect_containers";
pub const DOCKER_TIMEOUT: &str = "docker_timeout";

/// Lifetime window used when `docker_timeout` is absent
pub const DEFAULT_LIFETIME_SECS: u64 = 3600;

/// Longest accepted lifetime window (one year)
pub const MAX_LIFETIME_SECS: u64 = 365 * 24 * 3600;

/// Parsed view of the container settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockerSettings {
    /// Runtime endpoint; `None` means the local Docker defaults
    pub api_url: Option<String>,
    /// Host clients connect to, also the target of port probes
    pub client_ip: String,
    pub max_container_count: i64,
    pub max_renew_count: i64,
    /// Peers disconnected from a per-owner network before it is removed
    pub auto_connect_containers: Vec<String>,
    pub lifetime: Duration,
}

impl DockerSettings {
    pub fn from_map(configs: &BTreeMap<String, String>) -> Result<Self> {
        let api_url = configs
            .get(DOCKER_API_URL)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let client_ip = configs
            .get(DOCKER_CLIENT_IP)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| LifecycleError::InvalidConfig(format!("{} is not set", DOCKER_CLIENT_IP)))?;

        let max_container_count = parse_non_negative(configs, DOCKER_MAX_CONTAINER_COUNT)?;
        let max_renew_count = parse_non_negative(configs, DOCKER_MAX_RENEW_COUNT)?;

        let auto_connect_containers = configs
            .get(DOCKER_AUTO_CONNECT_CONTAINERS)
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let lifetime_secs = match configs.get(DOCKER_TIMEOUT) {
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|_| {
                    LifecycleError::InvalidConfig(format!("{} must be an integer: {}", DOCKER_TIMEOUT, raw))
                })?;
                if secs == 0 || secs > MAX_LIFETIME_SECS {
                    return Err(LifecycleError::InvalidConfig(format!(
                        "{} must be between 1 and {} seconds: {}",
                        DOCKER_TIMEOUT, MAX_LIFETIME_SECS, raw
                    )));
                }
                secs
            }
            None => DEFAULT_LIFETIME_SECS,
        };

        Ok(Self {
            api_url,
            client_ip,
            max_container_count,
            max_renew_count,
            auto_connect_containers,
            lifetime: Duration::from_secs(lifetime_secs),
        })
    }

    /// Lifetime window as a chrono duration, for timestamp arithmetic
    pub fn lifetime_chrono(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lifetime.as_secs().min(MAX_LIFETIME_SECS) as i64)
    }

    /// Records started before this instant are expired at `now`
    pub fn expiry_threshold(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.lifetime_chrono())
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

fn parse_non_negative(configs: &BTreeMap<String, String>, key: &str) -> Result<i64> {
    let raw = configs
        .get(key)
        .ok_or_else(|| LifecycleError::InvalidConfig(format!("{} is not set", key)))?;

    match raw.trim().parse::<i64>() {
        Ok(value) if value >= 0 => Ok(value),
        _ => Err(LifecycleError::InvalidConfig(format!(
            "{} must be a non-negative integer: {}",
            key, raw
        ))),
    }
}

/// Key/value configuration store
pub struct SettingsStore {
    pool: SqlitePool,
}

impl SettingsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All configuration entries, ordered by key
    pub async fn list_configs(&self) -> Result<BTreeMap<String, String>> {
        debug!("Fetching all container configs");

        let rows = sqlx::query("SELECT key, value FROM container_configs ORDER BY key")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("key"), row.get("value")))
            .collect())
    }

    pub async fn get_config(&self, key: &str) -> Result<String> {
        sqlx::query_scalar("SELECT value FROM container_configs WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("config key '{}'", key)))
    }

    /// Upsert every pair in one transaction
    pub async fn save_configs<I, K, V>(&self, configs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut tx = self.pool.begin().await?;
        let mut saved = 0usize;

        for (key, value) in configs {
            sqlx::query(
                "INSERT INTO container_configs (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(key.as_ref())
            .bind(value.as_ref())
            .execute(&mut *tx)
            .await?;
            saved += 1;
        }

        tx.commit().await?;
        debug!("Saved {} container configs", saved);
        Ok(())
    }

    /// Typed docker settings parsed from the current entries
    pub async fn docker_settings(&self) -> Result<DockerSettings> {
        let configs = self.list_configs().await?;
        DockerSettings::from_map(&configs)
    }
}
