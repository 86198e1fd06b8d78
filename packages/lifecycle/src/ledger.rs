// ABOUTME: Container ledger tracking every live challenge container in SQLite
// ABOUTME: Owner, challenge, port, flag, correlation token, start time and renewal count per row

use crate::error::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use dockyard_storage::StorageError;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use tracing::debug;

/// One tracked container instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: i64,
    pub user_id: String,
    pub challenge_id: i64,
    pub port: u16,
    pub flag: String,
    /// Correlation token naming and labelling the workload
    pub uuid: String,
    pub start_time: DateTime<Utc>,
    pub renew_count: i64,
}

impl ContainerRecord {
    pub fn expires_at(&self, lifetime: chrono::Duration) -> DateTime<Utc> {
        self.start_time + lifetime
    }

    /// Strictly past the window, matching the sweep query `start_time < now - lifetime`
    pub fn is_expired(&self, now: DateTime<Utc>, lifetime: chrono::Duration) -> bool {
        self.expires_at(lifetime) < now
    }

    /// Whole seconds left in the lifetime window, never negative
    pub fn remaining_seconds(&self, now: DateTime<Utc>, lifetime: chrono::Duration) -> i64 {
        (self.expires_at(lifetime) - now).num_seconds().max(0)
    }
}

#[derive(Debug, Clone)]
pub struct NewContainer {
    pub user_id: String,
    pub challenge_id: i64,
    pub port: u16,
    pub flag: String,
    pub uuid: String,
    pub start_time: DateTime<Utc>,
}

/// Fixed-precision encoding so text order matches time order
pub(crate) fn encode_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn decode_time(raw: &str) -> std::result::Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidData(format!("timestamp '{}': {}", raw, e)))
}

const SELECT_COLUMNS: &str =
    "SELECT id, user_id, challenge_id, port, flag, uuid, start_time, renew_count FROM containers";

pub struct ContainerLedger {
    pool: SqlitePool,
}

impl ContainerLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, new: NewContainer) -> Result<ContainerRecord> {
        let result = sqlx::query(
            "INSERT INTO containers (user_id, challenge_id, port, flag, uuid, start_time, renew_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
        )
        .bind(&new.user_id)
        .bind(new.challenge_id)
        .bind(new.port as i64)
        .bind(&new.flag)
        .bind(&new.uuid)
        .bind(encode_time(new.start_time))
        .execute(&self.pool)
        .await?;

        debug!(
            "Recorded container {} for user {} on port {}",
            new.uuid, new.user_id, new.port
        );

        Ok(ContainerRecord {
            id: result.last_insert_rowid(),
            user_id: new.user_id,
            challenge_id: new.challenge_id,
            port: new.port,
            flag: new.flag,
            uuid: new.uuid,
            start_time: new.start_time,
            renew_count: 0,
        })
    }

    /// The owner's most recent record, expired or not
    pub async fn find_by_owner(&self, user_id: &str) -> Result<Option<ContainerRecord>> {
        let row = sqlx::query(&format!(
            "{} WHERE user_id = ?1 ORDER BY id DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_record).transpose()
    }

    pub async fn find_by_token(&self, uuid: &str) -> Result<Option<ContainerRecord>> {
        let row = sqlx::query(&format!("{} WHERE uuid = ?1", SELECT_COLUMNS))
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_record).transpose()
    }

    /// Delete every record of the owner, returning how many were removed
    pub async fn delete_by_owner(&self, user_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM containers WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete a single record by correlation token
    pub async fn delete_by_token(&self, uuid: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM containers WHERE uuid = ?1")
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Move the start time and bump the renewal count, only while the count is below `max_renewals`
    ///
    /// Returns false when no row matched, either because the owner has no record for
    /// the challenge or because the cap was already reached.
    pub async fn renew(
        &self,
        user_id: &str,
        challenge_id: i64,
        new_start: DateTime<Utc>,
        max_renewals: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE containers
             SET start_time = ?1, renew_count = renew_count + 1
             WHERE user_id = ?2 AND challenge_id = ?3 AND renew_count < ?4",
        )
        .bind(encode_time(new_start))
        .bind(user_id)
        .bind(challenge_id)
        .bind(max_renewals)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Records whose start time is strictly before `threshold`
    pub async fn list_expired(&self, threshold: DateTime<Utc>) -> Result<Vec<ContainerRecord>> {
        let rows = sqlx::query(&format!(
            "{} WHERE start_time < ?1 ORDER BY start_time ASC, id ASC",
            SELECT_COLUMNS
        ))
        .bind(encode_time(threshold))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }

    /// Number of records started at or after `threshold`, i.e. not yet expired
    pub async fn count_alive(&self, threshold: DateTime<Utc>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM containers WHERE start_time >= ?1")
            .bind(encode_time(threshold))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn list_alive_page(
        &self,
        threshold: DateTime<Utc>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ContainerRecord>> {
        let rows = sqlx::query(&format!(
            "{} WHERE start_time >= ?1 ORDER BY start_time ASC, id ASC LIMIT ?2 OFFSET ?3",
            SELECT_COLUMNS
        ))
        .bind(encode_time(threshold))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }

    /// Ports held by any record, expired or not, since an unswept workload may still bind it
    pub async fn reserved_ports(&self) -> Result<HashSet<u16>> {
        let ports: Vec<i64> = sqlx::query_scalar("SELECT DISTINCT port FROM containers")
            .fetch_all(&self.pool)
            .await?;
        Ok(ports
            .into_iter()
            .filter_map(|p| u16::try_from(p).ok())
            .collect())
    }

    /// Every correlation token currently in the ledger
    pub async fn tokens(&self) -> Result<HashSet<String>> {
        let tokens: Vec<String> = sqlx::query_scalar("SELECT uuid FROM containers")
            .fetch_all(&self.pool)
            .await?;
        Ok(tokens.into_iter().collect())
    }
}

fn row_to_record(row: sqlx::sqlite::SqliteRow) -> Result<ContainerRecord> {
    let port: i64 = row.get("port");
    let port = u16::try_from(port)
        .map_err(|_| StorageError::InvalidData(format!("port {} out of range", port)))?;

    Ok(ContainerRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        challenge_id: row.get("challenge_id"),
        port,
        flag: row.get("flag"),
        uuid: row.get("uuid"),
        start_time: decode_time(&row.get::<String, _>("start_time"))?,
        renew_count: row.get("renew_count"),
    })
}
