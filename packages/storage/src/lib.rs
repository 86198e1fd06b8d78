// ABOUTME: SQLite connection management and embedded schema migrations
// ABOUTME: Shared storage error type for every Dockyard persistence layer

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub use sqlx::migrate::Migrator;

/// Schema migrations, embedded at compile time
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Connection pool settings
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub max_connections: u32,
    pub busy_timeout_seconds: u64,
    pub enable_wal: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_connections: 8,
            busy_timeout_seconds: 30,
            enable_wal: true,
        }
    }
}

/// Open (creating if needed) the database at `database_url` and apply all migrations
pub async fn connect(database_url: &str, config: &StorageConfig) -> StorageResult<SqlitePool> {
    debug!("Connecting to database at: {}", database_url);

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(config.busy_timeout_seconds));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.busy_timeout_seconds))
        .connect_with(options)
        .await?;

    if config.enable_wal {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await?;
    }

    migrate(&pool).await?;
    info!("Database ready at {}", database_url);

    Ok(pool)
}

/// Apply pending migrations to an existing pool
pub async fn migrate(pool: &SqlitePool) -> StorageResult<()> {
    MIGRATOR.run(pool).await?;
    Ok(())
}

/// Single-connection in-memory database with the schema applied
///
/// An in-memory SQLite database lives only as long as its connection, so the
/// pool is capped at one connection to keep every query on the same database.
pub async fn connect_in_memory() -> StorageResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn test_in_memory_database_has_schema() {
        let pool = connect_in_memory().await.unwrap();

        let tables: Vec<String> = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '\\_%' ESCAPE '\\' AND name != 'sqlite_sequence' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap()
        .into_iter()
        .map(|row| row.get("name"))
        .collect();

        assert_eq!(
            tables,
            vec!["challenges", "container_configs", "containers", "docker_challenges"]
        );
    }

    #[tokio::test]
    async fn test_default_configs_are_seeded() {
        let pool = connect_in_memory().await.unwrap();

        let timeout: String =
            sqlx::query_scalar("SELECT value FROM container_configs WHERE key = 'docker_timeout'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(timeout, "3600");
    }

    #[tokio::test]
    async fn test_connect_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dockyard.db");
        let url = format!("sqlite://{}", path.display());

        let pool = connect(&url, &StorageConfig::default()).await.unwrap();
        assert!(path.exists());

        // Running migrations twice is a no-op
        migrate(&pool).await.unwrap();
    }
}
