// ABOUTME: Challenge catalog with the docker-backed variant containers are launched from
// ABOUTME: Resolves which challenges are playable and parses Docker resource notation

use crate::error::{LifecycleError, Result};
use dockyard_storage::StorageError;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeState {
    Visible,
    Hidden,
    Locked,
}

impl ChallengeState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Visible => "visible",
            Self::Hidden => "hidden",
            Self::Locked => "locked",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> std::result::Result<Self, StorageError> {
        match s {
            "visible" => Ok(Self::Visible),
            "hidden" => Ok(Self::Hidden),
            "locked" => Ok(Self::Locked),
            _ => Err(StorageError::InvalidData(format!("challenge state '{}'", s))),
        }
    }

    /// Hidden and locked challenges cannot be played
    pub fn is_playable(&self) -> bool {
        matches!(self, Self::Visible)
    }
}

/// Container parameters of a docker-backed challenge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockerSpec {
    pub image: String,
    /// Port the service listens on inside the container
    pub redirect_port: u16,
    /// Docker notation, e.g. `128m`
    pub memory_limit: String,
    /// Fractional CPU cores
    pub cpu_limit: f64,
}

impl DockerSpec {
    pub fn memory_bytes(&self) -> Result<i64> {
        parse_memory_limit(&self.memory_limit)
    }

    pub fn nano_cpus(&self) -> i64 {
        (self.cpu_limit * 1e9) as i64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: i64,
    pub name: String,
    pub state: ChallengeState,
    /// Present only for challenges that run in a container
    pub docker: Option<DockerSpec>,
}

/// Parse Docker memory notation (`512`, `512k`, `128m`, `1g`, optional trailing `b`) into bytes
pub fn parse_memory_limit(raw: &str) -> Result<i64> {
    let value = raw.trim().to_ascii_lowercase();
    let value = value.strip_suffix('b').unwrap_or(&value);

    let (digits, multiplier) = match value.chars().last() {
        Some('k') => (&value[..value.len() - 1], 1024_i64),
        Some('m') => (&value[..value.len() - 1], 1024 * 1024),
        Some('g') => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        _ => (value, 1),
    };

    digits
        .parse::<i64>()
        .ok()
        .filter(|n| *n > 0)
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| LifecycleError::InvalidConfig(format!("invalid memory limit '{}'", raw)))
}

pub struct ChallengeStore {
    pool: SqlitePool,
}

impl ChallengeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: i64) -> Result<Option<Challenge>> {
        let row = sqlx::query(
            "SELECT c.id, c.name, c.state,
                    d.docker_image, d.redirect_port, d.memory_limit, d.cpu_limit
             FROM challenges c
             LEFT JOIN docker_challenges d ON d.challenge_id = c.id
             WHERE c.id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_challenge).transpose()
    }

    /// Insert or replace a challenge and its docker variant
    pub async fn save(&self, challenge: &Challenge) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO challenges (id, name, state) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, state = excluded.state",
        )
        .bind(challenge.id)
        .bind(&challenge.name)
        .bind(challenge.state.as_str())
        .execute(&mut *tx)
        .await?;

        match &challenge.docker {
            Some(spec) => {
                parse_memory_limit(&spec.memory_limit)?;
                if spec.redirect_port == 0 || spec.cpu_limit <= 0.0 {
                    return Err(LifecycleError::InvalidConfig(format!(
                        "challenge {} needs a non-zero redirect port and cpu limit",
                        challenge.id
                    )));
                }

                sqlx::query(
                    "INSERT INTO docker_challenges
                        (challenge_id, docker_image, redirect_port, memory_limit, cpu_limit)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(challenge_id) DO UPDATE SET
                        docker_image = excluded.docker_image,
                        redirect_port = excluded.redirect_port,
                        memory_limit = excluded.memory_limit,
                        cpu_limit = excluded.cpu_limit",
                )
                .bind(challenge.id)
                .bind(&spec.image)
                .bind(spec.redirect_port as i64)
                .bind(&spec.memory_limit)
                .bind(spec.cpu_limit)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM docker_challenges WHERE challenge_id = ?1")
                    .bind(challenge.id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        debug!("Saved challenge {} ({})", challenge.id, challenge.name);
        Ok(())
    }

    /// The docker spec of a playable docker challenge, or `ChallengeNotEligible`
    pub async fn eligible_docker_challenge(&self, id: i64) -> Result<DockerSpec> {
        match self.get(id).await? {
            Some(Challenge {
                state,
                docker: Some(spec),
                ..
            }) if state.is_playable() => Ok(spec),
            _ => Err(LifecycleError::ChallengeNotEligible(id)),
        }
    }
}

fn row_to_challenge(row: sqlx::sqlite::SqliteRow) -> Result<Challenge> {
    let docker = match row.get::<Option<String>, _>("docker_image") {
        Some(image) => {
            let port: i64 = row.get("redirect_port");
            let redirect_port = u16::try_from(port).map_err(|_| {
                StorageError::InvalidData(format!("redirect port {} out of range", port))
            })?;
            Some(DockerSpec {
                image,
                redirect_port,
                memory_limit: row.get("memory_limit"),
                cpu_limit: row.get("cpu_limit"),
            })
        }
        None => None,
    };

    Ok(Challenge {
        id: row.get("id"),
        name: row.get("name"),
        state: ChallengeState::from_str(&row.get::<String, _>("state"))?,
        docker,
    })
}
