// ABOUTME: Error taxonomy surfaced by the container lifecycle controller
// ABOUTME: Every variant renders a message suitable for showing to the requesting user

use crate::runtime::RuntimeError;
use dockyard_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Frequency limit, you should wait {retry_after_secs} more seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Challenge {0} is not available")]
    ChallengeNotEligible(i64),

    #[error("Your active container belongs to challenge {active}, not challenge {requested}")]
    ChallengeMismatch { requested: i64, active: i64 },

    #[error("No active container")]
    NoActiveContainer,

    #[error("Max renewal times exceeded ({max})")]
    RenewalLimitExceeded { max: i64 },

    #[error("Max container count exceeded ({max})")]
    CapacityExceeded { max: i64 },

    #[error("Container start failed: {0}")]
    RuntimeFailure(#[source] RuntimeError),

    #[error("No free port found after {attempts} attempts")]
    AllocationFailure { attempts: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<sqlx::Error> for LifecycleError {
    fn from(err: sqlx::Error) -> Self {
        LifecycleError::Storage(StorageError::Database(err))
    }
}

impl LifecycleError {
    /// Stable machine-readable code for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::ChallengeNotEligible(_) => "CHALLENGE_NOT_ELIGIBLE",
            Self::ChallengeMismatch { .. } => "CHALLENGE_MISMATCH",
            Self::NoActiveContainer => "NO_ACTIVE_CONTAINER",
            Self::RenewalLimitExceeded { .. } => "RENEWAL_LIMIT_EXCEEDED",
            Self::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Self::RuntimeFailure(_) => "RUNTIME_FAILURE",
            Self::AllocationFailure { .. } => "ALLOCATION_FAILURE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
