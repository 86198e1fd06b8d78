// ABOUTME: Challenge container lifecycle control core
// ABOUTME: Ledger, port allocation, container runtime adapter, controller and expiry sweeper

pub mod adapter;
pub mod challenges;
pub mod clock;
pub mod error;
pub mod ledger;
pub mod manager;
pub mod pagination;
pub mod ports;
pub mod rate_limit;
pub mod runtime;
pub mod settings;
pub mod sweeper;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapter::{RuntimeAdapter, TeardownOutcome, WorkloadRef, WorkloadRequest};
pub use challenges::{Challenge, ChallengeState, ChallengeStore, DockerSpec};
pub use clock::{Clock, SystemClock};
pub use error::{LifecycleError, Result};
pub use ledger::{ContainerLedger, ContainerRecord, NewContainer};
pub use manager::{
    ConnectionInfo, ContainerManager, ContainerManagerBuilder, ContainerPage, LiveContainer,
    OrphanReport,
};
pub use pagination::{PageRequest, PaginationMeta, PAGE_SIZE};
pub use ports::PortAllocator;
pub use rate_limit::Cooldown;
pub use runtime::{ContainerRuntime, DockerRuntime, RuntimeError};
pub use settings::{DockerSettings, SettingsStore};
pub use sweeper::{ExpirySweeper, SweepReport, DEFAULT_SWEEP_INTERVAL};
