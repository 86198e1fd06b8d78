// ABOUTME: Picks a free externally reachable port for a new challenge container
// ABOUTME: Random sampling with a connect probe, bounded by a maximum attempt count

use crate::error::{LifecycleError, Result};
use rand::Rng;
use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

pub const DEFAULT_PORT_RANGE: RangeInclusive<u16> = 10000..=50000;
pub const DEFAULT_MAX_ATTEMPTS: usize = 256;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct PortAllocator {
    range: RangeInclusive<u16>,
    max_attempts: usize,
    probe_timeout: Duration,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_PORT_RANGE, DEFAULT_MAX_ATTEMPTS, DEFAULT_PROBE_TIMEOUT)
    }
}

impl PortAllocator {
    pub fn new(range: RangeInclusive<u16>, max_attempts: usize, probe_timeout: Duration) -> Self {
        Self {
            range,
            max_attempts: max_attempts.max(1),
            probe_timeout,
        }
    }

    /// Sample ports until one is neither reserved nor answering on `host`
    pub async fn allocate(&self, host: &str, reserved: &HashSet<u16>) -> Result<u16> {
        for attempt in 1..=self.max_attempts {
            let port = rand::thread_rng().gen_range(self.range.clone());

            if reserved.contains(&port) {
                debug!("Port {} is held by a ledger record (attempt {})", port, attempt);
                continue;
            }

            if self.is_listening(host, port).await {
                debug!("Port {} on {} is in use (attempt {})", port, host, attempt);
                continue;
            }

            debug!("Allocated port {} on {} after {} attempt(s)", port, host, attempt);
            return Ok(port);
        }

        Err(LifecycleError::AllocationFailure {
            attempts: self.max_attempts,
        })
    }

    /// A refused or timed-out connection means nothing is listening
    async fn is_listening(&self, host: &str, port: u16) -> bool {
        matches!(
            tokio::time::timeout(self.probe_timeout, TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        )
    }
}
