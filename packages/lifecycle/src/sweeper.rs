// ABOUTME: Periodic expiry sweep reclaiming containers past their lifetime window
// ABOUTME: Background task funnelling every expired record through the controller's teardown path

use crate::error::Result;
use crate::manager::ContainerManager;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time;
use tracing::{debug, error, info};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Outcome of one sweep tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Records past their window when the tick started
    pub expired: usize,
    pub reclaimed: usize,
    /// Reclaimed records whose workload teardown was abandoned
    pub leaked: usize,
    /// Records renewed or replaced between the scan and their teardown
    pub skipped: usize,
    pub failed: usize,
}

pub struct ExpirySweeper {
    manager: Arc<ContainerManager>,
    interval: Duration,
    running: Arc<RwLock<bool>>,
}

impl ExpirySweeper {
    pub fn new(manager: Arc<ContainerManager>, interval: Duration) -> Self {
        Self {
            manager,
            interval,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Spawn the sweep loop; calling it while already running does nothing
    pub async fn start(&self) {
        let mut running = self.running.write().await;
        if *running {
            return;
        }
        *running = true;
        drop(running);

        info!("Starting expiry sweeper (interval: {:?})", self.interval);

        let manager = self.manager.clone();
        let running_flag = self.running.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            loop {
                if !*running_flag.read().await {
                    info!("Expiry sweeper stopped");
                    break;
                }

                if let Err(e) = sweep(&manager).await {
                    error!("Expiry sweep failed: {}", e);
                }

                time::sleep(interval).await;
            }
        });
    }

    /// Ask the loop to exit after its current tick
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Run a single tick immediately
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        sweep(&self.manager).await
    }
}

async fn sweep(manager: &ContainerManager) -> Result<SweepReport> {
    let report = manager.sweep_expired().await?;
    if report.expired > 0 {
        info!(
            "Sweep reclaimed {} of {} expired container(s) (leaked: {}, skipped: {}, failed: {})",
            report.reclaimed, report.expired, report.leaked, report.skipped, report.failed
        );
    } else {
        debug!("Sweep tick: nothing expired");
    }
    Ok(report)
}
