// ABOUTME: Per-owner cooldown shared by create, remove and renew requests
// ABOUTME: Keyed governor limiter admitting one request per window, driven by the lifecycle clock

use crate::clock::Clock;
use crate::error::{LifecycleError, Result};
use chrono::{DateTime, Utc};
use governor::{
    clock::Clock as GovernorClock,
    middleware::NoOpMiddleware,
    nanos::Nanos,
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Presents a lifecycle `Clock` to governor as nanoseconds since construction
#[derive(Debug, Clone)]
pub struct CooldownClock {
    clock: Arc<dyn Clock>,
    origin: DateTime<Utc>,
}

impl CooldownClock {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let origin = clock.now();
        Self { clock, origin }
    }
}

impl GovernorClock for CooldownClock {
    type Instant = Nanos;

    fn now(&self) -> Nanos {
        // A clock set before the origin reads as the origin
        let elapsed = (self.clock.now() - self.origin)
            .to_std()
            .unwrap_or(Duration::ZERO);
        Nanos::from(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
    }
}

type OwnerLimiter =
    RateLimiter<String, DefaultKeyedStateStore<String>, CooldownClock, NoOpMiddleware<Nanos>>;

/// Approximate throttling only; it is not relied on for correctness
pub struct Cooldown {
    clock: CooldownClock,
    /// `None` when the window is zero and throttling is off
    limiter: Option<OwnerLimiter>,
}

impl Cooldown {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        let clock = CooldownClock::new(clock);
        let limiter = Quota::with_period(window)
            .map(|quota| RateLimiter::new(quota, DefaultKeyedStateStore::default(), &clock));
        Self { clock, limiter }
    }

    /// Admit the owner and restart their window, or reject while the window is open
    ///
    /// A rejected request leaves the window where it was.
    pub fn try_acquire(&self, owner: &str) -> Result<()> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };

        let outcome = limiter.check_key(&owner.to_string());

        // Entries whose window has passed no longer throttle anyone
        limiter.retain_recent();

        match outcome {
            Ok(()) => Ok(()),
            Err(not_until) => {
                let wait = not_until.wait_time_from(self.clock.now());
                // Round up so a caller never retries a moment too early
                let retry_after_secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
                debug!("User {} throttled for {}s", owner, retry_after_secs);
                Err(LifecycleError::RateLimited {
                    retry_after_secs: retry_after_secs.max(1),
                })
            }
        }
    }
}

impl std::fmt::Debug for Cooldown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cooldown")
            .field("enabled", &self.limiter.is_some())
            .finish()
    }
}
