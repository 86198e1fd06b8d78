// ABOUTME: Time source abstraction used for lifetimes, cooldowns and expiry
// ABOUTME: Production code uses SystemClock; tests inject a manually advanced clock

use chrono::{DateTime, Utc};
use std::fmt;

/// Source of "now" for every lifecycle decision
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
