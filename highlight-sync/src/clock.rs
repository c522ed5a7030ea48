//! Clock abstraction so queue timestamps, expiry and sync bookkeeping can be
//! driven deterministically in tests.

use chrono::{DateTime, Utc};
use std::time::Instant;

/// Clock trait for testable time
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Real system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
