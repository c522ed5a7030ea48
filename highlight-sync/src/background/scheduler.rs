// Retry scheduler: decides when the offline queue is drained
// Triggers are process start, a recurring timer, and explicit "sync now" requests

use super::queue::{DrainReport, SyncQueue};
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use log::{error, info};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Periodic,
    Manual,
}

/// Bookkeeping for the most recent drain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastDrain {
    pub trigger: Trigger,
    pub finished_at: DateTime<Utc>,
    pub report: DrainReport,
}

pub struct RetryScheduler {
    queue: Arc<SyncQueue>,
    interval: Duration,
    clock: Arc<dyn Clock>,
    last: Mutex<Option<LastDrain>>,
}

impl RetryScheduler {
    pub fn new(queue: Arc<SyncQueue>, interval: Duration) -> Self {
        Self::with_clock(queue, interval, Arc::new(SystemClock))
    }

    /// Create a scheduler with a custom clock (for testing)
    pub fn with_clock(queue: Arc<SyncQueue>, interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            queue,
            interval,
            clock,
            last: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn queue(&self) -> &Arc<SyncQueue> {
        &self.queue
    }

    pub fn last_drain(&self) -> Option<LastDrain> {
        self.last.lock().ok().and_then(|last| last.clone())
    }

    /// Run one drain for `trigger` and record its outcome.
    pub async fn trigger(&self, trigger: Trigger) -> Result<DrainReport, StoreError> {
        let started = self.clock.now();
        let report = self.queue.drain().await?;

        if report.skipped.is_none() {
            info!(
                "{:?} drain took {:?}: {} delivered, {} expired, {} remaining",
                trigger,
                self.clock.now().saturating_duration_since(started),
                report.delivered,
                report.expired,
                report.remaining
            );
        }

        if let Ok(mut last) = self.last.lock() {
            *last = Some(LastDrain {
                trigger,
                finished_at: self.clock.now_utc(),
                report: report.clone(),
            });
        }
        Ok(report)
    }

    /// Drain once on start, then on every interval until cancelled.
    ///
    /// Ticks missed while a drain is running are delayed, not bursted.
    pub async fn run(self: Arc<Self>, cancel_token: CancellationToken) {
        if let Err(e) = self.trigger(Trigger::Startup).await {
            error!("Startup drain failed: {}", e);
        }

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.trigger(Trigger::Periodic).await {
                        error!("Periodic drain failed: {}", e);
                    }
                }
                _ = cancel_token.cancelled() => {
                    info!("Retry scheduler shutting down");
                    break;
                }
            }
        }
    }
}
