//! Persistent offline queue of undelivered highlights.
//!
//! The whole queue lives under one storage key and is the single source of
//! truth: it is reloaded from the store on every operation, never kept as a
//! long-lived in-memory copy. Every mutation runs as
//! load-under-lock → mutate → persist-under-lock, so an enqueue racing a
//! drain cannot be lost. Drains are serialized by a second gate so that two
//! triggers never deliver the same item concurrently.
//!
//! Delivery order is the enqueue order and a drain stops at the first
//! failure. Each delivered item is removed by id right after the server
//! accepts it, so a crash mid-drain re-delivers at most the in-flight item.

use super::api::HighlightApi;
use super::config::ConfigStore;
use super::persistence::{KeyValueStore, KEY_HIGHLIGHT_QUEUE};
use crate::clock::Clock;
use crate::error::{DeliveryError, QueueError, StoreError};
use crate::models::{CaptureResult, HighlightDraft, QueuedHighlight};
use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const DEFAULT_MAX_ITEMS: usize = 1000;

/// Bounds on queue growth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    /// Enqueue fails with [`QueueError::Full`] at this length
    pub max_items: usize,
    /// Items older than this are dropped at the start of a drain; `None` retries forever
    pub max_age: Option<Duration>,
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
            max_age: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    pub length: usize,
    pub oldest_queued_at: Option<DateTime<Utc>>,
}

/// Why a drain did not attempt any delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainSkip {
    Empty,
    MissingToken,
    MissingProject,
}

/// Outcome of one drain
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DrainReport {
    pub delivered: usize,
    pub expired: usize,
    pub remaining: usize,
    pub skipped: Option<DrainSkip>,
    /// Failure that stopped the drain
    pub failure: Option<DeliveryError>,
}

pub struct SyncQueue {
    store: Arc<dyn KeyValueStore>,
    config: ConfigStore,
    api: Arc<dyn HighlightApi>,
    clock: Arc<dyn Clock>,
    limits: QueueLimits,
    /// Guards every load → mutate → persist sequence
    state: Mutex<()>,
    /// Held for the duration of a drain
    drain_gate: Mutex<()>,
}

impl SyncQueue {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        api: Arc<dyn HighlightApi>,
        clock: Arc<dyn Clock>,
        limits: QueueLimits,
    ) -> Self {
        Self {
            config: ConfigStore::new(Arc::clone(&store)),
            store,
            api,
            clock,
            limits,
            state: Mutex::new(()),
            drain_gate: Mutex::new(()),
        }
    }

    pub fn limits(&self) -> QueueLimits {
        self.limits
    }

    /// Append a highlight to the end of the queue. Returns the new length.
    pub async fn enqueue(
        &self,
        highlight: HighlightDraft,
        preview: Option<CaptureResult>,
    ) -> Result<usize, QueueError> {
        let _guard = self.state.lock().await;

        let mut items = self.load()?;
        if items.len() >= self.limits.max_items {
            return Err(QueueError::Full(items.len()));
        }

        items.push(QueuedHighlight::new(
            highlight,
            preview,
            self.clock.now_utc(),
        ));
        self.persist(&items)?;
        Ok(items.len())
    }

    /// Copy of the persisted queue, oldest first.
    pub async fn items(&self) -> Result<Vec<QueuedHighlight>, StoreError> {
        let _guard = self.state.lock().await;
        self.load()
    }

    pub async fn status(&self) -> Result<QueueStatus, StoreError> {
        let items = self.items().await?;
        Ok(QueueStatus {
            length: items.len(),
            oldest_queued_at: items.iter().map(|item| item.queued_at).min(),
        })
    }

    /// Deliver queued highlights in order, stopping at the first failure.
    ///
    /// Without a token or a configured project nothing is touched and no
    /// request is made.
    pub async fn drain(&self) -> Result<DrainReport, StoreError> {
        let _drain = self.drain_gate.lock().await;

        let config = self.config.load()?;
        let skip = if config.token().is_none() {
            Some(DrainSkip::MissingToken)
        } else if config.project_id().is_none() {
            Some(DrainSkip::MissingProject)
        } else {
            None
        };

        let (items, expired) = {
            let _guard = self.state.lock().await;
            let mut items = self.load()?;
            if let Some(skip) = skip {
                return Ok(DrainReport {
                    remaining: items.len(),
                    skipped: Some(if items.is_empty() { DrainSkip::Empty } else { skip }),
                    ..DrainReport::default()
                });
            }

            let expired = self.prune_expired(&mut items);
            if expired > 0 {
                self.persist(&items)?;
            }
            if items.is_empty() {
                return Ok(DrainReport {
                    expired,
                    skipped: Some(DrainSkip::Empty),
                    ..DrainReport::default()
                });
            }
            (items, expired)
        };

        info!("Draining {} queued highlight(s)", items.len());
        let mut report = DrainReport {
            expired,
            ..DrainReport::default()
        };

        for item in items {
            match self
                .api
                .create_highlight(&config, &item.highlight, item.preview_data.as_ref())
                .await
            {
                Ok(highlight_id) => {
                    debug!(
                        "Delivered queued highlight {} as {:?}",
                        item.id, highlight_id
                    );
                    self.remove(item.id).await?;
                    report.delivered += 1;
                }
                Err(e) => {
                    warn!(
                        "Delivery of queued highlight {} failed, stopping drain: {}",
                        item.id, e
                    );
                    self.record_failure(item.id).await?;
                    report.failure = Some(e);
                    break;
                }
            }
        }

        report.remaining = self.items().await?.len();
        info!(
            "Drain finished: {} delivered, {} remaining",
            report.delivered, report.remaining
        );
        Ok(report)
    }

    async fn remove(&self, id: Uuid) -> Result<(), StoreError> {
        let _guard = self.state.lock().await;
        let mut items = self.load()?;
        items.retain(|item| item.id != id);
        self.persist(&items)
    }

    async fn record_failure(&self, id: Uuid) -> Result<(), StoreError> {
        let _guard = self.state.lock().await;
        let mut items = self.load()?;
        if let Some(item) = items.iter_mut().find(|item| item.id == id) {
            item.attempts = item.attempts.saturating_add(1);
            self.persist(&items)?;
        }
        Ok(())
    }

    fn prune_expired(&self, items: &mut Vec<QueuedHighlight>) -> usize {
        let Some(max_age) = self.limits.max_age else {
            return 0;
        };
        let Some(cutoff) = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|max_age| self.clock.now_utc().checked_sub_signed(max_age))
        else {
            // Older than any representable instant: nothing can have expired
            return 0;
        };

        let before = items.len();
        items.retain(|item| {
            let keep = item.queued_at >= cutoff;
            if !keep {
                warn!(
                    "Dropping queued highlight {} from {} (queued {})",
                    item.id, item.highlight.source_url, item.queued_at
                );
            }
            keep
        });
        before - items.len()
    }

    fn load(&self) -> Result<Vec<QueuedHighlight>, StoreError> {
        match self.store.get(KEY_HIGHLIGHT_QUEUE)? {
            None => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value)
                .context("Failed to parse persisted highlight queue")
                .map_err(StoreError::from),
        }
    }

    fn persist(&self, items: &[QueuedHighlight]) -> Result<(), StoreError> {
        let value = serde_json::to_value(items).context("Failed to serialize highlight queue")?;
        self.store.set(KEY_HIGHLIGHT_QUEUE, value)
    }
}
