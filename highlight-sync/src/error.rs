// Error taxonomy for the capture-and-sync pipeline
// Only DeliveryError::Network leads to a highlight being queued

use thiserror::Error;

/// Failure talking to the remote highlights API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// No credential available; never queued
    #[error("Not signed in. Connect an account before saving highlights.")]
    Auth,
    /// Transport failure (connect, DNS, timeout); the only retryable class
    #[error("Network error: {0}")]
    Network(String),
    /// Server answered with a non-success status
    #[error("{message}")]
    Server { status: u16, message: String },
    /// Request could not be built or followed (bad `apiUrl`); never queued
    #[error("Invalid API configuration: {0}")]
    Config(String),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Network(_))
    }
}

/// Persisted key-value storage could not be read or written.
#[derive(Debug, Error)]
#[error("Storage error: {0:#}")]
pub struct StoreError(#[from] anyhow::Error);

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Offline queue is full ({0} highlights). Sync before saving more.")]
    Full(usize),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a `saveHighlight` request did not end in a delivered or queued highlight.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("{0}")]
    Validation(String),
    #[error("Highlighting is disabled")]
    Disabled,
    #[error(transparent)]
    Delivery(DeliveryError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Screenshot capture failure. Never surfaced to the user, only logged.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no selection geometry to pair the screenshot with")]
    MissingRect,
    #[error("capture not permitted on restricted page {0}")]
    Restricted(String),
    #[error("screen capture unavailable: {0}")]
    Unavailable(String),
    #[error("capture command failed: {0}")]
    Command(String),
    #[error("failed to encode screenshot: {0}")]
    Encode(String),
}
