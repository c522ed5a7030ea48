//! Request dispatch for the background process.
//!
//! Every request gets exactly one response. Handler failures never escape as
//! errors: they are turned into the action's failure payload
//! (`success: false` plus a message) so the page always has something to
//! show.

use super::api::HighlightApi;
use super::auth::Authenticator;
use super::config::{ConfigPatch, ConfigStore};
use super::persistence::KeyValueStore;
use super::protocol::{
    AuthResponse, ConfigResponse, ExtensionRequest, ExtensionResponse, ProcessQueueResponse,
    ProjectsResponse, QueueStatusResponse, SaveHighlightResponse, SuccessResponse,
};
use super::queue::SyncQueue;
use super::scheduler::{RetryScheduler, Trigger};
use super::screenshot::ScreenshotCapturer;
use crate::error::{DeliveryError, SaveError};
use crate::models::HighlightDraft;
use log::{debug, error, info, warn};
use std::sync::Arc;

const SAVED_MESSAGE: &str = "Highlight saved";
const QUEUED_MESSAGE: &str = "You're offline. Highlight queued and will sync automatically.";

/// Result of a `saveHighlight` that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Delivered { highlight_id: Option<String> },
    Queued { queue_length: usize, reason: String },
}

pub struct MessageRouter {
    config: ConfigStore,
    api: Arc<dyn HighlightApi>,
    scheduler: Arc<RetryScheduler>,
    capturer: ScreenshotCapturer,
    auth: Arc<dyn Authenticator>,
}

impl MessageRouter {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        api: Arc<dyn HighlightApi>,
        scheduler: Arc<RetryScheduler>,
        capturer: ScreenshotCapturer,
        auth: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            config: ConfigStore::new(store),
            api,
            scheduler,
            capturer,
            auth,
        }
    }

    fn queue(&self) -> &Arc<SyncQueue> {
        self.scheduler.queue()
    }

    /// Route one request to its handler.
    pub async fn handle(&self, request: ExtensionRequest) -> ExtensionResponse {
        debug!("Handling {} request", request.action());

        match request {
            ExtensionRequest::SaveHighlight {
                highlight,
                capture_screenshot,
                tab_id,
            } => {
                let response = match self
                    .save_highlight(highlight, capture_screenshot, tab_id)
                    .await
                {
                    Ok(SaveOutcome::Delivered { highlight_id }) => SaveHighlightResponse {
                        success: true,
                        highlight_id,
                        message: Some(SAVED_MESSAGE.to_string()),
                        ..SaveHighlightResponse::default()
                    },
                    Ok(SaveOutcome::Queued { reason, .. }) => SaveHighlightResponse {
                        success: false,
                        queued: true,
                        message: Some(QUEUED_MESSAGE.to_string()),
                        error: Some(reason),
                        ..SaveHighlightResponse::default()
                    },
                    Err(e) => SaveHighlightResponse {
                        success: false,
                        error: Some(e.to_string()),
                        ..SaveHighlightResponse::default()
                    },
                };
                ExtensionResponse::SaveHighlight(response)
            }

            ExtensionRequest::GetConfig => match self.config.load() {
                Ok(config) => ExtensionResponse::GetConfig(ConfigResponse {
                    config,
                    error: None,
                }),
                Err(e) => {
                    error!("Failed to load config: {}", e);
                    ExtensionResponse::error(e.to_string())
                }
            },

            ExtensionRequest::SaveConfig { config } => match self.config.apply(&config) {
                Ok(()) => ExtensionResponse::SaveConfig(SuccessResponse::ok()),
                Err(e) => {
                    error!("Failed to save config: {}", e);
                    ExtensionResponse::SaveConfig(SuccessResponse::failed(e.to_string()))
                }
            },

            ExtensionRequest::GetQueueStatus => match self.queue().status().await {
                Ok(status) => ExtensionResponse::GetQueueStatus(QueueStatusResponse {
                    queue_length: status.length,
                    oldest_queued_at: status.oldest_queued_at,
                    last_sync_at: self.scheduler.last_drain().map(|last| last.finished_at),
                    error: None,
                }),
                Err(e) => ExtensionResponse::GetQueueStatus(QueueStatusResponse {
                    error: Some(e.to_string()),
                    ..QueueStatusResponse::default()
                }),
            },

            ExtensionRequest::ProcessQueue => match self.scheduler.trigger(Trigger::Manual).await {
                Ok(report) => ExtensionResponse::ProcessQueue(ProcessQueueResponse {
                    success: report.failure.is_none(),
                    queue_length: report.remaining,
                    error: report.failure.map(|e| e.to_string()),
                }),
                Err(e) => {
                    error!("Manual sync failed: {}", e);
                    ExtensionResponse::ProcessQueue(ProcessQueueResponse {
                        success: false,
                        queue_length: 0,
                        error: Some(e.to_string()),
                    })
                }
            },

            ExtensionRequest::GoogleAuth { provider } => {
                ExtensionResponse::GoogleAuth(self.sign_in(&provider).await)
            }

            ExtensionRequest::GetProjects => {
                let result = match self.config.load() {
                    Ok(config) => self.api.list_projects(&config).await.map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                ExtensionResponse::GetProjects(match result {
                    Ok(projects) => ProjectsResponse {
                        success: true,
                        projects: Some(projects),
                        error: None,
                    },
                    Err(message) => ProjectsResponse {
                        success: false,
                        projects: None,
                        error: Some(message),
                    },
                })
            }

            ExtensionRequest::Ping => ExtensionResponse::Ping { pong: true },
        }
    }

    /// Deliver a highlight directly, queueing it only when the network failed.
    pub async fn save_highlight(
        &self,
        highlight: HighlightDraft,
        capture_screenshot: bool,
        tab_id: Option<u64>,
    ) -> Result<SaveOutcome, SaveError> {
        let config = self.config.load()?;
        if !config.extension_enabled {
            return Err(SaveError::Disabled);
        }
        highlight.validate().map_err(SaveError::Validation)?;
        if config.token().is_none() {
            return Err(SaveError::Delivery(DeliveryError::Auth));
        }

        let preview = if capture_screenshot {
            self.capturer
                .capture(tab_id, &highlight.source_url, highlight.selection_rect)
                .await
        } else {
            None
        };

        match self
            .api
            .create_highlight(&config, &highlight, preview.as_ref())
            .await
        {
            Ok(highlight_id) => {
                info!(
                    "Saved highlight from {} ({} chars)",
                    highlight.source_url,
                    highlight.text.chars().count()
                );
                Ok(SaveOutcome::Delivered { highlight_id })
            }
            Err(e) if e.is_retryable() => {
                warn!("Direct save failed, queueing highlight: {}", e);
                let queue_length = self.queue().enqueue(highlight, preview).await?;
                Ok(SaveOutcome::Queued {
                    queue_length,
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(SaveError::Delivery(e)),
        }
    }

    async fn sign_in(&self, provider: &str) -> AuthResponse {
        let token = match self.auth.authenticate(provider).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Sign-in with {} failed: {:#}", provider, e);
                return AuthResponse {
                    success: false,
                    token: None,
                    error: Some(format!("{:#}", e)),
                };
            }
        };

        match self.config.apply(&ConfigPatch::token(token.clone())) {
            Ok(()) => AuthResponse {
                success: true,
                token: Some(token),
                error: None,
            },
            Err(e) => AuthResponse {
                success: false,
                token: None,
                error: Some(e.to_string()),
            },
        }
    }
}
