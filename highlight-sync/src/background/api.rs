//! Client for the remote highlights API.
//!
//! Delivery failures are classified here: a request that never produced an
//! HTTP response is [`DeliveryError::Network`] (the caller queues it), a
//! request that could not be built from the configured `apiUrl` is
//! [`DeliveryError::Config`], and any non-2xx answer is
//! [`DeliveryError::Server`] carrying the server's own `{ "error": ... }`
//! message when one is present.

use super::config::Config;
use crate::error::DeliveryError;
use crate::models::{CaptureResult, HighlightDraft, Project};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Outbound API used by direct saves, queue drains and the project picker.
#[async_trait]
pub trait HighlightApi: Send + Sync {
    /// Create one highlight. Returns the server-assigned id when the response carries one.
    async fn create_highlight(
        &self,
        config: &Config,
        highlight: &HighlightDraft,
        preview: Option<&CaptureResult>,
    ) -> Result<Option<String>, DeliveryError>;

    async fn list_projects(&self, config: &Config) -> Result<Vec<Project>, DeliveryError>;
}

/// JSON body of `POST /api/highlights`
#[derive(Debug, Serialize)]
pub struct CreateHighlightBody<'a> {
    pub project_id: &'a str,
    pub source_url: &'a str,
    pub page_title: &'a str,
    pub text: &'a str,
    pub note: Option<&'a str>,
    pub tags: Vec<String>,
    pub preview_data: Option<&'a CaptureResult>,
}

impl<'a> CreateHighlightBody<'a> {
    pub fn new(highlight: &'a HighlightDraft, preview: Option<&'a CaptureResult>) -> Self {
        Self {
            project_id: &highlight.project_id,
            source_url: &highlight.source_url,
            page_title: &highlight.page_title,
            text: &highlight.text,
            note: highlight.normalized_note(),
            tags: Vec::new(),
            preview_data: preview,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProjectsBody {
    List(Vec<Project>),
    Wrapped { projects: Vec<Project> },
}

/// reqwest-backed implementation
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
}

impl HttpApi {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    fn bearer(config: &Config) -> Result<String, DeliveryError> {
        config
            .token()
            .map(|t| format!("Bearer {}", t))
            .ok_or(DeliveryError::Auth)
    }
}

#[async_trait]
impl HighlightApi for HttpApi {
    async fn create_highlight(
        &self,
        config: &Config,
        highlight: &HighlightDraft,
        preview: Option<&CaptureResult>,
    ) -> Result<Option<String>, DeliveryError> {
        let auth = Self::bearer(config)?;
        let resp = self
            .client
            .post(config.endpoint("/api/highlights"))
            .header("Authorization", auth)
            .json(&CreateHighlightBody::new(highlight, preview))
            .send()
            .await
            .map_err(send_error)?;

        if !resp.status().is_success() {
            return Err(server_error(resp).await);
        }

        // Accepted; an unreadable body must not turn a delivered highlight into a retry
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        Ok(highlight_id(&body))
    }

    async fn list_projects(&self, config: &Config) -> Result<Vec<Project>, DeliveryError> {
        let auth = Self::bearer(config)?;
        let resp = self
            .client
            .get(config.endpoint("/api/projects"))
            .header("Authorization", auth)
            .send()
            .await
            .map_err(send_error)?;

        if !resp.status().is_success() {
            return Err(server_error(resp).await);
        }

        let body: ProjectsBody = resp.json().await.map_err(|e| DeliveryError::Server {
            status: StatusCode::OK.as_u16(),
            message: format!("Failed to parse projects: {}", e),
        })?;

        Ok(match body {
            ProjectsBody::List(projects) | ProjectsBody::Wrapped { projects } => projects,
        })
    }
}

/// Only transport failures are retryable; a URL reqwest cannot use never will be
fn send_error(e: reqwest::Error) -> DeliveryError {
    if e.is_connect() || e.is_timeout() {
        DeliveryError::Network(e.to_string())
    } else if e.is_builder() || e.is_redirect() {
        DeliveryError::Config(e.to_string())
    } else {
        DeliveryError::Network(e.to_string())
    }
}

async fn server_error(resp: Response) -> DeliveryError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    DeliveryError::Server {
        status: status.as_u16(),
        message: server_message(status.as_u16(), &body),
    }
}

/// The server's `{ "error": ... }` message verbatim, else a generic status line
pub fn server_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| format!("Server returned {}", status))
}

/// Extract `id` (string or number) from a create response
pub fn highlight_id(body: &Value) -> Option<String> {
    let id = body
        .get("id")
        .or_else(|| body.get("highlight").and_then(|h| h.get("id")))?;
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
