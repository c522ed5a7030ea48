// Message protocol between the page side and the background process
// Uses framed JSON messages (one object per line) tagged by `action`

use super::config::{Config, ConfigPatch};
use crate::models::{HighlightDraft, Project};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum size of a single request frame (1MB). A highlight is at most
/// 10k characters; screenshots are taken by the background, never sent in.
pub const MAX_REQUEST_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum size of a single response frame (10MB)
pub const MAX_RESPONSE_FRAME_SIZE: usize = 10 * 1024 * 1024;

fn default_true() -> bool {
    true
}

// ============================================================================
// Page -> Background requests
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ExtensionRequest {
    /// Deliver a highlight now, or queue it if the network is down
    SaveHighlight {
        highlight: HighlightDraft,
        /// Capture a preview of the visible tab before sending
        #[serde(rename = "captureScreenshot", default = "default_true")]
        capture_screenshot: bool,
        /// Tab to capture; the active tab when absent
        #[serde(rename = "tabId", default, skip_serializing_if = "Option::is_none")]
        tab_id: Option<u64>,
    },
    GetConfig,
    SaveConfig {
        config: ConfigPatch,
    },
    GetQueueStatus,
    /// Drain the offline queue now
    ProcessQueue,
    GoogleAuth {
        #[serde(default = "default_provider")]
        provider: String,
    },
    /// Candidate projects for the popup's picker
    GetProjects,
    Ping,
}

fn default_provider() -> String {
    "google".to_string()
}

impl ExtensionRequest {
    /// Wire name of the action, for logging
    pub fn action(&self) -> &'static str {
        match self {
            ExtensionRequest::SaveHighlight { .. } => "saveHighlight",
            ExtensionRequest::GetConfig => "getConfig",
            ExtensionRequest::SaveConfig { .. } => "saveConfig",
            ExtensionRequest::GetQueueStatus => "getQueueStatus",
            ExtensionRequest::ProcessQueue => "processQueue",
            ExtensionRequest::GoogleAuth { .. } => "googleAuth",
            ExtensionRequest::GetProjects => "getProjects",
            ExtensionRequest::Ping => "ping",
        }
    }
}

// ============================================================================
// Background -> Page responses
// ============================================================================

/// One response variant per request action, tagged with the same action name.
/// Anything that could not be routed comes back as `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ExtensionResponse {
    SaveHighlight(SaveHighlightResponse),
    GetConfig(ConfigResponse),
    SaveConfig(SuccessResponse),
    GetQueueStatus(QueueStatusResponse),
    ProcessQueue(ProcessQueueResponse),
    GoogleAuth(AuthResponse),
    GetProjects(ProjectsResponse),
    Ping { pong: bool },
    Error(SuccessResponse),
}

impl ExtensionResponse {
    pub fn error(message: impl Into<String>) -> Self {
        ExtensionResponse::Error(SuccessResponse::failed(message))
    }

    /// Human-readable failure carried by the response, if any
    pub fn error_message(&self) -> Option<&str> {
        match self {
            ExtensionResponse::SaveHighlight(r) => r.error.as_deref(),
            ExtensionResponse::GetConfig(r) => r.error.as_deref(),
            ExtensionResponse::SaveConfig(r) | ExtensionResponse::Error(r) => r.error.as_deref(),
            ExtensionResponse::GetQueueStatus(r) => r.error.as_deref(),
            ExtensionResponse::ProcessQueue(r) => r.error.as_deref(),
            ExtensionResponse::GoogleAuth(r) => r.error.as_deref(),
            ExtensionResponse::GetProjects(r) => r.error.as_deref(),
            ExtensionResponse::Ping { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveHighlightResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Delivery failed on the network and the highlight was queued
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub queued: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigResponse {
    #[serde(flatten)]
    pub config: Config,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatusResponse {
    pub queue_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest_queued_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessQueueResponse {
    pub success: bool,
    pub queue_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectsResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects: Option<Vec<Project>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Helpers for message framing
// ============================================================================

/// Serialize a message to JSON bytes with newline delimiter
pub fn serialize_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(msg)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Deserialize a message from JSON bytes (strips trailing newline)
pub fn deserialize_message<T: for<'de> Deserialize<'de>>(
    bytes: &[u8],
) -> Result<T, serde_json::Error> {
    let trimmed = if bytes.last() == Some(&b'\n') {
        &bytes[..bytes.len() - 1]
    } else {
        bytes
    };
    serde_json::from_slice(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::draft;
    use serde_json::json;

    #[test]
    fn test_save_highlight_defaults_capture_on() {
        let req: ExtensionRequest = serde_json::from_value(json!({
            "action": "saveHighlight",
            "highlight": serde_json::to_value(draft("hello world")).unwrap(),
        }))
        .unwrap();

        match req {
            ExtensionRequest::SaveHighlight {
                highlight,
                capture_screenshot,
                tab_id,
            } => {
                assert_eq!(highlight.text, "hello world");
                assert!(capture_screenshot);
                assert_eq!(tab_id, None);
            }
            other => panic!("Wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_request_framing() {
        let req = ExtensionRequest::SaveConfig {
            config: ConfigPatch::project("p2"),
        };

        let bytes = serialize_message(&req).unwrap();
        assert_eq!(bytes.last(), Some(&b'\n'));
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap().trim_end(),
            r#"{"action":"saveConfig","config":{"projectId":"p2"}}"#
        );

        let parsed: ExtensionRequest = deserialize_message(&bytes).unwrap();
        assert_eq!(parsed, req);
        assert_eq!(parsed.action(), "saveConfig");
    }

    #[test]
    fn test_queued_save_response_shape() {
        let resp = ExtensionResponse::SaveHighlight(SaveHighlightResponse {
            success: false,
            queued: true,
            message: Some("Saved offline".into()),
            ..SaveHighlightResponse::default()
        });

        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({
                "action": "saveHighlight",
                "success": false,
                "queued": true,
                "message": "Saved offline",
            })
        );
    }

    #[test]
    fn test_delivered_save_response_omits_queued() {
        let resp = ExtensionResponse::SaveHighlight(SaveHighlightResponse {
            success: true,
            highlight_id: Some("h_1".into()),
            ..SaveHighlightResponse::default()
        });
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["highlight_id"], "h_1");
        assert!(json.get("queued").is_none());
    }

    #[test]
    fn test_config_response_is_flat() {
        let resp = ExtensionResponse::GetConfig(ConfigResponse {
            config: Config::default(),
            error: None,
        });
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["action"], "getConfig");
        assert_eq!(json["extensionEnabled"], true);

        let parsed: ExtensionResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, resp);
    }

    #[test]
    fn test_queue_status_uses_queue_length_key() {
        let json = serde_json::to_value(ExtensionResponse::GetQueueStatus(QueueStatusResponse {
            queue_length: 3,
            ..QueueStatusResponse::default()
        }))
        .unwrap();
        assert_eq!(json, json!({"action": "getQueueStatus", "queueLength": 3}));
    }

    #[test]
    fn test_error_response() {
        let resp = ExtensionResponse::error("Unknown action");
        assert_eq!(resp.error_message(), Some("Unknown action"));
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({"action": "error", "success": false, "error": "Unknown action"})
        );
    }

    #[test]
    fn test_unknown_action_fails_to_parse() {
        let result = deserialize_message::<ExtensionRequest>(br#"{"action":"launchRockets"}"#);
        assert!(result.is_err());
    }
}
