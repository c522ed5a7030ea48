//! Screenshot capture for highlight previews.
//!
//! Capture never fails a save: every problem is logged and the highlight
//! goes out without a preview. The selection geometry is forwarded exactly
//! as measured on the page; the image is not cropped here.

use crate::error::CaptureError;
use crate::models::{CaptureResult, SelectionRect};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use log::{debug, warn};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

pub const DEFAULT_JPEG_QUALITY: u8 = 80;
const CAPTURE_TIMEOUT_SECS: u64 = 10;

/// Hosts that refuse extension captures even over https
const RESTRICTED_HOSTS: &[&str] = &[
    "chrome.google.com/webstore",
    "chromewebstore.google.com",
    "addons.mozilla.org",
    "microsoftedge.microsoft.com/addons",
];

/// Source of raw frames for the visible area of a tab.
#[async_trait]
pub trait TabCapture: Send + Sync {
    /// Encoded image bytes (PNG, JPEG, ...) of the visible viewport.
    async fn capture_visible(&self, tab_id: Option<u64>) -> Result<Vec<u8>, CaptureError>;
}

/// Runs an external screenshot command and reads the image from its stdout.
///
/// The target tab id, when known, is exported as `HIGHLIGHT_SYNC_TAB_ID`.
#[derive(Debug, Clone, Default)]
pub struct CommandCapture {
    command: Option<Vec<String>>,
}

impl CommandCapture {
    pub fn new(command: Option<Vec<String>>) -> Self {
        Self {
            command: command.filter(|argv| !argv.is_empty()),
        }
    }
}

#[async_trait]
impl TabCapture for CommandCapture {
    async fn capture_visible(&self, tab_id: Option<u64>) -> Result<Vec<u8>, CaptureError> {
        let argv = self
            .command
            .as_ref()
            .ok_or_else(|| CaptureError::Unavailable("no capture command configured".into()))?;

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(tab_id) = tab_id {
            cmd.env("HIGHLIGHT_SYNC_TAB_ID", tab_id.to_string());
        }

        let output = tokio::time::timeout(Duration::from_secs(CAPTURE_TIMEOUT_SECS), cmd.output())
            .await
            .map_err(|_| {
                CaptureError::Command(format!("timed out after {}s", CAPTURE_TIMEOUT_SECS))
            })?
            .map_err(|e| CaptureError::Command(format!("{}: {}", argv[0], e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::Command(format!(
                "{} exited with {}: {}",
                argv[0],
                output.status,
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(CaptureError::Command(format!(
                "{} produced no image data",
                argv[0]
            )));
        }

        Ok(output.stdout)
    }
}

/// Captures the visible tab and pairs it with the selection geometry.
#[derive(Clone)]
pub struct ScreenshotCapturer {
    source: Arc<dyn TabCapture>,
    jpeg_quality: u8,
}

impl ScreenshotCapturer {
    pub fn new(source: Arc<dyn TabCapture>) -> Self {
        Self {
            source,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_quality(mut self, jpeg_quality: u8) -> Self {
        self.jpeg_quality = jpeg_quality.clamp(1, 100);
        self
    }

    /// Returns `None` on any capture problem; the reason is logged.
    pub async fn capture(
        &self,
        tab_id: Option<u64>,
        page_url: &str,
        rect: Option<SelectionRect>,
    ) -> Option<CaptureResult> {
        match self.try_capture(tab_id, page_url, rect).await {
            Ok(result) => {
                debug!(
                    "Captured {} byte preview for {}",
                    result.screenshot.len(),
                    page_url
                );
                Some(result)
            }
            Err(CaptureError::MissingRect) => {
                debug!("No selection rect for {}; skipping preview", page_url);
                None
            }
            Err(e) => {
                warn!("Screenshot skipped: {}", e);
                None
            }
        }
    }

    async fn try_capture(
        &self,
        tab_id: Option<u64>,
        page_url: &str,
        rect: Option<SelectionRect>,
    ) -> Result<CaptureResult, CaptureError> {
        let selection_rect = rect.ok_or(CaptureError::MissingRect)?;
        if is_restricted_url(page_url) {
            return Err(CaptureError::Restricted(page_url.to_string()));
        }

        let raw = self.source.capture_visible(tab_id).await?;
        let screenshot = encode_data_url(&raw, self.jpeg_quality)?;

        Ok(CaptureResult {
            screenshot,
            selection_rect,
        })
    }
}

/// Pages the browser never lets an extension capture.
pub fn is_restricted_url(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();

    if lower.starts_with("file://") {
        return false;
    }

    let rest = match lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
    {
        Some(rest) => rest,
        None => return true,
    };

    RESTRICTED_HOSTS.iter().any(|host| rest.starts_with(host))
}

/// Re-encode a raw frame as a JPEG data URL.
///
/// Frames that decode but fail to re-encode are forwarded as-is with their
/// detected MIME type.
pub fn encode_data_url(raw: &[u8], jpeg_quality: u8) -> Result<String, CaptureError> {
    let format = image::guess_format(raw).map_err(|e| CaptureError::Encode(e.to_string()))?;
    let img = image::load_from_memory_with_format(raw, format)
        .map_err(|e| CaptureError::Encode(e.to_string()))?;

    let rgb = img.to_rgb8();
    let mut jpeg = Vec::new();
    let encoded = JpegEncoder::new_with_quality(&mut jpeg, jpeg_quality).encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    );

    match encoded {
        Ok(()) => Ok(format!("data:image/jpeg;base64,{}", BASE64.encode(&jpeg))),
        Err(e) => {
            warn!("JPEG re-encode failed ({}); forwarding original frame", e);
            Ok(format!(
                "data:{};base64,{}",
                format.to_mime_type(),
                BASE64.encode(raw)
            ))
        }
    }
}
