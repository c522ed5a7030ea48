//! Seams between the page-side components and the outside world.
//!
//! [`PageSurface`] is everything the controller needs from the rendered page
//! (selection, focus, popup chrome, frames); [`BackgroundPort`] is the message
//! channel to the background process.

use crate::background::protocol::{ExtensionRequest, ExtensionResponse};
use crate::background::router::MessageRouter;
use crate::models::SelectionRect;
use anyhow::Result;
use async_trait::async_trait;

/// Selection as currently rendered on the page
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSelection {
    /// Raw selected text, untrimmed
    pub text: String,
    pub rect: Option<SelectionRect>,
}

/// Transient status shown after a save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Saved,
    Queued,
}

/// Top-left corner of the popup in viewport coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopupPosition {
    pub left: f64,
    pub top: f64,
}

/// Everything the popup renders
#[derive(Debug, Clone, PartialEq)]
pub struct PopupView {
    pub position: PopupPosition,
    pub selected_text: String,
    pub note: String,
    pub projects: Vec<crate::models::Project>,
    pub selected_project: Option<String>,
    pub error: Option<String>,
    /// Projects are still being fetched
    pub loading: bool,
}

#[async_trait]
pub trait PageSurface: Send + Sync {
    fn live_selection(&self) -> Option<LiveSelection>;
    /// Focus is inside an input, textarea or contenteditable element
    fn focus_in_editable(&self) -> bool;
    fn page_url(&self) -> String;
    fn page_title(&self) -> String;
    /// Current contents of the popup's note field
    fn read_note(&self) -> String;
    fn show_popup(&self, view: &PopupView);
    fn hide_popup(&self);
    fn show_indicator(&self, indicator: Indicator);
    fn flash_highlight(&self, text: &str);
    fn clear_selection(&self);
    /// Resolves after the next rendering frame
    async fn next_frame(&self);
}

/// Request/response channel to the background process
#[async_trait]
pub trait BackgroundPort: Send + Sync {
    async fn send(&self, request: ExtensionRequest) -> Result<ExtensionResponse>;
}

/// In-process port: the router answers directly
#[async_trait]
impl BackgroundPort for MessageRouter {
    async fn send(&self, request: ExtensionRequest) -> Result<ExtensionResponse> {
        Ok(self.handle(request).await)
    }
}
