//! Core data model shared by the page side and the background process.
//!
//! Everything here is serialized with snake_case keys: these structs travel
//! inside `saveHighlight` messages and are persisted verbatim in the offline
//! queue, so field names are part of the stored format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound (exclusive) on the number of characters a highlight may carry.
pub const MAX_SELECTION_CHARS: usize = 10_000;

/// Geometry of the selection at the moment it was captured.
///
/// `x`, `y`, `width` and `height` are the selection's bounding box in viewport
/// (client) coordinates. The scroll offsets are recorded separately so the
/// absolute page position can be recovered with [`SelectionRect::page_x`] and
/// [`SelectionRect::page_y`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
}

impl SelectionRect {
    pub fn page_x(&self) -> f64 {
        self.x + self.scroll_x
    }

    pub fn page_y(&self) -> f64 {
        self.y + self.scroll_y
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// A highlight as composed on the page, before delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightDraft {
    pub text: String,
    pub source_url: String,
    pub page_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_rect: Option<SelectionRect>,
    pub project_id: String,
}

impl HighlightDraft {
    /// Checks the invariants a draft must hold before it may leave the page.
    ///
    /// Returns a user-facing message on failure.
    pub fn validate(&self) -> Result<(), String> {
        let chars = self.text.trim().chars().count();
        if chars == 0 {
            return Err("Nothing selected to save".to_string());
        }
        if chars >= MAX_SELECTION_CHARS {
            return Err(format!(
                "Selection is too long ({} characters, max {})",
                chars,
                MAX_SELECTION_CHARS - 1
            ));
        }
        if self.project_id.trim().is_empty() {
            return Err("Choose a project before saving".to_string());
        }
        Ok(())
    }

    /// Note text with surrounding whitespace removed; blank notes become `None`.
    pub fn normalized_note(&self) -> Option<&str> {
        self.note
            .as_deref()
            .map(str::trim)
            .filter(|note| !note.is_empty())
    }
}

/// Screenshot paired with the geometry it was taken for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureResult {
    /// `data:image/<fmt>;base64,...` URL
    pub screenshot: String,
    pub selection_rect: SelectionRect,
}

/// A highlight waiting in the offline queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedHighlight {
    pub id: Uuid,
    pub highlight: HighlightDraft,
    /// Capture resolved at save time; `None` when no preview was available
    pub preview_data: Option<CaptureResult>,
    pub queued_at: DateTime<Utc>,
    /// Number of drain attempts that failed for this item
    #[serde(default)]
    pub attempts: u32,
}

impl QueuedHighlight {
    pub fn new(
        highlight: HighlightDraft,
        preview_data: Option<CaptureResult>,
        queued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            highlight,
            preview_data,
            queued_at,
            attempts: 0,
        }
    }
}

/// Candidate project shown in the popup's picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}


#[cfg(test)]
mod tests {
    use super::fixtures::{draft, rect};
    use super::*;

    #[test]
    fn test_page_position_adds_scroll_offsets() {
        let rect = rect();
        assert_eq!(rect.page_x(), 120.0);
        assert_eq!(rect.page_y(), 1540.5);
        assert_eq!(rect.bottom(), 376.5);
    }

    #[test]
    fn test_validate_rejects_blank_text_and_missing_project() {
        assert!(draft("hello world").validate().is_ok());
        assert!(draft("   ").validate().is_err());

        let mut no_project = draft("hello world");
        no_project.project_id = String::new();
        assert_eq!(
            no_project.validate().unwrap_err(),
            "Choose a project before saving"
        );
    }

    #[test]
    fn test_validate_bounds_length_in_characters() {
        // Multi-byte characters count once each
        let just_under = "é".repeat(MAX_SELECTION_CHARS - 1);
        assert!(draft(&just_under).validate().is_ok());

        let at_limit = "a".repeat(MAX_SELECTION_CHARS);
        assert!(draft(&at_limit).validate().is_err());
    }

    #[test]
    fn test_normalized_note_drops_blank_notes() {
        let mut d = draft("hello");
        assert_eq!(d.normalized_note(), None);
        d.note = Some("   ".to_string());
        assert_eq!(d.normalized_note(), None);
        d.note = Some("  worth re-reading ".to_string());
        assert_eq!(d.normalized_note(), Some("worth re-reading"));
    }

    #[test]
    fn test_draft_wire_format_uses_snake_case() {
        let json = serde_json::to_value(draft("hello world")).unwrap();
        assert_eq!(json["source_url"], "https://x.test");
        assert_eq!(json["project_id"], "p1");
        assert_eq!(json["selection_rect"]["viewport_width"], 1280.0);
        assert!(json.get("note").is_none());
    }
}
