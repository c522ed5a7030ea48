//! Highlight popup state machine.
//!
//! ```text
//! Idle ──chord + selection──▶ PopupVisible ──save──▶ Saving ──┬─▶ Idle (saved / queued)
//!   ▲                             │  ▲                         │
//!   └──────────escape─────────────┘  └──────failure────────────┘
//! ```
//!
//! The save sequence is timing-sensitive: the selection geometry is measured
//! before the popup is touched, and the `saveHighlight` message only goes out
//! after the popup has been hidden and the page has rendered two frames plus a
//! settle delay, so the background's screenshot shows the page without the
//! popup on top of it.

use super::port::{BackgroundPort, Indicator, PageSurface, PopupPosition, PopupView};
use super::selection::{accept_selection, Chord, KeyEvent, SelectionTracker, TrackedSelection};
use crate::background::config::ConfigPatch;
use crate::background::protocol::{ExtensionRequest, ExtensionResponse};
use crate::models::{HighlightDraft, Project, SelectionRect};
use chrono::Utc;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

pub const SETTLE_DELAY: Duration = Duration::from_millis(100);
pub const POPUP_WIDTH: f64 = 320.0;
pub const POPUP_HEIGHT: f64 = 240.0;
pub const POPUP_MARGIN: f64 = 8.0;

/// Popup placement for a selection: below it, flipped above when there is no
/// room, and always inside the viewport.
pub fn popup_position(rect: Option<&SelectionRect>) -> PopupPosition {
    let Some(rect) = rect else {
        return PopupPosition {
            left: POPUP_MARGIN,
            top: POPUP_MARGIN,
        };
    };

    let max_left = (rect.viewport_width - POPUP_WIDTH - POPUP_MARGIN).max(POPUP_MARGIN);
    let max_top = (rect.viewport_height - POPUP_HEIGHT - POPUP_MARGIN).max(POPUP_MARGIN);

    let mut top = rect.bottom() + POPUP_MARGIN;
    if top > max_top {
        top = rect.y - POPUP_HEIGHT - POPUP_MARGIN;
    }

    PopupPosition {
        left: rect.x.clamp(POPUP_MARGIN, max_left),
        top: top.clamp(POPUP_MARGIN, max_top),
    }
}

/// Configured project if offered, else the only project, else nothing.
pub fn preselect_project(projects: &[Project], configured: Option<&str>) -> Option<String> {
    if let Some(configured) = configured {
        if projects.iter().any(|p| p.id == configured) {
            return Some(configured.to_string());
        }
    }
    match projects {
        [only] => Some(only.id.clone()),
        _ => None,
    }
}

/// Data owned by a visible popup
#[derive(Debug, Clone, PartialEq)]
pub struct PopupSession {
    pub selection: TrackedSelection,
    pub position: PopupPosition,
    pub note: String,
    pub projects: Vec<Project>,
    pub selected_project: Option<String>,
    pub configured_project: Option<String>,
    pub error: Option<String>,
    pub loading: bool,
}

impl PopupSession {
    fn view(&self) -> PopupView {
        PopupView {
            position: self.position,
            selected_text: self.selection.text.clone(),
            note: self.note.clone(),
            projects: self.projects.clone(),
            selected_project: self.selected_project.clone(),
            error: self.error.clone(),
            loading: self.loading,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PopupState {
    Idle,
    PopupVisible(PopupSession),
    Saving,
}

pub struct HighlightPopupController {
    surface: Arc<dyn PageSurface>,
    port: Arc<dyn BackgroundPort>,
    tracker: SelectionTracker,
    chord: Chord,
    settle_delay: Duration,
    state: PopupState,
}

impl HighlightPopupController {
    pub fn new(surface: Arc<dyn PageSurface>, port: Arc<dyn BackgroundPort>) -> Self {
        Self {
            surface,
            port,
            tracker: SelectionTracker::new(),
            chord: Chord::default(),
            settle_delay: SETTLE_DELAY,
            state: PopupState::Idle,
        }
    }

    pub fn with_chord(mut self, chord: Chord) -> Self {
        self.chord = chord;
        self
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn state(&self) -> &PopupState {
        &self.state
    }

    pub fn tracker(&self) -> &SelectionTracker {
        &self.tracker
    }

    pub fn on_pointer_up(&mut self) {
        self.tracker.on_pointer_up(self.surface.as_ref());
    }

    pub fn on_key_up(&mut self, event: &KeyEvent) {
        self.tracker.on_key_up(event, self.surface.as_ref());
    }

    /// Returns true when the event was consumed.
    pub async fn on_key_down(&mut self, event: &KeyEvent) -> bool {
        match self.state {
            PopupState::PopupVisible(_) if event.key == "Escape" => {
                self.dismiss();
                true
            }
            PopupState::Idle if self.chord.matches(event) => self.activate().await,
            _ => false,
        }
    }

    /// Open the popup for the selection present right now.
    async fn activate(&mut self) -> bool {
        if !matches!(self.state, PopupState::Idle) || self.surface.focus_in_editable() {
            return false;
        }

        self.tracker.refresh(self.surface.as_ref());
        let Some(selection) = self.tracker.current().cloned() else {
            debug!("Activation ignored: no usable selection");
            return false;
        };

        let config = match self.port.send(ExtensionRequest::GetConfig).await {
            Ok(ExtensionResponse::GetConfig(resp)) => resp.config,
            Ok(other) => {
                warn!("Unexpected getConfig response: {:?}", other);
                return false;
            }
            Err(e) => {
                warn!("Background unreachable: {:#}", e);
                return false;
            }
        };
        if !config.extension_enabled {
            debug!("Activation ignored: highlighting disabled");
            return false;
        }

        let mut session = PopupSession {
            position: popup_position(selection.rect.as_ref()),
            selection,
            note: String::new(),
            projects: Vec::new(),
            selected_project: None,
            configured_project: config.project_id().map(str::to_string),
            error: None,
            loading: true,
        };
        self.surface.show_popup(&session.view());

        match self.port.send(ExtensionRequest::GetProjects).await {
            Ok(ExtensionResponse::GetProjects(resp)) if resp.success => {
                session.projects = resp.projects.unwrap_or_default();
                session.selected_project = preselect_project(
                    &session.projects,
                    session.configured_project.as_deref(),
                );
                if session.projects.is_empty() {
                    session.error = Some("No projects available".to_string());
                }
            }
            Ok(resp) => {
                session.error = Some(
                    resp.error_message()
                        .unwrap_or("Could not load projects")
                        .to_string(),
                );
            }
            Err(e) => session.error = Some(format!("Could not load projects: {:#}", e)),
        }
        session.loading = false;

        self.surface.show_popup(&session.view());
        self.state = PopupState::PopupVisible(session);
        true
    }

    pub fn select_project(&mut self, project_id: &str) {
        if let PopupState::PopupVisible(session) = &mut self.state {
            if session.projects.iter().any(|p| p.id == project_id) {
                session.selected_project = Some(project_id.to_string());
                session.error = None;
                self.surface.show_popup(&session.view());
            }
        }
    }

    pub fn dismiss(&mut self) {
        if let PopupState::PopupVisible(_) = self.state {
            self.surface.hide_popup();
            self.state = PopupState::Idle;
        }
    }

    /// Run the save sequence for the visible popup.
    pub async fn save(&mut self) {
        let mut session = match std::mem::replace(&mut self.state, PopupState::Saving) {
            PopupState::PopupVisible(session) => session,
            other => {
                self.state = other;
                return;
            }
        };

        // 1. Selection and geometry, before anything on the page changes
        let live = self.surface.live_selection();
        let text = live
            .as_ref()
            .and_then(|l| accept_selection(&l.text))
            .unwrap_or_else(|| session.selection.text.clone());
        let rect = live
            .and_then(|l| l.rect)
            .or(session.selection.rect);

        // 2. Note
        session.note = self.surface.read_note();

        let Some(project_id) = session.selected_project.clone() else {
            return self.reopen(session, "Choose a project before saving".to_string());
        };
        let note = session.note.trim();
        let draft = HighlightDraft {
            text,
            source_url: self.surface.page_url(),
            page_title: self.surface.page_title(),
            note: (!note.is_empty()).then(|| note.to_string()),
            timestamp: Utc::now(),
            selection_rect: rect,
            project_id,
        };
        if let Err(message) = draft.validate() {
            return self.reopen(session, message);
        }

        // 3. Hide, 4. let the page repaint without the popup
        self.surface.hide_popup();
        self.surface.next_frame().await;
        self.surface.next_frame().await;
        tokio::time::sleep(self.settle_delay).await;

        // 5. One message
        let saved_text = draft.text.clone();
        let saved_project = draft.project_id.clone();
        let response = self
            .port
            .send(ExtensionRequest::SaveHighlight {
                highlight: draft,
                capture_screenshot: true,
                tab_id: None,
            })
            .await;

        match response {
            Ok(ExtensionResponse::SaveHighlight(resp)) if resp.success => {
                self.surface.show_indicator(Indicator::Saved);
                self.surface.flash_highlight(&saved_text);
                self.surface.clear_selection();
                self.tracker.clear();
                self.state = PopupState::Idle;

                if session.configured_project.as_deref() != Some(saved_project.as_str()) {
                    self.remember_project(saved_project).await;
                }
            }
            Ok(ExtensionResponse::SaveHighlight(resp)) if resp.queued => {
                self.surface.show_indicator(Indicator::Queued);
                self.tracker.clear();
                self.state = PopupState::Idle;
            }
            Ok(resp) => {
                let message = resp
                    .error_message()
                    .unwrap_or("Failed to save highlight")
                    .to_string();
                self.reopen(session, message);
            }
            Err(e) => self.reopen(session, format!("Failed to save highlight: {:#}", e)),
        }
    }

    fn reopen(&mut self, mut session: PopupSession, error: String) {
        session.error = Some(error);
        self.surface.show_popup(&session.view());
        self.state = PopupState::PopupVisible(session);
    }

    async fn remember_project(&self, project_id: String) {
        let request = ExtensionRequest::SaveConfig {
            config: ConfigPatch::project(project_id),
        };
        match self.port.send(request).await {
            Ok(ExtensionResponse::SaveConfig(resp)) if resp.success => {}
            Ok(resp) => warn!(
                "Failed to remember project: {}",
                resp.error_message().unwrap_or("unexpected response")
            ),
            Err(e) => warn!("Failed to remember project: {:#}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::config::ConfigPatch;
    use crate::background::queue::stubs::ScriptedApi;
    use crate::background::router::testing::Fixture;
    use crate::error::DeliveryError;
    use crate::models::fixtures::rect;
    use crate::page::testing::{RecordingPort, RecordingSurface, SurfaceEvent};

    fn project(id: &str) -> Project {
        Project {
            id: id.to_string(),
            name: format!("Project {}", id),
        }
    }

    fn chord() -> KeyEvent {
        KeyEvent::new("H").with_ctrl().with_shift()
    }

    struct Page {
        fx: Fixture,
        surface: Arc<RecordingSurface>,
        port: Arc<RecordingPort>,
        controller: HighlightPopupController,
    }

    fn page(api: ScriptedApi, projects: &[&str]) -> Page {
        api.projects
            .lock()
            .unwrap()
            .extend(projects.iter().map(|id| project(id)));
        let fx = Fixture::new(api);
        fx.config().apply(&ConfigPatch::token("tok")).unwrap();

        let surface = Arc::new(RecordingSurface::new());
        let port = Arc::new(RecordingPort::new(fx.router.clone(), surface.log()));
        let controller = HighlightPopupController::new(surface.clone(), port.clone());
        Page {
            fx,
            surface,
            port,
            controller,
        }
    }

    fn visible(controller: &HighlightPopupController) -> &PopupSession {
        match controller.state() {
            PopupState::PopupVisible(session) => session,
            other => panic!("expected visible popup, got {:?}", other),
        }
    }

    #[test]
    fn test_popup_position_below_selection() {
        let pos = popup_position(Some(&SelectionRect {
            x: 100.0,
            y: 50.0,
            height: 20.0,
            ..rect()
        }));
        assert_eq!(pos, PopupPosition { left: 100.0, top: 78.0 });
    }

    #[test]
    fn test_popup_position_flips_and_clamps() {
        // Near the bottom-right corner
        let pos = popup_position(Some(&SelectionRect {
            x: 1200.0,
            y: 700.0,
            height: 20.0,
            ..rect()
        }));
        assert_eq!(pos.left, 1280.0 - POPUP_WIDTH - POPUP_MARGIN);
        assert_eq!(pos.top, 700.0 - POPUP_HEIGHT - POPUP_MARGIN);

        // Tall selection filling a tiny viewport
        let pos = popup_position(Some(&SelectionRect {
            x: -30.0,
            y: 0.0,
            height: 180.0,
            viewport_width: 200.0,
            viewport_height: 200.0,
            ..rect()
        }));
        assert_eq!(pos, PopupPosition { left: POPUP_MARGIN, top: POPUP_MARGIN });
    }

    #[test]
    fn test_preselect_project() {
        let projects = vec![project("a"), project("b")];
        assert_eq!(preselect_project(&projects, Some("b")), Some("b".into()));
        assert_eq!(preselect_project(&projects, Some("zzz")), None);
        assert_eq!(preselect_project(&projects, None), None);
        assert_eq!(
            preselect_project(&[project("only")], Some("gone")),
            Some("only".into())
        );
        assert_eq!(preselect_project(&[], None), None);
    }

    #[tokio::test]
    async fn test_chord_without_selection_stays_idle() {
        let mut p = page(ScriptedApi::new(), &["p1"]);

        assert!(!p.controller.on_key_down(&chord()).await);
        assert_eq!(p.controller.state(), &PopupState::Idle);
        assert!(p.port.sent().is_empty());
    }

    #[tokio::test]
    async fn test_selection_alone_never_opens_popup() {
        let mut p = page(ScriptedApi::new(), &["p1"]);
        p.surface.select("hello world");
        p.controller.on_pointer_up();

        assert_eq!(p.controller.state(), &PopupState::Idle);
        assert!(!p.controller.on_key_down(&KeyEvent::new("h").with_shift()).await);
        assert_eq!(p.controller.state(), &PopupState::Idle);
    }

    #[tokio::test]
    async fn test_chord_requires_selection_at_that_instant() {
        let mut p = page(ScriptedApi::new(), &["p1"]);
        p.surface.select("hello world");
        p.controller.on_pointer_up();
        p.surface.deselect();

        assert!(!p.controller.on_key_down(&chord()).await);
        assert_eq!(p.controller.state(), &PopupState::Idle);
    }

    #[tokio::test]
    async fn test_disabled_extension_blocks_activation() {
        let mut p = page(ScriptedApi::new(), &["p1"]);
        p.fx.config()
            .apply(&ConfigPatch {
                extension_enabled: Some(false),
                ..ConfigPatch::default()
            })
            .unwrap();
        p.surface.select("hello world");

        assert!(!p.controller.on_key_down(&chord()).await);
        assert_eq!(p.surface.popups_shown(), 0);
    }

    #[tokio::test]
    async fn test_activation_preselects_configured_project() {
        let mut p = page(ScriptedApi::new(), &["p1", "p2"]);
        p.fx.config().apply(&ConfigPatch::project("p2")).unwrap();
        p.surface.select("hello world");

        assert!(p.controller.on_key_down(&chord()).await);
        let session = visible(&p.controller);
        assert_eq!(session.selection.text, "hello world");
        assert_eq!(session.selected_project.as_deref(), Some("p2"));
        assert_eq!(session.projects.len(), 2);
        assert!(!session.loading);
    }

    #[tokio::test]
    async fn test_escape_dismisses() {
        let mut p = page(ScriptedApi::new(), &["p1"]);
        p.surface.select("hello world");
        p.controller.on_key_down(&chord()).await;

        assert!(p.controller.on_key_down(&KeyEvent::new("Escape")).await);
        assert_eq!(p.controller.state(), &PopupState::Idle);
        assert_eq!(p.surface.last_event(), Some(SurfaceEvent::HidePopup));
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_sequence_order_and_settle_delay() {
        let mut p = page(ScriptedApi::new(), &["p1"]);
        p.surface.select("hello world");
        p.controller.on_key_down(&chord()).await;
        p.surface.set_note("remember this");
        p.surface.clear_log();

        p.controller.save().await;

        let events = p.surface.events();
        let kinds: Vec<SurfaceEvent> = events.iter().map(|(_, e)| e.clone()).collect();
        let sent_at = kinds
            .iter()
            .position(|e| matches!(e, SurfaceEvent::Sent(action) if action == "saveHighlight"))
            .unwrap();
        assert_eq!(
            &kinds[..sent_at],
            &[
                SurfaceEvent::ReadSelection,
                SurfaceEvent::ReadNote,
                SurfaceEvent::HidePopup,
                SurfaceEvent::Frame,
                SurfaceEvent::Frame,
            ]
        );
        assert_eq!(
            &kinds[sent_at + 1..sent_at + 4],
            &[
                SurfaceEvent::Indicator(Indicator::Saved),
                SurfaceEvent::Flash("hello world".to_string()),
                SurfaceEvent::ClearSelection,
            ]
        );

        let hidden_at = events[2].0;
        let sent = events[sent_at].0;
        assert!(sent - hidden_at >= SETTLE_DELAY);

        // Exactly one save message, carrying the note and live geometry
        let saves = p.port.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].note.as_deref(), Some("remember this"));
        assert_eq!(saves[0].selection_rect, Some(rect()));
        assert_eq!(p.controller.state(), &PopupState::Idle);
        assert!(p.controller.tracker().current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_save_remembers_project() {
        let mut p = page(ScriptedApi::new(), &["p1", "p2"]);
        p.surface.select("hello world");
        p.controller.on_key_down(&chord()).await;
        p.controller.select_project("p2");

        p.controller.save().await;

        assert_eq!(p.fx.config().load().unwrap().project_id(), Some("p2"));
        assert!(p.port.sent().contains(&"saveConfig".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_save_shows_queued_indicator() {
        let mut p = page(ScriptedApi::offline(), &["p1"]);
        p.surface.select("hello world");
        p.controller.on_key_down(&chord()).await;

        p.controller.save().await;

        assert_eq!(p.controller.state(), &PopupState::Idle);
        assert_eq!(
            p.surface.last_event(),
            Some(SurfaceEvent::Indicator(Indicator::Queued))
        );
        assert_eq!(p.fx.queue_length().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_failure_reopens_with_note_intact() {
        let api = ScriptedApi::new();
        api.push(Err(DeliveryError::Server {
            status: 500,
            message: "Database unavailable".into(),
        }));
        let mut p = page(api, &["p1"]);
        p.surface.select("hello world");
        p.controller.on_key_down(&chord()).await;
        p.surface.set_note("my thoughts");

        p.controller.save().await;

        let session = visible(&p.controller);
        assert_eq!(session.note, "my thoughts");
        assert_eq!(session.error.as_deref(), Some("Database unavailable"));
        match p.surface.last_event() {
            Some(SurfaceEvent::ShowPopup(view)) => {
                assert_eq!(view.note, "my thoughts");
                assert_eq!(view.error.as_deref(), Some("Database unavailable"));
            }
            other => panic!("expected popup to be shown again, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_project_blocks_save_without_message() {
        let mut p = page(ScriptedApi::new(), &["p1", "p2"]);
        p.surface.select("hello world");
        p.controller.on_key_down(&chord()).await;
        assert_eq!(visible(&p.controller).selected_project, None);

        p.controller.save().await;

        assert_eq!(
            visible(&p.controller).error.as_deref(),
            Some("Choose a project before saving")
        );
        assert!(p.port.saves().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_falls_back_to_stored_selection() {
        // Clicking into the note field collapses the page selection
        let mut p = page(ScriptedApi::new(), &["p1"]);
        p.surface.select("hello world");
        p.controller.on_key_down(&chord()).await;
        p.surface.deselect();

        p.controller.save().await;

        let saves = p.port.saves();
        assert_eq!(saves[0].text, "hello world");
        assert_eq!(saves[0].selection_rect, Some(rect()));
    }

    #[tokio::test]
    async fn test_save_when_idle_does_nothing() {
        let mut p = page(ScriptedApi::new(), &["p1"]);
        p.controller.save().await;
        assert_eq!(p.controller.state(), &PopupState::Idle);
        assert!(p.port.sent().is_empty());
    }
}
