//! Recording doubles for the page seams. Surface and port share one event log
//! so tests can assert the exact interleaving of page effects and messages.

use super::port::{BackgroundPort, Indicator, LiveSelection, PageSurface, PopupView};
use crate::background::protocol::{ExtensionRequest, ExtensionResponse};
use crate::models::{fixtures::rect, HighlightDraft};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    ReadSelection,
    ReadNote,
    ShowPopup(PopupView),
    HidePopup,
    Indicator(Indicator),
    Flash(String),
    ClearSelection,
    Frame,
    /// A message went to the background, by action name
    Sent(String),
}

pub type EventLog = Arc<Mutex<Vec<(Instant, SurfaceEvent)>>>;

fn record(log: &EventLog, event: SurfaceEvent) {
    log.lock().unwrap().push((Instant::now(), event));
}

#[derive(Default)]
struct PageState {
    selection: Option<LiveSelection>,
    editable_focus: bool,
    note: String,
}

pub struct RecordingSurface {
    state: Mutex<PageState>,
    log: EventLog,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PageState::default()),
            log: EventLog::default(),
        }
    }

    pub fn log(&self) -> EventLog {
        Arc::clone(&self.log)
    }

    pub fn select(&self, text: &str) {
        self.state.lock().unwrap().selection = Some(LiveSelection {
            text: text.to_string(),
            rect: Some(rect()),
        });
    }

    pub fn deselect(&self) {
        self.state.lock().unwrap().selection = None;
    }

    pub fn set_editable_focus(&self, focused: bool) {
        self.state.lock().unwrap().editable_focus = focused;
    }

    pub fn set_note(&self, note: &str) {
        self.state.lock().unwrap().note = note.to_string();
    }

    pub fn events(&self) -> Vec<(Instant, SurfaceEvent)> {
        self.log.lock().unwrap().clone()
    }

    pub fn last_event(&self) -> Option<SurfaceEvent> {
        self.log.lock().unwrap().last().map(|(_, e)| e.clone())
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    pub fn popups_shown(&self) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, e)| matches!(e, SurfaceEvent::ShowPopup(_)))
            .count()
    }
}

#[async_trait]
impl PageSurface for RecordingSurface {
    fn live_selection(&self) -> Option<LiveSelection> {
        record(&self.log, SurfaceEvent::ReadSelection);
        self.state.lock().unwrap().selection.clone()
    }

    fn focus_in_editable(&self) -> bool {
        self.state.lock().unwrap().editable_focus
    }

    fn page_url(&self) -> String {
        "https://example.com/article".to_string()
    }

    fn page_title(&self) -> String {
        "An Article".to_string()
    }

    fn read_note(&self) -> String {
        record(&self.log, SurfaceEvent::ReadNote);
        self.state.lock().unwrap().note.clone()
    }

    fn show_popup(&self, view: &PopupView) {
        record(&self.log, SurfaceEvent::ShowPopup(view.clone()));
    }

    fn hide_popup(&self) {
        record(&self.log, SurfaceEvent::HidePopup);
    }

    fn show_indicator(&self, indicator: Indicator) {
        record(&self.log, SurfaceEvent::Indicator(indicator));
    }

    fn flash_highlight(&self, text: &str) {
        record(&self.log, SurfaceEvent::Flash(text.to_string()));
    }

    fn clear_selection(&self) {
        record(&self.log, SurfaceEvent::ClearSelection);
        self.state.lock().unwrap().selection = None;
    }

    async fn next_frame(&self) {
        tokio::task::yield_now().await;
        record(&self.log, SurfaceEvent::Frame);
    }
}

/// Forwards to a real port and records every request into the shared log
pub struct RecordingPort {
    inner: Arc<dyn BackgroundPort>,
    log: EventLog,
    requests: Mutex<Vec<ExtensionRequest>>,
}

impl RecordingPort {
    pub fn new(inner: Arc<dyn BackgroundPort>, log: EventLog) -> Self {
        Self {
            inner,
            log,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Action names, in send order
    pub fn sent(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.action().to_string())
            .collect()
    }

    pub fn saves(&self) -> Vec<HighlightDraft> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| match r {
                ExtensionRequest::SaveHighlight { highlight, .. } => Some(highlight.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl BackgroundPort for RecordingPort {
    async fn send(&self, request: ExtensionRequest) -> Result<ExtensionResponse> {
        record(&self.log, SurfaceEvent::Sent(request.action().to_string()));
        self.requests.lock().unwrap().push(request.clone());
        self.inner.send(request).await
    }
}
