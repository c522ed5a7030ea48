// Selection tracking on the page
// Remembers the last acceptable selection; never shows UI by itself

use super::port::PageSurface;
use crate::models::{SelectionRect, MAX_SELECTION_CHARS};

/// Keyboard event as seen by the page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: String,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
    pub alt: bool,
}

impl KeyEvent {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    /// Ctrl on Linux/Windows, Cmd on macOS
    pub fn primary(&self) -> bool {
        self.ctrl || self.meta
    }

    /// Key-up that may have changed the selection
    pub fn is_selection_key(&self) -> bool {
        const NAV_KEYS: &[&str] = &[
            "ArrowLeft",
            "ArrowRight",
            "ArrowUp",
            "ArrowDown",
            "Home",
            "End",
            "PageUp",
            "PageDown",
        ];
        (self.shift && NAV_KEYS.contains(&self.key.as_str()))
            || (self.primary() && self.key.eq_ignore_ascii_case("a"))
    }
}

/// Key combination that opens the highlight popup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chord {
    pub key: String,
    pub primary: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Default for Chord {
    /// Ctrl/Cmd + Shift + H
    fn default() -> Self {
        Self {
            key: "h".to_string(),
            primary: true,
            shift: true,
            alt: false,
        }
    }
}

impl Chord {
    /// Parse `"Ctrl+Shift+H"`-style strings. `Ctrl`, `Cmd`, `Meta` and
    /// `Primary` all mean the platform's primary modifier.
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut chord = Chord {
            key: String::new(),
            primary: false,
            shift: false,
            alt: false,
        };

        for part in s.split('+').map(str::trim) {
            match part.to_ascii_lowercase().as_str() {
                "ctrl" | "control" | "cmd" | "command" | "meta" | "primary" => chord.primary = true,
                "shift" => chord.shift = true,
                "alt" | "option" => chord.alt = true,
                "" => return Err(format!("Invalid shortcut: {}", s)),
                key if chord.key.is_empty() => chord.key = key.to_string(),
                _ => return Err(format!("Shortcut has more than one key: {}", s)),
            }
        }

        if chord.key.is_empty() {
            return Err(format!("Shortcut has no key: {}", s));
        }
        Ok(chord)
    }

    pub fn matches(&self, event: &KeyEvent) -> bool {
        event.key.eq_ignore_ascii_case(&self.key)
            && event.primary() == self.primary
            && event.shift == self.shift
            && event.alt == self.alt
    }
}

/// Trimmed selection text if it is within bounds
pub fn accept_selection(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let chars = trimmed.chars().count();
    if chars > 0 && chars < MAX_SELECTION_CHARS {
        Some(trimmed.to_string())
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedSelection {
    pub text: String,
    pub rect: Option<SelectionRect>,
}

#[derive(Debug, Default)]
pub struct SelectionTracker {
    current: Option<TrackedSelection>,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_pointer_up(&mut self, surface: &dyn PageSurface) {
        self.refresh(surface);
    }

    pub fn on_key_up(&mut self, event: &KeyEvent, surface: &dyn PageSurface) {
        if event.is_selection_key() {
            self.refresh(surface);
        }
    }

    /// Re-read the live selection. Out-of-bounds or empty selections clear
    /// the stored one; events while typing in an editable field are ignored.
    pub fn refresh(&mut self, surface: &dyn PageSurface) {
        if surface.focus_in_editable() {
            return;
        }

        self.current = surface.live_selection().and_then(|live| {
            accept_selection(&live.text).map(|text| TrackedSelection {
                text,
                rect: live.rect,
            })
        });
    }

    pub fn current(&self) -> Option<&TrackedSelection> {
        self.current.as_ref()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}
