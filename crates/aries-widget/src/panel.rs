//! Open/closed state of the floating chat panel and its keyboard handling.

use std::time::Duration;

/// Delay before the input receives focus after the panel opens.
pub const FOCUS_DELAY: Duration = Duration::from_millis(150);

/// A key the host forwards to the widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Escape,
    Enter,
}

/// A key press with the modifiers the panel cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub key: Key,
    pub ctrl: bool,
    /// Cmd on macOS.
    pub meta: bool,
}

impl KeyPress {
    pub fn plain(key: Key) -> Self {
        Self {
            key,
            ctrl: false,
            meta: false,
        }
    }

    pub fn ctrl(c: char) -> Self {
        Self {
            key: Key::Char(c),
            ctrl: true,
            meta: false,
        }
    }

    pub fn meta(c: char) -> Self {
        Self {
            key: Key::Char(c),
            ctrl: false,
            meta: true,
        }
    }

    fn is_open_shortcut(&self) -> bool {
        (self.ctrl || self.meta) && self.key == Key::Char('k')
    }
}

/// Work the host must do after a panel change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelEffect {
    /// Focus the input once `after` has elapsed.
    FocusInput { after: Duration },
    /// Abort the generation in flight.
    CancelGeneration,
}

#[derive(Debug, Clone, Default)]
pub struct Panel {
    open: bool,
}

impl Panel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// The launcher button.
    pub fn toggle(&mut self) -> Vec<PanelEffect> {
        if self.open {
            self.open = false;
            Vec::new()
        } else {
            self.open()
        }
    }

    pub fn open(&mut self) -> Vec<PanelEffect> {
        if self.open {
            return Vec::new();
        }
        self.open = true;
        vec![PanelEffect::FocusInput { after: FOCUS_DELAY }]
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    /// A click that landed outside the panel.
    pub fn outside_click(&mut self) {
        self.close();
    }

    /// Global key handler. `generating` tells whether a reply is in flight.
    pub fn key_down(&mut self, press: KeyPress, generating: bool) -> Vec<PanelEffect> {
        if press.is_open_shortcut() {
            return self.open();
        }
        if press.key == Key::Escape {
            self.close();
            if generating {
                return vec![PanelEffect::CancelGeneration];
            }
        }
        Vec::new()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
