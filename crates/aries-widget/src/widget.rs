//! The conversation controller.
//!
//! [`ChatWidget`] owns the transcript, the status machine, the panel and the
//! toast queue. It never performs I/O: every operation returns the
//! [`WidgetEffect`]s the host has to carry out (send a request, abort one,
//! scroll, focus), and the host feeds the gate's reply back in as
//! [`ChatEvent`]s through [`ChatWidget::apply`].

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use aries_types::{Message, Role};

use crate::guard::{CharCounter, SubmitGuard};
use crate::panel::{KeyPress, Panel, PanelEffect};
use crate::status::{ChatEvent, ChatStatus, Step, TransitionError};
use crate::toast::{Toast, ToastKind, ToastQueue};

/// Shown for every failed request, whatever the cause.
pub const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

pub const CLEARED: &str = "Conversation cleared";

pub const RETRYING: &str = "Retrying...";

/// Work the host has to carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetEffect {
    /// Post this conversation to the gate and feed the reply back in.
    SendRequest(Vec<Message>),
    /// Abort the request in flight, without waiting for it.
    CancelRequest,
    /// Scroll the transcript to its end on the next paint.
    ScrollToEnd,
    /// Focus the input once `after` has elapsed.
    FocusInput { after: Duration },
}

/// Result of asking to clear the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearRequest {
    /// The transcript was already empty and is now reset.
    Cleared,
    /// Ask the user, then call [`ChatWidget::confirm_clear`] or
    /// [`ChatWidget::cancel_clear`].
    NeedsConfirmation,
}

/// One transcript line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub id: Uuid,
    pub message: Message,
    pub created_at: DateTime<Utc>,
}

impl TranscriptEntry {
    fn new(message: Message) -> Self {
        Self {
            id: Uuid::new_v4(),
            message,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ChatWidget {
    status: ChatStatus,
    transcript: Vec<TranscriptEntry>,
    input: String,
    /// Id of the assistant entry the current reply is written into.
    reply: Option<Uuid>,
    last_error: Option<String>,
    clear_pending: bool,
    guard: SubmitGuard,
    panel: Panel,
    toasts: ToastQueue,
}

impl ChatWidget {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Read-only views ────────────────────────────────────────────────────

    pub fn status(&self) -> ChatStatus {
        self.status
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn counter(&self) -> CharCounter {
        CharCounter::for_input(&self.input)
    }

    /// Reason of the last failure, while in [`ChatStatus::Error`].
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn panel(&self) -> &Panel {
        &self.panel
    }

    pub fn toasts(&self) -> impl Iterator<Item = &Toast> {
        self.toasts.visible()
    }

    // ── Input ──────────────────────────────────────────────────────────────

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Send the current input.
    ///
    /// Rejections by the pre-submit guard become error toasts (an empty
    /// input is dropped silently) and leave the input in place. A submission
    /// while a reply is in flight is ignored.
    pub fn submit(&mut self, now: Instant) -> Vec<WidgetEffect> {
        if self.status.is_busy() {
            debug!(status = %self.status, "submission ignored while busy");
            return Vec::new();
        }

        if let Err(rejection) = self.guard.check(&self.input, self.transcript.len(), now) {
            debug!(%rejection, "submission rejected");
            if let Some(message) = rejection.user_message() {
                self.toasts.push(ToastKind::Error, message);
            }
            return Vec::new();
        }

        let Ok(Step::To(next)) = self.status.step(&ChatEvent::Submit) else {
            return Vec::new();
        };
        self.guard.record(now);

        let text = std::mem::take(&mut self.input).trim().to_owned();
        self.transcript.push(TranscriptEntry::new(Message::user(text)));
        self.begin_request(next)
    }

    /// Re-issue the last turn after a failure.
    pub fn retry(&mut self) -> Result<Vec<WidgetEffect>, TransitionError> {
        let next = self.step(&ChatEvent::Retry)?;

        // The failed turn may have left a partial reply behind.
        if let Some(id) = self.reply.take() {
            self.transcript.retain(|e| e.id != id);
        }
        self.toasts.push(ToastKind::Success, RETRYING);
        Ok(self.begin_request(next))
    }

    /// Stop the reply in flight, keeping what has arrived.
    pub fn stop(&mut self) -> Result<Vec<WidgetEffect>, TransitionError> {
        self.status = self.step(&ChatEvent::Stop)?;
        self.reply = None;
        Ok(vec![WidgetEffect::CancelRequest])
    }

    // ── Gate events ────────────────────────────────────────────────────────

    /// Apply an event produced by the gate client.
    pub fn apply(&mut self, event: ChatEvent) -> Result<Vec<WidgetEffect>, TransitionError> {
        let next = match self.status.step(&event) {
            Ok(Step::To(next)) => next,
            Ok(Step::Ignore) => return Ok(Vec::new()),
            Err(e) => {
                debug!(error = %e, "gate event dropped");
                return Err(e);
            }
        };

        let effects = match event {
            ChatEvent::ChunkReceived(text) => {
                self.append_reply(&text);
                vec![WidgetEffect::ScrollToEnd]
            }
            ChatEvent::StreamEnd => {
                self.reply = None;
                vec![WidgetEffect::ScrollToEnd]
            }
            ChatEvent::Error(reason) => {
                warn!(%reason, "chat request failed");
                self.last_error = Some(reason);
                self.toasts.push(ToastKind::Error, GENERIC_FAILURE);
                vec![WidgetEffect::ScrollToEnd]
            }
            ChatEvent::Submit | ChatEvent::Stop | ChatEvent::Retry | ChatEvent::Clear => {
                // User actions have dedicated methods.
                return Err(TransitionError {
                    from: self.status,
                    event: event.to_string(),
                });
            }
        };
        self.status = next;
        Ok(effects)
    }

    // ── Clearing ───────────────────────────────────────────────────────────

    pub fn request_clear(&mut self) -> Result<ClearRequest, TransitionError> {
        self.status.step(&ChatEvent::Clear)?;
        if self.transcript.is_empty() {
            self.reset();
            return Ok(ClearRequest::Cleared);
        }
        self.clear_pending = true;
        Ok(ClearRequest::NeedsConfirmation)
    }

    /// Clear after the user agreed. Does nothing unless a clear is pending.
    pub fn confirm_clear(&mut self) -> Result<(), TransitionError> {
        if !std::mem::take(&mut self.clear_pending) {
            return Ok(());
        }
        self.step(&ChatEvent::Clear)?;
        self.reset();
        self.toasts.push(ToastKind::Success, CLEARED);
        Ok(())
    }

    pub fn cancel_clear(&mut self) {
        self.clear_pending = false;
    }

    // ── Panel ──────────────────────────────────────────────────────────────

    pub fn toggle_panel(&mut self) -> Vec<WidgetEffect> {
        let effects = self.panel.toggle();
        self.panel_effects(effects)
    }

    pub fn outside_click(&mut self) {
        self.panel.outside_click();
    }

    pub fn key_down(&mut self, press: KeyPress) -> Vec<WidgetEffect> {
        let effects = self.panel.key_down(press, self.status.is_busy());
        self.panel_effects(effects)
    }

    /// Expire old toasts; call from the host's timer.
    pub fn tick(&mut self, now: Instant) {
        self.toasts.expire(now);
    }

    // ── private helpers ────────────────────────────────────────────────────

    fn step(&self, event: &ChatEvent) -> Result<ChatStatus, TransitionError> {
        match self.status.step(event)? {
            Step::To(next) => Ok(next),
            Step::Ignore => Ok(self.status),
        }
    }

    fn begin_request(&mut self, next: ChatStatus) -> Vec<WidgetEffect> {
        self.status = next;
        self.last_error = None;
        self.reply = None;
        // A stopped reply can be empty; the gate refuses messages without content.
        let conversation = self
            .transcript
            .iter()
            .filter(|e| !e.message.content.is_empty())
            .map(|e| e.message.clone())
            .collect();
        vec![
            WidgetEffect::SendRequest(conversation),
            WidgetEffect::ScrollToEnd,
        ]
    }

    fn append_reply(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(id) = self.reply {
            if let Some(entry) = self.transcript.iter_mut().find(|e| e.id == id) {
                entry.message.content.push_str(text);
                return;
            }
        }
        let entry = TranscriptEntry::new(Message::new(Role::Assistant, text));
        self.reply = Some(entry.id);
        self.transcript.push(entry);
    }

    fn reset(&mut self) {
        self.status = ChatStatus::Idle;
        self.transcript.clear();
        self.reply = None;
        self.last_error = None;
        self.clear_pending = false;
    }

    fn panel_effects(&mut self, effects: Vec<PanelEffect>) -> Vec<WidgetEffect> {
        let mut out = Vec::new();
        for effect in effects {
            match effect {
                PanelEffect::FocusInput { after } => out.push(WidgetEffect::FocusInput { after }),
                PanelEffect::CancelGeneration => {
                    if let Ok(mut stop) = self.stop() {
                        out.append(&mut stop);
                    }
                }
            }
        }
        out
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
