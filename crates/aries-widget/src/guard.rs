//! Checks run on the input before a submission leaves the widget.
//!
//! They mirror the gate's limits so the user hears about a problem at once;
//! the gate still enforces every one of them on its own.

use std::time::{Duration, Instant};

use thiserror::Error;

use aries_types::{char_len, MAX_CONTENT_CHARS, MAX_MESSAGES};

/// Minimum spacing between two accepted submissions.
pub const SUBMIT_COOLDOWN: Duration = Duration::from_secs(1);

/// Input length above which the counter is shown.
pub const COUNTER_VISIBLE_ABOVE: usize = 3500;

/// Input length above which the counter turns into a warning.
pub const COUNTER_WARNING_ABOVE: usize = 3900;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GuardRejection {
    /// Nothing to send; the widget stays quiet.
    #[error("empty message")]
    Empty,

    #[error("Message too long. Please keep it under 4000 characters.")]
    TooLong,

    #[error("Please wait a moment before sending another message.")]
    TooSoon,

    #[error("Conversation is too long. Please start a new chat.")]
    ConversationTooLong,
}

impl GuardRejection {
    /// Text to show the user, if any.
    pub fn user_message(&self) -> Option<String> {
        match self {
            GuardRejection::Empty => None,
            other => Some(other.to_string()),
        }
    }
}

/// Remembers the last accepted submission for the cooldown check.
#[derive(Debug, Clone, Default)]
pub struct SubmitGuard {
    last_accepted: Option<Instant>,
}

impl SubmitGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every check, in order, against the current input.
    pub fn check(
        &self,
        input: &str,
        transcript_len: usize,
        now: Instant,
    ) -> Result<(), GuardRejection> {
        let text = input.trim();
        if text.is_empty() {
            return Err(GuardRejection::Empty);
        }
        if char_len(text) > MAX_CONTENT_CHARS {
            return Err(GuardRejection::TooLong);
        }
        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < SUBMIT_COOLDOWN {
                return Err(GuardRejection::TooSoon);
            }
        }
        if transcript_len >= MAX_MESSAGES {
            return Err(GuardRejection::ConversationTooLong);
        }
        Ok(())
    }

    /// Start the cooldown; call once a submission was accepted.
    pub fn record(&mut self, now: Instant) {
        self.last_accepted = Some(now);
    }
}

/// How the character counter under the input should look.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharCounter {
    Hidden,
    Shown { count: usize, max: usize },
    Warning { count: usize, max: usize },
}

impl CharCounter {
    pub fn for_input(input: &str) -> Self {
        let count = char_len(input);
        let max = MAX_CONTENT_CHARS;
        if count > COUNTER_WARNING_ABOVE {
            CharCounter::Warning { count, max }
        } else if count > COUNTER_VISIBLE_ABOVE {
            CharCounter::Shown { count, max }
        } else {
            CharCounter::Hidden
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn blank_input_is_rejected_silently() {
        let guard = SubmitGuard::new();
        let err = guard.check("  \n\t ", 0, Instant::now()).unwrap_err();
        assert_eq!(err, GuardRejection::Empty);
        assert_eq!(err.user_message(), None);
    }

    #[test]
    fn length_is_counted_in_characters_after_trimming() {
        let guard = SubmitGuard::new();
        let now = Instant::now();
        assert!(guard.check(&"é".repeat(4000), 0, now).is_ok());
        assert!(guard.check(&format!("  {}  ", "a".repeat(4000)), 0, now).is_ok());
        assert_eq!(
            guard.check(&"a".repeat(4001), 0, now),
            Err(GuardRejection::TooLong)
        );
    }

    #[test]
    fn cooldown_starts_at_the_last_accepted_submission() {
        let mut guard = SubmitGuard::new();
        let t0 = Instant::now();
        assert!(guard.check("hi", 0, t0).is_ok());
        guard.record(t0);

        let err = guard
            .check("again", 2, t0 + Duration::from_millis(999))
            .unwrap_err();
        assert_eq!(
            err.user_message().as_deref(),
            Some("Please wait a moment before sending another message.")
        );
        assert!(guard.check("again", 2, t0 + SUBMIT_COOLDOWN).is_ok());
    }

    #[test]
    fn checks_run_in_order() {
        let mut guard = SubmitGuard::new();
        let t0 = Instant::now();
        guard.record(t0);
        // Too long wins over too soon and over a full transcript.
        assert_eq!(
            guard.check(&"a".repeat(4001), 50, t0),
            Err(GuardRejection::TooLong)
        );
        // Too soon wins over a full transcript.
        assert_eq!(guard.check("hi", 50, t0), Err(GuardRejection::TooSoon));
    }

    #[test]
    fn full_transcript_is_rejected() {
        let guard = SubmitGuard::new();
        assert!(guard.check("hi", 49, Instant::now()).is_ok());
        assert_eq!(
            guard.check("hi", 50, Instant::now()),
            Err(GuardRejection::ConversationTooLong)
        );
    }

    #[test]
    fn counter_thresholds() {
        assert_eq!(CharCounter::for_input(&"a".repeat(3500)), CharCounter::Hidden);
        assert_eq!(
            CharCounter::for_input(&"a".repeat(3501)),
            CharCounter::Shown { count: 3501, max: 4000 }
        );
        assert_eq!(
            CharCounter::for_input(&"a".repeat(3901)),
            CharCounter::Warning { count: 3901, max: 4000 }
        );
    }
}
