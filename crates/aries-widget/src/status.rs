//! Lifecycle of one conversation as an explicit state machine.

use strum::{AsRefStr, Display};
use thiserror::Error;

/// Where the widget is in its request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ChatStatus {
    /// Nothing sent yet, or the transcript was cleared.
    #[default]
    Idle,
    /// A request is in flight and no text has arrived.
    Submitted,
    /// Reply text is arriving.
    Streaming,
    /// The last reply finished or was stopped.
    Ready,
    /// The last request failed; a retry is possible.
    Error,
}

impl ChatStatus {
    /// A generation is in flight.
    pub fn is_busy(self) -> bool {
        matches!(self, ChatStatus::Submitted | ChatStatus::Streaming)
    }
}

/// Inputs that move the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ChatEvent {
    Submit,
    ChunkReceived(String),
    StreamEnd,
    Error(String),
    Stop,
    Retry,
    Clear,
}

/// What an accepted event does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Move to this status.
    To(ChatStatus),
    /// Leave everything as it is.
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot apply '{event}' while {from}")]
pub struct TransitionError {
    pub from: ChatStatus,
    pub event: String,
}

impl ChatStatus {
    /// Decide the effect of `event` in this status.
    ///
    /// A second submission while a request is in flight is ignored; every
    /// other event outside its row is a [`TransitionError`].
    pub fn step(self, event: &ChatEvent) -> Result<Step, TransitionError> {
        use ChatStatus as S;

        let next = match (self, event) {
            (S::Idle | S::Ready | S::Error, ChatEvent::Submit) => S::Submitted,
            (S::Submitted | S::Streaming, ChatEvent::Submit) => return Ok(Step::Ignore),
            (S::Submitted | S::Streaming, ChatEvent::ChunkReceived(_)) => S::Streaming,
            (S::Submitted | S::Streaming, ChatEvent::StreamEnd) => S::Ready,
            (S::Submitted | S::Streaming, ChatEvent::Error(_)) => S::Error,
            (S::Submitted | S::Streaming, ChatEvent::Stop) => S::Ready,
            (S::Error, ChatEvent::Retry) => S::Submitted,
            (S::Idle | S::Ready | S::Error, ChatEvent::Clear) => S::Idle,
            (from, event) => {
                return Err(TransitionError {
                    from,
                    event: event.to_string(),
                });
            }
        };
        Ok(Step::To(next))
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    fn to(s: ChatStatus) -> Result<Step, TransitionError> {
        Ok(Step::To(s))
    }

    #[test]
    fn happy_path() {
        let mut status = ChatStatus::Idle;
        for (event, expected) in [
            (ChatEvent::Submit, ChatStatus::Submitted),
            (ChatEvent::ChunkReceived("Hel".into()), ChatStatus::Streaming),
            (ChatEvent::ChunkReceived("lo".into()), ChatStatus::Streaming),
            (ChatEvent::StreamEnd, ChatStatus::Ready),
            (ChatEvent::Submit, ChatStatus::Submitted),
        ] {
            let Ok(Step::To(next)) = status.step(&event) else {
                panic!("{event} rejected in {status}");
            };
            assert_eq!(next, expected);
            status = next;
        }
    }

    #[test]
    fn submit_while_busy_is_ignored() {
        assert_eq!(ChatStatus::Submitted.step(&ChatEvent::Submit), Ok(Step::Ignore));
        assert_eq!(ChatStatus::Streaming.step(&ChatEvent::Submit), Ok(Step::Ignore));
    }

    #[test]
    fn stop_and_failure_only_apply_in_flight() {
        assert_eq!(ChatStatus::Streaming.step(&ChatEvent::Stop), to(ChatStatus::Ready));
        assert_eq!(ChatStatus::Submitted.step(&ChatEvent::Stop), to(ChatStatus::Ready));
        assert_eq!(
            ChatStatus::Submitted.step(&ChatEvent::Error("boom".into())),
            to(ChatStatus::Error)
        );
        assert!(ChatStatus::Ready.step(&ChatEvent::Stop).is_err());
        assert!(ChatStatus::Idle.step(&ChatEvent::StreamEnd).is_err());
    }

    #[test]
    fn late_chunks_after_stop_are_rejected() {
        let err = ChatStatus::Ready
            .step(&ChatEvent::ChunkReceived("late".into()))
            .unwrap_err();
        assert_eq!(err.from, ChatStatus::Ready);
        assert_eq!(err.to_string(), "cannot apply 'chunk_received' while ready");
    }

    #[test]
    fn retry_only_from_error() {
        assert_eq!(ChatStatus::Error.step(&ChatEvent::Retry), to(ChatStatus::Submitted));
        for status in [ChatStatus::Idle, ChatStatus::Ready, ChatStatus::Streaming] {
            assert!(status.step(&ChatEvent::Retry).is_err(), "{status}");
        }
    }

    #[test]
    fn clear_is_refused_mid_generation() {
        for status in [ChatStatus::Idle, ChatStatus::Ready, ChatStatus::Error] {
            assert_eq!(status.step(&ChatEvent::Clear), to(ChatStatus::Idle));
        }
        assert!(ChatStatus::Submitted.step(&ChatEvent::Clear).is_err());
        assert!(ChatStatus::Streaming.step(&ChatEvent::Clear).is_err());
    }
}
