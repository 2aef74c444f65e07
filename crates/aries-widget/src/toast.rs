//! Short-lived notifications.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use strum::Display;

/// How long a toast stays visible.
pub const TOAST_LIFETIME: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ToastKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    /// Increases with every toast, so hosts can tell new ones apart.
    pub id: u64,
    pub kind: ToastKind,
    pub message: String,
    pub expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct ToastQueue {
    next_id: u64,
    toasts: VecDeque<Toast>,
}

impl ToastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: ToastKind, message: impl Into<String>) -> u64 {
        self.push_at(kind, message, Instant::now())
    }

    pub fn push_at(&mut self, kind: ToastKind, message: impl Into<String>, now: Instant) -> u64 {
        self.next_id += 1;
        self.toasts.push_back(Toast {
            id: self.next_id,
            kind,
            message: message.into(),
            expires_at: now + TOAST_LIFETIME,
        });
        self.next_id
    }

    /// Drop every toast that has outlived [`TOAST_LIFETIME`].
    pub fn expire(&mut self, now: Instant) {
        self.toasts.retain(|t| now < t.expires_at);
    }

    /// Toasts still on screen, oldest first.
    pub fn visible(&self) -> impl Iterator<Item = &Toast> {
        self.toasts.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn toasts_dismiss_themselves_after_three_seconds() {
        let mut queue = ToastQueue::new();
        let t0 = Instant::now();
        queue.push_at(ToastKind::Success, "Conversation cleared", t0);
        queue.push_at(ToastKind::Error, "later", t0 + Duration::from_secs(2));

        queue.expire(t0 + Duration::from_millis(2999));
        assert_eq!(queue.visible().count(), 2);

        queue.expire(t0 + TOAST_LIFETIME);
        let left: Vec<_> = queue.visible().map(|t| t.message.as_str()).collect();
        assert_eq!(left, ["later"]);
    }

    #[test]
    fn ids_increase() {
        let mut queue = ToastQueue::new();
        let a = queue.push(ToastKind::Error, "a");
        let b = queue.push(ToastKind::Error, "b");
        assert!(b > a);
    }
}
