//! Per-caller request rate limiting.
//!
//! Handlers talk to [`RateLimiter`] only. [`InMemoryRateLimiter`] keeps the
//! table in process memory, so limits are neither shared between processes
//! nor kept across restarts; a shared store can implement the same trait.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Denied { retry_after: Duration },
}

impl RateDecision {
    #[cfg(test)]
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Decides whether a caller may issue another request.
#[async_trait]
pub trait RateLimiter: Send + Sync + 'static {
    /// Record an attempt by `key` and decide whether it is allowed.
    async fn check(&self, key: &str) -> RateDecision;
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    reset_at: Instant,
}

/// Fixed-length windows per key, evicted lazily.
///
/// A key's window opens on its first request and lasts `window`; at most
/// `max_requests` attempts are allowed inside it. Denied attempts are not
/// counted. Every check first drops all expired keys, so the table never
/// holds more than the callers active within one window.
#[derive(Debug)]
pub struct InMemoryRateLimiter {
    max_requests: u32,
    window: Duration,
    entries: Mutex<HashMap<String, WindowEntry>>,
}

impl InMemoryRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// [`RateLimiter::check`] against an explicit clock reading.
    pub fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            // A panic while holding the lock cannot leave an entry half
            // written, so the table is still usable.
            Err(poisoned) => poisoned.into_inner(),
        };

        entries.retain(|_, e| now <= e.reset_at);

        match entries.get_mut(key) {
            None => {
                entries.insert(
                    key.to_owned(),
                    WindowEntry {
                        count: 1,
                        reset_at: now + self.window,
                    },
                );
                debug!(caller = %key, "rate limit window opened");
                RateDecision::Allowed {
                    remaining: self.max_requests.saturating_sub(1),
                }
            }
            Some(entry) if entry.count >= self.max_requests => RateDecision::Denied {
                retry_after: self.window,
            },
            Some(entry) => {
                entry.count += 1;
                debug!(caller = %key, count = entry.count, max = self.max_requests, "rate limit ok");
                RateDecision::Allowed {
                    remaining: self.max_requests - entry.count,
                }
            }
        }
    }

    /// Number of keys currently tracked.
    #[cfg(test)]
    pub fn tracked_keys(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn eleventh_request_in_a_window_is_denied() {
        let rl = InMemoryRateLimiter::new(10, WINDOW);
        let t0 = Instant::now();

        for i in 0..10 {
            let at = t0 + Duration::from_secs(i * 5);
            assert!(rl.check_at("1.2.3.4", at).is_allowed(), "request {i} should pass");
        }
        assert_eq!(
            rl.check_at("1.2.3.4", t0 + Duration::from_secs(59)),
            RateDecision::Denied { retry_after: WINDOW }
        );
    }

    #[test]
    fn remaining_counts_down() {
        let rl = InMemoryRateLimiter::new(3, WINDOW);
        let t0 = Instant::now();
        assert_eq!(rl.check_at("k", t0), RateDecision::Allowed { remaining: 2 });
        assert_eq!(rl.check_at("k", t0), RateDecision::Allowed { remaining: 1 });
        assert_eq!(rl.check_at("k", t0), RateDecision::Allowed { remaining: 0 });
        assert!(!rl.check_at("k", t0).is_allowed());
    }

    #[test]
    fn window_resets_after_expiry() {
        let rl = InMemoryRateLimiter::new(2, WINDOW);
        let t0 = Instant::now();
        rl.check_at("k", t0);
        rl.check_at("k", t0);
        assert!(!rl.check_at("k", t0 + Duration::from_secs(30)).is_allowed());

        // Still inside the window at exactly reset time.
        assert!(!rl.check_at("k", t0 + WINDOW).is_allowed());

        let later = t0 + WINDOW + Duration::from_millis(1);
        assert_eq!(rl.check_at("k", later), RateDecision::Allowed { remaining: 1 });
    }

    #[test]
    fn denied_attempts_do_not_extend_the_window() {
        let rl = InMemoryRateLimiter::new(1, WINDOW);
        let t0 = Instant::now();
        rl.check_at("k", t0);
        for s in 1..60 {
            assert!(!rl.check_at("k", t0 + Duration::from_secs(s)).is_allowed());
        }
        assert!(rl.check_at("k", t0 + Duration::from_secs(61)).is_allowed());
    }

    #[test]
    fn keys_are_independent() {
        let rl = InMemoryRateLimiter::new(1, WINDOW);
        let t0 = Instant::now();
        assert!(rl.check_at("a", t0).is_allowed());
        assert!(!rl.check_at("a", t0).is_allowed());
        assert!(rl.check_at("b", t0).is_allowed());
    }

    #[test]
    fn expired_keys_are_swept_on_any_check() {
        let rl = InMemoryRateLimiter::new(5, WINDOW);
        let t0 = Instant::now();
        for key in ["a", "b", "c"] {
            rl.check_at(key, t0);
        }
        assert_eq!(rl.tracked_keys(), 3);

        rl.check_at("d", t0 + WINDOW + Duration::from_secs(1));
        assert_eq!(rl.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn trait_object_checks_against_the_wall_clock() {
        let rl: std::sync::Arc<dyn RateLimiter> = std::sync::Arc::new(InMemoryRateLimiter::new(1, WINDOW));
        assert!(rl.check("unknown").await.is_allowed());
        assert!(!rl.check("unknown").await.is_allowed());
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Inside one window exactly `min(n, max)` of `n` attempts pass.
            #[test]
            fn burst_inside_one_window_is_capped(gaps in proptest::collection::vec(0u64..500, 1..100)) {
                let max = 10;
                let rl = InMemoryRateLimiter::new(max, WINDOW);
                let t0 = Instant::now();
                let mut at = Duration::ZERO;
                let mut accepted = 0usize;

                for gap in &gaps {
                    at += Duration::from_millis(*gap);
                    if rl.check_at("k", t0 + at).is_allowed() {
                        accepted += 1;
                    }
                }

                prop_assert!(at <= WINDOW);
                prop_assert_eq!(accepted, gaps.len().min(max as usize));
            }

            /// A key idle for longer than the window always starts over.
            #[test]
            fn idle_key_starts_a_fresh_window(used in 1u32..30, idle_ms in 60_001u64..600_000) {
                let rl = InMemoryRateLimiter::new(10, WINDOW);
                let t0 = Instant::now();
                for _ in 0..used {
                    rl.check_at("k", t0);
                }
                let later = t0 + Duration::from_millis(idle_ms);
                prop_assert_eq!(rl.check_at("k", later), RateDecision::Allowed { remaining: 9 });
            }
        }
    }
}
