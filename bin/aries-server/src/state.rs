//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::config::Config;
use crate::rate_limit::RateLimiter;
use crate::upstream::CompletionProvider;

/// State shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Per-caller admission control for the chat route.
    pub rate_limiter: Arc<dyn RateLimiter>,
    /// Text-generation backend; `None` when no credential is configured.
    pub provider: Option<Arc<dyn CompletionProvider>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("provider_configured", &self.provider.is_some())
            .finish_non_exhaustive()
    }
}
