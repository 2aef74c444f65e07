//! Liveness and readiness of the gate.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_health), components(schemas(HealthBody, UpstreamStatus)))]
pub struct HealthApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

/// Whether chat requests can reach the text-generation API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamStatus {
    Configured,
    /// No credential at startup; `/api/chat` answers 503.
    Missing,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthBody {
    pub status: &'static str,
    pub version: &'static str,
    pub upstream: UpstreamStatus,
    pub model: String,
}

/// The gate itself is up whenever this answers; `upstream` tells whether
/// replies can be generated. Never calls out to the provider.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Gate is running", body = HealthBody)
    )
)]
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<HealthBody> {
    let upstream = match state.provider {
        Some(_) => UpstreamStatus::Configured,
        None => UpstreamStatus::Missing,
    };
    Json(HealthBody {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        upstream,
        model: state.config.model.clone(),
    })
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::Value;

    use crate::config::{API_KEY_VAR, Config};
    use crate::rate_limit::InMemoryRateLimiter;
    use crate::upstream::CompletionProvider;
    use crate::upstream::mock::MockProvider;

    fn state(provider: Option<Arc<dyn CompletionProvider>>) -> Arc<AppState> {
        let with_key = provider.is_some();
        let config = Config::from_lookup(|key| match key {
            API_KEY_VAR if with_key => Some("test-key".into()),
            _ => None,
        });
        Arc::new(AppState {
            rate_limiter: Arc::new(InMemoryRateLimiter::new(10, config.rate_limit_window)),
            config: Arc::new(config),
            provider,
        })
    }

    async fn health(state: Arc<AppState>) -> Value {
        let Json(body) = get_health(State(state)).await;
        serde_json::to_value(body).unwrap()
    }

    #[tokio::test]
    async fn reports_missing_upstream_without_a_credential() {
        let body = health(state(None)).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["upstream"], "missing");
        assert!(!body["version"].as_str().unwrap_or("").is_empty());
    }

    #[tokio::test]
    async fn reports_configured_upstream_and_model() {
        let provider: Arc<dyn CompletionProvider> = Arc::new(MockProvider::replying(&["hi"]));
        let st = state(Some(provider));
        let model = st.config.model.clone();

        let body = health(st).await;
        assert_eq!(body["upstream"], "configured");
        assert_eq!(body["model"], model);
    }
}
