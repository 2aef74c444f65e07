//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS with preflight handling, per-request trace-ID injection)
//! - The chat route `/api/chat`
//! - Health / heartbeat route
//! - Optional OpenAPI document (disable with `ARIES_ENABLE_DOCS=false`)

pub mod chat;
pub mod doc;
mod health;

use axum::{middleware, Router};
use std::sync::Arc;
use tower::ServiceBuilder;

use crate::middleware::{cors, trace};
use crate::state::AppState;

// ── Router builder ────────────────────────────────────────────────────────────

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .merge(health::router())
        .merge(chat::router());

    // Enabled by default; disable in production to avoid exposing the API
    // structure.
    if state.config.enable_docs {
        app = app.merge(doc::router());
    }

    app
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(&state.config)))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}

#[cfg(test)]
mod test {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::rate_limit::InMemoryRateLimiter;

    fn state_with(vars: &'static [(&'static str, &'static str)]) -> Arc<AppState> {
        let config = Config::from_lookup(|key| {
            vars.iter().find(|(k, _)| *k == key).map(|(_, v)| (*v).to_owned())
        });
        Arc::new(AppState {
            rate_limiter: Arc::new(InMemoryRateLimiter::new(10, config.rate_limit_window)),
            config: Arc::new(config),
            provider: None,
        })
    }

    async fn get(app: Router, uri: &str) -> StatusCode {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn docs_are_served_by_default() {
        let app = build(state_with(&[]));
        assert_eq!(get(app.clone(), doc::OPENAPI_PATH).await, StatusCode::OK);
        assert_eq!(get(app, "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn docs_can_be_disabled() {
        let app = build(state_with(&[("ARIES_ENABLE_DOCS", "false")]));
        assert_eq!(get(app, doc::OPENAPI_PATH).await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn incoming_trace_id_is_echoed() {
        let id = "6f1c5d1e-7a53-4f4e-9a51-0c4b1f3d2e10";
        let req = Request::builder()
            .uri("/health")
            .header(trace::X_TRACE_ID, id)
            .body(Body::empty())
            .unwrap();
        let resp = build(state_with(&[])).oneshot(req).await.unwrap();
        assert_eq!(resp.headers()[trace::X_TRACE_ID], id);
    }
}
