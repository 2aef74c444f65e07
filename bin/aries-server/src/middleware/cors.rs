use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::Config;

/// How long browsers may cache a preflight answer.
pub const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(86_400);

/// CORS policy for the gate.
///
/// Preflight requests are answered here without reaching a handler: 200,
/// methods `POST, OPTIONS`, headers `Content-Type, Authorization`, cached for
/// one day.
pub fn cors_layer(config: &Config) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(allowed_origins(config.cors_allowed_origins.as_deref()))
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(PREFLIGHT_MAX_AGE)
}

fn allowed_origins(configured: Option<&str>) -> AllowOrigin {
    let origins: Vec<HeaderValue> = configured
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .filter(|v: &HeaderValue| !v.is_empty())
        .collect();

    if origins.is_empty() {
        // Wildcard; set ARIES_CORS_ORIGINS to restrict.
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    }
}
