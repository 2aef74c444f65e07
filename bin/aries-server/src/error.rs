//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are automatically converted
//! to a JSON-body HTTP response with an appropriate status code.
//!
//! **Security note:** configuration and upstream failures are logged with
//! full detail but only a terse message is returned to the caller, so
//! credentials, provider messages and internal state never leak to clients.

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::extract::rejection::BytesRejection;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use aries_types::ValidationError;

use crate::upstream::{UpstreamError, UpstreamErrorKind};

/// All errors that can occur in the gate's request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The body could not be read, usually because it exceeds the limit.
    #[error("request body rejected: {0}")]
    Body(#[from] BytesRejection),

    /// The request body is not JSON.
    #[error("Invalid JSON in request body")]
    InvalidJson(#[source] serde_json::Error),

    /// The conversation failed structural validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The caller exhausted its rate-limit window.
    #[error("rate limit exceeded for caller {key}")]
    RateLimited { key: String, retry_after: Duration },

    /// The gate cannot call the provider as configured.
    #[error("service misconfigured: {0}")]
    ServiceMisconfigured(String),

    /// The provider refused or failed the call before any output.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Body(e) => e.status(),
            ServerError::InvalidJson(_) | ServerError::Validation(_) => StatusCode::BAD_REQUEST,
            ServerError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ServerError::ServiceMisconfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Upstream(e) => match e.kind {
                UpstreamErrorKind::Credentials | UpstreamErrorKind::Quota => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                UpstreamErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                UpstreamErrorKind::Other => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text safe to show the caller.
    fn client_message(&self) -> String {
        match self {
            // Client-facing errors: expose the message directly.
            ServerError::Body(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                "Request body too large".into()
            }
            ServerError::Body(_) => "Invalid request body".into(),
            ServerError::InvalidJson(_) | ServerError::Validation(_) => self.to_string(),
            ServerError::RateLimited { .. } => "Too many requests. Please try again later.".into(),

            ServerError::ServiceMisconfigured(_) => "Service temporarily unavailable".into(),
            ServerError::Upstream(e) => match e.kind {
                UpstreamErrorKind::Credentials => "Service configuration error".into(),
                UpstreamErrorKind::Quota => {
                    "Service temporarily unavailable. Please try again later.".into()
                }
                UpstreamErrorKind::Timeout => "Request timeout. Please try again.".into(),
                UpstreamErrorKind::Other => {
                    "An unexpected error occurred. Please try again.".into()
                }
            },
            ServerError::Internal(_) => "An unexpected error occurred. Please try again.".into(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match &self {
            ServerError::Body(e) => warn!(error = %e, "rejected request body"),
            ServerError::InvalidJson(e) => warn!(error = %e, "rejected malformed JSON body"),
            ServerError::Validation(e) => warn!(reason = %e, "rejected invalid conversation"),
            ServerError::RateLimited { key, .. } => warn!(caller = %key, "rate limit exceeded"),
            ServerError::ServiceMisconfigured(m) => error!(detail = %m, "service misconfigured"),
            ServerError::Upstream(e) => error!(kind = %e.kind, error = %e.message, "Chat API error"),
            ServerError::Internal(m) => error!(detail = %m, "internal server error"),
        }

        let status = self.status();
        let mut response = (status, Json(json!({ "error": self.client_message() }))).into_response();

        if let ServerError::RateLimited { retry_after, .. } = &self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after.as_secs()));
        }
        response
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(e: anyhow::Error) -> Self {
        // Log the full error chain before discarding it so that diagnostic
        // detail survives even though clients only see a generic message.
        error!(error = ?e, "converting anyhow error to ServerError::Internal");
        ServerError::Internal(e.to_string())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
