//! The chat route: admission, validation and a streamed reply.
//!
//! Order of checks matters. The rate limit is charged before the body is even
//! parsed, and nothing reaches the provider unless the conversation passed
//! validation and a credential is configured.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, error, info};
use utoipa::OpenApi;
use uuid::Uuid;

use aries_types::stream::{STREAM_HEADER, STREAM_VERSION};
use aries_types::{
    validate_messages, DataStreamPart, FinishReason, Usage, MAX_CONTENT_CHARS, MAX_MESSAGES,
};

use crate::caller::caller_key;
use crate::config::API_KEY_VAR;
use crate::error::ServerError;
use crate::rate_limit::RateDecision;
use crate::schemas::chat::{ChatRequest, ErrorBody};
use crate::state::AppState;
use crate::upstream::{CompletionEvent, CompletionRequest, CompletionStream};

pub const CHAT_PATH: &str = "/api/chat";

/// Shown to the caller when the provider fails mid-reply.
pub const STREAM_FAILURE_MESSAGE: &str = "Sorry, I encountered an error. Please try again.";

#[derive(OpenApi)]
#[openapi(paths(chat), components(schemas(ChatRequest, ErrorBody)))]
pub struct ChatApi;

/// Largest accepted body: a full conversation with every character escaped
/// as `\uXXXX`, plus room for the JSON around it.
pub const MAX_BODY_BYTES: usize = MAX_MESSAGES * MAX_CONTENT_CHARS * 6 + 64 * 1024;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(CHAT_PATH, post(chat))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

/// Stream an assistant reply to a conversation (`POST /api/chat`).
///
/// The body is read as raw bytes rather than through `Json` so that malformed
/// JSON and malformed conversations each get their documented message.
#[utoipa::path(
    post,
    path = "/api/chat",
    tag = "chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Reply streamed in the data-stream protocol", content_type = "text/plain"),
        (status = 400, description = "Invalid JSON or conversation", body = ErrorBody),
        (status = 413, description = "Body larger than any valid conversation", body = ErrorBody),
        (status = 429, description = "Rate limit exceeded; see Retry-After", body = ErrorBody),
        (status = 503, description = "Provider unavailable or not configured", body = ErrorBody),
        (status = 504, description = "Provider timed out", body = ErrorBody),
        (status = 500, description = "Unexpected failure", body = ErrorBody),
    )
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ServerError> {
    let key = caller_key(&headers);
    match state.rate_limiter.check(&key).await {
        RateDecision::Denied { retry_after } => {
            return Err(ServerError::RateLimited { key, retry_after });
        }
        RateDecision::Allowed { remaining } => {
            debug!(caller = %key, remaining, "rate limit check passed");
        }
    }

    let body = body?;
    let payload: Value = serde_json::from_slice(&body).map_err(ServerError::InvalidJson)?;
    let messages = validate_messages(payload.get("messages"))?;

    let Some(provider) = state.provider.as_ref() else {
        return Err(ServerError::ServiceMisconfigured(format!(
            "{API_KEY_VAR} not configured"
        )));
    };

    info!(caller = %key, messages = messages.len(), "chat request accepted");

    let upstream = provider
        .stream_completion(CompletionRequest::for_conversation(messages))
        .await?;

    let message_id = format!("msg-{}", Uuid::new_v4().simple());
    Ok(stream_response(relay_reply(message_id, upstream)))
}

fn stream_response<S>(parts: S) -> Response
where
    S: Stream<Item = DataStreamPart> + Send + 'static,
{
    let body = Body::from_stream(
        parts.map(|part| Ok::<_, Infallible>(Bytes::from(part.encode()))),
    );

    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8")),
            (
                HeaderName::from_static(STREAM_HEADER),
                HeaderValue::from_static(STREAM_VERSION),
            ),
            (
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-cache, no-store, must-revalidate"),
            ),
            (header::PRAGMA, HeaderValue::from_static("no-cache")),
            (header::EXPIRES, HeaderValue::from_static("0")),
        ],
        body,
    )
        .into_response()
}

/// Translate provider events into protocol parts as they arrive.
///
/// Always opens with a start part and closes with the finish pair, unless the
/// provider fails: the failure is logged and replaced by a single error part,
/// after which the reply ends.
fn relay_reply(
    message_id: String,
    upstream: CompletionStream,
) -> impl Stream<Item = DataStreamPart> + Send + 'static {
    let start = stream::once(async move { DataStreamPart::StartStep { message_id } });

    let rest = stream::unfold(Some((upstream, false)), |state| async move {
        let (mut upstream, finished) = state?;
        match upstream.next().await {
            Some(Ok(CompletionEvent::TextDelta(text))) => {
                Some((vec![DataStreamPart::Text(text)], Some((upstream, finished))))
            }
            Some(Ok(CompletionEvent::Finish { reason, usage })) => {
                debug!(finish_reason = %reason, ?usage, "reply finished");
                Some((finish_parts(reason, usage), Some((upstream, true))))
            }
            Some(Err(e)) => {
                error!(kind = %e.kind, error = %e.message, "Stream error");
                Some((
                    vec![DataStreamPart::Error(STREAM_FAILURE_MESSAGE.to_owned())],
                    None,
                ))
            }
            None if finished => None,
            // Provider closed without a finish event.
            None => Some((finish_parts(FinishReason::Unknown, Usage::default()), None)),
        }
    })
    .flat_map(stream::iter);

    start.chain(rest)
}

fn finish_parts(finish_reason: FinishReason, usage: Usage) -> Vec<DataStreamPart> {
    vec![
        DataStreamPart::FinishStep {
            finish_reason,
            usage,
            is_continued: false,
        },
        DataStreamPart::FinishMessage {
            finish_reason,
            usage,
        },
    ]
}

// ── Tests ──────────────────────────────────────────────────────────────────────
