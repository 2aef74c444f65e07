//! Google Generative Language API client (`streamGenerateContent`).

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use aries_types::{FinishReason, Role, Usage};

use super::sse::SseDecoder;
use super::{
    CompletionEvent, CompletionProvider, CompletionRequest, CompletionStream, UpstreamError,
    UpstreamErrorKind,
};
use crate::config::Config;

/// Streams completions from a Gemini model.
#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiProvider {
    /// Build a provider from the server configuration.
    ///
    /// Returns `Ok(None)` when no credential is configured.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Option<Self>> {
        let Some(api_key) = cfg.api_key.clone() else {
            return Ok(None);
        };
        let client = Client::builder()
            .user_agent(concat!("aries-server/", env!("CARGO_PKG_VERSION")))
            .timeout(cfg.upstream_timeout)
            .build()?;
        Ok(Some(Self {
            client,
            base_url: cfg.upstream_base_url.trim_end_matches('/').to_owned(),
            model: cfg.model.clone(),
            api_key,
        }))
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    #[instrument(skip_all, fields(model = %self.model, messages = request.messages.len()))]
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, UpstreamError> {
        let body = GenerateRequest::from(&request);

        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_http_failure(status, &text));
        }
        debug!(%status, "upstream stream opened");

        Ok(Box::pin(relay_events(resp.bytes_stream())))
    }
}

/// Turn the raw SSE body into [`CompletionEvent`]s.
fn relay_events<S, B>(body: S) -> impl futures::Stream<Item = Result<CompletionEvent, UpstreamError>>
where
    S: futures::Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    struct State<S> {
        body: std::pin::Pin<Box<S>>,
        decoder: SseDecoder,
        pending: VecDeque<Result<CompletionEvent, UpstreamError>>,
        done: bool,
    }

    let init = State {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(init, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                if item.is_err() {
                    st.done = true;
                    st.pending.clear();
                }
                return Some((item, st));
            }
            if st.done {
                return None;
            }
            match st.body.next().await {
                Some(Ok(bytes)) => {
                    for payload in st.decoder.push(bytes.as_ref()) {
                        st.pending.extend(parse_chunk(&payload));
                    }
                }
                Some(Err(e)) => {
                    st.done = true;
                    st.pending.push_back(Err(e.into()));
                }
                None => {
                    st.done = true;
                    for payload in st.decoder.finish() {
                        st.pending.extend(parse_chunk(&payload));
                    }
                }
            }
        }
    })
}

/// Events carried by one `data:` payload.
fn parse_chunk(payload: &str) -> Vec<Result<CompletionEvent, UpstreamError>> {
    let chunk: StreamChunk = match serde_json::from_str(payload) {
        Ok(c) => c,
        Err(e) => {
            return vec![Err(UpstreamError::new(
                UpstreamErrorKind::Other,
                format!("malformed stream chunk: {e}"),
            ))];
        }
    };

    if let Some(err) = chunk.error {
        return vec![Err(err.into_upstream_error(None))];
    }

    let mut events = Vec::new();
    let Some(candidate) = chunk.candidates.into_iter().next() else {
        return events;
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if !text.is_empty() {
        events.push(Ok(CompletionEvent::TextDelta(text)));
    }

    if let Some(reason) = candidate.finish_reason {
        let usage = chunk
            .usage_metadata
            .map(|u| Usage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
            })
            .unwrap_or_default();
        events.push(Ok(CompletionEvent::Finish {
            reason: map_finish_reason(&reason),
            usage,
        }));
    }
    events
}

fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII"
        | "IMAGE_SAFETY" => FinishReason::ContentFilter,
        "FINISH_REASON_UNSPECIFIED" => FinishReason::Unknown,
        _ => FinishReason::Other,
    }
}

/// Classify a non-2xx response from its status and structured error body.
fn classify_http_failure(status: StatusCode, body: &str) -> UpstreamError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.into_upstream_error(Some(status)),
        Err(_) => UpstreamError::new(
            kind_for_status(status, None, &[]),
            format!("HTTP {status}: {body}"),
        ),
    }
}

fn kind_for_status(
    status: StatusCode,
    api_status: Option<&str>,
    reasons: &[String],
) -> UpstreamErrorKind {
    if reasons.iter().any(|r| r == "API_KEY_INVALID")
        || matches!(api_status, Some("UNAUTHENTICATED" | "PERMISSION_DENIED"))
        || status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
    {
        UpstreamErrorKind::Credentials
    } else if api_status == Some("RESOURCE_EXHAUSTED") || status == StatusCode::TOO_MANY_REQUESTS {
        UpstreamErrorKind::Quota
    } else if api_status == Some("DEADLINE_EXCEEDED")
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::GATEWAY_TIMEOUT
    {
        UpstreamErrorKind::Timeout
    } else {
        UpstreamErrorKind::Other
    }
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

impl From<&CompletionRequest> for GenerateRequest {
    fn from(req: &CompletionRequest) -> Self {
        // Gemini has no system role inside `contents`; system turns join the
        // preamble in order.
        let mut system_parts = vec![Part {
            text: Some(req.system.clone()),
        }];
        let mut contents = Vec::with_capacity(req.messages.len());

        for msg in &req.messages {
            let text = Some(msg.content.clone());
            match msg.role {
                Role::System => system_parts.push(Part { text }),
                Role::User => contents.push(Content {
                    role: Some("user".into()),
                    parts: vec![Part { text }],
                }),
                Role::Assistant => contents.push(Content {
                    role: Some("model".into()),
                    parts: vec![Part { text }],
                }),
            }
        }

        Self {
            system_instruction: Content {
                role: None,
                parts: system_parts,
            },
            contents,
            generation_config: GenerationConfig {
                max_output_tokens: req.max_output_tokens,
                temperature: req.temperature,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: Option<String>,
}

impl ApiError {
    fn into_upstream_error(self, http_status: Option<StatusCode>) -> UpstreamError {
        let status = http_status
            .or_else(|| self.code.and_then(|c| StatusCode::from_u16(c).ok()))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let reasons: Vec<String> = self.details.into_iter().filter_map(|d| d.reason).collect();
        let kind = kind_for_status(status, self.status.as_deref(), &reasons);
        UpstreamError::new(kind, format!("HTTP {status}: {}", self.message))
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use aries_types::Message;
    use futures::stream;

    #[test]
    fn request_body_maps_roles_and_settings() {
        let req = CompletionRequest::for_conversation(vec![
            Message::system("Answer in French."),
            Message::user("Hi"),
            Message::assistant("Bonjour"),
        ]);
        let body = serde_json::to_value(GenerateRequest::from(&req)).unwrap();

        assert_eq!(body["systemInstruction"]["parts"].as_array().unwrap().len(), 2);
        assert_eq!(body["systemInstruction"]["parts"][1]["text"], "Answer in French.");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1000);
        assert!((body["generationConfig"]["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn chunk_with_text_and_finish() {
        let payload = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"},{"text":"lo"}]},"finishReason":"MAX_TOKENS"}],"usageMetadata":{"promptTokenCount":7,"candidatesTokenCount":2}}"#;
        let events: Vec<_> = parse_chunk(payload).into_iter().map(Result::unwrap).collect();
        assert_eq!(events, vec![
            CompletionEvent::TextDelta("Hello".into()),
            CompletionEvent::Finish {
                reason: FinishReason::Length,
                usage: Usage { prompt_tokens: 7, completion_tokens: 2 },
            },
        ]);
    }

    #[test]
    fn error_bodies_are_classified_structurally() {
        let bad_key = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT","details":[{"reason":"API_KEY_INVALID"}]}}"#;
        assert_eq!(
            classify_http_failure(StatusCode::BAD_REQUEST, bad_key).kind,
            UpstreamErrorKind::Credentials
        );

        let quota = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            classify_http_failure(StatusCode::TOO_MANY_REQUESTS, quota).kind,
            UpstreamErrorKind::Quota
        );

        assert_eq!(
            classify_http_failure(StatusCode::GATEWAY_TIMEOUT, "upstream timed out").kind,
            UpstreamErrorKind::Timeout
        );
        assert_eq!(
            classify_http_failure(StatusCode::BAD_GATEWAY, "").kind,
            UpstreamErrorKind::Other
        );
    }

    #[tokio::test]
    async fn relay_stops_after_a_mid_stream_error() {
        let body = stream::iter(vec![
            Ok::<_, reqwest::Error>(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi\"}]}}]}\n\n".to_vec()),
            Ok(b"data: {\"error\":{\"code\":500,\"message\":\"boom\",\"status\":\"INTERNAL\"}}\n\n".to_vec()),
            Ok(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"never\"}]}}]}\n\n".to_vec()),
        ]);

        let items: Vec<_> = relay_events(body).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &CompletionEvent::TextDelta("Hi".into()));
        assert_eq!(items[1].as_ref().unwrap_err().kind, UpstreamErrorKind::Other);
    }

    #[test]
    fn provider_is_absent_without_credential() {
        let cfg = Config::from_lookup(|_| None);
        assert!(GeminiProvider::from_config(&cfg).unwrap().is_none());
    }
}
