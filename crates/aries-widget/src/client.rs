//! HTTP client for the chat gate.
//!
//! [`GateClient::send`] posts the conversation and turns the data-stream
//! reply into [`ChatEvent`]s. Every failure, whether transport, HTTP status
//! or protocol, arrives as a single [`ChatEvent::Error`]; the stream always
//! ends after a `StreamEnd` or an `Error`.

use std::collections::VecDeque;
use std::pin::Pin;

use futures::future::AbortHandle;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use aries_types::{DataStreamPart, Message};

use crate::error::WidgetError;
use crate::status::ChatEvent;

/// Default gate address for a locally running server.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:3000/api/chat";

#[derive(Debug, Clone)]
pub struct GateClient {
    http: reqwest::Client,
    endpoint: reqwest::Url,
}

/// Handle on a request in flight.
#[derive(Debug, Clone)]
pub struct Generation {
    handle: AbortHandle,
}

impl Generation {
    /// Abort the request. Returns immediately; the event stream ends on its
    /// next poll.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_aborted(&self) -> bool {
        self.handle.is_aborted()
    }
}

impl GateClient {
    pub fn new(endpoint: &str) -> Result<Self, WidgetError> {
        let endpoint = reqwest::Url::parse(endpoint)
            .map_err(|_| WidgetError::InvalidEndpoint(endpoint.to_owned()))?;
        // No overall timeout: replies stream for as long as the gate allows.
        let http = reqwest::Client::builder()
            .user_agent(concat!("aries-chat/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    /// Post `messages` and stream the reply.
    pub fn send(&self, messages: Vec<Message>) -> (Generation, BoxStream<'static, ChatEvent>) {
        let client = self.clone();
        let events = stream::once(async move { client.open(messages).await }).flat_map(
            |opened| match opened {
                Ok(events) => events,
                Err(e) => stream::iter([ChatEvent::Error(e.to_string())]).boxed(),
            },
        );

        let (events, handle) = stream::abortable(events);
        (Generation { handle }, events.boxed())
    }

    #[instrument(skip_all, fields(endpoint = %self.endpoint, messages = messages.len()))]
    async fn open(&self, messages: Vec<Message>) -> Result<BoxStream<'static, ChatEvent>, WidgetError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&json!({ "messages": messages }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WidgetError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        debug!(%status, "reply stream opened");
        Ok(decode_events(response.bytes_stream()).boxed())
    }
}

/// The gate's `{"error": ...}` text, or the raw body when it is not JSON.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_owned())
}

/// Decode a data-stream body into events.
pub fn decode_events<S, B, E>(body: S) -> impl Stream<Item = ChatEvent> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<WidgetError> + Send + 'static,
{
    let relay = Relay {
        body: Box::pin(body),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };
    stream::unfold(relay, |mut relay| async move {
        let event = relay.next_event().await?;
        Some((event, relay))
    })
}

struct Relay<S> {
    body: Pin<Box<S>>,
    buffer: Vec<u8>,
    pending: VecDeque<ChatEvent>,
    finished: bool,
}

impl<S, B, E> Relay<S>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<WidgetError>,
{
    async fn next_event(&mut self) -> Option<ChatEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                if matches!(event, ChatEvent::StreamEnd | ChatEvent::Error(_)) {
                    self.finished = true;
                    self.pending.clear();
                }
                return Some(event);
            }
            if self.finished {
                return None;
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.feed(chunk.as_ref()),
                Some(Err(e)) => {
                    let e: WidgetError = e.into();
                    self.pending.push_back(ChatEvent::Error(e.to_string()));
                }
                None => {
                    let rest = std::mem::take(&mut self.buffer);
                    self.feed_line(&rest);
                    // A body that ends without a finish part still ends the reply.
                    self.pending.push_back(ChatEvent::StreamEnd);
                }
            }
        }
    }

    fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.feed_line(&line);
        }
    }

    fn feed_line(&mut self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            return;
        }
        match DataStreamPart::decode(line) {
            Ok(part) => self.pending.extend(event_for(part)),
            Err(e) => {
                let e = WidgetError::from(e);
                self.pending.push_back(ChatEvent::Error(e.to_string()));
            }
        }
    }
}

fn event_for(part: DataStreamPart) -> Option<ChatEvent> {
    match part {
        DataStreamPart::Text(text) if text.is_empty() => None,
        DataStreamPart::Text(text) => Some(ChatEvent::ChunkReceived(text)),
        DataStreamPart::Error(message) => Some(ChatEvent::Error(message)),
        DataStreamPart::FinishMessage { .. } => Some(ChatEvent::StreamEnd),
        DataStreamPart::StartStep { .. }
        | DataStreamPart::FinishStep { .. }
        | DataStreamPart::Unknown { .. } => None,
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
