//! Upstream text-generation provider.
//!
//! Handlers depend only on [`CompletionProvider`]; the Google Generative
//! Language client in [`gemini`] is the production implementation. Failures
//! carry an [`UpstreamErrorKind`] so the gate can pick a caller-facing
//! outcome without inspecting error text.

pub mod gemini;
mod sse;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use aries_types::{FinishReason, Message, Usage};

pub use gemini::GeminiProvider;

/// Preamble sent ahead of every conversation.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant for AriesBerriesCompany, an innovation lab building a portfolio of intelligent applications designed to redefine what's possible. Your role is to assist users with inquiries about our projects, philosophy, and upcoming innovations.

Key information about AriesBerriesCompany:
- We are an innovation lab focused on building intelligent applications
- Our mission is to redefine what's possible through technology
- We work on cutting-edge AI and software solutions
- We value innovation, creativity, and pushing boundaries
- We're building a portfolio of next-generation applications

Please provide helpful, informative responses while maintaining a professional yet friendly tone. Focus on our innovative approach and the transformative potential of our work. Keep responses concise but informative.";

/// Output-token cap for every reply.
pub const MAX_OUTPUT_TOKENS: u32 = 1000;

/// Sampling temperature for every reply.
pub const TEMPERATURE: f32 = 0.7;

/// One generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    /// A request carrying the site's fixed preamble and sampling settings.
    pub fn for_conversation(messages: Vec<Message>) -> Self {
        Self {
            system: SYSTEM_PROMPT.to_owned(),
            messages,
            max_output_tokens: MAX_OUTPUT_TOKENS,
            temperature: TEMPERATURE,
        }
    }
}

/// Incremental output of a generation call.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionEvent {
    TextDelta(String),
    Finish { reason: FinishReason, usage: Usage },
}

pub type CompletionStream = BoxStream<'static, Result<CompletionEvent, UpstreamError>>;

/// Caller-relevant classification of an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum UpstreamErrorKind {
    /// The credential was rejected or is not allowed to use the model.
    Credentials,
    /// The provider's own quota or rate limit was hit.
    Quota,
    /// The call did not complete in time.
    Timeout,
    /// Anything else.
    Other,
}

#[derive(Debug, Clone, Error)]
#[error("upstream {kind} error: {message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub message: String,
}

impl UpstreamError {
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            UpstreamErrorKind::Timeout
        } else {
            UpstreamErrorKind::Other
        };
        Self::new(kind, e.to_string())
    }
}

/// A streaming text-generation backend.
#[async_trait]
pub trait CompletionProvider: Send + Sync + 'static {
    /// Start a generation call.
    ///
    /// Errors returned here happen before any output exists and are mapped
    /// to an HTTP status; errors yielded by the stream happen mid-reply.
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, UpstreamError>;
}
