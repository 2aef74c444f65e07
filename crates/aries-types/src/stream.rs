//! Data-stream protocol used to relay a generated reply.
//!
//! Each part is one line: a type code, a colon, a JSON payload and `\n`.
//!
//! ```text
//! f:{"messageId":"msg-123"}
//! 0:"Hello"
//! 0:" world"
//! e:{"finishReason":"stop","usage":{"promptTokens":12,"completionTokens":2},"isContinued":false}
//! d:{"finishReason":"stop","usage":{"promptTokens":12,"completionTokens":2}}
//! ```
//!
//! This is the format browser chat hooks expect from a streaming endpoint,
//! so the gate stays compatible with the site's existing front-end.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Response header announcing the protocol version.
pub const STREAM_HEADER: &str = "x-vercel-ai-data-stream";
pub const STREAM_VERSION: &str = "v1";

/// Why generation stopped.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Error,
    Other,
    /// Also what any reason added by a newer producer decodes to.
    #[default]
    #[serde(other)]
    Unknown,
}

/// Token accounting reported with the finish parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// One line of the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum DataStreamPart {
    /// `f:` a new assistant message begins.
    StartStep { message_id: String },
    /// `0:` a text delta.
    Text(String),
    /// `3:` the stream failed; the payload is user-facing text only.
    Error(String),
    /// `e:` one generation step finished.
    FinishStep {
        finish_reason: FinishReason,
        usage: Usage,
        is_continued: bool,
    },
    /// `d:` the whole message finished.
    FinishMessage {
        finish_reason: FinishReason,
        usage: Usage,
    },
    /// Any part type this side does not understand.
    Unknown { code: String, payload: Value },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("stream line has no type prefix: {0:?}")]
    MissingPrefix(String),

    #[error("invalid JSON payload for part '{code}': {source}")]
    Payload {
        code: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartPayload {
    message_id: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinishPayload {
    finish_reason: FinishReason,
    #[serde(default)]
    usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_continued: Option<bool>,
}

impl DataStreamPart {
    /// The single-character type code of this part.
    pub fn code(&self) -> &str {
        match self {
            Self::StartStep { .. } => "f",
            Self::Text(_) => "0",
            Self::Error(_) => "3",
            Self::FinishStep { .. } => "e",
            Self::FinishMessage { .. } => "d",
            Self::Unknown { code, .. } => code,
        }
    }

    /// Render the part as one protocol line, including the trailing newline.
    pub fn encode(&self) -> String {
        let payload = match self {
            Self::StartStep { message_id } => json!(StartPayload {
                message_id: message_id.clone()
            }),
            Self::Text(text) | Self::Error(text) => Value::String(text.clone()),
            Self::FinishStep {
                finish_reason,
                usage,
                is_continued,
            } => json!(FinishPayload {
                finish_reason: *finish_reason,
                usage: *usage,
                is_continued: Some(*is_continued),
            }),
            Self::FinishMessage {
                finish_reason,
                usage,
            } => json!(FinishPayload {
                finish_reason: *finish_reason,
                usage: *usage,
                is_continued: None,
            }),
            Self::Unknown { payload, .. } => payload.clone(),
        };
        format!("{}:{}\n", self.code(), payload)
    }

    /// Parse one line (with or without its trailing newline).
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (code, raw) = line
            .split_once(':')
            .ok_or_else(|| ProtocolError::MissingPrefix(line.to_owned()))?;

        let payload_err = |source| ProtocolError::Payload {
            code: code.to_owned(),
            source,
        };

        let part = match code {
            "f" => {
                let p: StartPayload = serde_json::from_str(raw).map_err(payload_err)?;
                Self::StartStep {
                    message_id: p.message_id,
                }
            }
            "0" => Self::Text(serde_json::from_str(raw).map_err(payload_err)?),
            "3" => Self::Error(serde_json::from_str(raw).map_err(payload_err)?),
            "e" => {
                let p: FinishPayload = serde_json::from_str(raw).map_err(payload_err)?;
                Self::FinishStep {
                    finish_reason: p.finish_reason,
                    usage: p.usage,
                    is_continued: p.is_continued.unwrap_or(false),
                }
            }
            "d" => {
                let p: FinishPayload = serde_json::from_str(raw).map_err(payload_err)?;
                Self::FinishMessage {
                    finish_reason: p.finish_reason,
                    usage: p.usage,
                }
            }
            other => Self::Unknown {
                code: other.to_owned(),
                payload: serde_json::from_str(raw).map_err(payload_err)?,
            },
        };
        Ok(part)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn text_is_a_json_string() {
        let line = DataStreamPart::Text("say \"hi\"\nthen go".into()).encode();
        assert_eq!(line, "0:\"say \\\"hi\\\"\\nthen go\"\n");
    }

    #[test]
    fn finish_message_omits_is_continued() {
        let line = DataStreamPart::FinishMessage {
            finish_reason: FinishReason::ContentFilter,
            usage: Usage {
                prompt_tokens: 3,
                completion_tokens: 4,
            },
        }
        .encode();
        let payload: Value = serde_json::from_str(line.strip_prefix("d:").unwrap()).unwrap();
        assert_eq!(
            payload,
            json!({
                "finishReason": "content-filter",
                "usage": { "promptTokens": 3, "completionTokens": 4 }
            })
        );
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn decodes_a_browser_style_stream() {
        let body = "f:{\"messageId\":\"msg-1\"}\n0:\"Hel\"\n0:\"lo\"\n\
                    e:{\"finishReason\":\"stop\",\"usage\":{\"promptTokens\":1,\"completionTokens\":2},\"isContinued\":false}\n\
                    d:{\"finishReason\":\"stop\",\"usage\":{\"promptTokens\":1,\"completionTokens\":2}}\n";
        let parts: Vec<_> = body
            .lines()
            .map(|l| DataStreamPart::decode(l).unwrap())
            .collect();

        assert_eq!(parts.len(), 5);
        assert_eq!(parts[1], DataStreamPart::Text("Hel".into()));
        assert!(matches!(
            parts[4],
            DataStreamPart::FinishMessage {
                finish_reason: FinishReason::Stop,
                ..
            }
        ));
    }

    #[test]
    fn unknown_codes_are_preserved() {
        let part = DataStreamPart::decode("8:[{\"k\":1}]").unwrap();
        assert_eq!(part.code(), "8");
        assert!(matches!(part, DataStreamPart::Unknown { .. }));
    }

    #[test]
    fn malformed_lines_are_errors() {
        assert!(matches!(
            DataStreamPart::decode("no prefix here"),
            Err(ProtocolError::MissingPrefix(_))
        ));
        assert!(matches!(
            DataStreamPart::decode("0:not json"),
            Err(ProtocolError::Payload { .. })
        ));
    }

    #[test]
    fn unrecognised_finish_reason_decodes_as_unknown() {
        let part = DataStreamPart::decode(
            "d:{\"finishReason\":\"tool-calls\",\"usage\":{\"promptTokens\":1,\"completionTokens\":1}}",
        )
        .unwrap();
        assert!(matches!(
            part,
            DataStreamPart::FinishMessage {
                finish_reason: FinishReason::Unknown,
                ..
            }
        ));
    }

    #[test]
    fn missing_usage_defaults_to_zero() {
        let part = DataStreamPart::decode("d:{\"finishReason\":\"length\"}").unwrap();
        assert_eq!(
            part,
            DataStreamPart::FinishMessage {
                finish_reason: FinishReason::Length,
                usage: Usage::default(),
            }
        );
    }
}
