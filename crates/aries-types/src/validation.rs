//! Structural validation of an untrusted conversation.
//!
//! The gate receives `messages` as arbitrary JSON. [`validate_messages`]
//! checks it in a fixed order and either returns the typed conversation or
//! the first violation found. The `Display` text of each
//! [`ValidationError`] is safe to return to the caller verbatim.

use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

use crate::message::{Message, Role};
use crate::{char_len, MAX_CONTENT_CHARS, MAX_MESSAGES};

/// Why a conversation was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid messages format")]
    NotAList,

    #[error("No messages provided")]
    Empty,

    #[error("Too many messages in conversation")]
    TooManyMessages,

    /// `role` or `content` is absent or falsy (`null`, `""`, `false`, `0`).
    #[error("Invalid message format")]
    MissingField,

    #[error("Message content must be a string")]
    ContentNotText,

    #[error("Message too long (max 4000 characters)")]
    ContentTooLong,

    #[error("Invalid message role")]
    UnknownRole,
}

/// Validate the `messages` value of a chat request body.
///
/// `value` is `None` when the body has no `messages` key at all.
pub fn validate_messages(value: Option<&Value>) -> Result<Vec<Message>, ValidationError> {
    let entries = value
        .and_then(Value::as_array)
        .ok_or(ValidationError::NotAList)?;

    if entries.is_empty() {
        return Err(ValidationError::Empty);
    }
    if entries.len() > MAX_MESSAGES {
        return Err(ValidationError::TooManyMessages);
    }

    entries.iter().map(validate_entry).collect()
}

fn validate_entry(entry: &Value) -> Result<Message, ValidationError> {
    let role = entry.get("role").filter(|v| is_present(v));
    let content = entry.get("content").filter(|v| is_present(v));
    let (Some(role), Some(content)) = (role, content) else {
        return Err(ValidationError::MissingField);
    };

    let content = content.as_str().ok_or(ValidationError::ContentNotText)?;
    if char_len(content) > MAX_CONTENT_CHARS {
        return Err(ValidationError::ContentTooLong);
    }

    let role = role
        .as_str()
        .and_then(|r| Role::from_str(r).ok())
        .ok_or(ValidationError::UnknownRole)?;

    Ok(Message::new(role, content))
}

/// Mirrors the loose "is set" test browser clients apply to JSON fields.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
