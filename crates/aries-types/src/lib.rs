//! Types shared by the chat gate and the conversation widget.
//!
//! - [`message`]: the `Message` / `Role` pair carried in every conversation.
//! - [`validation`]: structural checks the gate runs on untrusted JSON.
//! - [`stream`]: the line-oriented data-stream protocol used to relay replies.

pub mod message;
pub mod stream;
pub mod validation;

pub use message::{Message, Role};
pub use stream::{DataStreamPart, FinishReason, ProtocolError, Usage};
pub use validation::{validate_messages, ValidationError};

/// Maximum number of messages in one conversation.
pub const MAX_MESSAGES: usize = 50;

/// Maximum length of a single message, counted in characters.
pub const MAX_CONTENT_CHARS: usize = 4000;

/// Number of characters in `text`, the unit every length limit is expressed in.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
