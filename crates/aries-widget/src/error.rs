use thiserror::Error;

use aries_types::ProtocolError;

/// Failures while talking to the gate.
#[derive(Debug, Error)]
pub enum WidgetError {
    #[error("invalid gate endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("request to the gate failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The gate answered with a non-success status.
    #[error("gate answered {status}: {message}")]
    Status { status: u16, message: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
