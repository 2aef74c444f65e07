use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use aries_types::Message;

/// Request body for `POST /api/chat`.
///
/// Only documents the accepted shape; the handler validates the raw JSON
/// itself so every malformed case gets its own message.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatRequest {
    /// Full conversation so far, oldest first (1 to 50 entries).
    pub messages: Vec<Message>,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}
