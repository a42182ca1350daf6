//! Realtime frame DTOs.
//!
//! Every frame is a JSON envelope `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ========================================
// Server → client
// ========================================

pub const STATUS_UPDATE: &str = "queue:status_update";
pub const YOUR_TOKEN_CALLED: &str = "queue:your_token_called";
pub const YOUR_TOKEN_SKIPPED: &str = "queue:your_token_skipped";
pub const YOUR_TOKEN_COMPLETED: &str = "queue:your_token_completed";
pub const YOUR_TOKEN_UPDATED: &str = "queue:your_token_updated";
pub const QUEUE_EMPTY: &str = "queue:empty";
pub const CONNECT_ERROR: &str = "connect_error";

// ========================================
// Client → server
// ========================================

pub const JOIN_QUEUE: &str = "join-queue";
pub const LEAVE_QUEUE: &str = "leave-queue";
pub const CALL_NEXT: &str = "queue:call_next";
pub const COMPLETE_TOKEN: &str = "queue:complete_token";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Payload of `queue:complete_token`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTokenPayload {
    pub queue_id: String,
    pub token_id: String,
}

/// Payload of `queue:empty` and `connect_error`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessagePayload {
    Text(String),
    Object {
        #[serde(default)]
        message: String,
    },
}

impl MessagePayload {
    pub fn into_message(self) -> String {
        match self {
            MessagePayload::Text(message) | MessagePayload::Object { message } => message,
        }
    }
}
