//! Wire frames for the realtime chat transport.
//!
//! Frames are JSON text with a `type` discriminator. Both directions are
//! closed tagged unions so adding a frame type is a compile-time-checked
//! exercise; unknown inbound types deserialize to `ServerFrame::Unknown`
//! instead of failing the connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::{Attachment, Role};

/// Message payload as it appears on the wire.
///
/// The server normally supplies `id`; when it is absent the reconciler
/// synthesizes one from the timestamp (a known weak point under
/// high-frequency delivery).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// Frames received from the backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// A chat message (assistant, another operator, or an echo of our own).
    Message {
        #[serde(flatten)]
        message: WireMessage,
    },

    /// Out-of-band announcement rendered as a system-role message.
    System { message: String },

    /// Backend-reported error, surfaced as a transient notice.
    Error { message: String },

    /// Catch-all so future frame types never kill deserialization.
    #[serde(other)]
    Unknown,
}

/// Frames sent to the backend.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// An operator message composed by the chat facade.
    Message {
        id: String,
        content: String,
        created_at: DateTime<Utc>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        attachments: Vec<Attachment>,
    },
}

impl ClientFrame {
    /// Build the outgoing envelope for an already-composed message.
    pub fn message(msg: &crate::chat::ChatMessage) -> Self {
        ClientFrame::Message {
            id: msg.id.clone(),
            content: msg.content.clone(),
            created_at: msg.created_at,
            attachments: msg.attachments.clone(),
        }
    }
}
