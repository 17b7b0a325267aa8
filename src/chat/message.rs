//! Chat data model: messages and their attachments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Operator,
    Assistant,
    System,
}

/// Coarse MIME bucket used for preview decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentCategory {
    Image,
    Audio,
    Video,
    Document,
    Other,
}

impl AttachmentCategory {
    /// Derive a category from a MIME type string.
    pub fn from_mime(mime: &str) -> Self {
        let top = mime.split('/').next().unwrap_or("");
        match top {
            "image" => AttachmentCategory::Image,
            "audio" => AttachmentCategory::Audio,
            "video" => AttachmentCategory::Video,
            "text" | "application" => AttachmentCategory::Document,
            _ => AttachmentCategory::Other,
        }
    }
}

/// A file bound to a message.
///
/// At least one of `url` / `data` is present: `url` once the backend has the
/// file, `data` (base64) when only the local payload exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "type")]
    pub mime: String,
    pub size: u64,
    pub category: AttachmentCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Locally derived preview for image attachments (base64).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// One chat message, immutable once created.
///
/// `id` is the stable identifier used for de-duplication across the history
/// seed and the live stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Optional link to the task this message concerns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl ChatMessage {
    /// Build an operator-authored message stamped now.
    pub fn operator(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Operator,
            content: content.into(),
            created_at: Utc::now(),
            task_id: None,
            attachments,
        }
    }

    /// Build a system message stamped now.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::System,
            content: content.into(),
            created_at: Utc::now(),
            task_id: None,
            attachments: Vec::new(),
        }
    }
}
