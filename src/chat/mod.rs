//! Command-chat core: data model, reconciliation, history, and the facade
//! composing transport, attachments, and voice input.

mod facade;
mod history;
mod message;
mod reconciler;

pub use facade::{ChatFacade, ChatUiState};
pub use history::{HistorySource, HttpHistory};
pub use message::{Attachment, AttachmentCategory, ChatMessage, Role};
pub use reconciler::MessageReconciler;

/// Errors from the chat REST collaborators.
#[derive(Debug, Clone)]
pub enum ChatError {
    /// No authenticated principal.
    NotAuthenticated,
    /// Network/HTTP failure.
    NetworkError(String),
    /// Backend returned a non-success status.
    ApiError { status: u16, message: String },
    /// Response body did not parse.
    ParseError(String),
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatError::NotAuthenticated => write!(f, "Not authenticated"),
            ChatError::NetworkError(e) => write!(f, "Network error: {}", e),
            ChatError::ApiError { status, message } => {
                write!(f, "Chat API error ({}): {}", status, message)
            }
            ChatError::ParseError(e) => write!(f, "Failed to parse chat response: {}", e),
        }
    }
}

impl std::error::Error for ChatError {}
