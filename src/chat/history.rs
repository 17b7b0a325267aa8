//! Bounded recent-message history fetch.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::message::ChatMessage;
use super::ChatError;
use crate::auth::AuthProvider;
use crate::config::ChatConfig;

/// Source of the one-shot history seed.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Most recent messages, oldest first, at most `limit`.
    async fn recent(&self, limit: usize) -> Result<Vec<ChatMessage>, ChatError>;
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    messages: Vec<ChatMessage>,
}

/// REST-backed history endpoint.
pub struct HttpHistory {
    client: reqwest::Client,
    url: String,
    auth: Arc<dyn AuthProvider>,
}

impl HttpHistory {
    pub fn new(config: &ChatConfig, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.history_url.clone(),
            auth,
        }
    }
}

#[async_trait]
impl HistorySource for HttpHistory {
    async fn recent(&self, limit: usize) -> Result<Vec<ChatMessage>, ChatError> {
        let token = self.auth.bearer_token().ok_or(ChatError::NotAuthenticated)?;

        let response = self
            .client
            .get(&self.url)
            .query(&[("limit", limit)])
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| ChatError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let history: HistoryResponse = response
            .json()
            .await
            .map_err(|e| ChatError::ParseError(e.to_string()))?;

        log::info!("History: fetched {} messages", history.messages.len());
        Ok(history.messages)
    }
}
