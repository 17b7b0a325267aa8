//! HTTP client for the voice-status and cloud transcription endpoints.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::{VoiceApi, VoiceError, VoiceStatus};
use crate::auth::AuthProvider;
use crate::config::ChatConfig;

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: String,
}

/// Backend voice API over HTTPS.
pub struct HttpVoiceApi {
    client: reqwest::Client,
    status_url: String,
    transcribe_url: String,
    auth: Arc<dyn AuthProvider>,
}

impl HttpVoiceApi {
    pub fn new(config: &ChatConfig, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            client: reqwest::Client::new(),
            status_url: config.voice_status_url.clone(),
            transcribe_url: config.transcribe_url.clone(),
            auth,
        }
    }

    fn token(&self) -> Result<String, VoiceError> {
        self.auth
            .bearer_token()
            .ok_or_else(|| VoiceError::Unavailable("not logged in".to_string()))
    }
}

#[async_trait]
impl VoiceApi for HttpVoiceApi {
    async fn status(&self) -> Result<VoiceStatus, VoiceError> {
        let token = self.token()?;

        let response = self
            .client
            .get(&self.status_url)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| VoiceError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| VoiceError::ParseError(e.to_string()))
    }

    async fn transcribe(&self, audio: Vec<u8>) -> Result<String, VoiceError> {
        let token = self.token()?;
        log::info!("Voice: uploading {} bytes for transcription", audio.len());

        let part = reqwest::multipart::Part::bytes(audio)
            .file_name("capture.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::ParseError(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.transcribe_url)
            .header("Authorization", format!("Bearer {}", token))
            .multipart(form)
            .send()
            .await
            .map_err(|e| VoiceError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("Voice: transcription API error {}: {}", status, body);
            return Err(VoiceError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::ParseError(e.to_string()))?;

        Ok(parsed.text.trim().to_string())
    }
}
