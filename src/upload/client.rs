//! HTTP transport for batched attachment uploads.

use async_trait::async_trait;
use std::sync::Arc;

use super::{AttachmentUploader, BatchUploadResponse, LocalFile, UploadError};
use crate::auth::AuthProvider;
use crate::config::ChatConfig;

/// Multipart POST against the upload endpoint. All files of one staging
/// action go in a single request under the `files` field.
pub struct HttpUploader {
    client: reqwest::Client,
    url: String,
    auth: Arc<dyn AuthProvider>,
}

impl HttpUploader {
    pub fn new(config: &ChatConfig, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.upload_url.clone(),
            auth,
        }
    }
}

#[async_trait]
impl AttachmentUploader for HttpUploader {
    async fn upload(&self, files: &[LocalFile]) -> Result<BatchUploadResponse, UploadError> {
        let token = self
            .auth
            .bearer_token()
            .ok_or(UploadError::NotAuthenticated)?;

        let mut form = reqwest::multipart::Form::new();
        for file in files {
            let part = reqwest::multipart::Part::bytes(file.bytes.clone())
                .file_name(file.name.clone())
                .mime_str(&file.mime)
                .map_err(|e| UploadError::ParseError(e.to_string()))?;
            form = form.part("files", part);
        }

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", token))
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("Upload: API error {}: {}", status, body);
            return Err(UploadError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| UploadError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_response_parses_mixed_results() {
        let json = r#"{
            "files": [
                {"url": "https://files/a.png", "name": "a.png",
                 "type": "image/png", "size": 2048},
                {"error": "file too large"}
            ]
        }"#;

        let parsed: BatchUploadResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.files.len(), 2);
        assert_eq!(parsed.files[0].url.as_deref(), Some("https://files/a.png"));
        assert!(parsed.files[1].url.is_none());
        assert_eq!(parsed.files[1].error.as_deref(), Some("file too large"));
    }
}
