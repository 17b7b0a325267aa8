//! Attachment staging and upload.
//!
//! Files picked by the operator are staged immediately as pending entries,
//! uploaded in a single batched request, and reconciled back per file so
//! one bad file does not sink the rest of the batch.

mod client;
mod pipeline;

pub use client::HttpUploader;
pub use pipeline::{AttachmentPipeline, PendingUpload, RemoteFileDescriptor, UploadState};

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub enum UploadError {
    NotAuthenticated,
    Io(String),
    NetworkError(String),
    ApiError { status: u16, message: String },
    ParseError(String),
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadError::NotAuthenticated => write!(f, "Not logged in"),
            UploadError::Io(e) => write!(f, "File error: {}", e),
            UploadError::NetworkError(e) => write!(f, "Network error: {}", e),
            UploadError::ApiError { status, message } => {
                write!(f, "Upload API error ({}): {}", status, message)
            }
            UploadError::ParseError(e) => write!(f, "Failed to parse upload response: {}", e),
        }
    }
}

impl std::error::Error for UploadError {}

/// A file read off disk, ready to stage.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub path: PathBuf,
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl LocalFile {
    pub fn read(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| UploadError::Io(e.to_string()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let mime = mime_for_path(path).to_string();
        Ok(Self {
            path: path.to_path_buf(),
            name,
            mime,
            bytes,
        })
    }
}

fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "txt" | "md" | "log" | "csv" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// One entry of the batched upload response; entries line up positionally
/// with the files sent.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResult {
    pub url: Option<String>,
    pub error: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub mime: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchUploadResponse {
    pub files: Vec<UploadResult>,
    /// Server-reported count of files stored from this batch.
    #[serde(default)]
    pub uploaded: Option<u64>,
}

/// Transport for the batched upload request.
#[async_trait]
pub trait AttachmentUploader: Send + Sync {
    async fn upload(&self, files: &[LocalFile]) -> Result<BatchUploadResponse, UploadError>;
}
