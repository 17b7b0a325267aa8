//! Staged-attachment queue with batched upload.

use base64::Engine as _;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::{AttachmentUploader, BatchUploadResponse, LocalFile, UploadError, UploadResult};
use crate::chat::{Attachment, AttachmentCategory};
use crate::notices::Notices;

/// Images up to this size get an inline preview thumbnail.
const THUMBNAIL_LIMIT: usize = 512 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    Uploading,
    Ready,
    Failed,
}

/// Where the file ended up after a successful upload.
#[derive(Debug, Clone, Serialize)]
pub struct RemoteFileDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub mime: String,
    pub size: u64,
    pub url: String,
    pub category: AttachmentCategory,
}

/// One staged attachment, visible to the UI from the moment the file is
/// picked.
#[derive(Debug, Clone, Serialize)]
pub struct PendingUpload {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub mime: String,
    pub size: u64,
    pub status: UploadState,
    pub remote: Option<RemoteFileDescriptor>,
    pub error: Option<String>,
    pub thumbnail: Option<String>,
}

/// Staging queue for outgoing attachments.
pub struct AttachmentPipeline {
    uploader: Arc<dyn AttachmentUploader>,
    entries: Mutex<Vec<PendingUpload>>,
    notices: Notices,
}

impl AttachmentPipeline {
    pub fn new(uploader: Arc<dyn AttachmentUploader>, notices: Notices) -> Self {
        Self {
            uploader,
            entries: Mutex::new(Vec::new()),
            notices,
        }
    }

    /// Stage `files` and upload them as one batch. Entries appear in the
    /// queue immediately; their status settles when the batch completes.
    /// Entries removed while the request is in flight keep their removal.
    pub async fn add_files(&self, files: Vec<LocalFile>) {
        if files.is_empty() {
            return;
        }

        let ids: Vec<Uuid> = {
            let mut entries = self.entries.lock().unwrap();
            files
                .iter()
                .map(|file| {
                    let entry = PendingUpload {
                        id: Uuid::new_v4(),
                        name: file.name.clone(),
                        mime: file.mime.clone(),
                        size: file.bytes.len() as u64,
                        status: UploadState::Uploading,
                        remote: None,
                        error: None,
                        thumbnail: thumbnail_for(file),
                    };
                    let id = entry.id;
                    entries.push(entry);
                    id
                })
                .collect()
        };

        log::info!("Upload: staging {} file(s)", files.len());
        match self.uploader.upload(&files).await {
            Ok(response) => self.settle_batch(&ids, &files, response),
            Err(e) => {
                log::error!("Upload: batch failed: {}", e);
                self.notices.push(format!("Attachment upload failed: {}", e));
                let mut entries = self.entries.lock().unwrap();
                for entry in entries.iter_mut().filter(|entry| ids.contains(&entry.id)) {
                    entry.status = UploadState::Failed;
                    entry.error = Some(e.to_string());
                }
            }
        }
    }

    /// Match response entries back to staged entries by position.
    fn settle_batch(&self, ids: &[Uuid], files: &[LocalFile], response: BatchUploadResponse) {
        let mut entries = self.entries.lock().unwrap();
        for (index, id) in ids.iter().enumerate() {
            let Some(entry) = entries.iter_mut().find(|entry| entry.id == *id) else {
                continue; // removed while in flight
            };
            match response.files.get(index) {
                Some(UploadResult {
                    url: Some(url),
                    name,
                    mime,
                    size,
                    ..
                }) => {
                    let file = &files[index];
                    let mime = mime.clone().unwrap_or_else(|| file.mime.clone());
                    entry.remote = Some(RemoteFileDescriptor {
                        name: name.clone().unwrap_or_else(|| file.name.clone()),
                        category: AttachmentCategory::from_mime(&mime),
                        mime,
                        size: size.unwrap_or(file.bytes.len() as u64),
                        url: url.clone(),
                    });
                    entry.status = UploadState::Ready;
                }
                other => {
                    let reason = other
                        .and_then(|r| r.error.clone())
                        .unwrap_or_else(|| "upload rejected".to_string());
                    log::warn!("Upload: {} failed: {}", entry.name, reason);
                    entry.status = UploadState::Failed;
                    entry.error = Some(reason);
                }
            }
        }
    }

    /// Drop a staged entry. Its upload result, if still in flight, is
    /// discarded when the batch settles.
    pub fn remove(&self, id: Uuid) {
        self.entries.lock().unwrap().retain(|entry| entry.id != id);
    }

    /// Convert every `Ready` entry into a message attachment and clear the
    /// whole queue, failed and in-flight entries included.
    pub fn take_ready(&self) -> Vec<Attachment> {
        let drained = std::mem::take(&mut *self.entries.lock().unwrap());
        drained
            .into_iter()
            .filter_map(|entry| {
                let remote = entry.remote?;
                Some(Attachment {
                    name: remote.name,
                    mime: remote.mime,
                    size: remote.size,
                    category: remote.category,
                    url: Some(remote.url),
                    data: None,
                    thumbnail: entry.thumbnail,
                })
            })
            .collect()
    }

    pub fn snapshot(&self) -> Vec<PendingUpload> {
        self.entries.lock().unwrap().clone()
    }

    /// Number of staged entries, whatever their status. This is what the
    /// UI badge shows; it matches the visible queue, not just the uploads
    /// still in flight.
    pub fn pending_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Uploads still waiting on the batch request.
    pub fn uploading_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.status == UploadState::Uploading)
            .count()
    }

    pub fn ready_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.status == UploadState::Ready)
            .count()
    }
}

fn thumbnail_for(file: &LocalFile) -> Option<String> {
    if !file.mime.starts_with("image/") || file.bytes.len() > THUMBNAIL_LIMIT {
        return None;
    }
    let encoded = base64::engine::general_purpose::STANDARD.encode(&file.bytes);
    Some(format!("data:{};base64,{}", file.mime, encoded))
}
