//! Chat facade: composes transport, history, attachments, and the shared
//! input buffer into the surface the UI talks to.

use serde::Serialize;
use std::sync::{Arc, Mutex};

use super::history::HistorySource;
use super::message::ChatMessage;
use super::reconciler::MessageReconciler;
use super::ChatError;
use crate::notices::Notices;
use crate::transport::{ClientFrame, ConnectionState, Outbound, ServerFrame, TransportSession};
use crate::upload::AttachmentPipeline;
use crate::voice::{TranscriptBuffer, VoiceUiState};
use tokio::sync::watch;

/// Placeholder content for a message that is only attachments.
const ATTACHMENT_PLACEHOLDER: &str = "[attachment]";

/// Chat snapshot for the rendering layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUiState {
    pub connected: bool,
    pub can_send: bool,
    pub is_recording: bool,
    pub message_count: usize,
    pub pending_attachment_count: usize,
    pub input_preview: String,
}

/// Single entry point for the chat surface.
pub struct ChatFacade {
    transport: Arc<dyn Outbound>,
    history: Arc<dyn HistorySource>,
    reconciler: Mutex<MessageReconciler>,
    attachments: Arc<AttachmentPipeline>,
    input: Arc<Mutex<TranscriptBuffer>>,
    notices: Notices,
    history_limit: usize,
    voice: Mutex<Option<watch::Receiver<VoiceUiState>>>,
}

impl ChatFacade {
    pub fn new(
        transport: Arc<dyn Outbound>,
        history: Arc<dyn HistorySource>,
        attachments: Arc<AttachmentPipeline>,
        input: Arc<Mutex<TranscriptBuffer>>,
        notices: Notices,
        history_limit: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            history,
            reconciler: Mutex::new(MessageReconciler::new()),
            attachments,
            input,
            notices,
            history_limit,
            voice: Mutex::new(None),
        })
    }

    /// Route incoming server frames into this facade.
    pub fn attach_transport(self: &Arc<Self>, session: &TransportSession) {
        let facade = self.clone();
        session.on_event(move |frame| facade.handle_frame(frame));
    }

    /// Subscribe to the voice engine's state so recording status shows up
    /// in [`ChatUiState`]. Pass `VoiceCaptureEngine::ui_watch()`.
    pub fn attach_voice(&self, voice: watch::Receiver<VoiceUiState>) {
        *self.voice.lock().unwrap() = Some(voice);
    }

    /// Seed the message list from the bounded history fetch.
    pub async fn load_history(&self) -> Result<usize, ChatError> {
        let history = self.history.recent(self.history_limit).await?;
        let mut reconciler = self.reconciler.lock().unwrap();
        reconciler.seed_history(history);
        Ok(reconciler.len())
    }

    pub fn handle_frame(&self, frame: ServerFrame) {
        match frame {
            ServerFrame::Message { message } => {
                self.reconciler.lock().unwrap().ingest(message);
            }
            ServerFrame::System { message } => {
                self.reconciler
                    .lock()
                    .unwrap()
                    .record_local(ChatMessage::system(message));
            }
            ServerFrame::Error { message } => {
                log::warn!("Chat: server error frame: {}", message);
                self.notices.push(message);
            }
            ServerFrame::Unknown => log::debug!("Chat: ignoring unknown frame"),
        }
    }

    /// Replace the draft text (operator typed into the input box).
    pub fn set_input(&self, text: impl Into<String>) {
        self.input.lock().unwrap().set_text(text);
    }

    /// Sendable when there is non-blank draft text or at least one uploaded
    /// attachment.
    pub fn can_send(&self) -> bool {
        !self.input.lock().unwrap().committed().trim().is_empty()
            || self.attachments.ready_count() > 0
    }

    /// Compose and send the draft. The message is appended optimistically;
    /// the input buffer and the whole attachment queue are cleared either
    /// way. Returns `false` when nothing was handed to the connection.
    pub fn send(&self) -> bool {
        if !self.can_send() {
            return false;
        }

        let attachments = self.attachments.take_ready();
        let content = {
            let mut input = self.input.lock().unwrap();
            input.take().trim().to_string()
        };
        let content = if content.is_empty() {
            ATTACHMENT_PLACEHOLDER.to_string()
        } else {
            content
        };

        let msg = ChatMessage::operator(content, attachments);
        let frame = ClientFrame::message(&msg);
        self.reconciler.lock().unwrap().record_local(msg);

        let sent = self.transport.send_frame(&frame);
        if !sent {
            log::warn!("Chat: send while disconnected");
            self.notices
                .push("Not connected; message not delivered".to_string());
        }
        sent
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.reconciler.lock().unwrap().messages().to_vec()
    }

    /// Whether the attached voice engine is currently recording. `false`
    /// when no engine is attached.
    pub fn is_recording(&self) -> bool {
        self.voice
            .lock()
            .unwrap()
            .as_ref()
            .map(|rx| matches!(*rx.borrow(), VoiceUiState::Recording { .. }))
            .unwrap_or(false)
    }

    pub fn ui_state(&self) -> ChatUiState {
        let stats = self.transport.connection_stats();
        ChatUiState {
            connected: stats.state == ConnectionState::Connected,
            can_send: self.can_send(),
            is_recording: self.is_recording(),
            message_count: self.reconciler.lock().unwrap().len(),
            pending_attachment_count: self.attachments.pending_count(),
            input_preview: self.input.lock().unwrap().preview(),
        }
    }
}
