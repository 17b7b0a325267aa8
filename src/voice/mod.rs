//! Voice capture for the command chat.
//!
//! A reducer-driven state machine selects between a cloud transcription
//! provider and a local on-device recognizer, falling back from cloud to
//! local automatically on device or transcription failure. Transcribed text
//! lands in the same input buffer the chat facade sends from.

mod cloud;
mod engine;
mod machine;
mod transcript;

pub use cloud::HttpVoiceApi;
pub use engine::{EffectRunner, VoiceCaptureEngine, VoiceEffectRunner, VoiceUiState};
pub use machine::{reduce, Effect, Event, State};
pub use transcript::TranscriptBuffer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Which backend performs speech-to-text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Cloud,
    Local,
}

/// Errors from voice collaborators. All of them are non-fatal to the engine:
/// they end the current voice session and surface as a transient notice.
#[derive(Debug, Clone)]
pub enum VoiceError {
    /// Transcription backend reports itself unavailable.
    Unavailable(String),
    /// Microphone/device acquisition or capture failure.
    DeviceError(String),
    /// Local recognizer failure.
    RecognitionError(String),
    /// Network/HTTP failure talking to the cloud provider.
    NetworkError(String),
    /// Cloud provider returned a non-success status.
    ApiError { status: u16, message: String },
    /// Response body did not parse.
    ParseError(String),
}

impl std::fmt::Display for VoiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoiceError::Unavailable(e) => write!(f, "Transcription unavailable: {}", e),
            VoiceError::DeviceError(e) => write!(f, "Audio device error: {}", e),
            VoiceError::RecognitionError(e) => write!(f, "Local recognition error: {}", e),
            VoiceError::NetworkError(e) => write!(f, "Network error: {}", e),
            VoiceError::ApiError { status, message } => {
                write!(f, "Transcription API error ({}): {}", status, message)
            }
            VoiceError::ParseError(e) => write!(f, "Failed to parse transcription response: {}", e),
        }
    }
}

impl std::error::Error for VoiceError {}

/// Backend-reported transcription capability.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct VoiceStatus {
    pub available: bool,
    pub preferred: Provider,
}

/// Voice-status and one-shot cloud transcription endpoints.
#[async_trait]
pub trait VoiceApi: Send + Sync {
    async fn status(&self) -> Result<VoiceStatus, VoiceError>;

    /// Transcribe one captured audio payload as a single call.
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String, VoiceError>;
}

/// Exclusive handle to a capture in progress. Held by at most one voice
/// session at a time.
pub trait CaptureHandle: Send {
    /// Stop capturing and return the raw audio payload.
    fn finish(self: Box<Self>) -> Result<Vec<u8>, VoiceError>;

    /// Stop capturing and discard everything.
    fn abort(self: Box<Self>);
}

/// Audio input device used for the cloud path.
pub trait MicrophoneSource: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn CaptureHandle>, VoiceError>;
}

/// Text events streamed by the local recognizer while recording.
#[derive(Debug, Clone)]
pub enum RecognizerEvent {
    /// Unconfirmed text, superseded by the next event.
    Interim(String),
    /// Confirmed fragment, committed to the input buffer.
    Final(String),
    /// The recognizer died mid-session.
    Failed(String),
}

/// Handle to a running local recognition feed.
pub trait RecognitionHandle: Send {
    /// Graceful stop: flush any pending final fragment, then end the feed.
    fn stop(self: Box<Self>);

    /// Hard cancel: end the feed without flushing.
    fn abort(self: Box<Self>);
}

/// Continuous on-device recognition capability.
pub trait LocalRecognizer: Send + Sync {
    /// Start a recognition feed delivering events into `events`.
    fn start(
        &self,
        events: mpsc::Sender<RecognizerEvent>,
    ) -> Result<Box<dyn RecognitionHandle>, VoiceError>;
}
