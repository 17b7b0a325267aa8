//! Realtime command-chat client for the operator dashboard.
//!
//! The crate is a UI-free core: it maintains one authenticated websocket to
//! the backend, reconciles the live message stream with a bounded history
//! fetch, stages file attachments through a batched upload pipeline, and
//! drives voice capture with an automatic cloud-to-local fallback. The
//! rendering layer consumes snapshots ([`chat::ChatUiState`],
//! [`voice::VoiceUiState`], [`transport::ConnectionStats`]) and the
//! [`notices::Notices`] queue.

pub mod auth;
pub mod chat;
pub mod config;
pub mod notices;
pub mod registry;
pub mod transport;
pub mod upload;
pub mod voice;

pub use auth::{AuthProvider, StaticAuth};
pub use chat::{ChatFacade, ChatMessage, ChatUiState};
pub use config::{load_config, ChatConfig};
pub use notices::Notices;
pub use registry::SessionRegistry;
pub use transport::{ConnectionState, ConnectionStats, TransportSession};
pub use upload::{AttachmentPipeline, HttpUploader, LocalFile};
pub use voice::{VoiceCaptureEngine, VoiceEffectRunner, VoiceUiState};
