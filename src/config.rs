use serde::{Deserialize, Serialize};
use std::path::Path;

/// Client configuration for the command-chat surface.
///
/// All fields have sensible defaults so a partial (or missing) config file
/// still yields a working client pointed at the local backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Realtime websocket endpoint for chat frames.
    pub realtime_url: String,

    /// REST endpoint returning the bounded recent-message history.
    pub history_url: String,

    /// REST endpoint accepting batched file uploads.
    pub upload_url: String,

    /// REST endpoint reporting transcription availability and preferred provider.
    pub voice_status_url: String,

    /// REST endpoint accepting one audio payload, returning transcript text.
    pub transcribe_url: String,

    /// Number of recent messages to seed the reconciler with.
    pub history_limit: usize,

    /// Websocket handshake timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Base delay for reconnect backoff in milliseconds (doubles per attempt).
    pub reconnect_base_delay_ms: u64,

    /// Upper bound for the reconnect backoff delay in milliseconds.
    pub reconnect_max_delay_ms: u64,

    /// Interval between liveness pings in milliseconds.
    pub ping_interval_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            realtime_url: "ws://127.0.0.1:8080/ws/chat".to_string(),
            history_url: "http://127.0.0.1:8080/api/chat/history".to_string(),
            upload_url: "http://127.0.0.1:8080/api/chat/uploads".to_string(),
            voice_status_url: "http://127.0.0.1:8080/api/voice/status".to_string(),
            transcribe_url: "http://127.0.0.1:8080/api/voice/transcribe".to_string(),
            history_limit: 50,
            connect_timeout_ms: 10_000,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            ping_interval_ms: 15_000,
        }
    }
}

/// Load configuration from a JSON file, falling back to defaults.
///
/// A missing file is normal (first run); a malformed file is logged and
/// ignored so a bad edit can never brick the chat surface.
pub fn load_config(path: &Path) -> ChatConfig {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<ChatConfig>(&contents) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Config: failed to parse {:?}: {}", path, e);
                ChatConfig::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ChatConfig::default(),
        Err(e) => {
            log::warn!("Config: failed to read {:?}: {}", path, e);
            ChatConfig::default()
        }
    }
}
