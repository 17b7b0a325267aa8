//! Realtime transport for the command chat.
//!
//! One authenticated websocket per session, with automatic reconnection on
//! unexpected close and a manual retry path for the operator. Connection
//! failures are reported through [`ConnectionStats`], never thrown at
//! callers.

mod protocol;
mod session;

pub use protocol::{ClientFrame, ServerFrame, WireMessage};
pub use session::{ConnectionState, ConnectionStats, FrameHandler, TransportSession};

/// Errors raised while dialing or speaking the realtime protocol.
#[derive(Debug, Clone)]
pub enum TransportError {
    /// No authenticated principal; all transport activity is refused.
    NotAuthenticated,
    /// Websocket handshake failed or timed out.
    ConnectionFailed(String),
    /// The connection dropped mid-session.
    Disconnected(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::NotAuthenticated => {
                write!(f, "Not authenticated; transport refused")
            }
            TransportError::ConnectionFailed(e) => {
                write!(f, "Failed to connect to realtime endpoint: {}", e)
            }
            TransportError::Disconnected(e) => write!(f, "Connection lost: {}", e),
        }
    }
}

impl std::error::Error for TransportError {}

/// Outbound surface the chat facade depends on.
///
/// Kept narrow so the facade can be exercised without a live socket.
pub trait Outbound: Send + Sync {
    /// Hand a frame to the live connection. `false` means not connected;
    /// the caller must not assume delivery.
    fn send_frame(&self, frame: &ClientFrame) -> bool;

    fn connection_stats(&self) -> ConnectionStats;
}
