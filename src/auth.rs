//! Authentication collaborator.
//!
//! The chat core never performs logins itself; it consumes an authenticated
//! principal supplied by the host application. Every transport and REST
//! request is gated on `is_authenticated()` and carries the bearer token.

use std::sync::Mutex;

/// Supplies the authenticated principal for all backend traffic.
pub trait AuthProvider: Send + Sync {
    /// Whether a principal is currently signed in. When false, the core
    /// refuses all transport activity.
    fn is_authenticated(&self) -> bool;

    /// Bearer token attached to websocket and REST requests.
    fn bearer_token(&self) -> Option<String>;
}

/// Fixed-token provider for tests and command-line tooling.
pub struct StaticAuth {
    token: Mutex<Option<String>>,
}

impl StaticAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }

    /// Provider with no principal (simulates a logged-out operator).
    pub fn logged_out() -> Self {
        Self {
            token: Mutex::new(None),
        }
    }

    /// Drop the principal, as a logout would.
    pub fn clear(&self) {
        self.token.lock().unwrap().take();
    }
}

impl AuthProvider for StaticAuth {
    fn is_authenticated(&self) -> bool {
        self.token.lock().unwrap().is_some()
    }

    fn bearer_token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }
}
