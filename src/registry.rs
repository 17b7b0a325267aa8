//! Process-wide transport session handle.
//!
//! The rendering layer can mount and unmount the chat surface repeatedly;
//! the registry guarantees at most one live transport session across those
//! cycles.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::auth::AuthProvider;
use crate::config::ChatConfig;
use crate::transport::TransportSession;

/// Holder of the single active transport session.
#[derive(Default)]
pub struct SessionRegistry {
    current: Mutex<Option<Arc<TransportSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a fresh session, tearing down any existing one
    /// first so two supervisors never dial concurrently.
    pub async fn init(
        &self,
        config: &ChatConfig,
        auth: Arc<dyn AuthProvider>,
    ) -> Arc<TransportSession> {
        let mut slot = self.current.lock().await;
        if let Some(old) = slot.take() {
            log::info!("Registry: replacing existing transport session");
            old.shutdown().await;
        }
        let session = Arc::new(TransportSession::new(config, auth));
        *slot = Some(session.clone());
        session
    }

    pub async fn current(&self) -> Option<Arc<TransportSession>> {
        self.current.lock().await.clone()
    }

    /// Shut down and drop the active session, if any.
    pub async fn teardown(&self) {
        let session = self.current.lock().await.take();
        if let Some(session) = session {
            session.shutdown().await;
        }
    }
}
