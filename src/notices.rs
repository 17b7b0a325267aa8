//! Transient user-facing notices.
//!
//! Failures in this crate are degraded locally and surfaced as short-lived
//! notices (never blocking modals, never uncaught panics into the rendering
//! layer). The rendering layer drains this queue on its own cadence.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Oldest notices are dropped once the queue is full; a stalled UI must not
/// grow memory without bound.
const MAX_QUEUED: usize = 32;

/// Cloneable handle to a shared notice queue.
#[derive(Clone, Default)]
pub struct Notices {
    queue: Arc<Mutex<VecDeque<String>>>,
}

impl Notices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: impl Into<String>) {
        let message = message.into();
        log::info!("Notice: {}", message);
        let mut queue = self.queue.lock().unwrap();
        if queue.len() >= MAX_QUEUED {
            queue.pop_front();
        }
        queue.push_back(message);
    }

    /// Remove and return all queued notices, oldest first.
    pub fn drain(&self) -> Vec<String> {
        self.queue.lock().unwrap().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }
}
