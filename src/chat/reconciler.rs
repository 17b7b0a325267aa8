//! Merges the one-shot history fetch with the live stream.
//!
//! # Ordering
//!
//! Message order is history-seed order followed by live arrival order. No
//! re-sorting by timestamp happens after seeding: a late frame with an
//! earlier timestamp still renders after what is already shown. Accepted
//! tradeoff for simplicity over strict chronology.

use std::collections::HashSet;

use chrono::Utc;

use super::message::ChatMessage;
use crate::transport::WireMessage;

/// Ordered, de-duplicated message list.
pub struct MessageReconciler {
    messages: Vec<ChatMessage>,
    seen: HashSet<String>,
    seeded: bool,
}

impl Default for MessageReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageReconciler {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            seen: HashSet::new(),
            seeded: false,
        }
    }

    /// Seed the list from the bounded history fetch. Only the first call
    /// takes effect; identifiers already appended live are not repeated.
    pub fn seed_history(&mut self, history: Vec<ChatMessage>) {
        if self.seeded {
            log::warn!("Reconciler: ignoring second history seed");
            return;
        }
        self.seeded = true;

        let mut tail = std::mem::take(&mut self.messages);
        for msg in history {
            if self.seen.insert(msg.id.clone()) {
                self.messages.push(msg);
            }
        }
        // Frames that arrived before the seed completed stay after history.
        self.messages.append(&mut tail);
        log::debug!("Reconciler: seeded {} messages", self.messages.len());
    }

    /// Append a live frame unless its identifier was already seen.
    ///
    /// When the server omits an identifier one is synthesized from the
    /// frame's timestamp. Near-simultaneous unidentified frames can collide
    /// under that fallback; the backend is expected to supply identifiers.
    pub fn ingest(&mut self, wire: WireMessage) -> Option<&ChatMessage> {
        let created_at = wire.created_at.unwrap_or_else(Utc::now);
        let id = wire
            .id
            .unwrap_or_else(|| format!("ts-{}", created_at.timestamp_millis()));

        if !self.seen.insert(id.clone()) {
            log::debug!("Reconciler: duplicate frame {} absorbed", id);
            return None;
        }

        self.messages.push(ChatMessage {
            id,
            role: wire.role,
            content: wire.content,
            created_at,
            task_id: wire.task_id,
            attachments: wire.attachments,
        });
        self.messages.last()
    }

    /// Optimistically append a locally composed message. Registers its
    /// identifier so a later server echo of the same message de-dupes.
    pub fn record_local(&mut self, msg: ChatMessage) -> bool {
        if !self.seen.insert(msg.id.clone()) {
            return false;
        }
        self.messages.push(msg);
        true
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Role;
    use chrono::TimeZone;

    fn wire(id: Option<&str>, content: &str) -> WireMessage {
        WireMessage {
            id: id.map(String::from),
            role: Role::Assistant,
            content: content.to_string(),
            created_at: Some(Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap()),
            task_id: None,
            attachments: Vec::new(),
        }
    }

    fn seeded(ids: &[&str]) -> MessageReconciler {
        let mut rec = MessageReconciler::new();
        rec.seed_history(
            ids.iter()
                .map(|id| ChatMessage {
                    id: id.to_string(),
                    role: Role::Assistant,
                    content: format!("history {}", id),
                    created_at: Utc::now(),
                    task_id: None,
                    attachments: Vec::new(),
                })
                .collect(),
        );
        rec
    }

    #[test]
    fn each_identifier_appears_exactly_once() {
        let mut rec = seeded(&["h1", "h2"]);
        assert!(rec.ingest(wire(Some("m1"), "a")).is_some());
        assert!(rec.ingest(wire(Some("m1"), "a again")).is_none());
        // Identifier present in both history seed and live stream.
        assert!(rec.ingest(wire(Some("h2"), "echo of history")).is_none());

        let ids: Vec<&str> = rec.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["h1", "h2", "m1"]);
    }

    #[test]
    fn order_is_seed_then_arrival_regardless_of_timestamps() {
        let mut rec = seeded(&["h1"]);
        let mut late = wire(Some("m-late"), "late frame, early timestamp");
        late.created_at = Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        rec.ingest(wire(Some("m-first"), "first"));
        rec.ingest(late);

        let ids: Vec<&str> = rec.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["h1", "m-first", "m-late"]);
    }

    #[test]
    fn missing_identifier_is_synthesized_from_timestamp() {
        let mut rec = MessageReconciler::new();
        let appended = rec.ingest(wire(None, "no id")).cloned().unwrap();
        assert!(appended.id.starts_with("ts-"));

        // Same timestamp, no id: collides with the synthesized id and dedupes.
        assert!(rec.ingest(wire(None, "same instant")).is_none());
    }

    #[test]
    fn local_record_dedupes_server_echo() {
        let mut rec = MessageReconciler::new();
        let msg = ChatMessage::operator("status", vec![]);
        let id = msg.id.clone();
        assert!(rec.record_local(msg));

        assert!(rec.ingest(wire(Some(&id), "status")).is_none());
        assert_eq!(rec.len(), 1);
    }

    #[test]
    fn second_seed_is_ignored() {
        let mut rec = seeded(&["h1"]);
        rec.seed_history(vec![ChatMessage::system("again")]);
        assert_eq!(rec.len(), 1);
    }

    #[test]
    fn frames_before_seed_stay_after_history() {
        let mut rec = MessageReconciler::new();
        rec.ingest(wire(Some("live-1"), "early live"));
        rec.seed_history(vec![ChatMessage {
            id: "h1".to_string(),
            role: Role::Assistant,
            content: "history".to_string(),
            created_at: Utc::now(),
            task_id: None,
            attachments: Vec::new(),
        }]);

        let ids: Vec<&str> = rec.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["h1", "live-1"]);
    }
}
