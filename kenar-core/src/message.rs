//! Conversations: per-peer ordered messages. Expiry timing lives in `expiry`.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Millis;
use crate::peer::PeerId;

/// Unique message id (random UUID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(uuid::Uuid);

impl MessageId {
    pub fn new() -> Self {
        MessageId(uuid::Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Text,
    Image,
}

/// Content of a message before the store gives it an id and a timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    pub kind: MessageKind,
    /// Text, or an image reference for `Image`.
    pub body: String,
    pub caption: Option<String>,
}

impl MessageDraft {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            body: body.into(),
            caption: None,
        }
    }

    pub fn image(image: impl Into<String>, caption: Option<String>) -> Self {
        Self {
            kind: MessageKind::Image,
            body: image.into(),
            caption,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_is_local: bool,
    pub kind: MessageKind,
    pub body: String,
    pub caption: Option<String>,
    pub created_at: Millis,
}

impl Message {
    /// Remaining lifetime as a fraction in [0, 1], linear in elapsed time.
    pub fn fraction_remaining(&self, now: Millis, ttl: Millis) -> f64 {
        if ttl == 0 {
            return 0.0;
        }
        let elapsed = now.saturating_sub(self.created_at);
        let left = ttl.saturating_sub(elapsed);
        left as f64 / ttl as f64
    }

    /// Whole seconds left, rounded up; what a countdown badge shows.
    pub fn seconds_remaining(&self, now: Millis, ttl: Millis) -> u64 {
        let elapsed = now.saturating_sub(self.created_at);
        ttl.saturating_sub(elapsed).div_ceil(1000)
    }

    pub fn expires_at(&self, ttl: Millis) -> Millis {
        self.created_at.saturating_add(ttl)
    }
}

/// Owns all conversations. Insertion order is display order.
#[derive(Default)]
pub struct MessageStore {
    conversations: HashMap<PeerId, Vec<Message>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty conversation unless one exists. Returns true if created.
    pub fn ensure_conversation(&mut self, peer_id: &PeerId) -> bool {
        if self.conversations.contains_key(peer_id) {
            return false;
        }
        self.conversations.insert(peer_id.clone(), Vec::new());
        true
    }

    pub fn has_conversation(&self, peer_id: &PeerId) -> bool {
        self.conversations.contains_key(peer_id)
    }

    /// Append a message to the peer's conversation (created if absent) and return it.
    pub fn append(
        &mut self,
        peer_id: &PeerId,
        draft: MessageDraft,
        sender_is_local: bool,
        now: Millis,
    ) -> Message {
        let msg = Message {
            id: MessageId::new(),
            sender_is_local,
            kind: draft.kind,
            body: draft.body,
            caption: draft.caption,
            created_at: now,
        };
        self.conversations
            .entry(peer_id.clone())
            .or_default()
            .push(msg.clone());
        debug!(peer = %peer_id, id = %msg.id, kind = ?msg.kind, "Message appended");
        msg
    }

    /// Remove one message. Absent ids and absent conversations are a no-op; returns whether
    /// anything was removed.
    pub fn remove(&mut self, peer_id: &PeerId, message_id: &MessageId) -> bool {
        let Some(messages) = self.conversations.get_mut(peer_id) else {
            return false;
        };
        let before = messages.len();
        messages.retain(|m| m.id != *message_id);
        before != messages.len()
    }

    /// Snapshot of a conversation; empty if it does not exist. Never creates one.
    pub fn get(&self, peer_id: &PeerId) -> Vec<Message> {
        self.conversations.get(peer_id).cloned().unwrap_or_default()
    }

    /// Drop every message of a conversation, keeping the (now empty) conversation.
    /// Returns the removed ids.
    pub fn clear(&mut self, peer_id: &PeerId) -> Vec<MessageId> {
        match self.conversations.get_mut(peer_id) {
            Some(messages) => messages.drain(..).map(|m| m.id).collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_order_and_assigns_fresh_ids() {
        let mut s = MessageStore::new();
        let p = PeerId::from("a1");
        let m1 = s.append(&p, MessageDraft::text("one"), true, 10);
        let m2 = s.append(&p, MessageDraft::text("two"), false, 5);
        assert_ne!(m1.id, m2.id);
        let got = s.get(&p);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].body, "one");
        assert_eq!(got[1].body, "two");
        assert!(got[0].sender_is_local);
        assert!(!got[1].sender_is_local);
        assert_eq!(got[1].created_at, 5);
    }

    #[test]
    fn get_does_not_create() {
        let s = MessageStore::new();
        let p = PeerId::from("a1");
        assert!(s.get(&p).is_empty());
        assert!(!s.has_conversation(&p));
    }

    #[test]
    fn ensure_conversation_keeps_existing_messages() {
        let mut s = MessageStore::new();
        let p = PeerId::from("a1");
        assert!(s.ensure_conversation(&p));
        s.append(&p, MessageDraft::text("hi"), true, 0);
        assert!(!s.ensure_conversation(&p));
        assert_eq!(s.get(&p).len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut s = MessageStore::new();
        let p = PeerId::from("a1");
        let m = s.append(&p, MessageDraft::text("hi"), true, 0);
        assert!(s.remove(&p, &m.id));
        assert!(!s.remove(&p, &m.id));
        assert!(!s.remove(&PeerId::from("nobody"), &m.id));
        assert!(s.get(&p).is_empty());
    }

    #[test]
    fn clear_returns_removed_ids() {
        let mut s = MessageStore::new();
        let p = PeerId::from("a1");
        let a = s.append(&p, MessageDraft::text("a"), true, 0);
        let b = s.append(&p, MessageDraft::image("data:image/jpeg;base64,AA", None), true, 0);
        assert_eq!(s.clear(&p), vec![a.id, b.id]);
        assert!(s.has_conversation(&p));
        assert!(s.get(&p).is_empty());
    }

    #[test]
    fn countdown_is_linear_from_creation() {
        let m = Message {
            id: MessageId::new(),
            sender_is_local: true,
            kind: MessageKind::Text,
            body: "hi".into(),
            caption: None,
            created_at: 1_000,
        };
        assert_eq!(m.fraction_remaining(1_000, 10_000), 1.0);
        assert_eq!(m.fraction_remaining(6_000, 10_000), 0.5);
        assert_eq!(m.fraction_remaining(20_000, 10_000), 0.0);
        assert_eq!(m.seconds_remaining(1_000, 10_000), 10);
        assert_eq!(m.seconds_remaining(1_001, 10_000), 10);
        assert_eq!(m.seconds_remaining(10_500, 10_000), 1);
        assert_eq!(m.seconds_remaining(11_000, 10_000), 0);
        assert_eq!(m.expires_at(10_000), 11_000);
    }

    #[test]
    fn message_serializes_for_presentation() {
        let mut s = MessageStore::new();
        let m = s.append(&PeerId::from("a1"), MessageDraft::text("hi"), true, 7);
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["body"], "hi");
        assert_eq!(v["kind"], "Text");
        assert_eq!(v["created_at"], 7);
    }
}
