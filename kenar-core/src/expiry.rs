//! Expiry queue: one logical timer per live message, keyed by message id.
//! Deadlines fire in order from `pop_due`; a cancelled timer never fires.

use std::collections::{BTreeMap, HashMap};

use crate::config::Millis;
use crate::message::MessageId;
use crate::peer::PeerId;

struct Entry {
    peer_id: PeerId,
    key: (Millis, u64),
}

#[derive(Default)]
pub struct ExpiryQueue {
    /// (deadline, insertion seq) -> message. The seq keeps equal deadlines in schedule order.
    by_deadline: BTreeMap<(Millis, u64), MessageId>,
    entries: HashMap<MessageId, Entry>,
    next_seq: u64,
}

impl ExpiryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer for a message. Re-arming an existing id replaces its deadline.
    pub fn schedule(&mut self, peer_id: PeerId, message_id: MessageId, deadline: Millis) {
        self.cancel(&message_id);
        let key = (deadline, self.next_seq);
        self.next_seq = self.next_seq.wrapping_add(1);
        self.by_deadline.insert(key, message_id);
        self.entries.insert(message_id, Entry { peer_id, key });
    }

    /// Disarm a message's timer. Returns the owning peer if a timer was armed.
    pub fn cancel(&mut self, message_id: &MessageId) -> Option<PeerId> {
        let entry = self.entries.remove(message_id)?;
        self.by_deadline.remove(&entry.key);
        Some(entry.peer_id)
    }

    /// Disarm every timer belonging to a peer. Returns how many were released.
    pub fn cancel_peer(&mut self, peer_id: &PeerId) -> usize {
        let ids: Vec<MessageId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.peer_id == *peer_id)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            self.cancel(id);
        }
        ids.len()
    }

    /// Remove and return every timer whose deadline is at or before `now`, earliest first.
    pub fn pop_due(&mut self, now: Millis) -> Vec<(PeerId, MessageId)> {
        let mut due = Vec::new();
        while let Some((&key, &message_id)) = self.by_deadline.first_key_value() {
            if key.0 > now {
                break;
            }
            self.by_deadline.remove(&key);
            if let Some(entry) = self.entries.remove(&message_id) {
                due.push((entry.peer_id, message_id));
            }
        }
        due
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.by_deadline.keys().next().map(|k| k.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_deadline_order() {
        let mut q = ExpiryQueue::new();
        let (a, b, c) = (MessageId::new(), MessageId::new(), MessageId::new());
        q.schedule(PeerId::from("p"), a, 300);
        q.schedule(PeerId::from("p"), b, 100);
        q.schedule(PeerId::from("q"), c, 200);
        assert_eq!(q.next_deadline(), Some(100));
        assert!(q.pop_due(99).is_empty());
        let due: Vec<MessageId> = q.pop_due(250).into_iter().map(|(_, id)| id).collect();
        assert_eq!(due, vec![b, c]);
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop_due(300), vec![(PeerId::from("p"), a)]);
        assert!(q.is_empty());
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut q = ExpiryQueue::new();
        let a = MessageId::new();
        q.schedule(PeerId::from("p"), a, 100);
        assert_eq!(q.cancel(&a), Some(PeerId::from("p")));
        assert_eq!(q.cancel(&a), None);
        assert!(q.pop_due(1_000).is_empty());
    }

    #[test]
    fn reschedule_replaces_deadline() {
        let mut q = ExpiryQueue::new();
        let a = MessageId::new();
        q.schedule(PeerId::from("p"), a, 100);
        q.schedule(PeerId::from("p"), a, 500);
        assert_eq!(q.len(), 1);
        assert!(q.pop_due(100).is_empty());
        assert_eq!(q.pop_due(500).len(), 1);
    }

    #[test]
    fn cancel_peer_releases_only_that_peer() {
        let mut q = ExpiryQueue::new();
        let (a, b, c) = (MessageId::new(), MessageId::new(), MessageId::new());
        q.schedule(PeerId::from("p"), a, 100);
        q.schedule(PeerId::from("p"), b, 200);
        q.schedule(PeerId::from("q"), c, 300);
        assert_eq!(q.cancel_peer(&PeerId::from("p")), 2);
        assert_eq!(q.cancel(&a), None);
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop_due(1_000), vec![(PeerId::from("q"), c)]);
    }
}
