//! Per-room message history
//!
//! Each room keeps a bounded buffer of its most recent messages. When the
//! buffer is full the oldest message is dropped.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

use crate::message::ChatMessage;
use crate::types::RoomName;

/// Maximum number of messages kept per room
pub const HISTORY_CAPACITY: usize = 100;

/// Bounded, append-only message buffers keyed by room
#[derive(Debug)]
pub struct MessageStore {
    rooms: HashMap<RoomName, VecDeque<ChatMessage>>,
    capacity: usize,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rooms: HashMap::new(),
            capacity,
        }
    }

    /// Append a message to a room's buffer
    ///
    /// Returns the evicted message when the buffer overflowed.
    pub fn append(&mut self, room: &RoomName, message: ChatMessage) -> Option<ChatMessage> {
        let buffer = self.rooms.entry(room.clone()).or_default();
        buffer.push_back(message);
        if buffer.len() > self.capacity {
            buffer.pop_front()
        } else {
            None
        }
    }

    /// Messages strictly older than `before` (if given), at most `limit`,
    /// taken from the newest end and returned oldest-first
    pub fn query(
        &self,
        room: &RoomName,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Vec<ChatMessage> {
        let Some(buffer) = self.rooms.get(room) else {
            return Vec::new();
        };

        let mut page: Vec<ChatMessage> = buffer
            .iter()
            .rev()
            .filter(|m| before.map_or(true, |t| m.timestamp < t))
            .take(limit)
            .cloned()
            .collect();
        page.reverse();
        page
    }

    /// Number of messages buffered for a room
    pub fn len(&self, room: &RoomName) -> usize {
        self.rooms.get(room).map_or(0, VecDeque::len)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::message::Destination;
    use crate::types::{ClientId, MessageId};

    fn message_at(id: u64, timestamp: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            id: MessageId(id),
            sender: "Alice".to_string(),
            sender_id: ClientId::new(),
            message: format!("message {}", id),
            file: None,
            timestamp,
            destination: Destination::Room(RoomName::default_room()),
        }
    }

    fn filled_store(count: u64) -> (MessageStore, DateTime<Utc>) {
        let base = Utc::now();
        let mut store = MessageStore::new();
        let room = RoomName::default_room();
        for i in 1..=count {
            store.append(&room, message_at(i, base + Duration::seconds(i as i64)));
        }
        (store, base)
    }

    fn ids(messages: &[ChatMessage]) -> Vec<u64> {
        messages.iter().map(|m| m.id.0).collect()
    }

    #[test]
    fn test_append_evicts_oldest_past_capacity() {
        let (mut store, base) = filled_store(100);
        let room = RoomName::default_room();
        assert_eq!(store.len(&room), 100);

        let evicted = store.append(&room, message_at(101, base + Duration::seconds(101)));
        assert_eq!(evicted.map(|m| m.id), Some(MessageId(1)));
        assert_eq!(store.len(&room), 100);

        let all = store.query(&room, None, 1000);
        assert_eq!(all.first().map(|m| m.id), Some(MessageId(2)));
        assert_eq!(all.last().map(|m| m.id), Some(MessageId(101)));
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let (store, _) = filled_store(250);
        assert_eq!(store.len(&RoomName::default_room()), HISTORY_CAPACITY);
    }

    #[test]
    fn test_query_without_before_returns_latest() {
        let (store, _) = filled_store(30);
        let page = store.query(&RoomName::default_room(), None, 5);
        assert_eq!(ids(&page), vec![26, 27, 28, 29, 30]);
    }

    #[test]
    fn test_query_before_is_strict() {
        let (store, base) = filled_store(30);
        let cutoff = base + Duration::seconds(10);

        let page = store.query(&RoomName::default_room(), Some(cutoff), 4);
        assert_eq!(ids(&page), vec![6, 7, 8, 9]);
        assert!(page.iter().all(|m| m.timestamp < cutoff));
    }

    #[test]
    fn test_query_paginates_backwards() {
        let (store, _) = filled_store(12);
        let room = RoomName::default_room();

        let newest = store.query(&room, None, 5);
        assert_eq!(ids(&newest), vec![8, 9, 10, 11, 12]);

        let older = store.query(&room, Some(newest[0].timestamp), 5);
        assert_eq!(ids(&older), vec![3, 4, 5, 6, 7]);

        let oldest = store.query(&room, Some(older[0].timestamp), 5);
        assert_eq!(ids(&oldest), vec![1, 2]);
    }

    #[test]
    fn test_query_unknown_room_and_zero_limit() {
        let (store, _) = filled_store(3);
        assert!(store.query(&"nowhere".into(), None, 10).is_empty());
        assert!(store.query(&RoomName::default_room(), None, 0).is_empty());
    }
}
