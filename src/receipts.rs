//! Read receipts
//!
//! Per-message set of connections that acknowledged reading it. Any
//! connection may mark any message id; membership is not checked.

use std::collections::{HashMap, HashSet};

use crate::types::{ClientId, MessageId};

#[derive(Debug, Default)]
pub struct ReadReceipts {
    readers: HashMap<MessageId, HashSet<ClientId>>,
}

impl ReadReceipts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a read; returns false if this reader was already recorded
    pub fn mark_read(&mut self, message_id: MessageId, client_id: ClientId) -> bool {
        self.readers.entry(message_id).or_default().insert(client_id)
    }

    pub fn readers_of(&self, message_id: MessageId) -> Option<&HashSet<ClientId>> {
        self.readers.get(&message_id)
    }

    /// Drop all receipts for a message
    pub fn forget(&mut self, message_id: MessageId) {
        self.readers.remove(&message_id);
    }

    /// Number of messages with at least one receipt
    pub fn tracked(&self) -> usize {
        self.readers.len()
    }
}
