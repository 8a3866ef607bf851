//! Message reactions
//!
//! Per message, per symbol, the connections that reacted. Reactions only
//! accumulate; there is no retraction.

use std::collections::{BTreeMap, HashMap};

use crate::types::{ClientId, MessageId};

#[derive(Debug, Default)]
pub struct ReactionTracker {
    /// MessageId -> symbol -> reactors in arrival order
    reactions: HashMap<MessageId, BTreeMap<String, Vec<ClientId>>>,
}

impl ReactionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reaction; returns false if it was already present
    pub fn react(&mut self, message_id: MessageId, symbol: &str, client_id: ClientId) -> bool {
        let reactors = self
            .reactions
            .entry(message_id)
            .or_default()
            .entry(symbol.to_string())
            .or_default();
        if reactors.contains(&client_id) {
            return false;
        }
        reactors.push(client_id);
        true
    }

    /// Full tally for a message, empty if it has no reactions
    pub fn reactions_of(&self, message_id: MessageId) -> BTreeMap<String, Vec<ClientId>> {
        self.reactions.get(&message_id).cloned().unwrap_or_default()
    }

    /// Drop all reactions for a message
    pub fn forget(&mut self, message_id: MessageId) {
        self.reactions.remove(&message_id);
    }
}
