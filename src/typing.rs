//! Typing indicators
//!
//! Tracks, per room, which connections have signalled that they are typing.
//! Entries only go away on an explicit stop or on disconnect.

use std::collections::HashMap;

use crate::types::{ClientId, RoomName};

#[derive(Debug, Default)]
pub struct TypingTracker {
    /// RoomName -> (ClientId, username) in insertion order
    rooms: HashMap<RoomName, Vec<(ClientId, String)>>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a connection started or stopped typing in a room
    pub fn set_typing(
        &mut self,
        room: &RoomName,
        client_id: ClientId,
        username: &str,
        is_typing: bool,
    ) {
        if !is_typing {
            self.clear(room, client_id);
            return;
        }

        let entries = self.rooms.entry(room.clone()).or_default();
        match entries.iter_mut().find(|(id, _)| *id == client_id) {
            Some(entry) => entry.1 = username.to_string(),
            None => entries.push((client_id, username.to_string())),
        }
    }

    /// Drop a connection's typing entry
    ///
    /// Returns true if an entry was removed.
    pub fn clear(&mut self, room: &RoomName, client_id: ClientId) -> bool {
        let Some(entries) = self.rooms.get_mut(room) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(id, _)| *id != client_id);
        entries.len() != before
    }

    /// Usernames currently typing in a room
    pub fn snapshot(&self, room: &RoomName) -> Vec<String> {
        self.rooms
            .get(room)
            .map(|entries| entries.iter().map(|(_, name)| name.clone()).collect())
            .unwrap_or_default()
    }
}
