//! Room definitions
//!
//! A `Room` is a named set of member connections. The `RoomDirectory` owns
//! every room and the reverse client → room mapping.

use std::collections::{HashMap, HashSet};

use crate::error::EventError;
use crate::registry::ConnectionRegistry;
use crate::types::{ClientId, RoomName};

/// Chat room
///
/// Rooms are never deleted, even when their last member leaves.
#[derive(Debug)]
pub struct Room {
    pub name: RoomName,
    members: HashSet<ClientId>,
}

impl Room {
    pub fn new(name: RoomName) -> Self {
        Self {
            name,
            members: HashSet::new(),
        }
    }

    pub fn members(&self) -> &HashSet<ClientId> {
        &self.members
    }

    fn add_member(&mut self, client_id: ClientId) {
        self.members.insert(client_id);
    }

    fn remove_member(&mut self, client_id: ClientId) -> bool {
        self.members.remove(&client_id)
    }
}

/// All rooms, in creation order
///
/// Invariant: a client is in at most one room, and `client_rooms` agrees
/// with the member sets and with `User::current_room`.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    /// RoomName -> Room
    rooms: HashMap<RoomName, Room>,
    /// Creation order for room lists
    order: Vec<RoomName>,
    /// Client to room mapping for fast lookup: ClientId -> RoomName
    client_rooms: HashMap<ClientId, RoomName>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory with the default room already created
    pub fn with_default_room() -> Self {
        let mut directory = Self::new();
        directory.ensure_room(RoomName::default_room());
        directory
    }

    /// Create the room if absent
    ///
    /// Returns true if the room was newly created.
    pub fn ensure_room(&mut self, name: RoomName) -> bool {
        if self.rooms.contains_key(&name) {
            return false;
        }
        self.order.push(name.clone());
        self.rooms.insert(name.clone(), Room::new(name));
        true
    }

    pub fn contains_room(&self, name: &RoomName) -> bool {
        self.rooms.contains_key(name)
    }

    /// Move a registered user into `name`, leaving any previous room
    ///
    /// Auto-creates the target room. Updates the user's `current_room` in the
    /// same call. Returns true if the room was newly created.
    pub fn join(
        &mut self,
        registry: &mut ConnectionRegistry,
        client_id: ClientId,
        name: RoomName,
    ) -> Result<bool, EventError> {
        let user = registry
            .lookup_mut(client_id)
            .ok_or(EventError::NotJoined(client_id))?;

        self.leave(client_id);
        let created = self.ensure_room(name.clone());
        if let Some(room) = self.rooms.get_mut(&name) {
            room.add_member(client_id);
        }
        self.client_rooms.insert(client_id, name.clone());
        user.current_room = name;

        Ok(created)
    }

    /// Remove a client from its current room
    ///
    /// Returns the room it left, if any.
    pub fn leave(&mut self, client_id: ClientId) -> Option<RoomName> {
        let name = self.client_rooms.remove(&client_id)?;
        if let Some(room) = self.rooms.get_mut(&name) {
            room.remove_member(client_id);
        }
        Some(name)
    }

    /// Room the client is currently a member of
    pub fn room_of(&self, client_id: ClientId) -> Option<&RoomName> {
        self.client_rooms.get(&client_id)
    }

    /// Room names in creation order
    pub fn list_rooms(&self) -> Vec<RoomName> {
        self.order.clone()
    }

    /// Members of a room; empty for unknown rooms
    pub fn members_of(&self, name: &RoomName) -> HashSet<ClientId> {
        self.rooms
            .get(name)
            .map(|room| room.members().clone())
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
