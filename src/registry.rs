//! Connection registry
//!
//! Maps a connection id to the user record created when that connection joins.

use std::collections::HashMap;

use crate::error::RegistryError;
use crate::types::{ClientId, RoomName};

/// A joined user
///
/// Exists from `user_join` until disconnect. Usernames need not be unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Connection this user belongs to
    pub id: ClientId,
    pub username: String,
    /// Room the user is currently in; kept in step with the room directory
    pub current_room: RoomName,
}

/// All joined users, keyed by connection id
///
/// Registration order is remembered so user lists are stable.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    users: HashMap<ClientId, User>,
    order: Vec<ClientId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user for a connection
    ///
    /// Fails if the connection already has a user record.
    pub fn register(
        &mut self,
        id: ClientId,
        username: String,
        room: RoomName,
    ) -> Result<&User, RegistryError> {
        if self.users.contains_key(&id) {
            return Err(RegistryError::DuplicateConnection(id));
        }
        self.order.push(id);
        Ok(self.users.entry(id).or_insert(User {
            id,
            username,
            current_room: room,
        }))
    }

    pub fn lookup(&self, id: ClientId) -> Option<&User> {
        self.users.get(&id)
    }

    pub(crate) fn lookup_mut(&mut self, id: ClientId) -> Option<&mut User> {
        self.users.get_mut(&id)
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.users.contains_key(&id)
    }

    /// Remove a user record, returning it if one existed
    pub fn unregister(&mut self, id: ClientId) -> Option<User> {
        let user = self.users.remove(&id)?;
        self.order.retain(|other| *other != id);
        Some(user)
    }

    /// Users in registration order
    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.order.iter().filter_map(|id| self.users.get(id))
    }

    /// Connection ids in registration order
    pub fn ids(&self) -> Vec<ClientId> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
