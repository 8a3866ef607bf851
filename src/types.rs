//! Basic type definitions for the relay
//!
//! Provides newtype wrappers for type safety:
//! - `ClientId`: UUID-based unique connection identifier
//! - `RoomName`: name of a chat room
//! - `MessageId`: monotonically increasing message identifier

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the room every user lands in after joining.
pub const DEFAULT_ROOM: &str = "general";

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4 for type-safe connection identification.
/// All routing goes through this id, never through usernames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room name
///
/// Names are taken verbatim from clients; surrounding whitespace is trimmed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomName(pub String);

impl RoomName {
    /// Create a room name, trimming surrounding whitespace
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_string())
    }

    /// The room every joined user starts in
    pub fn default_room() -> Self {
        Self(DEFAULT_ROOM.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for RoomName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoomName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Message identifier
///
/// Issued by the coordinator from a counter, so ids are strictly increasing
/// for the lifetime of the process. Zero is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_unique() {
        let id1 = ClientId::new();
        let id2 = ClientId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_room_name_trimmed() {
        let name = RoomName::new("  lobby ");
        assert_eq!(name.as_str(), "lobby");
        assert!(RoomName::new("   ").is_empty());
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&MessageId(42)).unwrap();
        assert_eq!(json, "42");

        let json = serde_json::to_string(&RoomName::default_room()).unwrap();
        assert_eq!(json, "\"general\"");
    }
}
