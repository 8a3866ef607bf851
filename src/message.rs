//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::types::{ClientId, MessageId, RoomName};

/// Client → Server message
///
/// All messages from client to server. Uses tagged enum with snake_case naming.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Register a username and enter the default room
    UserJoin { username: String },
    /// Create a room (no-op if it exists)
    CreateRoom { name: String },
    /// Switch to a room, creating it if needed
    JoinRoom { name: String },
    /// Send a message to the current room
    SendMessage { message: String },
    /// Send a message to one connection
    PrivateMessage { to: ClientId, message: String },
    /// Typing indicator on/off
    Typing { is_typing: bool },
    /// Acknowledge reading a message
    MessageRead {
        message_id: Option<MessageId>,
        room: Option<String>,
        #[serde(default)]
        is_private: bool,
        other_user_id: Option<ClientId>,
    },
    /// React to a message
    AddReaction {
        message_id: Option<MessageId>,
        #[serde(default)]
        emoji: String,
        room: Option<String>,
        #[serde(default)]
        is_private: bool,
        other_user_id: Option<ClientId>,
    },
    /// Upload a file (base64 payload) to a room or a peer
    UploadFile {
        file_name: String,
        data: String,
        room: Option<String>,
        to: Option<ClientId>,
        #[serde(default)]
        is_private: bool,
    },
    /// Page backwards through a room's history
    FetchHistory {
        room: Option<String>,
        before: Option<DateTime<Utc>>,
        limit: Option<usize>,
    },
}

/// Reference to a stored upload attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRef {
    pub file_url: String,
    pub file_name: String,
}

/// Where a message was addressed: a room, or exactly one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Room(RoomName),
    Private {
        receiver: String,
        receiver_id: ClientId,
    },
}

// Flattened into `ChatMessage`, so it must serialize as a map.
impl Serialize for Destination {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Destination::Room(room) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("room", room)?;
                map.serialize_entry("is_private", &false)?;
                map.end()
            }
            Destination::Private {
                receiver,
                receiver_id,
            } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("is_private", &true)?;
                map.serialize_entry("receiver", receiver)?;
                map.serialize_entry("receiver_id", receiver_id)?;
                map.end()
            }
        }
    }
}

/// A chat message, text or file
///
/// Immutable once built. Room messages are kept in the history buffer,
/// private ones are only fanned out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub id: MessageId,
    /// Sender's username at send time
    pub sender: String,
    pub sender_id: ClientId,
    /// Text body, empty for file messages
    pub message: String,
    #[serde(flatten)]
    pub file: Option<FileRef>,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub destination: Destination,
}

impl ChatMessage {
    pub fn room(&self) -> Option<&RoomName> {
        match &self.destination {
            Destination::Room(room) => Some(room),
            Destination::Private { .. } => None,
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self.destination, Destination::Private { .. })
    }
}

/// Entry of the global user list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub id: ClientId,
    pub username: String,
    pub room: RoomName,
}

/// Server → Client message
///
/// All messages from server to client. Uses tagged enum with snake_case naming.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection successful, client ID issued
    Connected { client_id: String },
    /// Every joined user
    UserList { users: Vec<UserInfo> },
    /// Someone joined the relay
    UserJoined { username: String, id: ClientId },
    /// Someone disconnected
    UserLeft { username: String, id: ClientId },
    /// All rooms in creation order
    RoomList { rooms: Vec<RoomName> },
    /// Room message (text or file)
    ReceiveMessage(ChatMessage),
    /// Direct message (text or file)
    PrivateMessage(ChatMessage),
    /// Users currently typing in a room
    TypingUsers { room: RoomName, users: Vec<String> },
    /// A connection read a message
    MessageReadUpdate {
        message_id: MessageId,
        user_id: ClientId,
    },
    /// A reaction was added; carries the full tally for the message
    ReactionUpdate {
        message_id: MessageId,
        emoji: String,
        user_id: ClientId,
        reactions: BTreeMap<String, Vec<ClientId>>,
    },
    /// Reply to a history query, oldest first
    History {
        room: RoomName,
        messages: Vec<ChatMessage>,
    },
    /// Error occurred
    Error { code: ErrorCode, message: String },
}

/// Error codes for ServerMessage::Error
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Upload could not be decoded or stored
    UploadFailed,
    /// Invalid message format
    InvalidMessage,
}

impl ServerMessage {
    /// Error notice for the connection that caused it
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code,
            message: message.into(),
        }
    }
}
