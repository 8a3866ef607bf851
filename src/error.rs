//! Error types for the relay
//!
//! Defines connection-level errors, coordinator event errors and the
//! blob store / configuration failures.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::types::{ClientId, RoomName};

/// Connection-level errors
///
/// Covers fatal errors (connection termination) and upload failures,
/// which are reported back to the originating client only. Malformed frames
/// are reported to the sender as `invalid_message` without ending the
/// connection.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// File upload could not be stored
    #[error("Upload failed: {0}")]
    UploadFailed(String),
}

/// Message send errors
///
/// Occurs when a connection's outbound channel cannot take a message.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The connection is not draining its channel
    #[error("Channel full")]
    Full,
}

/// Connection registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A user record already exists for this connection
    #[error("Connection {0} is already registered")]
    DuplicateConnection(ClientId),
}

/// Reasons an inbound event is dropped by the coordinator
///
/// None of these reach other clients; the event is a no-op for shared state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// A required field was missing or empty
    #[error("Invalid event: {0}")]
    Validation(&'static str),

    /// Private message addressed to a connection with no user record
    #[error("Unknown target: {0}")]
    UnknownTarget(ClientId),

    /// Sender has not joined yet
    #[error("Connection {0} has not joined")]
    NotJoined(ClientId),

    /// Upload addressed to a room that was never created
    #[error("Unknown room: {0}")]
    UnknownRoom(RoomName),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Blob store errors
#[derive(Debug, Error)]
pub enum BlobError {
    /// Payload exceeds the configured upload limit
    #[error("File too large: {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },

    /// File name is empty after sanitising
    #[error("Invalid file name")]
    InvalidName,

    /// Underlying storage failure
    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BlobError> for AppError {
    fn from(err: BlobError) -> Self {
        AppError::UploadFailed(err.to_string())
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held an unparsable value
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}
