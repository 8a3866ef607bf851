//! Client struct definition
//!
//! Transport-side handle for a live connection: the channel the `ChatServer`
//! actor uses to push messages to that connection's write task.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::ClientId;

/// Live connection
///
/// Exists from WebSocket handshake to socket close, independently of whether
/// the connection ever joined as a user.
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this connection
    pub id: ClientId,
    /// Server → Client message channel
    pub sender: mpsc::Sender<ServerMessage>,
}

impl Client {
    /// Create a new client with the given ID and sender channel
    pub fn new(id: ClientId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self { id, sender }
    }

    /// Queue a message for this client without waiting
    ///
    /// Fails if the client has stopped draining its channel or has
    /// disconnected; the message is not queued in either case.
    pub fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Full,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }
}
