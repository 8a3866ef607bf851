//! ChatServer Actor implementation
//!
//! The central actor: owns the `Coordinator` and the live connection
//! channels, and processes commands from connection handlers one at a time.
//! Uses the Actor pattern with mpsc channels for message passing.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::coordinator::{Coordinator, Delivery, Event};
use crate::error::{EventError, SendError};
use crate::message::ServerMessage;
use crate::types::{ClientId, RoomName};

/// Commands sent from handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// New connection after WebSocket handshake
    Connect {
        client_id: ClientId,
        sender: mpsc::Sender<ServerMessage>,
    },
    /// Connection closed
    Disconnect { client_id: ClientId },
    /// Protocol event from a connection
    Dispatch { client_id: ClientId, event: Event },
    /// Ask whether an upload would be accepted before its bytes are stored
    PrepareUpload {
        client_id: ClientId,
        room: Option<RoomName>,
        to: Option<ClientId>,
        is_private: bool,
        reply: oneshot::Sender<Result<(), EventError>>,
    },
}

/// The main ChatServer actor
///
/// All relay state lives in `coordinator`; `clients` is the transport side,
/// mapping each live connection to its outbound channel.
pub struct ChatServer {
    coordinator: Coordinator,
    /// All live connections: ClientId -> Client
    clients: HashMap<ClientId, Client>,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with a fresh coordinator
    pub fn new(receiver: mpsc::Receiver<ServerCommand>) -> Self {
        Self::with_coordinator(receiver, Coordinator::new())
    }

    /// Create a ChatServer around an existing coordinator
    pub fn with_coordinator(
        receiver: mpsc::Receiver<ServerCommand>,
        coordinator: Coordinator,
    ) -> Self {
        Self {
            coordinator,
            clients: HashMap::new(),
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect { client_id, sender } => {
                self.handle_connect(client_id, sender);
            }
            ServerCommand::Disconnect { client_id } => {
                self.handle_disconnect(client_id);
            }
            ServerCommand::Dispatch { client_id, event } => {
                let deliveries = self.coordinator.handle(client_id, event);
                self.deliver(deliveries);
            }
            ServerCommand::PrepareUpload {
                client_id,
                room,
                to,
                is_private,
                reply,
            } => {
                let verdict = self
                    .coordinator
                    .check_upload(client_id, room.as_ref(), to, is_private);
                if reply.send(verdict).is_err() {
                    debug!("Client {} went away before its upload check", client_id);
                }
            }
        }
    }

    /// Handle new connection
    fn handle_connect(&mut self, client_id: ClientId, sender: mpsc::Sender<ServerMessage>) {
        info!("Client {} connected", client_id);
        self.clients.insert(client_id, Client::new(client_id, sender));
        debug!("Total connections: {}", self.clients.len());
    }

    /// Handle connection close
    fn handle_disconnect(&mut self, client_id: ClientId) {
        info!("Client {} disconnected", client_id);
        self.clients.remove(&client_id);

        let deliveries = self.coordinator.handle(client_id, Event::Disconnect);
        self.deliver(deliveries);

        debug!("Total connections: {}", self.clients.len());
    }

    /// Push each delivery to its recipients' channels
    ///
    /// Recipients were resolved when the delivery was built; connections that
    /// have gone away in the meantime are skipped. Never waits on a slow
    /// connection: if its buffer is full the message is dropped for it alone.
    fn deliver(&self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            for client_id in &delivery.recipients {
                let Some(client) = self.clients.get(client_id) else {
                    continue;
                };
                match client.send(delivery.message.clone()) {
                    Ok(()) => {}
                    Err(SendError::Full) => {
                        warn!("Client {} is not keeping up, dropping message", client_id);
                    }
                    Err(SendError::ChannelClosed) => {
                        debug!("Client {} channel closed, dropping message", client_id);
                    }
                }
            }
        }
    }
}
