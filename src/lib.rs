//! Group and Direct Messaging Relay Library
//!
//! A WebSocket relay built with tokio-tungstenite using the Actor pattern
//! for state management.
//!
//! # Features
//! - Named rooms with a default `general` room
//! - Room and private (direct) messages, text or file
//! - Typing indicators per room
//! - Read receipts and emoji reactions
//! - Bounded per-room history with backward pagination
//! - Disconnection cleanup
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Coordinator` owns all relay state and turns each event into deliveries
//! - `ChatServer` is the actor that owns the coordinator and the connection channels
//! - Each connection has a `handler` task communicating with the server
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use room_relay::{handle_connection, ChatServer, DiskBlobStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:5000").await.unwrap();
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!     let uploads = Arc::new(DiskBlobStore::new("uploads", "/uploads", 10 << 20));
//!
//!     tokio::spawn(ChatServer::new(cmd_rx).run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, cmd_tx.clone(), uploads.clone()));
//!     }
//! }
//! ```

pub mod blob;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod handler;
pub mod history;
pub mod message;
pub mod reactions;
pub mod receipts;
pub mod registry;
pub mod room;
pub mod server;
pub mod types;
pub mod typing;

// Re-export main types for convenience
pub use blob::{BlobStore, DiskBlobStore, StoredBlob};
pub use client::Client;
pub use config::Config;
pub use coordinator::{Coordinator, Delivery, Event, Target, TrackerRetention};
pub use error::{AppError, BlobError, ConfigError, EventError, RegistryError, SendError};
pub use handler::handle_connection;
pub use history::{MessageStore, HISTORY_CAPACITY};
pub use message::{
    ChatMessage, ClientMessage, Destination, ErrorCode, FileRef, ServerMessage, UserInfo,
};
pub use reactions::ReactionTracker;
pub use receipts::ReadReceipts;
pub use registry::{ConnectionRegistry, User};
pub use room::{Room, RoomDirectory};
pub use server::{ChatServer, ServerCommand};
pub use types::{ClientId, MessageId, RoomName, DEFAULT_ROOM};
pub use typing::TypingTracker;
