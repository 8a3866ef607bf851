//! Messaging Relay - Entry Point
//!
//! Starts the TCP listener and ChatServer actor, accepting connections.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use room_relay::{handle_connection, ChatServer, Config, Coordinator, DiskBlobStore};

/// Channel buffer size for server commands
const CHANNEL_BUFFER_SIZE: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=room_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("room_relay=info")),
        )
        .init();

    let config = Config::from_env()?;

    let uploads = Arc::new(DiskBlobStore::new(
        config.upload_dir.clone(),
        config.upload_url_prefix.clone(),
        config.max_upload_bytes,
    ));
    info!("Storing uploads in {}", uploads.dir().display());

    let listener = TcpListener::bind(&config.addr).await?;
    info!("Relay listening on {}", config.addr);

    // Create ChatServer actor channel and start
    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    let coordinator = Coordinator::with_retention(config.retention);
    let server = ChatServer::with_coordinator(cmd_rx, coordinator);
    tokio::spawn(server.run());

    info!("ChatServer actor started");

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let cmd_tx = cmd_tx.clone();
                let uploads = uploads.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, cmd_tx, uploads).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
