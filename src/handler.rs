//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake,
//! message parsing, upload storage, and bidirectional communication with
//! the ChatServer.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::blob::BlobStore;
use crate::coordinator::Event;
use crate::error::{AppError, EventError};
use crate::message::{ClientMessage, ErrorCode, FileRef, ServerMessage};
use crate::server::ServerCommand;
use crate::types::{ClientId, RoomName};

/// Outbound buffer per connection
const CLIENT_BUFFER_SIZE: usize = 32;

/// Handle a new TCP connection
///
/// Performs WebSocket handshake, sets up bidirectional communication,
/// and manages the connection lifecycle.
pub async fn handle_connection<B>(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
    uploads: Arc<B>,
) -> Result<(), AppError>
where
    B: BlobStore + 'static,
{
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let client_id = ClientId::new();
    info!("Client {} connected from {}", client_id, peer_addr);

    // Create channel for server -> client messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(CLIENT_BUFFER_SIZE);

    // Malformed frames and upload failures go straight back to this connection
    let reply_tx = msg_tx.clone();

    if cmd_tx
        .send(ServerCommand::Connect {
            client_id,
            sender: msg_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register client {} - server closed", client_id);
        return Err(AppError::ChannelSend);
    }

    let connected_msg = ServerMessage::Connected {
        client_id: client_id.to_string(),
    };
    let json = serde_json::to_string(&connected_msg)?;
    ws_sender.send(Message::Text(json.into())).await?;

    let cmd_tx_read = cmd_tx.clone();

    // Spawn read task (WebSocket -> ServerCommand)
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    let client_msg = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => client_msg,
                        Err(e) => {
                            warn!("Invalid JSON from {}: {}", client_id, e);
                            let reply = ServerMessage::error(
                                ErrorCode::InvalidMessage,
                                format!("Invalid message format: {}", e),
                            );
                            if reply_tx.try_send(reply).is_err() {
                                debug!("Dropped error reply for {}", client_id);
                            }
                            continue;
                        }
                    };

                    let converted =
                        into_event(client_id, client_msg, uploads.as_ref(), &cmd_tx_read).await;
                    let event = match converted {
                        Ok(Some(event)) => event,
                        Ok(None) => continue,
                        Err(AppError::UploadFailed(reason)) => {
                            warn!("Upload from {} failed: {}", client_id, reason);
                            let reply = ServerMessage::error(
                                ErrorCode::UploadFailed,
                                format!("Upload failed: {}", reason),
                            );
                            if reply_tx.try_send(reply).is_err() {
                                debug!("Dropped error reply for {}", client_id);
                            }
                            continue;
                        }
                        Err(e) => {
                            debug!("Ending read task for {}: {}", client_id, e);
                            break;
                        }
                    };

                    if cmd_tx_read
                        .send(ServerCommand::Dispatch { client_id, event })
                        .await
                        .is_err()
                    {
                        debug!("Server closed, ending read task for {}", client_id);
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Client {} sent close frame", client_id);
                    break;
                }
                Ok(Message::Ping(_)) => {
                    // Pong is handled automatically by tungstenite
                    debug!("Ping from {}", client_id);
                }
                Ok(Message::Pong(_)) => {
                    debug!("Pong from {}", client_id);
                }
                Ok(_) => {
                    // Binary or other message types - ignore
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", client_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", client_id);
    });

    // Spawn write task (ServerMessage -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                }
            }
        }
        debug!("Write task ended for client");

        let _ = ws_sender.close().await;
    });

    // Nothing from this connection may reach the server after Disconnect
    finish_first(read_task, write_task).await;
    debug!("Connection tasks finished for {}", client_id);

    let _ = cmd_tx.send(ServerCommand::Disconnect { client_id }).await;

    info!("Client {} disconnected", client_id);

    Ok(())
}

/// Wait for whichever task ends first, then abort the other and wait for it
/// to stop
async fn finish_first(mut read_task: JoinHandle<()>, mut write_task: JoinHandle<()>) {
    let read_finished = tokio::select! {
        _ = &mut read_task => true,
        _ = &mut write_task => false,
    };
    let survivor = if read_finished { write_task } else { read_task };
    survivor.abort();
    let _ = survivor.await;
}

/// Convert a ClientMessage to a coordinator Event
///
/// Uploads are checked with the server, then decoded and written to the blob
/// store here, so the event the coordinator sees already carries the stored
/// file's URL. Returns `None` for an upload the server would refuse; nothing
/// is written in that case.
async fn into_event<B: BlobStore>(
    client_id: ClientId,
    msg: ClientMessage,
    uploads: &B,
    cmd_tx: &mpsc::Sender<ServerCommand>,
) -> Result<Option<Event>, AppError> {
    let event = match msg {
        ClientMessage::UserJoin { username } => Event::Join { username },
        ClientMessage::CreateRoom { name } => Event::CreateRoom {
            name: RoomName::new(name),
        },
        ClientMessage::JoinRoom { name } => Event::JoinRoom {
            name: RoomName::new(name),
        },
        ClientMessage::SendMessage { message } => Event::SendMessage { body: message },
        ClientMessage::PrivateMessage { to, message } => Event::SendPrivate { to, body: message },
        ClientMessage::Typing { is_typing } => Event::SetTyping { is_typing },
        ClientMessage::MessageRead {
            message_id,
            room,
            is_private,
            other_user_id,
        } => Event::MarkRead {
            message_id,
            room: room.map(RoomName::new),
            is_private,
            other_id: other_user_id,
        },
        ClientMessage::AddReaction {
            message_id,
            emoji,
            room,
            is_private,
            other_user_id,
        } => Event::AddReaction {
            message_id,
            emoji,
            room: room.map(RoomName::new),
            is_private,
            other_id: other_user_id,
        },
        ClientMessage::UploadFile {
            file_name,
            data,
            room,
            to,
            is_private,
        } => {
            let room = room.map(RoomName::new);
            let verdict = prepare_upload(cmd_tx, client_id, room.clone(), to, is_private).await?;
            if let Err(reason) = verdict {
                debug!("Upload from {} refused: {}", client_id, reason);
                return Ok(None);
            }

            let file = store_upload(uploads, file_name, &data).await?;
            Event::UploadComplete {
                file,
                room,
                to,
                is_private,
            }
        }
        ClientMessage::FetchHistory {
            room,
            before,
            limit,
        } => Event::FetchHistory {
            room: room.map(RoomName::new),
            before,
            limit,
        },
    };
    Ok(Some(event))
}

/// Ask the server whether an upload would be accepted
async fn prepare_upload(
    cmd_tx: &mpsc::Sender<ServerCommand>,
    client_id: ClientId,
    room: Option<RoomName>,
    to: Option<ClientId>,
    is_private: bool,
) -> Result<Result<(), EventError>, AppError> {
    let (reply, verdict) = oneshot::channel();
    cmd_tx
        .send(ServerCommand::PrepareUpload {
            client_id,
            room,
            to,
            is_private,
            reply,
        })
        .await
        .map_err(|_| AppError::ChannelSend)?;
    verdict.await.map_err(|_| AppError::ChannelSend)
}

/// Decode a base64 upload and persist it
async fn store_upload<B: BlobStore>(
    uploads: &B,
    file_name: String,
    data: &str,
) -> Result<FileRef, AppError> {
    let bytes = STANDARD
        .decode(data)
        .map_err(|e| AppError::UploadFailed(format!("invalid base64 payload: {}", e)))?;
    let blob = uploads.store(bytes, &file_name).await?;
    info!("Stored upload '{}' as {}", file_name, blob.stored_name);

    Ok(FileRef {
        file_url: blob.url,
        file_name,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::blob::{DiskBlobStore, DEFAULT_MAX_UPLOAD_BYTES};
    use crate::server::ChatServer;
    use crate::types::MessageId;

    fn store_in(dir: &tempfile::TempDir) -> DiskBlobStore {
        DiskBlobStore::new(dir.path(), "/uploads", DEFAULT_MAX_UPLOAD_BYTES)
    }

    fn start_server() -> mpsc::Sender<ServerCommand> {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        tokio::spawn(ChatServer::new(cmd_rx).run());
        cmd_tx
    }

    /// A running server on which `client_id` has already joined
    async fn server_with(client_id: ClientId) -> mpsc::Sender<ServerCommand> {
        let cmd_tx = start_server();
        cmd_tx
            .send(ServerCommand::Dispatch {
                client_id,
                event: Event::Join {
                    username: "A".to_string(),
                },
            })
            .await
            .unwrap();
        cmd_tx
    }

    fn upload(data: String, room: Option<&str>, to: Option<ClientId>) -> ClientMessage {
        ClientMessage::UploadFile {
            file_name: "hello.txt".to_string(),
            data,
            room: room.map(str::to_string),
            to,
            is_private: to.is_some(),
        }
    }

    fn files_in(dir: &tempfile::TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[tokio::test]
    async fn test_room_names_are_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let event = into_event(
            ClientId::new(),
            ClientMessage::JoinRoom {
                name: "  random ".to_string(),
            },
            &store_in(&dir),
            &start_server(),
        )
        .await
        .unwrap();

        assert!(
            matches!(event, Some(Event::JoinRoom { name }) if name == RoomName::from("random"))
        );
    }

    #[tokio::test]
    async fn test_reaction_fields_carried_over() {
        let dir = tempfile::tempdir().unwrap();
        let other = ClientId::new();
        let event = into_event(
            ClientId::new(),
            ClientMessage::AddReaction {
                message_id: Some(MessageId(4)),
                emoji: "👍".to_string(),
                room: None,
                is_private: true,
                other_user_id: Some(other),
            },
            &store_in(&dir),
            &start_server(),
        )
        .await
        .unwrap();

        match event {
            Some(Event::AddReaction {
                message_id,
                is_private,
                other_id,
                ..
            }) => {
                assert_eq!(message_id, Some(MessageId(4)));
                assert!(is_private);
                assert_eq!(other_id, Some(other));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upload_becomes_file_event() {
        let dir = tempfile::tempdir().unwrap();
        let alice = ClientId::new();
        let event = into_event(
            alice,
            upload(STANDARD.encode(b"hello"), Some("general"), None),
            &store_in(&dir),
            &server_with(alice).await,
        )
        .await
        .unwrap();

        match event {
            Some(Event::UploadComplete { file, room, .. }) => {
                assert_eq!(file.file_name, "hello.txt");
                assert!(file.file_url.starts_with("/uploads/"));
                assert_eq!(room, Some(RoomName::default_room()));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(files_in(&dir), 1);
    }

    #[tokio::test]
    async fn test_bad_upload_payload_fails() {
        let dir = tempfile::tempdir().unwrap();
        let alice = ClientId::new();
        let result = into_event(
            alice,
            upload("not base64!".to_string(), Some("general"), None),
            &store_in(&dir),
            &server_with(alice).await,
        )
        .await;

        assert!(matches!(result, Err(AppError::UploadFailed(_))));
    }

    #[tokio::test]
    async fn test_upload_from_unjoined_connection_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cmd_tx = start_server();

        for _ in 0..3 {
            let event = into_event(
                ClientId::new(),
                upload(STANDARD.encode(b"hello"), Some("general"), None),
                &store_in(&dir),
                &cmd_tx,
            )
            .await
            .unwrap();
            assert!(event.is_none());
        }
        assert_eq!(files_in(&dir), 0);
    }

    #[tokio::test]
    async fn test_upload_to_unknown_recipient_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let alice = ClientId::new();
        let event = into_event(
            alice,
            upload(STANDARD.encode(b"hello"), None, Some(ClientId::new())),
            &store_in(&dir),
            &server_with(alice).await,
        )
        .await
        .unwrap();

        assert!(event.is_none());
        assert_eq!(files_in(&dir), 0);
    }

    #[tokio::test]
    async fn test_upload_fails_when_server_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        drop(cmd_rx);

        let result = into_event(
            ClientId::new(),
            upload(STANDARD.encode(b"hello"), Some("general"), None),
            &store_in(&dir),
            &cmd_tx,
        )
        .await;
        assert!(matches!(result, Err(AppError::ChannelSend)));
    }

    #[tokio::test]
    async fn test_finish_first_stops_the_other_task() {
        let (tx, mut rx) = mpsc::channel::<&str>(1);

        // Would dispatch a late frame if left running
        let read_task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send("late").await;
        });
        let write_task = tokio::spawn(async {});

        finish_first(read_task, write_task).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_finish_first_after_read_ends() {
        let read_task = tokio::spawn(async {});
        let write_task = tokio::spawn(std::future::pending::<()>());

        tokio::time::timeout(Duration::from_secs(1), finish_first(read_task, write_task))
            .await
            .expect("pending task was not aborted");
    }
}
