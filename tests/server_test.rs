//! ChatServer actor driven through its command channel

use std::time::Duration;

use room_relay::{ChatServer, ClientId, Event, RoomName, ServerCommand, ServerMessage};
use tokio::sync::mpsc;
use tokio::time::timeout;

struct TestClient {
    id: ClientId,
    rx: mpsc::Receiver<ServerMessage>,
}

impl TestClient {
    async fn connect(cmd_tx: &mpsc::Sender<ServerCommand>) -> Self {
        Self::connect_with_buffer(cmd_tx, 64).await
    }

    async fn connect_with_buffer(cmd_tx: &mpsc::Sender<ServerCommand>, buffer: usize) -> Self {
        let id = ClientId::new();
        let (tx, rx) = mpsc::channel(buffer);
        cmd_tx
            .send(ServerCommand::Connect { client_id: id, sender: tx })
            .await
            .unwrap();
        Self { id, rx }
    }

    async fn join(cmd_tx: &mpsc::Sender<ServerCommand>, username: &str) -> Self {
        Self::join_with_buffer(cmd_tx, username, 64).await
    }

    async fn join_with_buffer(
        cmd_tx: &mpsc::Sender<ServerCommand>,
        username: &str,
        buffer: usize,
    ) -> Self {
        let client = Self::connect_with_buffer(cmd_tx, buffer).await;
        dispatch(
            cmd_tx,
            client.id,
            Event::Join {
                username: username.to_string(),
            },
        )
        .await;
        client
    }

    async fn next(&mut self) -> ServerMessage {
        timeout(Duration::from_secs(2), self.rx.recv())
            .await
            .expect("timed out waiting for message")
            .expect("channel closed")
    }

    /// Skip messages until one matches
    async fn next_matching(&mut self, pred: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
        loop {
            let msg = self.next().await;
            if pred(&msg) {
                return msg;
            }
        }
    }

    async fn assert_silent(&mut self) {
        let result = timeout(Duration::from_millis(100), self.rx.recv()).await;
        assert!(result.is_err(), "unexpected message: {:?}", result);
    }

    /// Drain everything already queued
    async fn drain(&mut self) {
        while timeout(Duration::from_millis(50), self.rx.recv()).await.is_ok() {}
    }
}

async fn dispatch(cmd_tx: &mpsc::Sender<ServerCommand>, client_id: ClientId, event: Event) {
    cmd_tx
        .send(ServerCommand::Dispatch { client_id, event })
        .await
        .unwrap();
}

fn start() -> mpsc::Sender<ServerCommand> {
    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    tokio::spawn(ChatServer::new(cmd_rx).run());
    cmd_tx
}

#[tokio::test]
async fn join_announces_to_everyone() {
    let cmd_tx = start();
    let mut alice = TestClient::join(&cmd_tx, "Alice").await;
    alice.drain().await;

    let mut bob = TestClient::join(&cmd_tx, "Bob").await;

    for client in [&mut alice, &mut bob] {
        let msg = client
            .next_matching(|m| matches!(m, ServerMessage::UserJoined { .. }))
            .await;
        assert!(matches!(msg, ServerMessage::UserJoined { username, .. } if username == "Bob"));
    }
}

#[tokio::test]
async fn room_message_reaches_both_members() {
    let cmd_tx = start();
    let mut alice = TestClient::join(&cmd_tx, "A").await;
    let mut bob = TestClient::join(&cmd_tx, "B").await;
    alice.drain().await;
    bob.drain().await;

    dispatch(
        &cmd_tx,
        alice.id,
        Event::SendMessage {
            body: "hi".to_string(),
        },
    )
    .await;

    for client in [&mut alice, &mut bob] {
        match client.next().await {
            ServerMessage::ReceiveMessage(chat) => {
                assert_eq!(chat.sender, "A");
                assert_eq!(chat.message, "hi");
                assert_eq!(chat.room(), Some(&RoomName::default_room()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

#[tokio::test]
async fn private_message_skips_third_party() {
    let cmd_tx = start();
    let mut alice = TestClient::join(&cmd_tx, "A").await;
    let mut bob = TestClient::join(&cmd_tx, "B").await;
    let mut carol = TestClient::join(&cmd_tx, "C").await;
    alice.drain().await;
    bob.drain().await;
    carol.drain().await;

    dispatch(
        &cmd_tx,
        alice.id,
        Event::SendPrivate {
            to: bob.id,
            body: "hey".to_string(),
        },
    )
    .await;

    for client in [&mut alice, &mut bob] {
        assert!(matches!(
            client.next().await,
            ServerMessage::PrivateMessage(chat) if chat.message == "hey"
        ));
    }
    carol.assert_silent().await;
}

#[tokio::test]
async fn disconnect_clears_typing_and_user_list() {
    let cmd_tx = start();
    let alice = TestClient::join(&cmd_tx, "A").await;
    let mut bob = TestClient::join(&cmd_tx, "B").await;
    dispatch(&cmd_tx, alice.id, Event::SetTyping { is_typing: true }).await;
    bob.next_matching(|m| {
        matches!(m, ServerMessage::TypingUsers { users, .. } if users == &vec!["A".to_string()])
    })
    .await;

    cmd_tx
        .send(ServerCommand::Disconnect { client_id: alice.id })
        .await
        .unwrap();

    let left = bob
        .next_matching(|m| matches!(m, ServerMessage::UserLeft { .. }))
        .await;
    assert!(matches!(left, ServerMessage::UserLeft { id, .. } if id == alice.id));

    let typing = bob
        .next_matching(|m| matches!(m, ServerMessage::TypingUsers { .. }))
        .await;
    assert!(matches!(typing, ServerMessage::TypingUsers { users, .. } if users.is_empty()));

    let list = bob
        .next_matching(|m| matches!(m, ServerMessage::UserList { .. }))
        .await;
    match list {
        ServerMessage::UserList { users } => {
            assert_eq!(users.len(), 1);
            assert_eq!(users[0].id, bob.id);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn history_is_paged_per_requester() {
    let cmd_tx = start();
    let mut alice = TestClient::join(&cmd_tx, "A").await;
    for i in 0..5 {
        dispatch(
            &cmd_tx,
            alice.id,
            Event::SendMessage {
                body: format!("m{}", i),
            },
        )
        .await;
    }
    alice.drain().await;

    let mut late = TestClient::connect(&cmd_tx).await;
    dispatch(
        &cmd_tx,
        late.id,
        Event::FetchHistory {
            room: None,
            before: None,
            limit: Some(3),
        },
    )
    .await;

    match late.next().await {
        ServerMessage::History { messages, .. } => {
            let bodies: Vec<&str> = messages.iter().map(|m| m.message.as_str()).collect();
            assert_eq!(bodies, vec!["m2", "m3", "m4"]);
        }
        other => panic!("unexpected {:?}", other),
    }
    alice.assert_silent().await;
}

#[tokio::test]
async fn stalled_client_does_not_block_others() {
    let cmd_tx = start();
    // Joined, but never reads its one-slot buffer
    let _stalled = TestClient::join_with_buffer(&cmd_tx, "S", 1).await;
    let mut bob = TestClient::join(&cmd_tx, "B").await;
    bob.drain().await;

    for i in 0..40 {
        dispatch(
            &cmd_tx,
            bob.id,
            Event::CreateRoom {
                name: RoomName::new(format!("room{}", i)),
            },
        )
        .await;
    }
    dispatch(&cmd_tx, bob.id, Event::JoinRoom { name: "solo".into() }).await;
    dispatch(
        &cmd_tx,
        bob.id,
        Event::SendMessage {
            body: "ping".to_string(),
        },
    )
    .await;

    let msg = bob
        .next_matching(|m| matches!(m, ServerMessage::ReceiveMessage(_)))
        .await;
    match msg {
        ServerMessage::ReceiveMessage(chat) => {
            assert_eq!(chat.message, "ping");
            assert_eq!(chat.room(), Some(&RoomName::from("solo")));
        }
        other => panic!("unexpected {:?}", other),
    }
}
