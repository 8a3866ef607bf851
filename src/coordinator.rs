//! Session coordinator
//!
//! Owns every piece of shared relay state and applies one inbound event at a
//! time. Each event is validated, applied, and turned into a list of
//! deliveries whose recipients are resolved at the moment they are built.
//! Nothing here awaits: the `ChatServer` actor calls `handle` and performs
//! the actual sends afterwards.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::EventError;
use crate::history::MessageStore;
use crate::message::{ChatMessage, Destination, FileRef, ServerMessage, UserInfo};
use crate::reactions::ReactionTracker;
use crate::receipts::ReadReceipts;
use crate::registry::ConnectionRegistry;
use crate::room::RoomDirectory;
use crate::typing::TypingTracker;
use crate::types::{ClientId, MessageId, RoomName};

/// Page size used when a history query gives no limit
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Inbound protocol event, already attributed to a connection
#[derive(Debug, Clone)]
pub enum Event {
    Join {
        username: String,
    },
    CreateRoom {
        name: RoomName,
    },
    JoinRoom {
        name: RoomName,
    },
    SendMessage {
        body: String,
    },
    SendPrivate {
        to: ClientId,
        body: String,
    },
    SetTyping {
        is_typing: bool,
    },
    MarkRead {
        message_id: Option<MessageId>,
        room: Option<RoomName>,
        is_private: bool,
        other_id: Option<ClientId>,
    },
    AddReaction {
        message_id: Option<MessageId>,
        emoji: String,
        room: Option<RoomName>,
        is_private: bool,
        other_id: Option<ClientId>,
    },
    /// A file has already been written to the blob store
    UploadComplete {
        file: FileRef,
        room: Option<RoomName>,
        to: Option<ClientId>,
        is_private: bool,
    },
    FetchHistory {
        room: Option<RoomName>,
        before: Option<DateTime<Utc>>,
        limit: Option<usize>,
    },
    Disconnect,
}

/// Fan-out addressing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Current members of a room
    Room(RoomName),
    /// The two peers of a direct exchange; the sender is always included
    Private { from: ClientId, to: ClientId },
    /// Every joined connection
    Global,
    /// A single connection
    Client(ClientId),
}

/// One outbound message and the connections it goes to
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub recipients: Vec<ClientId>,
    pub message: ServerMessage,
}

/// What happens to read receipts and reactions when their message falls out
/// of the history buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrackerRetention {
    /// Keep them for the process lifetime
    #[default]
    Retain,
    /// Forget them together with the evicted message
    EvictWithHistory,
}

/// The single owner of all relay state
#[derive(Debug)]
pub struct Coordinator {
    registry: ConnectionRegistry,
    rooms: RoomDirectory,
    history: MessageStore,
    typing: TypingTracker,
    receipts: ReadReceipts,
    reactions: ReactionTracker,
    last_message_id: u64,
    retention: TrackerRetention,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        Self::with_retention(TrackerRetention::default())
    }

    pub fn with_retention(retention: TrackerRetention) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            rooms: RoomDirectory::with_default_room(),
            history: MessageStore::new(),
            typing: TypingTracker::new(),
            receipts: ReadReceipts::new(),
            reactions: ReactionTracker::new(),
            last_message_id: 0,
            retention,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomDirectory {
        &self.rooms
    }

    pub fn history(&self) -> &MessageStore {
        &self.history
    }

    pub fn typing(&self) -> &TypingTracker {
        &self.typing
    }

    pub fn receipts(&self) -> &ReadReceipts {
        &self.receipts
    }

    pub fn reactions(&self) -> &ReactionTracker {
        &self.reactions
    }

    /// Apply an event, dropping it (with a log line) if it is invalid
    pub fn handle(&mut self, client_id: ClientId, event: Event) -> Vec<Delivery> {
        match self.try_handle(client_id, event) {
            Ok(deliveries) => deliveries,
            Err(err @ EventError::Registry(_)) => {
                warn!("Dropped event from {}: {}", client_id, err);
                Vec::new()
            }
            Err(err) => {
                debug!("Dropped event from {}: {}", client_id, err);
                Vec::new()
            }
        }
    }

    /// Apply an event
    ///
    /// On error nothing has been mutated and nothing is delivered.
    pub fn try_handle(
        &mut self,
        client_id: ClientId,
        event: Event,
    ) -> Result<Vec<Delivery>, EventError> {
        let mut out = Vec::new();
        match event {
            Event::Join { username } => self.on_join(client_id, username, &mut out)?,
            Event::CreateRoom { name } => self.on_create_room(name, &mut out)?,
            Event::JoinRoom { name } => self.on_join_room(client_id, name, &mut out)?,
            Event::SendMessage { body } => self.on_send_message(client_id, body, &mut out)?,
            Event::SendPrivate { to, body } => {
                self.on_send_private(client_id, to, body, &mut out)?
            }
            Event::SetTyping { is_typing } => {
                self.on_set_typing(client_id, is_typing, &mut out)?
            }
            Event::MarkRead {
                message_id,
                room,
                is_private,
                other_id,
            } => {
                let target = Self::receipt_target(client_id, room, is_private, other_id);
                self.on_mark_read(client_id, message_id, target, &mut out)?;
            }
            Event::AddReaction {
                message_id,
                emoji,
                room,
                is_private,
                other_id,
            } => {
                let target = Self::receipt_target(client_id, room, is_private, other_id);
                self.on_add_reaction(client_id, message_id, emoji, target, &mut out)?;
            }
            Event::UploadComplete {
                file,
                room,
                to,
                is_private,
            } => self.on_upload_complete(client_id, file, room, to, is_private, &mut out)?,
            Event::FetchHistory {
                room,
                before,
                limit,
            } => self.on_fetch_history(client_id, room, before, limit, &mut out),
            Event::Disconnect => self.on_disconnect(client_id, &mut out),
        }
        Ok(out)
    }

    fn on_join(
        &mut self,
        client_id: ClientId,
        username: String,
        out: &mut Vec<Delivery>,
    ) -> Result<(), EventError> {
        let username = username.trim().to_string();
        if username.is_empty() {
            return Err(EventError::Validation("username is required"));
        }

        let default_room = RoomName::default_room();
        self.registry
            .register(client_id, username.clone(), default_room.clone())?;
        self.rooms.ensure_room(default_room.clone());
        self.rooms.join(&mut self.registry, client_id, default_room)?;

        info!("Client {} joined as '{}'", client_id, username);

        self.emit(Target::Global, self.user_list(), out);
        self.emit(
            Target::Global,
            ServerMessage::UserJoined {
                username,
                id: client_id,
            },
            out,
        );
        self.emit(Target::Global, self.room_list(), out);
        Ok(())
    }

    fn on_create_room(
        &mut self,
        name: RoomName,
        out: &mut Vec<Delivery>,
    ) -> Result<(), EventError> {
        if name.is_empty() {
            return Err(EventError::Validation("room name is required"));
        }

        if self.rooms.ensure_room(name.clone()) {
            info!("Room {} created", name);
            self.emit(Target::Global, self.room_list(), out);
        } else {
            debug!("Room {} already exists", name);
        }
        Ok(())
    }

    fn on_join_room(
        &mut self,
        client_id: ClientId,
        name: RoomName,
        out: &mut Vec<Delivery>,
    ) -> Result<(), EventError> {
        if name.is_empty() {
            return Err(EventError::Validation("room name is required"));
        }
        let previous = self
            .registry
            .lookup(client_id)
            .map(|user| user.current_room.clone())
            .ok_or(EventError::NotJoined(client_id))?;

        self.rooms.join(&mut self.registry, client_id, name.clone())?;
        info!("Client {} moved from {} to {}", client_id, previous, name);

        // A typing entry left in the old room would never be cleared.
        if previous != name && self.typing.clear(&previous, client_id) {
            self.emit(Target::Room(previous.clone()), self.typing_users(&previous), out);
        }

        self.emit(Target::Global, self.user_list(), out);
        self.emit(Target::Global, self.room_list(), out);
        Ok(())
    }

    fn on_send_message(
        &mut self,
        client_id: ClientId,
        body: String,
        out: &mut Vec<Delivery>,
    ) -> Result<(), EventError> {
        let user = self
            .registry
            .lookup(client_id)
            .ok_or(EventError::NotJoined(client_id))?;
        let room = user.current_room.clone();
        let sender = user.username.clone();

        let message =
            self.build_message(client_id, sender, body, None, Destination::Room(room.clone()));
        self.store(&room, message.clone());

        debug!("Client {} sent message {} to {}", client_id, message.id, room);
        self.emit(Target::Room(room), ServerMessage::ReceiveMessage(message), out);
        Ok(())
    }

    fn on_send_private(
        &mut self,
        client_id: ClientId,
        to: ClientId,
        body: String,
        out: &mut Vec<Delivery>,
    ) -> Result<(), EventError> {
        let sender = self
            .registry
            .lookup(client_id)
            .ok_or(EventError::NotJoined(client_id))?
            .username
            .clone();
        let receiver = self
            .registry
            .lookup(to)
            .ok_or(EventError::UnknownTarget(to))?
            .username
            .clone();

        let message = self.build_message(
            client_id,
            sender,
            body,
            None,
            Destination::Private {
                receiver,
                receiver_id: to,
            },
        );

        debug!("Client {} sent private message {} to {}", client_id, message.id, to);
        self.emit(
            Target::Private {
                from: client_id,
                to,
            },
            ServerMessage::PrivateMessage(message),
            out,
        );
        Ok(())
    }

    fn on_set_typing(
        &mut self,
        client_id: ClientId,
        is_typing: bool,
        out: &mut Vec<Delivery>,
    ) -> Result<(), EventError> {
        let user = self
            .registry
            .lookup(client_id)
            .ok_or(EventError::NotJoined(client_id))?;
        let room = user.current_room.clone();
        let username = user.username.clone();

        self.typing.set_typing(&room, client_id, &username, is_typing);
        self.emit(Target::Room(room.clone()), self.typing_users(&room), out);
        Ok(())
    }

    fn on_mark_read(
        &mut self,
        client_id: ClientId,
        message_id: Option<MessageId>,
        target: Option<Target>,
        out: &mut Vec<Delivery>,
    ) -> Result<(), EventError> {
        let message_id = Self::require_message_id(message_id)?;

        self.receipts.mark_read(message_id, client_id);

        if let Some(target) = target {
            self.emit(
                target,
                ServerMessage::MessageReadUpdate {
                    message_id,
                    user_id: client_id,
                },
                out,
            );
        }
        Ok(())
    }

    fn on_add_reaction(
        &mut self,
        client_id: ClientId,
        message_id: Option<MessageId>,
        emoji: String,
        target: Option<Target>,
        out: &mut Vec<Delivery>,
    ) -> Result<(), EventError> {
        let message_id = Self::require_message_id(message_id)?;
        let emoji = emoji.trim().to_string();
        if emoji.is_empty() {
            return Err(EventError::Validation("emoji is required"));
        }

        self.reactions.react(message_id, &emoji, client_id);

        if let Some(target) = target {
            let reactions = self.reactions.reactions_of(message_id);
            self.emit(
                target,
                ServerMessage::ReactionUpdate {
                    message_id,
                    emoji,
                    user_id: client_id,
                    reactions,
                },
                out,
            );
        }
        Ok(())
    }

    fn on_upload_complete(
        &mut self,
        client_id: ClientId,
        file: FileRef,
        room: Option<RoomName>,
        to: Option<ClientId>,
        is_private: bool,
        out: &mut Vec<Delivery>,
    ) -> Result<(), EventError> {
        let (sender, destination) =
            self.upload_destination(client_id, room.as_ref(), to, is_private)?;
        let message = self.build_message(client_id, sender, String::new(), Some(file), destination);

        match &message.destination {
            Destination::Private { receiver_id, .. } => {
                let to = *receiver_id;
                debug!("Client {} sent private file {} to {}", client_id, message.id, to);
                self.emit(
                    Target::Private {
                        from: client_id,
                        to,
                    },
                    ServerMessage::PrivateMessage(message),
                    out,
                );
            }
            Destination::Room(room) => {
                let room = room.clone();
                self.store(&room, message.clone());
                debug!("Client {} sent file {} to {}", client_id, message.id, room);
                self.emit(Target::Room(room), ServerMessage::ReceiveMessage(message), out);
            }
        }
        Ok(())
    }

    /// Check that an upload would be accepted, before anything is written
    ///
    /// The same rules are applied again when `UploadComplete` arrives.
    pub fn check_upload(
        &self,
        client_id: ClientId,
        room: Option<&RoomName>,
        to: Option<ClientId>,
        is_private: bool,
    ) -> Result<(), EventError> {
        self.upload_destination(client_id, room, to, is_private)
            .map(|_| ())
    }

    /// Sender name and destination of a file message
    fn upload_destination(
        &self,
        client_id: ClientId,
        room: Option<&RoomName>,
        to: Option<ClientId>,
        is_private: bool,
    ) -> Result<(String, Destination), EventError> {
        let sender = self
            .registry
            .lookup(client_id)
            .ok_or(EventError::NotJoined(client_id))?
            .username
            .clone();

        match (is_private, to, room) {
            (true, Some(to), _) => {
                let receiver = self
                    .registry
                    .lookup(to)
                    .ok_or(EventError::UnknownTarget(to))?
                    .username
                    .clone();
                Ok((
                    sender,
                    Destination::Private {
                        receiver,
                        receiver_id: to,
                    },
                ))
            }
            (_, _, Some(room)) => {
                if !self.rooms.contains_room(room) {
                    return Err(EventError::UnknownRoom(room.clone()));
                }
                Ok((sender, Destination::Room(room.clone())))
            }
            _ => Err(EventError::Validation("upload needs a room or a recipient")),
        }
    }

    fn on_fetch_history(
        &mut self,
        client_id: ClientId,
        room: Option<RoomName>,
        before: Option<DateTime<Utc>>,
        limit: Option<usize>,
        out: &mut Vec<Delivery>,
    ) {
        let room = room
            .filter(|room| !room.is_empty())
            .unwrap_or_else(RoomName::default_room);
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .min(self.history.capacity());

        let messages = self.history.query(&room, before, limit);
        debug!(
            "Client {} fetched {} messages from {}",
            client_id,
            messages.len(),
            room
        );
        self.emit(
            Target::Client(client_id),
            ServerMessage::History { room, messages },
            out,
        );
    }

    fn on_disconnect(&mut self, client_id: ClientId, out: &mut Vec<Delivery>) {
        let left_room = self.rooms.leave(client_id);
        let user = self.registry.unregister(client_id);

        if let Some(user) = user {
            info!("Client {} ('{}') left", client_id, user.username);
            self.emit(
                Target::Global,
                ServerMessage::UserLeft {
                    username: user.username,
                    id: client_id,
                },
                out,
            );
        }

        if let Some(room) = left_room {
            if self.typing.clear(&room, client_id) {
                self.emit(Target::Room(room.clone()), self.typing_users(&room), out);
            }
        }

        self.emit(Target::Global, self.user_list(), out);
        self.emit(Target::Global, self.room_list(), out);

        debug!(
            "Total users: {}, Total rooms: {}, Messages with receipts: {}",
            self.registry.len(),
            self.rooms.room_count(),
            self.receipts.tracked()
        );
    }

    /// Fan-out target for read receipts and reactions
    ///
    /// Private exchanges go to the other peer plus an echo; otherwise the
    /// named room. With neither, the update is recorded but not broadcast.
    fn receipt_target(
        client_id: ClientId,
        room: Option<RoomName>,
        is_private: bool,
        other_id: Option<ClientId>,
    ) -> Option<Target> {
        match (is_private, other_id, room) {
            (true, Some(to), _) => Some(Target::Private {
                from: client_id,
                to,
            }),
            (_, _, Some(room)) if !room.is_empty() => Some(Target::Room(room)),
            _ => None,
        }
    }

    fn require_message_id(message_id: Option<MessageId>) -> Result<MessageId, EventError> {
        match message_id {
            Some(id) if id.0 != 0 => Ok(id),
            _ => Err(EventError::Validation("message_id is required")),
        }
    }

    fn build_message(
        &mut self,
        sender_id: ClientId,
        sender: String,
        body: String,
        file: Option<FileRef>,
        destination: Destination,
    ) -> ChatMessage {
        self.last_message_id += 1;
        ChatMessage {
            id: MessageId(self.last_message_id),
            sender,
            sender_id,
            message: body,
            file,
            timestamp: Utc::now(),
            destination,
        }
    }

    fn store(&mut self, room: &RoomName, message: ChatMessage) {
        let Some(evicted) = self.history.append(room, message) else {
            return;
        };
        if self.retention == TrackerRetention::EvictWithHistory {
            self.receipts.forget(evicted.id);
            self.reactions.forget(evicted.id);
            debug!("Evicted message {} and its trackers from {}", evicted.id, room);
        }
    }

    fn user_list(&self) -> ServerMessage {
        ServerMessage::UserList {
            users: self
                .registry
                .users()
                .map(|user| UserInfo {
                    id: user.id,
                    username: user.username.clone(),
                    room: user.current_room.clone(),
                })
                .collect(),
        }
    }

    fn room_list(&self) -> ServerMessage {
        ServerMessage::RoomList {
            rooms: self.rooms.list_rooms(),
        }
    }

    fn typing_users(&self, room: &RoomName) -> ServerMessage {
        ServerMessage::TypingUsers {
            room: room.clone(),
            users: self.typing.snapshot(room),
        }
    }

    /// Resolve `target` against current state and queue the message
    fn emit(&self, target: Target, message: ServerMessage, out: &mut Vec<Delivery>) {
        let recipients = self.recipients(&target);
        if recipients.is_empty() {
            return;
        }
        out.push(Delivery {
            recipients,
            message,
        });
    }

    /// Connections a target reaches right now
    pub fn recipients(&self, target: &Target) -> Vec<ClientId> {
        match target {
            Target::Room(name) => {
                let mut members: Vec<ClientId> =
                    self.rooms.members_of(name).into_iter().collect();
                members.sort();
                members
            }
            Target::Private { from, to } if from == to => vec![*from],
            Target::Private { from, to } => vec![*to, *from],
            Target::Global => self.registry.ids(),
            Target::Client(id) => vec![*id],
        }
    }
}
