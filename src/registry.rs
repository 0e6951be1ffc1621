//! RoomRegistry actor implementation
//!
//! The single owner of every room and of the session-to-rooms mapping.
//! Connection tasks talk to it through a `RegistryHandle`; no locks are
//! needed because all membership changes go through message passing.

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::cipher::Key;
use crate::error::AppError;
use crate::message::Message;
use crate::room::Room;
use crate::session::Session;
use crate::types::{RoomName, SessionId};

/// Channel buffer size for registry commands
const COMMAND_BUFFER_SIZE: usize = 256;

/// Commands sent from connection tasks to the registry actor
#[derive(Debug)]
pub enum RegistryCommand {
    /// Add a session to a room, creating the room if needed
    Join {
        session: Session,
        room: RoomName,
        reply: oneshot::Sender<Result<(), AppError>>,
    },
    /// Remove a session from every room it joined
    Leave {
        session_id: SessionId,
    },
    /// Deliver a message to every member of a room
    Broadcast {
        room: RoomName,
        message: Message,
    },
    /// List the usernames currently in a room
    Members {
        room: RoomName,
        reply: oneshot::Sender<Vec<String>>,
    },
}

/// The room registry actor
///
/// Rooms are created lazily on first join and kept for the lifetime of
/// the actor.
pub struct RoomRegistry {
    /// All rooms: RoomName -> Room
    rooms: HashMap<RoomName, Room>,
    /// Session to joined rooms mapping: SessionId -> RoomNames
    session_rooms: HashMap<SessionId, HashSet<RoomName>>,
    /// Process-wide cipher key used for every broadcast
    key: Key,
    /// Capacity applied to newly created rooms
    room_capacity: Option<usize>,
    /// Command receiver channel
    receiver: mpsc::Receiver<RegistryCommand>,
}

impl RoomRegistry {
    /// Create a registry with the given command receiver
    pub fn new(
        key: Key,
        room_capacity: Option<usize>,
        receiver: mpsc::Receiver<RegistryCommand>,
    ) -> Self {
        Self {
            rooms: HashMap::new(),
            session_rooms: HashMap::new(),
            key,
            room_capacity,
            receiver,
        }
    }

    /// Start a registry task and return a handle to it
    pub fn spawn(key: Key, room_capacity: Option<usize>) -> RegistryHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER_SIZE);
        tokio::spawn(Self::new(key, room_capacity, rx).run());
        RegistryHandle { sender: tx }
    }

    /// Run the registry event loop
    ///
    /// Continuously receives and processes commands until all handles are dropped.
    pub async fn run(mut self) {
        info!("RoomRegistry started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("RoomRegistry shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Join {
                session,
                room,
                reply,
            } => {
                let result = self.handle_join(session, room);
                let _ = reply.send(result);
            }
            RegistryCommand::Leave { session_id } => {
                self.handle_leave(session_id);
            }
            RegistryCommand::Broadcast { room, message } => {
                self.handle_broadcast(room, message);
            }
            RegistryCommand::Members { room, reply } => {
                let names = self
                    .rooms
                    .get(&room)
                    .map(Room::usernames)
                    .unwrap_or_default();
                let _ = reply.send(names);
            }
        }
    }

    /// Handle a session joining a room
    fn handle_join(&mut self, session: Session, room_name: RoomName) -> Result<(), AppError> {
        let capacity = self.room_capacity;
        let room = self.rooms.entry(room_name.clone()).or_insert_with(|| {
            debug!("Room {} created", room_name);
            Room::new(room_name.clone(), capacity)
        });

        let session_id = session.id();
        let username = session.username().to_string();
        if room.add_member(session)? {
            info!("{} ({}) joined room {}", username, session_id, room_name);
        }
        self.session_rooms
            .entry(session_id)
            .or_default()
            .insert(room_name);

        debug!(
            "Total sessions: {}, Total rooms: {}",
            self.session_rooms.len(),
            self.rooms.len()
        );
        Ok(())
    }

    /// Handle a session leaving. Unknown sessions are ignored.
    fn handle_leave(&mut self, session_id: SessionId) {
        let Some(room_names) = self.session_rooms.remove(&session_id) else {
            return;
        };

        for room_name in room_names {
            if let Some(room) = self.rooms.get_mut(&room_name) {
                if let Some(session) = room.remove_member(session_id) {
                    info!(
                        "{} ({}) left room {}",
                        session.username(),
                        session_id,
                        room_name
                    );
                }
            }
        }
    }

    /// Handle a broadcast, tearing down members that could not keep up
    fn handle_broadcast(&mut self, room_name: RoomName, message: Message) {
        let Some(room) = self.rooms.get_mut(&room_name) else {
            debug!("Broadcast to unknown room {} dropped", room_name);
            return;
        };

        let dropped = match room.broadcast(&message, &self.key) {
            Ok(dropped) => dropped,
            Err(e) => {
                warn!("Failed to broadcast in room {}: {}", room_name, e);
                return;
            }
        };

        for session in dropped {
            self.handle_leave(session.id());
            session.close();
        }
    }
}

/// Cloneable handle for talking to a running `RoomRegistry`
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Join a room; fails when the room is full or the registry is gone
    pub async fn join(&self, session: Session, room: RoomName) -> Result<(), AppError> {
        let (reply, response) = oneshot::channel();
        self.send(RegistryCommand::Join {
            session,
            room,
            reply,
        })
        .await?;
        response.await.map_err(|_| AppError::RegistryClosed)?
    }

    /// Leave every joined room
    pub async fn leave(&self, session_id: SessionId) -> Result<(), AppError> {
        self.send(RegistryCommand::Leave { session_id }).await
    }

    /// Queue a broadcast. Broadcasts from one task are delivered in order.
    pub async fn broadcast(&self, room: RoomName, message: Message) -> Result<(), AppError> {
        self.send(RegistryCommand::Broadcast { room, message }).await
    }

    /// Usernames of the current members of a room (empty if unknown)
    pub async fn members(&self, room: RoomName) -> Result<Vec<String>, AppError> {
        let (reply, response) = oneshot::channel();
        self.send(RegistryCommand::Members { room, reply }).await?;
        response.await.map_err(|_| AppError::RegistryClosed)
    }

    async fn send(&self, cmd: RegistryCommand) -> Result<(), AppError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| AppError::RegistryClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{decode_text, generate_key};

    async fn next_message(rx: &mut mpsc::Receiver<String>, key: &Key) -> Message {
        let token = rx.recv().await.expect("expected a frame");
        Message::from_wire(&decode_text(&token, key).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_join_creates_room_lazily() {
        let registry = RoomRegistry::spawn(generate_key(), None);
        let lobby = RoomName::from("lobby");

        assert!(registry.members(lobby.clone()).await.unwrap().is_empty());

        let (alice, _rx) = Session::channel("alice", 4);
        registry.join(alice, lobby.clone()).await.unwrap();

        assert_eq!(registry.members(lobby).await.unwrap(), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_disjoint_rooms_are_isolated() {
        let key = generate_key();
        let registry = RoomRegistry::spawn(key.clone(), None);
        let r1 = RoomName::from("r1");
        let r2 = RoomName::from("r2");

        let (a, mut ra) = Session::channel("a", 8);
        let (b, mut rb) = Session::channel("b", 8);
        let (c, mut rc) = Session::channel("c", 8);
        registry.join(a, r1.clone()).await.unwrap();
        registry.join(b, r1.clone()).await.unwrap();
        registry.join(c, r2.clone()).await.unwrap();

        registry.broadcast(r1.clone(), Message::new("in r1", "a")).await.unwrap();
        registry.broadcast(r2.clone(), Message::new("in r2", "c")).await.unwrap();
        // Round-trip through the actor so both broadcasts have been handled
        registry.members(r1).await.unwrap();

        assert_eq!(next_message(&mut ra, &key).await.content(), "in r1");
        assert_eq!(next_message(&mut rb, &key).await.content(), "in r1");
        assert_eq!(next_message(&mut rc, &key).await.content(), "in r2");
        assert!(ra.try_recv().is_err());
        assert!(rb.try_recv().is_err());
        assert!(rc.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_leave_removes_from_all_rooms() {
        let registry = RoomRegistry::spawn(generate_key(), None);
        let (alice, _rx) = Session::channel("alice", 4);
        let id = alice.id();

        registry.join(alice.clone(), RoomName::from("r1")).await.unwrap();
        registry.join(alice, RoomName::from("r2")).await.unwrap();
        registry.leave(id).await.unwrap();
        // Leaving twice is harmless
        registry.leave(id).await.unwrap();

        assert!(registry.members(RoomName::from("r1")).await.unwrap().is_empty());
        assert!(registry.members(RoomName::from("r2")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_room_rejects_join() {
        let registry = RoomRegistry::spawn(generate_key(), Some(1));
        let room = RoomName::from("solo");
        let (a, _ra) = Session::channel("a", 4);
        let (b, _rb) = Session::channel("b", 4);

        registry.join(a, room.clone()).await.unwrap();
        let err = registry.join(b, room.clone()).await.unwrap_err();

        assert!(matches!(err, AppError::RoomFull(_)));
        assert_eq!(registry.members(room).await.unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_slow_member_is_closed_and_removed_everywhere() {
        let key = generate_key();
        let registry = RoomRegistry::spawn(key.clone(), None);
        let r1 = RoomName::from("r1");
        let r2 = RoomName::from("r2");

        let (fast, mut fast_rx) = Session::channel("fast", 8);
        let (slow, _slow_rx) = Session::channel("slow", 1);
        registry.join(fast, r1.clone()).await.unwrap();
        registry.join(slow.clone(), r1.clone()).await.unwrap();
        registry.join(slow.clone(), r2.clone()).await.unwrap();

        registry.broadcast(r1.clone(), Message::new("1", "fast")).await.unwrap();
        registry.broadcast(r1.clone(), Message::new("2", "fast")).await.unwrap();

        assert_eq!(registry.members(r1).await.unwrap(), vec!["fast"]);
        assert!(registry.members(r2).await.unwrap().is_empty());
        assert!(slow.is_closed());
        assert_eq!(next_message(&mut fast_rx, &key).await.content(), "1");
        assert_eq!(next_message(&mut fast_rx, &key).await.content(), "2");
    }

    #[tokio::test]
    async fn test_per_sender_order_is_preserved() {
        let key = generate_key();
        let registry = RoomRegistry::spawn(key.clone(), None);
        let room = RoomName::from("default");

        let (sender, _rs) = Session::channel("sender", 128);
        let (b, mut rb) = Session::channel("b", 128);
        let (c, mut rc) = Session::channel("c", 128);
        for s in [sender, b, c] {
            registry.join(s, room.clone()).await.unwrap();
        }

        for i in 0..100 {
            registry
                .broadcast(room.clone(), Message::new(i.to_string(), "sender"))
                .await
                .unwrap();
        }

        for rx in [&mut rb, &mut rc] {
            for i in 0..100 {
                assert_eq!(next_message(rx, &key).await.content(), i.to_string());
            }
        }
    }

    #[tokio::test]
    async fn test_broadcast_to_unknown_room_is_ignored() {
        let registry = RoomRegistry::spawn(generate_key(), None);
        registry
            .broadcast(RoomName::from("nowhere"), Message::new("hi", "a"))
            .await
            .unwrap();
        assert!(registry.members(RoomName::from("nowhere")).await.unwrap().is_empty());
    }
}
