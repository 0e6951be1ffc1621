//! Room struct definition
//!
//! A named broadcast domain holding the sessions that joined it.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::cipher::{self, Key};
use crate::error::AppError;
use crate::message::Message;
use crate::session::Session;
use crate::types::{RoomName, SessionId};

/// Chat room
///
/// Members are keyed by session ID. An optional capacity bounds the
/// member count.
#[derive(Debug)]
pub struct Room {
    /// Room name for identification
    pub name: RoomName,
    /// Joined sessions
    members: HashMap<SessionId, Session>,
    /// Maximum number of members (None = unlimited)
    capacity: Option<usize>,
}

impl Room {
    /// Create an empty room
    pub fn new(name: RoomName, capacity: Option<usize>) -> Self {
        Self {
            name,
            members: HashMap::new(),
            capacity,
        }
    }

    /// Add a member
    ///
    /// Returns false if the session was already a member. Fails with
    /// `RoomFull` when the room is at capacity.
    pub fn add_member(&mut self, session: Session) -> Result<bool, AppError> {
        if self.members.contains_key(&session.id()) {
            return Ok(false);
        }
        if self.is_full() {
            return Err(AppError::RoomFull(self.name.to_string()));
        }
        self.members.insert(session.id(), session);
        Ok(true)
    }

    /// Remove a member. Removing an absent session is a no-op.
    pub fn remove_member(&mut self, session_id: SessionId) -> Option<Session> {
        self.members.remove(&session_id)
    }

    /// Check if a session is in this room
    pub fn contains(&self, session_id: SessionId) -> bool {
        self.members.contains_key(&session_id)
    }

    pub fn is_full(&self) -> bool {
        self.capacity.is_some_and(|cap| self.members.len() >= cap)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Usernames of the current members, sorted
    pub fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .members
            .values()
            .map(|s| s.username().to_string())
            .collect();
        names.sort();
        names
    }

    /// Deliver a message to every member, the sender included
    ///
    /// The message is encoded once. Members whose send fails are removed
    /// from this room and returned so the caller can finish tearing them
    /// down; they never stop delivery to the others.
    pub fn broadcast(&mut self, message: &Message, key: &Key) -> Result<Vec<Session>, AppError> {
        let token = cipher::encode(message.to_wire()?.as_bytes(), key);

        let failed: Vec<SessionId> = self
            .members
            .values()
            .filter_map(|member| match member.send(token.clone()) {
                Ok(()) => None,
                Err(e) => {
                    warn!(
                        "Dropping {} ({}) from room {}: {}",
                        member.username(),
                        member.id(),
                        self.name,
                        e
                    );
                    Some(member.id())
                }
            })
            .collect();

        debug!(
            "Broadcast from {} in room {} reached {} of {} members",
            message.sender(),
            self.name,
            self.members.len() - failed.len(),
            self.members.len()
        );

        Ok(failed
            .into_iter()
            .filter_map(|id| self.members.remove(&id))
            .collect())
    }
}
