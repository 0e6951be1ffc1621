//! Chat message value object
//!
//! A `Message` is built once per accepted frame and never mutated. Its
//! wire form is a JSON object which the room encrypts for delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// One chat message as relayed to room members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    content: String,
    sender: String,
    timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(content: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            sender: sender.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Creation time; for display ordering only
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Serialize to the plaintext carried inside a frame
    pub fn to_wire(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the plaintext of a frame received from the server
    pub fn from_wire(text: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.sender,
            self.content
        )
    }
}
