//! Server configuration
//!
//! `ServerConfig` is what the library consumes; `Args` is the command
//! line surface of the binary, with environment variable fallbacks.

use std::time::Duration;

use clap::Parser;

use crate::cipher::Key;
use crate::error::AppError;
use crate::types::RoomName;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8765;
pub const DEFAULT_ROOM: &str = "default";
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 8192;
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 1000;
pub const DEFAULT_MAX_USERNAME_LENGTH: usize = 32;
pub const DEFAULT_OUTBOUND_QUEUE: usize = 32;

/// Runtime settings for a `Server`
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen host
    pub host: String,
    /// Listen port (0 picks a free port)
    pub port: u16,
    /// Room every session joins on registration
    pub default_room: RoomName,
    /// Maximum bytes in one line, newline excluded
    pub max_frame_length: usize,
    /// Maximum characters in a message's content
    pub max_message_length: usize,
    /// Maximum characters in a username
    pub max_username_length: usize,
    /// Frames queued per client before it is dropped as too slow
    pub outbound_queue: usize,
    /// Members allowed per room (None = unlimited)
    pub max_room_members: Option<usize>,
    /// Close connections that send nothing for this long (None = never)
    pub idle_timeout: Option<Duration>,
    /// Shared cipher key (None = generate at startup)
    pub key: Option<Key>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            default_room: RoomName::from(DEFAULT_ROOM),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            max_username_length: DEFAULT_MAX_USERNAME_LENGTH,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            max_room_members: None,
            idle_timeout: None,
            key: None,
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "relay_chat", about = "Line-oriented TCP chat relay")]
pub struct Args {
    #[arg(long, env = "CHAT_HOST", default_value = DEFAULT_HOST, help = "Listen host")]
    pub host: String,

    #[arg(long, env = "CHAT_PORT", default_value_t = DEFAULT_PORT, help = "Listen port")]
    pub port: u16,

    #[arg(
        long,
        env = "CHAT_ROOM",
        default_value = DEFAULT_ROOM,
        help = "Room every client joins"
    )]
    pub default_room: String,

    #[arg(
        long,
        env = "CHAT_MAX_FRAME_LENGTH",
        default_value_t = DEFAULT_MAX_FRAME_LENGTH,
        help = "Maximum line length in bytes"
    )]
    pub max_frame_length: usize,

    #[arg(
        long,
        env = "CHAT_MAX_MESSAGE_LENGTH",
        default_value_t = DEFAULT_MAX_MESSAGE_LENGTH,
        help = "Maximum message length in characters"
    )]
    pub max_message_length: usize,

    #[arg(
        long,
        env = "CHAT_MAX_USERNAME_LENGTH",
        default_value_t = DEFAULT_MAX_USERNAME_LENGTH,
        help = "Maximum username length in characters"
    )]
    pub max_username_length: usize,

    #[arg(
        long,
        env = "CHAT_OUTBOUND_QUEUE",
        default_value_t = DEFAULT_OUTBOUND_QUEUE,
        help = "Frames buffered per client before it is disconnected"
    )]
    pub outbound_queue: usize,

    #[arg(long, env = "CHAT_MAX_ROOM_MEMBERS", help = "Members allowed per room")]
    pub max_room_members: Option<usize>,

    #[arg(
        long,
        env = "CHAT_IDLE_TIMEOUT_SECS",
        help = "Disconnect clients idle for this many seconds"
    )]
    pub idle_timeout_secs: Option<u64>,

    #[arg(long, env = "CHAT_KEY", help = "Base64 cipher key (generated if absent)")]
    pub key: Option<String>,

    #[arg(long, help = "Enable debug logging", default_value = "false")]
    pub debug: bool,
}

impl Args {
    /// Validate and convert into a `ServerConfig`
    pub fn into_config(self) -> Result<ServerConfig, AppError> {
        let key = self.key.as_deref().map(Key::from_base64).transpose()?;
        let default_room = self.default_room.trim();
        if default_room.is_empty() {
            return Err(AppError::Config(
                "default room name must not be empty".to_string(),
            ));
        }

        Ok(ServerConfig {
            host: self.host,
            port: self.port,
            default_room: RoomName::from(default_room),
            max_frame_length: self.max_frame_length,
            max_message_length: self.max_message_length,
            max_username_length: self.max_username_length,
            outbound_queue: self.outbound_queue.max(1),
            max_room_members: self.max_room_members.filter(|&n| n > 0),
            idle_timeout: self
                .idle_timeout_secs
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs),
            key,
        })
    }
}
