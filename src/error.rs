//! Error types for the chat relay
//!
//! Defines connection-level errors, session send errors and cipher
//! decode errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio_util::codec::AnyDelimiterCodecError;

/// Application-level errors
///
/// Transport errors tear down the affected connection only. Protocol
/// errors are either dropped frames or a refused registration.
#[derive(Debug, Error)]
pub enum AppError {
    /// Listener could not be bound (fatal at startup)
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// IO error (fatal for the connection)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error, including oversize frames (fatal for the connection)
    #[error("frame error: {0}")]
    Codec(#[from] AnyDelimiterCodecError),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ciphertext could not be decoded
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Registry actor is gone (fatal - internal channel broken)
    #[error("registry closed")]
    RegistryClosed,

    /// First line was empty or otherwise unusable as a username
    #[error("invalid username: {0}")]
    InvalidUsername(String),

    /// Message content exceeds the configured bound
    #[error("message too long: {len} characters (max {max})")]
    MessageTooLong { len: usize, max: usize },

    /// Room is at its configured capacity
    #[error("room '{0}' is full")]
    RoomFull(String),

    /// No frame arrived within the idle window
    #[error("idle timeout")]
    IdleTimeout,

    /// Configuration value is not usable
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configured key is not usable
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

impl AppError {
    /// Whether this error was caused by the peer violating the protocol
    /// rather than by the transport.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            AppError::Decode(_)
                | AppError::Codec(AnyDelimiterCodecError::MaxChunkLengthExceeded)
                | AppError::InvalidUsername(_)
                | AppError::MessageTooLong { .. }
                | AppError::RoomFull(_)
        )
    }
}

/// Session send errors
///
/// Either way the member is treated as gone.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The session has been closed or its writer has ended
    #[error("session closed")]
    Closed,

    /// The outbound queue is at capacity (slow consumer)
    #[error("outbound queue full")]
    QueueFull,
}

/// Cipher token decode errors
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Token is not valid base64
    #[error("invalid token encoding: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// Frame bytes are not UTF-8 text
    #[error("frame is not valid UTF-8: {0}")]
    Frame(#[from] std::str::Utf8Error),

    /// Decoded plaintext is not UTF-8 text
    #[error("plaintext is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
