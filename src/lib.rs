//! Line-Oriented TCP Chat Relay Library
//!
//! A small real-time chat server: clients connect over TCP, register a
//! username, and every message they send is relayed to all members of
//! their room, the sender included. Payloads travel as single-line
//! tokens produced by a shared-key transport cipher.
//!
//! # Wire protocol
//! - The first line a client sends is its username.
//! - Every following line is one cipher token holding message text.
//! - The server sends one token per relayed message, holding a JSON
//!   object with `content`, `sender` and `timestamp`.
//!
//! # Architecture
//! - `RoomRegistry` is an actor owning every room; connection tasks talk
//!   to it through a `RegistryHandle`, so no locks are needed
//! - Each connection has a reader task and a writer task; the writer is
//!   fed from a bounded per-session queue and slow clients are dropped
//! - `Server` owns the listener and a `ServerContext` (config, key,
//!   registry handle), so independent servers can coexist in one process
//!
//! # Example
//! ```ignore
//! use relay_chat::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = Server::bind(ServerConfig::default()).await.unwrap();
//!     println!("key: {}", server.key().to_base64());
//!     server.run().await;
//! }
//! ```

pub mod cipher;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod room;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use cipher::{decode, encode, generate_key, Key};
pub use client::ChatClient;
pub use config::{Args, ServerConfig};
pub use error::{AppError, DecodeError, SendError};
pub use handler::{handle_connection, ConnectionState};
pub use message::Message;
pub use registry::{RegistryCommand, RegistryHandle, RoomRegistry};
pub use room::Room;
pub use server::{Server, ServerContext};
pub use session::Session;
pub use types::{RoomName, SessionId};
