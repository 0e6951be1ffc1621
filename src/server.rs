//! Chat relay server
//!
//! Owns the listening socket and the shared `ServerContext`, and spawns
//! one handler task per accepted connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::cipher::{generate_key, Key};
use crate::config::ServerConfig;
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::registry::{RegistryHandle, RoomRegistry};

/// State shared by every connection of one server instance
#[derive(Debug)]
pub struct ServerContext {
    /// Settings the server was started with
    pub config: ServerConfig,
    /// Process-wide cipher key, read-only
    pub key: Key,
    /// Handle to the room registry actor
    pub registry: RegistryHandle,
}

/// A bound, not yet running, chat server
pub struct Server {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
}

impl Server {
    /// Bind the listener and start the room registry
    ///
    /// Uses the configured key, or generates a fresh one.
    pub async fn bind(config: ServerConfig) -> Result<Self, AppError> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| AppError::Bind { addr, source })?;

        let key = config.key.clone().unwrap_or_else(generate_key);
        let registry = RoomRegistry::spawn(key.clone(), config.max_room_members);

        Ok(Self {
            listener,
            ctx: Arc::new(ServerContext {
                config,
                key,
                registry,
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn key(&self) -> &Key {
        &self.ctx.key
    }

    pub fn registry(&self) -> RegistryHandle {
        self.ctx.registry.clone()
    }

    /// Run the accept loop forever
    pub async fn run(self) {
        info!(
            "Chat server accepting connections, default room '{}'",
            self.ctx.config.default_room
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let ctx = self.ctx.clone();

                    // Spawn handler task for each connection
                    tokio::spawn(async move {
                        match handle_connection(stream, ctx).await {
                            Ok(()) => {}
                            Err(e) if e.is_protocol() => {
                                warn!("Connection from {} dropped: {}", addr, e);
                            }
                            Err(e) => {
                                error!("Connection from {} failed: {}", addr, e);
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
