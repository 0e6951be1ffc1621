//! Connection handler
//!
//! Drives one accepted TCP connection through its lifecycle:
//! `Connecting -> Registered -> Receiving -> Closed`.
//!
//! The reader runs in the connection task. Outbound frames are written
//! by a separate writer task fed from the session's bounded queue, so a
//! stalled client never blocks the registry.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{AnyDelimiterCodec, Framed};
use tracing::{debug, info, warn};

use crate::cipher;
use crate::error::{AppError, DecodeError};
use crate::message::Message;
use crate::server::ServerContext;
use crate::session::Session;

type FrameSink = SplitSink<Framed<TcpStream, AnyDelimiterCodec>, String>;
type FrameStream = SplitStream<Framed<TcpStream, AnyDelimiterCodec>>;

/// Newline framing over raw bytes, bounded to `max_length` per frame
///
/// Frames are not required to be UTF-8, so a garbled line is dropped by
/// the reader instead of ending the stream.
pub fn frame_codec(max_length: usize) -> AnyDelimiterCodec {
    AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), b"\n".to_vec(), max_length)
}

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket accepted, no username yet
    Connecting,
    /// Username accepted, session created
    Registered,
    /// Joined the default room, relaying frames
    Receiving,
    /// Terminal
    Closed,
}

/// Handle a new TCP connection
///
/// Returns once the connection is closed. Errors describe why the
/// connection ended early; they never affect other connections.
pub async fn handle_connection(stream: TcpStream, ctx: Arc<ServerContext>) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let framed = Framed::new(stream, frame_codec(ctx.config.max_frame_length));
    let (sink, mut frames) = framed.split();

    let mut state = ConnectionState::Connecting;
    debug!("{} is {:?}", peer_addr, state);

    // Registration: the first line is the username
    let Some(line) = read_frame(&mut frames, ctx.config.idle_timeout).await? else {
        debug!("{} closed before registering", peer_addr);
        return Ok(());
    };
    let line = frame_text(&line).map_err(|e| AppError::InvalidUsername(e.to_string()))?;
    let username = validate_username(line, ctx.config.max_username_length)?;

    let (session, outbound) = Session::channel(username, ctx.config.outbound_queue);
    state = ConnectionState::Registered;
    debug!("{} is {:?} as {}", peer_addr, state, session.username());

    ctx.registry
        .join(session.clone(), ctx.config.default_room.clone())
        .await?;

    state = ConnectionState::Receiving;
    info!(
        "{} ({}) connected from {}: {:?}",
        session.username(),
        session.id(),
        peer_addr,
        state
    );

    let writer = tokio::spawn(write_loop(sink, outbound, session.clone()));
    let result = receive_loop(&mut frames, &session, &ctx).await;

    // Teardown runs on every exit from the receive loop
    let _ = ctx.registry.leave(session.id()).await;
    session.close();
    let _ = writer.await;

    state = ConnectionState::Closed;
    info!("{} ({}) disconnected: {:?}", session.username(), session.id(), state);

    result
}

/// Read frames until the peer goes away or the session is closed
async fn receive_loop(
    frames: &mut FrameStream,
    session: &Session,
    ctx: &ServerContext,
) -> Result<(), AppError> {
    loop {
        let frame = tokio::select! {
            _ = session.closed() => {
                debug!("Session {} closed by server", session.id());
                return Ok(());
            }
            frame = read_frame(frames, ctx.config.idle_timeout) => frame?,
        };
        let Some(frame) = frame else {
            return Ok(());
        };

        let token = match frame_text(&frame) {
            Ok(token) => token,
            Err(e) => {
                warn!("Dropped frame from {} ({}): {}", session.username(), session.id(), e);
                continue;
            }
        };
        if token.is_empty() {
            continue;
        }

        match decode_message(token, session.username(), ctx) {
            Ok(message) => {
                ctx.registry
                    .broadcast(ctx.config.default_room.clone(), message)
                    .await?;
            }
            Err(e) => {
                warn!("Dropped frame from {} ({}): {}", session.username(), session.id(), e);
            }
        }
    }
}

/// Write queued frames to the socket until the session is closed
async fn write_loop(mut sink: FrameSink, mut outbound: mpsc::Receiver<String>, session: Session) {
    loop {
        let token = tokio::select! {
            _ = session.closed() => break,
            token = outbound.recv() => match token {
                Some(token) => token,
                None => break,
            },
        };

        let sent = tokio::select! {
            _ = session.closed() => break,
            sent = sink.send(token) => sent,
        };
        if let Err(e) = sent {
            debug!("Write to {} failed: {}", session.id(), e);
            break;
        }
    }

    // Wake the reader if the writer ended first
    session.close();
    debug!("Write task ended for {}", session.id());
}

/// Read one frame, honouring the idle timeout
async fn read_frame(
    frames: &mut FrameStream,
    idle_timeout: Option<Duration>,
) -> Result<Option<Bytes>, AppError> {
    let next = match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, frames.next())
            .await
            .map_err(|_| AppError::IdleTimeout)?,
        None => frames.next().await,
    };
    Ok(next.transpose()?)
}

/// View a frame as trimmed text
fn frame_text(frame: &[u8]) -> Result<&str, DecodeError> {
    Ok(std::str::from_utf8(frame)?.trim())
}

/// Trim and check a registration line
fn validate_username(line: &str, max_len: usize) -> Result<String, AppError> {
    let username = line.trim();
    if username.is_empty() {
        return Err(AppError::InvalidUsername("empty".to_string()));
    }
    let len = username.chars().count();
    if len > max_len {
        return Err(AppError::InvalidUsername(format!(
            "{} characters (max {})",
            len, max_len
        )));
    }
    Ok(username.to_string())
}

/// Turn one inbound token into a message from this session
fn decode_message(token: &str, username: &str, ctx: &ServerContext) -> Result<Message, AppError> {
    let content = cipher::decode_text(token, &ctx.key)?;
    let len = content.chars().count();
    if len > ctx.config.max_message_length {
        return Err(AppError::MessageTooLong {
            len,
            max: ctx.config.max_message_length,
        });
    }
    Ok(Message::new(content, username))
}
