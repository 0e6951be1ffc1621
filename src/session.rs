//! Session handle
//!
//! Server-side handle for one connected client: its username, a bounded
//! queue feeding the connection's writer task, and a close token shared
//! with the connection's reader and writer.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SendError;
use crate::types::SessionId;

/// Connected client handle
///
/// Cheap to clone; every clone refers to the same connection. Rooms hold
/// clones, the connection task holds the original.
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique identifier for this session
    id: SessionId,
    /// Username bound at registration
    username: String,
    /// Server -> Client frame queue
    outbound: mpsc::Sender<String>,
    /// Cancelled once the session is closed
    closed: CancellationToken,
}

impl Session {
    /// Create a session around an existing outbound queue
    pub fn new(username: impl Into<String>, outbound: mpsc::Sender<String>) -> Self {
        Self {
            id: SessionId::new(),
            username: username.into(),
            outbound,
            closed: CancellationToken::new(),
        }
    }

    /// Create a session together with the receiving end of its queue
    pub fn channel(username: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(username, tx), rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Queue one framed token for this client
    ///
    /// Never waits: a full queue means the client is not keeping up and is
    /// reported as `QueueFull`.
    pub fn send(&self, token: String) -> Result<(), SendError> {
        if self.closed.is_cancelled() {
            return Err(SendError::Closed);
        }
        self.outbound.try_send(token).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Close the session. Both halves of the connection shut down.
    ///
    /// Calling this again is a no-op.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Wait until the session is closed
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_creation() {
        let (session, _rx) = Session::channel("Alice", 4);

        assert_eq!(session.username(), "Alice");
        assert!(!session.is_closed());
        assert_eq!(session.clone().id(), session.id());
    }

    #[tokio::test]
    async fn test_send_delivers_in_order() {
        let (session, mut rx) = Session::channel("Alice", 4);

        session.send("one".to_string()).unwrap();
        session.send("two".to_string()).unwrap();

        assert_eq!(rx.recv().await.as_deref(), Some("one"));
        assert_eq!(rx.recv().await.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_send_reports_full_queue() {
        let (session, _rx) = Session::channel("Slow", 1);

        session.send("one".to_string()).unwrap();
        assert_eq!(session.send("two".to_string()), Err(SendError::QueueFull));
    }

    #[tokio::test]
    async fn test_send_reports_dropped_receiver() {
        let (session, rx) = Session::channel("Gone", 4);
        drop(rx);

        assert_eq!(session.send("hi".to_string()), Err(SendError::Closed));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (session, _rx) = Session::channel("Alice", 4);
        let other = session.clone();

        session.close();
        session.close();

        assert!(other.is_closed());
        other.closed().await;
        assert_eq!(other.send("late".to_string()), Err(SendError::Closed));
    }
}
