//! Line-protocol chat client
//!
//! Connects to a relay, registers a username and exchanges encrypted
//! frames. Used by the end-to-end tests and handy for scripting.

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{AnyDelimiterCodec, Framed};
use tracing::debug;

use crate::cipher::{self, Key};
use crate::error::{AppError, DecodeError};
use crate::message::Message;

/// A connected, registered client
pub struct ChatClient {
    framed: Framed<TcpStream, AnyDelimiterCodec>,
    key: Key,
}

impl ChatClient {
    /// Connect and send the username line
    pub async fn connect(
        addr: impl ToSocketAddrs,
        username: &str,
        key: Key,
    ) -> Result<Self, AppError> {
        let stream = TcpStream::connect(addr).await?;
        let codec = AnyDelimiterCodec::new(b"\n".to_vec(), b"\n".to_vec());
        let mut framed = Framed::new(stream, codec);
        framed.send(username).await?;
        debug!("Registered as {}", username);
        Ok(Self { framed, key })
    }

    /// Encrypt and send one message
    pub async fn send(&mut self, content: &str) -> Result<(), AppError> {
        let token = cipher::encode(content.as_bytes(), &self.key);
        self.framed.send(token).await?;
        Ok(())
    }

    /// Send a line as-is, bypassing the cipher
    pub async fn send_raw(&mut self, line: &str) -> Result<(), AppError> {
        self.framed.send(line).await?;
        Ok(())
    }

    /// Receive the next relayed message
    ///
    /// Returns `None` once the server has closed the connection.
    pub async fn recv(&mut self) -> Result<Option<Message>, AppError> {
        let Some(frame) = self.framed.next().await.transpose()? else {
            return Ok(None);
        };
        let token = std::str::from_utf8(&frame).map_err(DecodeError::from)?;
        let plaintext = cipher::decode_text(token.trim(), &self.key)?;
        Ok(Some(Message::from_wire(&plaintext)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::generate_key;
    use tokio::net::TcpListener;
    use tokio_util::codec::LinesCodec;

    #[tokio::test]
    async fn test_client_speaks_the_line_protocol() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let key = generate_key();

        let server_key = key.clone();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, LinesCodec::new());

            let username = framed.next().await.unwrap().unwrap();
            let token = framed.next().await.unwrap().unwrap();
            let content = cipher::decode_text(&token, &server_key).unwrap();

            let reply = Message::new(content, username).to_wire().unwrap();
            framed
                .send(cipher::encode(reply.as_bytes(), &server_key))
                .await
                .unwrap();
        });

        let mut client = ChatClient::connect(addr, "alice", key).await.unwrap();
        client.send("hello").await.unwrap();

        let msg = client.recv().await.unwrap().unwrap();
        assert_eq!(msg.content(), "hello");
        assert_eq!(msg.sender(), "alice");

        server.await.unwrap();
        assert!(client.recv().await.unwrap().is_none());
    }
}
