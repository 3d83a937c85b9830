//! In-process link speaking the same JSON lines as TCP.
//!
//! [`channel`] returns a connector for the client side and an acceptor that
//! hands out one [`MemoryPeer`] per connection. Useful for driving a
//! [`MatchSession`](crate::MatchSession) without sockets.

use super::{Connector, Transport};
use crate::error::TransportError;
use crate::protocol::{Frame, ProtocolError, decode_line, encode_line};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

/// Creates a connected connector/acceptor pair.
pub fn channel() -> (MemoryConnector, MemoryAcceptor) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MemoryConnector { peers: tx }, MemoryAcceptor { incoming: rx })
}

/// Client side: every `connect` produces a new peer on the acceptor.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        let (to_peer, from_client) = mpsc::unbounded_channel();
        let (to_client, from_peer) = mpsc::unbounded_channel();

        self.peers
            .send(MemoryPeer {
                tx: to_client,
                rx: from_client,
            })
            .map_err(|_| TransportError::ConnectFailed("no listener".to_string()))?;

        debug!("Memory link open");
        Ok(Box::new(MemoryTransport {
            tx: Some(to_peer),
            rx: from_peer,
        }))
    }
}

/// Host side of [`channel`].
#[derive(Debug)]
pub struct MemoryAcceptor {
    incoming: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryAcceptor {
    /// Waits for the next client connection.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.recv().await
    }
}

/// Host end of one memory link.
#[derive(Debug)]
pub struct MemoryPeer {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Sends a frame to the client.
    pub fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        self.send_line(encode_line(frame)?)
    }

    /// Sends an arbitrary line, well-formed or not.
    pub fn send_line(&self, line: impl Into<String>) -> Result<(), TransportError> {
        self.tx
            .send(line.into())
            .map_err(|_| TransportError::NotConnected)
    }

    /// Next frame from the client. `None` once the client has closed.
    pub async fn recv(&mut self) -> Option<Result<Frame, ProtocolError>> {
        let line = self.rx.recv().await?;
        Some(decode_line(&line))
    }

    /// Next frame that is not a heartbeat.
    pub async fn recv_frame(&mut self) -> Option<Result<Frame, ProtocolError>> {
        loop {
            match self.recv().await? {
                Ok(Frame::Ping) | Ok(Frame::Pong) => continue,
                other => return Some(other),
            }
        }
    }

    /// Completes the handshake for whatever token the client presents.
    pub async fn accept_handshake(
        &mut self,
        user_id: impl Into<String>,
    ) -> Result<String, TransportError> {
        match self.recv_frame().await {
            Some(Ok(Frame::Authenticate { token })) => {
                self.send(&Frame::Welcome {
                    user_id: user_id.into(),
                })?;
                Ok(token)
            }
            Some(Ok(other)) => Err(TransportError::ConnectFailed(format!(
                "expected authenticate, got {}",
                other.kind()
            ))),
            Some(Err(e)) => Err(e.into()),
            None => Err(TransportError::ConnectFailed(
                "closed during handshake".to_string(),
            )),
        }
    }
}

/// Client end of one memory link.
#[derive(Debug)]
pub struct MemoryTransport {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let line = encode_line(&frame)?;
        self.tx
            .as_ref()
            .ok_or(TransportError::NotConnected)?
            .send(line)
            .map_err(|_| TransportError::Io("peer dropped".to_string()))
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        let line = self.rx.recv().await?;
        Some(decode_line(&line).map_err(TransportError::Protocol))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx.take();
        self.rx.close();
        Ok(())
    }
}
