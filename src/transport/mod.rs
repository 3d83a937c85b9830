//! Realtime link to a match host.
//!
//! [`Connector`] opens a raw [`Transport`]; [`TransportSession`] owns at most
//! one live transport, runs the handshake and heartbeat, and turns the
//! connection into an [`Inbound`] event stream that always ends with
//! [`TransportEvent::Disconnected`].

mod link;
pub mod memory;
mod tcp;

pub use link::{FrameSender, Inbound, LinkOptions, TransportSession};
pub use tcp::{TcpConnector, TcpTransport};

use crate::error::TransportError;
use crate::protocol::{Frame, ProtocolError};
use async_trait::async_trait;

/// A bidirectional frame pipe.
#[async_trait]
pub trait Transport: Send {
    /// Writes one frame.
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Reads the next frame. `None` once the peer has closed the link.
    ///
    /// A garbled frame yields `Some(Err(TransportError::Protocol(_)))` and the
    /// link stays usable.
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>>;

    /// Closes the link.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens transports to one host.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a fresh transport.
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError>;
}

#[async_trait]
impl<C: Connector + ?Sized> Connector for std::sync::Arc<C> {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        (**self).connect().await
    }
}

/// Opaque credential presented during the handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Environment variable holding the token.
    pub const ENV_VAR: &'static str = "STRICTLY_MATCH_TOKEN";

    /// Wraps a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Reads the token from [`Self::ENV_VAR`].
    pub fn from_env() -> Option<Self> {
        std::env::var(Self::ENV_VAR)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(Self)
    }

    /// Token text, for the handshake only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Why a link ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum DisconnectReason {
    /// The peer closed the connection.
    ClosedByPeer,
    /// Nothing arrived within the heartbeat timeout.
    HeartbeatTimeout,
    /// A write failed.
    SendFailed,
    /// The read side failed.
    Io,
    /// We closed it.
    LocalClose,
}

/// Event on the inbound stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A well-formed frame.
    Message(Frame),
    /// A line that could not be decoded. The link stays up.
    Malformed(ProtocolError),
    /// Terminal event.
    Disconnected(DisconnectReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("s3cret-token");
        let printed = format!("{:?}", credential);
        assert!(!printed.contains("s3cret"));
        assert_eq!(credential.expose(), "s3cret-token");
    }
}
