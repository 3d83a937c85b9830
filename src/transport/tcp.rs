//! Newline-delimited JSON over TCP.

use super::{Connector, Transport};
use crate::error::TransportError;
use crate::protocol::{Frame, FrameCodec, ProtocolError};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodecError};
use tracing::{debug, instrument};

/// Connects to a host address such as `127.0.0.1:7350`.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    /// Creates a connector for `addr`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Target address.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Connector for TcpConnector {
    #[instrument(skip(self), fields(addr = %self.addr))]
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| TransportError::ConnectFailed(format!("{}: {}", self.addr, e)))?;
        stream.set_nodelay(true)?;
        debug!("TCP connection open");
        Ok(Box::new(TcpTransport::new(stream)))
    }
}

/// A framed TCP stream.
#[derive(Debug)]
pub struct TcpTransport {
    framed: Framed<TcpStream, FrameCodec>,
}

impl TcpTransport {
    /// Wraps a connected stream.
    pub fn new(stream: TcpStream) -> Self {
        Self {
            framed: Framed::new(stream, FrameCodec::new()),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.framed.send(frame).await.map_err(codec_error)
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        match self.framed.next().await? {
            Ok(Ok(frame)) => Some(Ok(frame)),
            Ok(Err(e)) => Some(Err(TransportError::Protocol(e))),
            Err(e) => Some(Err(codec_error(e))),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::<Frame>::close(&mut self.framed)
            .await
            .map_err(codec_error)
    }
}

/// Maps sink and stream failures; over-long inbound lines never get here.
pub(crate) fn codec_error(err: LinesCodecError) -> TransportError {
    match err {
        LinesCodecError::MaxLineLengthExceeded => {
            TransportError::Protocol(ProtocolError::GarbledFrame("line too long".to_string()))
        }
        LinesCodecError::Io(e) => e.into(),
    }
}
