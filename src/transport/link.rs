//! Connection ownership, handshake and heartbeat.

use super::{Connector, Credential, DisconnectReason, Transport, TransportEvent};
use crate::error::TransportError;
use crate::protocol::Frame;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

/// Timing knobs for one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_new::new)]
pub struct LinkOptions {
    /// Upper bound on connect plus handshake.
    pub connect_timeout: Duration,
    /// Interval between outgoing pings.
    pub heartbeat_interval: Duration,
    /// Silence after which the link is declared dead.
    pub heartbeat_timeout: Duration,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(15),
        }
    }
}

/// Non-blocking send handle for the live link.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::UnboundedSender<Frame>,
}

impl FrameSender {
    /// Queues a frame. Fails once the link is gone.
    pub fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.tx.send(frame).map_err(|_| TransportError::NotConnected)
    }

    /// True while the link task is still running.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Inbound events of one link, ending with `Disconnected`.
#[derive(Debug)]
pub struct Inbound {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Inbound {
    /// Next event. `None` only after `Disconnected` has been delivered or
    /// the link task died.
    pub async fn next(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

struct Link {
    sender: FrameSender,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    user_id: String,
}

/// Owns exactly one live connection at a time.
pub struct TransportSession<C> {
    connector: Arc<C>,
    credential: Credential,
    options: LinkOptions,
    link: Option<Link>,
}

impl<C: Connector> TransportSession<C> {
    /// Creates a disconnected session.
    pub fn new(connector: Arc<C>, credential: Credential, options: LinkOptions) -> Self {
        Self {
            connector,
            credential,
            options,
            link: None,
        }
    }

    /// True while the current link is up.
    pub fn is_connected(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.sender.is_connected())
    }

    /// Identity the host assigned in the last handshake.
    pub fn user_id(&self) -> Option<&str> {
        self.link.as_ref().map(|link| link.user_id.as_str())
    }

    /// Send handle for the live link.
    pub fn sender(&self) -> Result<FrameSender, TransportError> {
        self.link
            .as_ref()
            .filter(|link| link.sender.is_connected())
            .map(|link| link.sender.clone())
            .ok_or(TransportError::NotConnected)
    }

    /// Queues a frame on the live link.
    pub fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.sender()?.send(frame)
    }

    /// Opens a new link, replacing any existing one.
    ///
    /// Suspends until the host welcomes the credential, refuses it, or
    /// `connect_timeout` elapses.
    #[instrument(skip(self))]
    pub async fn connect(&mut self) -> Result<Inbound, TransportError> {
        self.disconnect().await;

        let opened = tokio::time::timeout(
            self.options.connect_timeout,
            open(self.connector.as_ref(), &self.credential),
        )
        .await;
        let (transport, user_id) = match opened {
            Ok(result) => result?,
            Err(_) => {
                warn!(timeout = ?self.options.connect_timeout, "Handshake timed out");
                return Err(TransportError::HandshakeTimeout);
            }
        };
        info!(user_id = %user_id, "Link established");

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(pump(
            transport,
            out_rx,
            event_tx,
            cancel.clone(),
            self.options,
        ));

        self.link = Some(Link {
            sender: FrameSender { tx: out_tx },
            cancel,
            task,
            user_id,
        });
        Ok(Inbound { rx: event_rx })
    }

    /// Closes the link after flushing queued frames. No-op when idle.
    #[instrument(skip(self))]
    pub async fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            link.cancel.cancel();
            if let Err(e) = link.task.await {
                warn!(error = %e, "Link task ended abnormally");
            }
            debug!("Link closed locally");
        }
    }
}

impl<C> Drop for TransportSession<C> {
    fn drop(&mut self) {
        if let Some(link) = &self.link {
            link.cancel.cancel();
        }
    }
}

async fn open<C: Connector + ?Sized>(
    connector: &C,
    credential: &Credential,
) -> Result<(Box<dyn Transport>, String), TransportError> {
    let mut transport = connector.connect().await?;
    match handshake(transport.as_mut(), credential).await {
        Ok(user_id) => Ok((transport, user_id)),
        Err(e) => {
            let _ = transport.close().await;
            Err(e)
        }
    }
}

async fn handshake(
    transport: &mut dyn Transport,
    credential: &Credential,
) -> Result<String, TransportError> {
    transport
        .send(Frame::Authenticate {
            token: credential.expose().to_string(),
        })
        .await?;

    loop {
        match transport.recv().await {
            Some(Ok(Frame::Welcome { user_id })) => return Ok(user_id),
            Some(Ok(Frame::Rejected { reason })) => {
                warn!(%reason, "Credential refused");
                return Err(TransportError::HandshakeRejected(reason));
            }
            Some(Ok(Frame::Ping)) => transport.send(Frame::Pong).await?,
            Some(Ok(other)) => debug!(kind = other.kind(), "Ignoring frame before welcome"),
            Some(Err(TransportError::Protocol(e))) => {
                warn!(error = %e, "Dropping garbled frame during handshake");
            }
            Some(Err(e)) => return Err(e),
            None => {
                return Err(TransportError::ConnectFailed(
                    "closed during handshake".to_string(),
                ));
            }
        }
    }
}

/// Moves frames between the transport and the session until the link ends.
async fn pump(
    mut transport: Box<dyn Transport>,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    events: mpsc::UnboundedSender<TransportEvent>,
    cancel: CancellationToken,
    options: LinkOptions,
) {
    let mut heartbeat = tokio::time::interval_at(
        Instant::now() + options.heartbeat_interval,
        options.heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();

    let reason = loop {
        let deadline = last_seen + options.heartbeat_timeout;

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                while let Ok(frame) = outbound.try_recv() {
                    if transport.send(frame).await.is_err() {
                        break;
                    }
                }
                break DisconnectReason::LocalClose;
            }

            frame = outbound.recv() => match frame {
                Some(frame) => {
                    trace!(kind = frame.kind(), "Sending frame");
                    if let Err(e) = transport.send(frame).await {
                        warn!(error = %e, "Send failed");
                        break DisconnectReason::SendFailed;
                    }
                }
                None => break DisconnectReason::LocalClose,
            },

            incoming = transport.recv() => match incoming {
                Some(Ok(frame)) => {
                    last_seen = Instant::now();
                    match frame {
                        Frame::Ping => {
                            if transport.send(Frame::Pong).await.is_err() {
                                break DisconnectReason::SendFailed;
                            }
                        }
                        Frame::Pong => trace!("Pong"),
                        other => {
                            let _ = events.send(TransportEvent::Message(other));
                        }
                    }
                }
                Some(Err(TransportError::Protocol(e))) => {
                    last_seen = Instant::now();
                    let _ = events.send(TransportEvent::Malformed(e));
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Read failed");
                    break DisconnectReason::Io;
                }
                None => break DisconnectReason::ClosedByPeer,
            },

            _ = heartbeat.tick() => {
                if transport.send(Frame::Ping).await.is_err() {
                    break DisconnectReason::SendFailed;
                }
            }

            _ = tokio::time::sleep_until(deadline) => {
                warn!(timeout = ?options.heartbeat_timeout, "No traffic from host");
                break DisconnectReason::HeartbeatTimeout;
            }
        }
    };

    if reason != DisconnectReason::ClosedByPeer {
        let _ = transport.close().await;
    }
    info!(%reason, "Link ended");
    let _ = events.send(TransportEvent::Disconnected(reason));
}
