//! Reference match host.
//!
//! An authoritative TCP server speaking the same line protocol as the
//! client. It seats players, runs moves through the board engine and
//! broadcasts snapshots. Used by the `serve` command and integration tests.

mod rooms;

pub use rooms::{BOT_ID, Outbox, Room, RoomRegistry};

use crate::config::HostConfig;
use crate::protocol::{Frame, FrameCodec, MatchMessage, ProtocolError, RawMessage, decode};
use futures::{SinkExt, Stream, StreamExt};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::codec::{Framed, LinesCodecError};
use tracing::{debug, info, instrument, warn};

const MIN_SWEEP_PERIOD: Duration = Duration::from_secs(1);

/// Listening host.
pub struct MatchHost {
    listener: TcpListener,
    registry: Arc<Mutex<RoomRegistry>>,
    idle_timeout: Duration,
}

impl MatchHost {
    /// Binds the listen socket.
    #[instrument(skip(config), fields(bind = %config.bind()))]
    pub async fn bind(config: &HostConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.bind()).await?;
        info!(addr = %listener.local_addr()?, "Match host listening");
        Ok(Self {
            listener,
            registry: Arc::new(Mutex::new(RoomRegistry::new())),
            idle_timeout: config.idle_timeout(),
        })
    }

    /// Bound address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the listener fails, sweeping idle rooms
    /// along the way.
    pub async fn run(self) -> std::io::Result<()> {
        let period = (self.idle_timeout / 4).max(MIN_SWEEP_PERIOD);
        let mut sweep = tokio::time::interval(period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(%peer, error = %e, "Could not set TCP_NODELAY");
                    }
                    tokio::spawn(serve_connection(stream, peer, Arc::clone(&self.registry)));
                }
                _ = sweep.tick() => {
                    self.registry.lock().await.sweep(self.idle_timeout);
                }
            }
        }
    }

    /// Runs the accept loop on a background task.
    pub fn spawn(self) -> JoinHandle<std::io::Result<()>> {
        tokio::spawn(self.run())
    }
}

/// Stable user id for a credential, so a reconnect finds its seat again.
pub fn user_id_for(token: &str) -> String {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    format!("user-{:016x}", hasher.finish())
}

#[instrument(skip(stream, registry))]
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<Mutex<RoomRegistry>>,
) {
    let (mut sink, mut frames) = Framed::new(stream, FrameCodec::new()).split();
    let (outbox, mut queue) = mpsc::unbounded_channel::<Frame>();

    tokio::spawn(async move {
        while let Some(frame) = queue.recv().await {
            if let Err(e) = sink.send(frame).await {
                debug!(error = %e, "Write failed");
                break;
            }
        }
        let _ = SinkExt::<Frame>::close(&mut sink).await;
    });

    let Some(user_id) = authenticate(&mut frames, &outbox).await else {
        debug!("Connection closed before authentication");
        return;
    };
    info!(%user_id, "Client authenticated");

    let mut current: Option<String> = None;
    while let Some(item) = frames.next().await {
        let frame = match item {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => {
                warn!(error = %e, "Dropping garbled frame");
                continue;
            }
            Err(e) => {
                debug!(error = %e, "Read failed");
                break;
            }
        };

        match frame {
            Frame::Ping => {
                let _ = outbox.send(Frame::Pong);
            }
            Frame::Pong => {}
            Frame::Create { vs_bot, difficulty } => {
                let mut rooms = registry.lock().await;
                if let Some(previous) = current.take() {
                    rooms.detach(&previous, &user_id, &outbox, true);
                }
                let match_id = rooms.create(vs_bot, difficulty);
                match rooms.join(&match_id, &user_id, outbox.clone()) {
                    Ok(_) => current = Some(match_id),
                    Err(reason) => {
                        let _ = outbox.send(Frame::Rejected { reason });
                    }
                }
            }
            Frame::Join { match_id } => {
                let mut rooms = registry.lock().await;
                if let Some(previous) = current.take()
                    && previous != match_id
                {
                    rooms.detach(&previous, &user_id, &outbox, true);
                }
                match rooms.join(&match_id, &user_id, outbox.clone()) {
                    Ok(_) => current = Some(match_id),
                    Err(reason) => {
                        info!(%match_id, %reason, "Join refused");
                        let _ = outbox.send(Frame::Rejected { reason });
                    }
                }
            }
            Frame::Leave => {
                if let Some(match_id) = current.take() {
                    registry
                        .lock()
                        .await
                        .detach(&match_id, &user_id, &outbox, true);
                }
            }
            Frame::ListRooms => {
                let rooms = registry.lock().await.list();
                let _ = outbox.send(Frame::Rooms { rooms });
            }
            Frame::Data {
                match_id,
                op_code,
                payload,
            } => match decode(&RawMessage { op_code, payload }) {
                Ok(MatchMessage::MoveIntent(intent)) => {
                    registry
                        .lock()
                        .await
                        .play(&match_id, &user_id, intent.cell_index);
                }
                Ok(other) => warn!(op = %other.op_code(), "Client sent a host-only message"),
                Err(e) => warn!(error = %e, "Dropping malformed message"),
            },
            other => debug!(kind = other.kind(), "Ignoring frame"),
        }
    }

    if let Some(match_id) = current {
        registry
            .lock()
            .await
            .detach(&match_id, &user_id, &outbox, false);
    }
    info!(%user_id, "Client disconnected");
}

async fn authenticate<S>(frames: &mut S, outbox: &Outbox) -> Option<String>
where
    S: Stream<Item = Result<Result<Frame, ProtocolError>, LinesCodecError>> + Unpin,
{
    loop {
        match frames.next().await? {
            Ok(Ok(Frame::Authenticate { token })) => {
                if token.trim().is_empty() {
                    warn!("Empty credential refused");
                    let _ = outbox.send(Frame::Rejected {
                        reason: "Credential required".to_string(),
                    });
                    return None;
                }
                let user_id = user_id_for(&token);
                let _ = outbox.send(Frame::Welcome {
                    user_id: user_id.clone(),
                });
                return Some(user_id);
            }
            Ok(Ok(Frame::Ping)) => {
                let _ = outbox.send(Frame::Pong);
            }
            Ok(Ok(other)) => {
                debug!(kind = other.kind(), "Frame before authentication");
                let _ = outbox.send(Frame::Rejected {
                    reason: "Authenticate first".to_string(),
                });
            }
            Ok(Err(e)) => warn!(error = %e, "Dropping garbled frame"),
            Err(_) => return None,
        }
    }
}
