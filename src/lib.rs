//! Strictly Match - match session core for tic-tac-toe
//!
//! Plays a match offline on one input surface, or online against an
//! authoritative match host over an unreliable realtime link.
//!
//! # Architecture
//!
//! - **Engine**: pure rules in the `strictly_tictactoe` crate, re-exported here
//! - **Protocol**: op-coded match messages inside a line-framed JSON envelope
//! - **Transport**: one owned connection with handshake, heartbeat and an
//!   inbound event stream
//! - **Session**: the match state machine; optimistic moves reconciled
//!   against authoritative snapshots
//! - **Host**: a reference TCP host speaking the same protocol
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use strictly_match::{ClientConfig, Credential, MatchMode, MatchSession, TcpConnector};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ClientConfig::default();
//! let connector = Arc::new(TcpConnector::new(config.host().clone()));
//! let session = MatchSession::new(connector, Credential::new("token"), config.timings());
//!
//! let seat = session.create_or_join(MatchMode::CreateVsPlayer).await?;
//! println!("Playing {} in {}", seat.local_mark(), seat.match_id());
//! session.submit_move(4).await?;
//! session.teardown().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod config;
mod discovery;
mod error;
mod host;
mod protocol;
mod session;
mod transport;

// Crate-level exports - Configuration
pub use config::{ClientConfig, HostConfig};

// Crate-level exports - Errors
pub use error::{ConfigError, MatchError, TransportError};

// Crate-level exports - Protocol
pub use protocol::{
    Difficulty, Frame, FrameCodec, JoinAck, MAX_LINE_LENGTH, MatchEnd, MatchMessage, MoveIntent,
    OpCode, Outcome, PresenceChange, ProtocolError, RawMessage, RoomSummary, StateUpdate, decode,
    decode_line, encode, encode_line,
};

// Crate-level exports - Transport
pub use transport::{
    Connector, Credential, DisconnectReason, FrameSender, Inbound, LinkOptions, TcpConnector,
    TcpTransport, Transport, TransportEvent, TransportSession, memory,
};

// Crate-level exports - Session
pub use session::{
    Intent, MatchInfo, MatchMode, MatchPhase, MatchSession, MatchSnapshot, MoveResolution,
    SessionTimings,
};

// Crate-level exports - Host and discovery
pub use discovery::list_rooms;
pub use host::{BOT_ID, MatchHost, Room, RoomRegistry, user_id_for};

// Crate-level exports - Game types (tic-tac-toe)
pub use strictly_tictactoe::{
    Board, CELL_COUNT, GameStatus, LocalMatch, Mark, Move, Position, Rejection, Square,
    apply_move, evaluate, next_turn,
};
