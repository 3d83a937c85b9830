//! Error types for the match session client.

use crate::protocol::ProtocolError;
use crate::session::MatchPhase;
use derive_more::{Display, Error};
use strictly_tictactoe::Rejection;

/// Failures of the realtime link.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum TransportError {
    /// The connection could not be opened.
    #[display("Connect failed: {}", _0)]
    ConnectFailed(#[error(not(source))] String),

    /// The host refused the credential.
    #[display("Handshake rejected: {}", _0)]
    HandshakeRejected(#[error(not(source))] String),

    /// The handshake did not complete in time.
    #[display("Handshake timed out")]
    HandshakeTimeout,

    /// No live connection to send on.
    #[display("Not connected")]
    NotConnected,

    /// The connection dropped while an operation was outstanding.
    #[display("Connection lost")]
    ConnectionLost,

    /// Socket-level failure.
    #[display("I/O error: {}", _0)]
    Io(#[error(not(source))] String),

    /// A frame could not be read or written.
    #[display("{}", _0)]
    Protocol(ProtocolError),
}

impl From<ProtocolError> for TransportError {
    fn from(err: ProtocolError) -> Self {
        TransportError::Protocol(err)
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

/// Errors surfaced by the match session controller.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum MatchError {
    /// Link failure that the controller could not recover from.
    #[display("Transport error: {}", _0)]
    Transport(TransportError),

    /// The board engine refused the move. Nothing was sent.
    #[display("Move rejected: {}", _0)]
    RuleViolation(Rejection),

    /// The host refused to seat us.
    #[display("Match unavailable: {}", _0)]
    MatchUnavailable(#[error(not(source))] String),

    /// The match reached a terminal outcome.
    #[display("Match has already ended")]
    MatchAlreadyEnded,

    /// Another move is still waiting for the host.
    #[display("A move is already pending")]
    MoveAlreadyPending,

    /// The host never confirmed the move.
    #[display("Move was not confirmed in time")]
    MoveTimedOut,

    /// The link dropped while a move was waiting for the host.
    #[display("Move was interrupted by a lost connection")]
    MoveInterrupted,

    /// Moves are only accepted while the match is in progress.
    #[display("Match is not in progress (phase: {})", _0)]
    NotInProgress(#[error(not(source))] MatchPhase),

    /// A match can only be created or joined from `Idle`.
    #[display("Cannot start a match from phase {}", _0)]
    InvalidPhase(#[error(not(source))] MatchPhase),

    /// The session was torn down.
    #[display("Session is closed")]
    SessionClosed,
}

impl From<TransportError> for MatchError {
    fn from(err: TransportError) -> Self {
        MatchError::Transport(err)
    }
}

impl From<Rejection> for MatchError {
    fn from(err: Rejection) -> Self {
        MatchError::RuleViolation(err)
    }
}

/// Configuration error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error at the caller's location.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}
