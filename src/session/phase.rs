//! Match lifecycle values.

use crate::protocol::{Difficulty, Frame, Outcome};
use strictly_tictactoe::{Board, Mark};
use tokio::time::Instant;

/// Lifecycle stage of a match session.
///
/// `Idle → Searching → Connected → InProgress → Ended(outcome) → Closed`,
/// with `InProgress ⇄ Reconnecting` while the link recovers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MatchPhase {
    /// No match.
    #[default]
    Idle,
    /// Connecting and asking the host for a seat.
    Searching,
    /// Seated, waiting for the opening snapshot.
    Connected,
    /// Moves are accepted.
    InProgress,
    /// Link lost; trying to rejoin the same match.
    Reconnecting,
    /// Terminal result reached.
    Ended(Outcome),
    /// Torn down.
    Closed,
}

impl MatchPhase {
    /// True for `Ended` and `Closed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MatchPhase::Ended(_) | MatchPhase::Closed)
    }
}

impl std::fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchPhase::Idle => write!(f, "Idle"),
            MatchPhase::Searching => write!(f, "Searching"),
            MatchPhase::Connected => write!(f, "Connected"),
            MatchPhase::InProgress => write!(f, "InProgress"),
            MatchPhase::Reconnecting => write!(f, "Reconnecting"),
            MatchPhase::Ended(outcome) => write!(f, "Ended({})", outcome),
            MatchPhase::Closed => write!(f, "Closed"),
        }
    }
}

/// How to obtain a seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchMode {
    /// New match against a host-side bot.
    CreateVsBot(Difficulty),
    /// New match waiting for a second player.
    CreateVsPlayer,
    /// Existing match by id.
    JoinRoom(String),
}

impl MatchMode {
    /// Frame asking the host for a seat.
    pub fn request(&self) -> Frame {
        match self {
            MatchMode::CreateVsBot(difficulty) => Frame::Create {
                vs_bot: true,
                difficulty: Some(*difficulty),
            },
            MatchMode::CreateVsPlayer => Frame::Create {
                vs_bot: false,
                difficulty: None,
            },
            MatchMode::JoinRoom(match_id) => Frame::Join {
                match_id: match_id.clone(),
            },
        }
    }
}

impl std::fmt::Display for MatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchMode::CreateVsBot(difficulty) => write!(f, "vs bot ({})", difficulty),
            MatchMode::CreateVsPlayer => write!(f, "vs player"),
            MatchMode::JoinRoom(match_id) => write!(f, "join {}", match_id),
        }
    }
}

/// Seat obtained by `create_or_join`.
#[derive(Debug, Clone, PartialEq, Eq, derive_getters::Getters, derive_new::new)]
pub struct MatchInfo {
    /// Host-assigned id.
    match_id: String,
    /// Our mark.
    local_mark: Mark,
}

/// Local, unconfirmed move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intent {
    /// Target cell.
    pub cell_index: usize,
    /// Our mark.
    pub mark: Mark,
    /// Submission time.
    pub submitted_at: Instant,
}

/// How a submitted move was settled by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveResolution {
    /// The snapshot contains our mark at the requested cell.
    Confirmed(Board),
    /// The snapshot disagrees with our prediction; the host's board stands.
    Superseded(Board),
}

impl MoveResolution {
    /// Authoritative board either way.
    pub fn board(&self) -> &Board {
        match self {
            MoveResolution::Confirmed(board) | MoveResolution::Superseded(board) => board,
        }
    }
}

/// Consistent read-only view of the session for presentation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSnapshot {
    /// Current phase.
    pub phase: MatchPhase,
    /// Match id once seated.
    pub match_id: Option<String>,
    /// Our mark once seated.
    pub local_mark: Option<Mark>,
    /// Last authoritative board.
    pub board: Board,
    /// Board to render: the prediction while a move is pending, else `board`.
    pub displayed_board: Board,
    /// Mark to move, while the match is live.
    pub turn: Option<Mark>,
    /// Cell of the pending intent.
    pub pending_cell: Option<usize>,
    /// The opponent has dropped and the grace period is running.
    pub opponent_away: bool,
    /// Last human-readable reason (failed connect, abort cause, result).
    pub reason: Option<String>,
}

impl MatchSnapshot {
    /// True when we may submit a move right now.
    pub fn can_move(&self) -> bool {
        self.phase == MatchPhase::InProgress
            && self.pending_cell.is_none()
            && self.turn.is_some()
            && self.turn == self.local_mark
    }
}
