//! Operation-coded match messages.

use serde::{Deserialize, Serialize};
use strictly_tictactoe::{Board, GameStatus, Mark};

/// Operation codes exchanged with the match host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OpCode {
    /// Client asks to place its mark.
    MoveIntent,
    /// Client has been seated.
    JoinAck,
    /// Terminal result.
    MatchEnd,
    /// Authoritative board snapshot.
    StateUpdate,
    /// A participant connected or disconnected.
    PresenceChange,
}

impl OpCode {
    /// Numeric code on the wire.
    pub fn code(self) -> u8 {
        match self {
            OpCode::MoveIntent => 1,
            OpCode::JoinAck => 2,
            OpCode::MatchEnd => 3,
            OpCode::StateUpdate => 4,
            OpCode::PresenceChange => 5,
        }
    }

    /// Looks up a numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(OpCode::MoveIntent),
            2 => Some(OpCode::JoinAck),
            3 => Some(OpCode::MatchEnd),
            4 => Some(OpCode::StateUpdate),
            5 => Some(OpCode::PresenceChange),
            _ => None,
        }
    }
}

/// How a match finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// A mark completed a line.
    Won(Mark),
    /// Board filled without a line.
    Draw,
    /// Opponent or link went away before a result.
    Aborted,
    /// The host gave up on the match.
    Error,
}

impl Outcome {
    /// Maps a terminal engine status to an outcome.
    pub fn from_status(status: GameStatus) -> Option<Self> {
        match status {
            GameStatus::Won(mark) => Some(Outcome::Won(mark)),
            GameStatus::Draw => Some(Outcome::Draw),
            GameStatus::InProgress => None,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Won(mark) => write!(f, "{} wins", mark),
            Outcome::Draw => write!(f, "Draw"),
            Outcome::Aborted => write!(f, "Aborted"),
            Outcome::Error => write!(f, "Error"),
        }
    }
}

/// Seat assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_new::new)]
pub struct JoinAck {
    /// Mark the client plays.
    pub assigned_mark: Mark,
}

/// Move request, addressed by flat row-major index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_new::new)]
pub struct MoveIntent {
    /// Cell 0-8.
    pub cell_index: usize,
}

/// Authoritative snapshot. `seq` increases with every snapshot when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_new::new)]
pub struct StateUpdate {
    /// Full board.
    pub board: Board,
    /// Mark to move next.
    pub turn: Mark,
    /// Snapshot sequence number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

/// Terminal result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_new::new)]
pub struct MatchEnd {
    /// How it finished.
    pub outcome: Outcome,
}

/// Connect/disconnect notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_new::new)]
pub struct PresenceChange {
    /// Whose presence changed.
    pub player_id: String,
    /// True on (re)connect.
    pub joined: bool,
}

/// Closed set of match messages, one variant per op code.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::From)]
pub enum MatchMessage {
    /// See [`OpCode::MoveIntent`].
    MoveIntent(MoveIntent),
    /// See [`OpCode::JoinAck`].
    JoinAck(JoinAck),
    /// See [`OpCode::MatchEnd`].
    MatchEnd(MatchEnd),
    /// See [`OpCode::StateUpdate`].
    StateUpdate(StateUpdate),
    /// See [`OpCode::PresenceChange`].
    PresenceChange(PresenceChange),
}

impl MatchMessage {
    /// Op code of this message.
    pub fn op_code(&self) -> OpCode {
        match self {
            MatchMessage::MoveIntent(_) => OpCode::MoveIntent,
            MatchMessage::JoinAck(_) => OpCode::JoinAck,
            MatchMessage::MatchEnd(_) => OpCode::MatchEnd,
            MatchMessage::StateUpdate(_) => OpCode::StateUpdate,
            MatchMessage::PresenceChange(_) => OpCode::PresenceChange,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_op_codes_round_trip() {
        for op in OpCode::iter() {
            assert_eq!(OpCode::from_code(op.code()), Some(op));
        }
        assert_eq!(OpCode::from_code(0), None);
        assert_eq!(OpCode::from_code(6), None);
    }

    #[test]
    fn test_op_code_names() {
        assert_eq!(OpCode::StateUpdate.to_string(), "STATE_UPDATE");
        assert_eq!(OpCode::MoveIntent.code(), 1);
    }

    #[test]
    fn test_outcome_wire_shape() {
        let json = serde_json::to_string(&Outcome::Won(Mark::O)).unwrap();
        assert_eq!(json, r#"{"won":"O"}"#);
        let json = serde_json::to_string(&Outcome::Aborted).unwrap();
        assert_eq!(json, r#""aborted""#);
    }

    #[test]
    fn test_outcome_from_status() {
        assert_eq!(Outcome::from_status(GameStatus::InProgress), None);
        assert_eq!(
            Outcome::from_status(GameStatus::Won(Mark::X)),
            Some(Outcome::Won(Mark::X))
        );
    }
}
