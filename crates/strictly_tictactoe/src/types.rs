//! Core domain types for tic-tac-toe.

use serde::{Deserialize, Serialize};

/// Number of cells on the board.
pub const CELL_COUNT: usize = 9;

/// A player's mark.
///
/// `X` always moves first.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
pub enum Mark {
    /// First mover.
    X,
    /// Second mover.
    O,
}

impl Mark {
    /// Returns the opposing mark.
    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }

    /// Wire code of the mark (`1` for X, `2` for O).
    pub fn code(self) -> u8 {
        match self {
            Mark::X => 1,
            Mark::O => 2,
        }
    }

    /// Parses a wire code back into a mark.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Mark::X),
            2 => Some(Mark::O),
            _ => None,
        }
    }
}

/// A square on the board.
///
/// Serialized as a single integer: `0` empty, `1` X, `2` O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Square {
    /// Empty square.
    Empty,
    /// Square occupied by a mark.
    Occupied(Mark),
}

impl From<Square> for u8 {
    fn from(square: Square) -> Self {
        match square {
            Square::Empty => 0,
            Square::Occupied(mark) => mark.code(),
        }
    }
}

impl TryFrom<u8> for Square {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Square::Empty),
            other => Mark::from_code(other)
                .map(Square::Occupied)
                .ok_or_else(|| format!("invalid square code {}", other)),
        }
    }
}

/// 3x3 board value.
///
/// Boards are plain `Copy` values. Nothing in this crate mutates a board
/// in place once it has been handed out; moves produce a new board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    /// Squares in row-major order (0-8).
    squares: [Square; CELL_COUNT],
}

impl Board {
    /// Creates a new empty board.
    pub fn new() -> Self {
        Self {
            squares: [Square::Empty; CELL_COUNT],
        }
    }

    /// Builds a board from squares in row-major order.
    pub fn from_squares(squares: [Square; CELL_COUNT]) -> Self {
        Self { squares }
    }

    /// Gets the square at the given index, or `None` when out of range.
    pub fn get(&self, index: usize) -> Option<Square> {
        self.squares.get(index).copied()
    }

    /// Checks if a square is empty. Out-of-range indices are never empty.
    pub fn is_empty(&self, index: usize) -> bool {
        matches!(self.get(index), Some(Square::Empty))
    }

    /// Returns all squares.
    pub fn squares(&self) -> &[Square; CELL_COUNT] {
        &self.squares
    }

    /// Returns a copy of this board with one square replaced.
    pub(crate) fn with_square(mut self, index: usize, square: Square) -> Self {
        self.squares[index] = square;
        self
    }

    /// Counts the squares holding `mark`.
    pub fn count(&self, mark: Mark) -> usize {
        self.squares
            .iter()
            .filter(|s| **s == Square::Occupied(mark))
            .count()
    }

    /// Number of occupied squares.
    pub fn occupied(&self) -> usize {
        self.squares.iter().filter(|s| **s != Square::Empty).count()
    }

    /// Turn-alternation invariant: X has either as many marks as O or one more.
    pub fn is_consistent(&self) -> bool {
        let x = self.count(Mark::X);
        let o = self.count(Mark::O);
        x == o || x == o + 1
    }

    /// Formats the board as a human-readable grid.
    ///
    /// Empty squares show their 1-based number so players can pick them.
    pub fn display(&self) -> String {
        let mut result = String::new();
        for row in 0..3 {
            for col in 0..3 {
                let pos = row * 3 + col;
                let symbol = match self.squares[pos] {
                    Square::Empty => (pos + 1).to_string(),
                    Square::Occupied(mark) => mark.to_string(),
                };
                result.push_str(&symbol);
                if col < 2 {
                    result.push('|');
                }
            }
            if row < 2 {
                result.push_str("\n-+-+-\n");
            }
        }
        result
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of evaluating a board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameStatus {
    /// No winner and at least one empty square.
    #[default]
    InProgress,
    /// A mark completed a line.
    Won(Mark),
    /// Board full with no winning line.
    Draw,
}

impl GameStatus {
    /// Returns true once the game can accept no more moves.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GameStatus::InProgress)
    }
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameStatus::InProgress => write!(f, "In progress"),
            GameStatus::Won(mark) => write!(f, "{} wins", mark),
            GameStatus::Draw => write!(f, "Draw"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_wire_codes() {
        assert_eq!(u8::from(Square::Empty), 0);
        assert_eq!(u8::from(Square::Occupied(Mark::X)), 1);
        assert_eq!(u8::from(Square::Occupied(Mark::O)), 2);
        assert!(Square::try_from(3).is_err());
    }

    #[test]
    fn test_board_serializes_as_flat_codes() {
        let board = Board::new()
            .with_square(0, Square::Occupied(Mark::X))
            .with_square(4, Square::Occupied(Mark::O));
        let json = serde_json::to_string(&board).unwrap();
        assert_eq!(json, "[1,0,0,0,2,0,0,0,0]");
    }

    #[test]
    fn test_board_rejects_wrong_length() {
        let result: Result<Board, _> = serde_json::from_str("[0,0,0]");
        assert!(result.is_err());
    }

    #[test]
    fn test_consistency() {
        let board = Board::new().with_square(0, Square::Occupied(Mark::X));
        assert!(board.is_consistent());
        let board = board.with_square(1, Square::Occupied(Mark::X));
        assert!(!board.is_consistent());
    }

    #[test]
    fn test_display_numbers_empty_squares() {
        let board = Board::new().with_square(4, Square::Occupied(Mark::X));
        assert_eq!(board.display(), "1|2|3\n-+-+-\n4|X|6\n-+-+-\n7|8|9");
    }
}
