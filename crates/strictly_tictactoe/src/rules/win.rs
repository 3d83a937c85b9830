//! Win detection.

use crate::{Board, Mark, Square};
use tracing::instrument;

/// Cell indices of the eight winning lines: rows, then columns, then diagonals.
pub const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Mark owning the first complete line, if any.
#[instrument(skip(board))]
pub fn check_winner(board: &Board) -> Option<Mark> {
    LINES.iter().find_map(|line| line_owner(board, line))
}

fn line_owner(board: &Board, line: &[usize; 3]) -> Option<Mark> {
    let Some(Square::Occupied(mark)) = board.get(line[0]) else {
        return None;
    };
    line[1..]
        .iter()
        .all(|&i| board.get(i) == Some(Square::Occupied(mark)))
        .then_some(mark)
}
