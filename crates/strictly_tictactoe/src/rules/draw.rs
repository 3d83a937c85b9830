//! Draw detection logic for tic-tac-toe.

use super::win::check_winner;
use crate::{Board, CELL_COUNT};
use tracing::instrument;

/// Checks if the board is full (all squares occupied).
#[instrument(skip(board))]
pub fn is_full(board: &Board) -> bool {
    board.occupied() == CELL_COUNT
}

/// A full board with no winner.
pub fn is_draw(board: &Board) -> bool {
    is_full(board) && check_winner(board).is_none()
}
