//! Board engine: move legality, evaluation, turn derivation.
//!
//! All functions take a board by reference and never mutate it.
//! `apply_move` returns a fresh board so callers can compare before and
//! after, or throw the result away on rejection.

use super::action::Rejection;
use super::rules::{check_winner, is_full};
use super::{Board, GameStatus, Mark, Position, Square};
use tracing::{debug, instrument, warn};

/// Mark that moves next.
///
/// Derived from the mark counts instead of being stored, so it can never
/// drift from the board.
pub fn next_turn(board: &Board) -> Mark {
    if board.count(Mark::X) == board.count(Mark::O) {
        Mark::X
    } else {
        Mark::O
    }
}

/// Evaluates a board.
///
/// Run after every move: a win is reported as soon as a line completes,
/// a draw only when the board is full without a winner.
#[instrument(skip(board))]
pub fn evaluate(board: &Board) -> GameStatus {
    if let Some(winner) = check_winner(board) {
        GameStatus::Won(winner)
    } else if is_full(board) {
        GameStatus::Draw
    } else {
        GameStatus::InProgress
    }
}

/// Places `mark` at `cell`, returning the resulting board.
///
/// Rejected when the cell is out of range, the game is over, the square is
/// taken, or `mark` is not the mark to move.
#[instrument(skip(board))]
pub fn apply_move(board: &Board, cell: usize, mark: Mark) -> Result<Board, Rejection> {
    let position = Position::from_index(cell).ok_or(Rejection::OutOfBounds(cell))?;

    if evaluate(board).is_terminal() {
        debug!("Move after game end");
        return Err(Rejection::GameOver);
    }

    if !board.is_empty(cell) {
        return Err(Rejection::CellOccupied(position));
    }

    let expected = next_turn(board);
    if mark != expected {
        return Err(Rejection::OutOfTurn {
            expected,
            attempted: mark,
        });
    }

    let next = board.with_square(cell, Square::Occupied(mark));
    if !next.is_consistent() {
        warn!(cell, %mark, "Turn alternation violated after move");
    }
    Ok(next)
}
