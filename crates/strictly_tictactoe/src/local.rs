//! Offline two-player match on one input surface.
//!
//! No network phases: a local match is in progress until `evaluate`
//! reports a win or draw, and moves apply synchronously.

use super::action::{Move, Rejection};
use super::engine::{apply_move, evaluate, next_turn};
use super::{Board, GameStatus, Mark, Position};
use tracing::{info, instrument};

/// Local match controller.
#[derive(Debug, Clone, Default)]
pub struct LocalMatch {
    board: Board,
    status: GameStatus,
    history: Vec<Move>,
}

impl LocalMatch {
    /// Starts a fresh match with X to move.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Current status; terminal once a line completes or the board fills.
    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// Mark to move, or `None` when the match has ended.
    pub fn turn(&self) -> Option<Mark> {
        if self.status.is_terminal() {
            None
        } else {
            Some(next_turn(&self.board))
        }
    }

    /// Moves played so far.
    pub fn history(&self) -> &[Move] {
        &self.history
    }

    /// Places the current mark at `cell` and re-evaluates the board.
    ///
    /// On rejection nothing changes.
    #[instrument(skip(self), fields(moves = self.history.len()))]
    pub fn submit_move(&mut self, cell: usize) -> Result<GameStatus, Rejection> {
        if self.status.is_terminal() {
            return Err(Rejection::GameOver);
        }

        let mark = next_turn(&self.board);
        let board = apply_move(&self.board, cell, mark)?;
        let position = Position::from_index(cell).ok_or(Rejection::OutOfBounds(cell))?;

        self.board = board;
        self.history.push(Move::new(mark, position));
        self.status = evaluate(&self.board);

        if self.status.is_terminal() {
            info!(status = %self.status, "Local match ended");
        }
        Ok(self.status)
    }

    /// Clears the board for a new match.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
