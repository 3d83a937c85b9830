//! Named board positions.
//!
//! Every layer addresses cells with a single row-major index (0-8).
//! `Position` is the checked form of that index.

use super::types::Board;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

/// A cell on the board, numbered row-major from the top-left.
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
    strum::EnumIter,
    strum::FromRepr,
)]
#[strum(serialize_all = "title_case")]
#[repr(usize)]
pub enum Position {
    /// Cell 0.
    TopLeft,
    /// Cell 1.
    TopCenter,
    /// Cell 2.
    TopRight,
    /// Cell 3.
    MiddleLeft,
    /// Cell 4.
    Center,
    /// Cell 5.
    MiddleRight,
    /// Cell 6.
    BottomLeft,
    /// Cell 7.
    BottomCenter,
    /// Cell 8.
    BottomRight,
}

impl Position {
    /// Row-major index.
    pub fn to_index(self) -> usize {
        self as usize
    }

    /// `None` past the last cell.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::from_repr(index)
    }

    /// Parses a 1-based cell number as typed by a player ("1".."9").
    pub fn from_cell_number(s: &str) -> Option<Self> {
        let n = s.trim().parse::<usize>().ok()?;
        n.checked_sub(1).and_then(Self::from_index)
    }

    /// Empty cells in index order.
    pub fn valid_moves(board: &Board) -> Vec<Position> {
        Self::iter()
            .filter(|pos| board.is_empty(pos.to_index()))
            .collect()
    }
}
