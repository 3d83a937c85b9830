//! Strictly tic-tac-toe: the pure board engine.
//!
//! Legality checks, win/draw detection and turn alternation over immutable
//! board values, plus an offline two-player controller. No I/O.
//!
//! # Example
//!
//! ```
//! use strictly_tictactoe::{Board, GameStatus, Mark, apply_move, evaluate, next_turn};
//!
//! let board = Board::new();
//! let board = apply_move(&board, 4, Mark::X).unwrap();
//! assert_eq!(next_turn(&board), Mark::O);
//! assert_eq!(evaluate(&board), GameStatus::InProgress);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod action;
mod engine;
mod local;
mod position;
pub mod rules;
mod types;

pub use action::{Move, Rejection};
pub use engine::{apply_move, evaluate, next_turn};
pub use local::LocalMatch;
pub use position::Position;
pub use types::{Board, CELL_COUNT, GameStatus, Mark, Square};
