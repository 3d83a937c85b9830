//! Game rules for tic-tac-toe.
//!
//! Pure functions over board values, kept apart from board storage so the
//! engine and remote hosts evaluate boards the same way.

pub mod draw;
pub mod win;

pub use draw::{is_draw, is_full};
pub use win::{LINES, check_winner};
