//! Property-based tests for the board engine.

use proptest::prelude::*;
use strictly_tictactoe::{
    Board, GameStatus, Mark, Rejection, Square, apply_move, evaluate, next_turn, rules::LINES,
};

fn arb_board() -> impl Strategy<Value = Board> {
    prop::array::uniform9(0u8..3).prop_map(|codes| {
        Board::from_squares(codes.map(|c| Square::try_from(c).unwrap_or(Square::Empty)))
    })
}

fn arb_cell_order() -> impl Strategy<Value = Vec<usize>> {
    Just((0..9).collect::<Vec<usize>>()).prop_shuffle()
}

fn owns_line(board: &Board, mark: Mark) -> bool {
    LINES.iter().any(|line| {
        line.iter()
            .all(|&i| board.get(i) == Some(Square::Occupied(mark)))
    })
}

/// Property: a reported winner always owns a complete line, and a board
/// with a complete line is never reported as in progress or drawn.
#[test]
fn prop_win_iff_uniform_line() {
    proptest!(|(board in arb_board())| {
        match evaluate(&board) {
            GameStatus::Won(mark) => prop_assert!(owns_line(&board, mark)),
            GameStatus::Draw | GameStatus::InProgress => {
                prop_assert!(!owns_line(&board, Mark::X));
                prop_assert!(!owns_line(&board, Mark::O));
            }
        }
    });
}

/// Property: boards reached through legal play never have two winners.
#[test]
fn prop_legal_play_never_has_two_winners() {
    proptest!(|(order in arb_cell_order())| {
        let mut board = Board::new();
        for cell in order {
            match apply_move(&board, cell, next_turn(&board)) {
                Ok(next) => board = next,
                Err(Rejection::GameOver) => break,
                Err(other) => prop_assert!(false, "unexpected rejection {other}"),
            }
            prop_assert!(!(owns_line(&board, Mark::X) && owns_line(&board, Mark::O)));
            prop_assert!(board.is_consistent());
        }
    });
}

/// Property: no mark can move twice in a row.
#[test]
fn prop_turn_strictly_alternates() {
    proptest!(|(order in arb_cell_order())| {
        let mut board = Board::new();
        let mut last: Option<Mark> = None;
        for cell in order {
            if evaluate(&board).is_terminal() {
                break;
            }
            let mark = next_turn(&board);
            prop_assert_ne!(Some(mark), last);

            if let Some(prev) = last {
                let repeat = apply_move(&board, cell, prev);
                let is_out_of_turn = matches!(repeat, Err(Rejection::OutOfTurn { .. }));
                prop_assert!(is_out_of_turn);
            }

            board = apply_move(&board, cell, mark).map_err(|e| TestCaseError::fail(e.to_string()))?;
            last = Some(mark);
        }
    });
}

/// Property: playing onto an occupied square is always rejected and the
/// board is left as it was.
#[test]
fn prop_occupied_square_always_rejected() {
    proptest!(|(board in arb_board(), cell in 0usize..9, mark_x in any::<bool>())| {
        prop_assume!(!board.is_empty(cell));
        let mark = if mark_x { Mark::X } else { Mark::O };
        let before = board;
        prop_assert!(apply_move(&board, cell, mark).is_err());
        prop_assert_eq!(board, before);
    });
}
