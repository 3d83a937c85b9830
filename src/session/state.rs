//! Mutable fields of a session, guarded by the controller's mutex.

use super::phase::{Intent, MatchInfo, MatchPhase, MatchSnapshot, MoveResolution};
use crate::error::MatchError;
use crate::protocol::{Outcome, StateUpdate};
use crate::transport::FrameSender;
use strictly_tictactoe::{Board, Mark, Square};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Outstanding intent plus the channel that settles it.
pub(crate) struct Pending {
    pub(crate) id: u64,
    pub(crate) intent: Intent,
    pub(crate) prediction: Board,
    pub(crate) resolve: oneshot::Sender<MoveResolution>,
}

/// One game instance.
pub(crate) struct Match {
    pub(crate) info: MatchInfo,
    pub(crate) board: Board,
    pub(crate) turn: Mark,
    pub(crate) started: bool,
    pub(crate) last_seq: Option<u64>,
    pub(crate) pending: Option<Pending>,
}

impl Match {
    pub(crate) fn new(info: MatchInfo) -> Self {
        Self {
            info,
            board: Board::new(),
            turn: Mark::X,
            started: false,
            last_seq: None,
            pending: None,
        }
    }

    /// Applies an authoritative snapshot and settles any pending intent.
    ///
    /// Returns false when the snapshot is stale and was discarded.
    pub(crate) fn apply_update(&mut self, update: StateUpdate) -> bool {
        if let (Some(seq), Some(last)) = (update.seq, self.last_seq)
            && seq <= last
        {
            debug!(seq, last, "Discarding stale snapshot");
            return false;
        }
        if !update.board.is_consistent() {
            warn!(board = ?update.board, "Host snapshot breaks turn alternation");
        }

        if let Some(pending) = self.pending.take() {
            let intent = pending.intent;
            let resolution =
                if update.board.get(intent.cell_index) == Some(Square::Occupied(intent.mark)) {
                    MoveResolution::Confirmed(update.board)
                } else {
                    debug!(
                        cell = intent.cell_index,
                        predicted = ?pending.prediction,
                        "Authoritative snapshot replaced prediction"
                    );
                    MoveResolution::Superseded(update.board)
                };
            let _ = pending.resolve.send(resolution);
        }

        self.board = update.board;
        self.turn = update.turn;
        self.started = true;
        if update.seq.is_some() {
            self.last_seq = update.seq;
        }
        true
    }
}

/// Everything the critical section protects.
#[derive(Default)]
pub(crate) struct SessionState {
    pub(crate) phase: MatchPhase,
    pub(crate) current: Option<Match>,
    pub(crate) sender: Option<FrameSender>,
    pub(crate) user_id: Option<String>,
    pub(crate) reason: Option<String>,
    pub(crate) grace_deadline: Option<Instant>,
    pub(crate) reconnects_used: u32,
    pub(crate) next_intent_id: u64,
}

impl SessionState {
    pub(crate) fn transition(&mut self, phase: MatchPhase) {
        if self.phase != phase {
            info!(from = %self.phase, to = %phase, "Phase change");
            self.phase = phase;
        }
    }

    /// Moves to `Ended`, dropping any pending intent and grace timer.
    pub(crate) fn end(&mut self, outcome: Outcome, reason: impl Into<String>) {
        self.transition(MatchPhase::Ended(outcome));
        self.reason = Some(reason.into());
        self.grace_deadline = None;
        if let Some(current) = self.current.as_mut() {
            current.pending = None;
        }
    }

    /// Drops the pending intent, if any. Its caller sees the channel close.
    pub(crate) fn fail_pending(&mut self) {
        if let Some(current) = self.current.as_mut()
            && current.pending.take().is_some()
        {
            debug!("Pending intent failed");
        }
    }

    /// Error for a caller whose pending intent was dropped.
    pub(crate) fn dropped_intent_error(&self) -> MatchError {
        match self.phase {
            MatchPhase::Closed => MatchError::SessionClosed,
            MatchPhase::Ended(_) => MatchError::MatchAlreadyEnded,
            _ => MatchError::MoveInterrupted,
        }
    }

    pub(crate) fn snapshot(&self) -> MatchSnapshot {
        let mut snapshot = MatchSnapshot {
            phase: self.phase,
            reason: self.reason.clone(),
            opponent_away: self.grace_deadline.is_some(),
            ..MatchSnapshot::default()
        };
        if let Some(current) = &self.current {
            snapshot.match_id = Some(current.info.match_id().clone());
            snapshot.local_mark = Some(*current.info.local_mark());
            snapshot.board = current.board;
            snapshot.displayed_board = current
                .pending
                .as_ref()
                .map_or(current.board, |p| p.prediction);
            snapshot.pending_cell = current.pending.as_ref().map(|p| p.intent.cell_index);
            if current.started && !self.phase.is_terminal() {
                snapshot.turn = Some(current.turn);
            }
        }
        snapshot
    }
}
