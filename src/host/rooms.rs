//! Room bookkeeping for the reference host.

use crate::protocol::{
    Difficulty, Frame, JoinAck, MatchEnd, MatchMessage, Outcome, PresenceChange, RoomSummary,
    StateUpdate, encode,
};
use std::collections::BTreeMap;
use std::time::Duration;
use strictly_tictactoe::{Board, GameStatus, Mark, Position, apply_move, evaluate, next_turn};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Outgoing frame queue of one connection.
pub type Outbox = mpsc::UnboundedSender<Frame>;

/// Player id of the host-side bot.
pub const BOT_ID: &str = "bot";

#[derive(Debug)]
struct Seat {
    user_id: String,
    mark: Mark,
    outbox: Option<Outbox>,
    left: bool,
}

impl Seat {
    fn is_bot(&self) -> bool {
        self.user_id == BOT_ID
    }
}

/// One match with up to two seats.
#[derive(Debug)]
pub struct Room {
    id: String,
    vs_bot: bool,
    difficulty: Option<Difficulty>,
    seats: Vec<Seat>,
    board: Board,
    status: GameStatus,
    seq: u64,
    started: bool,
    last_activity: Instant,
}

impl Room {
    fn new(id: String, vs_bot: bool, difficulty: Option<Difficulty>) -> Self {
        info!(match_id = %id, vs_bot, ?difficulty, "Creating room");
        Self {
            id,
            vs_bot,
            difficulty,
            seats: Vec::with_capacity(2),
            board: Board::new(),
            status: GameStatus::InProgress,
            seq: 0,
            started: false,
            last_activity: Instant::now(),
        }
    }

    /// Current board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Current status.
    pub fn status(&self) -> GameStatus {
        self.status
    }

    fn seat_index(&self, user_id: &str) -> Option<usize> {
        self.seats.iter().position(|s| s.user_id == user_id)
    }

    fn send_to(&self, seat: &Seat, message: &MatchMessage) {
        let Some(outbox) = &seat.outbox else {
            return;
        };
        match encode(message) {
            Ok(raw) => {
                let _ = outbox.send(Frame::data(self.id.clone(), raw));
            }
            Err(e) => warn!(error = %e, "Could not encode message"),
        }
    }

    fn broadcast(&self, message: &MatchMessage, except: Option<&str>) {
        for seat in &self.seats {
            if Some(seat.user_id.as_str()) != except {
                self.send_to(seat, message);
            }
        }
    }

    fn snapshot_message(&self) -> MatchMessage {
        MatchMessage::StateUpdate(StateUpdate::new(
            self.board,
            next_turn(&self.board),
            Some(self.seq),
        ))
    }

    /// Seats `user_id`, or re-attaches a returning user to their seat.
    ///
    /// The first seat plays X and the second O.
    #[instrument(skip(self, outbox), fields(match_id = %self.id))]
    pub fn register_player(&mut self, user_id: &str, outbox: Outbox) -> Result<Mark, String> {
        if let Some(index) = self.seat_index(user_id) {
            let seat = &mut self.seats[index];
            seat.outbox = Some(outbox);
            seat.left = false;
            let mark = seat.mark;
            info!(user_id, %mark, "Player rejoined");

            let seat = &self.seats[index];
            self.send_to(seat, &MatchMessage::JoinAck(JoinAck::new(mark)));
            if self.started {
                self.broadcast(
                    &MatchMessage::PresenceChange(PresenceChange::new(user_id.to_string(), true)),
                    Some(user_id),
                );
                self.send_to(seat, &self.snapshot_message());
            }
            if let Some(outcome) = Outcome::from_status(self.status) {
                self.send_to(seat, &MatchMessage::MatchEnd(MatchEnd::new(outcome)));
            }
            return Ok(mark);
        }

        if self.seats.len() >= 2 {
            warn!(user_id, "Room already has 2 players");
            return Err("Match is full".to_string());
        }

        let mark = if self.seats.is_empty() { Mark::X } else { Mark::O };
        info!(user_id, %mark, "Registering player");
        self.seats.push(Seat {
            user_id: user_id.to_string(),
            mark,
            outbox: Some(outbox),
            left: false,
        });
        if let Some(seat) = self.seats.last() {
            self.send_to(seat, &MatchMessage::JoinAck(JoinAck::new(mark)));
        }

        if self.vs_bot && self.seats.len() == 1 {
            debug!(mark = %mark.opponent(), "Seating bot");
            self.seats.push(Seat {
                user_id: BOT_ID.to_string(),
                mark: mark.opponent(),
                outbox: None,
                left: false,
            });
        }

        if self.seats.len() == 2 && !self.started {
            self.started = true;
            self.seq = 1;
            self.last_activity = Instant::now();
            info!("Both seats filled; match starts");
            self.broadcast(&self.snapshot_message(), None);
        }
        Ok(mark)
    }

    /// Applies a move for `user_id` and broadcasts the result.
    #[instrument(skip(self), fields(match_id = %self.id))]
    pub fn make_move(&mut self, user_id: &str, cell: usize) -> Result<(), String> {
        if !self.started {
            return Err("Match has not started".to_string());
        }
        if self.status.is_terminal() {
            return Err("Match is over".to_string());
        }
        let index = self
            .seat_index(user_id)
            .ok_or_else(|| "Unknown player".to_string())?;
        let mark = self.seats[index].mark;

        self.board = apply_move(&self.board, cell, mark).map_err(|e| {
            warn!(user_id, cell, error = %e, "Invalid move");
            format!("Invalid move: {}", e)
        })?;
        self.seq += 1;
        self.last_activity = Instant::now();
        self.status = evaluate(&self.board);
        info!(
            user_id,
            cell,
            moves = self.board.occupied(),
            status = %self.status,
            "Move completed successfully"
        );

        self.broadcast(&self.snapshot_message(), None);
        if let Some(outcome) = Outcome::from_status(self.status) {
            info!(%outcome, "Match ended");
            self.broadcast(&MatchMessage::MatchEnd(MatchEnd::new(outcome)), None);
        } else if self.bot_mark() == Some(next_turn(&self.board)) {
            self.bot_move()?;
        }
        Ok(())
    }

    fn bot_mark(&self) -> Option<Mark> {
        self.seats.iter().find(|s| s.is_bot()).map(|s| s.mark)
    }

    fn bot_move(&mut self) -> Result<(), String> {
        let cell = Position::valid_moves(&self.board)
            .first()
            .map(|p| p.to_index())
            .ok_or_else(|| "Bot has no move".to_string())?;
        debug!(cell, difficulty = ?self.difficulty, "Bot moves");
        self.make_move(BOT_ID, cell)
    }

    /// Marks `user_id` as away and tells the others.
    ///
    /// Ignored when `outbox` is not the seat's current connection, so a stale
    /// connection cannot detach a player who has already rejoined.
    #[instrument(skip(self, outbox), fields(match_id = %self.id))]
    pub fn disconnect(&mut self, user_id: &str, outbox: &Outbox, left: bool) {
        let Some(index) = self.seat_index(user_id) else {
            return;
        };
        let seat = &mut self.seats[index];
        if !seat.outbox.as_ref().is_some_and(|o| o.same_channel(outbox)) {
            debug!(user_id, "Stale connection; seat already re-attached");
            return;
        }
        seat.outbox = None;
        seat.left = left;
        info!(user_id, left, "Player away");

        if self.started && !self.status.is_terminal() {
            self.broadcast(
                &MatchMessage::PresenceChange(PresenceChange::new(user_id.to_string(), false)),
                Some(user_id),
            );
        }
    }

    /// Ends a match with no move for `limit`: a started match as a draw,
    /// a room still waiting for its second player as aborted. Returns true
    /// once the room has been idle that long.
    fn expire(&mut self, now: Instant, limit: Duration) -> bool {
        if now.duration_since(self.last_activity) < limit {
            return false;
        }
        if !self.status.is_terminal() {
            let outcome = if self.started {
                self.status = GameStatus::Draw;
                Outcome::Draw
            } else {
                Outcome::Aborted
            };
            info!(match_id = %self.id, %outcome, "Ending idle match");
            self.broadcast(&MatchMessage::MatchEnd(MatchEnd::new(outcome)), None);
        }
        true
    }

    /// No human is attached and the room can be dropped.
    fn is_abandoned(&self) -> bool {
        let mut humans = self.seats.iter().filter(|s| !s.is_bot());
        let all_away = humans.clone().all(|s| s.outbox.is_none());
        all_away && (self.status.is_terminal() || humans.all(|s| s.left))
    }

    fn summary(&self) -> RoomSummary {
        RoomSummary::new(self.id.clone(), self.seats.len())
    }
}

/// All rooms on the host.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: BTreeMap<String, Room>,
    next_id: u64,
}

impl RoomRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new room and returns its id.
    pub fn create(&mut self, vs_bot: bool, difficulty: Option<Difficulty>) -> String {
        self.next_id += 1;
        let id = format!("match-{}", self.next_id);
        self.rooms
            .insert(id.clone(), Room::new(id.clone(), vs_bot, difficulty));
        id
    }

    /// Seats a player in `match_id`.
    pub fn join(&mut self, match_id: &str, user_id: &str, outbox: Outbox) -> Result<Mark, String> {
        self.rooms
            .get_mut(match_id)
            .ok_or_else(|| "Match not found".to_string())?
            .register_player(user_id, outbox)
    }

    /// Applies a move. Illegal moves are logged and dropped.
    pub fn play(&mut self, match_id: &str, user_id: &str, cell: usize) {
        match self.rooms.get_mut(match_id) {
            Some(room) => {
                if let Err(reason) = room.make_move(user_id, cell) {
                    debug!(match_id, user_id, %reason, "Dropping move intent");
                }
            }
            None => debug!(match_id, "Move for unknown match"),
        }
    }

    /// Detaches a connection from its seat; `left` marks an explicit leave.
    pub fn detach(&mut self, match_id: &str, user_id: &str, outbox: &Outbox, left: bool) {
        let abandoned = match self.rooms.get_mut(match_id) {
            Some(room) => {
                room.disconnect(user_id, outbox, left);
                room.is_abandoned()
            }
            None => false,
        };
        if abandoned {
            info!(match_id, "Removing abandoned room");
            self.rooms.remove(match_id);
        }
    }

    /// Ends and removes every room idle for at least `limit`.
    pub fn sweep(&mut self, limit: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .rooms
            .values_mut()
            .filter_map(|room| room.expire(now, limit).then(|| room.id.clone()))
            .collect();
        for match_id in &expired {
            self.rooms.remove(match_id);
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Removed idle rooms");
        }
        expired.len()
    }

    /// Rooms still in play.
    pub fn list(&self) -> Vec<RoomSummary> {
        self.rooms
            .values()
            .filter(|room| !room.status.is_terminal())
            .map(Room::summary)
            .collect()
    }

    /// Looks up a room.
    pub fn get(&self, match_id: &str) -> Option<&Room> {
        self.rooms.get(match_id)
    }
}
