//! Match session controller scenarios over the in-memory link.
//!
//! The test plays the host side by hand through a `MemoryPeer`. Time is
//! paused, so timeouts, grace periods and backoff elapse instantly.

use std::sync::Arc;
use std::time::Duration;
use strictly_match::memory::{self, MemoryAcceptor, MemoryConnector, MemoryPeer};
use strictly_match::{
    Board, Credential, Frame, JoinAck, LinkOptions, Mark, MatchEnd, MatchError, MatchMessage,
    MatchMode, MatchPhase, MatchSession, MatchSnapshot, MoveIntent, MoveResolution, Outcome,
    Position, PresenceChange, RawMessage, Rejection, SessionTimings, StateUpdate, TransportError,
    apply_move, decode, encode,
};

const MATCH_ID: &str = "match-1";

fn timings() -> SessionTimings {
    SessionTimings {
        move_timeout: Duration::from_secs(10),
        presence_grace: Duration::from_secs(15),
        reconnect_attempts: 3,
        reconnect_backoff: Duration::from_secs(1),
        link: LinkOptions::new(
            Duration::from_secs(10),
            Duration::from_secs(3600),
            Duration::from_secs(7200),
        ),
    }
}

fn new_session() -> (MatchSession<MemoryConnector>, MemoryAcceptor) {
    let (connector, acceptor) = memory::channel();
    let session = MatchSession::new(Arc::new(connector), Credential::new("alice"), timings());
    (session, acceptor)
}

fn send(peer: &MemoryPeer, message: impl Into<MatchMessage>) {
    let raw = encode(&message.into()).expect("encodable");
    peer.send(&Frame::data(MATCH_ID, raw)).expect("peer connected");
}

async fn next_message(peer: &mut MemoryPeer) -> (String, MatchMessage) {
    match peer.recv_frame().await {
        Some(Ok(Frame::Data {
            match_id,
            op_code,
            payload,
        })) => (
            match_id,
            decode(&RawMessage { op_code, payload }).expect("well-formed message"),
        ),
        other => panic!("expected data frame, got {:?}", other),
    }
}

async fn wait_for(
    session: &MatchSession<MemoryConnector>,
    predicate: impl FnMut(&MatchSnapshot) -> bool,
) -> MatchSnapshot {
    let mut view = session.subscribe();
    let snapshot = tokio::time::timeout(Duration::from_secs(600), view.wait_for(predicate))
        .await
        .expect("condition reached in time")
        .expect("session alive")
        .clone();
    snapshot
}

/// Seats the session with `mark` and returns the host end of the link.
async fn seat(
    session: &MatchSession<MemoryConnector>,
    acceptor: &mut MemoryAcceptor,
    mark: Mark,
) -> MemoryPeer {
    let joining = {
        let session = session.clone();
        tokio::spawn(async move { session.create_or_join(MatchMode::CreateVsPlayer).await })
    };

    let mut peer = acceptor.accept().await.expect("client connects");
    let token = peer.accept_handshake("user-alice").await.expect("handshake");
    assert_eq!(token, "alice");
    assert_eq!(
        peer.recv_frame().await,
        Some(Ok(Frame::Create {
            vs_bot: false,
            difficulty: None
        }))
    );
    send(&peer, JoinAck::new(mark));

    let info = joining.await.expect("task").expect("seated");
    assert_eq!(info.match_id(), MATCH_ID);
    assert_eq!(*info.local_mark(), mark);
    peer
}

/// Seats the session and delivers the opening snapshot.
async fn start(
    session: &MatchSession<MemoryConnector>,
    acceptor: &mut MemoryAcceptor,
    mark: Mark,
) -> MemoryPeer {
    let peer = seat(session, acceptor, mark).await;
    assert_eq!(session.snapshot().phase, MatchPhase::Connected);
    send(&peer, StateUpdate::new(Board::new(), Mark::X, Some(1)));
    wait_for(session, |s| s.phase == MatchPhase::InProgress).await;
    peer
}

fn spawn_move(
    session: &MatchSession<MemoryConnector>,
    cell: usize,
) -> tokio::task::JoinHandle<Result<MoveResolution, MatchError>> {
    let session = session.clone();
    tokio::spawn(async move { session.submit_move(cell).await })
}

async fn expect_intent(peer: &mut MemoryPeer, cell: usize) {
    let (match_id, message) = next_message(peer).await;
    assert_eq!(match_id, MATCH_ID);
    assert_eq!(message, MatchMessage::MoveIntent(MoveIntent::new(cell)));
}

async fn nothing_sent(peer: &mut MemoryPeer) -> bool {
    tokio::time::timeout(Duration::from_secs(1), peer.recv_frame())
        .await
        .is_err()
}

#[tokio::test(start_paused = true)]
async fn test_first_snapshot_moves_connected_to_in_progress() {
    let (session, mut acceptor) = new_session();
    assert_eq!(session.snapshot().phase, MatchPhase::Idle);

    let _peer = start(&session, &mut acceptor, Mark::X).await;
    let snapshot = session.snapshot();
    assert_eq!(snapshot.match_id.as_deref(), Some(MATCH_ID));
    assert_eq!(snapshot.local_mark, Some(Mark::X));
    assert_eq!(snapshot.turn, Some(Mark::X));
    assert!(snapshot.can_move());
}

#[tokio::test(start_paused = true)]
async fn test_confirmed_move_replaces_board() {
    let (session, mut acceptor) = new_session();
    let mut peer = start(&session, &mut acceptor, Mark::X).await;

    let pending = spawn_move(&session, 4);
    expect_intent(&mut peer, 4).await;

    let predicted = apply_move(&Board::new(), 4, Mark::X).expect("legal");
    let snapshot = wait_for(&session, |s| s.pending_cell == Some(4)).await;
    assert_eq!(snapshot.displayed_board, predicted);
    assert_eq!(snapshot.board, Board::new());

    send(&peer, StateUpdate::new(predicted, Mark::O, Some(2)));
    let resolution = pending.await.expect("task").expect("confirmed");
    assert_eq!(resolution, MoveResolution::Confirmed(predicted));

    let snapshot = session.snapshot();
    assert_eq!(snapshot.board, predicted);
    assert_eq!(snapshot.turn, Some(Mark::O));
    assert_eq!(snapshot.pending_cell, None);
}

#[tokio::test(start_paused = true)]
async fn test_move_timeout_clears_intent_and_allows_retry() {
    let (session, mut acceptor) = new_session();
    let mut peer = start(&session, &mut acceptor, Mark::X).await;

    let pending = spawn_move(&session, 4);
    expect_intent(&mut peer, 4).await;

    let result = pending.await.expect("task");
    assert_eq!(result, Err(MatchError::MoveTimedOut));

    let snapshot = session.snapshot();
    assert_eq!(snapshot.phase, MatchPhase::InProgress);
    assert_eq!(snapshot.pending_cell, None);
    assert_eq!(snapshot.displayed_board, Board::new());

    let retry = spawn_move(&session, 4);
    expect_intent(&mut peer, 4).await;
    let board = apply_move(&Board::new(), 4, Mark::X).expect("legal");
    send(&peer, StateUpdate::new(board, Mark::O, Some(2)));
    assert_eq!(
        retry.await.expect("task"),
        Ok(MoveResolution::Confirmed(board))
    );
}

#[tokio::test(start_paused = true)]
async fn test_submit_while_pending_fails_for_any_cell() {
    let (session, mut acceptor) = new_session();
    let mut peer = start(&session, &mut acceptor, Mark::X).await;

    let pending = spawn_move(&session, 0);
    expect_intent(&mut peer, 0).await;
    wait_for(&session, |s| s.pending_cell == Some(0)).await;

    for cell in [0, 4, 8, 42] {
        assert_eq!(
            session.submit_move(cell).await,
            Err(MatchError::MoveAlreadyPending)
        );
    }
    assert!(nothing_sent(&mut peer).await);

    let board = apply_move(&Board::new(), 0, Mark::X).expect("legal");
    send(&peer, StateUpdate::new(board, Mark::O, Some(2)));
    assert!(pending.await.expect("task").is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_rule_violations_never_reach_the_host() {
    let (session, mut acceptor) = new_session();
    let mut peer = start(&session, &mut acceptor, Mark::O).await;

    assert_eq!(
        session.submit_move(0).await,
        Err(MatchError::RuleViolation(Rejection::OutOfTurn {
            expected: Mark::X,
            attempted: Mark::O,
        }))
    );

    let board = apply_move(&Board::new(), 4, Mark::X).expect("legal");
    send(&peer, StateUpdate::new(board, Mark::O, Some(2)));
    wait_for(&session, |s| s.turn == Some(Mark::O)).await;

    assert_eq!(
        session.submit_move(4).await,
        Err(MatchError::RuleViolation(Rejection::CellOccupied(
            Position::Center
        )))
    );
    assert_eq!(
        session.submit_move(9).await,
        Err(MatchError::RuleViolation(Rejection::OutOfBounds(9)))
    );
    assert!(nothing_sent(&mut peer).await);
    assert_eq!(session.snapshot().displayed_board, board);
}

#[tokio::test(start_paused = true)]
async fn test_conflicting_snapshot_supersedes_prediction() {
    let (session, mut acceptor) = new_session();
    let mut peer = start(&session, &mut acceptor, Mark::X).await;

    let pending = spawn_move(&session, 4);
    expect_intent(&mut peer, 4).await;

    let authoritative = apply_move(&Board::new(), 0, Mark::X).expect("legal");
    send(&peer, StateUpdate::new(authoritative, Mark::O, Some(2)));

    assert_eq!(
        pending.await.expect("task"),
        Ok(MoveResolution::Superseded(authoritative))
    );
    let snapshot = session.snapshot();
    assert_eq!(snapshot.board, authoritative);
    assert_eq!(snapshot.displayed_board, authoritative);
}

#[tokio::test(start_paused = true)]
async fn test_stale_snapshot_is_discarded() {
    let (session, mut acceptor) = new_session();
    let peer = start(&session, &mut acceptor, Mark::O).await;

    let newer = apply_move(&Board::new(), 2, Mark::X).expect("legal");
    send(&peer, StateUpdate::new(newer, Mark::O, Some(5)));
    send(&peer, StateUpdate::new(Board::new(), Mark::X, Some(3)));
    wait_for(&session, |s| s.board == newer).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = session.snapshot();
    assert_eq!(snapshot.board, newer);
    assert_eq!(snapshot.turn, Some(Mark::O));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_input_is_dropped() {
    let (session, mut acceptor) = new_session();
    let peer = start(&session, &mut acceptor, Mark::O).await;

    peer.send_line("{not json").expect("sent");
    peer.send(&Frame::Data {
        match_id: MATCH_ID.to_string(),
        op_code: 99,
        payload: serde_json::json!({}),
    })
    .expect("sent");
    peer.send(&Frame::Data {
        match_id: MATCH_ID.to_string(),
        op_code: 4,
        payload: serde_json::json!({ "board": "nope" }),
    })
    .expect("sent");

    let board = apply_move(&Board::new(), 8, Mark::X).expect("legal");
    send(&peer, StateUpdate::new(board, Mark::O, Some(2)));
    let snapshot = wait_for(&session, |s| s.board == board).await;
    assert_eq!(snapshot.phase, MatchPhase::InProgress);
}

#[tokio::test(start_paused = true)]
async fn test_match_end_is_terminal() {
    let (session, mut acceptor) = new_session();
    let peer = start(&session, &mut acceptor, Mark::X).await;

    send(&peer, MatchEnd::new(Outcome::Won(Mark::O)));
    let snapshot =
        wait_for(&session, |s| s.phase == MatchPhase::Ended(Outcome::Won(Mark::O))).await;
    assert_eq!(snapshot.turn, None);
    assert_eq!(snapshot.reason.as_deref(), Some("O wins"));

    assert_eq!(
        session.submit_move(0).await,
        Err(MatchError::MatchAlreadyEnded)
    );
}

#[tokio::test(start_paused = true)]
async fn test_opponent_leaving_aborts_after_grace() {
    let (session, mut acceptor) = new_session();
    let peer = start(&session, &mut acceptor, Mark::X).await;

    send(&peer, PresenceChange::new("user-bob".to_string(), false));
    let snapshot = wait_for(&session, |s| s.opponent_away).await;
    assert_eq!(snapshot.phase, MatchPhase::InProgress);

    let snapshot = wait_for(&session, |s| s.phase.is_terminal()).await;
    assert_eq!(snapshot.phase, MatchPhase::Ended(Outcome::Aborted));
    assert_eq!(snapshot.reason.as_deref(), Some("Opponent left the match"));

    // Snapshots after the abort are ignored.
    let late = apply_move(&Board::new(), 0, Mark::X).expect("legal");
    send(&peer, StateUpdate::new(late, Mark::O, Some(2)));
    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot = session.snapshot();
    assert_eq!(snapshot.board, Board::new());
    assert_eq!(snapshot.phase, MatchPhase::Ended(Outcome::Aborted));
    assert_eq!(
        session.submit_move(1).await,
        Err(MatchError::MatchAlreadyEnded)
    );
}

#[tokio::test(start_paused = true)]
async fn test_opponent_returning_cancels_grace() {
    let (session, mut acceptor) = new_session();
    let peer = start(&session, &mut acceptor, Mark::X).await;

    send(&peer, PresenceChange::new("user-bob".to_string(), false));
    wait_for(&session, |s| s.opponent_away).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    send(&peer, PresenceChange::new("user-bob".to_string(), true));
    wait_for(&session, |s| !s.opponent_away).await;
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(session.snapshot().phase, MatchPhase::InProgress);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_seat_returns_to_idle() {
    let (session, mut acceptor) = new_session();
    let joining = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .create_or_join(MatchMode::JoinRoom("match-9".to_string()))
                .await
        })
    };

    let mut peer = acceptor.accept().await.expect("client connects");
    peer.accept_handshake("user-alice").await.expect("handshake");
    assert_eq!(
        peer.recv_frame().await,
        Some(Ok(Frame::Join {
            match_id: "match-9".to_string()
        }))
    );
    peer.send(&Frame::Rejected {
        reason: "Match is full".to_string(),
    })
    .expect("sent");

    assert_eq!(
        joining.await.expect("task"),
        Err(MatchError::MatchUnavailable("Match is full".to_string()))
    );
    let snapshot = session.snapshot();
    assert_eq!(snapshot.phase, MatchPhase::Idle);
    assert!(snapshot.reason.is_some_and(|r| r.contains("Match is full")));

    // Idle again, so another attempt is allowed.
    let _peer = seat(&session, &mut acceptor, Mark::X).await;
}

#[tokio::test(start_paused = true)]
async fn test_refused_credential_returns_to_idle() {
    let (session, mut acceptor) = new_session();
    let joining = {
        let session = session.clone();
        tokio::spawn(async move { session.create_or_join(MatchMode::CreateVsPlayer).await })
    };

    let mut peer = acceptor.accept().await.expect("client connects");
    assert!(matches!(
        peer.recv_frame().await,
        Some(Ok(Frame::Authenticate { .. }))
    ));
    peer.send(&Frame::Rejected {
        reason: "bad token".to_string(),
    })
    .expect("sent");

    assert_eq!(
        joining.await.expect("task"),
        Err(MatchError::Transport(TransportError::HandshakeRejected(
            "bad token".to_string()
        )))
    );
    assert_eq!(session.snapshot().phase, MatchPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_rejoins_same_match() {
    let (session, mut acceptor) = new_session();
    let peer = start(&session, &mut acceptor, Mark::X).await;

    drop(peer);
    wait_for(&session, |s| s.phase == MatchPhase::Reconnecting).await;

    let mut peer = acceptor.accept().await.expect("client reconnects");
    peer.accept_handshake("user-alice").await.expect("handshake");
    assert_eq!(
        peer.recv_frame().await,
        Some(Ok(Frame::Join {
            match_id: MATCH_ID.to_string()
        }))
    );
    send(&peer, JoinAck::new(Mark::X));
    wait_for(&session, |s| s.phase == MatchPhase::InProgress).await;

    // The restored link carries moves.
    let pending = spawn_move(&session, 4);
    expect_intent(&mut peer, 4).await;
    let board = apply_move(&Board::new(), 4, Mark::X).expect("legal");
    send(&peer, StateUpdate::new(board, Mark::O, Some(2)));
    assert!(pending.await.expect("task").is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_pending_intent_fails_when_link_drops() {
    let (session, mut acceptor) = new_session();
    let mut peer = start(&session, &mut acceptor, Mark::X).await;

    let pending = spawn_move(&session, 4);
    expect_intent(&mut peer, 4).await;
    drop(peer);

    assert_eq!(pending.await.expect("task"), Err(MatchError::MoveInterrupted));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_exhaustion_aborts() {
    let (session, mut acceptor) = new_session();
    let peer = start(&session, &mut acceptor, Mark::X).await;

    drop(acceptor);
    drop(peer);

    let snapshot = wait_for(&session, |s| s.phase.is_terminal()).await;
    assert_eq!(snapshot.phase, MatchPhase::Ended(Outcome::Aborted));
    assert!(snapshot.reason.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_teardown_sends_leave_and_is_idempotent() {
    let (session, mut acceptor) = new_session();
    let mut peer = start(&session, &mut acceptor, Mark::X).await;

    session.teardown().await;
    assert_eq!(peer.recv_frame().await, Some(Ok(Frame::Leave)));
    assert_eq!(peer.recv_frame().await, None);
    assert_eq!(session.snapshot().phase, MatchPhase::Closed);
    assert_eq!(session.snapshot().match_id, None);

    session.teardown().await;
    assert_eq!(session.snapshot().phase, MatchPhase::Closed);
    assert_eq!(session.submit_move(0).await, Err(MatchError::SessionClosed));
    assert_eq!(
        session.create_or_join(MatchMode::CreateVsPlayer).await,
        Err(MatchError::SessionClosed)
    );
}

#[tokio::test(start_paused = true)]
async fn test_teardown_cancels_pending_move() {
    let (session, mut acceptor) = new_session();
    let mut peer = start(&session, &mut acceptor, Mark::X).await;

    let pending = spawn_move(&session, 4);
    expect_intent(&mut peer, 4).await;
    session.teardown().await;

    assert_eq!(pending.await.expect("task"), Err(MatchError::SessionClosed));
}

#[tokio::test(start_paused = true)]
async fn test_teardown_during_connect() {
    let (session, mut acceptor) = new_session();
    let joining = {
        let session = session.clone();
        tokio::spawn(async move { session.create_or_join(MatchMode::CreateVsPlayer).await })
    };

    let _peer = acceptor.accept().await.expect("client connects");
    wait_for(&session, |s| s.phase == MatchPhase::Searching).await;
    session.teardown().await;

    assert_eq!(joining.await.expect("task"), Err(MatchError::SessionClosed));
    assert_eq!(session.snapshot().phase, MatchPhase::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_remote_message_can_be_injected_directly() {
    let (session, mut acceptor) = new_session();
    let _peer = start(&session, &mut acceptor, Mark::X).await;

    session
        .on_remote_message(MatchMessage::MatchEnd(MatchEnd::new(Outcome::Draw)))
        .await;
    assert_eq!(session.snapshot().phase, MatchPhase::Ended(Outcome::Draw));
}
