//! The online match state machine.

use super::SessionTimings;
use super::phase::{Intent, MatchInfo, MatchMode, MatchPhase, MatchSnapshot, MoveResolution};
use super::state::{Match, Pending, SessionState};
use crate::error::{MatchError, TransportError};
use crate::protocol::{Frame, MatchMessage, MoveIntent, Outcome, RawMessage, decode, encode};
use crate::transport::{
    Connector, Credential, DisconnectReason, Inbound, TransportEvent, TransportSession,
};
use std::sync::Arc;
use strictly_tictactoe::apply_move;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

struct Shared<C> {
    connector: Arc<C>,
    credential: Credential,
    timings: SessionTimings,
    state: Mutex<SessionState>,
    view: watch::Sender<MatchSnapshot>,
    cancel: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to one online match session.
///
/// Clones share the same session. Local submits and inbound host messages
/// are serialized through one async mutex; every change is published as a
/// [`MatchSnapshot`].
pub struct MatchSession<C> {
    shared: Arc<Shared<C>>,
}

impl<C> Clone for MatchSession<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

enum LinkPlan {
    Stop,
    Reconnect,
}

impl<C: Connector> MatchSession<C> {
    /// Creates an idle session.
    pub fn new(connector: Arc<C>, credential: Credential, timings: SessionTimings) -> Self {
        let (view, _) = watch::channel(MatchSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                connector,
                credential,
                timings,
                state: Mutex::new(SessionState::default()),
                view,
                cancel: CancellationToken::new(),
                driver: Mutex::new(None),
            }),
        }
    }

    /// Current view.
    pub fn snapshot(&self) -> MatchSnapshot {
        self.shared.view.borrow().clone()
    }

    /// Receiver that observes every published view.
    pub fn subscribe(&self) -> watch::Receiver<MatchSnapshot> {
        self.shared.view.subscribe()
    }

    /// Connects, asks the host for a seat and waits for JOIN_ACK.
    ///
    /// On failure the phase returns to `Idle` with the reason recorded.
    #[instrument(skip(self, mode), fields(mode = %mode))]
    pub async fn create_or_join(&self, mode: MatchMode) -> Result<MatchInfo, MatchError> {
        {
            let mut state = self.shared.state.lock().await;
            match state.phase {
                MatchPhase::Idle => {}
                MatchPhase::Closed => return Err(MatchError::SessionClosed),
                other => return Err(MatchError::InvalidPhase(other)),
            }
            state.reason = None;
            state.transition(MatchPhase::Searching);
            self.shared.publish(&state);
        }

        let mut link = TransportSession::new(
            Arc::clone(&self.shared.connector),
            self.shared.credential.clone(),
            self.shared.timings.link,
        );
        let attempt = tokio::select! {
            _ = self.shared.cancel.cancelled() => Err(MatchError::SessionClosed),
            result = seat(&mut link, &mode, self.shared.timings) => result,
        };

        let mut state = self.shared.state.lock().await;
        if state.phase == MatchPhase::Closed {
            drop(state);
            link.disconnect().await;
            return Err(MatchError::SessionClosed);
        }

        let (info, inbound) = match attempt {
            Ok(seated) => seated,
            Err(e) => {
                warn!(error = %e, "Could not obtain a seat");
                state.reason = Some(e.to_string());
                state.transition(MatchPhase::Idle);
                self.shared.publish(&state);
                drop(state);
                link.disconnect().await;
                return Err(e);
            }
        };

        state.current = Some(Match::new(info.clone()));
        state.sender = link.sender().ok();
        state.user_id = link.user_id().map(str::to_string);
        state.reconnects_used = 0;
        state.transition(MatchPhase::Connected);
        self.shared.publish(&state);
        drop(state);

        info!(match_id = %info.match_id(), mark = %info.local_mark(), "Seated");
        let handle = tokio::spawn(drive(Arc::clone(&self.shared), link, inbound));
        *self.shared.driver.lock().await = Some(handle);
        Ok(info)
    }

    /// Submits a move for the local mark and waits for the host to settle it.
    ///
    /// Nothing is sent when the engine rejects the move. The displayed board
    /// shows the prediction until STATE_UPDATE arrives; the authoritative
    /// snapshot always replaces it.
    #[instrument(skip(self))]
    pub async fn submit_move(&self, cell: usize) -> Result<MoveResolution, MatchError> {
        let (id, rx) = {
            let mut state = self.shared.state.lock().await;
            let accepted = begin_intent(&mut state, cell)?;
            self.shared.publish(&state);
            accepted
        };

        match tokio::time::timeout(self.shared.timings.move_timeout, rx).await {
            Ok(Ok(resolution)) => Ok(resolution),
            Ok(Err(_)) => Err(self.shared.state.lock().await.dropped_intent_error()),
            Err(_) => {
                let mut state = self.shared.state.lock().await;
                if let Some(current) = state.current.as_mut()
                    && current.pending.as_ref().is_some_and(|p| p.id == id)
                {
                    current.pending = None;
                }
                self.shared.publish(&state);
                warn!(cell, "Move was not confirmed in time");
                Err(MatchError::MoveTimedOut)
            }
        }
    }

    /// Applies one host message in the critical section.
    #[instrument(skip(self, message), fields(op = %message.op_code()))]
    pub async fn on_remote_message(&self, message: MatchMessage) {
        let mut state = self.shared.state.lock().await;
        self.shared.apply_message(&mut state, message);
        self.shared.publish(&state);
    }

    /// Leaves the match, closes the link and moves to `Closed`.
    ///
    /// Safe from any phase, concurrently with other calls, and more than once.
    #[instrument(skip(self))]
    pub async fn teardown(&self) {
        {
            let mut state = self.shared.state.lock().await;
            if state.phase == MatchPhase::Closed {
                debug!("Already closed");
                return;
            }
            if let (Some(sender), Some(_)) = (&state.sender, &state.current) {
                let _ = sender.send(Frame::Leave);
            }
            state.transition(MatchPhase::Closed);
            state.current = None;
            state.sender = None;
            state.grace_deadline = None;
            self.shared.publish(&state);
        }

        self.shared.cancel.cancel();
        let handle = self.shared.driver.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "Session driver ended abnormally");
        }
        info!("Session closed");
    }
}

/// Validates and sends a move intent. Returns the intent id and its settle channel.
fn begin_intent(
    state: &mut SessionState,
    cell: usize,
) -> Result<(u64, oneshot::Receiver<MoveResolution>), MatchError> {
    match state.phase {
        MatchPhase::Closed => return Err(MatchError::SessionClosed),
        MatchPhase::Ended(_) => return Err(MatchError::MatchAlreadyEnded),
        MatchPhase::InProgress => {}
        other => return Err(MatchError::NotInProgress(other)),
    }

    let phase = state.phase;
    let sender = state.sender.clone();
    let id = state.next_intent_id;
    let current = state
        .current
        .as_mut()
        .ok_or(MatchError::NotInProgress(phase))?;

    if current.pending.is_some() {
        return Err(MatchError::MoveAlreadyPending);
    }
    let mark = *current.info.local_mark();
    if current.turn != mark {
        return Err(MatchError::RuleViolation(
            strictly_tictactoe::Rejection::OutOfTurn {
                expected: current.turn,
                attempted: mark,
            },
        ));
    }
    let prediction = apply_move(&current.board, cell, mark)?;

    let raw = encode(&MatchMessage::MoveIntent(MoveIntent::new(cell)))
        .map_err(TransportError::from)?;
    sender
        .ok_or(TransportError::NotConnected)?
        .send(Frame::data(current.info.match_id().clone(), raw))?;

    let (tx, rx) = oneshot::channel();
    current.pending = Some(Pending {
        id,
        intent: Intent {
            cell_index: cell,
            mark,
            submitted_at: Instant::now(),
        },
        prediction,
        resolve: tx,
    });
    state.next_intent_id += 1;
    debug!(cell, "Intent sent");
    Ok((id, rx))
}

/// Opens a link, requests a seat and waits for JOIN_ACK or a refusal.
async fn seat<C: Connector>(
    link: &mut TransportSession<C>,
    mode: &MatchMode,
    timings: SessionTimings,
) -> Result<(MatchInfo, Inbound), MatchError> {
    let mut inbound = link.connect().await?;
    link.send(mode.request())?;

    let wait = async {
        loop {
            match inbound.next().await {
                Some(TransportEvent::Message(Frame::Data {
                    match_id,
                    op_code,
                    payload,
                })) => match decode(&RawMessage { op_code, payload }) {
                    Ok(MatchMessage::JoinAck(ack)) => {
                        return Ok(MatchInfo::new(match_id, ack.assigned_mark));
                    }
                    Ok(other) => debug!(op = %other.op_code(), "Ignoring message before JOIN_ACK"),
                    Err(e) => warn!(error = %e, "Dropping malformed message"),
                },
                Some(TransportEvent::Message(Frame::Rejected { reason })) => {
                    return Err(MatchError::MatchUnavailable(reason));
                }
                Some(TransportEvent::Message(other)) => {
                    debug!(kind = other.kind(), "Ignoring frame before JOIN_ACK");
                }
                Some(TransportEvent::Malformed(e)) => warn!(error = %e, "Dropping malformed frame"),
                Some(TransportEvent::Disconnected(reason)) => {
                    return Err(MatchError::from(TransportError::ConnectFailed(format!(
                        "link ended before seating: {}",
                        reason
                    ))));
                }
                None => return Err(MatchError::from(TransportError::ConnectionLost)),
            }
        }
    };

    let info = tokio::time::timeout(timings.link.connect_timeout, wait)
        .await
        .map_err(|_| MatchError::MatchUnavailable("host did not seat us in time".to_string()))??;
    Ok((info, inbound))
}

/// Consumes inbound events until the session ends or is torn down.
async fn drive<C: Connector>(
    shared: Arc<Shared<C>>,
    mut link: TransportSession<C>,
    mut inbound: Inbound,
) {
    loop {
        let grace = shared.state.lock().await.grace_deadline;

        let event = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = sleep_until(grace) => {
                shared.expire_grace().await;
                continue;
            }
            event = inbound.next() => event,
        };

        match event {
            Some(TransportEvent::Message(frame)) => shared.on_frame(frame).await,
            Some(TransportEvent::Malformed(e)) => warn!(error = %e, "Dropping malformed frame"),
            Some(TransportEvent::Disconnected(reason)) => {
                if !recover(&shared, &mut link, &mut inbound, reason).await {
                    break;
                }
            }
            None => {
                if !recover(&shared, &mut link, &mut inbound, DisconnectReason::Io).await {
                    break;
                }
            }
        }
    }

    link.disconnect().await;
    debug!("Session driver finished");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Returns true when a fresh link is in place.
async fn recover<C: Connector>(
    shared: &Arc<Shared<C>>,
    link: &mut TransportSession<C>,
    inbound: &mut Inbound,
    reason: DisconnectReason,
) -> bool {
    match shared.on_link_lost(reason).await {
        LinkPlan::Stop => false,
        LinkPlan::Reconnect => match reconnect(shared, link).await {
            Some(fresh) => {
                *inbound = fresh;
                true
            }
            None => false,
        },
    }
}

/// Re-authenticates and re-joins the same match with exponential backoff.
#[instrument(skip(shared, link))]
async fn reconnect<C: Connector>(
    shared: &Arc<Shared<C>>,
    link: &mut TransportSession<C>,
) -> Option<Inbound> {
    let mut delay = shared.timings.reconnect_backoff;

    loop {
        let match_id = {
            let mut state = shared.state.lock().await;
            if state.phase != MatchPhase::Reconnecting {
                return None;
            }
            if state.reconnects_used >= shared.timings.reconnect_attempts {
                state.end(Outcome::Aborted, "Connection to host lost");
                shared.publish(&state);
                return None;
            }
            state.reconnects_used += 1;
            let match_id = state.current.as_ref().map(|m| m.info.match_id().clone());
            info!(
                attempt = state.reconnects_used,
                delay = ?delay,
                "Scheduling reconnect"
            );
            match_id?
        };

        tokio::select! {
            _ = shared.cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }
        delay = delay.saturating_mul(2);

        let attempt = tokio::select! {
            _ = shared.cancel.cancelled() => return None,
            result = rejoin(link, &match_id) => result,
        };
        match attempt {
            Ok(inbound) => {
                let mut state = shared.state.lock().await;
                if state.phase != MatchPhase::Reconnecting {
                    return None;
                }
                state.sender = link.sender().ok();
                shared.publish(&state);
                info!(match_id = %match_id, "Link restored; waiting for JOIN_ACK");
                return Some(inbound);
            }
            Err(e) => warn!(error = %e, "Reconnect attempt failed"),
        }
    }
}

async fn rejoin<C: Connector>(
    link: &mut TransportSession<C>,
    match_id: &str,
) -> Result<Inbound, TransportError> {
    let inbound = link.connect().await?;
    link.send(Frame::Join {
        match_id: match_id.to_string(),
    })?;
    Ok(inbound)
}

impl<C> Shared<C> {
    fn publish(&self, state: &SessionState) {
        self.view.send_replace(state.snapshot());
    }

    async fn on_frame(&self, frame: Frame) {
        let mut state = self.state.lock().await;
        match frame {
            Frame::Data {
                match_id,
                op_code,
                payload,
            } => {
                let ours = state
                    .current
                    .as_ref()
                    .is_some_and(|m| *m.info.match_id() == match_id);
                if !ours {
                    debug!(%match_id, "Ignoring message for another match");
                    return;
                }
                match decode(&RawMessage { op_code, payload }) {
                    Ok(message) => self.apply_message(&mut state, message),
                    Err(e) => {
                        warn!(error = %e, "Dropping malformed message");
                        return;
                    }
                }
            }
            Frame::Rejected { reason } if state.phase == MatchPhase::Reconnecting => {
                warn!(%reason, "Host refused rejoin");
                state.end(Outcome::Aborted, reason);
            }
            other => {
                debug!(kind = other.kind(), "Ignoring frame");
                return;
            }
        }
        self.publish(&state);
    }

    fn apply_message(&self, state: &mut SessionState, message: MatchMessage) {
        match message {
            MatchMessage::JoinAck(ack) => {
                if state.phase == MatchPhase::Reconnecting {
                    let started = state.current.as_ref().is_some_and(|m| m.started);
                    state.reconnects_used = 0;
                    state.transition(if started {
                        MatchPhase::InProgress
                    } else {
                        MatchPhase::Connected
                    });
                    info!(mark = %ack.assigned_mark, "Rejoined match");
                } else {
                    debug!("Duplicate JOIN_ACK");
                }
            }
            MatchMessage::StateUpdate(update) => {
                if !matches!(
                    state.phase,
                    MatchPhase::Connected | MatchPhase::InProgress | MatchPhase::Reconnecting
                ) {
                    debug!(phase = %state.phase, "Ignoring STATE_UPDATE");
                    return;
                }
                let Some(current) = state.current.as_mut() else {
                    return;
                };
                if current.apply_update(update) && state.phase == MatchPhase::Connected {
                    state.transition(MatchPhase::InProgress);
                }
            }
            MatchMessage::MatchEnd(end) => {
                if state.phase.is_terminal() {
                    debug!("Ignoring MATCH_END after end");
                    return;
                }
                state.end(end.outcome, end.outcome.to_string());
            }
            MatchMessage::PresenceChange(change) => {
                if state.user_id.as_deref() == Some(change.player_id.as_str()) {
                    debug!("Own presence change");
                    return;
                }
                if change.joined {
                    if state.grace_deadline.take().is_some() {
                        info!(player = %change.player_id, "Opponent returned");
                    }
                } else if state.phase == MatchPhase::InProgress && state.grace_deadline.is_none()
                {
                    info!(
                        player = %change.player_id,
                        grace = ?self.timings.presence_grace,
                        "Opponent left; waiting for return"
                    );
                    state.grace_deadline = Some(Instant::now() + self.timings.presence_grace);
                }
            }
            MatchMessage::MoveIntent(_) => warn!("Host sent MOVE_INTENT; ignoring"),
        }
    }

    async fn expire_grace(&self) {
        let mut state = self.state.lock().await;
        let expired = state
            .grace_deadline
            .is_some_and(|deadline| deadline <= Instant::now());
        if !expired {
            return;
        }
        state.grace_deadline = None;
        if state.phase == MatchPhase::InProgress {
            warn!("Opponent did not return");
            state.end(Outcome::Aborted, "Opponent left the match");
        }
        self.publish(&state);
    }

    async fn on_link_lost(&self, reason: DisconnectReason) -> LinkPlan {
        let mut state = self.state.lock().await;
        state.sender = None;
        let plan = match state.phase {
            MatchPhase::Connected | MatchPhase::InProgress | MatchPhase::Reconnecting => {
                warn!(%reason, "Link lost mid-match");
                state.fail_pending();
                if self.timings.reconnect_attempts == 0 {
                    state.end(Outcome::Aborted, format!("Connection lost: {}", reason));
                    LinkPlan::Stop
                } else {
                    state.transition(MatchPhase::Reconnecting);
                    LinkPlan::Reconnect
                }
            }
            _ => {
                debug!(%reason, phase = %state.phase, "Link ended");
                LinkPlan::Stop
            }
        };
        self.publish(&state);
        plan
    }
}
