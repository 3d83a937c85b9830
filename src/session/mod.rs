//! Online match session: lifecycle, optimistic moves and reconciliation.

mod controller;
mod phase;
mod state;

pub use controller::MatchSession;
pub use phase::{Intent, MatchInfo, MatchMode, MatchPhase, MatchSnapshot, MoveResolution};

use crate::transport::LinkOptions;
use std::time::Duration;

/// Timeouts and retry policy for a [`MatchSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    /// How long a move waits for STATE_UPDATE.
    pub move_timeout: Duration,
    /// How long an absent opponent is awaited.
    pub presence_grace: Duration,
    /// Reconnect attempts after an unexpected drop.
    pub reconnect_attempts: u32,
    /// First reconnect delay; doubled per attempt.
    pub reconnect_backoff: Duration,
    /// Link timings used for every (re)connect.
    pub link: LinkOptions,
}

impl Default for SessionTimings {
    fn default() -> Self {
        crate::ClientConfig::default().timings()
    }
}
