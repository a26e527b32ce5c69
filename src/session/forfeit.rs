// Disconnection and forfeit bookkeeping
// The surviving peer decides the outcome alone: it wins, win score to nil.

use std::time::{Duration, Instant};

use super::report::{MatchOutcome, OutcomeReason, Winner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForfeitTrigger {
    /// Direct channel closed under us
    ChannelClosed,
    ChannelError,
    /// Rendezvous dropped and the direct channel stayed quiet through the grace window
    RendezvousLost,
    /// No direct traffic for too long
    PeerSilent,
    /// Opponent said goodbye (direct or relayed)
    OpponentQuit,
}

impl ForfeitTrigger {
    pub fn reason(self) -> OutcomeReason {
        match self {
            ForfeitTrigger::OpponentQuit => OutcomeReason::OpponentQuit,
            _ => OutcomeReason::ConnectionLost,
        }
    }
}

/// Lets the forfeit path run once per session, whatever fires first
#[derive(Debug, Default)]
pub struct ForfeitGuard {
    fired: bool,
}

impl ForfeitGuard {
    /// True only for the first caller
    pub fn try_fire(&mut self) -> bool {
        !std::mem::replace(&mut self.fired, true)
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

pub fn forfeit_outcome(
    trigger: ForfeitTrigger,
    win_score: u8,
    opponent_name: &str,
    duration_secs: u64,
) -> MatchOutcome {
    MatchOutcome {
        winner: Winner::Me,
        my_score: win_score,
        opponent_score: 0,
        reason: trigger.reason(),
        opponent_name: opponent_name.to_string(),
        duration_secs,
    }
}

/// Outcome for the player who walks away mid-match
pub fn abandon_outcome(win_score: u8, opponent_name: &str, duration_secs: u64) -> MatchOutcome {
    MatchOutcome {
        winner: Winner::Opponent,
        my_score: 0,
        opponent_score: win_score,
        reason: OutcomeReason::Abandoned,
        opponent_name: opponent_name.to_string(),
        duration_secs,
    }
}

/// Time allowed for the direct channel to prove itself after a rendezvous loss
#[derive(Debug)]
pub struct GraceWindow {
    length: Duration,
    deadline: Option<Instant>,
}

impl GraceWindow {
    pub fn new(length: Duration) -> Self {
        Self {
            length,
            deadline: None,
        }
    }

    /// Opens the window; an open window keeps its original deadline
    pub fn start(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.length);
        }
    }

    /// Direct channel confirmed healthy
    pub fn clear(&mut self) {
        self.deadline = None;
    }

    pub fn is_open(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}

/// Tracks the last time anything arrived on the direct channel
#[derive(Debug)]
pub struct SilenceMonitor {
    limit: Duration,
    last_heard: Option<Instant>,
}

impl SilenceMonitor {
    pub fn new(limit: Duration) -> Self {
        Self {
            limit,
            last_heard: None,
        }
    }

    pub fn heard(&mut self, now: Instant) {
        self.last_heard = Some(now);
    }

    pub fn is_silent(&self, now: Instant) -> bool {
        self.last_heard
            .is_some_and(|heard| now.saturating_duration_since(heard) >= self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_fires_once() {
        let mut guard = ForfeitGuard::default();
        assert!(!guard.has_fired());
        assert!(guard.try_fire());
        assert!(!guard.try_fire());
        assert!(guard.has_fired());
    }

    #[test]
    fn test_forfeit_forces_score() {
        let outcome = forfeit_outcome(ForfeitTrigger::ChannelClosed, 5, "Bob", 30);
        assert_eq!(outcome.winner, Winner::Me);
        assert_eq!((outcome.my_score, outcome.opponent_score), (5, 0));
        assert_eq!(outcome.reason, OutcomeReason::ConnectionLost);

        let quit = forfeit_outcome(ForfeitTrigger::OpponentQuit, 3, "Bob", 30);
        assert_eq!(quit.reason, OutcomeReason::OpponentQuit);
        assert_eq!(quit.my_score, 3);
    }

    #[test]
    fn test_grace_window() {
        let start = Instant::now();
        let mut grace = GraceWindow::new(Duration::from_secs(5));
        assert!(!grace.expired(start + Duration::from_secs(60)));

        grace.start(start);
        grace.start(start + Duration::from_secs(3));
        assert!(!grace.expired(start + Duration::from_secs(4)));
        assert!(grace.expired(start + Duration::from_secs(5)));

        grace.clear();
        assert!(!grace.is_open());
        assert!(!grace.expired(start + Duration::from_secs(10)));
    }

    #[test]
    fn test_silence_needs_a_first_message() {
        let start = Instant::now();
        let mut silence = SilenceMonitor::new(Duration::from_secs(5));
        assert!(!silence.is_silent(start + Duration::from_secs(100)));

        silence.heard(start);
        assert!(!silence.is_silent(start + Duration::from_millis(4999)));
        assert!(silence.is_silent(start + Duration::from_secs(5)));
    }
}
