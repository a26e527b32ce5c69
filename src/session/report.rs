// Match outcomes and result recording
// Only one peer should write a result. The host records at a normal finish
// and acknowledges with match_saved; the guest records only if no ack arrives.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::ResultSaveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Me,
    Opponent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeReason {
    /// Someone reached the win score
    Completed,
    /// Opponent sent a voluntary quit
    OpponentQuit,
    /// Opponent's channel died without a word
    ConnectionLost,
    /// This player left mid-match (quit or interrupted run)
    Abandoned,
}

impl OutcomeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeReason::Completed => "completed",
            OutcomeReason::OpponentQuit => "opponent_quit",
            OutcomeReason::ConnectionLost => "connection_lost",
            OutcomeReason::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub winner: Winner,
    pub my_score: u8,
    pub opponent_score: u8,
    pub reason: OutcomeReason,
    pub opponent_name: String,
    pub duration_secs: u64,
}

impl MatchOutcome {
    /// Player-facing summary. Failures read as outcomes, never as errors.
    pub fn headline(&self) -> String {
        match (self.reason, self.winner) {
            (OutcomeReason::Completed, Winner::Me) => "You win!".to_string(),
            (OutcomeReason::Completed, Winner::Opponent) => format!("{} wins", self.opponent_name),
            (OutcomeReason::OpponentQuit, _) => format!("{} quit, you win", self.opponent_name),
            (OutcomeReason::ConnectionLost, _) => "Your opponent disconnected, you win".to_string(),
            (OutcomeReason::Abandoned, _) => format!("{} wins by forfeit", self.opponent_name),
        }
    }

    pub fn score_line(&self) -> String {
        format!("{} - {}", self.my_score, self.opponent_score)
    }
}

/// Where match results end up. Stats persistence lives outside this crate.
pub trait MatchService {
    fn record_remote_result(
        &mut self,
        opponent_user_id: &str,
        my_score: u8,
        opponent_score: u8,
        duration_secs: u64,
    ) -> Result<(), ResultSaveError>;
}

/// Default service for the terminal client: results only go to the log
#[derive(Debug, Default)]
pub struct LoggingMatchService;

impl MatchService for LoggingMatchService {
    fn record_remote_result(
        &mut self,
        opponent_user_id: &str,
        my_score: u8,
        opponent_score: u8,
        duration_secs: u64,
    ) -> Result<(), ResultSaveError> {
        info!(
            opponent_user_id,
            my_score, opponent_score, duration_secs, "Match result recorded"
        );
        Ok(())
    }
}

#[derive(Debug)]
enum ReportState {
    Idle,
    AwaitingAck {
        deadline: Instant,
        outcome: MatchOutcome,
    },
    Done,
}

/// Decides whether this peer writes the match result, at most once
#[derive(Debug)]
pub struct ResultReporter {
    opponent_user_id: Option<String>,
    state: ReportState,
}

impl ResultReporter {
    pub fn new(opponent_user_id: Option<String>) -> Self {
        Self {
            opponent_user_id,
            state: ReportState::Idle,
        }
    }

    /// Record right away. Returns true if a result was saved.
    pub fn record_now(&mut self, service: &mut dyn MatchService, outcome: &MatchOutcome) -> bool {
        if matches!(self.state, ReportState::Done) {
            return false;
        }
        self.state = ReportState::Done;
        self.save(service, outcome)
    }

    /// Guest side of a normal finish: wait for the host's ack until `deadline`
    pub fn await_ack(&mut self, outcome: MatchOutcome, deadline: Instant) {
        if matches!(self.state, ReportState::Idle) {
            self.state = ReportState::AwaitingAck { deadline, outcome };
        }
    }

    /// The opponent saved the result; don't write it again
    pub fn acknowledge(&mut self) {
        if let ReportState::AwaitingAck { .. } = self.state {
            debug!("Result saved by opponent, skipping local save");
        }
        self.state = ReportState::Done;
    }

    /// Save once the ack deadline has passed
    pub fn poll(&mut self, now: Instant, service: &mut dyn MatchService) {
        if let ReportState::AwaitingAck { deadline, .. } = &self.state {
            if now >= *deadline {
                self.flush(service);
            }
        }
    }

    /// Session is going away: a pending save happens now
    pub fn flush(&mut self, service: &mut dyn MatchService) {
        if let ReportState::AwaitingAck { outcome, .. } =
            std::mem::replace(&mut self.state, ReportState::Done)
        {
            debug!("No save ack from opponent, saving locally");
            self.save(service, &outcome);
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, ReportState::AwaitingAck { .. })
    }

    fn save(&self, service: &mut dyn MatchService, outcome: &MatchOutcome) -> bool {
        let Some(user_id) = self.opponent_user_id.as_deref() else {
            debug!("Opponent has no user id, result not recorded");
            return false;
        };
        match service.record_remote_result(
            user_id,
            outcome.my_score,
            outcome.opponent_score,
            outcome.duration_secs,
        ) {
            Ok(()) => true,
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }
}
