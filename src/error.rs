// Error taxonomy shared by the coordinator and the peer session
// Channel failures mid-match never surface here: the session turns them into a forfeit

use thiserror::Error;

use crate::session::SessionState;

/// Matchmaking queue failures. Recovered locally by the client, never shown to the player.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("player {0} is not queued")]
    NotQueued(String),
}

/// A transport handle whose worker is gone, or a rendezvous message that would not encode
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link closed")]
    Closed,

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The only failure the player sees as an error rather than an outcome
    #[error("connection failed: no direct channel within {0} seconds")]
    HandshakeTimeout(u64),

    #[error("cannot {action} while {state:?}")]
    InvalidTransition {
        state: SessionState,
        action: &'static str,
    },
}

/// Recovery record storage failures
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("recovery store I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("recovery record encoding: {0}")]
    Encode(#[from] bincode::Error),
}

/// Match result could not be written by the match service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to save match result: {0}")]
pub struct ResultSaveError(pub String);
