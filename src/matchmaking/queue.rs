// FIFO matchmaking queue
// Not internally locked: the coordinator owns it behind a single mutex so
// a join and its pairing happen as one step.

use std::collections::VecDeque;
use std::time::Instant;

use tracing::{debug, info};

use crate::error::QueueError;
use crate::network::protocol::{GameSettings, MatchId, OpponentInfo, PeerId};

/// Identifies one websocket connection, so a stale connection can't evict its replacement
pub type ConnId = u64;

#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub peer_id: PeerId,
    pub username: String,
    pub user_id: Option<String>,
    pub settings: GameSettings,
    pub enqueued_at: Instant,
    pub conn_id: ConnId,
}

impl QueueEntry {
    pub fn opponent_info(&self) -> OpponentInfo {
        OpponentInfo {
            id: self.peer_id.clone(),
            username: self.username.clone(),
            user_id: self.user_id.clone(),
        }
    }
}

/// Two entries taken out of the queue together. First-in is the host.
#[derive(Debug, Clone)]
pub struct Pairing {
    pub match_id: MatchId,
    pub host: QueueEntry,
    pub guest: QueueEntry,
}

#[derive(Debug, Clone)]
pub enum JoinOutcome {
    Enqueued { position: usize },
    /// Same peer id was already waiting; its entry was updated in place
    Replaced { position: usize },
    Paired(Pairing),
}

#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    waiting: VecDeque<QueueEntry>,
    next_match: u64,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a player and pair the two oldest entries if possible
    pub fn join(&mut self, entry: QueueEntry) -> JoinOutcome {
        if let Some(index) = self.position_of(&entry.peer_id) {
            debug!(peer_id = %entry.peer_id, "Duplicate join, replacing queued entry");
            self.waiting[index] = entry;
            return JoinOutcome::Replaced {
                position: index + 1,
            };
        }

        info!(peer_id = %entry.peer_id, username = %entry.username, "Player joined queue");
        self.waiting.push_back(entry);

        match self.try_pair() {
            Some(pairing) => JoinOutcome::Paired(pairing),
            None => JoinOutcome::Enqueued {
                position: self.waiting.len(),
            },
        }
    }

    pub fn leave(&mut self, peer_id: &str) -> Result<(), QueueError> {
        let index = self
            .position_of(peer_id)
            .ok_or_else(|| QueueError::NotQueued(peer_id.to_string()))?;
        self.waiting.remove(index);
        info!(peer_id, "Player left queue");
        Ok(())
    }

    /// Drop the entry only if it still belongs to this connection.
    /// Returns true if something was removed.
    pub fn remove_connection(&mut self, peer_id: &str, conn_id: ConnId) -> bool {
        match self.position_of(peer_id) {
            Some(index) if self.waiting[index].conn_id == conn_id => {
                self.waiting.remove(index);
                debug!(peer_id, "Removed queued player after disconnect");
                true
            }
            _ => false,
        }
    }

    fn try_pair(&mut self) -> Option<Pairing> {
        if self.waiting.len() < 2 {
            return None;
        }
        let host = self.waiting.pop_front()?;
        let guest = self.waiting.pop_front()?;

        self.next_match += 1;
        let match_id = format!("match-{}-{}", self.next_match, host.peer_id);
        info!(
            match_id = %match_id,
            host = %host.peer_id,
            guest = %guest.peer_id,
            "Paired players"
        );

        Some(Pairing {
            match_id,
            host,
            guest,
        })
    }

    fn position_of(&self, peer_id: &str) -> Option<usize> {
        self.waiting.iter().position(|e| e.peer_id == peer_id)
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.position_of(peer_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(peer_id: &str, conn_id: ConnId) -> QueueEntry {
        QueueEntry {
            peer_id: peer_id.to_string(),
            username: peer_id.to_uppercase(),
            user_id: None,
            settings: GameSettings::default(),
            enqueued_at: Instant::now(),
            conn_id,
        }
    }

    #[test]
    fn test_pairs_oldest_two_first_in_hosts() {
        let mut queue = MatchmakingQueue::new();
        assert!(matches!(
            queue.join(entry("a", 1)),
            JoinOutcome::Enqueued { position: 1 }
        ));

        match queue.join(entry("b", 2)) {
            JoinOutcome::Paired(pairing) => {
                assert_eq!(pairing.host.peer_id, "a");
                assert_eq!(pairing.guest.peer_id, "b");
            }
            other => panic!("expected pairing, got {:?}", other),
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_duplicate_join_replaces_in_place() {
        let mut queue = MatchmakingQueue::new();
        queue.join(entry("a", 1));
        let mut again = entry("a", 2);
        again.settings.win_score = 9;

        assert!(matches!(
            queue.join(again),
            JoinOutcome::Replaced { position: 1 }
        ));
        assert_eq!(queue.len(), 1);

        // The superseded connection dropping must not evict the replacement
        assert!(!queue.remove_connection("a", 1));
        assert!(queue.contains("a"));
        assert!(queue.remove_connection("a", 2));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_leave_not_queued() {
        let mut queue = MatchmakingQueue::new();
        assert_eq!(
            queue.leave("ghost"),
            Err(QueueError::NotQueued("ghost".to_string()))
        );
        queue.join(entry("a", 1));
        assert!(queue.leave("a").is_ok());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_fifo_never_pairs_twice() {
        let mut queue = MatchmakingQueue::new();
        let mut paired: Vec<String> = Vec::new();

        // Interleave joins and leaves
        let ops: [(&str, bool); 9] = [
            ("a", true),
            ("b", false),
            ("b", true),
            ("c", true),
            ("d", true),
            ("e", true),
            ("e", false),
            ("f", true),
            ("g", true),
        ];
        for (conn, (peer, join)) in ops.iter().enumerate() {
            if *join {
                if let JoinOutcome::Paired(p) = queue.join(entry(peer, conn as ConnId)) {
                    paired.push(p.host.peer_id);
                    paired.push(p.guest.peer_id);
                }
            } else {
                let _ = queue.leave(peer);
            }
        }

        assert_eq!(paired, vec!["a", "b", "c", "d", "f", "g"]);
        let mut unique = paired.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), paired.len());
    }
}
