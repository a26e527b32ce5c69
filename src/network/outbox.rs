// Bounded send buffer between the game loop and the peer thread
// When the peer can't keep up, the oldest queued snapshot or input is dropped.
// Control messages (settings, ready, quit, save ack) are never dropped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::protocol::PeerMessage;

#[derive(Debug, Clone)]
pub struct Outbox {
    inner: Arc<Mutex<VecDeque<PeerMessage>>>,
    capacity: usize,
}

impl Outbox {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Queue a message. Returns true if a per-tick message was dropped to make room.
    pub fn push(&self, msg: PeerMessage) -> bool {
        let mut queue = match self.inner.lock() {
            Ok(queue) => queue,
            Err(poisoned) => poisoned.into_inner(),
        };

        if queue.len() < self.capacity {
            queue.push_back(msg);
            return false;
        }

        if let Some(index) = queue.iter().position(PeerMessage::is_per_tick) {
            queue.remove(index);
            debug!("Outbox full, dropped oldest per-tick message");
            queue.push_back(msg);
            true
        } else if msg.is_per_tick() {
            // Nothing but control messages queued; the new tick loses
            debug!("Outbox full of control messages, dropped new per-tick message");
            true
        } else {
            queue.push_back(msg);
            false
        }
    }

    /// Take everything queued, oldest first
    pub fn drain(&self) -> Vec<PeerMessage> {
        let mut queue = match self.inner.lock() {
            Ok(queue) => queue,
            Err(poisoned) => poisoned.into_inner(),
        };
        queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhysicsConfig;
    use crate::game::InputFlags;
    use crate::network::protocol::GameSettings;
    use crate::session::AuthorityLoop;

    fn update(tick: usize) -> PeerMessage {
        let mut authority =
            AuthorityLoop::pong(&GameSettings::default(), &PhysicsConfig::default());
        for _ in 0..tick {
            authority.step(crate::game::Direction::Neutral);
        }
        PeerMessage::GameUpdate {
            state: authority.snapshot(),
        }
    }

    fn quit() -> PeerMessage {
        PeerMessage::VoluntaryDisconnect {
            player_id: "alice".to_string(),
            reason: "voluntary_quit".to_string(),
            timestamp: 1,
        }
    }

    #[test]
    fn test_drops_oldest_update_when_full() {
        let outbox = Outbox::new(3);
        for tick in 0..3 {
            assert!(!outbox.push(update(tick)));
        }
        assert!(outbox.push(update(3)));
        assert_eq!(outbox.len(), 3);

        let drained = outbox.drain();
        assert_eq!(drained, vec![update(1), update(2), update(3)]);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_control_message_survives_a_flood_of_updates() {
        let outbox = Outbox::new(8);
        outbox.push(quit());
        for tick in 0..8 {
            outbox.push(update(tick));
        }
        outbox.push(PeerMessage::PlayerInput {
            input: InputFlags { up: true, down: false },
        });

        let drained = outbox.drain();
        assert_eq!(drained.len(), 8);
        assert_eq!(drained[0], quit());
        assert!(drained[1..].iter().all(PeerMessage::is_per_tick));
    }

    #[test]
    fn test_control_messages_are_never_dropped() {
        let outbox = Outbox::new(2);
        outbox.push(PeerMessage::PlayerReady);
        outbox.push(quit());
        assert!(outbox.push(update(0)));
        assert!(!outbox.push(PeerMessage::MatchSaved {
            player_id: "alice".to_string(),
            timestamp: 2,
        }));

        let drained = outbox.drain();
        assert_eq!(drained.len(), 3);
        assert!(!drained.iter().any(PeerMessage::is_per_tick));
    }

    #[test]
    fn test_clones_share_queue() {
        let producer = Outbox::new(8);
        let consumer = producer.clone();
        producer.push(PeerMessage::PlayerReady);
        assert_eq!(consumer.drain(), vec![PeerMessage::PlayerReady]);
    }
}
