// Guest-side mirror of the host's simulation
// Snapshots are applied verbatim, no interpolation. The channel is unordered,
// so a snapshot older than the one already shown is dropped.

use tracing::trace;

use crate::game::{Direction, GameSnapshot, InputOrigin, InputSample};
use crate::network::protocol::PeerMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Updated,
    Stale,
}

#[derive(Debug, Default)]
pub struct MirrorApplier {
    latest: Option<GameSnapshot>,
}

impl MirrorApplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, snapshot: GameSnapshot) -> Applied {
        if let Some(current) = &self.latest {
            if snapshot.tick < current.tick {
                trace!(
                    tick = snapshot.tick,
                    current = current.tick,
                    "Dropping out-of-order snapshot"
                );
                return Applied::Stale;
            }
        }
        self.latest = Some(snapshot);
        Applied::Updated
    }

    pub fn latest(&self) -> Option<&GameSnapshot> {
        self.latest.as_ref()
    }

    /// This tick's input for the host. Sent every tick, changed or not.
    pub fn input_message(direction: Direction) -> PeerMessage {
        PeerMessage::PlayerInput {
            input: InputSample::new(direction, InputOrigin::GuestForwarded).flags(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhysicsConfig;
    use crate::network::protocol::GameSettings;
    use crate::session::authority::AuthorityLoop;

    fn snapshots(n: usize) -> Vec<GameSnapshot> {
        let mut authority = AuthorityLoop::pong(&GameSettings::default(), &PhysicsConfig::default());
        (0..n).map(|_| authority.step(Direction::Down)).collect()
    }

    #[test]
    fn test_applying_twice_is_same_as_once() {
        let snaps = snapshots(3);
        let mut once = MirrorApplier::new();
        let mut twice = MirrorApplier::new();

        once.apply(snaps[2].clone());
        twice.apply(snaps[2].clone());
        assert_eq!(twice.apply(snaps[2].clone()), Applied::Updated);

        assert_eq!(once.latest(), twice.latest());
    }

    #[test]
    fn test_older_snapshot_dropped() {
        let snaps = snapshots(3);
        let mut mirror = MirrorApplier::new();
        mirror.apply(snaps[2].clone());
        assert_eq!(mirror.apply(snaps[0].clone()), Applied::Stale);
        assert_eq!(mirror.latest(), Some(&snaps[2]));
    }

    #[test]
    fn test_input_message_shape() {
        match MirrorApplier::input_message(Direction::Up) {
            PeerMessage::PlayerInput { input } => {
                assert!(input.up);
                assert!(!input.down);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }
}
