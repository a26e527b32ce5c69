// Handshake relay between the two peers of a match
// Payloads are routed by match id and forwarded as-is; nothing is buffered.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::network::protocol::{HandshakePayload, MatchId, PayloadKind, PeerId, RendezvousMessage, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Negotiating,
    /// An answer went through; the peers may still trickle candidates
    Active,
}

#[derive(Debug, Clone)]
pub struct RelaySession {
    pub host: PeerId,
    pub guest: PeerId,
    pub state: RelayState,
}

impl RelaySession {
    fn role_of(&self, peer_id: &str) -> Option<Role> {
        if self.host == peer_id {
            Some(Role::Host)
        } else if self.guest == peer_id {
            Some(Role::Guest)
        } else {
            None
        }
    }

    fn peer(&self, role: Role) -> &PeerId {
        match role {
            Role::Host => &self.host,
            Role::Guest => &self.guest,
        }
    }
}

#[derive(Debug, Default)]
pub struct SignalingRelay {
    sessions: HashMap<MatchId, RelaySession>,
}

impl SignalingRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, match_id: MatchId, host: PeerId, guest: PeerId) {
        debug!(match_id = %match_id, "Relay session registered");
        self.sessions.insert(
            match_id,
            RelaySession {
                host,
                guest,
                state: RelayState::Negotiating,
            },
        );
    }

    /// Work out where a payload goes. `None` means drop it silently:
    /// unknown or closed match, or a sender that isn't part of it.
    pub fn route(
        &mut self,
        match_id: &str,
        from: &str,
        payload: HandshakePayload,
    ) -> Option<(PeerId, RendezvousMessage)> {
        let session = self.sessions.get_mut(match_id)?;
        let from_role = session.role_of(from)?;

        if payload.kind == PayloadKind::Answer && session.state == RelayState::Negotiating {
            session.state = RelayState::Active;
            info!(match_id, "Handshake answered, relay session active");
        }

        let target = session.peer(from_role.opposite()).clone();
        Some((target, payload.into_message(match_id.to_string())))
    }

    /// Whether the peer is part of an open match
    pub fn is_in_match(&self, peer_id: &str) -> bool {
        self.sessions
            .values()
            .any(|s| s.role_of(peer_id).is_some())
    }

    pub fn state(&self, match_id: &str) -> Option<RelayState> {
        self.sessions.get(match_id).map(|s| s.state)
    }

    /// Close a match on behalf of a quitting peer and return the opponent to notify
    pub fn quit(&mut self, match_id: &str, from: &str) -> Option<PeerId> {
        let session = self.sessions.get(match_id)?;
        let role = session.role_of(from)?;
        let opponent = session.peer(role.opposite()).clone();
        self.sessions.remove(match_id);
        info!(match_id, peer_id = from, "Relay session closed by quit");
        Some(opponent)
    }

    /// Close every match this peer was in. Returns (match, opponent) pairs to notify.
    pub fn peer_disconnected(&mut self, peer_id: &str) -> Vec<(MatchId, PeerId)> {
        let closed: Vec<(MatchId, PeerId)> = self
            .sessions
            .iter()
            .filter_map(|(match_id, session)| {
                let role = session.role_of(peer_id)?;
                Some((match_id.clone(), session.peer(role.opposite()).clone()))
            })
            .collect();

        for (match_id, _) in &closed {
            self.sessions.remove(match_id);
            info!(match_id = %match_id, peer_id, "Relay session closed by disconnect");
        }
        closed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(kind: PayloadKind, blob: &str) -> HandshakePayload {
        HandshakePayload {
            kind,
            blob: blob.to_string(),
        }
    }

    fn relay() -> SignalingRelay {
        let mut relay = SignalingRelay::new();
        relay.register("m1".to_string(), "host".to_string(), "guest".to_string());
        relay
    }

    #[test]
    fn test_routes_to_other_role() {
        let mut relay = relay();
        let (target, msg) = relay
            .route("m1", "host", payload(PayloadKind::Offer, "v=0 offer"))
            .unwrap();
        assert_eq!(target, "guest");
        assert_eq!(
            msg,
            RendezvousMessage::WebrtcOffer {
                match_id: "m1".to_string(),
                offer: "v=0 offer".to_string(),
            }
        );
        assert_eq!(relay.state("m1"), Some(RelayState::Negotiating));

        let (target, _) = relay
            .route("m1", "guest", payload(PayloadKind::Answer, "v=0 answer"))
            .unwrap();
        assert_eq!(target, "host");
        assert_eq!(relay.state("m1"), Some(RelayState::Active));

        // Late candidates still flow while active
        assert!(relay
            .route("m1", "guest", payload(PayloadKind::Candidate, "candidate:1"))
            .is_some());
    }

    #[test]
    fn test_drops_unknown_and_outsiders() {
        let mut relay = relay();
        assert!(relay
            .route("nope", "host", payload(PayloadKind::Offer, "x"))
            .is_none());
        assert!(relay
            .route("m1", "stranger", payload(PayloadKind::Offer, "x"))
            .is_none());
    }

    #[test]
    fn test_disconnect_closes_and_reports_opponent() {
        let mut relay = relay();
        let closed = relay.peer_disconnected("guest");
        assert_eq!(closed, vec![("m1".to_string(), "host".to_string())]);
        assert!(relay.is_empty());
        assert!(relay
            .route("m1", "host", payload(PayloadKind::Candidate, "x"))
            .is_none());
    }

    #[test]
    fn test_membership_ends_with_the_match() {
        let mut relay = relay();
        assert!(relay.is_in_match("host"));
        assert!(relay.is_in_match("guest"));
        assert!(!relay.is_in_match("stranger"));

        relay.quit("m1", "guest");
        assert!(!relay.is_in_match("host"));
        assert!(!relay.is_in_match("guest"));
    }

    #[test]
    fn test_quit_closes() {
        let mut relay = relay();
        assert_eq!(relay.quit("m1", "stranger"), None);
        assert_eq!(relay.quit("m1", "host"), Some("guest".to_string()));
        assert_eq!(relay.quit("m1", "host"), None);
    }
}
