// Direct channel negotiation as seen by one peer
// The host always offers, so there is exactly one initiator. Candidates that
// arrive before the remote description are held back until it is applied.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::network::client::DirectCommand;
use crate::network::protocol::{HandshakePayload, PayloadKind, Role};

#[derive(Debug)]
pub struct Handshake {
    role: Role,
    started_at: Instant,
    timeout: Duration,
    local_description_sent: bool,
    remote_description_set: bool,
    peer_connected: bool,
    channel_open: bool,
    pending_candidates: Vec<String>,
}

impl Handshake {
    pub fn new(role: Role, now: Instant, timeout: Duration) -> Self {
        Self {
            role,
            started_at: now,
            timeout,
            local_description_sent: false,
            remote_description_set: false,
            peer_connected: false,
            channel_open: false,
            pending_candidates: Vec::new(),
        }
    }

    /// First command right after pairing: the host opens the channel, the guest waits
    pub fn begin(&self) -> Option<DirectCommand> {
        match self.role {
            Role::Host => Some(DirectCommand::CreateOffer),
            Role::Guest => None,
        }
    }

    /// Apply a relayed payload, returning what the direct channel should do with it
    pub fn on_remote(&mut self, payload: HandshakePayload) -> Vec<DirectCommand> {
        let expected = match self.role {
            Role::Host => PayloadKind::Answer,
            Role::Guest => PayloadKind::Offer,
        };

        match payload.kind {
            PayloadKind::Candidate => {
                if self.remote_description_set {
                    vec![DirectCommand::AddRemoteCandidate(payload.blob)]
                } else {
                    debug!("Buffering early remote candidate");
                    self.pending_candidates.push(payload.blob);
                    Vec::new()
                }
            }
            kind if kind != expected => {
                warn!(role = ?self.role, ?kind, "Ignoring description meant for the other role");
                Vec::new()
            }
            _ if self.remote_description_set => {
                debug!("Ignoring repeated remote description");
                Vec::new()
            }
            kind => {
                self.remote_description_set = true;
                let first = match kind {
                    PayloadKind::Offer => DirectCommand::AcceptOffer(payload.blob),
                    _ => DirectCommand::AcceptAnswer(payload.blob),
                };
                std::iter::once(first)
                    .chain(
                        self.pending_candidates
                            .drain(..)
                            .map(DirectCommand::AddRemoteCandidate),
                    )
                    .collect()
            }
        }
    }

    pub fn on_local_description(&mut self) {
        self.local_description_sent = true;
    }

    pub fn on_peer_connected(&mut self) {
        self.peer_connected = true;
    }

    pub fn on_channel_open(&mut self) {
        self.channel_open = true;
    }

    /// Both descriptions set, a route confirmed and the channel open
    pub fn is_complete(&self) -> bool {
        self.local_description_sent
            && self.remote_description_set
            && self.peer_connected
            && self.channel_open
    }

    pub fn timed_out(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started_at) >= self.timeout
    }

    #[cfg(test)]
    fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
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

    #[test]
    fn test_host_offers_guest_waits() {
        let now = Instant::now();
        let timeout = Duration::from_secs(10);
        assert_eq!(
            Handshake::new(Role::Host, now, timeout).begin(),
            Some(DirectCommand::CreateOffer)
        );
        assert_eq!(Handshake::new(Role::Guest, now, timeout).begin(), None);
    }

    #[test]
    fn test_early_candidates_flushed_after_offer() {
        let mut handshake = Handshake::new(Role::Guest, Instant::now(), Duration::from_secs(10));

        assert!(handshake
            .on_remote(payload(PayloadKind::Candidate, "c1"))
            .is_empty());
        assert!(handshake
            .on_remote(payload(PayloadKind::Candidate, "c2"))
            .is_empty());
        assert_eq!(handshake.pending_candidates(), 2);

        let commands = handshake.on_remote(payload(PayloadKind::Offer, "offer"));
        assert_eq!(
            commands,
            vec![
                DirectCommand::AcceptOffer("offer".to_string()),
                DirectCommand::AddRemoteCandidate("c1".to_string()),
                DirectCommand::AddRemoteCandidate("c2".to_string()),
            ]
        );
        assert_eq!(handshake.pending_candidates(), 0);

        // Later candidates go straight through
        assert_eq!(
            handshake.on_remote(payload(PayloadKind::Candidate, "c3")),
            vec![DirectCommand::AddRemoteCandidate("c3".to_string())]
        );
    }

    #[test]
    fn test_wrong_role_and_repeat_descriptions_ignored() {
        let mut host = Handshake::new(Role::Host, Instant::now(), Duration::from_secs(10));
        assert!(host.on_remote(payload(PayloadKind::Offer, "glare")).is_empty());
        assert_eq!(host.on_remote(payload(PayloadKind::Answer, "a")).len(), 1);
        assert!(host.on_remote(payload(PayloadKind::Answer, "a")).is_empty());
    }

    #[test]
    fn test_complete_needs_every_step() {
        let start = Instant::now();
        let mut handshake = Handshake::new(Role::Host, start, Duration::from_secs(10));
        handshake.on_local_description();
        handshake.on_remote(payload(PayloadKind::Answer, "a"));
        handshake.on_channel_open();
        assert!(!handshake.is_complete());
        handshake.on_peer_connected();
        assert!(handshake.is_complete());

        assert!(!handshake.timed_out(start + Duration::from_secs(9)));
        assert!(handshake.timed_out(start + Duration::from_secs(10)));
    }
}
