// Handles the session uses to talk to its two transports
// Each transport runs on its own thread; the session sees commands going out
// and events coming back over std channels, polled once per frame.

use std::sync::mpsc;

use super::outbox::Outbox;
use super::protocol::{PayloadKind, PeerMessage, RendezvousMessage};
use crate::config::NetworkConfig;
use crate::error::LinkError;

/// Commands for the direct peer channel thread
#[derive(Debug, Clone, PartialEq)]
pub enum DirectCommand {
    /// Host: open the data channel and produce an offer
    CreateOffer,

    /// Guest: apply the host's offer and produce an answer
    AcceptOffer(String),

    /// Host: apply the guest's answer
    AcceptAnswer(String),

    AddRemoteCandidate(String),

    Send(PeerMessage),

    Close,
}

/// Events from the direct peer channel thread
#[derive(Debug, Clone, PartialEq)]
pub enum DirectEvent {
    /// Offer or answer ready to be relayed
    LocalDescription(PayloadKind, String),

    LocalCandidate(String),

    /// ICE and DTLS are up
    Connected,

    ChannelOpen,

    Message(PeerMessage),

    Closed,

    Error(String),
}

/// Events from the rendezvous websocket thread
#[derive(Debug, Clone, PartialEq)]
pub enum RendezvousEvent {
    Connected,
    Message(RendezvousMessage),
    Closed,
    Error(String),
}

/// Outbound half of the client <-> coordinator connection
pub trait RendezvousLink {
    fn send(&self, msg: RendezvousMessage) -> Result<(), LinkError>;

    fn close(&self);
}

/// Outbound half of the direct peer channel
pub trait DirectLink {
    fn command(&self, cmd: DirectCommand) -> Result<(), LinkError>;
}

/// Handle to a running peer channel thread
pub struct DirectChannel {
    cmd_tx: mpsc::Sender<DirectCommand>,
    outbox: Outbox,
}

impl DirectChannel {
    pub fn new(cmd_tx: mpsc::Sender<DirectCommand>, outbox: Outbox) -> Self {
        Self { cmd_tx, outbox }
    }

    /// Start the peer thread (local address discovery, STUN) and hand back its handle
    pub fn spawn(config: &NetworkConfig) -> std::io::Result<(Self, mpsc::Receiver<DirectEvent>)> {
        let (event_tx, event_rx) = mpsc::channel();
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let outbox = Outbox::new(config.outbox_capacity);

        super::webrtc_runtime::spawn_peer_thread(
            config.stun_server.clone(),
            cmd_rx,
            outbox.clone(),
            event_tx,
        )?;

        Ok((Self::new(cmd_tx, outbox), event_rx))
    }
}

impl DirectLink for DirectChannel {
    fn command(&self, cmd: DirectCommand) -> Result<(), LinkError> {
        match cmd {
            // Payloads skip the command queue so a slow link sheds old snapshots
            DirectCommand::Send(msg) => {
                self.outbox.push(msg);
                Ok(())
            }
            other => self.cmd_tx.send(other).map_err(|_| LinkError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_goes_through_outbox() {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let outbox = Outbox::new(2);
        let channel = DirectChannel::new(cmd_tx, outbox.clone());

        channel
            .command(DirectCommand::Send(PeerMessage::PlayerReady))
            .unwrap();
        channel.command(DirectCommand::CreateOffer).unwrap();

        assert_eq!(outbox.drain(), vec![PeerMessage::PlayerReady]);
        assert_eq!(cmd_rx.try_recv().unwrap(), DirectCommand::CreateOffer);
        assert!(cmd_rx.try_recv().is_err());
    }

    #[test]
    fn test_command_after_thread_exit_is_closed() {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        drop(cmd_rx);
        let channel = DirectChannel::new(cmd_tx, Outbox::new(1));
        assert!(matches!(
            channel.command(DirectCommand::Close),
            Err(LinkError::Closed)
        ));
    }
}
