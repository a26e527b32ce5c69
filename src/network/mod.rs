// Networking for pongmatch
// Rendezvous websocket to the coordinator, direct WebRTC data channel to the opponent

pub mod client;
pub mod outbox;
pub mod protocol;
pub mod rendezvous;
pub mod webrtc_runtime;

pub use client::{
    DirectChannel, DirectCommand, DirectEvent, DirectLink, RendezvousEvent, RendezvousLink,
};
pub use outbox::Outbox;
pub use protocol::{
    BallSpeed, GameSettings, HandshakePayload, MatchId, OpponentInfo, PayloadKind, PeerId,
    PeerMessage, RendezvousMessage, Role,
};
pub use rendezvous::RendezvousClient;
