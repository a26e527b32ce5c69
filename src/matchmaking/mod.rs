// Coordinator side: FIFO pairing and handshake relay behind a websocket server

pub mod queue;
pub mod relay;
pub mod server;

pub use queue::{ConnId, JoinOutcome, MatchmakingQueue, Pairing, QueueEntry};
pub use relay::{RelayState, SignalingRelay};
pub use server::{router, serve, Coordinator};
