// Coordinator websocket server
// One task pair per connection (socket writer + reader). Queue, relay and the
// connection registry share one lock so pairing is atomic across connections.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use super::queue::{ConnId, JoinOutcome, MatchmakingQueue, Pairing, QueueEntry};
use super::relay::SignalingRelay;
use crate::network::protocol::{PeerId, RendezvousMessage, Role};

const SIGNALING_LOST: &str = "signaling_lost";

struct PeerHandle {
    conn_id: ConnId,
    tx: mpsc::UnboundedSender<Message>,
}

#[derive(Default)]
struct Registry {
    queue: MatchmakingQueue,
    relay: SignalingRelay,
    peers: HashMap<PeerId, PeerHandle>,
}

impl Registry {
    fn send(&self, peer_id: &str, msg: &RendezvousMessage) {
        match self.peers.get(peer_id) {
            Some(peer) => send_message(&peer.tx, msg),
            None => warn!(peer_id, "Attempted to send to disconnected peer"),
        }
    }

    fn announce(&mut self, pairing: Pairing) {
        let Pairing {
            match_id,
            host,
            guest,
        } = pairing;
        self.relay
            .register(match_id.clone(), host.peer_id.clone(), guest.peer_id.clone());

        self.send(
            &host.peer_id,
            &RendezvousMessage::MatchFound {
                match_id: match_id.clone(),
                role: Role::Host,
                opponent: guest.opponent_info(),
            },
        );
        self.send(
            &guest.peer_id,
            &RendezvousMessage::MatchFound {
                match_id,
                role: Role::Guest,
                opponent: host.opponent_info(),
            },
        );
    }
}

/// Shared coordinator state, cloned into every connection handler
#[derive(Clone, Default)]
pub struct Coordinator {
    inner: Arc<Mutex<Registry>>,
    next_conn: Arc<AtomicU64>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn queued_players(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    pub async fn open_matches(&self) -> usize {
        self.inner.lock().await.relay.len()
    }

    async fn handle_message(
        &self,
        conn_id: ConnId,
        bound: &mut Option<PeerId>,
        tx: &mpsc::UnboundedSender<Message>,
        msg: RendezvousMessage,
    ) {
        let mut registry = self.inner.lock().await;

        let msg = match msg.into_handshake() {
            Ok((match_id, payload)) => {
                let Some(from) = bound.as_deref() else {
                    send_error(tx, "join before negotiating");
                    return;
                };
                match registry.relay.route(&match_id, from, payload) {
                    Some((target, relayed)) => {
                        debug!(match_id = %match_id, from, to = %target, "Relaying handshake payload");
                        registry.send(&target, &relayed);
                    }
                    None => debug!(match_id = %match_id, from, "Dropped handshake payload"),
                }
                return;
            }
            Err(other) => other,
        };

        match msg {
            RendezvousMessage::JoinMatchmaking {
                player_id,
                username,
                user_id,
                game_settings,
            } => {
                // One match at a time per player
                if registry.relay.is_in_match(&player_id) {
                    warn!(player_id = %player_id, "Join from a player already in a match");
                    send_error(tx, "already in a match");
                    return;
                }

                *bound = Some(player_id.clone());
                registry.peers.insert(
                    player_id.clone(),
                    PeerHandle {
                        conn_id,
                        tx: tx.clone(),
                    },
                );

                let entry = QueueEntry {
                    peer_id: player_id.clone(),
                    username,
                    user_id,
                    settings: game_settings,
                    enqueued_at: Instant::now(),
                    conn_id,
                };
                match registry.queue.join(entry) {
                    JoinOutcome::Enqueued { position } | JoinOutcome::Replaced { position } => {
                        send_message(
                            tx,
                            &RendezvousMessage::Queued {
                                player_id,
                                position,
                            },
                        );
                    }
                    JoinOutcome::Paired(pairing) => registry.announce(pairing),
                }
            }

            RendezvousMessage::LeaveMatchmaking { player_id } => {
                if bound.as_deref() != Some(player_id.as_str()) {
                    send_error(tx, "cannot leave on behalf of another player");
                    return;
                }
                if let Err(e) = registry.queue.leave(&player_id) {
                    send_error(tx, &e.to_string());
                }
            }

            RendezvousMessage::PlayerQuit {
                player_id,
                match_id,
                reason,
                timestamp,
            } => {
                let Some(from) = bound.as_deref() else {
                    return;
                };
                if let Some(opponent) = registry.relay.quit(&match_id, from) {
                    info!(match_id = %match_id, player_id = %player_id, "Forwarding player quit");
                    registry.send(
                        &opponent,
                        &RendezvousMessage::PlayerQuit {
                            player_id,
                            match_id,
                            reason,
                            timestamp,
                        },
                    );
                }
            }

            other => {
                warn!("Unexpected message from client: {:?}", other);
                send_error(tx, "unexpected message type");
            }
        }
    }

    async fn disconnected(&self, conn_id: ConnId, peer_id: &str) {
        let mut registry = self.inner.lock().await;

        // A newer connection for the same player owns the entry now
        let current = registry
            .peers
            .get(peer_id)
            .is_some_and(|p| p.conn_id == conn_id);
        if !current {
            return;
        }
        registry.peers.remove(peer_id);
        registry.queue.remove_connection(peer_id, conn_id);

        for (match_id, opponent) in registry.relay.peer_disconnected(peer_id) {
            info!(match_id = %match_id, peer_id, "Notifying opponent of lost signaling");
            registry.send(
                &opponent,
                &RendezvousMessage::OpponentDisconnected {
                    disconnected_player: peer_id.to_string(),
                    reason: SIGNALING_LOST.to_string(),
                },
            );
        }
    }
}

fn send_message(tx: &mpsc::UnboundedSender<Message>, msg: &RendezvousMessage) {
    match msg.to_json() {
        Ok(json) => {
            if tx.send(Message::Text(json)).is_err() {
                debug!("Peer send task already gone");
            }
        }
        Err(e) => error!("Failed to serialize rendezvous message: {}", e),
    }
}

fn send_error(tx: &mpsc::UnboundedSender<Message>, message: &str) {
    send_message(
        tx,
        &RendezvousMessage::Error {
            message: message.to_string(),
        },
    );
}

pub fn router(coordinator: Coordinator) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(coordinator)
}

/// Serve the coordinator on an already-bound listener
pub async fn serve(listener: TcpListener, coordinator: Coordinator) -> std::io::Result<()> {
    axum::serve(listener, router(coordinator)).await
}

async fn health() -> &'static str {
    "ok"
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(coordinator): State<Coordinator>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, coordinator))
}

async fn handle_socket(socket: WebSocket, coordinator: Coordinator) {
    let conn_id = coordinator.next_conn.fetch_add(1, Ordering::Relaxed);
    info!(conn_id, "New websocket connection");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Written by the reader so cleanup knows the player even if the writer ends first
    let bound_slot: Arc<std::sync::Mutex<Option<PeerId>>> = Arc::default();

    let mut recv_task = tokio::spawn({
        let coordinator = coordinator.clone();
        let bound_slot = bound_slot.clone();

        async move {
            let mut bound: Option<PeerId> = None;
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match RendezvousMessage::from_json(&text) {
                        Ok(msg) => {
                            coordinator
                                .handle_message(conn_id, &mut bound, &tx, msg)
                                .await;
                            if let Ok(mut slot) = bound_slot.lock() {
                                slot.clone_from(&bound);
                            }
                        }
                        Err(e) => {
                            warn!(conn_id, "Invalid rendezvous message: {}", e);
                            send_error(&tx, &format!("invalid message format: {}", e));
                        }
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    let bound = bound_slot.lock().ok().and_then(|slot| slot.clone());
    match bound {
        Some(peer_id) => {
            coordinator.disconnected(conn_id, &peer_id).await;
            info!(conn_id, peer_id = %peer_id, "Websocket disconnected");
        }
        None => info!(conn_id, "Websocket disconnected"),
    }
}
