// Websocket client for the coordinator
// Runs on its own thread with a small tokio runtime; the session sends through
// an unbounded channel and polls events from a std channel.

use futures::{SinkExt, StreamExt};
use std::sync::mpsc;
use std::thread;
use tokio::sync::mpsc as tokio_mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::client::{RendezvousEvent, RendezvousLink};
use super::protocol::RendezvousMessage;
use crate::error::LinkError;

enum Outgoing {
    /// Already-encoded JSON text
    Message(String),
    Close,
}

pub struct RendezvousClient {
    tx: tokio_mpsc::UnboundedSender<Outgoing>,
}

impl RendezvousClient {
    /// Connect to the coordinator in the background. `Connected` or `Error` arrives first.
    pub fn connect(url: &str) -> std::io::Result<(Self, mpsc::Receiver<RendezvousEvent>)> {
        let (event_tx, event_rx) = mpsc::channel();
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let url = url.to_string();

        thread::Builder::new()
            .name("pongmatch-rendezvous".to_string())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = event_tx.send(RendezvousEvent::Error(e.to_string()));
                        return;
                    }
                };
                rt.block_on(run_connection(url, rx, event_tx));
            })?;

        Ok((Self { tx }, event_rx))
    }
}

impl RendezvousLink for RendezvousClient {
    fn send(&self, msg: RendezvousMessage) -> Result<(), LinkError> {
        let text = msg.to_json()?;
        self.tx
            .send(Outgoing::Message(text))
            .map_err(|_| LinkError::Closed)
    }

    fn close(&self) {
        let _ = self.tx.send(Outgoing::Close);
    }
}

async fn run_connection(
    url: String,
    mut rx: tokio_mpsc::UnboundedReceiver<Outgoing>,
    event_tx: mpsc::Sender<RendezvousEvent>,
) {
    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            warn!("Failed to connect to coordinator {}: {}", url, e);
            let _ = event_tx.send(RendezvousEvent::Error(e.to_string()));
            return;
        }
    };
    info!("Connected to coordinator: {}", url);
    let _ = event_tx.send(RendezvousEvent::Connected);

    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    loop {
        tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Some(Outgoing::Message(text)) => {
                    if let Err(e) = ws_sink.send(Message::Text(text)).await {
                        warn!("Coordinator send failed: {}", e);
                        break;
                    }
                }
                // Explicit close, or the session dropped its handle
                Some(Outgoing::Close) | None => {
                    debug!("Closing coordinator connection");
                    let _ = ws_sink.close().await;
                    return;
                }
            },
            incoming = ws_stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match RendezvousMessage::from_json(&text) {
                    Ok(msg) => {
                        if event_tx.send(RendezvousEvent::Message(msg)).is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!("Ignoring unparseable coordinator message: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Coordinator connection error: {}", e);
                    break;
                }
            },
        }
    }

    info!("Coordinator connection closed");
    let _ = event_tx.send(RendezvousEvent::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_encodes_before_queueing() {
        let (tx, mut rx) = tokio_mpsc::unbounded_channel();
        let client = RendezvousClient { tx };
        let msg = RendezvousMessage::LeaveMatchmaking {
            player_id: "alice".to_string(),
        };
        client.send(msg.clone()).unwrap();

        match rx.try_recv() {
            Ok(Outgoing::Message(text)) => {
                assert_eq!(RendezvousMessage::from_json(&text).unwrap(), msg)
            }
            _ => panic!("expected an encoded message"),
        }
    }

    #[test]
    fn test_send_after_worker_exit_is_closed() {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        drop(rx);
        let client = RendezvousClient { tx };
        let result = client.send(RendezvousMessage::LeaveMatchmaking {
            player_id: "alice".to_string(),
        });
        assert!(matches!(result, Err(LinkError::Closed)));
    }
}
