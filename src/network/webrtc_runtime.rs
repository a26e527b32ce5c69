// Direct peer channel using str0m's Sans-I/O WebRTC implementation
// One thread owns the Rtc and its UDP socket; negotiation blobs go in and out
// through the command and event channels so the coordinator can relay them.

use anyhow::{anyhow, Result};
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use str0m::change::{SdpAnswer, SdpOffer, SdpPendingOffer};
use str0m::channel::{ChannelConfig, ChannelId, Reliability};
use str0m::net::{Protocol, Receive};
use str0m::{Candidate, Event, IceConnectionState, Input, Output, Rtc};

use super::client::{DirectCommand, DirectEvent};
use super::outbox::Outbox;
use super::protocol::{PayloadKind, PeerMessage};

const CHANNEL_LABEL: &str = "pong";

// Socket read timeout; bounds how long commands and queued sends wait
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Discover the local network IP address for LAN connectivity.
/// Prefers private home/corporate ranges over anything else that isn't loopback.
fn discover_local_ip() -> Result<IpAddr> {
    let interfaces =
        if_addrs::get_if_addrs().map_err(|e| anyhow!("Failed to get network interfaces: {}", e))?;

    let mut candidates: Vec<(String, IpAddr)> = interfaces
        .into_iter()
        .filter_map(|iface| match iface.addr.ip() {
            IpAddr::V4(ipv4) if !ipv4.is_loopback() => Some((iface.name, IpAddr::V4(ipv4))),
            _ => None,
        })
        .collect();

    debug!(
        "IPv4 candidates: {:?}",
        candidates
            .iter()
            .map(|(name, ip)| format!("{}={}", name, ip))
            .collect::<Vec<_>>()
    );

    candidates.sort_by_key(|(_, ip)| match ip {
        IpAddr::V4(ipv4) => {
            let octets = ipv4.octets();
            if octets[0] == 192 && octets[1] == 168 {
                0
            } else if octets[0] == 172 && (16..=31).contains(&octets[1]) {
                1
            } else if octets[0] == 10 {
                2
            } else {
                3
            }
        }
        IpAddr::V6(_) => 99,
    });

    candidates
        .first()
        .map(|(name, ip)| {
            info!("Selected interface {} with IP {}", name, ip);
            *ip
        })
        .ok_or_else(|| anyhow!("No suitable network interfaces found"))
}

/// Query a STUN server for our public address.
/// Must use the same socket ICE will use, otherwise the NAT mapping differs.
async fn query_stun_server(udp_socket: &UdpSocket, stun_server: &str) -> Result<SocketAddr> {
    let stun_addr = tokio::net::lookup_host(stun_server)
        .await?
        .find(|addr| addr.is_ipv4())
        .ok_or_else(|| anyhow!("Failed to resolve STUN server to IPv4 address"))?;

    debug!("STUN server {} resolved to {}", stun_server, stun_addr);

    let socket_clone = udp_socket.try_clone()?;
    let client = stunclient::StunClient::new(stun_addr);

    let public_addr = tokio::task::spawn_blocking(
        move || -> Result<SocketAddr, Box<dyn std::error::Error + Send + Sync>> {
            socket_clone.set_read_timeout(Some(Duration::from_secs(3)))?;
            let result = client.query_external_address(&socket_clone)?;
            Ok(result)
        },
    )
    .await?
    .map_err(|e| anyhow!("STUN query failed: {}", e))?;

    Ok(public_addr)
}

/// Build the Rtc, bind the socket and gather local candidates
fn setup_peer(stun_server: &str) -> Result<(Rtc, UdpSocket, Vec<Candidate>)> {
    let mut rtc = Rtc::builder()
        .set_rtp_mode(false) // Data channels only, no RTP media
        .build();

    let local_ip = discover_local_ip().unwrap_or_else(|e| {
        warn!("Local IP discovery failed ({}), using loopback", e);
        IpAddr::from([127, 0, 0, 1])
    });

    // Bind to the specific IP so local_addr() matches the host candidate
    let udp_socket = UdpSocket::bind(SocketAddr::new(local_ip, 0))?;
    let host_addr = udp_socket.local_addr()?;
    info!("Bound UDP socket: {}", host_addr);

    let mut gathered = Vec::new();

    let host_candidate = Candidate::host(host_addr, "udp")
        .map_err(|e| anyhow!("Failed to create host candidate: {}", e))?;
    if let Some(added) = rtc.add_local_candidate(host_candidate) {
        gathered.push(added.clone());
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match rt.block_on(query_stun_server(&udp_socket, stun_server)) {
        Ok(public_addr) => {
            info!("Public address from STUN: {}", public_addr);
            match Candidate::server_reflexive(public_addr, host_addr, "udp") {
                Ok(srflx) => {
                    if let Some(added) = rtc.add_local_candidate(srflx) {
                        gathered.push(added.clone());
                    }
                }
                Err(e) => warn!("Failed to create server reflexive candidate: {}", e),
            }
        }
        // Host candidate alone still works on a LAN
        Err(e) => warn!("STUN query failed: {}, using host candidate only", e),
    }

    Ok((rtc, udp_socket, gathered))
}

/// Start the peer thread. It runs until `Close`, a dropped handle or a dead link.
pub fn spawn_peer_thread(
    stun_server: String,
    cmd_rx: mpsc::Receiver<DirectCommand>,
    outbox: Outbox,
    event_tx: mpsc::Sender<DirectEvent>,
) -> std::io::Result<()> {
    thread::Builder::new()
        .name("pongmatch-peer".to_string())
        .spawn(move || {
            let (rtc, udp_socket, gathered) = match setup_peer(&stun_server) {
                Ok(setup) => setup,
                Err(e) => {
                    error!("Peer setup failed: {}", e);
                    let _ = event_tx.send(DirectEvent::Error(e.to_string()));
                    return;
                }
            };

            let mut peer = PeerLoop {
                rtc,
                udp_socket,
                gathered,
                pending_offer: None,
                channel_id: None,
                event_tx,
            };

            if let Err(e) = peer.run(&cmd_rx, &outbox) {
                error!("Peer loop error: {}", e);
                let _ = peer.event_tx.send(DirectEvent::Error(e.to_string()));
            }
            debug!("Peer thread ending");
        })?;

    Ok(())
}

struct PeerLoop {
    rtc: Rtc,
    udp_socket: UdpSocket,
    gathered: Vec<Candidate>,
    pending_offer: Option<SdpPendingOffer>,
    channel_id: Option<ChannelId>,
    event_tx: mpsc::Sender<DirectEvent>,
}

enum Flow {
    Continue,
    Stop,
}

impl PeerLoop {
    fn run(&mut self, cmd_rx: &mpsc::Receiver<DirectCommand>, outbox: &Outbox) -> Result<()> {
        let mut buf = vec![0u8; 8192];
        let mut deadline: Option<Instant> = None;
        self.udp_socket.set_read_timeout(Some(POLL_INTERVAL))?;

        loop {
            // Phase 1: drain str0m output
            loop {
                match self.rtc.poll_output()? {
                    Output::Transmit(transmit) => {
                        if let Err(e) = self
                            .udp_socket
                            .send_to(&transmit.contents, transmit.destination)
                        {
                            warn!("Failed to send UDP packet: {}", e);
                        }
                    }
                    Output::Timeout(at) => {
                        deadline = Some(at);
                        break;
                    }
                    Output::Event(event) => {
                        if let Flow::Stop = self.handle_event(event) {
                            return Ok(());
                        }
                    }
                }
            }

            // Phase 2: wait briefly for a datagram
            match self.udp_socket.recv_from(&mut buf) {
                Ok((n, source)) => {
                    let receive = Receive {
                        proto: Protocol::Udp,
                        source,
                        destination: self.udp_socket.local_addr()?,
                        contents: buf[..n].try_into()?,
                    };
                    self.rtc.handle_input(Input::Receive(Instant::now(), receive))?;
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    let now = Instant::now();
                    if deadline.map_or(true, |at| now >= at) {
                        self.rtc.handle_input(Input::Timeout(now))?;
                    }
                }
                Err(e) => return Err(e.into()),
            }

            // Phase 3: commands from the session
            loop {
                match cmd_rx.try_recv() {
                    Ok(cmd) => {
                        if let Flow::Stop = self.handle_command(cmd, outbox)? {
                            return Ok(());
                        }
                    }
                    Err(mpsc::TryRecvError::Empty) => break,
                    Err(mpsc::TryRecvError::Disconnected) => {
                        debug!("Session dropped the peer handle");
                        self.rtc.disconnect();
                        return Ok(());
                    }
                }
            }

            // Phase 4: queued payloads
            self.flush(outbox);
        }
    }

    fn handle_command(&mut self, cmd: DirectCommand, outbox: &Outbox) -> Result<Flow> {
        match cmd {
            DirectCommand::CreateOffer => {
                let mut change = self.rtc.sdp_api();
                let channel_id = change.add_channel_with_config(ChannelConfig {
                    label: CHANNEL_LABEL.to_string(),
                    ordered: false,
                    reliability: Reliability::MaxRetransmits { retransmits: 0 },
                    negotiated: None,
                    protocol: String::new(),
                });
                let (offer, pending) = change
                    .apply()
                    .ok_or_else(|| anyhow!("Failed to apply SDP changes"))?;
                self.channel_id = Some(channel_id);
                self.pending_offer = Some(pending);

                info!("Created offer for data channel {:?}", channel_id);
                self.emit_description(PayloadKind::Offer, offer.to_sdp_string());
            }
            DirectCommand::AcceptOffer(sdp) => {
                let offer = SdpOffer::from_sdp_string(&sdp)?;
                let answer = self.rtc.sdp_api().accept_offer(offer)?;
                info!("Accepted offer, answering");
                self.emit_description(PayloadKind::Answer, answer.to_sdp_string());
            }
            DirectCommand::AcceptAnswer(sdp) => {
                let pending = self
                    .pending_offer
                    .take()
                    .ok_or_else(|| anyhow!("Answer received without a pending offer"))?;
                let answer = SdpAnswer::from_sdp_string(&sdp)
                    .map_err(|e| anyhow!("Failed to parse answer SDP: {}", e))?;
                self.rtc
                    .sdp_api()
                    .accept_answer(pending, answer)
                    .map_err(|e| anyhow!("Failed to accept answer: {}", e))?;
                info!("SDP negotiation complete");
            }
            DirectCommand::AddRemoteCandidate(line) => match Candidate::from_sdp_string(&line) {
                Ok(candidate) => self.rtc.add_remote_candidate(candidate),
                Err(e) => warn!("Ignoring malformed remote candidate: {}", e),
            },
            DirectCommand::Send(msg) => {
                outbox.push(msg);
            }
            DirectCommand::Close => {
                // Let anything queued (a final disconnect notice) go out first
                self.flush(outbox);
                let _ = self.poll_transmits();
                self.rtc.disconnect();
                let _ = self.event_tx.send(DirectEvent::Closed);
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    fn emit_description(&mut self, kind: PayloadKind, sdp: String) {
        let _ = self.event_tx.send(DirectEvent::LocalDescription(kind, sdp));
        for candidate in &self.gathered {
            let _ = self
                .event_tx
                .send(DirectEvent::LocalCandidate(candidate.to_sdp_string()));
        }
    }

    fn flush(&mut self, outbox: &Outbox) {
        let Some(cid) = self.channel_id else {
            return;
        };
        for msg in outbox.drain() {
            let bytes = match msg.to_bytes() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Failed to encode peer message: {}", e);
                    continue;
                }
            };
            match self.rtc.channel(cid) {
                Some(mut channel) => {
                    if let Err(e) = channel.write(false, &bytes) {
                        warn!("Failed to send message: {}", e);
                    }
                }
                None => debug!("Channel not writable yet, dropping message"),
            }
        }
    }

    fn poll_transmits(&mut self) -> Result<()> {
        while let Output::Transmit(transmit) = self.rtc.poll_output()? {
            let _ = self
                .udp_socket
                .send_to(&transmit.contents, transmit.destination);
        }
        Ok(())
    }

    fn handle_event(&mut self, event: Event) -> Flow {
        match event {
            Event::Connected => {
                info!("WebRTC connection established (ICE + DTLS)");
                let _ = self.event_tx.send(DirectEvent::Connected);
            }
            Event::IceConnectionStateChange(state) => {
                debug!("ICE state: {:?}", state);
                if state == IceConnectionState::Disconnected {
                    info!("ICE connection lost");
                    let _ = self.event_tx.send(DirectEvent::Closed);
                    return Flow::Stop;
                }
            }
            Event::ChannelOpen(cid, label) => {
                info!("Data channel opened: {}", label);
                self.channel_id = Some(cid);
                let _ = self.event_tx.send(DirectEvent::ChannelOpen);
            }
            Event::ChannelData(data) => match PeerMessage::from_bytes(&data.data) {
                Ok(msg) => {
                    let _ = self.event_tx.send(DirectEvent::Message(msg));
                }
                Err(e) => warn!("Dropping undecodable peer message: {}", e),
            },
            Event::ChannelClose(_) => {
                info!("Data channel closed by peer");
                let _ = self.event_tx.send(DirectEvent::Closed);
                return Flow::Stop;
            }
            _ => {}
        }
        Flow::Continue
    }
}
