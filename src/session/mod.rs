// Peer session: one per match attempt, one on each peer
// Owns both transport handles and every state transition from joining the queue
// to the final outcome. Driven entirely from the render loop: events are fed in
// as they arrive, `tick` runs once per frame, and `now` always comes from the caller.

pub mod authority;
pub mod forfeit;
pub mod handshake;
pub mod mirror;
pub mod report;

pub use authority::AuthorityLoop;
pub use forfeit::{ForfeitGuard, ForfeitTrigger, GraceWindow, SilenceMonitor};
pub use handshake::Handshake;
pub use mirror::{Applied, MirrorApplier};
pub use report::{
    LoggingMatchService, MatchOutcome, MatchService, OutcomeReason, ResultReporter, Winner,
};

use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::{Config, NetworkConfig, PhysicsConfig};
use crate::error::SessionError;
use crate::game::{Direction, GameSnapshot, Score};
use crate::network::client::{
    DirectCommand, DirectEvent, DirectLink, RendezvousEvent, RendezvousLink,
};
use crate::network::protocol::{
    unix_millis, GameSettings, HandshakePayload, MatchId, OpponentInfo, PayloadKind, PeerId,
    PeerMessage, RendezvousMessage, Role,
};
use crate::recovery::{RecoveryStore, SessionRecoveryRecord};

// Final snapshot keeps going out this long after the host finishes
const FINAL_SNAPSHOT_LINGER: Duration = Duration::from_millis(1000);

// match_saved is sent over an unreliable channel
const SAVE_ACK_REPEATS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Queued,
    Matched,
    Negotiating,
    Connected,
    Active,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Matchmaking,
    Negotiating,
    Active,
    Finished,
}

/// This peer's copy of the match. The host's settings win; the theme stays local.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: MatchId,
    pub host: PeerId,
    pub guest: PeerId,
    pub settings: GameSettings,
    pub phase: MatchPhase,
}

#[derive(Debug, Clone)]
pub struct PlayerProfile {
    pub peer_id: PeerId,
    pub username: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionTimings {
    pub connection_timeout: Duration,
    pub rendezvous_grace: Duration,
    pub peer_silence: Duration,
    pub settings_display: Duration,
    pub settings_resend: Duration,
    pub save_ack_timeout: Duration,
}

impl SessionTimings {
    pub fn from_config(network: &NetworkConfig) -> Self {
        Self {
            connection_timeout: Duration::from_secs(network.connection_timeout_secs),
            rendezvous_grace: Duration::from_secs(network.rendezvous_grace_secs),
            peer_silence: Duration::from_secs(network.peer_silence_timeout_secs),
            settings_display: Duration::from_millis(network.settings_display_ms),
            settings_resend: Duration::from_millis(network.settings_resend_ms),
            save_ack_timeout: Duration::from_millis(network.save_ack_timeout_ms),
        }
    }
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self::from_config(&NetworkConfig::default())
    }
}

/// Everything a session needs to know about the local player and tuning
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub profile: PlayerProfile,
    pub settings: GameSettings,
    pub timings: SessionTimings,
    pub physics: PhysicsConfig,
}

impl SessionContext {
    pub fn from_config(config: &Config, peer_id: PeerId) -> Self {
        Self {
            profile: PlayerProfile {
                peer_id,
                username: config.player.username.clone(),
                user_id: config.player.user_id.clone(),
            },
            settings: config.game.clone(),
            timings: SessionTimings::from_config(&config.network),
            physics: config.physics.clone(),
        }
    }

    /// Clamp settings and physics into playable ranges
    pub fn sanitized(mut self) -> Self {
        self.settings = self.settings.sanitized();
        self.physics = self.physics.sanitized();
        self
    }
}

/// Random per-run peer id, e.g. "K7QD2XMA"
pub fn generate_peer_id() -> PeerId {
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEnd {
    Outcome(MatchOutcome),
    /// Never got a working direct channel; the only failure shown as an error
    ConnectionFailed(String),
    /// Player backed out before the match started
    Cancelled,
}

struct HostSide {
    authority: Option<AuthorityLoop>,
    last_settings_sent: Option<Instant>,
    last_snapshot: Option<GameSnapshot>,
    linger_until: Option<Instant>,
}

struct GuestSide {
    mirror: MirrorApplier,
    settings_received_at: Option<Instant>,
    ready_sent: bool,
}

enum RoleState {
    Host(HostSide),
    Guest(GuestSide),
}

impl RoleState {
    fn new(role: Role) -> Self {
        match role {
            Role::Host => RoleState::Host(HostSide {
                authority: None,
                last_settings_sent: None,
                last_snapshot: None,
                linger_until: None,
            }),
            Role::Guest => RoleState::Guest(GuestSide {
                mirror: MirrorApplier::new(),
                settings_received_at: None,
                ready_sent: false,
            }),
        }
    }

    fn role(&self) -> Role {
        match self {
            RoleState::Host(_) => Role::Host,
            RoleState::Guest(_) => Role::Guest,
        }
    }
}

pub struct PeerSession<R: RendezvousLink, D: DirectLink> {
    ctx: SessionContext,
    rendezvous: R,
    direct: D,
    store: Box<dyn RecoveryStore>,
    matches: Box<dyn MatchService>,

    state: SessionState,
    session: Option<Session>,
    opponent: Option<OpponentInfo>,
    role_state: Option<RoleState>,
    handshake: Option<Handshake>,
    connected_at: Option<Instant>,

    guard: ForfeitGuard,
    grace: GraceWindow,
    silence: SilenceMonitor,
    reporter: ResultReporter,
    recorded: Option<(Score, u64)>,

    end: Option<SessionEnd>,
    links_open: bool,
}

impl<R: RendezvousLink, D: DirectLink> PeerSession<R, D> {
    pub fn new(
        ctx: SessionContext,
        rendezvous: R,
        direct: D,
        store: Box<dyn RecoveryStore>,
        matches: Box<dyn MatchService>,
    ) -> Self {
        let ctx = ctx.sanitized();
        let grace = GraceWindow::new(ctx.timings.rendezvous_grace);
        let silence = SilenceMonitor::new(ctx.timings.peer_silence);
        Self {
            ctx,
            rendezvous,
            direct,
            store,
            matches,
            state: SessionState::Idle,
            session: None,
            opponent: None,
            role_state: None,
            handshake: None,
            connected_at: None,
            guard: ForfeitGuard::default(),
            grace,
            silence,
            reporter: ResultReporter::new(None),
            recorded: None,
            end: None,
            links_open: true,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn role(&self) -> Option<Role> {
        self.role_state.as_ref().map(RoleState::role)
    }

    pub fn opponent(&self) -> Option<&OpponentInfo> {
        self.opponent.as_ref()
    }

    pub fn peer_id(&self) -> &str {
        &self.ctx.profile.peer_id
    }

    /// Settings in force: the host's once they've arrived, our own before that
    pub fn settings(&self) -> &GameSettings {
        self.session
            .as_ref()
            .map(|s| &s.settings)
            .unwrap_or(&self.ctx.settings)
    }

    pub fn end(&self) -> Option<&SessionEnd> {
        self.end.as_ref()
    }

    pub fn latest_snapshot(&self) -> Option<&GameSnapshot> {
        match self.role_state.as_ref()? {
            RoleState::Host(host) => host.last_snapshot.as_ref(),
            RoleState::Guest(guest) => guest.mirror.latest(),
        }
    }

    /// Guest is showing the host's settings before play starts
    pub fn is_showing_settings(&self) -> bool {
        self.state == SessionState::Connected
            && matches!(
                &self.role_state,
                Some(RoleState::Guest(GuestSide {
                    settings_received_at: Some(_),
                    ..
                }))
            )
    }

    /// Rendezvous dropped and the direct channel hasn't spoken since
    pub fn is_reconnecting(&self) -> bool {
        self.state == SessionState::Active && self.grace.is_open()
    }

    /// Ended and every link torn down
    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Ended && !self.links_open
    }

    fn expect_state(&self, expected: SessionState, action: &'static str) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                state: self.state,
                action,
            })
        }
    }

    /// Enter the matchmaking queue
    pub fn join(&mut self) -> Result<(), SessionError> {
        self.expect_state(SessionState::Idle, "join")?;

        let profile = &self.ctx.profile;
        let msg = RendezvousMessage::JoinMatchmaking {
            player_id: profile.peer_id.clone(),
            username: profile.username.clone(),
            user_id: profile.user_id.clone(),
            game_settings: self.ctx.settings.clone(),
        };

        self.state = SessionState::Queued;
        info!(peer_id = %profile.peer_id, "Joining matchmaking");
        if let Err(e) = self.rendezvous.send(msg) {
            self.fail(format!("Could not reach matchmaking server: {}", e));
        }
        Ok(())
    }

    /// Leave the queue before a match is found
    pub fn leave(&mut self) -> Result<(), SessionError> {
        self.expect_state(SessionState::Queued, "leave")?;

        let _ = self.rendezvous.send(RendezvousMessage::LeaveMatchmaking {
            player_id: self.ctx.profile.peer_id.clone(),
        });
        info!("Left matchmaking");
        self.end_with(SessionEnd::Cancelled, true);
        Ok(())
    }

    /// Player walks away. Mid-match this is a forfeit loss and the opponent is told,
    /// best effort, on both channels.
    pub fn quit(&mut self) {
        match self.state {
            SessionState::Idle => self.end_with(SessionEnd::Cancelled, true),
            SessionState::Queued => {
                let _ = self.leave();
            }
            SessionState::Matched | SessionState::Negotiating | SessionState::Connected => {
                self.notify_quit("cancelled");
                self.end_with(SessionEnd::Cancelled, true);
            }
            SessionState::Active => {
                // Our own leaving settles it; later channel noise must not
                self.guard.try_fire();
                self.notify_quit("voluntary_quit");

                let elapsed = self.elapsed_secs();
                let outcome = forfeit::abandon_outcome(
                    self.settings().win_score,
                    self.opponent_name(),
                    elapsed,
                );
                info!(reason = outcome.reason.as_str(), "Quit mid-match");
                // The player who leaves never records the result
                self.end_with(SessionEnd::Outcome(outcome), true);
            }
            SessionState::Ended => {}
        }
    }

    /// Tear everything down now. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.state != SessionState::Ended {
            self.quit();
        }
        self.reporter.flush(self.matches.as_mut());
        self.close_links();
    }

    /// Once per render frame
    pub fn tick(&mut self, now: Instant, local: Direction) {
        match self.state {
            SessionState::Idle | SessionState::Queued => {}
            SessionState::Matched | SessionState::Negotiating => {
                if self.handshake.as_ref().is_some_and(|h| h.timed_out(now)) {
                    self.handshake_timeout();
                }
            }
            SessionState::Connected => self.tick_connected(now),
            SessionState::Active => self.tick_active(now, local),
            SessionState::Ended => self.tick_ended(now),
        }
    }

    pub fn handle_rendezvous(&mut self, event: RendezvousEvent, now: Instant) {
        match event {
            RendezvousEvent::Connected => debug!("Rendezvous link up"),
            RendezvousEvent::Message(msg) => self.on_rendezvous_message(msg, now),
            RendezvousEvent::Closed => self.on_rendezvous_lost(now),
            RendezvousEvent::Error(e) => {
                warn!("Rendezvous link error: {}", e);
                self.on_rendezvous_lost(now);
            }
        }
    }

    pub fn handle_direct(&mut self, event: DirectEvent, now: Instant) {
        if self.state == SessionState::Ended {
            // Only the save ack still matters
            if let DirectEvent::Message(PeerMessage::MatchSaved { .. }) = event {
                self.reporter.acknowledge();
            }
            return;
        }

        match event {
            DirectEvent::LocalDescription(kind, blob) => {
                if let Some(handshake) = self.handshake.as_mut() {
                    handshake.on_local_description();
                }
                if self.state == SessionState::Matched {
                    self.state = SessionState::Negotiating;
                }
                self.relay(HandshakePayload { kind, blob }, now);
            }
            DirectEvent::LocalCandidate(blob) => {
                self.relay(
                    HandshakePayload {
                        kind: PayloadKind::Candidate,
                        blob,
                    },
                    now,
                );
            }
            DirectEvent::Connected => {
                if let Some(handshake) = self.handshake.as_mut() {
                    handshake.on_peer_connected();
                }
                self.check_connected(now);
            }
            DirectEvent::ChannelOpen => {
                if let Some(handshake) = self.handshake.as_mut() {
                    handshake.on_channel_open();
                }
                self.check_connected(now);
            }
            DirectEvent::Message(msg) => self.on_peer_message(msg, now),
            DirectEvent::Closed => {
                self.on_channel_down(ForfeitTrigger::ChannelClosed, "direct channel closed")
            }
            DirectEvent::Error(e) => self.on_channel_down(ForfeitTrigger::ChannelError, &e),
        }
    }

    fn on_rendezvous_message(&mut self, msg: RendezvousMessage, now: Instant) {
        match msg {
            RendezvousMessage::Queued { position, .. } => {
                debug!(position, "Waiting in queue");
            }
            // Coordinator complaints are re-synced silently
            RendezvousMessage::Error { message } => {
                debug!("Coordinator error: {}", message);
            }
            RendezvousMessage::MatchFound {
                match_id,
                role,
                opponent,
            } => self.on_match_found(match_id, role, opponent, now),
            RendezvousMessage::OpponentDisconnected {
                disconnected_player,
                reason,
            } => {
                if !self.is_opponent(&disconnected_player) {
                    return;
                }
                info!(reason = %reason, "Opponent lost their rendezvous link");
                match self.state {
                    SessionState::Matched | SessionState::Negotiating => {
                        self.fail("Opponent left before the match started")
                    }
                    SessionState::Connected | SessionState::Active => self.grace.start(now),
                    _ => {}
                }
            }
            RendezvousMessage::PlayerQuit { match_id, .. } => {
                if self.is_current_match(&match_id) {
                    self.on_opponent_quit();
                }
            }
            other => match other.into_handshake() {
                Ok((match_id, payload)) => self.on_remote_payload(match_id, payload),
                Err(other) => debug!("Ignoring rendezvous message {:?}", other),
            },
        }
    }

    fn on_match_found(&mut self, match_id: MatchId, role: Role, opponent: OpponentInfo, now: Instant) {
        if self.state != SessionState::Queued {
            warn!(state = ?self.state, "Ignoring match_found outside the queue");
            return;
        }

        let me = self.ctx.profile.peer_id.clone();
        let (host, guest) = match role {
            Role::Host => (me, opponent.id.clone()),
            Role::Guest => (opponent.id.clone(), me),
        };
        info!(
            match_id = %match_id,
            role = ?role,
            opponent = %opponent.username,
            "Match found"
        );

        self.session = Some(Session {
            id: match_id,
            host,
            guest,
            settings: self.ctx.settings.clone(),
            phase: MatchPhase::Negotiating,
        });
        self.reporter = ResultReporter::new(opponent.user_id.clone());
        self.opponent = Some(opponent);
        self.role_state = Some(RoleState::new(role));
        self.state = SessionState::Matched;

        let handshake = Handshake::new(role, now, self.ctx.timings.connection_timeout);
        let first = handshake.begin();
        self.handshake = Some(handshake);

        if let Some(cmd) = first {
            self.state = SessionState::Negotiating;
            self.direct_command(cmd);
        }
    }

    fn on_remote_payload(&mut self, match_id: MatchId, payload: HandshakePayload) {
        if !self.is_current_match(&match_id) {
            debug!(match_id = %match_id, "Dropping payload for another match");
            return;
        }
        if !matches!(
            self.state,
            SessionState::Matched
                | SessionState::Negotiating
                | SessionState::Connected
                | SessionState::Active
        ) {
            return;
        }

        let commands = match self.handshake.as_mut() {
            Some(handshake) => handshake.on_remote(payload),
            None => return,
        };
        if !commands.is_empty() && self.state == SessionState::Matched {
            self.state = SessionState::Negotiating;
        }
        for cmd in commands {
            if !self.direct_command(cmd) {
                return;
            }
        }
    }

    fn on_rendezvous_lost(&mut self, now: Instant) {
        match self.state {
            SessionState::Idle
            | SessionState::Queued
            | SessionState::Matched
            | SessionState::Negotiating => self.fail("Lost connection to the matchmaking server"),
            SessionState::Connected | SessionState::Active => {
                warn!("Rendezvous link lost, waiting on the direct channel");
                self.grace.start(now);
            }
            SessionState::Ended => {}
        }
    }

    fn relay(&mut self, payload: HandshakePayload, now: Instant) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let msg = payload.into_message(session.id.clone());
        if self.rendezvous.send(msg).is_err() {
            self.on_rendezvous_lost(now);
        }
    }

    fn check_connected(&mut self, now: Instant) {
        if !matches!(self.state, SessionState::Matched | SessionState::Negotiating) {
            return;
        }
        if !self.handshake.as_ref().is_some_and(Handshake::is_complete) {
            return;
        }

        info!("Direct channel open");
        self.state = SessionState::Connected;
        self.connected_at = Some(now);
        self.silence.heard(now);

        if matches!(self.role_state, Some(RoleState::Host(_))) {
            self.push_settings(now);
        }
    }

    fn push_settings(&mut self, now: Instant) {
        let settings = self.settings().clone();
        if let Some(RoleState::Host(host)) = self.role_state.as_mut() {
            host.last_settings_sent = Some(now);
        }
        self.send_peer(PeerMessage::GameSettings { settings });
    }

    fn on_peer_message(&mut self, msg: PeerMessage, now: Instant) {
        self.silence.heard(now);
        self.grace.clear();

        match msg {
            PeerMessage::GameSettings { settings } => self.on_host_settings(settings, now),
            PeerMessage::PlayerReady => {
                if self.state == SessionState::Connected
                    && matches!(self.role_state, Some(RoleState::Host(_)))
                {
                    info!("Guest ready");
                    self.activate(now);
                }
            }
            PeerMessage::GameUpdate { state } => self.on_snapshot(state, now),
            PeerMessage::PlayerInput { input } => {
                if self.state != SessionState::Active {
                    return;
                }
                if let Some(RoleState::Host(HostSide {
                    authority: Some(authority),
                    ..
                })) = self.role_state.as_mut()
                {
                    authority.receive_remote(input);
                }
            }
            PeerMessage::VoluntaryDisconnect { reason, .. }
            | PeerMessage::PlayerDisconnect { reason } => {
                info!(reason = %reason, "Opponent disconnected voluntarily");
                self.on_opponent_quit();
            }
            PeerMessage::MatchSaved { .. } => self.reporter.acknowledge(),
        }
    }

    fn on_host_settings(&mut self, settings: GameSettings, now: Instant) {
        let state = self.state;
        let Some(RoleState::Guest(guest)) = self.role_state.as_mut() else {
            return;
        };

        if guest.ready_sent {
            // Host never saw our ready
            self.send_peer(PeerMessage::PlayerReady);
            return;
        }
        if guest.settings_received_at.is_some()
            || !matches!(
                state,
                SessionState::Matched | SessionState::Negotiating | SessionState::Connected
            )
        {
            return;
        }

        guest.settings_received_at = Some(now);
        if let Some(session) = self.session.as_mut() {
            session.settings.adopt_host(&settings);
            info!(
                win_score = session.settings.win_score,
                ball_speed = ?session.settings.ball_speed,
                power_ups = session.settings.power_ups,
                "Host settings received"
            );
        }
    }

    fn on_snapshot(&mut self, snapshot: GameSnapshot, now: Instant) {
        if self.state != SessionState::Active {
            return;
        }
        let Some(RoleState::Guest(guest)) = self.role_state.as_mut() else {
            return;
        };
        if guest.mirror.apply(snapshot.clone()) == Applied::Stale {
            return;
        }

        self.persist(&snapshot);
        if snapshot.is_finished() {
            self.finish(&snapshot, now);
        }
    }

    fn on_opponent_quit(&mut self) {
        match self.state {
            SessionState::Active => self.forfeit(ForfeitTrigger::OpponentQuit),
            SessionState::Matched | SessionState::Negotiating | SessionState::Connected => {
                self.fail("Opponent left before the match started")
            }
            _ => {}
        }
    }

    fn on_channel_down(&mut self, trigger: ForfeitTrigger, detail: &str) {
        match self.state {
            SessionState::Active => self.forfeit(trigger),
            SessionState::Matched | SessionState::Negotiating | SessionState::Connected => {
                self.fail(format!("Connection failed: {}", detail))
            }
            _ => {}
        }
    }

    fn tick_connected(&mut self, now: Instant) {
        let timeout = self.ctx.timings.connection_timeout;
        let waited_too_long = self
            .connected_at
            .is_some_and(|at| now.saturating_duration_since(at) >= timeout);

        match self.role_state.as_mut() {
            Some(RoleState::Host(host)) => {
                if waited_too_long {
                    self.handshake_timeout();
                    return;
                }
                let resend_due = host.last_settings_sent.map_or(true, |at| {
                    now.saturating_duration_since(at) >= self.ctx.timings.settings_resend
                });
                if resend_due {
                    self.push_settings(now);
                }
            }
            Some(RoleState::Guest(guest)) => match guest.settings_received_at {
                Some(at) => {
                    if now.saturating_duration_since(at) >= self.ctx.timings.settings_display {
                        guest.ready_sent = true;
                        self.send_peer(PeerMessage::PlayerReady);
                        self.activate(now);
                    }
                }
                None => {
                    if waited_too_long {
                        self.handshake_timeout();
                    }
                }
            },
            None => {}
        }
    }

    fn activate(&mut self, now: Instant) {
        if self.state == SessionState::Ended {
            return;
        }
        self.state = SessionState::Active;
        self.silence.heard(now);

        let settings = self.settings().clone();
        if let Some(session) = self.session.as_mut() {
            session.phase = MatchPhase::Active;
        }
        if let Some(RoleState::Host(host)) = self.role_state.as_mut() {
            let authority = AuthorityLoop::pong(&settings, &self.ctx.physics);
            host.last_snapshot = Some(authority.snapshot());
            host.authority = Some(authority);
        }
        info!(role = ?self.role(), "Match active");

        // In flight from here on
        self.write_record(Score::default(), 0.0);
        self.recorded = Some((Score::default(), 0));
    }

    fn tick_active(&mut self, now: Instant, local: Direction) {
        if self.grace.expired(now) {
            self.forfeit(ForfeitTrigger::RendezvousLost);
            return;
        }
        if self.silence.is_silent(now) {
            self.forfeit(ForfeitTrigger::PeerSilent);
            return;
        }

        match self.role_state.as_mut() {
            Some(RoleState::Host(host)) => {
                let Some(authority) = host.authority.as_mut() else {
                    return;
                };
                let snapshot = authority.step(local);
                host.last_snapshot = Some(snapshot.clone());

                self.persist(&snapshot);
                if !self.send_peer(PeerMessage::GameUpdate {
                    state: snapshot.clone(),
                }) {
                    return;
                }
                if snapshot.is_finished() {
                    self.finish(&snapshot, now);
                }
            }
            Some(RoleState::Guest(_)) => {
                self.send_peer(MirrorApplier::input_message(local));
            }
            None => {}
        }
    }

    fn tick_ended(&mut self, now: Instant) {
        if !self.links_open {
            return;
        }
        self.reporter.poll(now, self.matches.as_mut());

        let mut lingering = false;
        let mut resend = None;
        if let Some(RoleState::Host(host)) = self.role_state.as_ref() {
            if host.linger_until.is_some_and(|until| now < until) {
                lingering = true;
                resend = host.last_snapshot.clone();
            }
        }
        if let Some(state) = resend {
            self.send_peer(PeerMessage::GameUpdate { state });
        }

        if !lingering && !self.reporter.is_pending() {
            self.close_links();
        }
    }

    /// Normal end at the win score, on either side
    fn finish(&mut self, snapshot: &GameSnapshot, now: Instant) {
        let (my_score, opponent_score) = self.my_scores(snapshot.score);
        let outcome = MatchOutcome {
            winner: if my_score > opponent_score {
                Winner::Me
            } else {
                Winner::Opponent
            },
            my_score,
            opponent_score,
            reason: OutcomeReason::Completed,
            opponent_name: self.opponent_name().to_string(),
            duration_secs: snapshot.elapsed_secs as u64,
        };
        info!(score = %outcome.score_line(), "Match finished");
        self.guard.try_fire();

        match self.role() {
            Some(Role::Host) => {
                if self.reporter.record_now(self.matches.as_mut(), &outcome) {
                    let player_id = self.ctx.profile.peer_id.clone();
                    for _ in 0..SAVE_ACK_REPEATS {
                        self.send_peer(PeerMessage::MatchSaved {
                            player_id: player_id.clone(),
                            timestamp: unix_millis(),
                        });
                    }
                }
                if let Some(RoleState::Host(host)) = self.role_state.as_mut() {
                    host.linger_until = Some(now + FINAL_SNAPSHOT_LINGER);
                }
            }
            Some(Role::Guest) => {
                self.reporter
                    .await_ack(outcome.clone(), now + self.ctx.timings.save_ack_timeout);
            }
            None => {}
        }

        self.end_with(SessionEnd::Outcome(outcome), false);
    }

    /// The surviving peer declares itself winner. Runs at most once.
    fn forfeit(&mut self, trigger: ForfeitTrigger) {
        if !self.guard.try_fire() {
            return;
        }
        let outcome = forfeit::forfeit_outcome(
            trigger,
            self.settings().win_score,
            self.opponent_name(),
            self.elapsed_secs(),
        );
        info!(
            trigger = ?trigger,
            reason = outcome.reason.as_str(),
            "Opponent gone, winning by forfeit"
        );

        self.reporter.record_now(self.matches.as_mut(), &outcome);
        self.end_with(SessionEnd::Outcome(outcome), true);
    }

    fn handshake_timeout(&mut self) {
        let secs = self.ctx.timings.connection_timeout.as_secs();
        self.fail(SessionError::HandshakeTimeout(secs).to_string());
    }

    fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(reason = %reason, "Session failed");
        self.end_with(SessionEnd::ConnectionFailed(reason), true);
    }

    fn end_with(&mut self, end: SessionEnd, close_links: bool) {
        self.state = SessionState::Ended;
        if let Some(session) = self.session.as_mut() {
            session.phase = MatchPhase::Finished;
        }
        if let Err(e) = self.store.delete() {
            warn!("Failed to delete recovery record: {}", e);
        }
        self.end = Some(end);
        if close_links {
            self.close_links();
        }
    }

    fn close_links(&mut self) {
        if !self.links_open {
            return;
        }
        self.links_open = false;
        let _ = self.direct.command(DirectCommand::Close);
        self.rendezvous.close();
        debug!("Session links closed");
    }

    fn notify_quit(&mut self, reason: &str) {
        let Some(match_id) = self.session.as_ref().map(|s| s.id.clone()) else {
            return;
        };
        let player_id = self.ctx.profile.peer_id.clone();
        let timestamp = unix_millis();

        let _ = self.direct.command(DirectCommand::Send(PeerMessage::VoluntaryDisconnect {
            player_id: player_id.clone(),
            reason: reason.to_string(),
            timestamp,
        }));
        let _ = self.rendezvous.send(RendezvousMessage::PlayerQuit {
            player_id,
            match_id,
            reason: reason.to_string(),
            timestamp,
        });
    }

    /// Returns false if the direct link is gone (and the session has reacted to it)
    fn send_peer(&mut self, msg: PeerMessage) -> bool {
        self.direct_command(DirectCommand::Send(msg))
    }

    fn direct_command(&mut self, cmd: DirectCommand) -> bool {
        match self.direct.command(cmd) {
            Ok(()) => true,
            Err(e) => {
                self.on_channel_down(ForfeitTrigger::ChannelError, &e.to_string());
                false
            }
        }
    }

    fn persist(&mut self, snapshot: &GameSnapshot) {
        if snapshot.is_finished() {
            return;
        }
        let secs = snapshot.elapsed_secs as u64;
        let due = match self.recorded {
            None => true,
            Some((score, at)) => score != snapshot.score || secs > at,
        };
        if due {
            self.write_record(snapshot.score, snapshot.elapsed_secs);
            self.recorded = Some((snapshot.score, secs));
        }
    }

    fn write_record(&mut self, score: Score, elapsed_secs: f32) {
        let (Some(session), Some(opponent)) = (self.session.as_ref(), self.opponent.as_ref())
        else {
            return;
        };
        let (my_score, opponent_score) = self.my_scores(score);
        let record = SessionRecoveryRecord {
            opponent_username: opponent.username.clone(),
            opponent_user_id: opponent.user_id.clone(),
            is_host: self.role() == Some(Role::Host),
            session_id: session.id.clone(),
            my_score,
            opponent_score,
            elapsed_secs,
        };
        if let Err(e) = self.store.put(&record) {
            warn!("Failed to write recovery record: {}", e);
        }
    }

    fn my_scores(&self, score: Score) -> (u8, u8) {
        match self.role() {
            Some(Role::Guest) => (score.guest, score.host),
            _ => (score.host, score.guest),
        }
    }

    fn elapsed_secs(&self) -> u64 {
        self.latest_snapshot()
            .map(|s| s.elapsed_secs as u64)
            .unwrap_or(0)
    }

    fn opponent_name(&self) -> &str {
        self.opponent
            .as_ref()
            .map(|o| o.username.as_str())
            .unwrap_or("Opponent")
    }

    fn is_opponent(&self, peer_id: &str) -> bool {
        self.opponent.as_ref().is_some_and(|o| o.id == peer_id)
    }

    fn is_current_match(&self, match_id: &str) -> bool {
        self.session.as_ref().is_some_and(|s| s.id == match_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkError;
    use crate::recovery::MemoryStore;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct RecordingRendezvous {
        sent: Rc<RefCell<Vec<RendezvousMessage>>>,
        closed: Rc<RefCell<bool>>,
    }

    impl RendezvousLink for RecordingRendezvous {
        fn send(&self, msg: RendezvousMessage) -> Result<(), LinkError> {
            self.sent.borrow_mut().push(msg);
            Ok(())
        }

        fn close(&self) {
            *self.closed.borrow_mut() = true;
        }
    }

    #[derive(Clone, Default)]
    struct RecordingDirect {
        commands: Rc<RefCell<Vec<DirectCommand>>>,
    }

    impl DirectLink for RecordingDirect {
        fn command(&self, cmd: DirectCommand) -> Result<(), LinkError> {
            self.commands.borrow_mut().push(cmd);
            Ok(())
        }
    }

    struct Harness {
        session: PeerSession<RecordingRendezvous, RecordingDirect>,
        rendezvous: RecordingRendezvous,
        direct: RecordingDirect,
        store: MemoryStore,
        start: Instant,
    }

    fn harness() -> Harness {
        let rendezvous = RecordingRendezvous::default();
        let direct = RecordingDirect::default();
        let store = MemoryStore::new();
        let ctx = SessionContext {
            profile: PlayerProfile {
                peer_id: "me".to_string(),
                username: "Alice".to_string(),
                user_id: None,
            },
            settings: GameSettings::default(),
            timings: SessionTimings::default(),
            physics: PhysicsConfig::default(),
        };
        let session = PeerSession::new(
            ctx,
            rendezvous.clone(),
            direct.clone(),
            Box::new(store.clone()),
            Box::new(LoggingMatchService),
        );
        Harness {
            session,
            rendezvous,
            direct,
            store,
            start: Instant::now(),
        }
    }

    fn match_found(role: Role) -> RendezvousEvent {
        RendezvousEvent::Message(RendezvousMessage::MatchFound {
            match_id: "m1".to_string(),
            role,
            opponent: OpponentInfo {
                id: "them".to_string(),
                username: "Bob".to_string(),
                user_id: None,
            },
        })
    }

    #[test]
    fn test_out_of_range_settings_are_clamped() {
        let ctx = SessionContext {
            profile: PlayerProfile {
                peer_id: "me".to_string(),
                username: "Alice".to_string(),
                user_id: None,
            },
            settings: GameSettings {
                win_score: 0,
                ..GameSettings::default()
            },
            timings: SessionTimings::default(),
            physics: PhysicsConfig {
                virtual_height: 100.0,
                ..PhysicsConfig::default()
            },
        };
        let session = PeerSession::new(
            ctx,
            RecordingRendezvous::default(),
            RecordingDirect::default(),
            Box::new(MemoryStore::new()),
            Box::new(LoggingMatchService),
        );
        assert_eq!(session.settings().win_score, 1);
        assert_eq!(session.ctx.physics.virtual_height, 200.0);
    }

    #[test]
    fn test_join_twice_is_invalid() {
        let mut h = harness();
        h.session.join().unwrap();
        assert_eq!(h.session.state(), SessionState::Queued);
        assert_eq!(
            h.session.join(),
            Err(SessionError::InvalidTransition {
                state: SessionState::Queued,
                action: "join",
            })
        );
    }

    #[test]
    fn test_host_offers_on_match() {
        let mut h = harness();
        h.session.join().unwrap();
        h.session.handle_rendezvous(match_found(Role::Host), h.start);

        assert_eq!(h.session.state(), SessionState::Negotiating);
        assert_eq!(h.session.role(), Some(Role::Host));
        assert_eq!(h.direct.commands.borrow()[0], DirectCommand::CreateOffer);

        h.session.handle_direct(
            DirectEvent::LocalDescription(PayloadKind::Offer, "offer-sdp".to_string()),
            h.start,
        );
        let sent = h.rendezvous.sent.borrow();
        assert_eq!(
            sent.last(),
            Some(&RendezvousMessage::WebrtcOffer {
                match_id: "m1".to_string(),
                offer: "offer-sdp".to_string(),
            })
        );
    }

    #[test]
    fn test_guest_waits_for_offer() {
        let mut h = harness();
        h.session.join().unwrap();
        h.session.handle_rendezvous(match_found(Role::Guest), h.start);

        assert_eq!(h.session.state(), SessionState::Matched);
        assert!(h.direct.commands.borrow().is_empty());

        h.session.handle_rendezvous(
            RendezvousEvent::Message(RendezvousMessage::WebrtcOffer {
                match_id: "m1".to_string(),
                offer: "offer-sdp".to_string(),
            }),
            h.start,
        );
        assert_eq!(h.session.state(), SessionState::Negotiating);
        assert_eq!(
            h.direct.commands.borrow()[0],
            DirectCommand::AcceptOffer("offer-sdp".to_string())
        );
    }

    #[test]
    fn test_handshake_timeout_fails_session() {
        let mut h = harness();
        h.session.join().unwrap();
        h.session.handle_rendezvous(match_found(Role::Host), h.start);

        h.session
            .tick(h.start + Duration::from_secs(9), Direction::Neutral);
        assert_eq!(h.session.state(), SessionState::Negotiating);

        h.session
            .tick(h.start + Duration::from_secs(10), Direction::Neutral);
        assert_eq!(h.session.state(), SessionState::Ended);
        assert!(matches!(
            h.session.end(),
            Some(SessionEnd::ConnectionFailed(reason)) if reason.contains("10 seconds")
        ));
        assert!(*h.rendezvous.closed.borrow());
        assert_eq!(
            h.direct.commands.borrow().last(),
            Some(&DirectCommand::Close)
        );
    }

    #[test]
    fn test_coordinator_error_is_ignored() {
        let mut h = harness();
        h.session.join().unwrap();
        h.session.handle_rendezvous(
            RendezvousEvent::Message(RendezvousMessage::Error {
                message: "player me is not queued".to_string(),
            }),
            h.start,
        );
        assert_eq!(h.session.state(), SessionState::Queued);
        assert!(h.session.end().is_none());
    }

    #[test]
    fn test_leave_cancels() {
        let mut h = harness();
        h.session.join().unwrap();
        h.session.leave().unwrap();
        assert_eq!(h.session.end(), Some(&SessionEnd::Cancelled));
        assert!(h.session.is_closed());
        assert!(h.store.current().is_none());
    }

    #[test]
    fn test_rendezvous_loss_while_queued_fails() {
        let mut h = harness();
        h.session.join().unwrap();
        h.session.handle_rendezvous(RendezvousEvent::Closed, h.start);
        assert!(matches!(
            h.session.end(),
            Some(SessionEnd::ConnectionFailed(_))
        ));
    }

    #[test]
    fn test_peer_id_shape() {
        let id = generate_peer_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}
