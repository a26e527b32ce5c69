// Online match driver
// Owns the terminal loop for one match attempt: feeds transport events and local
// input into the session at the frame rate and draws whatever state it is in.

use std::io;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{backend::Backend, Terminal};
use tracing::{info, warn};

use crate::config::Config;
use crate::game::{poll_input, HeldInput, InputAction, Side};
use crate::menu::render_lobby;
use crate::network::{
    DirectChannel, DirectCommand, DirectEvent, DirectLink, RendezvousClient, RendezvousEvent,
    RendezvousLink, Role,
};
use crate::recovery::{FileStore, MemoryStore, RecoveryStore};
use crate::session::{
    generate_peer_id, LoggingMatchService, PeerSession, SessionContext, SessionEnd, SessionState,
};
use crate::ui::{render_match, MatchView, OverlayMessage};

use super::common::limit_frame_rate;

/// Play one online match, from queueing to the result screen. Returns to the menu.
pub fn run_online<B: Backend>(terminal: &mut Terminal<B>, config: &Config) -> io::Result<()> {
    let peer_id = generate_peer_id();
    info!(peer_id = %peer_id, "Starting online session");

    let (direct, direct_events) = DirectChannel::spawn(&config.network)?;
    let (rendezvous, rendezvous_events) =
        match RendezvousClient::connect(&config.network.signaling_server) {
            Ok(link) => link,
            Err(e) => {
                warn!("Rendezvous connect failed: {}", e);
                let _ = direct.command(DirectCommand::Close);
                return show_until_dismissed(
                    terminal,
                    &OverlayMessage::connection_failed("Could not reach the matchmaking server"),
                );
            }
        };

    let store: Box<dyn RecoveryStore> = match FileStore::default_location() {
        Ok(store) => Box::new(store),
        Err(e) => {
            warn!("No recovery store, continuing without one: {}", e);
            Box::new(MemoryStore::new())
        }
    };

    let mut session = PeerSession::new(
        SessionContext::from_config(config, peer_id),
        rendezvous,
        direct,
        store,
        Box::new(LoggingMatchService),
    );
    if let Err(e) = session.join() {
        warn!("Join rejected: {}", e);
    }

    let result = drive(terminal, config, &mut session, &rendezvous_events, &direct_events);
    session.close();
    result
}

fn drive<B: Backend>(
    terminal: &mut Terminal<B>,
    config: &Config,
    session: &mut PeerSession<RendezvousClient, DirectChannel>,
    rendezvous_events: &Receiver<RendezvousEvent>,
    direct_events: &Receiver<DirectEvent>,
) -> io::Result<()> {
    let queued_at = Instant::now();
    let mut held = HeldInput::default();

    loop {
        let now = Instant::now();
        let input = poll_input(&config.keybindings, &mut held, now)?;

        for action in &input.actions {
            match (action, session.state()) {
                (InputAction::Quit | InputAction::Confirm, SessionState::Ended) => return Ok(()),
                (InputAction::Quit, _) => session.quit(),
                _ => {}
            }
        }

        while let Ok(event) = rendezvous_events.try_recv() {
            session.handle_rendezvous(event, now);
        }
        while let Ok(event) = direct_events.try_recv() {
            session.handle_direct(event, now);
        }

        session.tick(now, input.direction);

        if session.end() == Some(&SessionEnd::Cancelled) {
            return Ok(());
        }

        draw(terminal, config, session, queued_at.elapsed())?;
        limit_frame_rate(now);
    }
}

fn draw<B: Backend, R: RendezvousLink, D: DirectLink>(
    terminal: &mut Terminal<B>,
    config: &Config,
    session: &PeerSession<R, D>,
    waited: Duration,
) -> io::Result<()> {
    let opponent = session
        .opponent()
        .map(|o| o.username.as_str())
        .unwrap_or("Opponent");

    let lobby = match (session.state(), session.end()) {
        (SessionState::Idle | SessionState::Queued, _) => {
            Some(OverlayMessage::searching(waited.as_secs()))
        }
        (SessionState::Matched | SessionState::Negotiating, _) => {
            Some(OverlayMessage::connecting(opponent))
        }
        (SessionState::Connected, _) if !session.is_showing_settings() => {
            Some(OverlayMessage::connecting(opponent))
        }
        (_, Some(SessionEnd::ConnectionFailed(reason))) => {
            Some(OverlayMessage::connection_failed(reason))
        }
        _ => None,
    };
    if let Some(status) = lobby {
        terminal.draw(|f| render_lobby(f, &status))?;
        return Ok(());
    }

    let overlay = match session.end() {
        Some(SessionEnd::Outcome(outcome)) => Some(OverlayMessage::outcome(outcome)),
        _ if session.is_showing_settings() => {
            Some(OverlayMessage::settings_preview(opponent, session.settings()))
        }
        _ if session.is_reconnecting() => Some(OverlayMessage::reconnecting()),
        _ => None,
    };

    let me = config.player.username.as_str();
    let (my_side, left_name, right_name) = match session.role() {
        Some(Role::Guest) => (Side::Right, opponent, me),
        _ => (Side::Left, me, opponent),
    };

    let view = MatchView {
        snapshot: session.latest_snapshot(),
        left_name,
        right_name,
        my_side,
        theme: &session.settings().theme,
        display: &config.display,
        physics: &config.physics,
        overlay: overlay.as_ref(),
    };
    terminal.draw(|f| render_match(f, &view))?;
    Ok(())
}

fn show_until_dismissed<B: Backend>(
    terminal: &mut Terminal<B>,
    message: &OverlayMessage,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| render_lobby(f, message))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && matches!(
                        key.code,
                        KeyCode::Enter | KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q')
                    )
                {
                    return Ok(());
                }
            }
        }
    }
}
