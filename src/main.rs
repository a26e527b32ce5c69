use std::io;

use clap::Parser;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use tracing::{info, warn};

use pongmatch::config::{self, Config};
use pongmatch::menu::{self, AppState, MenuAction, MenuState};
use pongmatch::recovery::{check_interrupted, FileStore};
use pongmatch::ui::OverlayMessage;
use pongmatch::{game_modes, logging};

#[derive(Parser, Debug)]
#[command(name = "pongmatch", about = "Online two-player Pong")]
struct Args {
    /// Write debug logs to /tmp/pongmatch-debug.log
    #[arg(long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init_client(args.debug)?;

    let config = config::load_config()?;
    info!(username = %config.player.username, "pongmatch starting");

    // A match that was in flight when we last exited counts as a loss
    let notice = match FileStore::default_location() {
        Ok(mut store) => check_interrupted(&mut store).map(|outcome| OverlayMessage::outcome(&outcome)),
        Err(e) => {
            warn!("Recovery store unavailable: {}", e);
            None
        }
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = run_app(&mut terminal, &config, notice);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result.map_err(Into::into)
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    config: &Config,
    notice: Option<OverlayMessage>,
) -> io::Result<()> {
    let mut menu_state = match notice {
        Some(notice) => MenuState::with_notice(notice),
        None => MenuState::new(),
    };
    let mut app_state = AppState::Menu;

    loop {
        match app_state {
            AppState::Menu => {
                terminal.draw(|f| menu::render_menu(f, &menu_state, &config.player.username))?;
                app_state = match menu::handle_menu_input(&mut menu_state)? {
                    MenuAction::None => AppState::Menu,
                    MenuAction::FindMatch => AppState::Online,
                    MenuAction::Quit => AppState::Exiting,
                };
            }
            AppState::Online => {
                game_modes::run_online(terminal, config)?;
                app_state = AppState::Menu;
            }
            AppState::Exiting => break,
        }
    }

    info!("pongmatch exiting");
    Ok(())
}
