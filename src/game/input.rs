use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::config::KeyBindings;

// Terminals without key-release reporting only send presses and auto-repeats,
// so a press holds the direction until repeats stop arriving
const HOLD_WINDOW: Duration = Duration::from_millis(150);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    #[default]
    Neutral,
}

impl Direction {
    /// Vertical axis in field coordinates (y grows downward)
    pub fn axis(self) -> f32 {
        match self {
            Direction::Up => -1.0,
            Direction::Down => 1.0,
            Direction::Neutral => 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputOrigin {
    HostLocal,
    GuestForwarded,
}

/// One player's intent for one tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputSample {
    pub direction: Direction,
    pub origin: InputOrigin,
}

impl InputSample {
    pub fn new(direction: Direction, origin: InputOrigin) -> Self {
        Self { direction, origin }
    }

    pub fn neutral(origin: InputOrigin) -> Self {
        Self::new(Direction::Neutral, origin)
    }

    pub fn flags(&self) -> InputFlags {
        InputFlags {
            up: self.direction == Direction::Up,
            down: self.direction == Direction::Down,
        }
    }

    pub fn from_flags(flags: InputFlags, origin: InputOrigin) -> Self {
        let direction = match (flags.up, flags.down) {
            (true, false) => Direction::Up,
            (false, true) => Direction::Down,
            _ => Direction::Neutral,
        };
        Self::new(direction, origin)
    }
}

/// Wire shape of a forwarded input: `{"up": bool, "down": bool}`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFlags {
    pub up: bool,
    pub down: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputAction {
    Quit,
    Confirm,
}

/// What the local player did since the last frame
#[derive(Debug, Default)]
pub struct FrameInput {
    pub direction: Direction,
    pub actions: Vec<InputAction>,
}

/// Tracks the held paddle direction across frames
#[derive(Debug, Default)]
pub struct HeldInput {
    held: Option<(Direction, Instant)>,
}

impl HeldInput {
    pub fn press(&mut self, direction: Direction, now: Instant) {
        self.held = Some((direction, now + HOLD_WINDOW));
    }

    pub fn release(&mut self, direction: Direction) {
        if matches!(self.held, Some((held, _)) if held == direction) {
            self.held = None;
        }
    }

    pub fn direction(&self, now: Instant) -> Direction {
        match self.held {
            Some((direction, until)) if now < until => direction,
            _ => Direction::Neutral,
        }
    }
}

/// Parse a key binding name ("W", "Up", "Esc", ...) into a key code
pub fn parse_key(name: &str) -> Option<KeyCode> {
    match name {
        "Up" => Some(KeyCode::Up),
        "Down" => Some(KeyCode::Down),
        "Left" => Some(KeyCode::Left),
        "Right" => Some(KeyCode::Right),
        "Enter" => Some(KeyCode::Enter),
        "Esc" => Some(KeyCode::Esc),
        "Space" => Some(KeyCode::Char(' ')),
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(KeyCode::Char(c.to_ascii_lowercase())),
                _ => None,
            }
        }
    }
}

fn key_matches(binding: &str, code: KeyCode) -> bool {
    let code = match code {
        KeyCode::Char(c) => KeyCode::Char(c.to_ascii_lowercase()),
        other => other,
    };
    parse_key(binding) == Some(code)
}

/// Drain pending terminal events into this frame's input
pub fn poll_input(
    bindings: &KeyBindings,
    held: &mut HeldInput,
    now: Instant,
) -> Result<FrameInput, std::io::Error> {
    let mut frame = FrameInput::default();

    while event::poll(Duration::from_millis(0))? {
        if let Event::Key(key) = event::read()? {
            let direction = if key_matches(&bindings.paddle_up, key.code) {
                Some(Direction::Up)
            } else if key_matches(&bindings.paddle_down, key.code) {
                Some(Direction::Down)
            } else {
                None
            };

            match (key.kind, direction) {
                (KeyEventKind::Press | KeyEventKind::Repeat, Some(direction)) => {
                    held.press(direction, now)
                }
                (KeyEventKind::Release, Some(direction)) => held.release(direction),
                (KeyEventKind::Press, None) => {
                    if key_matches(&bindings.quit, key.code) || key.code == KeyCode::Esc {
                        frame.actions.push(InputAction::Quit);
                    } else if key.code == KeyCode::Enter {
                        frame.actions.push(InputAction::Confirm);
                    }
                }
                _ => {}
            }
        }
    }

    frame.direction = held.direction(now);
    Ok(frame)
}
