// Centered message boxes drawn over the field or the lobby screen

use ratatui::{
    layout::{Alignment, Margin, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use crate::network::protocol::{BallSpeed, GameSettings};
use crate::session::{MatchOutcome, Winner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayStyle {
    Info,
    Warning,
    Error,
    Success,
}

impl OverlayStyle {
    fn border(self) -> Color {
        match self {
            OverlayStyle::Info => Color::Cyan,
            OverlayStyle::Warning => Color::Yellow,
            OverlayStyle::Error => Color::Red,
            OverlayStyle::Success => Color::Green,
        }
    }

    fn text(self) -> Color {
        match self {
            OverlayStyle::Info => Color::White,
            OverlayStyle::Warning => Color::Yellow,
            OverlayStyle::Error => Color::LightRed,
            OverlayStyle::Success => Color::LightGreen,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayMessage {
    pub title: Option<String>,
    pub lines: Vec<String>,
    pub style: OverlayStyle,
}

impl OverlayMessage {
    pub fn new(style: OverlayStyle, lines: Vec<String>) -> Self {
        Self {
            title: None,
            lines,
            style,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn searching(waited_secs: u64) -> Self {
        Self::new(
            OverlayStyle::Info,
            vec![
                "Looking for an opponent...".to_string(),
                format!("{}s", waited_secs),
                String::new(),
                "Q to cancel".to_string(),
            ],
        )
        .with_title("Matchmaking")
    }

    pub fn connecting(opponent: &str) -> Self {
        Self::new(
            OverlayStyle::Info,
            vec![
                format!("Matched with {}", opponent),
                "Opening direct connection...".to_string(),
            ],
        )
    }

    /// What the guest sees before play starts
    pub fn settings_preview(host: &str, settings: &GameSettings) -> Self {
        let speed = match settings.ball_speed {
            BallSpeed::Slow => "slow",
            BallSpeed::Normal => "normal",
            BallSpeed::Fast => "fast",
        };
        Self::new(
            OverlayStyle::Info,
            vec![
                format!("First to {}", settings.win_score),
                format!("Ball speed: {}", speed),
                format!(
                    "Power-ups: {}",
                    if settings.power_ups { "on" } else { "off" }
                ),
                String::new(),
                "Get ready!".to_string(),
            ],
        )
        .with_title(format!("{}'s settings", host))
    }

    pub fn reconnecting() -> Self {
        Self::new(
            OverlayStyle::Warning,
            vec!["Connection unstable, waiting for opponent...".to_string()],
        )
    }

    pub fn outcome(outcome: &MatchOutcome) -> Self {
        let style = match outcome.winner {
            Winner::Me => OverlayStyle::Success,
            Winner::Opponent => OverlayStyle::Warning,
        };
        Self::new(
            style,
            vec![
                outcome.headline(),
                outcome.score_line(),
                String::new(),
                "Enter to return to menu".to_string(),
            ],
        )
        .with_title("Match over")
    }

    pub fn connection_failed(reason: &str) -> Self {
        Self::new(
            OverlayStyle::Error,
            vec![
                reason.to_string(),
                String::new(),
                "Enter to return to menu".to_string(),
            ],
        )
        .with_title("Connection failed")
    }
}

pub fn render_overlay(frame: &mut Frame, message: &OverlayMessage, area: Rect) {
    let widest = message
        .lines
        .iter()
        .chain(message.title.iter())
        .map(|line| line.chars().count())
        .max()
        .unwrap_or(0) as u16;

    let width = (widest + 6).min(area.width.saturating_sub(4));
    let height = (message.lines.len() as u16 + 4).min(area.height.saturating_sub(2));
    let boxed = Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    };

    frame.render_widget(Clear, boxed);

    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(message.style.border()))
        .style(Style::default().bg(Color::Rgb(20, 20, 20)));
    if let Some(title) = &message.title {
        block = block.title(format!(" {} ", title));
    }
    frame.render_widget(block, boxed);

    let text: Vec<Line> = message
        .lines
        .iter()
        .map(|line| {
            Line::from(Span::styled(
                line.clone(),
                Style::default().fg(message.style.text()),
            ))
        })
        .collect();
    frame.render_widget(
        Paragraph::new(text).alignment(Alignment::Center),
        boxed.inner(Margin::new(2, 1)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::OutcomeReason;

    #[test]
    fn test_outcome_overlay_style() {
        let outcome = MatchOutcome {
            winner: Winner::Me,
            my_score: 5,
            opponent_score: 0,
            reason: OutcomeReason::OpponentQuit,
            opponent_name: "Bob".to_string(),
            duration_secs: 12,
        };
        let overlay = OverlayMessage::outcome(&outcome);
        assert_eq!(overlay.style, OverlayStyle::Success);
        assert_eq!(overlay.lines[0], "Bob quit, you win");
    }

    #[test]
    fn test_settings_preview_lists_host_choices() {
        let settings = GameSettings {
            ball_speed: BallSpeed::Fast,
            win_score: 7,
            power_ups: false,
            ..GameSettings::default()
        };
        let overlay = OverlayMessage::settings_preview("Alice", &settings);
        assert_eq!(overlay.title.as_deref(), Some("Alice's settings"));
        assert!(overlay.lines.contains(&"First to 7".to_string()));
        assert!(overlay.lines.contains(&"Ball speed: fast".to_string()));
        assert!(overlay.lines.contains(&"Power-ups: off".to_string()));
    }
}
