// Menu and lobby rendering with Ratatui

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph},
    Frame,
};

use super::state::MenuState;
use crate::ui::{render_overlay, OverlayMessage};

const TITLE: [&str; 5] = [
    "█▀█ █▀█ █▄ █ █▀▀ █▀▄▀█ ▄▀█ ▀█▀ █▀▀ █ █",
    "█▀▀ █ █ █ ▀█ █ █ █ ▀ █ █▀█  █  █   █▀█",
    "▀   ▀▀▀ ▀  ▀ ▀▀▀ ▀   ▀ ▀ ▀  ▀  ▀▀▀ ▀ ▀",
    "",
    "online two-player pong",
];

fn background(frame: &mut Frame) {
    let area = frame.area();
    frame.render_widget(
        Block::default().style(Style::default().bg(Color::Rgb(0, 0, 0))),
        area,
    );
}

pub fn render_menu(frame: &mut Frame, menu_state: &MenuState, username: &str) {
    let area = frame.area();
    background(frame);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7),
            Constraint::Min(4),
            Constraint::Length(3),
        ])
        .split(area);

    let mut title: Vec<Line> = vec![Line::from("")];
    title.extend(TITLE.iter().enumerate().map(|(i, row)| {
        let style = if i < 3 {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        Line::from(Span::styled(*row, style))
    }));
    frame.render_widget(Paragraph::new(title).alignment(Alignment::Center), chunks[0]);

    let mut items: Vec<Line> = menu_state
        .items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            if i == menu_state.selected_index {
                Line::from(Span::styled(
                    format!("> {}", item.display_text()),
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                ))
            } else {
                Line::from(Span::styled(
                    format!("  {}", item.display_text()),
                    Style::default().fg(Color::White),
                ))
            }
        })
        .collect();
    items.push(Line::from(""));
    items.push(Line::from(Span::styled(
        format!("Playing as {}", username),
        Style::default().fg(Color::DarkGray),
    )));
    frame.render_widget(Paragraph::new(items).alignment(Alignment::Center), chunks[1]);

    let controls = Line::from(vec![
        Span::styled("↑/↓", Style::default().fg(Color::Gray)),
        Span::styled(": Navigate  ", Style::default().fg(Color::DarkGray)),
        Span::styled("Enter", Style::default().fg(Color::Gray)),
        Span::styled(": Select  ", Style::default().fg(Color::DarkGray)),
        Span::styled("Q/Esc", Style::default().fg(Color::Gray)),
        Span::styled(": Quit", Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(
        Paragraph::new(controls).alignment(Alignment::Center),
        chunks[2],
    );

    if let Some(notice) = &menu_state.notice {
        render_overlay(frame, notice, area);
    }
}

/// Blank screen with a status box, used while queued and while connecting
pub fn render_lobby(frame: &mut Frame, status: &OverlayMessage) {
    let area = frame.area();
    background(frame);
    render_overlay(frame, status, area);
}
