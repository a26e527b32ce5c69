use ratatui::{
    layout::{Alignment, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph},
    Frame,
};

use super::braille::{BrailleCanvas, DIGIT_HEIGHT};
use super::overlay::{render_overlay, OverlayMessage};
use crate::config::{DisplayConfig, PhysicsConfig};
use crate::game::physics::{BALL_SIZE, PADDLE_MARGIN, PADDLE_WIDTH};
use crate::game::powerups::POWER_UP_SIZE;
use crate::game::{ActiveEffect, GameSnapshot, PowerUpKind, Side};
use crate::FIXED_TIMESTEP;

// Rows 0-4 hold the scores, row 5 shares the top border, last row is the bottom border
const HEADER_ROWS: u16 = 5;
const FOOTER_ROWS: u16 = 1;

/// Everything the field renderer needs besides the snapshot
pub struct MatchView<'a> {
    pub snapshot: Option<&'a GameSnapshot>,
    pub left_name: &'a str,
    pub right_name: &'a str,
    /// Which paddle is ours, for the hint line
    pub my_side: Side,
    pub theme: &'a str,
    pub display: &'a DisplayConfig,
    pub physics: &'a PhysicsConfig,
    pub overlay: Option<&'a OverlayMessage>,
}

struct Palette {
    field: Color,
    ball: Color,
    center: Color,
    hint: Color,
}

fn rgb([r, g, b]: [u8; 3]) -> Color {
    Color::Rgb(r, g, b)
}

// The theme is a local preference; unknown names fall back to the configured colors
fn palette(theme: &str, display: &DisplayConfig) -> Palette {
    match theme {
        "neon" => Palette {
            field: Color::Rgb(255, 0, 200),
            ball: Color::Rgb(0, 255, 255),
            center: Color::Rgb(90, 0, 120),
            hint: Color::Rgb(150, 80, 200),
        },
        "retro" => Palette {
            field: Color::Rgb(60, 255, 60),
            ball: Color::Rgb(60, 255, 60),
            center: Color::Rgb(20, 110, 20),
            hint: Color::Rgb(30, 150, 30),
        },
        _ => Palette {
            field: rgb(display.paddle_color),
            ball: rgb(display.ball_color),
            center: rgb(display.center_line_color),
            hint: Color::DarkGray,
        },
    }
}

pub fn render_match(frame: &mut Frame, view: &MatchView) {
    let area = frame.area();
    let colors = palette(view.theme, view.display);

    frame.render_widget(
        Block::default().style(Style::default().bg(Color::Rgb(0, 0, 0))),
        area,
    );

    if area.height <= HEADER_ROWS + FOOTER_ROWS + 2 {
        return;
    }

    let field_rows = area.height - HEADER_ROWS - FOOTER_ROWS;
    let field_top = HEADER_ROWS as usize * 4;
    let field_height = field_rows as usize * 4;

    // Field and decorations share a canvas; the ball gets its own layer for color
    let mut canvas = BrailleCanvas::new(area.width as usize, area.height as usize);
    let mut ball_layer = BrailleCanvas::new(area.width as usize, area.height as usize);

    canvas.horizontal_line(field_top - 1);
    canvas.horizontal_line(field_top + field_height);

    let scale_x = canvas.pixel_width() as f32 / view.physics.virtual_width;
    let scale_y = field_height as f32 / view.physics.virtual_height;
    let to_x = |vx: f32| (vx.max(0.0) * scale_x) as usize;
    let to_y = |vy: f32| field_top + (vy.max(0.0) * scale_y) as usize;

    let mut center_canvas = BrailleCanvas::new(area.width as usize, area.height as usize);
    center_canvas.dashed_vertical(to_x(view.physics.virtual_width / 2.0), field_top, field_height);

    if let Some(snapshot) = view.snapshot {
        draw_scores(&mut canvas, snapshot);

        let paddle_width = ((PADDLE_WIDTH * scale_x) as usize).max(1);
        let right_x = view.physics.virtual_width - PADDLE_MARGIN - PADDLE_WIDTH;
        for (x, paddle) in [
            (PADDLE_MARGIN, &snapshot.left_paddle),
            (right_x, &snapshot.right_paddle),
        ] {
            canvas.fill_rect(
                to_x(x),
                to_y(paddle.y),
                paddle_width,
                ((paddle.height * scale_y) as usize).max(1),
            );
        }

        for item in &snapshot.power_ups {
            let w = ((POWER_UP_SIZE * scale_x) as usize).max(2);
            let h = ((POWER_UP_SIZE * scale_y) as usize).max(2);
            canvas.outline_rect(
                to_x(item.x).saturating_sub(w / 2),
                to_y(item.y).saturating_sub(h / 2),
                w,
                h,
            );
        }

        let ball_w = ((BALL_SIZE * scale_x) as usize).max(1);
        let ball_h = ((BALL_SIZE * scale_y) as usize).max(1);
        ball_layer.fill_rect(
            to_x(snapshot.ball.x).saturating_sub(ball_w / 2),
            to_y(snapshot.ball.y).saturating_sub(ball_h / 2),
            ball_w,
            ball_h,
        );
    }

    draw_layers(
        frame,
        area,
        &[
            (&center_canvas, colors.center),
            (&canvas, colors.field),
            (&ball_layer, colors.ball),
        ],
    );

    draw_names(frame, area, view, colors.hint);
    if let Some(snapshot) = view.snapshot {
        draw_effects(frame, area, &snapshot.effects, colors.hint);
    }

    if let Some(overlay) = view.overlay {
        render_overlay(frame, overlay, area);
    }
}

fn draw_scores(canvas: &mut BrailleCanvas, snapshot: &GameSnapshot) {
    let width = canvas.pixel_width();
    let top = (HEADER_ROWS as usize * 4).saturating_sub(DIGIT_HEIGHT) / 2;

    let left = snapshot.score.host;
    let right = snapshot.score.guest;
    canvas.draw_number(left, (width / 3).saturating_sub(BrailleCanvas::number_width(left) / 2), top);
    canvas.draw_number(
        right,
        (width * 2 / 3).saturating_sub(BrailleCanvas::number_width(right) / 2),
        top,
    );
}

// Later layers win where cells overlap
fn draw_layers(frame: &mut Frame, area: Rect, layers: &[(&BrailleCanvas, Color)]) {
    for row in 0..area.height as usize {
        let mut spans = Vec::with_capacity(area.width as usize);
        for col in 0..area.width as usize {
            let mut cell = (' ', Color::Reset);
            for (canvas, color) in layers {
                let ch = canvas.char_at(col, row);
                if ch != '\u{2800}' && ch != ' ' {
                    cell = (ch, *color);
                }
            }
            spans.push(Span::styled(cell.0.to_string(), Style::default().fg(cell.1)));
        }
        frame.render_widget(
            Paragraph::new(Line::from(spans)),
            Rect {
                x: area.x,
                y: area.y + row as u16,
                width: area.width,
                height: 1,
            },
        );
    }
}

fn draw_names(frame: &mut Frame, area: Rect, view: &MatchView, color: Color) {
    let (left_tag, right_tag) = match view.my_side {
        Side::Left => (" (you)", ""),
        Side::Right => ("", " (you)"),
    };
    let line = format!(
        "{}{}  vs  {}{}",
        view.left_name, left_tag, view.right_name, right_tag
    );
    frame.render_widget(
        Paragraph::new(line)
            .style(Style::default().fg(color))
            .alignment(Alignment::Center),
        Rect {
            x: area.x,
            y: area.y + HEADER_ROWS - 1,
            width: area.width,
            height: 1,
        },
    );
}

fn effect_label(effect: &ActiveEffect) -> String {
    let name = match effect.kind {
        PowerUpKind::Grow => "big paddle",
        PowerUpKind::Shrink => "shrink",
        PowerUpKind::Speed => "speed",
        PowerUpKind::Slow => "slow",
    };
    let side = match effect.owner {
        Side::Left => "L",
        Side::Right => "R",
    };
    let secs = (effect.remaining_ticks as f32 * FIXED_TIMESTEP).ceil() as u32;
    format!("{} {} {}s", side, name, secs)
}

fn draw_effects(frame: &mut Frame, area: Rect, effects: &[ActiveEffect], color: Color) {
    if effects.is_empty() {
        return;
    }
    let text = effects
        .iter()
        .map(effect_label)
        .collect::<Vec<_>>()
        .join("   ");
    frame.render_widget(
        Paragraph::new(text)
            .style(Style::default().fg(color))
            .alignment(Alignment::Center),
        Rect {
            x: area.x,
            y: area.y + area.height - 1,
            width: area.width,
            height: 1,
        },
    );
}
