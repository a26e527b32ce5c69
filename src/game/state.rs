use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use super::powerups::{ActiveEffect, PaddleModifiers, PowerUp};
use crate::config::PhysicsConfig;

// Virtual coordinate system - the "true" game field that physics runs in
// Both peers see the same virtual field, but render it to their terminal size
pub const VIRTUAL_WIDTH: f32 = 1200.0;
pub const VIRTUAL_HEIGHT: f32 = 600.0;

/// Field side. The host always plays the left paddle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl Ball {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            vx: 0.0,
            vy: 0.0,
        }
    }

    pub fn reset(&mut self, x: f32, y: f32, angle: f32, speed: f32) {
        self.x = x;
        self.y = y;
        self.vx = angle.cos() * speed;
        self.vy = angle.sin() * speed;
    }

    pub fn state(&self) -> BallState {
        BallState {
            x: self.x,
            y: self.y,
            vx: self.vx,
            vy: self.vy,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Paddle {
    pub y: f32,
    pub height: f32,
}

impl Paddle {
    pub fn new(y: f32, height: f32) -> Self {
        Self { y, height }
    }

    pub fn state(&self) -> PaddleState {
        PaddleState {
            y: self.y,
            height: self.height,
        }
    }
}

/// Physics world advanced by the host. Scores live in the authority loop, not here.
#[derive(Debug, Clone)]
pub struct GameState {
    pub ball: Ball,
    pub left_paddle: Paddle,
    pub right_paddle: Paddle,
    pub field_width: f32,
    pub field_height: f32,
    pub serve_count: u8,            // Track serves for tennis tiebreak pattern
    pub ball_speed: f32,            // Serve speed in virtual units per second
    pub base_paddle_height: f32,    // Paddle height before modifiers
    pub paddle_speed: f32,          // Paddle travel per second before modifiers
    pub speed_increase_factor: f32, // Ball speed multiplier on each paddle hit
}

impl GameState {
    pub fn new(physics: &PhysicsConfig, speed_multiplier: f32) -> Self {
        let field_width = physics.virtual_width;
        let field_height = physics.virtual_height;
        let ball_speed = physics.ball_initial_speed * speed_multiplier;
        let paddle_height = physics.paddle_height;

        let mut ball = Ball::new(field_width / 2.0, field_height / 2.0);

        // Initial serve towards left player
        ball.reset(field_width / 2.0, field_height / 2.0, PI, ball_speed);

        let center_y = field_height / 2.0 - paddle_height / 2.0;

        Self {
            ball,
            left_paddle: Paddle::new(center_y, paddle_height),
            right_paddle: Paddle::new(center_y, paddle_height),
            field_width,
            field_height,
            serve_count: 1, // Start at 1 since initial serve was to left (counts as serve 0)
            ball_speed,
            base_paddle_height: paddle_height,
            paddle_speed: physics.paddle_speed,
            speed_increase_factor: physics.ball_speed_multiplier,
        }
    }

    pub fn paddle_mut(&mut self, side: Side) -> &mut Paddle {
        match side {
            Side::Left => &mut self.left_paddle,
            Side::Right => &mut self.right_paddle,
        }
    }

    pub fn reset_ball(&mut self) {
        // Tennis snake serve pattern:
        // Serve 0: Left (1 serve)
        // Serves 1-2: Right, Right (2 serves)
        // Serves 3-4: Left, Left (2 serves)
        // Pattern: L, R-R, L-L, R-R, L-L, ...
        let serve_to_left = match self.serve_count {
            0 => true,
            n => ((n - 1) / 2) % 2 == 1,
        };

        let angle = if serve_to_left { PI } else { 0.0 };

        self.serve_count = self.serve_count.wrapping_add(1);

        self.ball.reset(
            self.field_width / 2.0,
            self.field_height / 2.0,
            angle,
            self.ball_speed,
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallState {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaddleState {
    pub y: f32,
    pub height: f32,
}

/// Score pair, host first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub host: u8,
    pub guest: u8,
}

impl Score {
    pub fn new(host: u8, guest: u8) -> Self {
        Self { host, guest }
    }

    pub fn credit(&mut self, side: Side) {
        match side {
            Side::Left => self.host = self.host.saturating_add(1),
            Side::Right => self.guest = self.guest.saturating_add(1),
        }
    }

    pub fn leader_reached(&self, win_score: u8) -> Option<Side> {
        if self.host >= win_score {
            Some(Side::Left)
        } else if self.guest >= win_score {
            Some(Side::Right)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Playing,
    Finished,
}

/// One full authoritative state broadcast from host to guest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub tick: u64,
    pub ball: BallState,
    pub left_paddle: PaddleState,
    pub right_paddle: PaddleState,
    pub score: Score,
    pub elapsed_secs: f32,
    pub status: MatchStatus,
    pub power_ups: Vec<PowerUp>,
    pub effects: Vec<ActiveEffect>,
    pub modifiers: PaddleModifiers,
}

impl GameSnapshot {
    pub fn is_finished(&self) -> bool {
        self.status == MatchStatus::Finished
    }
}
