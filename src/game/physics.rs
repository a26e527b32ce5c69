use super::input::InputSample;
use super::powerups::PaddleModifiers;
use super::state::{BallState, GameState, Paddle, PaddleState, Side};
use crate::config::PhysicsConfig;

// All constants in virtual coordinates (1200×600)
pub const PADDLE_MARGIN: f32 = 18.0; // Distance from edge in virtual coords
pub const PADDLE_WIDTH: f32 = 20.0;
pub const BALL_SIZE: f32 = 20.0; // Ball diameter in virtual coords (ball.x/y is center)
const BALL_RADIUS: f32 = BALL_SIZE / 2.0;

/// Both paddles' intents for one step. Host plays left, guest plays right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombinedInputs {
    pub local: InputSample,
    pub remote: InputSample,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Positions {
    pub ball: BallState,
    pub left_paddle: PaddleState,
    pub right_paddle: PaddleState,
}

/// What happened during one step
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PhysicsEvents {
    pub paddle_hit: Option<Side>,
    pub wall_collision: bool,
    /// Side that scored
    pub goal: Option<Side>,
}

impl PhysicsEvents {
    pub fn any(&self) -> bool {
        self.paddle_hit.is_some() || self.wall_collision || self.goal.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepResult {
    pub positions: Positions,
    pub events: PhysicsEvents,
}

/// Simulation step used by the authority loop
pub trait Physics {
    fn update(&mut self, inputs: &CombinedInputs, modifiers: &PaddleModifiers, dt: f32)
        -> StepResult;

    fn positions(&self) -> Positions;
}

/// Classic two-paddle Pong on the virtual field
pub struct PongPhysics {
    state: GameState,
}

impl PongPhysics {
    pub fn new(physics: &PhysicsConfig, speed_multiplier: f32) -> Self {
        Self {
            state: GameState::new(physics, speed_multiplier),
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }
}

impl Physics for PongPhysics {
    fn update(
        &mut self,
        inputs: &CombinedInputs,
        modifiers: &PaddleModifiers,
        dt: f32,
    ) -> StepResult {
        let events = update_with_events(&mut self.state, inputs, modifiers, dt);
        StepResult {
            positions: self.positions(),
            events,
        }
    }

    fn positions(&self) -> Positions {
        Positions {
            ball: self.state.ball.state(),
            left_paddle: self.state.left_paddle.state(),
            right_paddle: self.state.right_paddle.state(),
        }
    }
}

pub fn update_with_events(
    state: &mut GameState,
    inputs: &CombinedInputs,
    modifiers: &PaddleModifiers,
    dt: f32,
) -> PhysicsEvents {
    let mut events = PhysicsEvents::default();

    move_paddle(state, Side::Left, inputs.local, modifiers, dt);
    move_paddle(state, Side::Right, inputs.remote, modifiers, dt);

    state.ball.x += state.ball.vx * dt;
    state.ball.y += state.ball.vy * dt;

    // Check wall collisions (top and bottom) - account for ball radius
    if state.ball.y - BALL_RADIUS <= 0.0 {
        state.ball.y = BALL_RADIUS;
        state.ball.vy = state.ball.vy.abs();
        events.wall_collision = true;
    } else if state.ball.y + BALL_RADIUS >= state.field_height {
        state.ball.y = state.field_height - BALL_RADIUS;
        state.ball.vy = -state.ball.vy.abs();
        events.wall_collision = true;
    }

    events.paddle_hit = check_paddle_collision(state);

    // Check goals - ball is out when its edge crosses the boundary
    if state.ball.x - BALL_RADIUS <= 0.0 {
        events.goal = Some(Side::Right);
        state.reset_ball();
    } else if state.ball.x + BALL_RADIUS >= state.field_width {
        events.goal = Some(Side::Left);
        state.reset_ball();
    }

    events
}

fn move_paddle(
    state: &mut GameState,
    side: Side,
    input: InputSample,
    modifiers: &PaddleModifiers,
    dt: f32,
) {
    let modifier = modifiers.for_side(side);
    let height = state.base_paddle_height * modifier.size;
    let speed = state.paddle_speed * modifier.speed;
    let field_height = state.field_height;

    let paddle = state.paddle_mut(side);

    // Resize around the paddle's center so power-ups don't shove it
    let center = paddle.y + paddle.height / 2.0;
    paddle.height = height;
    paddle.y = center - height / 2.0;

    paddle.y += input.direction.axis() * speed * dt;
    paddle.y = paddle.y.clamp(0.0, (field_height - paddle.height).max(0.0));
}

fn check_paddle_collision(state: &mut GameState) -> Option<Side> {
    let mut hit = None;

    // Left paddle collision (in virtual coordinates)
    let left_paddle_left = PADDLE_MARGIN;
    let left_paddle_right = PADDLE_MARGIN + PADDLE_WIDTH;

    if state.ball.vx < 0.0
        && overlaps(&state.ball_bounds(), left_paddle_left, left_paddle_right, &state.left_paddle)
    {
        bounce_off_paddle(state, Side::Left);
        state.ball.x = left_paddle_right + BALL_RADIUS;
        hit = Some(Side::Left);
    }

    let right_paddle_left = state.field_width - PADDLE_MARGIN - PADDLE_WIDTH;
    let right_paddle_right = state.field_width - PADDLE_MARGIN;

    if state.ball.vx > 0.0
        && overlaps(&state.ball_bounds(), right_paddle_left, right_paddle_right, &state.right_paddle)
    {
        bounce_off_paddle(state, Side::Right);
        state.ball.x = right_paddle_left - BALL_RADIUS;
        hit = Some(Side::Right);
    }

    hit
}

struct BallBounds {
    left: f32,
    right: f32,
    top: f32,
    bottom: f32,
}

impl GameState {
    fn ball_bounds(&self) -> BallBounds {
        BallBounds {
            left: self.ball.x - BALL_RADIUS,
            right: self.ball.x + BALL_RADIUS,
            top: self.ball.y - BALL_RADIUS,
            bottom: self.ball.y + BALL_RADIUS,
        }
    }
}

fn overlaps(ball: &BallBounds, paddle_left: f32, paddle_right: f32, paddle: &Paddle) -> bool {
    ball.left <= paddle_right
        && ball.right >= paddle_left
        && ball.bottom >= paddle.y
        && ball.top <= paddle.y + paddle.height
}

fn bounce_off_paddle(state: &mut GameState, side: Side) {
    let paddle = match side {
        Side::Left => &state.left_paddle,
        Side::Right => &state.right_paddle,
    };

    // Where on the paddle the ball hit (0.0 = top, 1.0 = bottom)
    let hit_pos = ((state.ball.y - paddle.y) / paddle.height).clamp(0.0, 1.0);

    // Map hit position to angle (-60 to 60 degrees)
    let max_angle = std::f32::consts::PI / 3.0;
    let angle = (hit_pos - 0.5) * 2.0 * max_angle;

    let ball = &mut state.ball;
    let current_speed = (ball.vx * ball.vx + ball.vy * ball.vy).sqrt();
    let speed = current_speed * state.speed_increase_factor;

    match side {
        Side::Left => ball.vx = angle.cos() * speed,
        Side::Right => ball.vx = -angle.cos() * speed,
    }
    ball.vy = angle.sin() * speed;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::input::{Direction, InputOrigin};

    fn inputs(local: Direction, remote: Direction) -> CombinedInputs {
        CombinedInputs {
            local: InputSample::new(local, InputOrigin::HostLocal),
            remote: InputSample::new(remote, InputOrigin::GuestForwarded),
        }
    }

    #[test]
    fn test_paddles_follow_their_own_input() {
        let mut physics = PongPhysics::new(&PhysicsConfig::default(), 1.0);
        let before = physics.positions();

        physics.update(
            &inputs(Direction::Up, Direction::Down),
            &PaddleModifiers::default(),
            0.1,
        );

        let after = physics.positions();
        assert!(after.left_paddle.y < before.left_paddle.y);
        assert!(after.right_paddle.y > before.right_paddle.y);
    }

    #[test]
    fn test_paddle_clamped_to_field() {
        let mut physics = PongPhysics::new(&PhysicsConfig::default(), 1.0);
        for _ in 0..100 {
            physics.update(
                &inputs(Direction::Up, Direction::Neutral),
                &PaddleModifiers::default(),
                0.1,
            );
        }
        assert_eq!(physics.positions().left_paddle.y, 0.0);
    }

    #[test]
    fn test_goal_reports_scorer_and_reserves() {
        let mut physics = PongPhysics::new(&PhysicsConfig::default(), 1.0);
        // Ball heading left past a paddle parked at the top
        physics.state.left_paddle.y = 0.0;
        physics.state.ball.x = BALL_RADIUS + 1.0;
        physics.state.ball.y = 500.0;
        physics.state.ball.vx = -600.0;
        physics.state.ball.vy = 0.0;

        let step = physics.update(
            &inputs(Direction::Neutral, Direction::Neutral),
            &PaddleModifiers::default(),
            1.0 / 60.0,
        );

        assert_eq!(step.events.goal, Some(Side::Right));
        assert_eq!(step.positions.ball.x, physics.state.field_width / 2.0);
    }

    #[test]
    fn test_size_modifier_resizes_paddle() {
        let mut physics = PongPhysics::new(&PhysicsConfig::default(), 1.0);
        let mut modifiers = PaddleModifiers::default();
        modifiers.right.size = 1.5;

        let step = physics.update(
            &inputs(Direction::Neutral, Direction::Neutral),
            &modifiers,
            1.0 / 60.0,
        );

        assert_eq!(step.positions.right_paddle.height, 135.0);
        assert_eq!(step.positions.left_paddle.height, 90.0);
    }
}
