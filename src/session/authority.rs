// Host-side simulation loop
// One step per render tick: combine inputs, fold power-up modifiers, advance
// physics, score, and emit a full snapshot for the guest.

use crate::config::PhysicsConfig;
use crate::game::{
    CombinedInputs, Direction, GameSnapshot, InputFlags, InputOrigin, InputSample, MatchStatus,
    PaddleModifiers, Physics, PongPhysics, PowerUpField, Score, Side,
};
use crate::network::protocol::GameSettings;
use crate::FIXED_TIMESTEP;

pub struct AuthorityLoop<P: Physics = PongPhysics> {
    physics: P,
    power_ups: Option<PowerUpField>,
    score: Score,
    win_score: u8,
    tick: u64,
    elapsed_secs: f32,
    status: MatchStatus,
    // Repeated until the guest sends something newer
    last_remote: InputSample,
    last_hitter: Option<Side>,
}

impl AuthorityLoop<PongPhysics> {
    /// Standard Pong physics at the settings' ball speed tier
    pub fn pong(settings: &GameSettings, physics: &PhysicsConfig) -> Self {
        let engine = PongPhysics::new(physics, settings.ball_speed.multiplier());
        Self::new(engine, settings, physics)
    }
}

impl<P: Physics> AuthorityLoop<P> {
    pub fn new(physics: P, settings: &GameSettings, physics_config: &PhysicsConfig) -> Self {
        Self {
            physics,
            power_ups: settings
                .power_ups
                .then(|| PowerUpField::new(physics_config)),
            score: Score::default(),
            win_score: settings.win_score,
            tick: 0,
            elapsed_secs: 0.0,
            status: MatchStatus::Playing,
            last_remote: InputSample::neutral(InputOrigin::GuestForwarded),
            last_hitter: None,
        }
    }

    /// Latest forwarded guest input; used for every step until replaced
    pub fn receive_remote(&mut self, input: InputFlags) {
        self.last_remote = InputSample::from_flags(input, InputOrigin::GuestForwarded);
    }

    /// Advance one tick. Once finished, further calls return the final snapshot unchanged.
    pub fn step(&mut self, local: Direction) -> GameSnapshot {
        if self.status == MatchStatus::Finished {
            return self.snapshot();
        }

        let modifiers = self.modifiers();
        let inputs = CombinedInputs {
            local: InputSample::new(local, InputOrigin::HostLocal),
            remote: self.last_remote,
        };
        let result = self.physics.update(&inputs, &modifiers, FIXED_TIMESTEP);

        self.tick += 1;
        self.elapsed_secs += FIXED_TIMESTEP;

        if let Some(side) = result.events.paddle_hit {
            self.last_hitter = Some(side);
        }

        if let Some(scorer) = result.events.goal {
            self.score.credit(scorer);
            self.last_hitter = None;
            if self.score.leader_reached(self.win_score).is_some() {
                self.status = MatchStatus::Finished;
            }
        }

        if let Some(field) = self.power_ups.as_mut() {
            field.tick(&result.positions.ball, self.last_hitter);
        }

        self.snapshot()
    }

    pub fn snapshot(&self) -> GameSnapshot {
        let positions = self.physics.positions();
        let (power_ups, effects) = match &self.power_ups {
            Some(field) => (field.items().to_vec(), field.effects().to_vec()),
            None => (Vec::new(), Vec::new()),
        };

        GameSnapshot {
            tick: self.tick,
            ball: positions.ball,
            left_paddle: positions.left_paddle,
            right_paddle: positions.right_paddle,
            score: self.score,
            elapsed_secs: self.elapsed_secs,
            status: self.status,
            power_ups,
            effects,
            modifiers: self.modifiers(),
        }
    }

    fn modifiers(&self) -> PaddleModifiers {
        self.power_ups
            .as_ref()
            .map(PowerUpField::modifiers)
            .unwrap_or_default()
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn is_finished(&self) -> bool {
        self.status == MatchStatus::Finished
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{PhysicsEvents, Positions};
    use crate::game::physics::StepResult;
    use crate::game::state::{BallState, PaddleState};

    /// Scores for the left side on a fixed schedule and records what it was fed
    struct ScriptedPhysics {
        goal_every: u64,
        steps: u64,
        seen_remote: Vec<Direction>,
    }

    impl ScriptedPhysics {
        fn new(goal_every: u64) -> Self {
            Self {
                goal_every,
                steps: 0,
                seen_remote: Vec::new(),
            }
        }
    }

    impl Physics for ScriptedPhysics {
        fn update(
            &mut self,
            inputs: &CombinedInputs,
            _modifiers: &PaddleModifiers,
            _dt: f32,
        ) -> StepResult {
            self.steps += 1;
            self.seen_remote.push(inputs.remote.direction);
            let goal = (self.steps % self.goal_every == 0).then_some(Side::Left);
            StepResult {
                positions: self.positions(),
                events: PhysicsEvents {
                    goal,
                    ..PhysicsEvents::default()
                },
            }
        }

        fn positions(&self) -> Positions {
            Positions {
                ball: BallState {
                    x: self.steps as f32,
                    y: 0.0,
                    vx: 0.0,
                    vy: 0.0,
                },
                left_paddle: PaddleState {
                    y: 0.0,
                    height: 90.0,
                },
                right_paddle: PaddleState {
                    y: 0.0,
                    height: 90.0,
                },
            }
        }
    }

    fn settings(win_score: u8) -> GameSettings {
        GameSettings {
            win_score,
            power_ups: false,
            ..GameSettings::default()
        }
    }

    #[test]
    fn test_finishes_at_win_score_and_freezes() {
        let mut authority = AuthorityLoop::new(
            ScriptedPhysics::new(10),
            &settings(5),
            &PhysicsConfig::default(),
        );

        let mut last = authority.snapshot();
        while !last.is_finished() {
            last = authority.step(Direction::Neutral);
        }
        assert_eq!(last.score, Score::new(5, 0));
        assert_eq!(last.tick, 50);

        let again = authority.step(Direction::Up);
        assert_eq!(again, last);
    }

    #[test]
    fn test_stale_remote_input_repeats() {
        let mut authority = AuthorityLoop::new(
            ScriptedPhysics::new(1000),
            &settings(5),
            &PhysicsConfig::default(),
        );

        authority.step(Direction::Neutral);
        authority.receive_remote(InputFlags {
            up: true,
            down: false,
        });
        authority.step(Direction::Neutral);
        // No new input these ticks
        authority.step(Direction::Neutral);
        authority.step(Direction::Neutral);

        assert_eq!(
            authority.physics.seen_remote,
            vec![
                Direction::Neutral,
                Direction::Up,
                Direction::Up,
                Direction::Up
            ]
        );
    }

    #[test]
    fn test_same_inputs_same_snapshots() {
        let run = || {
            let settings = GameSettings {
                power_ups: true,
                ..GameSettings::default()
            };
            let mut authority = AuthorityLoop::pong(&settings, &PhysicsConfig::default());
            let mut snapshots = Vec::new();
            for tick in 0..1500u32 {
                let local = match tick % 7 {
                    0..=2 => Direction::Up,
                    3 => Direction::Neutral,
                    _ => Direction::Down,
                };
                if tick % 5 == 0 {
                    authority.receive_remote(InputFlags {
                        up: tick % 3 == 0,
                        down: tick % 3 == 1,
                    });
                }
                snapshots.push(authority.step(local));
            }
            snapshots
        };

        assert_eq!(run(), run());
    }
}
