// Power-up spawning and effect bookkeeping (host only)
// Spawns come from a seeded RNG so two runs with the same inputs stay identical

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::physics::BALL_SIZE;
use super::state::{BallState, Side};
use crate::config::PhysicsConfig;

pub const POWER_UP_SIZE: f32 = 30.0;

const GROW_FACTOR: f32 = 1.5;
const SHRINK_FACTOR: f32 = 0.6;
const SPEED_FACTOR: f32 = 1.5;
const SLOW_FACTOR: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerUpKind {
    /// Collector's paddle grows
    Grow,
    /// Opponent's paddle shrinks
    Shrink,
    /// Collector's paddle moves faster
    Speed,
    /// Opponent's paddle moves slower
    Slow,
}

impl PowerUpKind {
    const ALL: [PowerUpKind; 4] = [
        PowerUpKind::Grow,
        PowerUpKind::Shrink,
        PowerUpKind::Speed,
        PowerUpKind::Slow,
    ];
}

/// A power-up waiting on the field to be collected
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerUp {
    pub id: u32,
    pub kind: PowerUpKind,
    pub x: f32,
    pub y: f32,
}

/// A collected power-up still in effect
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveEffect {
    pub kind: PowerUpKind,
    pub owner: Side,
    pub remaining_ticks: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Modifier {
    pub speed: f32,
    pub size: f32,
}

impl Default for Modifier {
    fn default() -> Self {
        Self {
            speed: 1.0,
            size: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PaddleModifiers {
    pub left: Modifier,
    pub right: Modifier,
}

impl PaddleModifiers {
    pub fn for_side(&self, side: Side) -> Modifier {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    fn for_side_mut(&mut self, side: Side) -> &mut Modifier {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

pub struct PowerUpField {
    rng: StdRng,
    next_id: u32,
    items: Vec<PowerUp>,
    effects: Vec<ActiveEffect>,
    ticks_since_spawn: u32,
    spawn_interval: u32,
    effect_ticks: u32,
    max_on_field: usize,
    field_width: f32,
    field_height: f32,
}

impl PowerUpField {
    pub fn new(physics: &PhysicsConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(physics.power_up_seed),
            next_id: 0,
            items: Vec::new(),
            effects: Vec::new(),
            ticks_since_spawn: 0,
            spawn_interval: physics.power_up_interval_ticks,
            effect_ticks: physics.power_up_effect_ticks,
            max_on_field: physics.power_up_max_on_field,
            field_width: physics.virtual_width,
            field_height: physics.virtual_height,
        }
    }

    /// Advance one tick: expire effects, spawn on schedule, then let the ball collect.
    /// Collection needs a last hitter; a freshly served ball passes through.
    pub fn tick(&mut self, ball: &BallState, last_hitter: Option<Side>) {
        for effect in &mut self.effects {
            effect.remaining_ticks = effect.remaining_ticks.saturating_sub(1);
        }
        self.effects.retain(|e| e.remaining_ticks > 0);

        self.ticks_since_spawn += 1;
        if self.ticks_since_spawn >= self.spawn_interval {
            self.ticks_since_spawn = 0;
            if self.items.len() < self.max_on_field {
                self.spawn();
            }
        }

        let Some(owner) = last_hitter else {
            return;
        };

        let reach = (POWER_UP_SIZE + BALL_SIZE) / 2.0;
        let effect_ticks = self.effect_ticks;
        let mut collected = Vec::new();
        self.items.retain(|item| {
            let dx = item.x - ball.x;
            let dy = item.y - ball.y;
            if dx * dx + dy * dy <= reach * reach {
                collected.push(ActiveEffect {
                    kind: item.kind,
                    owner,
                    remaining_ticks: effect_ticks,
                });
                false
            } else {
                true
            }
        });
        self.effects.extend(collected);
    }

    fn spawn(&mut self) {
        let kind = PowerUpKind::ALL[self.rng.gen_range(0..PowerUpKind::ALL.len())];
        let margin = POWER_UP_SIZE * 2.0;
        let x = self
            .rng
            .gen_range(self.field_width * 0.25..self.field_width * 0.75);
        let y = self.rng.gen_range(margin..self.field_height - margin);

        self.items.push(PowerUp {
            id: self.next_id,
            kind,
            x,
            y,
        });
        self.next_id = self.next_id.wrapping_add(1);
    }

    /// Fold every active effect into per-paddle multipliers
    pub fn modifiers(&self) -> PaddleModifiers {
        let mut modifiers = PaddleModifiers::default();
        for effect in &self.effects {
            match effect.kind {
                PowerUpKind::Grow => modifiers.for_side_mut(effect.owner).size *= GROW_FACTOR,
                PowerUpKind::Shrink => {
                    modifiers.for_side_mut(effect.owner.opponent()).size *= SHRINK_FACTOR
                }
                PowerUpKind::Speed => modifiers.for_side_mut(effect.owner).speed *= SPEED_FACTOR,
                PowerUpKind::Slow => {
                    modifiers.for_side_mut(effect.owner.opponent()).speed *= SLOW_FACTOR
                }
            }
        }
        modifiers
    }

    pub fn items(&self) -> &[PowerUp] {
        &self.items
    }

    pub fn effects(&self) -> &[ActiveEffect] {
        &self.effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> PhysicsConfig {
        PhysicsConfig {
            power_up_interval_ticks: 3,
            power_up_effect_ticks: 2,
            ..PhysicsConfig::default()
        }
    }

    fn far_ball() -> BallState {
        BallState {
            x: 0.0,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
        }
    }

    #[test]
    fn test_spawns_are_seeded() {
        let mut a = PowerUpField::new(&quick_config());
        let mut b = PowerUpField::new(&quick_config());
        for _ in 0..6 {
            a.tick(&far_ball(), None);
            b.tick(&far_ball(), None);
        }
        assert_eq!(a.items().len(), 2);
        assert_eq!(a.items(), b.items());
    }

    #[test]
    fn test_collect_and_expire() {
        let mut field = PowerUpField::new(&quick_config());
        for _ in 0..3 {
            field.tick(&far_ball(), None);
        }
        let item = field.items()[0];
        let ball = BallState {
            x: item.x,
            y: item.y,
            vx: 0.0,
            vy: 0.0,
        };

        // No hitter yet: the item stays
        field.tick(&ball, None);
        assert_eq!(field.items().len(), 1);

        field.tick(&ball, Some(Side::Right));
        assert!(field.items().is_empty());
        assert_eq!(field.effects().len(), 1);
        assert_eq!(field.effects()[0].owner, Side::Right);

        let modifiers = field.modifiers();
        let changed = modifiers.left != Modifier::default() || modifiers.right != Modifier::default();
        assert!(changed);

        field.tick(&far_ball(), None);
        field.tick(&far_ball(), None);
        assert!(field.effects().is_empty());
        assert_eq!(field.modifiers(), PaddleModifiers::default());
    }

    #[test]
    fn test_shrink_targets_opponent() {
        let mut field = PowerUpField::new(&quick_config());
        field.effects.push(ActiveEffect {
            kind: PowerUpKind::Shrink,
            owner: Side::Left,
            remaining_ticks: 10,
        });
        field.effects.push(ActiveEffect {
            kind: PowerUpKind::Speed,
            owner: Side::Left,
            remaining_ticks: 10,
        });
        let modifiers = field.modifiers();
        assert_eq!(modifiers.right.size, SHRINK_FACTOR);
        assert_eq!(modifiers.left.speed, SPEED_FACTOR);
        assert_eq!(modifiers.left.size, 1.0);
    }

    #[test]
    fn test_tiny_field_is_widened_before_spawning() {
        let physics = PhysicsConfig {
            virtual_width: 100.0,
            virtual_height: 100.0,
            ..quick_config()
        }
        .sanitized();
        let mut field = PowerUpField::new(&physics);
        for _ in 0..6 {
            field.tick(&far_ball(), None);
        }
        assert!(!field.items().is_empty());
        assert!(field
            .items()
            .iter()
            .all(|p| p.y > 0.0 && p.y < physics.virtual_height));
    }
}
