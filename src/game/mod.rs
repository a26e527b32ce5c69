pub mod input;
pub mod physics;
pub mod powerups;
pub mod state;

pub use input::{poll_input, Direction, HeldInput, InputAction, InputFlags, InputOrigin, InputSample};
pub use physics::{CombinedInputs, Physics, PhysicsEvents, PongPhysics, Positions};
pub use powerups::{ActiveEffect, Modifier, PaddleModifiers, PowerUp, PowerUpField, PowerUpKind};
pub use state::{GameSnapshot, GameState, MatchStatus, Score, Side};
