// pongmatch: two-player real-time Pong over a direct peer channel
// The coordinator pairs players and relays the handshake; the host peer runs the simulation

pub mod config;
pub mod error;
pub mod game;
pub mod game_modes;
pub mod logging;
pub mod matchmaking;
pub mod menu;
pub mod network;
pub mod recovery;
pub mod session;
pub mod ui;

use std::time::Duration;

pub const TARGET_FPS: u64 = 60;
pub const FRAME_DURATION: Duration = Duration::from_millis(1000 / TARGET_FPS);
pub const FIXED_TIMESTEP: f32 = 1.0 / 60.0; // Fixed timestep for deterministic physics
