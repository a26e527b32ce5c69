// pongmatch configuration types
// Every section carries defaults so a partial config file still loads

use serde::{Deserialize, Serialize};

use crate::network::protocol::GameSettings;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub game: GameSettings,
    #[serde(default)]
    pub keybindings: KeyBindings,
    #[serde(default)]
    pub physics: PhysicsConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Config {
    pub fn sanitized(mut self) -> Self {
        self.game = self.game.sanitized();
        self.physics = self.physics.sanitized();
        self
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlayerConfig {
    // Name shown to the opponent
    pub username: String,

    // Durable account id, if the player has one. Match results are only recorded against ids.
    pub user_id: Option<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            username: "player".to_string(),
            user_id: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KeyBindings {
    pub paddle_up: String,
    pub paddle_down: String,
    pub quit: String,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            paddle_up: "W".to_string(),
            paddle_down: "S".to_string(),
            quit: "Q".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PhysicsConfig {
    // Ball speed in virtual units per second at the "normal" tier
    pub ball_initial_speed: f32,

    // Ball speed increase multiplier on paddle hit (1.1 = 10% increase)
    pub ball_speed_multiplier: f32,

    // Paddle height in virtual units, before power-up modifiers
    pub paddle_height: f32,

    // Paddle travel in virtual units per second while a direction is held
    pub paddle_speed: f32,

    // Virtual field dimensions (changing these affects game feel)
    pub virtual_width: f32,
    pub virtual_height: f32,

    // Power-up spawning is the only randomness in the simulation
    pub power_up_seed: u64,
    pub power_up_interval_ticks: u32,
    pub power_up_effect_ticks: u32,
    pub power_up_max_on_field: usize,
}

const MIN_FIELD_WIDTH: f32 = 400.0;
const MIN_FIELD_HEIGHT: f32 = 200.0;
const MIN_PADDLE_HEIGHT: f32 = 10.0;

impl PhysicsConfig {
    /// Keep the field large enough for paddles and power-up spawns
    pub fn sanitized(mut self) -> Self {
        self.virtual_width = self.virtual_width.max(MIN_FIELD_WIDTH);
        self.virtual_height = self.virtual_height.max(MIN_FIELD_HEIGHT);
        self.paddle_height = self
            .paddle_height
            .clamp(MIN_PADDLE_HEIGHT, self.virtual_height / 2.0);
        self.power_up_interval_ticks = self.power_up_interval_ticks.max(1);
        self
    }
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            ball_initial_speed: 600.0,
            ball_speed_multiplier: 1.1,
            paddle_height: 90.0,
            paddle_speed: 420.0,
            virtual_width: 1200.0,
            virtual_height: 600.0,
            power_up_seed: 0x5eed_b411,
            power_up_interval_ticks: 600,
            power_up_effect_ticks: 480,
            power_up_max_on_field: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    // Paddle and ball color (RGB values 0-255)
    pub paddle_color: [u8; 3],
    pub ball_color: [u8; 3],

    // Center line color
    pub center_line_color: [u8; 3],
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            paddle_color: [255, 255, 255],
            ball_color: [255, 255, 255],
            center_line_color: [100, 100, 100],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    // Coordinator WebSocket URL
    pub signaling_server: String,

    // STUN server used to gather a server-reflexive candidate
    pub stun_server: String,

    // Matched -> active must complete within this window
    pub connection_timeout_secs: u64,

    // How long the direct channel gets to prove itself after the coordinator link drops
    pub rendezvous_grace_secs: u64,

    // No direct traffic for this long while playing counts as the channel dying
    pub peer_silence_timeout_secs: u64,

    // Guest shows the host's settings this long before reporting ready
    pub settings_display_ms: u64,

    // Host re-pushes settings at this interval until the guest is ready
    pub settings_resend_ms: u64,

    // Guest waits this long for the host's match_saved before recording the result itself
    pub save_ack_timeout_ms: u64,

    // Pending direct-channel messages kept before the oldest is dropped
    pub outbox_capacity: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            signaling_server: "ws://127.0.0.1:8080/ws".to_string(),
            stun_server: "stun.cloudflare.com:3478".to_string(),
            connection_timeout_secs: 10,
            rendezvous_grace_secs: 5,
            peer_silence_timeout_secs: 5,
            settings_display_ms: 3000,
            settings_resend_ms: 500,
            save_ack_timeout_ms: 2000,
            outbox_capacity: 8,
        }
    }
}
