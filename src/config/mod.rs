// Configuration module for pongmatch
// Loads the TOML config shared by the client and, for network timings, the session

pub mod loader;
pub mod types;

pub use loader::{create_default_config, get_config_path, load_config, load_config_from};
pub use types::{Config, DisplayConfig, KeyBindings, NetworkConfig, PhysicsConfig, PlayerConfig};
