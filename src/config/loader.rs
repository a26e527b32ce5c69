// Configuration file loading and creation

use super::types::Config;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Get the path to the configuration file
pub fn get_config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("pongmatch");

    // Create config directory if it doesn't exist
    fs::create_dir_all(&path).ok();

    path.push("config.toml");
    path
}

/// Load configuration from file, or create default if it doesn't exist
pub fn load_config() -> Result<Config, io::Error> {
    load_config_from(&get_config_path())
}

pub fn load_config_from(config_path: &Path) -> Result<Config, io::Error> {
    if config_path.exists() {
        let contents = fs::read_to_string(config_path)?;
        match toml::from_str(&contents) {
            Ok(config) => Ok(Config::sanitized(config)),
            Err(e) => {
                warn!(path = %config_path.display(), "failed to parse config file, using defaults: {}", e);
                Ok(Config::default())
            }
        }
    } else {
        create_default_config(config_path)?;
        Ok(Config::default())
    }
}

/// Create a default configuration file with helpful comments
pub fn create_default_config(path: &Path) -> Result<(), io::Error> {
    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    let commented_toml = format!(
        "# pongmatch configuration file\n\
         # Restart the game after editing\n\
         #\n\
         # [game] holds the settings you declare when joining matchmaking.\n\
         # The host's values win for everything except the theme, which stays yours.\n\
         #\n\
         # ball_speed: \"slow\", \"normal\", \"fast\"\n\n\
         {}",
        toml_string
    );

    fs::write(path, commented_toml)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::protocol::BallSpeed;

    #[test]
    fn test_default_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        let parsed: Config = toml::from_str(&toml_string).unwrap();

        assert_eq!(parsed.physics, config.physics);
        assert_eq!(parsed.game, config.game);
        assert_eq!(parsed.keybindings.paddle_up, config.keybindings.paddle_up);
        assert_eq!(
            parsed.network.connection_timeout_secs,
            config.network.connection_timeout_secs
        );
    }

    #[test]
    fn test_partial_config_with_defaults() {
        let partial_toml = r#"
            [game]
            win_score = 7
            ball_speed = "fast"

            [network]
            signaling_server = "wss://match.example.org/ws"
        "#;

        let config: Config = toml::from_str(partial_toml).unwrap();

        assert_eq!(config.game.win_score, 7);
        assert_eq!(config.game.ball_speed, BallSpeed::Fast);
        assert!(config.game.power_ups);
        assert_eq!(config.network.signaling_server, "wss://match.example.org/ws");
        assert_eq!(config.network.rendezvous_grace_secs, 5);
        assert_eq!(config.physics.paddle_height, 90.0);
    }

    #[test]
    fn test_out_of_range_values_clamped_on_load() {
        let dir = std::env::temp_dir().join(format!("pongmatch-clamp-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        fs::write(
            &path,
            "[game]\nwin_score = 0\n\n[physics]\nvirtual_height = 50.0\npaddle_height = 400.0\n",
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.game.win_score, 1);
        assert_eq!(config.physics.virtual_height, 200.0);
        assert_eq!(config.physics.paddle_height, 100.0);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_creates_defaults() {
        let dir = std::env::temp_dir().join(format!("pongmatch-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        let _ = fs::remove_file(&path);

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.game.win_score, 5);
        assert!(path.exists());

        let reloaded = load_config_from(&path).unwrap();
        assert_eq!(reloaded.network.signaling_server, config.network.signaling_server);

        let _ = fs::remove_dir_all(&dir);
    }
}
