//! Server configuration: a TOML file plus environment overrides.
//!
//! ```toml
//! listen_addr = "0.0.0.0:3001"
//! phase_tick_hz = 10
//!
//! [room]
//! lobby_wait_ms = 20000
//! spawn_exhaustion = "reject"
//!
//! [movement]
//! max_speed = 15.0
//!
//! [combat]
//! melee_range = 3.0
//! ```

use std::path::Path;

use aetherion_room::RoomConfig;
use serde::Deserialize;

use crate::combat::CombatConfig;
use crate::movement::MovementConfig;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "AETHERION_CONFIG";
/// Config file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "aetherion.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// How often room deadlines are polled. 0 disables timed phases.
    pub phase_tick_hz: u32,
    pub room: RoomConfig,
    pub movement: MovementConfig,
    pub combat: CombatConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3001".to_string(),
            phase_tick_hz: 10,
            room: RoomConfig::default(),
            movement: MovementConfig::default(),
            combat: CombatConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parses a TOML document. Missing keys take their defaults.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads `path`. A file that does not exist yields the defaults; one
    /// that exists but cannot be read or parsed is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let config = Self::from_toml(&text)?;
                tracing::info!(path = %path.display(), "loaded configuration");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Loads the file named by `AETHERION_CONFIG` (or `aetherion.toml`),
    /// then applies environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `AETHERION_LISTEN_ADDR` and `PORT` from `lookup`.
    ///
    /// `PORT` replaces only the port of the listen address. Invalid values
    /// are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("AETHERION_LISTEN_ADDR") {
            if addr.parse::<std::net::SocketAddr>().is_ok() {
                self.listen_addr = addr;
            } else {
                tracing::warn!(%addr, "invalid AETHERION_LISTEN_ADDR, keeping {}", self.listen_addr);
            }
        }

        if let Some(port) = lookup("PORT") {
            match port.parse::<u16>() {
                Ok(port) if port > 0 => {
                    let host = self
                        .listen_addr
                        .rsplit_once(':')
                        .map_or(self.listen_addr.as_str(), |(host, _)| host);
                    self.listen_addr = format!("{host}:{port}");
                }
                _ => tracing::warn!(%port, "invalid PORT, using default"),
            }
        }
    }
}
