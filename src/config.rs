//! Server configuration.

use crate::game::GAME_ID_LENGTH;
use crate::protocol::{DEFAULT_RESOLVE_ATTEMPTS, MIN_RESOLVE_ATTEMPTS};
use crate::service::DEFAULT_GAME_ID_ATTEMPTS;
use crate::store::DEFAULT_TTL_DAYS;
use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Longest retention window accepted, in days.
pub const MAX_GAME_TTL_DAYS: i64 = 3650;

/// Environment variable naming the default database path.
pub const DB_PATH_ENV: &str = "RPSLS_DB_PATH";

/// Configuration for the game server.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    host: String,

    /// Port to bind to.
    #[serde(default = "default_port")]
    port: u16,

    /// SQLite database path; in-memory store when absent.
    #[serde(default)]
    db_path: Option<String>,

    /// Days a game is retained after its last round.
    #[serde(default = "default_ttl_days")]
    game_ttl_days: i64,

    /// Length of generated game ids.
    #[serde(default = "default_game_id_length")]
    game_id_length: usize,

    /// Ids probed before giving up on allocation.
    #[serde(default = "default_game_id_attempts")]
    game_id_attempts: usize,

    /// Read/write cycles per play before reporting contention.
    #[serde(default = "default_resolve_attempts")]
    resolve_attempts: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_ttl_days() -> i64 {
    DEFAULT_TTL_DAYS
}

fn default_game_id_length() -> usize {
    GAME_ID_LENGTH
}

fn default_game_id_attempts() -> usize {
    DEFAULT_GAME_ID_ATTEMPTS
}

fn default_resolve_attempts() -> usize {
    DEFAULT_RESOLVE_ATTEMPTS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: std::env::var(DB_PATH_ENV).ok(),
            game_ttl_days: default_ttl_days(),
            game_id_length: default_game_id_length(),
            game_id_attempts: default_game_id_attempts(),
            resolve_attempts: default_resolve_attempts(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_toml(&content)?;
        info!(host = %config.host, port = config.port, "Config loaded successfully");
        Ok(config)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on malformed TOML or invalid values.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        if config.db_path.is_none() {
            config.db_path = std::env::var(DB_PATH_ENV).ok();
        }
        config.validate()?;
        Ok(config)
    }

    /// Applies command-line overrides.
    pub fn with_overrides(
        mut self,
        host: Option<String>,
        port: Option<u16>,
        db_path: Option<String>,
    ) -> Self {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        if db_path.is_some() {
            self.db_path = db_path;
        }
        self
    }

    /// Retention window as a duration.
    pub fn game_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.game_ttl_days.clamp(1, MAX_GAME_TTL_DAYS))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_GAME_TTL_DAYS).contains(&self.game_ttl_days) {
            return Err(ConfigError::new(format!(
                "game_ttl_days must be between 1 and {}",
                MAX_GAME_TTL_DAYS
            )));
        }
        if self.game_id_length == 0 {
            return Err(ConfigError::new("game_id_length must be positive"));
        }
        if self.game_id_attempts == 0 {
            return Err(ConfigError::new("game_id_attempts must be positive"));
        }
        if self.resolve_attempts < MIN_RESOLVE_ATTEMPTS {
            return Err(ConfigError::new(format!(
                "resolve_attempts must be at least {}",
                MIN_RESOLVE_ATTEMPTS
            )));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}
