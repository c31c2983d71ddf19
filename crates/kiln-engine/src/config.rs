//! # Engine Configuration
//!
//! Settings for the production engine, loaded from TOML with environment
//! overrides.
//!
//! ## Priority Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Environment variables (KILN_*)     ◄── highest                      │
//! │  2. Config file (kiln.toml)                                             │
//! │  3. Defaults                           ◄── lowest                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Config File
//! ```toml
//! [database]
//! path = "./data/kiln.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [orders]
//! strict_sufficiency = false
//!
//! [retry]
//! max_attempts = 5
//! initial_backoff_ms = 20
//! max_backoff_ms = 1000
//!
//! [notifications]
//! channel_capacity = 256
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use kiln_db::DbConfig;

// =============================================================================
// Database Settings
// =============================================================================

/// Where the store lives and how the pool behaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path, or `:memory:`.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits on a locked database before giving up.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> String {
    "./kiln.db".to_string()
}
fn default_max_connections() -> u32 {
    5
}
fn default_busy_timeout() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Order Settings
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderSettings {
    /// Reject order creation outright when stock is short, instead of
    /// persisting a non-executable order.
    #[serde(default)]
    pub strict_sufficiency: bool,
}

// =============================================================================
// Retry Settings
// =============================================================================

/// Backoff for operations that hit a store conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts including the first. 1 disables retrying.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_initial_backoff() -> u64 {
    20
}
fn default_max_backoff() -> u64 {
    1_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl RetrySettings {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

// =============================================================================
// Notification Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Buffered events per broadcast subscriber; slow subscribers lag.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for NotificationSettings {
    fn default() -> Self {
        NotificationSettings {
            channel_capacity: default_channel_capacity(),
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub orders: OrderSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub notifications: NotificationSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file, if given and present
    /// 3. Environment variables
    pub fn load(config_path: Option<&Path>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(path)
                    .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
                config = Self::from_toml_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document. Missing sections take their defaults.
    pub fn from_toml_str(contents: &str) -> EngineResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Configuration for tests: in-memory store, no retry delay to speak of.
    pub fn in_memory() -> Self {
        EngineConfig {
            database: DatabaseSettings {
                path: ":memory:".to_string(),
                max_connections: 1,
                ..Default::default()
            },
            retry: RetrySettings {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 5,
            },
            ..Default::default()
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.database.path.trim().is_empty() {
            return Err(EngineError::Config("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(EngineError::Config(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(EngineError::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(EngineError::Config(format!(
                "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.retry.initial_backoff_ms, self.retry.max_backoff_ms
            )));
        }

        if self.notifications.channel_capacity == 0 {
            return Err(EngineError::Config(
                "notifications.channel_capacity must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies `KILN_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("KILN_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = path;
        }

        if let Some(strict) = lookup("KILN_STRICT_SUFFICIENCY") {
            match strict.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.orders.strict_sufficiency = true,
                "0" | "false" | "no" => self.orders.strict_sufficiency = false,
                _ => warn!(value = %strict, "Unknown KILN_STRICT_SUFFICIENCY value"),
            }
        }

        if let Some(attempts) = lookup("KILN_RETRY_MAX_ATTEMPTS") {
            match attempts.parse::<u32>() {
                Ok(n) => {
                    debug!(max_attempts = n, "Overriding retry attempts from environment");
                    self.retry.max_attempts = n;
                }
                Err(_) => warn!(value = %attempts, "KILN_RETRY_MAX_ATTEMPTS is not a number"),
            }
        }
    }

    /// Database pool settings derived from this config.
    pub fn to_db_config(&self) -> DbConfig {
        let base = if self.database.path == ":memory:" {
            DbConfig::in_memory()
        } else {
            DbConfig::new(PathBuf::from(&self.database.path))
                .max_connections(self.database.max_connections)
        };

        base.busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }
}
