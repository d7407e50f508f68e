//! Configuration management for qctrack.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "qctrack";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "qctrack.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `QCTRACK_`, sections split on `__`)
/// 2. TOML config file at `~/.config/qctrack/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Authentication configuration.
    pub auth: AuthConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/qctrack/qctrack.db`
    pub database_path: Option<PathBuf>,
    /// `SQLite` busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// Days of activity log to retain.
    /// Set to 0 for unlimited.
    pub activity_retention_days: u32,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,
    /// Port to bind. 0 asks the OS for a free port.
    pub port: u16,
    /// Offset from UTC, in hours, used for display and day/month filters.
    pub utc_offset_hours: i32,
    /// Create the default admin account on startup when none exists.
    pub bootstrap_admin: bool,
}

/// Authentication configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Session lifetime in hours.
    pub session_ttl_hours: u32,
    /// bcrypt work factor for new password hashes.
    pub bcrypt_cost: u32,
    /// Mark the session cookie `Secure` (requires HTTPS in front).
    pub secure_cookie: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None, // Will be resolved to default at runtime
            busy_timeout_ms: 5_000,
            activity_retention_days: 365,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            utc_offset_hours: -3,
            bootstrap_admin: true,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 12,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            secure_cookie: false,
        }
    }
}

impl Config {
    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("QCTRACK_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "bcrypt_cost must be between 4 and 31, got {}",
                    self.auth.bcrypt_cost
                ),
            });
        }

        if self.auth.session_ttl_hours == 0 {
            return Err(Error::ConfigValidation {
                message: "session_ttl_hours must be greater than 0".to_string(),
            });
        }

        if !(-12..=14).contains(&self.server.utc_offset_hours) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "utc_offset_hours must be between -12 and 14, got {}",
                    self.server.utc_offset_hours
                ),
            });
        }

        if self.server.host.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "server host cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is not a valid IP address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|_| Error::ConfigValidation {
                message: format!("invalid bind address {}:{}", self.server.host, self.server.port),
            })
    }

    /// Get the local time zone offset.
    #[must_use]
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.server.utc_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix())
    }

    /// Get the session lifetime as a Duration.
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.auth.session_ttl_hours) * 60 * 60)
    }

    /// Get the activity retention as a Duration.
    #[must_use]
    pub fn activity_retention(&self) -> Option<Duration> {
        if self.storage.activity_retention_days == 0 {
            None
        } else {
            Some(Duration::from_secs(
                u64::from(self.storage.activity_retention_days) * 24 * 60 * 60,
            ))
        }
    }

    /// Get the busy timeout as a Duration.
    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.storage.busy_timeout_ms)
    }
}
