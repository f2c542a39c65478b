//! Configuration file support for the driver daemon
//!
//! Loads and validates configuration from TOML.
//! Default location: /etc/neutron/roth_driver.toml

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::commands::AGENT_TOPIC;
use crate::error::{DriverError, DriverResult};

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/neutron/roth_driver.toml";

/// Topology database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL of the neutron database
    #[serde(default = "default_connection")]
    pub connection: String,

    /// Maximum pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

/// Agent messaging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Redis URL carrying agent traffic and lifecycle events
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Agent topic
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Seconds to wait for an agent reply
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// List the framework pushes lifecycle events onto
    #[serde(default = "default_event_queue")]
    pub event_queue: String,

    /// Seconds an uncollected reply stays in Redis
    #[serde(default = "default_reply_ttl")]
    pub reply_ttl_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Complete driver configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub messaging: MessagingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default functions
fn default_connection() -> String {
    "mysql://neutron@127.0.0.1/neutron".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    10
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}

fn default_topic() -> String {
    AGENT_TOPIC.to_string()
}

fn default_call_timeout() -> u64 {
    60
}

fn default_event_queue() -> String {
    "roth_events".to_string()
}

fn default_reply_ttl() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection: default_connection(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            topic: default_topic(),
            call_timeout_secs: default_call_timeout(),
            event_queue: default_event_queue(),
            reply_ttl_secs: default_reply_ttl(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

impl MessagingConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn reply_ttl(&self) -> Duration {
        Duration::from_secs(self.reply_ttl_secs)
    }
}

impl DriverConfig {
    /// Load configuration from a TOML file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> DriverResult<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml(contents: &str) -> DriverResult<Self> {
        let config: DriverConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> DriverResult<()> {
        if self.database.connection.trim().is_empty() {
            return Err(DriverError::invalid_config(
                "database.connection",
                "must not be empty",
            ));
        }
        if self.database.max_connections == 0 {
            return Err(DriverError::invalid_config(
                "database.max_connections",
                "must be at least 1",
            ));
        }
        if self.messaging.topic.trim().is_empty() {
            return Err(DriverError::invalid_config("messaging.topic", "must not be empty"));
        }
        if self.messaging.event_queue.trim().is_empty() {
            return Err(DriverError::invalid_config(
                "messaging.event_queue",
                "must not be empty",
            ));
        }
        if self.messaging.call_timeout_secs == 0 {
            return Err(DriverError::invalid_config(
                "messaging.call_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.messaging.reply_ttl_secs == 0 {
            return Err(DriverError::invalid_config(
                "messaging.reply_ttl_secs",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}
