//! Error types for the driver.
//!
//! Resolution misses are not errors (see [`SkipReason`](crate::SkipReason)).
//! These variants cover the messaging channel, configuration and event intake.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors that can occur in the driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Redis connection or command failed.
    #[error("Transport error: {0}")]
    Transport(#[from] redis::RedisError),

    /// A message could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The agent did not reply in time.
    #[error("No reply from {server} to {method} within {timeout:?}")]
    Timeout {
        /// Host the call was addressed to.
        server: String,
        /// RPC method name.
        method: String,
        /// Timeout that expired.
        timeout: Duration,
    },

    /// The agent replied with a failure.
    #[error("Agent {server} failed {method}: {message}")]
    RemoteFailure {
        /// Host that replied.
        server: String,
        /// RPC method name.
        method: String,
        /// Failure text from the agent.
        message: String,
    },

    /// Configuration is missing or invalid.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Configuration file could not be read.
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid TOML.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// An event from the orchestration framework could not be handled.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}

impl DriverError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a remote failure error.
    pub fn remote_failure(
        server: impl Into<String>,
        method: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::RemoteFailure {
            server: server.into(),
            method: method.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error indicates a transient condition.
    ///
    /// The driver never retries a command; dispatch failures carry this as a
    /// log field and the event listener backs off and reconnects on it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DriverError::Transport(_) | DriverError::Timeout { .. })
    }
}
