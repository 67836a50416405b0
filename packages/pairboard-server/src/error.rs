//! Top-level error types surfaced outside a single module's boundary.

use thiserror::Error;

/// Errors from the pub/sub + kv backend facade.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend connection error: {0}")]
    Connection(String),
    #[error("backend command error: {0}")]
    Command(String),
}

impl From<redis::RedisError> for BackendError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
            BackendError::Connection(err.to_string())
        } else {
            BackendError::Command(err.to_string())
        }
    }
}

/// Errors raised while loading [`crate::config::ServerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("environment variable {name} has an invalid value: {value}")]
    InvalidValue { name: &'static str, value: String },
}
