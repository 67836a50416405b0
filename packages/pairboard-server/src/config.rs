//! Server configuration: environment variables, a TOML file as an
//! alternative source, and the per-connection backpressure/timeout settings
//! the network layer needs.

use std::env;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Per-connection configuration controlling outbound backpressure.
///
/// Each client gets a bounded outbound queue: fan-out (`Channel::broadcast`)
/// writes to it with a non-blocking `try_send` so one slow peer backs up
/// only its own queue, while a direct send to a single client (the connect
/// acknowledgement) uses `send_timeout` so a momentarily-full queue gets a
/// bounded grace period before the send is given up on.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub outbound_channel_capacity: usize,
    pub send_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbound_channel_capacity: 256,
            send_timeout: Duration::from_secs(5),
        }
    }
}

/// Top-level server configuration.
///
/// Constructed either from environment variables ([`ServerConfig::from_env`])
/// or a TOML file ([`ServerConfig::from_toml_file`]). Every field has a
/// sensible default except secrets, which are `None` unless set explicitly.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_pass: Option<String>,
    pub auth_api_base: String,
    pub auth_timeout: Duration,
    /// `CODESPACE_EXPIRE_UPDATE`: TTL refresh, in seconds, for permanent
    /// documents.
    pub codespace_expire_update: u64,
    /// `TMP_CODESPACE_EXPIRE_UPDATE`: TTL refresh, in seconds, for `tmp-`
    /// documents.
    pub tmp_codespace_expire_update: u64,
    pub cors_origins: Vec<String>,
    pub request_timeout: Duration,
    pub connection: ConnectionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            redis_host: "127.0.0.1".to_string(),
            redis_port: 6379,
            redis_pass: None,
            auth_api_base: "http://localhost:8000/api".to_string(),
            auth_timeout: Duration::from_secs(5),
            codespace_expire_update: 3600,
            tmp_codespace_expire_update: 300,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
            connection: ConnectionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Builds the Redis connection URL from `redis_host`/`redis_port`/`redis_pass`.
    #[must_use]
    pub fn redis_url(&self) -> String {
        match &self.redis_pass {
            Some(pass) if !pass.is_empty() => {
                format!("redis://:{pass}@{}:{}", self.redis_host, self.redis_port)
            }
            _ => format!("redis://{}:{}", self.redis_host, self.redis_port),
        }
    }

    /// Loads configuration from environment variables, falling back to
    /// [`ServerConfig::default`] for anything unset. `PORT`/`REDIS_PORT` are
    /// parsed as integers; an unparsable value is a
    /// [`ConfigError::InvalidValue`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_env_or("PORT", defaults.port)?,
            redis_host: env::var("REDIS_HOST").unwrap_or(defaults.redis_host),
            redis_port: parse_env_or("REDIS_PORT", defaults.redis_port)?,
            redis_pass: env::var("REDIS_PASS").ok().filter(|s| !s.is_empty()),
            auth_api_base: env::var("AUTH_API_BASE").unwrap_or(defaults.auth_api_base),
            codespace_expire_update: parse_env_or(
                "CODESPACE_EXPIRE_UPDATE",
                defaults.codespace_expire_update,
            )?,
            tmp_codespace_expire_update: parse_env_or(
                "TMP_CODESPACE_EXPIRE_UPDATE",
                defaults.tmp_codespace_expire_update,
            )?,
            ..defaults
        })
    }

    /// Loads configuration from a TOML file by reading it and then parsing
    /// it. Fields absent from the file fall back to
    /// [`ServerConfig::default`].
    pub fn from_toml_file(path: &str) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_string(),
                source,
            })?;
        let raw: TomlConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        Ok(raw.into_server_config())
    }
}

fn parse_env_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            name,
            value,
        }),
        Err(_) => Ok(default),
    }
}

/// Mirror of [`ServerConfig`] with every field optional, so a TOML file only
/// needs to specify the settings it wants to override.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TomlConfig {
    host: Option<String>,
    port: Option<u16>,
    redis_host: Option<String>,
    redis_port: Option<u16>,
    redis_pass: Option<String>,
    auth_api_base: Option<String>,
    codespace_expire_update: Option<u64>,
    tmp_codespace_expire_update: Option<u64>,
    cors_origins: Option<Vec<String>>,
}

impl TomlConfig {
    fn into_server_config(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            host: self.host.unwrap_or(defaults.host),
            port: self.port.unwrap_or(defaults.port),
            redis_host: self.redis_host.unwrap_or(defaults.redis_host),
            redis_port: self.redis_port.unwrap_or(defaults.redis_port),
            redis_pass: self.redis_pass.or(defaults.redis_pass),
            auth_api_base: self.auth_api_base.unwrap_or(defaults.auth_api_base),
            codespace_expire_update: self
                .codespace_expire_update
                .unwrap_or(defaults.codespace_expire_update),
            tmp_codespace_expire_update: self
                .tmp_codespace_expire_update
                .unwrap_or(defaults.tmp_codespace_expire_update),
            cors_origins: self.cors_origins.unwrap_or(defaults.cors_origins),
            ..defaults
        }
    }
}
