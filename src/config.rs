//! Client and host configuration.

use crate::error::ConfigError;
use crate::session::SessionTimings;
use crate::transport::LinkOptions;
use derive_getters::Getters;
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Settings for connecting to a match host.
///
/// Every field has a default, so an empty TOML file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
pub struct ClientConfig {
    /// Host address, `host:port`.
    #[serde(default = "default_host")]
    host: String,

    /// How long a move waits for STATE_UPDATE.
    #[serde(default = "default_move_timeout_ms")]
    move_timeout_ms: u64,

    /// How long an opponent may be away before the match is aborted.
    #[serde(default = "default_presence_grace_ms")]
    presence_grace_ms: u64,

    /// Reconnect attempts after an unexpected drop.
    #[serde(default = "default_reconnect_attempts")]
    reconnect_attempts: u32,

    /// First reconnect delay; doubles per attempt.
    #[serde(default = "default_reconnect_backoff_ms")]
    reconnect_backoff_ms: u64,

    /// Interval between pings.
    #[serde(default = "default_heartbeat_interval_ms")]
    heartbeat_interval_ms: u64,

    /// Silence after which the link is considered dead.
    #[serde(default = "default_heartbeat_timeout_ms")]
    heartbeat_timeout_ms: u64,

    /// Bound on connect plus handshake.
    #[serde(default = "default_connect_timeout_ms")]
    connect_timeout_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1:7350".to_string()
}

fn default_move_timeout_ms() -> u64 {
    10_000
}

fn default_presence_grace_ms() -> u64 {
    15_000
}

fn default_reconnect_attempts() -> u32 {
    3
}

fn default_reconnect_backoff_ms() -> u64 {
    1_000
}

fn default_heartbeat_interval_ms() -> u64 {
    5_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    15_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            move_timeout_ms: default_move_timeout_ms(),
            presence_grace_ms: default_presence_grace_ms(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl ClientConfig {
    /// Loads configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;

        info!(host = %config.host, "Config loaded successfully");
        Ok(config)
    }

    /// Loads `path` when given, otherwise returns defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Rejects settings that would make the session unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::new("host must not be empty"));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::new("heartbeat_interval_ms must be positive"));
        }
        if self.heartbeat_timeout_ms <= self.heartbeat_interval_ms {
            return Err(ConfigError::new(
                "heartbeat_timeout_ms must exceed heartbeat_interval_ms",
            ));
        }
        Ok(())
    }

    /// Link timings.
    pub fn link_options(&self) -> LinkOptions {
        LinkOptions::new(
            Duration::from_millis(self.connect_timeout_ms),
            Duration::from_millis(self.heartbeat_interval_ms),
            Duration::from_millis(self.heartbeat_timeout_ms),
        )
    }

    /// Session timings.
    pub fn timings(&self) -> SessionTimings {
        SessionTimings {
            move_timeout: Duration::from_millis(self.move_timeout_ms),
            presence_grace: Duration::from_millis(self.presence_grace_ms),
            reconnect_attempts: self.reconnect_attempts,
            reconnect_backoff: Duration::from_millis(self.reconnect_backoff_ms),
            link: self.link_options(),
        }
    }
}

/// Settings for the reference host.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
pub struct HostConfig {
    /// Listen address.
    #[serde(default = "default_host")]
    bind: String,

    /// A match with no move for this long is ended and its room dropped.
    #[serde(default = "default_idle_timeout_secs")]
    idle_timeout_secs: u64,
}

fn default_idle_timeout_secs() -> u64 {
    300
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind: default_host(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl HostConfig {
    /// Idle limit for matches.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}
