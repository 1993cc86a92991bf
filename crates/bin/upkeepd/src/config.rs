//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `upkeep.toml` in the working directory, or the file named by
//! `UPKEEP_CONFIG`. Every field has a default so the file is optional.
//! Environment variables take precedence over file values.

use std::collections::HashMap;
use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;

use upkeep_app::dispatcher::DispatcherSettings;
use upkeep_app::engine::EngineSettings;
use upkeep_app::event_bus;
use upkeep_domain::notification::{Channel, RetryPolicy};

const DEFAULT_PATH: &str = "upkeep.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub scheduler: SchedulerConfig,
    pub dispatcher: DispatcherConfig,
    pub executions: ExecutionsConfig,
    /// Group and role membership used to expand notification recipients.
    pub directory: DirectoryConfig,
    pub providers: ProvidersConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    pub port: u16,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How often condition-based rules are re-evaluated.
    pub condition_check_interval_secs: u64,
}

/// Notification delivery tuning.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub drain_interval_secs: u64,
    pub send_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_secs: u64,
    /// Wall-clock limit on retrying, counted from the first failure.
    pub retry_window_secs: u64,
    pub max_per_channel_per_tick: usize,
    /// Oldest delivered, read or failed messages beyond this many are
    /// dropped from the queue.
    pub max_retained_messages: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ExecutionsConfig {
    /// Oldest executions beyond this many are dropped from the log.
    pub max_retained: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub groups: HashMap<String, Vec<String>>,
    pub roles: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Channels delivered by writing to the log.
    pub log_channels: Vec<Channel>,
}

impl Config {
    /// Load configuration from the config file (if present), apply
    /// environment-variable overrides, then validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is malformed, or the result
    /// fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("UPKEEP_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("UPKEEP_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("UPKEEP_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("UPKEEP_BIND") {
            if let Some((host, port)) = val.rsplit_once(':') {
                self.server.host = host.to_string();
                if let Ok(port) = port.parse() {
                    self.server.port = port;
                }
            }
        }
        if let Ok(val) = std::env::var("UPKEEP_DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("UPKEEP_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        let intervals = [
            ("scheduler.condition_check_interval_secs", self.scheduler.condition_check_interval_secs),
            ("dispatcher.drain_interval_secs", self.dispatcher.drain_interval_secs),
            ("dispatcher.send_timeout_secs", self.dispatcher.send_timeout_secs),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::Validation(format!("{name} must be non-zero")));
        }
        if self.dispatcher.max_per_channel_per_tick == 0 {
            return Err(ConfigError::Validation(
                "dispatcher.max_per_channel_per_tick must be non-zero".to_string(),
            ));
        }
        if self.dispatcher.max_retained_messages == 0 {
            return Err(ConfigError::Validation(
                "dispatcher.max_retained_messages must be non-zero".to_string(),
            ));
        }
        if self.executions.max_retained == 0 {
            return Err(ConfigError::Validation(
                "executions.max_retained must be non-zero".to_string(),
            ));
        }
        self.retry_policy()?;
        Ok(())
    }

    fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        let delta = |name: &str, secs: u64| {
            i64::try_from(secs)
                .ok()
                .and_then(TimeDelta::try_seconds)
                .ok_or_else(|| ConfigError::Validation(format!("{name} is out of range")))
        };
        Ok(RetryPolicy {
            max_retries: self.dispatcher.max_retries,
            backoff: delta("dispatcher.retry_backoff_secs", self.dispatcher.retry_backoff_secs)?,
            window: delta("dispatcher.retry_window_secs", self.dispatcher.retry_window_secs)?,
        })
    }

    /// Engine tuning derived from the `scheduler`, `dispatcher` and
    /// `executions` sections.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if a retry duration is out of
    /// range.
    pub fn engine_settings(&self) -> Result<EngineSettings, ConfigError> {
        Ok(EngineSettings {
            dispatcher: DispatcherSettings {
                send_timeout: Duration::from_secs(self.dispatcher.send_timeout_secs),
                retry: self.retry_policy()?,
                max_per_channel_per_tick: self.dispatcher.max_per_channel_per_tick,
                max_retained_messages: self.dispatcher.max_retained_messages,
            },
            drain_interval: Duration::from_secs(self.dispatcher.drain_interval_secs),
            condition_check_interval: Duration::from_secs(self.scheduler.condition_check_interval_secs),
            max_executions: self.executions.max_retained,
            event_capacity: event_bus::DEFAULT_CAPACITY,
        })
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:upkeep.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "upkeepd=info,upkeep_app=info,tower_http=debug".to_string(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            condition_check_interval_secs: 60,
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            drain_interval_secs: 30,
            send_timeout_secs: 10,
            max_retries: 3,
            retry_backoff_secs: 300,
            retry_window_secs: 3600,
            max_per_channel_per_tick: 50,
            max_retained_messages: 10_000,
        }
    }
}

impl Default for ExecutionsConfig {
    fn default() -> Self {
        Self { max_retained: 1000 }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            log_channels: Channel::ALL.to_vec(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Validation(String),
}
