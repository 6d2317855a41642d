//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `robofleet.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::time::Duration;

use robofleet_adapter_mqtt::MqttConfig;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Schedule runner settings.
    pub scheduler: SchedulerConfig,
    /// Command dispatch settings.
    pub dispatch: DispatchConfig,
    /// Background provisioning settings.
    pub provisioning: ProvisioningConfig,
    /// MQTT transport; when disabled commands are only logged.
    pub mqtt: MqttConfig,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between two evaluations of due schedules.
    pub tick_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound on a single gateway call, in milliseconds.
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub timeout_secs: u64,
}

impl Config {
    /// Load configuration from `robofleet.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("robofleet.toml")?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
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

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("ROBOFLEET_DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(val) = var("ROBOFLEET_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("ROBOFLEET_MQTT_HOST") {
            self.mqtt.broker_host = val;
        }
        if let Some(port) = var("ROBOFLEET_MQTT_PORT").and_then(|val| val.parse().ok()) {
            self.mqtt.broker_port = port;
        }
        if let Some(enabled) = var("ROBOFLEET_MQTT_ENABLED").and_then(|val| val.parse().ok()) {
            self.mqtt.enabled = enabled;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.tick_secs == 0 {
            return Err(ConfigError::Validation(
                "scheduler tick must be non-zero".to_string(),
            ));
        }
        if self.dispatch.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "dispatch timeout must be non-zero".to_string(),
            ));
        }
        if self.provisioning.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "provisioning timeout must be non-zero".to_string(),
            ));
        }
        if self.mqtt.enabled && self.mqtt.broker_port == 0 {
            return Err(ConfigError::Validation(
                "MQTT port must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.tick_secs)
    }

    #[must_use]
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch.timeout_ms)
    }

    #[must_use]
    pub fn provisioning_timeout(&self) -> Duration {
        Duration::from_secs(self.provisioning.timeout_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:robofleet.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "robocleand=info,robofleet=info".to_string(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_secs: 30 }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { timeout_ms: 5_000 }
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
