//! Service configuration.
//!
//! Priority: environment variables > TOML config file > defaults. The file
//! path comes from `DOCKLOG_CONFIG_FILE` (default `/etc/docklog/config.toml`).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hub::HubConfig;
use crate::store::StoreConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub bind_address: String,
    /// Docker socket path; empty uses bollard's defaults.
    pub docker_socket: String,
    /// Default per-container message bound.
    pub max_per_container: usize,
    /// Global wall-clock age bound in seconds; 0 disables it.
    pub max_age_secs: u64,
    pub discovery_interval_secs: u64,
    pub batch_window_ms: u64,
    pub snapshot_limit: usize,
    /// Lines replayed from the tail when a container stream opens.
    pub tail_lines: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8844".to_string(),
            docker_socket: String::new(),
            max_per_container: 10_000,
            max_age_secs: 0,
            discovery_interval_secs: 5,
            batch_window_ms: 1_000,
            snapshot_limit: 1_000,
            tail_lines: 100,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from file and environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("DOCKLOG_CONFIG_FILE")
            .unwrap_or_else(|_| "/etc/docklog/config.toml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            tracing::info!("loading configuration from {}", config_path);
            Self::from_file(&config_path)?
        } else {
            tracing::info!(
                "config file not found at {}, using environment and defaults",
                config_path
            );
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    fn apply_env(&mut self) {
        if let Ok(bind) = std::env::var("DOCKLOG_BIND_ADDRESS") {
            self.bind_address = bind;
        }
        if let Ok(socket) = std::env::var("DOCKER_SOCKET") {
            self.docker_socket = socket;
        }
        if let Some(v) = env_parse("DOCKLOG_MAX_PER_CONTAINER") {
            self.max_per_container = v;
        }
        if let Some(v) = env_parse("DOCKLOG_MAX_AGE_SECS") {
            self.max_age_secs = v;
        }
        if let Some(v) = env_parse("DOCKLOG_DISCOVERY_INTERVAL") {
            self.discovery_interval_secs = v;
        }
        if let Some(v) = env_parse("DOCKLOG_BATCH_WINDOW_MS") {
            self.batch_window_ms = v;
        }
        if let Some(v) = env_parse("DOCKLOG_SNAPSHOT_LIMIT") {
            self.snapshot_limit = v;
        }
        if let Some(v) = env_parse("DOCKLOG_TAIL_LINES") {
            self.tail_lines = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_address.is_empty() {
            return Err(ConfigError::Invalid("bind_address must not be empty".into()));
        }
        if self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "bind_address '{}' is not a valid socket address",
                self.bind_address
            )));
        }
        if self.max_per_container == 0 {
            return Err(ConfigError::Invalid("max_per_container must be positive".into()));
        }
        if self.discovery_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "discovery_interval_secs must be positive".into(),
            ));
        }
        if self.batch_window_ms == 0 {
            return Err(ConfigError::Invalid("batch_window_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_per_container: self.max_per_container,
            max_age: (self.max_age_secs > 0).then(|| Duration::from_secs(self.max_age_secs)),
        }
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            batch_window: Duration::from_millis(self.batch_window_ms),
            snapshot_limit: self.snapshot_limit,
            ..HubConfig::default()
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_per_container, 10_000);
        assert_eq!(config.discovery_interval_secs, 5);
        assert_eq!(config.batch_window_ms, 1_000);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: MonitorConfig =
            toml::from_str("bind_address = \"127.0.0.1:9000\"\nmax_per_container = 50\n").unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.max_per_container, 50);
        assert_eq!(config.snapshot_limit, 1_000);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = MonitorConfig::default();
        config.bind_address = "not an address".to_string();
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.max_per_container = 0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.batch_window_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_config_mapping() {
        let mut config = MonitorConfig::default();
        assert!(config.store_config().max_age.is_none());
        config.max_age_secs = 120;
        assert_eq!(
            config.store_config().max_age,
            Some(Duration::from_secs(120))
        );
    }
}
