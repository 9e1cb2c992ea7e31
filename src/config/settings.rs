//! Configuration settings for resync.
//!
//! Settings are loaded from `~/.resync/config.yaml`. Every field has a
//! default, so a partial file (or no file at all) is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Paths;
use crate::error::ResyncError;
use crate::features::connectivity::EffectiveType;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Operation queue settings.
    pub queue: QueueConfig,
    /// Connectivity monitor settings.
    pub monitor: MonitorConfig,
    /// Authoritative backend settings.
    pub backend: BackendConfig,
    /// Quick action settings.
    pub actions: ActionsConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Operation queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Failed attempts tolerated before an operation is dead-lettered.
    ///
    /// An operation is dead-lettered once its retry count exceeds this bound.
    #[serde(default = "default_retry_bound")]
    pub retry_bound: u32,
    /// Delete operations as soon as they complete.
    #[serde(default = "default_true")]
    pub prune_completed: bool,
    /// Number of records fetched per store page during a sync pass.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

/// Connectivity monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Interval between liveness probes, in seconds.
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
    /// Liveness probe timeout, in milliseconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    /// Link classes at or below this one are reported as slow.
    #[serde(default = "default_slow_threshold")]
    pub slow_threshold: EffectiveType,
    /// Synchronize automatically when connectivity returns.
    #[serde(default = "default_true")]
    pub auto_sync: bool,
}

/// Authoritative backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the backend.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path of the health endpoint used by the liveness probe.
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// Timeout for operation requests, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Quick action settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    /// How long a server action may take before it times out, in seconds.
    #[serde(default = "default_server_timeout")]
    pub server_timeout_secs: u64,
    /// Number of most recent usage records kept for ranking.
    #[serde(default = "default_max_usage_records")]
    pub max_usage_records: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RESYNC_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions for serde
const fn default_retry_bound() -> u32 {
    3
}

const fn default_true() -> bool {
    true
}

const fn default_page_size() -> usize {
    50
}

const fn default_probe_interval() -> u64 {
    30
}

const fn default_probe_timeout() -> u64 {
    3000
}

const fn default_slow_threshold() -> EffectiveType {
    EffectiveType::TwoG
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_health_path() -> String {
    "/api/health".to_string()
}

const fn default_request_timeout() -> u64 {
    15
}

const fn default_server_timeout() -> u64 {
    30
}

const fn default_max_usage_records() -> usize {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry_bound: default_retry_bound(),
            prune_completed: default_true(),
            page_size: default_page_size(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval(),
            probe_timeout_ms: default_probe_timeout(),
            slow_threshold: default_slow_threshold(),
            auto_sync: default_true(),
        }
    }
}

impl MonitorConfig {
    /// Interval between liveness probes.
    #[must_use]
    pub const fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    /// Liveness probe timeout, capped below five seconds.
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms.min(4_999))
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            health_path: default_health_path(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl BackendConfig {
    /// Full URL of the health endpoint.
    #[must_use]
    pub fn health_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.health_path
        )
    }
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            server_timeout_secs: default_server_timeout(),
            max_usage_records: default_max_usage_records(),
        }
    }
}

impl ActionsConfig {
    /// How long a server action may take.
    #[must_use]
    pub const fn server_timeout(&self) -> Duration {
        Duration::from_secs(self.server_timeout_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self, ResyncError> {
        let paths = Paths::new()?;
        Self::load_from_path(&paths.config_file)
    }

    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, ResyncError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            ResyncError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        serde_yaml::from_str(&contents).map_err(|e| {
            ResyncError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to_path(&self, path: &std::path::Path) -> Result<(), ResyncError> {
        let contents = serde_yaml::to_string(self)
            .map_err(|e| ResyncError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, contents).map_err(|e| {
            ResyncError::Config(format!(
                "Failed to write config file {}: {e}",
                path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.queue.retry_bound, 3);
        assert!(config.queue.prune_completed);
        assert_eq!(config.monitor.probe_interval_secs, 30);
        assert_eq!(config.monitor.slow_threshold, EffectiveType::TwoG);
        assert!(config.monitor.auto_sync);
        assert_eq!(config.backend.health_url(), "http://localhost:8080/api/health");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.actions.server_timeout(), Duration::from_secs(30));
        assert_eq!(config.actions.max_usage_records, 50);
    }

    #[test]
    fn test_load_missing_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let config = Config::load_from_path(&config_path).unwrap();

        assert_eq!(config.queue.page_size, 50);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut config = Config::default();
        config.queue.retry_bound = 7;
        config.backend.base_url = "https://api.example.com/".to_string();

        config.save_to_path(&config_path).unwrap();

        let loaded = Config::load_from_path(&config_path).unwrap();

        assert_eq!(loaded.queue.retry_bound, 7);
        assert_eq!(loaded.backend.health_url(), "https://api.example.com/api/health");
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let partial_yaml = r"
monitor:
  slow_threshold: 3g
  probe_timeout_ms: 10000
";
        std::fs::write(&config_path, partial_yaml).unwrap();

        let config = Config::load_from_path(&config_path).unwrap();

        assert_eq!(config.monitor.slow_threshold, EffectiveType::ThreeG);
        // Probe timeout never reaches five seconds
        assert_eq!(config.monitor.probe_timeout(), Duration::from_millis(4_999));
        assert_eq!(config.monitor.probe_interval_secs, 30);
        assert_eq!(config.queue.retry_bound, 3);
    }

    #[test]
    fn test_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "queue: [not, a, map]").unwrap();

        assert!(matches!(
            Config::load_from_path(&config_path),
            Err(ResyncError::Config(_))
        ));
    }
}
