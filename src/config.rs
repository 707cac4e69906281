//! Configuration management for ChargeSync
//!
//! This module handles loading, validation, and management of the engine
//! configuration from YAML files.

use crate::error::{ChargeSyncError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_true() -> bool {
    true
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Remote charging API connection configuration
    pub api: ApiConfig,

    /// Polling cadences and backoff limits
    pub polling: PollingConfig,

    /// Token storage configuration
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Remote API connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the charging management API
    pub base_url: String,

    /// OAuth client id
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// Polling cadences per resource class and backoff limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Baseline interval for the charge point reference set (seconds)
    pub charge_points_interval_secs: u64,

    /// Baseline interval for wallet and wallet transactions (seconds)
    pub wallet_interval_secs: u64,

    /// Baseline interval for per-charge-point charge fetches (seconds)
    pub charges_interval_secs: u64,

    /// Upper bound any backoff escalation is capped at (seconds)
    pub max_interval_secs: u64,

    /// Consecutive successes required before an escalated interval
    /// starts decaying back toward baseline
    pub recovery_threshold: u32,
}

/// Token storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the durable token record. Empty means tokens are kept
    /// in memory only and re-acquired on restart.
    pub token_file: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file (empty disables file logging)
    pub file: String,

    /// Whether to log to console
    #[serde(default = "default_true")]
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://public-api.monta.com/api/v1/".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            timeout_secs: 10,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            charge_points_interval_secs: 3600,
            wallet_interval_secs: 300,
            charges_interval_secs: 30,
            max_interval_secs: 300,
            recovery_threshold: 3,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: String::new(),
            console_output: true,
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os("CHARGESYNC_CONFIG") {
            return Self::from_file(path);
        }

        let default_paths = [
            "chargesync.yaml",
            "/data/chargesync.yaml",
            "/etc/chargesync/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.is_empty() {
            return Err(ChargeSyncError::validation(
                "api.base_url",
                "Base URL cannot be empty",
            ));
        }

        if self.api.client_id.is_empty() {
            return Err(ChargeSyncError::validation(
                "api.client_id",
                "Client id cannot be empty",
            ));
        }

        if self.api.client_secret.is_empty() {
            return Err(ChargeSyncError::validation(
                "api.client_secret",
                "Client secret cannot be empty",
            ));
        }

        if self.api.timeout_secs == 0 {
            return Err(ChargeSyncError::validation(
                "api.timeout_secs",
                "Must be greater than 0",
            ));
        }

        let polling = &self.polling;
        for (field, value) in [
            (
                "polling.charge_points_interval_secs",
                polling.charge_points_interval_secs,
            ),
            ("polling.wallet_interval_secs", polling.wallet_interval_secs),
            ("polling.charges_interval_secs", polling.charges_interval_secs),
            ("polling.max_interval_secs", polling.max_interval_secs),
        ] {
            if value == 0 {
                return Err(ChargeSyncError::validation(field, "Must be greater than 0"));
            }
        }

        if polling.recovery_threshold == 0 {
            return Err(ChargeSyncError::validation(
                "polling.recovery_threshold",
                "Must be at least 1",
            ));
        }

        Ok(())
    }
}
