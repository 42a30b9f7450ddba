//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    /// Candidate device paths, tried in order
    #[serde(default = "default_ports")]
    pub ports: Vec<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

/// Durable store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

/// CSV export configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    /// Path the shutdown export is written to
    #[serde(default = "default_output_path")]
    pub output_path: String,

    /// Write the full history as CSV when the process exits
    #[serde(default = "default_export_on_shutdown")]
    pub export_on_shutdown: bool,
}

/// Status logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    /// Log a status line every N readings
    #[serde(default = "default_status_interval")]
    pub status_interval: u64,
}

// Default value functions
fn default_ports() -> Vec<String> {
    vec!["/dev/ttyUSB0".to_string(), "/dev/ttyACM0".to_string()]
}
fn default_baud_rate() -> u32 { 9600 }

fn default_database_url() -> String { "sqlite://meter_log.db?mode=rwc".to_string() }

fn default_output_path() -> String { "meter_log.csv".to_string() }
fn default_export_on_shutdown() -> bool { true }

fn default_status_interval() -> u64 { 50 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            ports: default_ports(),
            baud_rate: default_baud_rate(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            export_on_shutdown: default_export_on_shutdown(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            status_interval: default_status_interval(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use atorch_logger::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.serial.ports.is_empty() {
            return Err(toml::de::Error::custom("serial.ports must not be empty").into());
        }
        if self.serial.baud_rate == 0 {
            return Err(toml::de::Error::custom("serial.baud_rate must be positive").into());
        }
        if self.database.url.is_empty() {
            return Err(toml::de::Error::custom("database.url must not be empty").into());
        }
        if self.log.status_interval == 0 {
            return Err(toml::de::Error::custom("log.status_interval must be positive").into());
        }
        Ok(())
    }
}
