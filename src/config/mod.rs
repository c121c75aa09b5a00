//! Application configuration loading, validation, and management.
//!
//! This module provides the top-level `Config` structure that aggregates
//! logging, monitoring, and HTTP server configurations. It handles locating
//! and loading the TOML file, validation, and falling back to built-in
//! defaults when no file is present.
//!
//! The configuration is loaded early in the application lifecycle and is
//! intended to remain immutable thereafter.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::config::{logger::LoggerConfig, monitor::MonitorConfig, server::ServerConfig};

pub mod logger;
pub mod monitor;
pub mod server;

/// Simple macros for printing timestamped messages before the tracing subscriber
/// is initialized. These are used during early configuration loading.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style(
                time::OffsetDateTime::now_utc()
                    .format(&time::format_description::parse(
                        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
                    ).unwrap())
                    .unwrap()
            ).dim(),
            console::style("INFO").green(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style(
                time::OffsetDateTime::now_utc()
                    .format(&time::format_description::parse(
                        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
                    ).unwrap())
                    .unwrap()
            ).dim(),
            console::style("WARN").yellow(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style(
                time::OffsetDateTime::now_utc()
                    .format(&time::format_description::parse(
                        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
                    ).unwrap())
                    .unwrap()
            ).dim(),
            console::style("ERROR").red(),
            format_args!($($arg)*)
        );
    };
}

/// Errors that can occur during configuration loading, parsing, or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Generic configuration-related error with a descriptive message.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error while accessing configuration files.
    #[error("IO error while reading configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// Failure to parse the TOML configuration file.
    #[error("Parse error while reading configuration: {0}")]
    ParseError(String),

    /// Validation failure after successful parsing.
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Top-level application configuration.
///
/// Combines logging, monitoring, and server settings into a single structure.
#[derive(Serialize, Deserialize, Debug, Validate, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// Logging subsystem configuration.
    #[validate(nested)]
    pub logger: LoggerConfig,

    /// Monitored services, peer measurement and probe settings.
    #[validate(nested)]
    pub monitor: MonitorConfig,

    /// HTTP endpoint configuration.
    #[validate(nested)]
    pub server: ServerConfig,
}

impl Config {
    /// Constructs a new configuration by locating and loading the config file.
    ///
    /// When no file can be found the built-in defaults are used.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if an existing configuration file cannot be
    /// read, parsed, or validated.
    pub fn new() -> Result<Self, ConfigError> {
        match Self::get_config_path() {
            Some(config_path) => Self::load(&config_path),
            None => {
                print_warn!("No configuration file found, using built-in defaults");
                let config = Config::default();
                config
                    .validate()
                    .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
                Ok(config)
            }
        }
    }

    /// Determines the configuration file path.
    ///
    /// Priority:
    /// 1. `NODEPULSE_CONFIG` environment variable
    /// 2. `/etc/nodepulse/config.toml`
    fn get_config_path() -> Option<PathBuf> {
        if let Ok(config_path) = std::env::var("NODEPULSE_CONFIG") {
            let path = PathBuf::from(config_path);
            print_info!("Using config from NODEPULSE_CONFIG: {}", path.display());
            return Some(path);
        }

        let fallback = Path::new("/etc/nodepulse/config.toml");
        if fallback.exists() {
            print_info!("Using default config path: {}", fallback.display());
            return Some(fallback.to_path_buf());
        }

        None
    }

    /// Loads and validates configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Propagates IO, parsing, and validation errors as `ConfigError`.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        print_info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::Config(format!(
                "configuration file not found: {}",
                path.to_string_lossy()
            )));
        }

        let config_str = fs::read_to_string(path)?;
        let config = Self::from_toml(&config_str)?;

        print_info!("Successfully loaded config from: {}", path.display());
        Ok(config)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Config, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::{monitor::PeerStrategy, *};

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.monitor.cache_ttl_secs, 3);
        assert_eq!(config.monitor.peer_strategy, PeerStrategy::Lsof);
        assert!(!config.monitor.external_ip.enabled);
    }

    #[test]
    fn test_from_toml_partial_sections_use_defaults() {
        let content = r#"
[monitor]
peer_strategy = "logs"
cache_ttl_secs = 10

[monitor.execution]
service = "geth-mainnet"
process = "geth"
"#;

        let config = Config::from_toml(content).expect("config should parse");
        assert_eq!(config.monitor.peer_strategy, PeerStrategy::Logs);
        assert_eq!(config.monitor.cache_ttl_secs, 10);
        assert_eq!(config.monitor.execution.service, "geth-mainnet");
        assert_eq!(config.monitor.execution.process, "geth");
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert_eq!(config.logger.level, "info");
    }

    #[test]
    fn test_from_toml_rejects_unknown_strategy() {
        let content = r#"
[monitor]
peer_strategy = "carrier-pigeon"
"#;

        let result = Config::from_toml(content);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_from_toml_rejects_zero_ttl() {
        let content = r#"
[monitor]
cache_ttl_secs = 0
"#;

        let result = Config::from_toml(content);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_from_toml_rejects_bad_log_level() {
        let content = r#"
[logger]
level = "loud"
"#;

        let result = Config::from_toml(content);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_example_config_parses() {
        let config = Config::from_toml(include_str!("../../nodepulse.example.toml"))
            .expect("example config should be valid");
        assert_eq!(config.monitor.consensus.service, "prysm");
        assert_eq!(config.monitor.execution.process, "geth");
        assert_eq!(config.monitor.log_lines, 500);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/nodepulse/config.toml"));
        assert!(matches!(result, Err(ConfigError::Config(_))));
    }
}
