//! Startup configuration
//!
//! The only external knob is the `PORT` environment variable. Everything else
//! is fixed at build time.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::instance::{BUILD_VERSION, RELAY_TIMEOUT};

/// Port used when `PORT` is unset or empty
pub const DEFAULT_PORT: u16 = 8080;

/// Directory served for every path without a dedicated handler
pub const STATIC_DIR: &str = "/usr/share/www/";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid PORT value '{0}': expected a number between 0 and 65535")]
    InvalidPort(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub static_dir: PathBuf,
    pub relay_timeout: Duration,
    pub version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            static_dir: PathBuf::from(STATIC_DIR),
            relay_timeout: RELAY_TIMEOUT,
            version: BUILD_VERSION.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_port_var(std::env::var("PORT").ok().as_deref())
    }

    /// Build a config from a raw `PORT` value
    pub fn from_port_var(port: Option<&str>) -> Result<Self, ConfigError> {
        Ok(Self {
            port: parse_port(port)?,
            ..Self::default()
        })
    }
}

fn parse_port(raw: Option<&str>) -> Result<u16, ConfigError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(DEFAULT_PORT),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidPort(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // from_env() is not exercised here: mutating PORT would race with other
    // tests running in parallel.

    #[test]
    fn test_port_defaults_to_8080() {
        assert_eq!(Config::from_port_var(None).unwrap().port, 8080);
        assert_eq!(Config::from_port_var(Some("")).unwrap().port, 8080);
    }

    #[test]
    fn test_port_is_parsed() {
        assert_eq!(Config::from_port_var(Some("9000")).unwrap().port, 9000);
        assert_eq!(Config::from_port_var(Some(" 3000 ")).unwrap().port, 3000);
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        assert_eq!(
            Config::from_port_var(Some("http")).unwrap_err(),
            ConfigError::InvalidPort("http".to_string())
        );
        assert!(Config::from_port_var(Some("70000")).is_err());
    }

    #[test]
    fn test_fixed_settings() {
        let config = Config::default();
        assert_eq!(config.static_dir, PathBuf::from("/usr/share/www/"));
        assert_eq!(config.relay_timeout, Duration::from_secs(3));
        assert!(!config.version.is_empty());
    }
}
