//! Typed configuration from environment variables.
//!
//! Loads once at startup. Every knob has a sane default, so an empty
//! environment is a valid one; set vars fail fast when they do not parse.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Dispatcher tasks the blocking pool runs. At least 1.
    pub workers: usize,
    /// Capacity of the bridge event ring.
    pub event_capacity: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 4,
            event_capacity: 1024,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();
        let config = Self {
            workers: parsed_var("WORKBRIDGE_WORKERS", defaults.workers)?,
            event_capacity: parsed_var("WORKBRIDGE_EVENT_CAPACITY", defaults.event_capacity)?,
            log_level: std::env::var("WORKBRIDGE_LOG").unwrap_or(defaults.log_level),
        };
        if config.workers == 0 {
            return Err(Error::Config(
                "WORKBRIDGE_WORKERS must be at least 1".to_string(),
            ));
        }
        if config.event_capacity == 0 {
            return Err(Error::Config(
                "WORKBRIDGE_EVENT_CAPACITY must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }
}

fn parsed_var(name: &str, default: usize) -> Result<usize> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("{name} must be an integer, got '{raw}'"))),
    }
}
