use std::env;
use std::str::FromStr;

use thiserror::Error;

const DEFAULT_INACTIVITY_TIMEOUT: u64 = 60;
const DEFAULT_REMOVE_TIMEOUT: u64 = 60;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub daemon: DaemonConfig,
    pub control: ControlConfig,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Seconds an idle client may keep a connection before it is dropped,
    /// used when a ticket does not specify its own value.
    pub inactivity_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Seconds a ticket removal waits for ongoing operations to drain. Zero
    /// makes removal non-blocking; the caller polls and removes again.
    pub remove_timeout: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            remove_timeout: DEFAULT_REMOVE_TIMEOUT,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    ParseError(&'static str, String),
}

impl Config {
    /// Load `.env` from the current and parent directory, then read the
    /// environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        dotenvy::from_path("../.env").ok();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let inactivity_timeout =
            parse_with_default("TRANSFER_INACTIVITY_TIMEOUT", DEFAULT_INACTIVITY_TIMEOUT)?;
        let remove_timeout = parse_with_default("TRANSFER_REMOVE_TIMEOUT", DEFAULT_REMOVE_TIMEOUT)?;

        Ok(Self {
            daemon: DaemonConfig { inactivity_timeout },
            control: ControlConfig { remove_timeout },
        })
    }
}

fn parse_with_default<T>(key: &'static str, default_value: T) -> Result<T, ConfigError>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default_value),
    }
}

fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|err| ConfigError::ParseError(key, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.daemon.inactivity_timeout, 60);
        assert_eq!(config.control.remove_timeout, 60);
    }

    #[test]
    fn parse_trims_whitespace() {
        let value: u64 = parse_value("TRANSFER_REMOVE_TIMEOUT", " 30 ").unwrap();
        assert_eq!(value, 30);
    }

    #[test]
    fn parse_rejects_negative_timeout() {
        let err = parse_value::<u64>("TRANSFER_REMOVE_TIMEOUT", "-1").unwrap_err();
        assert!(err.to_string().starts_with("Invalid value for TRANSFER_REMOVE_TIMEOUT"));
    }
}
