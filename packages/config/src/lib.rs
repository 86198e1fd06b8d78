// ABOUTME: Process-level configuration for the Dockyard service
// ABOUTME: Parses environment variables into a validated ServiceConfig

pub mod constants;

use constants::*;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("Invalid bind address: {0}")]
    InvalidBindAddr(String),
    #[error("Invalid port range '{0}', expected START-END with 1 <= START <= END")]
    InvalidPortRange(String),
    #[error("{0} must be greater than zero")]
    MustBePositive(String),
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub sweep_interval: Duration,
    pub rate_limit_window: Duration,
    pub port_range: RangeInclusive<u16>,
    pub port_max_attempts: usize,
    pub port_probe_timeout: Duration,
    pub docker_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 4100)),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            rate_limit_window: Duration::from_secs(DEFAULT_RATE_LIMIT_SECS),
            port_range: DEFAULT_PORT_RANGE_START..=DEFAULT_PORT_RANGE_END,
            port_max_attempts: DEFAULT_PORT_MAX_ATTEMPTS,
            port_probe_timeout: Duration::from_millis(DEFAULT_PORT_PROBE_TIMEOUT_MS),
            docker_timeout_secs: DEFAULT_DOCKER_TIMEOUT_SECS,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup(DOCKYARD_DATABASE_URL).unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let bind_str =
            lookup(DOCKYARD_BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_str
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidBindAddr(bind_str.clone()))?;

        let sweep_secs = parse_positive(
            &lookup,
            DOCKYARD_SWEEP_INTERVAL_SECS,
            DEFAULT_SWEEP_INTERVAL_SECS,
        )?;

        // Zero disables the cooldown
        let rate_limit_secs =
            parse_or_default(&lookup, DOCKYARD_RATE_LIMIT_SECS, DEFAULT_RATE_LIMIT_SECS)?;

        let port_range = match lookup(DOCKYARD_PORT_RANGE) {
            Some(raw) => parse_port_range(&raw)?,
            None => DEFAULT_PORT_RANGE_START..=DEFAULT_PORT_RANGE_END,
        };

        let port_max_attempts = parse_positive(
            &lookup,
            DOCKYARD_PORT_MAX_ATTEMPTS,
            DEFAULT_PORT_MAX_ATTEMPTS,
        )?;

        let probe_ms = parse_positive(
            &lookup,
            DOCKYARD_PORT_PROBE_TIMEOUT_MS,
            DEFAULT_PORT_PROBE_TIMEOUT_MS,
        )?;

        let docker_timeout_secs = parse_positive(
            &lookup,
            DOCKYARD_DOCKER_TIMEOUT_SECS,
            DEFAULT_DOCKER_TIMEOUT_SECS,
        )?;

        let config = ServiceConfig {
            database_url,
            bind_addr,
            sweep_interval: Duration::from_secs(sweep_secs),
            rate_limit_window: Duration::from_secs(rate_limit_secs),
            port_range,
            port_max_attempts,
            port_probe_timeout: Duration::from_millis(probe_ms),
            docker_timeout_secs,
        };

        debug!("Loaded service configuration: {:?}", config);
        Ok(config)
    }
}

fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}

fn parse_positive<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + PartialEq + Default,
{
    let value = parse_or_default(lookup, key, default)?;
    if value == T::default() {
        return Err(ConfigError::MustBePositive(key.to_string()));
    }
    Ok(value)
}

/// Parse a port range in the form `START-END`
pub fn parse_port_range(raw: &str) -> Result<RangeInclusive<u16>, ConfigError> {
    let invalid = || ConfigError::InvalidPortRange(raw.to_string());

    let (start, end) = raw.trim().split_once('-').ok_or_else(invalid)?;
    let start = start.trim().parse::<u16>().map_err(|_| invalid())?;
    let end = end.trim().parse::<u16>().map_err(|_| invalid())?;

    if start == 0 || start > end {
        return Err(invalid());
    }

    Ok(start..=end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = ServiceConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.bind_addr.port(), 4100);
        assert_eq!(config.sweep_interval, Duration::from_secs(10));
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
        assert_eq!(config.port_range, 10000..=50000);
        assert_eq!(config.docker_timeout_secs, 120);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            (DOCKYARD_DATABASE_URL, "sqlite::memory:"),
            (DOCKYARD_BIND_ADDR, "0.0.0.0:8080"),
            (DOCKYARD_SWEEP_INTERVAL_SECS, "30"),
            (DOCKYARD_RATE_LIMIT_SECS, "0"),
            (DOCKYARD_PORT_RANGE, "20000-20100"),
        ]))
        .unwrap();

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.rate_limit_window, Duration::ZERO);
        assert_eq!(config.port_range, 20000..=20100);
    }

    #[test]
    fn test_invalid_bind_addr() {
        let result = ServiceConfig::from_lookup(lookup_from(&[(DOCKYARD_BIND_ADDR, "nowhere")]));
        assert!(matches!(result, Err(ConfigError::InvalidBindAddr(_))));
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let result =
            ServiceConfig::from_lookup(lookup_from(&[(DOCKYARD_SWEEP_INTERVAL_SECS, "0")]));
        assert_eq!(
            result.unwrap_err(),
            ConfigError::MustBePositive(DOCKYARD_SWEEP_INTERVAL_SECS.to_string())
        );
    }

    #[test]
    fn test_non_numeric_value_rejected() {
        let result =
            ServiceConfig::from_lookup(lookup_from(&[(DOCKYARD_PORT_MAX_ATTEMPTS, "many")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_parse_port_range() {
        assert_eq!(parse_port_range("10000-50000").unwrap(), 10000..=50000);
        assert_eq!(parse_port_range(" 5 - 5 ").unwrap(), 5..=5);
        assert!(parse_port_range("50000-10000").is_err());
        assert!(parse_port_range("0-10").is_err());
        assert!(parse_port_range("10000").is_err());
        assert!(parse_port_range("a-b").is_err());
    }
}
