//! Process configuration.
//!
//! Loaded once at startup from environment variables, validated, then
//! read-only for the life of the process. The quota values drive the
//! allocator; the rest wires the HTTP server, seeding, and retention sweep.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be at least 1, got {value}")]
    InvalidQuota { name: &'static str, value: usize },

    #[error("{name} is not a valid number: {value}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("Invalid bind address: {0}")]
    InvalidBindAddr(String),
}

/// Runtime configuration, immutable after startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Most tasks a device may be granted per day.
    pub max_tasks_per_day: usize,
    /// Most distinct cities a device may touch per day.
    pub max_cities_per_day: usize,
    /// How many prior days to search for a continuity signal when a device
    /// skipped one or more days.
    pub max_idle_lookback_days: u64,
    /// Listen address for the HTTP server.
    pub bind_addr: String,
    /// Optional fixture file seeding today's inventory at startup. Without
    /// it a built-in demo fixture is used.
    pub seed_file: Option<PathBuf>,
    /// Seconds between retention sweeps of old inventory days and
    /// assignment records.
    pub sweep_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_tasks_per_day: 4,
            max_cities_per_day: 2,
            max_idle_lookback_days: 2,
            bind_addr: "0.0.0.0:8080".to_string(),
            seed_file: None,
            sweep_interval_secs: 3600,
        }
    }
}

impl Config {
    /// Build configuration from environment variables, falling back to
    /// defaults, and validate it.
    ///
    /// Recognized variables:
    /// - `TASKYARD_MAX_TASKS_PER_DAY` (default 4)
    /// - `TASKYARD_MAX_CITIES_PER_DAY` (default 2)
    /// - `TASKYARD_MAX_IDLE_DAYS` (default 2)
    /// - `TASKYARD_BIND` (default `0.0.0.0:8080`)
    /// - `TASKYARD_SEED_FILE` (optional fixture path)
    /// - `TASKYARD_SWEEP_INTERVAL_SECS` (default 3600)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            max_tasks_per_day: env_number(
                "TASKYARD_MAX_TASKS_PER_DAY",
                defaults.max_tasks_per_day,
            )?,
            max_cities_per_day: env_number(
                "TASKYARD_MAX_CITIES_PER_DAY",
                defaults.max_cities_per_day,
            )?,
            max_idle_lookback_days: env_number(
                "TASKYARD_MAX_IDLE_DAYS",
                defaults.max_idle_lookback_days,
            )?,
            bind_addr: std::env::var("TASKYARD_BIND").unwrap_or(defaults.bind_addr),
            seed_file: std::env::var("TASKYARD_SEED_FILE").ok().map(PathBuf::from),
            sweep_interval_secs: env_number(
                "TASKYARD_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the allocator cannot run under. Quota misuse is
    /// a startup error, never a per-request concern.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tasks_per_day == 0 {
            return Err(ConfigError::InvalidQuota {
                name: "max_tasks_per_day",
                value: 0,
            });
        }
        if self.max_cities_per_day == 0 {
            return Err(ConfigError::InvalidQuota {
                name: "max_cities_per_day",
                value: 0,
            });
        }
        if self.max_idle_lookback_days == 0 {
            return Err(ConfigError::InvalidQuota {
                name: "max_idle_lookback_days",
                value: 0,
            });
        }
        if self.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidBindAddr(self.bind_addr.clone()));
        }
        Ok(())
    }
}

fn env_number<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
        Err(_) => Ok(default),
    }
}
