//! TOML configuration.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working setup: snapshots under `data/`, one year of retention, energy-charts
//! with ENTSO-E fallback when `EPEXPREDICTOR_ENTSOE_API_KEY` is set.

use crate::data::fallback::{Backoff, RetryPolicy};
use crate::data::CircuitBreaker;
use crate::schedule::{FixedInterval, PublicationSchedule};
use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub http: HttpConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: BreakerConfig,
    pub schedule: ScheduleConfig,
    pub entsoe: EntsoeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Snapshot directory. `None` keeps everything in memory.
    pub dir: Option<PathBuf>,
    /// Rows older than this are dropped on every refresh.
    pub retention_days: i64,
    /// How far back a refresh makes sure data is present.
    pub training_days: i64,
    /// How far ahead a refresh asks for forecasts.
    pub forecast_days: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: Some(PathBuf::from("data")),
            retention_days: 365,
            training_days: 120,
            forecast_days: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 8,
            user_agent: concat!("epexpredictor/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

/// Retry applied to the primary provider of each store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub delay_secs: u64,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            delay_secs: policy.delay.as_secs(),
            backoff: policy.backoff,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            delay: std::time::Duration::from_secs(self.delay_secs),
            backoff: self.backoff,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub cooldown_secs: u64,
    pub failure_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 30 * 60,
            failure_threshold: 3,
        }
    }
}

impl BreakerConfig {
    pub fn build(&self) -> CircuitBreaker {
        CircuitBreaker::new(
            std::time::Duration::from_secs(self.cooldown_secs),
            self.failure_threshold,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Local time at which next-day prices are normally published.
    pub publication_time: NaiveTime,
    pub imminent_poll_minutes: i64,
    pub slow_poll_hours: i64,
    pub weather_interval_hours: i64,
    pub calendar_interval_hours: i64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            publication_time: NaiveTime::from_hms_opt(13, 0, 0).unwrap_or(NaiveTime::MIN),
            imminent_poll_minutes: 5,
            slow_poll_hours: 12,
            weather_interval_hours: 3,
            calendar_interval_hours: 24,
        }
    }
}

impl ScheduleConfig {
    pub fn price_schedule(&self) -> PublicationSchedule {
        PublicationSchedule {
            publication_time: self.publication_time,
            imminent_poll: Duration::minutes(self.imminent_poll_minutes),
            slow_poll: Duration::hours(self.slow_poll_hours),
        }
    }

    pub fn weather_schedule(&self) -> FixedInterval {
        FixedInterval::new(Duration::hours(self.weather_interval_hours))
    }

    pub fn calendar_schedule(&self) -> FixedInterval {
        FixedInterval::new(Duration::hours(self.calendar_interval_hours))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntsoeConfig {
    /// Environment variable holding the security token.
    pub api_key_env: String,
}

impl Default for EntsoeConfig {
    fn default() -> Self {
        Self {
            api_key_env: "EPEXPREDICTOR_ENTSOE_API_KEY".to_string(),
        }
    }
}

impl EntsoeConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given and present, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) if p.exists() => Self::from_file(p),
            _ => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("storage.retention_days", self.storage.retention_days),
            ("storage.training_days", self.storage.training_days),
            ("schedule.imminent_poll_minutes", self.schedule.imminent_poll_minutes),
            ("schedule.slow_poll_hours", self.schedule.slow_poll_hours),
            ("schedule.weather_interval_hours", self.schedule.weather_interval_hours),
            ("schedule.calendar_interval_hours", self.schedule.calendar_interval_hours),
        ];
        for (name, value) in positive {
            if value <= 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive, got {value}")));
            }
        }
        if self.storage.forecast_days < 0 {
            return Err(ConfigError::Invalid("storage.forecast_days must not be negative".into()));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid("http.timeout_secs must be positive".into()));
        }
        Ok(())
    }
}
