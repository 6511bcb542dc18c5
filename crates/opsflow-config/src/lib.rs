//! opsflow configuration
//!
//! Tunables for the remote-operation layer: rate limits, retry deadlines,
//! page size and poll cadence. Values come from a YAML file when one is found,
//! then environment overrides, then built-in defaults for everything unset.

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "OPSFLOW_CONFIG_PATH";
pub const RATE_LIMIT_ENV: &str = "OPSFLOW_RATE_LIMIT";
pub const PAGE_SIZE_ENV: &str = "OPSFLOW_PAGE_SIZE";
pub const POLL_INTERVAL_ENV: &str = "OPSFLOW_POLL_INTERVAL_MS";

const CANDIDATES: [&str; 2] = ["opsflow.yaml", ".opsflow.yaml"];

/// All tunables of the orchestration layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub rate_limit: RateLimitSettings,
    pub retry: RetrySettings,
    pub pagination: PaginationSettings,
    pub polling: PollingSettings,
}

/// Outbound call quotas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Quota applied to each operation name that has no override
    pub default_per_second: u32,

    /// Aggregate cap across all operations
    pub global_per_second: Option<u32>,

    /// Admissions allowed back-to-back before the rate applies
    pub burst: u32,

    /// Per-operation quotas keyed by operation name
    pub operations: HashMap<String, u32>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            default_per_second: 20,
            global_per_second: None,
            burst: 1,
            operations: HashMap::new(),
        }
    }
}

/// Retry deadlines and backoff shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub read_deadline_secs: u64,
    pub write_deadline_secs: u64,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,

    /// 1.0 keeps the delay fixed
    pub backoff_multiplier: f64,

    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            read_deadline_secs: 180,
            write_deadline_secs: 300,
            initial_delay_ms: 1000,
            max_delay_ms: 1000,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

impl RetrySettings {
    pub fn read_deadline(&self) -> Duration {
        Duration::from_secs(self.read_deadline_secs)
    }

    pub fn write_deadline(&self) -> Duration {
        Duration::from_secs(self.write_deadline_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationSettings {
    pub page_size: u64,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self { page_size: 20 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    pub interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            timeout_secs: 1800,
        }
    }
}

impl PollingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl OpsConfig {
    /// Discover, load, override from the environment and validate
    pub fn load() -> Result<Self> {
        let mut config = match find_config_file()? {
            Some(path) => Self::load_from(&path)?,
            None => {
                tracing::debug!("No opsflow config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML config file. Missing sections keep their defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: OpsConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!("Loaded opsflow config from {}", path.display());
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(rate) = env_number::<u32>(RATE_LIMIT_ENV)? {
            self.rate_limit.default_per_second = rate;
        }
        if let Some(size) = env_number::<u64>(PAGE_SIZE_ENV)? {
            self.pagination.page_size = size;
        }
        if let Some(ms) = env_number::<u64>(POLL_INTERVAL_ENV)? {
            self.polling.interval_ms = ms;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.default_per_second == 0 {
            return Err(invalid("rate_limit.default_per_second", "must be positive"));
        }
        if self.rate_limit.global_per_second == Some(0) {
            return Err(invalid("rate_limit.global_per_second", "must be positive"));
        }
        if self.rate_limit.burst == 0 {
            return Err(invalid("rate_limit.burst", "must be at least 1"));
        }
        if let Some((name, _)) = self.rate_limit.operations.iter().find(|(_, r)| **r == 0) {
            return Err(invalid(
                &format!("rate_limit.operations.{}", name),
                "must be positive",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(invalid("retry.backoff_multiplier", "must be >= 1.0"));
        }
        if self.retry.initial_delay_ms == 0 {
            return Err(invalid("retry.initial_delay_ms", "must be positive"));
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(invalid(
                "retry.max_delay_ms",
                "must not be smaller than initial_delay_ms",
            ));
        }
        if self.pagination.page_size == 0 {
            return Err(invalid("pagination.page_size", "must be positive"));
        }
        if self.polling.interval_ms == 0 {
            return Err(invalid("polling.interval_ms", "must be positive"));
        }
        Ok(())
    }
}

/// Locate the opsflow config file
///
/// Search order:
/// 1. `OPSFLOW_CONFIG_PATH` (must exist when set)
/// 2. Current directory: opsflow.yaml, .opsflow.yaml
/// 3. `<config dir>/opsflow/config.yaml`
///
/// Returns `Ok(None)` when nothing is found; defaults apply then.
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::FileNotFound(path));
    }

    let current_dir = std::env::current_dir()?;
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("opsflow").join("config.yaml");
        if global.exists() {
            return Ok(Some(global));
        }
    }

    Ok(None)
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| invalid(key, &format!("'{}' is not a number", raw))),
        Err(_) => Ok(None),
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
