//! Predictor configuration
//!
//! Every tunable the engine reads lives here as a named, typed field. Values
//! come from defaults, a JSON file, or `LINK_*` environment variables.

use crate::error::{LinkError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_UNIQUENESS_THRESHOLD: f64 = 0.9;
pub const DEFAULT_CARDINALITY_THRESHOLD: f64 = 0.8;
pub const DEFAULT_MAX_RETRIES: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Acceptance gate on link accuracy (closed lower bound)
    pub uniqueness_threshold: f64,

    /// Uniqueness a side needs to count as the "one" side of a relationship
    pub cardinality_threshold: f64,

    /// Validation retries after the first failed attempt
    pub max_retries: usize,

    /// Drop `date & time` columns before candidate generation
    pub remove_datetime_candidates: bool,

    /// Dataset pairs compared concurrently
    pub max_concurrency: usize,

    /// Upper bound on composite candidates emitted per composite key
    pub max_composite_candidates: usize,

    pub intersect_timeout_ms: u64,

    pub validation_timeout_ms: u64,

    pub retry: RetryPolicy,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            uniqueness_threshold: DEFAULT_UNIQUENESS_THRESHOLD,
            cardinality_threshold: DEFAULT_CARDINALITY_THRESHOLD,
            max_retries: DEFAULT_MAX_RETRIES,
            remove_datetime_candidates: false,
            max_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            max_composite_candidates: 16,
            intersect_timeout_ms: 30_000,
            validation_timeout_ms: 60_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl PredictorConfig {
    /// Load a JSON config file; missing fields fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| LinkError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by any `LINK_*` environment variables that are set.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(v) = env_parse::<f64>("LINK_UNIQUENESS_THRESHOLD")? {
            self.uniqueness_threshold = v;
        }
        if let Some(v) = env_parse::<f64>("LINK_CARDINALITY_THRESHOLD")? {
            self.cardinality_threshold = v;
        }
        if let Some(v) = env_parse::<usize>("LINK_MAX_RETRIES")? {
            self.max_retries = v;
        }
        if let Some(v) = env_parse::<bool>("LINK_REMOVE_DATETIME")? {
            self.remove_datetime_candidates = v;
        }
        if let Some(v) = env_parse::<usize>("LINK_MAX_CONCURRENCY")? {
            self.max_concurrency = v;
        }
        if let Some(v) = env_parse::<u64>("LINK_INTERSECT_TIMEOUT_MS")? {
            self.intersect_timeout_ms = v;
        }
        if let Some(v) = env_parse::<u64>("LINK_VALIDATION_TIMEOUT_MS")? {
            self.validation_timeout_ms = v;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("uniqueness_threshold", self.uniqueness_threshold),
            ("cardinality_threshold", self.cardinality_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(LinkError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.max_concurrency == 0 {
            return Err(LinkError::Config("max_concurrency must be at least 1".to_string()));
        }
        if self.max_composite_candidates == 0 {
            return Err(LinkError::Config(
                "max_composite_candidates must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn intersect_timeout(&self) -> Duration {
        Duration::from_millis(self.intersect_timeout_ms)
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| LinkError::Config(format!("{}={:?}: {}", key, raw, e))),
        Err(_) => Ok(None),
    }
}

/// Backoff between validation attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 100,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate() -> Self {
        Self {
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay before retry number `attempt` (0-based), capped at `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let delay_ms = (self.initial_delay_ms as f64) * self.backoff_multiplier.powi(attempt as i32);
        let delay_ms = delay_ms.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(delay_ms as u64)
    }
}
