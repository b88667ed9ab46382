//! Tunable lifecycle constants.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON document only overrides the fields it names. Durations are carried
//! as milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Polling budget for resolving a session id through the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolveBudget {
    /// Wait before each query, in milliseconds.
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl ResolveBudget {
    /// Budget used when the daemon returned a provisional id: the process
    /// is known to exist, so wait longer (5s x 24, about two minutes).
    pub const CONFIRMED_PROVISIONAL: Self = Self {
        interval_ms: 5_000,
        max_attempts: 24,
    };

    /// Budget used when the acknowledgment was lost entirely (3s x 10).
    pub const OPTIMISTIC: Self = Self {
        interval_ms: 3_000,
        max_attempts: 10,
    };

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            max_attempts,
        }
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Upper bound on the time a resolution with this budget spends waiting.
    #[must_use]
    pub const fn total_wait(&self) -> Duration {
        Duration::from_millis(self.interval_ms.saturating_mul(self.max_attempts as u64))
    }
}

impl Default for ResolveBudget {
    fn default() -> Self {
        Self::CONFIRMED_PROVISIONAL
    }
}

/// Bulk restore limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestoreSettings {
    /// Units per batch; at most this many remote calls start together.
    pub concurrency: usize,
    /// Per-unit deadline, in milliseconds.
    pub unit_timeout_ms: u64,
}

impl RestoreSettings {
    #[must_use]
    pub const fn unit_timeout(&self) -> Duration {
        Duration::from_millis(self.unit_timeout_ms)
    }
}

impl Default for RestoreSettings {
    fn default() -> Self {
        Self {
            concurrency: 3,
            unit_timeout_ms: 60_000,
        }
    }
}

/// Root lifecycle configuration.
///
/// ```json
/// {
///   "confirmedResolution": { "intervalMs": 5000, "maxAttempts": 24 },
///   "restore": { "concurrency": 3 }
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LifecycleConfig {
    /// Budget after a provisional id.
    pub confirmed_resolution: ResolveBudget,
    /// Budget after a lost acknowledgment.
    pub optimistic_resolution: ResolveBudget,
    pub restore: RestoreSettings,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            confirmed_resolution: ResolveBudget::CONFIRMED_PROVISIONAL,
            optimistic_resolution: ResolveBudget::OPTIMISTIC,
            restore: RestoreSettings::default(),
        }
    }
}

impl LifecycleConfig {
    /// Parse and validate a JSON document, filling missing fields with defaults.
    ///
    /// # Errors
    /// Returns error if the JSON is malformed or a limit is zero.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject limits that would make a run never start or never resolve.
    ///
    /// # Errors
    /// Returns error describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.restore.concurrency == 0 {
            return Err(ConfigError::Invalid("restore.concurrency must be at least 1".into()));
        }
        if self.restore.unit_timeout_ms == 0 {
            return Err(ConfigError::Invalid("restore.unitTimeoutMs must be positive".into()));
        }
        for (name, budget) in [
            ("confirmedResolution", self.confirmed_resolution),
            ("optimisticResolution", self.optimistic_resolution),
        ] {
            if budget.max_attempts == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{name}.maxAttempts must be at least 1"
                )));
            }
        }
        Ok(())
    }
}
