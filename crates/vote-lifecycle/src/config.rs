//! Lifecycle engine configuration.

use crate::error::ConfigError;
use std::env;
use std::time::Duration;

/// One hour, in milliseconds.
pub const DEFAULT_PERSUASION_WINDOW_MS: u64 = 60 * 60 * 1000;

/// Grace period after post creation during which "voting closed" is never sent.
pub const DEFAULT_EXPIRY_GRACE_MS: u64 = 60 * 1000;

/// How often the deadline watcher re-checks tracked posts.
pub const DEFAULT_WATCH_INTERVAL_MS: u64 = 30 * 1000;

/// Weight applied to others' reactions in empathy-point displays.
pub const DEFAULT_EMPATHY_WEIGHT: f64 = 0.5;

/// Configuration for the vote lifecycle engine.
#[derive(Clone, Debug, PartialEq)]
pub struct LifecycleConfig {
    /// Length of the persuasion window that precedes the deadline.
    pub persuasion_window_ms: u64,
    /// Minimum post age before a deadline-ended notification may fire.
    pub expiry_grace_ms: u64,
    /// Deadline watcher polling interval.
    pub watch_interval_ms: u64,
    /// Multiplier for the derived (empathy) score.
    pub empathy_weight: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            persuasion_window_ms: DEFAULT_PERSUASION_WINDOW_MS,
            expiry_grace_ms: DEFAULT_EXPIRY_GRACE_MS,
            watch_interval_ms: DEFAULT_WATCH_INTERVAL_MS,
            empathy_weight: DEFAULT_EMPATHY_WEIGHT,
        }
    }
}

impl LifecycleConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `VL_PERSUASION_WINDOW_SECS`: persuasion window (default: 3600)
    /// - `VL_EXPIRY_GRACE_SECS`: post-creation grace window (default: 60)
    /// - `VL_WATCH_INTERVAL_SECS`: watcher interval (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup, then validate.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            persuasion_window_ms: secs_var(
                &lookup,
                "VL_PERSUASION_WINDOW_SECS",
                defaults.persuasion_window_ms,
            )?,
            expiry_grace_ms: secs_var(&lookup, "VL_EXPIRY_GRACE_SECS", defaults.expiry_grace_ms)?,
            watch_interval_ms: secs_var(
                &lookup,
                "VL_WATCH_INTERVAL_SECS",
                defaults.watch_interval_ms,
            )?,
            empathy_weight: defaults.empathy_weight,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the engine misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.persuasion_window_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "persuasion_window_ms",
            });
        }
        if self.watch_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "watch_interval_ms",
            });
        }
        Ok(())
    }

    /// Watcher interval as a `Duration`.
    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }
}

fn secs_var<F>(lookup: &F, var: &'static str, default_ms: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default_ms),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(|secs| secs.saturating_mul(1000))
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
    }
}
