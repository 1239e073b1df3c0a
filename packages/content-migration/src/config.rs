//! Configuration for migration jobs.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;
use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, Result};

/// Retry schedule for writing a job status record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the second attempt.
    ///
    /// Default: 5 seconds.
    pub initial_delay: Duration,

    /// Growth factor applied to the delay after each failed attempt.
    ///
    /// Default: 1.0 (fixed delay).
    pub multiplier: f64,

    /// Upper bound for the delay between attempts.
    pub max_delay: Duration,

    /// Give up after this many attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            multiplier: 1.0,
            max_delay: Duration::from_secs(60),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Fixed delay, unlimited attempts.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            ..Default::default()
        }
    }

    /// Exponential backoff with an attempt limit.
    pub fn exponential(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            multiplier: 2.0,
            max_delay,
            max_attempts: Some(max_attempts),
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// Never exceeds `max_delay` (or `initial_delay`, if that is larger), however
    /// large the multiplier or attempt number.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let cap = self.max_delay.max(self.initial_delay);
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);

        // Clamp in f64 first; Duration::mul_f64 panics on overflow
        let secs = self.initial_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= cap.as_secs_f64() {
            return cap;
        }
        self.initial_delay.mul_f64(factor).min(cap)
    }

    /// Whether another attempt is allowed after `attempts` failures.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

/// Tuning knobs for enumeration and migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Retry schedule for status persistence.
    pub persist_retry: RetryPolicy,

    /// Per remote call timeout. A timed-out call fails only the current node.
    ///
    /// Default: None (calls may take as long as they take).
    pub call_timeout: Option<Duration>,

    /// Page size when listing the content of a category.
    ///
    /// Default: 100.
    pub content_page_size: usize,

    /// Depth passed to category fetches.
    ///
    /// Default: 1.
    pub fetch_depth: u32,

    /// Persist a checkpoint after this many recorded results.
    ///
    /// Default: None (persist on completion only).
    pub checkpoint_every: Option<usize>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            persist_retry: RetryPolicy::default(),
            call_timeout: None,
            content_page_size: 100,
            fetch_depth: 1,
            checkpoint_every: None,
        }
    }
}

impl MigrationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_persist_retry(mut self, policy: RetryPolicy) -> Self {
        self.persist_retry = policy;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn with_content_page_size(mut self, size: usize) -> Self {
        self.content_page_size = size.max(1);
        self
    }

    pub fn with_fetch_depth(mut self, depth: u32) -> Self {
        self.fetch_depth = depth;
        self
    }

    pub fn with_checkpoint_every(mut self, results: usize) -> Self {
        self.checkpoint_every = Some(results.max(1));
        self
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = Self::default();
        let initial_delay = env_parse::<u64>("MIGRATION_PERSIST_RETRY_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.persist_retry.initial_delay);
        let multiplier = env_parse::<f64>("MIGRATION_PERSIST_RETRY_MULTIPLIER")?
            .unwrap_or(defaults.persist_retry.multiplier);
        let max_delay = env_parse::<u64>("MIGRATION_PERSIST_RETRY_MAX_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.persist_retry.max_delay);
        let max_attempts = env_parse::<u32>("MIGRATION_PERSIST_MAX_ATTEMPTS")?;

        let multiplier = check_multiplier(multiplier)?;
        if max_attempts == Some(0) {
            return Err(MigrationError::Config {
                var: "MIGRATION_PERSIST_MAX_ATTEMPTS".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            persist_retry: RetryPolicy {
                initial_delay,
                multiplier,
                max_delay,
                max_attempts,
            },
            call_timeout: env_parse::<u64>("MIGRATION_CALL_TIMEOUT_MS")?.map(Duration::from_millis),
            content_page_size: env_parse::<usize>("MIGRATION_CONTENT_PAGE_SIZE")?
                .unwrap_or(defaults.content_page_size)
                .max(1),
            fetch_depth: env_parse::<u32>("MIGRATION_FETCH_DEPTH")?.unwrap_or(defaults.fetch_depth),
            checkpoint_every: env_parse::<usize>("MIGRATION_CHECKPOINT_EVERY")?.filter(|n| *n > 0),
        })
    }
}

fn check_multiplier(multiplier: f64) -> Result<f64> {
    if !multiplier.is_finite() || multiplier < 1.0 {
        return Err(MigrationError::Config {
            var: "MIGRATION_PERSIST_RETRY_MULTIPLIER".into(),
            reason: format!("must be a finite number >= 1.0, got {multiplier}"),
        });
    }
    Ok(multiplier)
}

fn env_parse<T>(var: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| MigrationError::Config {
                var: var.to_string(),
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
