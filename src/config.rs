//! Plain-value retry configuration
//!
//! [`BackoffConfig`] is everything a [`RetryPolicy`](crate::RetryPolicy) holds
//! except the retry predicate. It can be written in code, parsed from JSON, or
//! read from environment variables sharing a prefix:
//!
//! ```text
//! GEMINI_RETRY_INITIAL_DELAY_MS=2000
//! GEMINI_RETRY_MAX_DELAY_MS=64000
//! GEMINI_RETRY_MULTIPLIER=2.0
//! GEMINI_RETRY_TOTAL_TIMEOUT_MS=600000
//! GEMINI_RETRY_MAX_ATTEMPTS=10
//! GEMINI_RETRY_JITTER=0.2
//! ```

use crate::{ConfigError, Jitter};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Backoff parameters for a retried call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first retry
    #[serde(rename = "initial_delay_ms", with = "millis")]
    pub initial_delay: Duration,
    /// Ceiling on the delay between any two attempts
    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Duration,
    /// Geometric growth factor applied after every retry
    pub multiplier: f64,
    /// Wall-clock budget for the whole call, all attempts included
    #[serde(rename = "total_timeout_ms", with = "millis")]
    pub total_timeout: Duration,
    /// Optional cap on invocations, on top of the time budget
    pub max_attempts: Option<u32>,
    /// Randomisation applied to each sleep
    pub jitter: Jitter,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            total_timeout: Duration::from_secs(120),
            max_attempts: None,
            jitter: Jitter::None,
        }
    }
}

impl BackoffConfig {
    /// Check every field against the policy invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_delay.is_zero() {
            return Err(ConfigError::ZeroInitialDelay);
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::MaxDelayBelowInitial {
                initial: self.initial_delay,
                max: self.max_delay,
            });
        }
        if !self.multiplier.is_finite() || self.multiplier <= 1.0 {
            return Err(ConfigError::InvalidMultiplier(self.multiplier));
        }
        if self.total_timeout.is_zero() {
            return Err(ConfigError::ZeroTotalTimeout);
        }
        if self.max_attempts == Some(0) {
            return Err(ConfigError::ZeroMaxAttempts);
        }
        if let Jitter::Proportional(ratio) = self.jitter {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(ConfigError::InvalidJitter(ratio));
            }
        }
        Ok(())
    }

    /// Parse and validate a JSON document; missing keys take their defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read `{prefix}_*` environment variables over the defaults
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_lookup(prefix, |name| std::env::var(name).ok())
    }

    fn from_lookup<L>(prefix: &str, lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |suffix: &str| {
            let name = format!("{prefix}_{suffix}");
            lookup(&name).map(|value| (name, value))
        };

        if let Some((name, value)) = var("INITIAL_DELAY_MS") {
            config.initial_delay = Duration::from_millis(parse(&name, &value)?);
        }
        if let Some((name, value)) = var("MAX_DELAY_MS") {
            config.max_delay = Duration::from_millis(parse(&name, &value)?);
        }
        if let Some((name, value)) = var("MULTIPLIER") {
            config.multiplier = parse(&name, &value)?;
        }
        if let Some((name, value)) = var("TOTAL_TIMEOUT_MS") {
            config.total_timeout = Duration::from_millis(parse(&name, &value)?);
        }
        if let Some((name, value)) = var("MAX_ATTEMPTS") {
            config.max_attempts = Some(parse(&name, &value)?);
        }
        if let Some((name, value)) = var("JITTER") {
            config.jitter = parse_jitter(&name, &value)?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Environment {
        var: var.to_string(),
        value: value.to_string(),
    })
}

fn parse_jitter(var: &str, value: &str) -> Result<Jitter, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "" | "none" | "off" => Ok(Jitter::None),
        "full" => Ok(Jitter::Full),
        _ => parse(var, value).map(Jitter::Proportional),
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
