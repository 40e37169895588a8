//! Retry policy: backoff parameters plus the retryability predicate

use crate::{BackoffConfig, ConfigError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Shared predicate deciding whether an error warrants another attempt
pub type Predicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Randomisation applied to each backoff sleep.
///
/// Jitter only ever shortens a sleep, so the `max_delay` ceiling holds with or
/// without it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Jitter {
    /// Sleep exactly the computed delay
    #[default]
    None,
    /// Sleep a uniform random duration in `[0, delay]`
    Full,
    /// Sleep a uniform random duration in `[delay * (1 - ratio), delay]`
    Proportional(f64),
}

impl Jitter {
    /// Apply this jitter to a computed delay
    pub fn apply(&self, delay: Duration) -> Duration {
        let ratio = match *self {
            Jitter::None => return delay,
            Jitter::Full => 1.0,
            Jitter::Proportional(ratio) => ratio.clamp(0.0, 1.0),
        };
        if ratio == 0.0 || delay.is_zero() {
            return delay;
        }
        let scale = rand::thread_rng().gen_range((1.0 - ratio)..=1.0);
        Duration::try_from_secs_f64(delay.as_secs_f64() * scale).map_or(delay, |d| d.min(delay))
    }
}

/// Immutable retry configuration for one kind of call.
///
/// Cloning is cheap: the predicate is reference counted.
pub struct RetryPolicy<E> {
    config: BackoffConfig,
    /// `None` retries every error
    is_retryable: Option<Predicate<E>>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            is_retryable: self.is_retryable.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<E> Default for RetryPolicy<E> {
    /// Default backoff parameters, retrying every error
    fn default() -> Self {
        Self {
            config: BackoffConfig::default(),
            is_retryable: None,
        }
    }
}

impl<E> RetryPolicy<E> {
    /// Start building a policy from the default backoff parameters
    pub fn builder() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::new()
    }

    /// Combine validated backoff parameters with a predicate
    pub fn from_config<P>(config: BackoffConfig, is_retryable: P) -> Result<Self, ConfigError>
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        config.validate()?;
        Ok(Self {
            config,
            is_retryable: Some(Arc::new(is_retryable)),
        })
    }

    /// The same backoff parameters with a different predicate
    pub fn with_predicate<P>(self, is_retryable: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            config: self.config,
            is_retryable: Some(Arc::new(is_retryable)),
        }
    }

    /// The validated backoff parameters
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Delay before the first retry
    pub fn initial_delay(&self) -> Duration {
        self.config.initial_delay
    }

    /// Ceiling on any single backoff sleep
    pub fn max_delay(&self) -> Duration {
        self.config.max_delay
    }

    /// Growth factor applied to the delay after each retry
    pub fn multiplier(&self) -> f64 {
        self.config.multiplier
    }

    /// Wall-clock budget for the whole call, measured from the first attempt
    pub fn total_timeout(&self) -> Duration {
        self.config.total_timeout
    }

    /// Optional cap on invocations
    pub fn max_attempts(&self) -> Option<u32> {
        self.config.max_attempts
    }

    /// Randomisation applied to each sleep
    pub fn jitter(&self) -> Jitter {
        self.config.jitter
    }

    /// Evaluate the predicate for one failure
    pub fn is_retryable(&self, error: &E) -> bool {
        self.is_retryable
            .as_ref()
            .map_or(true, |predicate| predicate(error))
    }

    /// Delay that follows `current`: `min(current * multiplier, max_delay)`
    pub fn next_delay(&self, current: Duration) -> Duration {
        let max = self.config.max_delay;
        let grown = current.as_secs_f64() * self.config.multiplier;
        if grown >= max.as_secs_f64() {
            max
        } else {
            Duration::from_secs_f64(grown).min(max)
        }
    }

    /// The un-jittered delay sequence, starting at the initial delay
    pub fn delays(&self) -> Backoff<'_, E> {
        Backoff {
            policy: self,
            next: self.config.initial_delay,
        }
    }
}

/// Infinite iterator over the geometric delay sequence of a policy
pub struct Backoff<'a, E> {
    policy: &'a RetryPolicy<E>,
    next: Duration,
}

impl<E> Iterator for Backoff<'_, E> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = self.policy.next_delay(current);
        Some(current)
    }
}

/// Builder for [`RetryPolicy`]
///
/// Without [`retry_if`](Self::retry_if) every error is treated as retryable.
pub struct RetryPolicyBuilder<E> {
    config: BackoffConfig,
    is_retryable: Option<Predicate<E>>,
}

impl<E> Default for RetryPolicyBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> RetryPolicyBuilder<E> {
    /// Builder seeded with the default backoff parameters
    pub fn new() -> Self {
        Self {
            config: BackoffConfig::default(),
            is_retryable: None,
        }
    }

    /// Start from an existing set of backoff parameters
    pub fn config(mut self, config: BackoffConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the delay before the first retry
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.config.initial_delay = delay;
        self
    }

    /// Set the ceiling on a single sleep
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    /// Set the delay growth factor
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.config.multiplier = multiplier;
        self
    }

    /// Set the total time budget
    pub fn total_timeout(mut self, timeout: Duration) -> Self {
        self.config.total_timeout = timeout;
        self
    }

    /// Cap the number of invocations
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = Some(attempts);
        self
    }

    /// Set the jitter mode
    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.config.jitter = jitter;
        self
    }

    /// Set the predicate deciding which errors are retried
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.is_retryable = Some(Arc::new(predicate));
        self
    }

    /// Validate and build the policy
    pub fn build(self) -> Result<RetryPolicy<E>, ConfigError> {
        self.config.validate()?;
        Ok(RetryPolicy {
            config: self.config,
            is_retryable: self.is_retryable,
        })
    }
}
