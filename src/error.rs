//! Error types for the genai-retry library

use std::time::Duration;
use thiserror::Error;

/// Terminal failure of a retried call.
///
/// Every call that does not succeed ends in exactly one of these variants.
/// `NonRetryable` hands back the operation's error untouched, while
/// `BudgetExhausted` and `Cancelled` carry enough context to log or alert on
/// separately from an immediate rejection.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The predicate classified the error as permanent; no further retry was made
    #[error("{error}")]
    NonRetryable {
        #[source]
        error: E,
        attempts: u32,
    },
    /// The time budget (or attempt cap) ran out before a further attempt could start
    #[error("retry budget exhausted after {attempts} attempt(s) in {elapsed:?}: {last_error}")]
    BudgetExhausted {
        #[source]
        last_error: E,
        attempts: u32,
        elapsed: Duration,
    },
    /// The caller cancelled the call between attempts
    #[error("retry cancelled after {attempts} attempt(s)")]
    Cancelled {
        #[source]
        last_error: Option<E>,
        attempts: u32,
    },
}

impl<E> RetryError<E> {
    /// Number of times the operation was invoked
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::NonRetryable { attempts, .. } => *attempts,
            RetryError::BudgetExhausted { attempts, .. } => *attempts,
            RetryError::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// The most recent error returned by the operation, if any attempt ran
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::NonRetryable { error, .. } => Some(error),
            RetryError::BudgetExhausted { last_error, .. } => Some(last_error),
            RetryError::Cancelled { last_error, .. } => last_error.as_ref(),
        }
    }

    /// Consume the failure, returning the operation's last error
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::NonRetryable { error, .. } => Some(error),
            RetryError::BudgetExhausted { last_error, .. } => Some(last_error),
            RetryError::Cancelled { last_error, .. } => last_error,
        }
    }

    /// Whether the time budget or attempt cap ran out
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::BudgetExhausted { .. })
    }

    /// Whether the caller cancelled the call
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }
}

/// Invalid retry configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("initial delay must be greater than zero")]
    ZeroInitialDelay,
    #[error("max delay {max:?} is below initial delay {initial:?}")]
    MaxDelayBelowInitial { initial: Duration, max: Duration },
    #[error("multiplier must be a finite number greater than 1, got {0}")]
    InvalidMultiplier(f64),
    #[error("total timeout must be greater than zero")]
    ZeroTotalTimeout,
    #[error("max attempts must be at least 1")]
    ZeroMaxAttempts,
    #[error("jitter ratio must be within [0, 1], got {0}")]
    InvalidJitter(f64),
    #[error("invalid value {value:?} for environment variable {var}")]
    Environment { var: String, value: String },
    #[error("failed to parse retry configuration: {0}")]
    Json(#[from] serde_json::Error),
}
