//! Per-call retry bookkeeping
//!
//! A [`RetryState`] lives for exactly one logical call. The executors feed it
//! each failure together with the elapsed time and it answers whether to sleep
//! and try again or to stop with a terminal [`RetryError`].

use crate::{RetryError, RetryPolicy};
use std::time::Duration;

/// Result of a single invocation of the wrapped operation
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome<T, E> {
    Success(T),
    Failure(E),
}

impl<T, E> AttemptOutcome<T, E> {
    /// Whether the attempt produced a value
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success(_))
    }

    /// Convert back into a plain `Result`
    pub fn into_result(self) -> Result<T, E> {
        match self {
            AttemptOutcome::Success(value) => Ok(value),
            AttemptOutcome::Failure(err) => Err(err),
        }
    }
}

impl<T, E> From<Result<T, E>> for AttemptOutcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => AttemptOutcome::Success(value),
            Err(err) => AttemptOutcome::Failure(err),
        }
    }
}

/// What the executor should do after a failed attempt
#[derive(Debug)]
pub(crate) enum Step<E> {
    /// Sleep for the given duration, then invoke the operation again
    Retry(Duration),
    Stop(RetryError<E>),
}

/// Transient state of one in-flight call
#[derive(Debug)]
pub struct RetryState<E> {
    attempts: u32,
    delay: Duration,
    elapsed: Duration,
    last_error: Option<E>,
}

impl<E> RetryState<E> {
    /// Fresh state for a call whose first backoff is `initial_delay`
    pub fn new(initial_delay: Duration) -> Self {
        Self {
            attempts: 0,
            delay: initial_delay,
            elapsed: Duration::ZERO,
            last_error: None,
        }
    }

    /// Invocations made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Un-jittered delay that will precede the next retry
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Elapsed time recorded at the most recent failure
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Error of the most recent retried failure
    pub fn last_error(&self) -> Option<&E> {
        self.last_error.as_ref()
    }

    pub(crate) fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Build the cancellation outcome, handing back the last error seen
    pub(crate) fn cancelled(&mut self) -> RetryError<E> {
        RetryError::Cancelled {
            last_error: self.last_error.take(),
            attempts: self.attempts,
        }
    }

    /// Decide what follows a failure observed `elapsed` after the first attempt
    pub(crate) fn on_failure(
        &mut self,
        error: E,
        policy: &RetryPolicy<E>,
        elapsed: Duration,
    ) -> Step<E> {
        self.elapsed = elapsed;

        if !policy.is_retryable(&error) {
            self.last_error = None;
            return Step::Stop(RetryError::NonRetryable {
                error,
                attempts: self.attempts,
            });
        }

        let budget = policy.total_timeout();
        let capped = policy
            .max_attempts()
            .is_some_and(|max| self.attempts >= max);
        if capped || elapsed >= budget {
            return Step::Stop(self.exhausted(error));
        }

        let sleep = policy.jitter().apply(self.delay);
        if elapsed.checked_add(sleep).map_or(true, |end| end >= budget) {
            // The next attempt could not start inside the budget.
            return Step::Stop(self.exhausted(error));
        }

        self.delay = policy.next_delay(self.delay);
        self.last_error = Some(error);
        Step::Retry(sleep)
    }

    fn exhausted(&mut self, error: E) -> RetryError<E> {
        self.last_error = None;
        RetryError::BudgetExhausted {
            last_error: error,
            attempts: self.attempts,
            elapsed: self.elapsed,
        }
    }
}
