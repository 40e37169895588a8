//! Blocking retry for callers outside an async runtime
//!
//! Backoff sleeps park only the calling thread. Cancellation is observed
//! before each attempt and before each sleep, not during one.

use crate::executor::log_failure;
use crate::state::{RetryState, Step};
use crate::{RetryError, RetryPolicy};
use std::fmt;
use std::thread;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry a synchronous operation under `policy`
pub fn retry_blocking<F, T, E>(policy: &RetryPolicy<E>, op: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
    E: fmt::Display,
{
    run(policy, None, op)
}

/// Like [`retry_blocking`], stopping between attempts once `token` is cancelled
pub fn retry_blocking_with_cancellation<F, T, E>(
    policy: &RetryPolicy<E>,
    token: &CancellationToken,
    op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
    E: fmt::Display,
{
    run(policy, Some(token), op)
}

fn run<F, T, E>(
    policy: &RetryPolicy<E>,
    token: Option<&CancellationToken>,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
    E: fmt::Display,
{
    let cancelled = || token.is_some_and(|t| t.is_cancelled());
    let start = Instant::now();
    let mut state = RetryState::new(policy.initial_delay());

    let result = loop {
        if cancelled() {
            break Err(state.cancelled());
        }

        let attempt = state.begin_attempt();
        debug!(attempt, "invoking operation");
        let error = match op() {
            Ok(value) => break Ok(value),
            Err(error) => error,
        };

        let delay = match state.on_failure(error, policy, start.elapsed()) {
            Step::Stop(err) => break Err(err),
            Step::Retry(delay) => delay,
        };
        if let Some(error) = state.last_error() {
            warn!(attempt, ?delay, "attempt failed, retrying: {}", error);
        }

        if cancelled() {
            break Err(state.cancelled());
        }
        thread::sleep(delay);
    };

    if let Err(err) = &result {
        log_failure(err);
    }
    result
}
