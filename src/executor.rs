//! Async retrying call executor
//!
//! Two ways in:
//!
//! - [`retry`] takes a policy and a closure producing a future, for one-off calls.
//! - [`Retry`] wraps an [`Operation`] and a policy into an object with a
//!   [`call`](Retry::call) method, with optional cancellation, metrics, and an
//!   observer invoked before every backoff sleep.

use crate::metrics::{CallOutcome, RetryMetrics};
use crate::state::{RetryState, Step};
use crate::{RetryError, RetryPolicy};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// A fallible operation that is safe to invoke repeatedly
pub trait Operation: Send {
    type Output;
    type Error;

    /// Run one attempt
    fn attempt(&mut self) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;
}

/// [`Operation`] backed by a closure returning a future
pub struct FnOperation<F> {
    f: F,
}

/// Adapt a closure into an [`Operation`]
pub fn from_fn<F>(f: F) -> FnOperation<F> {
    FnOperation { f }
}

impl<F, Fut, T, E> Operation for FnOperation<F>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send,
{
    type Output = T;
    type Error = E;

    fn attempt(&mut self) -> impl Future<Output = Result<T, E>> + Send {
        (self.f)()
    }
}

/// Passed to the retry observer just before the executor sleeps
#[derive(Debug)]
pub struct RetryEvent<'a, E> {
    /// The attempt that just failed, starting at 1
    pub attempt: u32,
    /// Sleep about to happen before the next attempt
    pub sleep: Duration,
    /// Time since the first attempt started
    pub elapsed: Duration,
    pub error: &'a E,
}

type RetryObserver<E> = Box<dyn FnMut(&RetryEvent<'_, E>) + Send>;

/// An operation paired with the policy that governs retrying it
pub struct Retry<O: Operation> {
    op: O,
    policy: RetryPolicy<O::Error>,
    cancel: Option<CancellationToken>,
    metrics: Option<RetryMetrics>,
    on_retry: Option<RetryObserver<O::Error>>,
}

impl<O: Operation> Retry<O> {
    /// Pair `op` with the policy that governs retrying it
    pub fn new(op: O, policy: RetryPolicy<O::Error>) -> Self {
        Self {
            op,
            policy,
            cancel: None,
            metrics: None,
            on_retry: None,
        }
    }

    /// Stop between attempts once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Record every call, attempt, and outcome into `metrics`
    pub fn with_metrics(mut self, metrics: RetryMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Observe every retry before its backoff sleep
    pub fn on_retry<H>(mut self, hook: H) -> Self
    where
        H: FnMut(&RetryEvent<'_, O::Error>) + Send + 'static,
    {
        self.on_retry = Some(Box::new(hook));
        self
    }

    /// The governing policy
    pub fn policy(&self) -> &RetryPolicy<O::Error> {
        &self.policy
    }

    /// The wrapped operation
    pub fn operation(&self) -> &O {
        &self.op
    }

    /// Take back the wrapped operation
    pub fn into_operation(self) -> O {
        self.op
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|token| token.is_cancelled())
    }
}

impl<O> Retry<O>
where
    O: Operation,
    O::Error: fmt::Display + Send,
{
    /// Run the operation until it succeeds, fails permanently, the budget runs
    /// out, or the call is cancelled
    #[instrument(
        name = "retry",
        skip_all,
        fields(
            initial_delay = ?self.policy.initial_delay(),
            total_timeout = ?self.policy.total_timeout(),
        )
    )]
    pub async fn call(&mut self) -> Result<O::Output, RetryError<O::Error>> {
        let start = Instant::now();
        let mut state = RetryState::new(self.policy.initial_delay());
        if let Some(metrics) = &self.metrics {
            metrics.record_call();
        }

        let result = loop {
            if self.is_cancelled() {
                break Err(state.cancelled());
            }

            let attempt = state.begin_attempt();
            if let Some(metrics) = &self.metrics {
                metrics.record_attempt();
            }
            debug!(attempt, "invoking operation");

            let error = match self.op.attempt().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            attempts = attempt,
                            elapsed = ?start.elapsed(),
                            "succeeded after retry"
                        );
                    }
                    break Ok(value);
                }
                Err(error) => error,
            };

            let delay = match state.on_failure(error, &self.policy, start.elapsed()) {
                Step::Stop(err) => break Err(err),
                Step::Retry(delay) => delay,
            };

            if let Some(error) = state.last_error() {
                warn!(attempt, ?delay, "attempt failed, retrying: {}", error);
                if let Some(hook) = self.on_retry.as_mut() {
                    hook(&RetryEvent {
                        attempt,
                        sleep: delay,
                        elapsed: state.elapsed(),
                        error,
                    });
                }
            }
            if let Some(metrics) = &self.metrics {
                metrics.record_retry(delay);
            }

            if self.is_cancelled() {
                break Err(state.cancelled());
            }
            let cancelled = match &self.cancel {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => true,
                    _ = sleep(delay) => false,
                },
                None => {
                    sleep(delay).await;
                    false
                }
            };
            if cancelled {
                break Err(state.cancelled());
            }
        };

        if let Err(err) = &result {
            log_failure(err);
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_outcome(call_outcome(&result));
        }
        result
    }
}

/// Retry `op` under `policy`
///
/// The closure is invoked once per attempt; its future must be safe to run
/// again after a failure.
pub async fn retry<F, Fut, T, E>(policy: &RetryPolicy<E>, op: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send,
    E: fmt::Display + Send,
{
    Retry::new(from_fn(op), policy.clone()).call().await
}

pub(crate) fn log_failure<E: fmt::Display>(err: &RetryError<E>) {
    match err {
        RetryError::NonRetryable { error, attempts } => {
            debug!(attempts, "non-retryable error: {}", error)
        }
        RetryError::BudgetExhausted {
            last_error,
            attempts,
            elapsed,
        } => warn!(attempts, ?elapsed, "retry budget exhausted: {}", last_error),
        RetryError::Cancelled { attempts, .. } => debug!(attempts, "retry cancelled"),
    }
}

pub(crate) fn call_outcome<T, E>(result: &Result<T, RetryError<E>>) -> CallOutcome {
    match result {
        Ok(_) => CallOutcome::Succeeded,
        Err(RetryError::NonRetryable { .. }) => CallOutcome::NonRetryable,
        Err(RetryError::BudgetExhausted { .. }) => CallOutcome::Exhausted,
        Err(RetryError::Cancelled { .. }) => CallOutcome::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        Transient,
        Permanent,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                TestError::Transient => write!(f, "transient failure"),
                TestError::Permanent => write!(f, "permanent failure"),
            }
        }
    }

    fn policy() -> RetryPolicy<TestError> {
        RetryPolicy::builder()
            .initial_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(8))
            .multiplier(2.0)
            .total_timeout(Duration::from_secs(600))
            .retry_if(|e: &TestError| *e == TestError::Transient)
            .build()
            .unwrap()
    }

    fn assert_elapsed(start: Instant, expected: Duration) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(50),
            "elapsed {elapsed:?}, expected {expected:?}"
        );
    }

    /// Fails transiently until `succeed_on` attempts have been made
    struct Flaky {
        calls: u32,
        succeed_on: u32,
    }

    impl Operation for Flaky {
        type Output = u32;
        type Error = TestError;

        async fn attempt(&mut self) -> Result<u32, TestError> {
            self.calls += 1;
            if self.calls >= self.succeed_on {
                Ok(self.calls)
            } else {
                Err(TestError::Transient)
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_succeeds_on_third_attempt() {
        let mut retry = Retry::new(
            Flaky {
                calls: 0,
                succeed_on: 3,
            },
            policy(),
        );

        let start = Instant::now();
        assert_eq!(retry.call().await.unwrap(), 3);
        // 1s + 2s of backoff
        assert_elapsed(start, Duration::from_secs(3));
        assert_eq!(retry.into_operation().calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_sees_each_sleep() {
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let seen = sleeps.clone();

        let mut retry = Retry::new(
            Flaky {
                calls: 0,
                succeed_on: 5,
            },
            policy(),
        )
        .on_retry(move |event| {
            assert_eq!(*event.error, TestError::Transient);
            seen.lock().unwrap().push((event.attempt, event.sleep.as_secs()));
        });

        retry.call().await.unwrap();
        assert_eq!(
            *sleeps.lock().unwrap(),
            vec![(1, 1), (2, 2), (3, 4), (4, 8)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_track_outcomes() {
        let metrics = RetryMetrics::new();

        let mut ok = Retry::new(
            Flaky {
                calls: 0,
                succeed_on: 2,
            },
            policy(),
        )
        .with_metrics(metrics.clone());
        ok.call().await.unwrap();

        let result = retry(&policy(), || async { Err::<(), _>(TestError::Permanent) }).await;
        assert!(matches!(
            result,
            Err(RetryError::NonRetryable {
                error: TestError::Permanent,
                attempts: 1
            })
        ));

        let stats = metrics.snapshot();
        assert_eq!(stats.calls_total, 1);
        assert_eq!(stats.attempts_total, 2);
        assert_eq!(stats.retries_total, 1);
        assert_eq!(stats.backoff_ms_total, 1_000);
        assert_eq!(stats.succeeded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closure_counter_owned_by_test() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let value = retry(&policy(), move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 2 {
                Err(TestError::Transient)
            } else {
                Ok("generated text")
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "generated text");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_changes_answer_between_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let start = Instant::now();
        let err = retry(&policy(), move || async move {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => Err::<(), _>(TestError::Transient),
                _ => Err(TestError::Permanent),
            }
        })
        .await
        .unwrap_err();

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(err.attempts(), 3);
        assert!(matches!(err, RetryError::NonRetryable { error: TestError::Permanent, .. }));
        // 1s + 2s of backoff, none after the permanent failure
        assert_elapsed(start, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_ceiling_exhausts_without_panicking() {
        let policy: RetryPolicy<TestError> = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::MAX)
            .multiplier(1e300)
            .total_timeout(Duration::MAX)
            .build()
            .unwrap();
        let mut retry = Retry::new(
            Flaky {
                calls: 0,
                succeed_on: 3,
            },
            policy,
        );

        let err = retry.call().await.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_attempt() {
        let token = CancellationToken::new();
        token.cancel();

        let mut retry = Retry::new(
            Flaky {
                calls: 0,
                succeed_on: 1,
            },
            policy(),
        )
        .with_cancellation(token);

        let err = retry.call().await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.attempts(), 0);
        assert_eq!(retry.operation().calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_keeps_last_error() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(1_500)).await;
            canceller.cancel();
        });

        let mut retry = Retry::new(
            Flaky {
                calls: 0,
                succeed_on: u32::MAX,
            },
            policy(),
        )
        .with_cancellation(token);

        let start = Instant::now();
        let err = retry.call().await.unwrap_err();
        match err {
            RetryError::Cancelled {
                last_error,
                attempts,
            } => {
                assert_eq!(last_error, Some(TestError::Transient));
                // attempt 1, sleep 1s, attempt 2, cancelled 0.5s into the 2s sleep
                assert_eq!(attempts, 2);
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert_elapsed(start, Duration::from_millis(1_500));
    }
}
