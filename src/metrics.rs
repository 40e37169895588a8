//! Counters for retried calls

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Lock-free retry counters, shared by every clone
#[derive(Debug, Clone, Default)]
pub struct RetryMetrics {
    pub calls_total: Arc<AtomicU64>,
    pub attempts_total: Arc<AtomicU64>,
    pub retries_total: Arc<AtomicU64>,
    pub backoff_ms_total: Arc<AtomicU64>,
    pub succeeded: Arc<AtomicU64>,
    pub non_retryable: Arc<AtomicU64>,
    pub exhausted: Arc<AtomicU64>,
    pub cancelled: Arc<AtomicU64>,
}

/// How a retried call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Succeeded,
    NonRetryable,
    Exhausted,
    Cancelled,
}

impl RetryMetrics {
    /// Fresh counters, all zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of a logical call
    pub fn record_call(&self) {
        self.calls_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one invocation of the operation
    pub fn record_attempt(&self) {
        self.attempts_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a retry and the sleep that preceded it
    pub fn record_retry(&self, sleep: Duration) {
        self.retries_total.fetch_add(1, Ordering::Relaxed);
        let ms = u64::try_from(sleep.as_millis()).unwrap_or(u64::MAX);
        self.backoff_ms_total.fetch_add(ms, Ordering::Relaxed);
    }

    /// Record how a call ended
    pub fn record_outcome(&self, outcome: CallOutcome) {
        let counter = match outcome {
            CallOutcome::Succeeded => &self.succeeded,
            CallOutcome::NonRetryable => &self.non_retryable,
            CallOutcome::Exhausted => &self.exhausted,
            CallOutcome::Cancelled => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> RetryMetricsSnapshot {
        let calls = self.calls_total.load(Ordering::Relaxed);
        let attempts = self.attempts_total.load(Ordering::Relaxed);
        let succeeded = self.succeeded.load(Ordering::Relaxed);

        RetryMetricsSnapshot {
            calls_total: calls,
            attempts_total: attempts,
            retries_total: self.retries_total.load(Ordering::Relaxed),
            backoff_ms_total: self.backoff_ms_total.load(Ordering::Relaxed),
            succeeded,
            non_retryable: self.non_retryable.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            success_rate: if calls > 0 {
                (succeeded as f64 / calls as f64) * 100.0
            } else {
                0.0
            },
            average_attempts: if calls > 0 {
                attempts as f64 / calls as f64
            } else {
                0.0
            },
        }
    }

    /// Reset all metrics to zero
    pub fn reset(&self) {
        for counter in [
            &self.calls_total,
            &self.attempts_total,
            &self.retries_total,
            &self.backoff_ms_total,
            &self.succeeded,
            &self.non_retryable,
            &self.exhausted,
            &self.cancelled,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// A snapshot of metrics at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryMetricsSnapshot {
    pub calls_total: u64,
    pub attempts_total: u64,
    pub retries_total: u64,
    pub backoff_ms_total: u64,
    pub succeeded: u64,
    pub non_retryable: u64,
    pub exhausted: u64,
    pub cancelled: u64,
    pub success_rate: f64,
    pub average_attempts: f64,
}

impl RetryMetricsSnapshot {
    /// Get a human-readable summary of the metrics
    pub fn summary(&self) -> String {
        format!(
            "Calls: {} (Success: {:.1}%), Attempts: {} (avg {:.2}), Retries: {}, Backoff: {}ms, Exhausted: {}, Non-retryable: {}, Cancelled: {}",
            self.calls_total,
            self.success_rate,
            self.attempts_total,
            self.average_attempts,
            self.retries_total,
            self.backoff_ms_total,
            self.exhausted,
            self.non_retryable,
            self.cancelled
        )
    }
}
