//! # genai-retry
//!
//! Bounded exponential-backoff retry for calls to generative AI APIs.
//!
//! A [`RetryPolicy`] fixes the backoff parameters (initial delay, delay
//! ceiling, growth multiplier, total time budget) and a predicate deciding
//! which errors are worth another attempt. The executors run an operation
//! until it succeeds, fails with a non-retryable error, runs out of budget, or
//! is cancelled, and report which of those happened through [`RetryError`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use genai_retry::{retry, ApiError, RetryPolicy, if_transient_error};
//! use std::time::Duration;
//!
//! # async fn generate(prompt: &str) -> Result<String, ApiError> { Ok(prompt.into()) }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let policy = RetryPolicy::builder()
//!         .initial_delay(Duration::from_secs(2))
//!         .max_delay(Duration::from_secs(64))
//!         .multiplier(2.0)
//!         .total_timeout(Duration::from_secs(600))
//!         .retry_if(if_transient_error)
//!         .build()?;
//!
//!     let text = retry(&policy, || generate("Write a haiku about backoff")).await?;
//!     println!("{}", text);
//!     Ok(())
//! }
//! ```

pub mod blocking;
pub mod config;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod observability;
pub mod policy;
pub mod state;
pub mod transient;

pub use blocking::{retry_blocking, retry_blocking_with_cancellation};
pub use config::BackoffConfig;
pub use error::{ConfigError, RetryError};
pub use executor::{from_fn, retry, FnOperation, Operation, Retry, RetryEvent};
pub use metrics::{CallOutcome, RetryMetrics, RetryMetricsSnapshot};
pub use observability::{init_tracing, LogFormat};
pub use policy::{Backoff, Jitter, Predicate, RetryPolicy, RetryPolicyBuilder};
pub use state::{AttemptOutcome, RetryState};
pub use transient::{if_transient_error, ApiError, ApiErrorKind};
pub use tokio_util::sync::CancellationToken;
