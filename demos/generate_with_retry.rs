//! Retrying a flaky text-generation call with exponential backoff
//!
//! The "model" here is simulated: it reports itself overloaded (HTTP 503) for
//! the first two requests, then answers. Backoff parameters can be overridden
//! through `GEMINI_RETRY_*` environment variables.

use genai_retry::{
    if_transient_error, init_tracing, ApiError, BackoffConfig, LogFormat, Operation, Retry,
    RetryError, RetryMetrics, RetryPolicy,
};
use std::time::Duration;

struct OverloadedModel {
    requests: u32,
    prompt: String,
}

impl Operation for OverloadedModel {
    type Output = String;
    type Error = ApiError;

    async fn attempt(&mut self) -> Result<String, ApiError> {
        self.requests += 1;
        if self.requests <= 2 {
            return Err(ApiError::from_status(
                503,
                r#"{"error": {"code": 503, "message": "The model is overloaded. Please try again later.", "status": "UNAVAILABLE"}}"#,
            ));
        }
        Ok(format!("A short story about {}...", self.prompt))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(LogFormat::Pretty);

    // Short delays so the demo finishes quickly
    let config = match BackoffConfig::from_env("GEMINI_RETRY")? {
        config if config != BackoffConfig::default() => config,
        _ => BackoffConfig {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
            total_timeout: Duration::from_secs(10),
            ..Default::default()
        },
    };
    println!("--- Backoff configuration ---");
    println!("{}", serde_json::to_string_pretty(&config)?);

    let policy = RetryPolicy::from_config(config, if_transient_error)?;
    let metrics = RetryMetrics::new();

    println!("\n--- Transient failures, then success ---");
    let model = OverloadedModel {
        requests: 0,
        prompt: "a magic backpack".to_string(),
    };
    let mut call = Retry::new(model, policy.clone())
        .with_metrics(metrics.clone())
        .on_retry(|event| {
            println!(
                "attempt {} failed ({}), retrying in {:?}",
                event.attempt, event.error, event.sleep
            );
        });
    println!("{}", call.call().await?);

    println!("\n--- Permanent failure is not retried ---");
    let result = genai_retry::retry(&policy, || async {
        Err::<String, _>(ApiError::from_status(
            400,
            r#"{"error": {"message": "API key not valid. Please pass a valid API key."}}"#,
        ))
    })
    .await;
    match result {
        Err(RetryError::NonRetryable { error, attempts }) => {
            println!("gave up after {} attempt(s): {}", attempts, error)
        }
        other => println!("unexpected: {:?}", other),
    }

    println!("\n--- Metrics ---");
    println!("{}", metrics.snapshot().summary());

    Ok(())
}
