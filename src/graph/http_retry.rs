//! Shared HTTP retry wrapper with 429/5xx handling and Retry-After support.
//!
//! Provides `send_with_retry()` which drives a request-builder closure so
//! every attempt is rebuilt fresh (a retried request must pick up the
//! current bearer token, not the one captured when the first attempt was
//! built). Adds exponential backoff with jitter and Retry-After parsing;
//! non-retryable status codes pass straight through.

use reqwest::{RequestBuilder, Response};
use std::time::Duration;

/// Configuration for HTTP retry behavior
#[derive(Debug, Clone)]
pub struct HttpRetryConfig {
    /// Maximum number of retry attempts (default: 3)
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff (default: 1000)
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds (default: 30000)
    pub max_delay_ms: u64,
    /// Backoff multiplier (default: 2.0)
    pub backoff_multiplier: f64,
}

impl Default for HttpRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Determine if a status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Parse Retry-After header value. Numeric seconds only; HTTP-date values
/// cover too few real responses to be worth a date parser here.
fn parse_retry_after(response: &Response) -> Option<Duration> {
    let value = response.headers().get("retry-after")?.to_str().ok()?;
    let secs = value.parse::<u64>().ok()?;
    Some(Duration::from_secs(secs.min(300))) // Cap at 5 minutes
}

/// Calculate delay for a given retry attempt with jitter
fn calculate_delay(attempt: u32, config: &HttpRetryConfig) -> Duration {
    let base = config.base_delay_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_delay_ms as f64);
    // 10-30% jitter to prevent thundering herd
    let jitter = capped * (0.1 + rand::random::<f64>() * 0.2);
    Duration::from_millis((capped + jitter) as u64)
}

/// Send an HTTP request with automatic retry on 429/5xx.
///
/// `build` is invoked once per attempt and must return a fully-configured
/// builder, auth header included.
pub async fn send_with_retry<F>(
    build: F,
    config: &HttpRetryConfig,
) -> Result<Response, reqwest::Error>
where
    F: Fn() -> RequestBuilder,
{
    let mut response = build().send().await?;

    for attempt in 0..config.max_retries {
        if !is_retryable_status(response.status().as_u16()) {
            return Ok(response);
        }

        // Prefer Retry-After, fall back to exponential backoff
        let delay = parse_retry_after(&response).unwrap_or_else(|| calculate_delay(attempt, config));

        tracing::debug!(
            "HTTP {} returned {}. Retry {}/{} after {:?}",
            response.url(),
            response.status(),
            attempt + 1,
            config.max_retries,
            delay
        );

        tokio::time::sleep(delay).await;
        response = build().send().await?;
    }

    Ok(response)
}
