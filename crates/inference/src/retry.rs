//! Retry on "model loading" (HTTP 503) responses.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use talewright_config::InferenceConfig;
use talewright_core::{CancellationToken, HttpResponse, InferenceError};

pub const SERVICE_UNAVAILABLE: u16 = 503;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub fallback_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            fallback_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &InferenceConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            fallback_delay: Duration::from_millis(config.retry_fallback_ms),
        }
    }

    /// How long to wait before retrying `response`.
    ///
    /// Order: `Retry-After` (seconds or HTTP date), then the body's
    /// `estimated_time`, then the fallback.
    pub fn delay_for(&self, response: &HttpResponse, now: DateTime<Utc>) -> Duration {
        retry_after(response, now)
            .or_else(|| estimated_time(&response.body))
            .unwrap_or(self.fallback_delay)
    }
}

fn retry_after(response: &HttpResponse, now: DateTime<Utc>) -> Option<Duration> {
    let value = response.header("retry-after")?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

fn estimated_time(body: &[u8]) -> Option<Duration> {
    let document: serde_json::Value = serde_json::from_slice(body).ok()?;
    let seconds = document.get("estimated_time")?.as_f64()?;
    (seconds.is_finite() && seconds > 0.0).then(|| Duration::from_secs_f64(seconds))
}

/// Waits between attempts. Swapped out in tests to avoid real sleeps.
#[async_trait]
pub trait RetryDelay: Send + Sync {
    async fn wait(&self, delay: Duration, cancel: &CancellationToken) -> Result<(), InferenceError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelay;

#[async_trait]
impl RetryDelay for TokioDelay {
    async fn wait(&self, delay: Duration, cancel: &CancellationToken) -> Result<(), InferenceError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(InferenceError::Canceled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
