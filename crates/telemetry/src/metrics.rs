//! The metrics seam used by providers.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome of a single provider request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Success,
    Failure,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// Receives per-call measurements.
///
/// Implementations must be cheap and must never fail the caller.
pub trait MetricsSink: Send + Sync {
    fn record_request(&self, provider: &str, status: RequestStatus, error_class: Option<&str>);

    fn record_latency(&self, provider: &str, latency: Duration);

    fn record_bytes_sent(&self, provider: &str, bytes: u64);

    fn record_bytes_received(&self, provider: &str, bytes: u64);
}

/// Drops every measurement.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_request(&self, _: &str, _: RequestStatus, _: Option<&str>) {}
    fn record_latency(&self, _: &str, _: Duration) {}
    fn record_bytes_sent(&self, _: &str, _: u64) {}
    fn record_bytes_received(&self, _: &str, _: u64) {}
}

/// Emits each measurement as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn record_request(&self, provider: &str, status: RequestStatus, error_class: Option<&str>) {
        tracing::info!(
            provider,
            status = %status,
            error_class = error_class.unwrap_or("none"),
            "provider request"
        );
    }

    fn record_latency(&self, provider: &str, latency: Duration) {
        tracing::info!(
            provider,
            latency_ms = latency.as_millis() as u64,
            "provider latency"
        );
    }

    fn record_bytes_sent(&self, provider: &str, bytes: u64) {
        tracing::info!(provider, bytes, "provider bytes sent");
    }

    fn record_bytes_received(&self, provider: &str, bytes: u64) {
        tracing::info!(provider, bytes, "provider bytes received");
    }
}
