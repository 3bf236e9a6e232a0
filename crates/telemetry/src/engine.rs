//! In-memory metrics store, thread-safe and snapshot-able.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::metrics::{MetricsSink, RequestStatus};

/// Running totals for one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderStats {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    /// Failure counts keyed by error class.
    pub error_classes: BTreeMap<String, u64>,
    pub latency_samples: u64,
    pub total_latency_ms: u64,
    pub max_latency_ms: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl ProviderStats {
    pub fn average_latency_ms(&self) -> Option<f64> {
        (self.latency_samples > 0)
            .then(|| self.total_latency_ms as f64 / self.latency_samples as f64)
    }
}

/// Point-in-time copy of every provider's totals.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub started_at: DateTime<Utc>,
    pub taken_at: DateTime<Utc>,
    pub providers: BTreeMap<String, ProviderStats>,
}

impl MetricsSnapshot {
    pub fn provider(&self, name: &str) -> Option<&ProviderStats> {
        self.providers.get(name)
    }
}

/// Collects measurements in memory.
///
/// Thread-safe via `RwLock`; a poisoned lock is recovered rather than
/// propagated since counters stay meaningful after a panic elsewhere.
pub struct InMemoryMetrics {
    started_at: DateTime<Utc>,
    providers: RwLock<BTreeMap<String, ProviderStats>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            providers: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            started_at: self.started_at,
            taken_at: Utc::now(),
            providers: self.read().clone(),
        }
    }

    /// Reset all counters.
    pub fn clear(&self) {
        self.write().clear();
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, ProviderStats>> {
        self.providers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, ProviderStats>> {
        self.providers.write().unwrap_or_else(|e| e.into_inner())
    }

    fn update(&self, provider: &str, f: impl FnOnce(&mut ProviderStats)) {
        let mut providers = self.write();
        f(providers.entry(provider.to_string()).or_default());
    }
}

impl Default for InMemoryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record_request(&self, provider: &str, status: RequestStatus, error_class: Option<&str>) {
        self.update(provider, |stats| {
            stats.requests += 1;
            match status {
                RequestStatus::Success => stats.successes += 1,
                RequestStatus::Failure => stats.failures += 1,
            }
            if let Some(class) = error_class {
                *stats.error_classes.entry(class.to_string()).or_default() += 1;
            }
        });
    }

    fn record_latency(&self, provider: &str, latency: Duration) {
        let ms = latency.as_millis() as u64;
        self.update(provider, |stats| {
            stats.latency_samples += 1;
            stats.total_latency_ms += ms;
            stats.max_latency_ms = stats.max_latency_ms.max(ms);
        });
    }

    fn record_bytes_sent(&self, provider: &str, bytes: u64) {
        self.update(provider, |stats| stats.bytes_sent += bytes);
    }

    fn record_bytes_received(&self, provider: &str, bytes: u64) {
        self.update(provider, |stats| stats.bytes_received += bytes);
    }
}
