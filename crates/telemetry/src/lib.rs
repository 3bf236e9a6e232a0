//! Provider call metrics for Talewright.
//!
//! Streaming and inference providers report every call through a
//! [`MetricsSink`]: one request record with its status and error class,
//! one latency sample, and the bytes sent and received. The sink is a
//! seam; production wires [`TracingMetrics`] or [`InMemoryMetrics`],
//! tests read [`InMemoryMetrics::snapshot`].

pub mod engine;
pub mod metrics;

pub use engine::{InMemoryMetrics, MetricsSnapshot, ProviderStats};
pub use metrics::{MetricsSink, NoopMetrics, RequestStatus, TracingMetrics};
