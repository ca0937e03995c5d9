//! Gateway self-observability.
//!
//! `AggregatorMetrics` is the core's `ObservabilitySink`; it is rendered by
//! the lifecycle listener's `/metrics` handler.

pub mod metrics;

pub use metrics::AggregatorMetrics;
