//! Self-observability side channel.
//!
//! The store and scheduler report counts through an injected sink; nothing
//! here sits on the correctness path and there is no process-global registry.

use std::collections::BTreeMap;

use crate::labels::IdentityLabels;
use crate::model::MetricType;

/// Receiver for aggregation bookkeeping.
pub trait ObservabilitySink: Send + Sync {
    /// Number of families held by the reporting store.
    fn set_total_families(&self, count: usize);
    /// Number of series in one family.
    fn set_family_metrics(&self, family: &str, count: usize);
    /// Drop all per-family series counts before a full refresh.
    fn reset_family_metrics(&self);
    /// Family count per declared type; replaces the previous breakdown.
    fn set_type_families(&self, counts: &BTreeMap<MetricType, usize>);
    /// One accepted push for this identity.
    fn record_push(&self, identity: &IdentityLabels);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ObservabilitySink for NoopSink {
    fn set_total_families(&self, _count: usize) {}
    fn set_family_metrics(&self, _family: &str, _count: usize) {}
    fn reset_family_metrics(&self) {}
    fn set_type_families(&self, _counts: &BTreeMap<MetricType, usize>) {}
    fn record_push(&self, _identity: &IdentityLabels) {}
}
