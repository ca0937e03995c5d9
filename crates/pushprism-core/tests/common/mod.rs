//! Fixture loader and helpers shared by the aggregation tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use parking_lot::Mutex;

use pushprism_core::{
    AggregateOptions, AggregateStore, Format, GaugeBehavior, IdentityLabels, IgnoredLabels,
    MetricType, NoopSink, ObservabilitySink,
};

pub fn load(name: &str) -> String {
    fs::read_to_string(format!("tests/vectors/{name}")).unwrap()
}

pub fn job() -> IdentityLabels {
    IdentityLabels::job("test")
}

pub fn options(ignored: &[&str], gauge: GaugeBehavior) -> AggregateOptions {
    AggregateOptions {
        ignored_labels: IgnoredLabels::new(ignored.iter().copied()),
        gauge_behavior: gauge,
    }
}

pub fn store(ignored: &[&str], gauge: GaugeBehavior) -> AggregateStore {
    AggregateStore::new(options(ignored, gauge), Arc::new(NoopSink))
}

pub fn render_text(store: &AggregateStore) -> String {
    let mut buf = Vec::new();
    store.render(&mut buf, Format::Text).unwrap();
    String::from_utf8(buf).unwrap()
}

/// Sink that keeps the last reported values.
#[derive(Default)]
pub struct RecordingSink {
    pub total_families: Mutex<Option<usize>>,
    pub family_metrics: Mutex<BTreeMap<String, usize>>,
    pub type_families: Mutex<BTreeMap<MetricType, usize>>,
    pub pushes: Mutex<BTreeMap<String, u64>>,
}

impl ObservabilitySink for RecordingSink {
    fn set_total_families(&self, count: usize) {
        *self.total_families.lock() = Some(count);
    }
    fn set_family_metrics(&self, family: &str, count: usize) {
        self.family_metrics.lock().insert(family.to_string(), count);
    }
    fn reset_family_metrics(&self) {
        self.family_metrics.lock().clear();
    }
    fn set_type_families(&self, counts: &BTreeMap<MetricType, usize>) {
        *self.type_families.lock() = counts.clone();
    }
    fn record_push(&self, identity: &IdentityLabels) {
        *self.pushes.lock().entry(identity.key()).or_insert(0) += 1;
    }
}
