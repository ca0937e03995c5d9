//! Self-metrics registry for the gateway.
//!
//! Counter and gauge vectors with dynamic labels backed by `DashMap`. Labels
//! are flattened into sorted key vectors and series render in key order, so
//! the output is deterministic.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use pushprism_core::{IdentityLabels, MetricType, ObservabilitySink};

type LabelKey = Vec<(String, String)>;

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn label_key(labels: &[(&str, &str)]) -> LabelKey {
    let mut key: LabelKey = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

fn write_series(out: &mut String, name: &str, key: &LabelKey, val: impl std::fmt::Display) {
    if key.is_empty() {
        let _ = writeln!(out, "{name} {val}");
        return;
    }
    let label_str = key
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",");
    let _ = writeln!(out, "{name}{{{label_str}}} {val}");
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<LabelKey, AtomicU64>,
}

impl CounterVec {
    /// Increment by 1.
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        let counter = self.map.entry(label_key(labels)).or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, help: &str, out: &mut String) {
        let _ = writeln!(out, "# HELP {name} {help}");
        let _ = writeln!(out, "# TYPE {name} counter");
        let mut rows: Vec<(LabelKey, u64)> = self
            .map
            .iter()
            .map(|r| (r.key().clone(), r.value().load(Ordering::Relaxed)))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, val) in &rows {
            write_series(out, name, key, val);
        }
    }
}

#[derive(Default)]
pub struct GaugeVec {
    map: DashMap<LabelKey, AtomicI64>,
}

impl GaugeVec {
    pub fn set(&self, labels: &[(&str, &str)], v: i64) {
        let gauge = self.map.entry(label_key(labels)).or_insert_with(|| AtomicI64::new(0));
        gauge.store(v, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> Option<i64> {
        self.map.get(&label_key(labels)).map(|g| g.load(Ordering::Relaxed))
    }

    /// Drop every series.
    pub fn reset(&self) {
        self.map.clear();
    }

    fn render(&self, name: &str, help: &str, out: &mut String) {
        let _ = writeln!(out, "# HELP {name} {help}");
        let _ = writeln!(out, "# TYPE {name} gauge");
        let mut rows: Vec<(LabelKey, i64)> = self
            .map
            .iter()
            .map(|r| (r.key().clone(), r.value().load(Ordering::Relaxed)))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, val) in &rows {
            write_series(out, name, key, val);
        }
    }
}

/// Aggregator bookkeeping, fed by the core through [`ObservabilitySink`].
#[derive(Default)]
pub struct AggregatorMetrics {
    pub families_total: GaugeVec,
    pub family_metrics: GaugeVec,
    pub families_by_type: GaugeVec,
    pub pushes: CounterVec,
    pub ingest_errors: CounterVec,
}

fn to_gauge(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

impl AggregatorMetrics {
    /// Count one rejected push by error kind.
    pub fn record_ingest_error(&self, kind: &str) {
        self.ingest_errors.inc(&[("kind", kind)]);
    }

    /// Render everything in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.families_total.render(
            "pushprism_families_total",
            "Number of metric families held by the aggregator.",
            &mut out,
        );
        self.family_metrics.render(
            "pushprism_family_metrics",
            "Number of series per metric family.",
            &mut out,
        );
        self.families_by_type.render(
            "pushprism_families_by_type",
            "Number of metric families per type.",
            &mut out,
        );
        self.pushes.render(
            "pushprism_pushes_total",
            "Accepted pushes per identity.",
            &mut out,
        );
        self.ingest_errors.render(
            "pushprism_ingest_errors_total",
            "Rejected pushes per error kind.",
            &mut out,
        );
        out
    }
}

impl ObservabilitySink for AggregatorMetrics {
    fn set_total_families(&self, count: usize) {
        self.families_total.set(&[], to_gauge(count));
    }

    fn set_family_metrics(&self, family: &str, count: usize) {
        self.family_metrics.set(&[("family", family)], to_gauge(count));
    }

    fn reset_family_metrics(&self) {
        self.family_metrics.reset();
    }

    fn set_type_families(&self, counts: &BTreeMap<MetricType, usize>) {
        self.families_by_type.reset();
        for (ty, count) in counts {
            self.families_by_type.set(&[("type", ty.as_str())], to_gauge(*count));
        }
    }

    fn record_push(&self, identity: &IdentityLabels) {
        let key = identity.key();
        self.pushes.inc(&[("identity", key.as_str())]);
    }
}
