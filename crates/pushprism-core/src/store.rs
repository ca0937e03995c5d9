//! Aggregate store: concurrency-safe directory of metric families.
//!
//! Locking:
//! - the directory lock guards map membership only;
//! - each family carries its own lock, so merges into different families run
//!   concurrently and merges into one family serialize;
//! - a merge keeps a shared directory guard while it holds the family lock,
//!   so a swap (exclusive directory guard) never copies or drains a family
//!   halfway through a merge.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::labels::{IdentityLabels, IgnoredLabels};
use crate::merge::{self, GaugeBehavior};
use crate::model::MetricFamily;
use crate::obs::ObservabilitySink;
use crate::protocol::encode::{encode_family, Format};
use crate::protocol::text;

/// Shared handle to one family and its lock.
pub type FamilyHandle = Arc<RwLock<MetricFamily>>;

pub(crate) type Directory = RwLock<HashMap<String, FamilyHandle>>;

/// Merge options shared by both sides of the double buffer.
#[derive(Debug, Clone, Default)]
pub struct AggregateOptions {
    pub ignored_labels: IgnoredLabels,
    pub gauge_behavior: GaugeBehavior,
}

pub struct AggregateStore {
    families: Directory,
    options: AggregateOptions,
    sink: Arc<dyn ObservabilitySink>,
}

impl AggregateStore {
    pub fn new(options: AggregateOptions, sink: Arc<dyn ObservabilitySink>) -> Self {
        Self {
            families: RwLock::new(HashMap::new()),
            options,
            sink,
        }
    }

    pub fn options(&self) -> &AggregateOptions {
        &self.options
    }

    pub(crate) fn directory(&self) -> &Directory {
        &self.families
    }

    /// Number of families.
    pub fn len(&self) -> usize {
        self.families.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.read().is_empty()
    }

    /// Sorted family names.
    pub fn family_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.families.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn family(&self, name: &str) -> Option<FamilyHandle> {
        self.families.read().get(name).map(Arc::clone)
    }

    /// Deep copy of one family as currently stored.
    pub fn snapshot(&self, name: &str) -> Option<MetricFamily> {
        self.family(name).map(|h| h.read().deep_copy())
    }

    /// Parse a pushed payload and merge every family in it.
    ///
    /// Families are applied in payload order; the first failure is returned
    /// and families merged before it keep their new state.
    pub fn ingest(&self, payload: &[u8], identity: &IdentityLabels) -> Result<()> {
        let families = text::parse(payload)?;

        for family in families {
            let name = family.name.clone();
            let prepared = merge::prepare_family(family, identity, &self.options.ignored_labels)?;
            let count = self.save_family(prepared)?;
            self.sink.set_family_metrics(&name, count);
        }

        self.sink.set_total_families(self.len());
        Ok(())
    }

    /// Insert a prepared family or merge it into the stored one.
    /// Returns the stored series count.
    pub fn save_family(&self, family: MetricFamily) -> Result<usize> {
        {
            let dir = self.families.read();
            if let Some(handle) = dir.get(&family.name) {
                let mut stored = handle.write();
                merge::merge_family(&mut stored, family, self.options.gauge_behavior)?;
                return Ok(stored.len());
            }
        }

        // First writer creates; a racing writer that got here first is merged into.
        let mut dir = self.families.write();
        match dir.entry(family.name.clone()) {
            Entry::Vacant(slot) => {
                let count = family.len();
                slot.insert(Arc::new(RwLock::new(family)));
                Ok(count)
            }
            Entry::Occupied(slot) => {
                let mut stored = slot.get().write();
                merge::merge_family(&mut stored, family, self.options.gauge_behavior)?;
                Ok(stored.len())
            }
        }
    }

    /// Encode every family, sorted by name, into `w`.
    ///
    /// One family lock is held at a time, for the duration of its encode.
    /// On an encode failure the render stops; bytes already written stay.
    pub fn render<W: Write + ?Sized>(&self, w: &mut W, format: Format) -> Result<()> {
        let mut handles: Vec<(String, FamilyHandle)> = {
            let dir = self.families.read();
            dir.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
        };
        handles.sort_by(|a, b| a.0.cmp(&b.0));

        let mut type_counts = BTreeMap::new();
        let mut family_counts = Vec::with_capacity(handles.len());
        for (name, handle) in &handles {
            let family = handle.read();
            if let Err(err) = encode_family(&family, format, w) {
                tracing::error!(
                    family = %name,
                    error = %err,
                    "metric family encoding failed, render aborted"
                );
                return Err(err);
            }
            *type_counts.entry(family.metric_type).or_insert(0usize) += 1;
            family_counts.push((name.as_str(), family.len()));
        }

        self.sink.set_total_families(handles.len());
        self.sink.reset_family_metrics();
        for (name, count) in &family_counts {
            self.sink.set_family_metrics(name, *count);
        }
        self.sink.set_type_families(&type_counts);
        Ok(())
    }
}
