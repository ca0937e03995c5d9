//! Label normalization: identity labels, ignore-set, canonical ordering.
//!
//! A normalized label sequence is the series identity within a family, so the
//! output here must be deterministic for any input ordering.

use std::collections::HashSet;

use crate::error::{PushPrismError, Result};
use crate::model::{LabelPair, Metric};

/// Name used for the family in rendered label sets.
pub const NAME_LABEL: &str = "__name__";

/// Caller-identity labels appended to every pushed metric.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityLabels {
    pairs: Vec<LabelPair>,
}

impl IdentityLabels {
    pub fn new(pairs: Vec<LabelPair>) -> Self {
        Self { pairs }
    }

    /// Single `job` identity.
    pub fn job(name: impl Into<String>) -> Self {
        Self {
            pairs: vec![LabelPair::new("job", name)],
        }
    }

    /// Parse alternating `key/value` path segments, e.g. `job/backup/shard/3`.
    /// Leading and trailing slashes are ignored; an empty key or value is not.
    pub fn from_path(path: &str) -> Result<Self> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.len() % 2 != 0 {
            return Err(PushPrismError::BadRequest(format!(
                "label path must be key/value pairs, got {} segments: {path}",
                segments.len()
            )));
        }
        let pairs = segments
            .chunks(2)
            .map(|kv| match kv {
                [k, v] if !k.is_empty() && !v.is_empty() => Ok(LabelPair::new(*k, *v)),
                _ => Err(PushPrismError::BadRequest(format!(
                    "empty label name or value in {path}"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { pairs })
    }

    pub fn pairs(&self) -> &[LabelPair] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// `k=v` pairs joined by `,`; the per-identity push counter key.
    pub fn key(&self) -> String {
        self.pairs
            .iter()
            .map(|l| format!("{}={}", l.name, l.value))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Label names dropped from every pushed metric (case-insensitive).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoredLabels {
    names: Vec<String>,
}

impl IgnoredLabels {
    /// Lower-case and sort once, at configuration time.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = names
            .into_iter()
            .map(|n| n.as_ref().to_lowercase())
            .collect();
        names.sort();
        names.dedup();
        Self { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        let needle = name.to_lowercase();
        self.names.binary_search(&needle).is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Append identity labels. A name already on the metric (or repeated in the
/// identity itself) is rejected.
pub fn attach(metric: &mut Metric, identity: &IdentityLabels) -> Result<()> {
    let mut seen: HashSet<String> = metric.labels.iter().map(|l| l.name.clone()).collect();
    for label in identity.pairs() {
        if !seen.insert(label.name.clone()) {
            return Err(PushPrismError::DuplicateLabel(label.name.clone()));
        }
        metric.labels.push(label.clone());
    }
    Ok(())
}

/// Sort by name and strip ignored labels.
pub fn canonicalize(metric: &mut Metric, ignored: &IgnoredLabels) {
    metric.labels.sort_by(|a, b| a.name.cmp(&b.name));
    if !ignored.is_empty() {
        metric.labels.retain(|l| !ignored.contains(&l.name));
    }
}

/// `attach` followed by `canonicalize`.
pub fn normalize(
    metric: &mut Metric,
    identity: &IdentityLabels,
    ignored: &IgnoredLabels,
) -> Result<()> {
    attach(metric, identity)?;
    canonicalize(metric, ignored);
    Ok(())
}

/// `{__name__="family", a="x", ...}`, every pair sorted by name.
pub fn render_label_set(family: &str, labels: &[LabelPair]) -> String {
    let mut all: Vec<(&str, &str)> = labels
        .iter()
        .map(|l| (l.name.as_str(), l.value.as_str()))
        .collect();
    all.push((NAME_LABEL, family));
    all.sort();
    let body = all
        .iter()
        .map(|(k, v)| format!("{k}={v:?}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{body}}}")
}
