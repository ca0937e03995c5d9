//! Type-specific merge rules and the family merge-join.
//!
//! `prepare_family` normalizes a freshly parsed family without touching any
//! store. `merge_family` folds a prepared family into the stored one; it
//! validates every matched pair before mutating, so a rejected push leaves
//! the stored family as it was.

use serde::Deserialize;

use crate::error::{PushPrismError, Result};
use crate::labels::{normalize, render_label_set, IdentityLabels, IgnoredLabels};
use crate::model::{Bucket, MetricFamily, MetricValue};

/// How two gauge samples for the same series combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GaugeBehavior {
    /// `existing += incoming`
    #[default]
    Sum,
    /// `existing = incoming`
    Replace,
}

/// Normalize labels, sort by signature and reject intra-push duplicates.
pub fn prepare_family(
    mut family: MetricFamily,
    identity: &IdentityLabels,
    ignored: &IgnoredLabels,
) -> Result<MetricFamily> {
    if family.metrics.is_empty() {
        return Err(PushPrismError::EmptyFamily(family.name));
    }
    if let Some(m) = family
        .metrics
        .iter()
        .find(|m| m.value.metric_type() != family.metric_type)
    {
        return Err(PushPrismError::IncompatibleMetricDefinition(format!(
            "{}: {} sample in a {} family",
            family.name,
            m.value.metric_type(),
            family.metric_type
        )));
    }

    for metric in &mut family.metrics {
        normalize(metric, identity, ignored)?;
    }
    family.metrics.sort_by(|a, b| a.signature().cmp(b.signature()));

    let duplicate = family.metrics.windows(2).find_map(|w| match w {
        [a, b] if a.signature() == b.signature() => {
            Some(render_label_set(&family.name, &a.labels))
        }
        _ => None,
    });
    if let Some(rendered) = duplicate {
        return Err(PushPrismError::DuplicateLabels(rendered));
    }

    Ok(family)
}

/// Merge-join a prepared, sorted `incoming` family into `existing`.
pub fn merge_family(
    existing: &mut MetricFamily,
    incoming: MetricFamily,
    gauge: GaugeBehavior,
) -> Result<()> {
    if existing.metric_type != incoming.metric_type {
        return Err(PushPrismError::IncompatibleMetricDefinition(format!(
            "{}: stored type {} != pushed type {}",
            existing.name, existing.metric_type, incoming.metric_type
        )));
    }

    // Validation pass: nothing is mutated until every matched pair fits.
    {
        let mut ex = existing.metrics.iter().peekable();
        for inc in &incoming.metrics {
            while ex.next_if(|e| e.signature() < inc.signature()).is_some() {}
            if let Some(e) = ex.next_if(|e| e.signature() == inc.signature()) {
                check_compatible(&existing.name, &e.value, &inc.value)?;
            }
        }
    }

    if existing.help.is_empty() {
        existing.help = incoming.help;
    }

    let name = existing.name.clone();
    let old = std::mem::take(&mut existing.metrics);
    let mut merged = Vec::with_capacity(old.len() + incoming.metrics.len());
    let mut failure = None;
    let mut ex = old.into_iter().peekable();
    for inc in incoming.metrics {
        while let Some(e) = ex.next_if(|e| e.signature() < inc.signature()) {
            merged.push(e);
        }
        match ex.next_if(|e| e.signature() == inc.signature()) {
            Some(mut e) => {
                if let Err(err) = merge_value(&name, &mut e.value, &inc.value, gauge) {
                    failure.get_or_insert(err);
                }
                merged.push(e);
            }
            None => merged.push(inc),
        }
    }
    merged.extend(ex);
    existing.metrics = merged;

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Structural compatibility of two values of one series.
pub fn check_compatible(
    family: &str,
    existing: &MetricValue,
    incoming: &MetricValue,
) -> Result<()> {
    match (existing, incoming) {
        (MetricValue::Histogram { buckets: a, .. }, MetricValue::Histogram { buckets: b, .. }) => {
            check_buckets(family, a, b)
        }
        (a, b) if a.metric_type() == b.metric_type() => Ok(()),
        (a, b) => Err(PushPrismError::IncompatibleMetricDefinition(format!(
            "{family}: cannot merge {} sample into {} series",
            b.metric_type(),
            a.metric_type()
        ))),
    }
}

fn check_buckets(family: &str, existing: &[Bucket], incoming: &[Bucket]) -> Result<()> {
    let same = existing.len() == incoming.len()
        && existing
            .iter()
            .zip(incoming)
            .all(|(a, b)| a.upper_bound == b.upper_bound);
    if same {
        Ok(())
    } else {
        Err(PushPrismError::IncompatibleMetricDefinition(format!(
            "{family}: histogram bucket boundaries changed ({} stored, {} pushed)",
            describe_bounds(existing),
            describe_bounds(incoming)
        )))
    }
}

fn describe_bounds(buckets: &[Bucket]) -> String {
    let bounds: Vec<String> = buckets.iter().map(|b| b.upper_bound.to_string()).collect();
    format!("[{}]", bounds.join(","))
}

/// Combine `incoming` into `existing` for one series.
pub fn merge_value(
    family: &str,
    existing: &mut MetricValue,
    incoming: &MetricValue,
    gauge: GaugeBehavior,
) -> Result<()> {
    match (existing, incoming) {
        (MetricValue::Counter(a), MetricValue::Counter(b))
        | (MetricValue::Untyped(a), MetricValue::Untyped(b)) => *a += *b,
        (MetricValue::Gauge(a), MetricValue::Gauge(b)) => match gauge {
            GaugeBehavior::Sum => *a += *b,
            GaugeBehavior::Replace => *a = *b,
        },
        (
            MetricValue::Histogram {
                buckets,
                sum,
                count,
            },
            MetricValue::Histogram {
                buckets: in_buckets,
                sum: in_sum,
                count: in_count,
            },
        ) => {
            check_buckets(family, buckets.as_slice(), in_buckets)?;
            for (a, b) in buckets.iter_mut().zip(in_buckets) {
                a.cumulative_count = a.cumulative_count.saturating_add(b.cumulative_count);
            }
            *sum += *in_sum;
            *count = count.saturating_add(*in_count);
        }
        (
            MetricValue::Summary {
                quantiles,
                sum,
                count,
            },
            MetricValue::Summary {
                quantiles: in_quantiles,
                sum: in_sum,
                count: in_count,
            },
        ) => {
            // Quantiles of two summaries cannot be combined; the pushed list wins.
            quantiles.clone_from(in_quantiles);
            *sum += *in_sum;
            *count = count.saturating_add(*in_count);
        }
        (a, b) => {
            return Err(PushPrismError::IncompatibleMetricDefinition(format!(
                "{family}: cannot merge {} sample into {} series",
                b.metric_type(),
                a.metric_type()
            )))
        }
    }
    Ok(())
}
