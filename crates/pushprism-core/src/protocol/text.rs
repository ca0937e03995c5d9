//! Text exposition ingest (Prometheus 0.0.4).
//!
//! Sample lines are tokenized by `openmetrics_parser`, one line at a time and
//! under a neutral name, so its OpenMetrics family rules (counter `_total`
//! suffixes, one label-name set per family, a mandatory `+Inf` bucket) never
//! reject a 0.0.4 payload. `# HELP` / `# TYPE` directives and the grouping of
//! `_bucket` / `_sum` / `_count` samples into series are handled here, on the
//! parsed values.

use std::collections::{BTreeMap, HashMap};

use openmetrics_parser::prometheus::parse_prometheus;
use openmetrics_parser::{MetricNumber, PrometheusValue};

use crate::error::{PushPrismError, Result};
use crate::model::{
    Bucket, LabelPair, Metric, MetricFamily, MetricType, MetricValue, Quantile,
};

/// Name every sample line is tokenized under.
const TOKENIZE_AS: &str = "sample";

/// Parse a text exposition payload into families sorted by name.
///
/// An empty or comment-only payload yields no families. Families without
/// samples are dropped; sample timestamps are discarded.
pub fn parse(payload: &[u8]) -> Result<Vec<MetricFamily>> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| PushPrismError::Parse(format!("payload is not valid utf-8: {e}")))?;

    let mut families: BTreeMap<String, FamilyBuilder> = BTreeMap::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        let lineno = idx + 1;
        if line.is_empty() {
            continue;
        }
        match line.strip_prefix('#') {
            Some(comment) => directive(&mut families, comment, lineno)?,
            None => add_sample(&mut families, parse_sample(line, lineno)?, lineno)?,
        }
    }

    Ok(families
        .into_iter()
        .filter_map(|(name, builder)| builder.finish(name))
        .collect())
}

fn line_error(lineno: usize, msg: impl std::fmt::Display) -> PushPrismError {
    PushPrismError::Parse(format!("line {lineno}: {msg}"))
}

// --------------------
// Directives
// --------------------

#[derive(Default)]
struct FamilyBuilder {
    help: String,
    metric_type: Option<MetricType>,
    metrics: Vec<Metric>,
    /// Histogram and summary series by label set, as indexes into `metrics`.
    series: HashMap<Vec<LabelPair>, usize>,
}

impl FamilyBuilder {
    fn metric_type(&self) -> MetricType {
        self.metric_type.unwrap_or(MetricType::Untyped)
    }

    fn push(&mut self, labels: Vec<LabelPair>, value: MetricValue) {
        self.metrics.push(Metric::new(labels, value));
    }

    /// Value of the grouped series with these labels, created on first sight.
    fn series(&mut self, labels: Vec<LabelPair>) -> &mut MetricValue {
        let idx = match self.series.get(&labels) {
            Some(&idx) => idx,
            None => {
                let value = match self.metric_type() {
                    MetricType::Histogram => MetricValue::Histogram {
                        buckets: Vec::new(),
                        sum: 0.0,
                        count: 0,
                    },
                    _ => MetricValue::Summary {
                        quantiles: Vec::new(),
                        sum: 0.0,
                        count: 0,
                    },
                };
                self.metrics.push(Metric::new(labels.clone(), value));
                let idx = self.metrics.len() - 1;
                self.series.insert(labels, idx);
                idx
            }
        };
        &mut self.metrics[idx].value
    }

    fn finish(mut self, name: String) -> Option<MetricFamily> {
        if self.metrics.is_empty() {
            return None;
        }
        for metric in &mut self.metrics {
            if let MetricValue::Histogram { buckets, .. } = &mut metric.value {
                buckets.sort_by(|a, b| a.upper_bound.total_cmp(&b.upper_bound));
            }
        }
        let mut family = MetricFamily::new(name, self.metric_type());
        family.help = self.help;
        family.metrics = self.metrics;
        Some(family)
    }
}

/// First whitespace-separated token and the rest, left-trimmed.
fn split_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

fn directive(
    families: &mut BTreeMap<String, FamilyBuilder>,
    comment: &str,
    lineno: usize,
) -> Result<()> {
    let (keyword, rest) = split_token(comment);
    let (name, rest) = split_token(rest);
    match keyword {
        "HELP" | "TYPE" if !is_metric_name(name) => {
            Err(line_error(lineno, format!("invalid metric name {name:?} in {keyword}")))
        }
        "HELP" => {
            families.entry(name.to_string()).or_default().help = unescape_help(rest);
            Ok(())
        }
        "TYPE" => {
            let metric_type = match split_token(rest).0 {
                "counter" => MetricType::Counter,
                "gauge" => MetricType::Gauge,
                "histogram" => MetricType::Histogram,
                "summary" => MetricType::Summary,
                "untyped" => MetricType::Untyped,
                other => {
                    return Err(line_error(lineno, format!("unknown metric type {other:?}")))
                }
            };
            let family = families.entry(name.to_string()).or_default();
            if family.metric_type.is_some() {
                return Err(line_error(lineno, format!("second TYPE line for {name}")));
            }
            if !family.metrics.is_empty() {
                let msg = format!("TYPE line for {name} after its samples");
                return Err(line_error(lineno, msg));
            }
            family.metric_type = Some(metric_type);
            Ok(())
        }
        // plain comment
        _ => Ok(()),
    }
}

fn unescape_help(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn is_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

// --------------------
// Samples
// --------------------

struct Sample {
    name: String,
    labels: Vec<LabelPair>,
    value: f64,
}

fn parse_sample(line: &str, lineno: usize) -> Result<Sample> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .unwrap_or(line.len());
    let (name, rest) = line.split_at(name_end);
    if !is_metric_name(name) {
        return Err(line_error(lineno, format!("invalid metric name {name:?}")));
    }

    let exposition = parse_prometheus(&format!("{TOKENIZE_AS}{rest}\n"))
        .map_err(|e| line_error(lineno, format!("{e:?}")))?;
    let mut samples = exposition.families.values().flat_map(|f| f.iter_samples());
    let (Some(sample), None) = (samples.next(), samples.next()) else {
        return Err(line_error(lineno, "expected exactly one sample"));
    };

    let mut labels: Vec<LabelPair> = sample
        .get_labelset()
        .map_err(|e| line_error(lineno, format!("{e:?}")))?
        .iter()
        .map(|(k, v)| LabelPair::new(k.to_string(), v.to_string()))
        .collect();
    labels.sort();

    let value = match &sample.value {
        PrometheusValue::Unknown(n) => n.to_f64(),
        PrometheusValue::Gauge(n) => n.to_f64(),
        PrometheusValue::Counter(c) => c.value.to_f64(),
        _ => return Err(line_error(lineno, "expected a single-value sample")),
    };

    Ok(Sample {
        name: name.to_string(),
        labels,
        value,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Plain,
    Bucket,
    Sum,
    Count,
}

/// Family a sample belongs to: its own name, or the histogram / summary it
/// is a `_bucket` / `_sum` / `_count` line of.
fn classify(families: &BTreeMap<String, FamilyBuilder>, name: &str) -> (String, Role) {
    if families.get(name).is_some_and(|f| f.metric_type.is_some()) {
        return (name.to_string(), Role::Plain);
    }
    let suffixes = [
        ("_bucket", Role::Bucket),
        ("_sum", Role::Sum),
        ("_count", Role::Count),
    ];
    for (suffix, role) in suffixes {
        let Some(base) = name.strip_suffix(suffix) else {
            continue;
        };
        match families.get(base).map(FamilyBuilder::metric_type) {
            Some(MetricType::Histogram) => return (base.to_string(), role),
            Some(MetricType::Summary) if role != Role::Bucket => {
                return (base.to_string(), role)
            }
            _ => {}
        }
    }
    (name.to_string(), Role::Plain)
}

fn add_sample(
    families: &mut BTreeMap<String, FamilyBuilder>,
    sample: Sample,
    lineno: usize,
) -> Result<()> {
    let (family_name, role) = classify(families, &sample.name);
    let family = families.entry(family_name).or_default();
    let value = sample.value;

    match (family.metric_type(), role) {
        (MetricType::Counter, Role::Plain) => {
            family.push(sample.labels, MetricValue::Counter(value))
        }
        (MetricType::Gauge, Role::Plain) => {
            family.push(sample.labels, MetricValue::Gauge(value))
        }
        (MetricType::Untyped, Role::Plain) => {
            family.push(sample.labels, MetricValue::Untyped(value))
        }
        (MetricType::Histogram, Role::Bucket) => {
            let (labels, le) = take_label(sample.labels, "le");
            let upper_bound = parse_bound(le, "le", lineno)?;
            let cumulative_count =
                to_count(value).ok_or_else(|| bad_count(&sample.name, value, lineno))?;
            if let MetricValue::Histogram { buckets, .. } = family.series(labels) {
                buckets.push(Bucket {
                    upper_bound,
                    cumulative_count,
                });
            }
        }
        (MetricType::Summary, Role::Plain) => {
            let (labels, quantile) = take_label(sample.labels, "quantile");
            let quantile = parse_bound(quantile, "quantile", lineno)?;
            if let MetricValue::Summary { quantiles, .. } = family.series(labels) {
                quantiles.push(Quantile { quantile, value });
            }
        }
        (MetricType::Histogram | MetricType::Summary, Role::Sum) => {
            match family.series(sample.labels) {
                MetricValue::Histogram { sum, .. } | MetricValue::Summary { sum, .. } => {
                    *sum = value
                }
                _ => {}
            }
        }
        (MetricType::Histogram | MetricType::Summary, Role::Count) => {
            let n = to_count(value).ok_or_else(|| bad_count(&sample.name, value, lineno))?;
            match family.series(sample.labels) {
                MetricValue::Histogram { count, .. } | MetricValue::Summary { count, .. } => {
                    *count = n
                }
                _ => {}
            }
        }
        (metric_type, _) => {
            return Err(line_error(
                lineno,
                format!("sample {} does not fit a {metric_type} family", sample.name),
            ))
        }
    }
    Ok(())
}

/// Split one label off a label set.
fn take_label(labels: Vec<LabelPair>, name: &str) -> (Vec<LabelPair>, Option<String>) {
    let mut taken = None;
    let rest = labels
        .into_iter()
        .filter_map(|l| {
            if l.name == name {
                taken = Some(l.value);
                None
            } else {
                Some(l)
            }
        })
        .collect();
    (rest, taken)
}

fn parse_bound(value: Option<String>, label: &str, lineno: usize) -> Result<f64> {
    let value = value.ok_or_else(|| line_error(lineno, format!("missing {label} label")))?;
    value
        .parse::<f64>()
        .map_err(|_| line_error(lineno, format!("{label}={value:?} is not a number")))
}

/// Observation counts must be non-negative integers.
fn to_count(v: f64) -> Option<u64> {
    let fits = v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64;
    fits.then_some(v as u64)
}

fn bad_count(name: &str, v: f64, lineno: usize) -> PushPrismError {
    line_error(
        lineno,
        format!("{name}: count must be a non-negative integer, got {v}"),
    )
}

/// Numeric sample value; an absent one reads as zero.
trait SampleNumber {
    fn to_f64(&self) -> f64;
}

impl SampleNumber for MetricNumber {
    fn to_f64(&self) -> f64 {
        match self {
            MetricNumber::Float(f) => *f,
            MetricNumber::Int(i) => *i as f64,
        }
    }
}

impl SampleNumber for Option<MetricNumber> {
    fn to_f64(&self) -> f64 {
        self.as_ref().map_or(0.0, |n| n.to_f64())
    }
}
