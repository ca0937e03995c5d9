//! Typed in-memory metric model.
//!
//! Every value kind is a variant of a closed enum, so merge and copy code is a
//! single exhaustive `match` instead of runtime type probing.

use std::fmt;

/// Declared family type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Untyped,
}

impl MetricType {
    /// Name used on `# TYPE` lines.
    pub fn as_str(self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
            MetricType::Histogram => "histogram",
            MetricType::Summary => "summary",
            MetricType::Untyped => "untyped",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(name, value)` label. Ordered by name, then value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelPair {
    pub name: String,
    pub value: String,
}

impl LabelPair {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Histogram bucket: cumulative count of observations `<= upper_bound`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub upper_bound: f64,
    pub cumulative_count: u64,
}

/// Summary quantile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantile {
    pub quantile: f64,
    pub value: f64,
}

/// Value payload of one metric.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Counter(f64),
    Gauge(f64),
    Untyped(f64),
    Histogram {
        buckets: Vec<Bucket>,
        sum: f64,
        count: u64,
    },
    Summary {
        quantiles: Vec<Quantile>,
        sum: f64,
        count: u64,
    },
}

impl MetricValue {
    pub fn metric_type(&self) -> MetricType {
        match self {
            MetricValue::Counter(_) => MetricType::Counter,
            MetricValue::Gauge(_) => MetricType::Gauge,
            MetricValue::Untyped(_) => MetricType::Untyped,
            MetricValue::Histogram { .. } => MetricType::Histogram,
            MetricValue::Summary { .. } => MetricType::Summary,
        }
    }
}

/// One series: a label set plus its value.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub labels: Vec<LabelPair>,
    pub value: MetricValue,
}

impl Metric {
    pub fn new(labels: Vec<LabelPair>, value: MetricValue) -> Self {
        Self { labels, value }
    }

    /// Merge key within a family. Only meaningful after normalization.
    pub fn signature(&self) -> &[LabelPair] {
        &self.labels
    }
}

/// A named group of metrics sharing help text and type.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
    pub metrics: Vec<Metric>,
}

impl MetricFamily {
    pub fn new(name: impl Into<String>, metric_type: MetricType) -> Self {
        Self {
            name: name.into(),
            help: String::new(),
            metric_type,
            metrics: Vec::new(),
        }
    }

    /// Deep copy carrying the same identity and a cloned metric list.
    pub fn deep_copy(&self) -> Self {
        Self {
            name: self.name.clone(),
            help: self.help.clone(),
            metric_type: self.metric_type,
            metrics: self.metrics.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}
