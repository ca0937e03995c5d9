//! Exposition encoders for the render path.
//!
//! Text output follows the Prometheus 0.0.4 text format line for line.
//! Protobuf output converts to `prometheus::proto` and goes through the
//! crate's length-delimited `ProtobufEncoder`.

use std::io::Write;

use prometheus::{proto, Encoder, ProtobufEncoder};

use crate::error::{PushPrismError, Result};
use crate::model::{LabelPair, Metric, MetricFamily, MetricType, MetricValue};

const PROTOBUF_MEDIA_TYPE: &str = "application/vnd.google.protobuf";
const PROTOBUF_PROTO: &str = "io.prometheus.client.MetricFamily";

/// Render format chosen by content negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Text,
    /// Length-delimited `io.prometheus.client.MetricFamily` messages.
    Protobuf,
}

impl Format {
    /// Pick a format from an `Accept` header. Anything but an explicit
    /// delimited protobuf request falls back to text.
    pub fn negotiate(accept: Option<&str>) -> Self {
        let Some(accept) = accept else {
            return Format::Text;
        };
        for part in accept.split(',') {
            let mut params = part.split(';').map(str::trim);
            if params.next() != Some(PROTOBUF_MEDIA_TYPE) {
                continue;
            }
            let mut proto_ok = false;
            let mut delimited = false;
            for p in params {
                match p.split_once('=') {
                    Some(("proto", v)) => proto_ok = v == PROTOBUF_PROTO,
                    Some(("encoding", v)) => delimited = v == "delimited",
                    _ => {}
                }
            }
            if proto_ok && delimited {
                return Format::Protobuf;
            }
        }
        Format::Text
    }

    /// `Content-Type` header value for responses in this format.
    pub fn content_type(self) -> &'static str {
        match self {
            Format::Text => prometheus::TEXT_FORMAT,
            Format::Protobuf => prometheus::PROTOBUF_FORMAT,
        }
    }
}

/// Encode one family into `w`.
pub fn encode_family<W: Write + ?Sized>(
    family: &MetricFamily,
    format: Format,
    mut w: &mut W,
) -> Result<()> {
    match format {
        Format::Text => write_text(family, &mut w)
            .map_err(|e| PushPrismError::Encode(format!("{}: {e}", family.name))),
        Format::Protobuf => ProtobufEncoder::new()
            .encode(&[to_proto(family)], &mut w)
            .map_err(|e| PushPrismError::Encode(format!("{}: {e}", family.name))),
    }
}

// --------------------
// Text
// --------------------

fn escape_help(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn format_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".into()
    } else if v == f64::INFINITY {
        "+Inf".into()
    } else if v == f64::NEG_INFINITY {
        "-Inf".into()
    } else {
        v.to_string()
    }
}

fn write_text<W: Write>(family: &MetricFamily, w: &mut W) -> std::io::Result<()> {
    let name = family.name.as_str();
    if !family.help.is_empty() {
        writeln!(w, "# HELP {} {}", name, escape_help(&family.help))?;
    }
    writeln!(w, "# TYPE {} {}", name, family.metric_type)?;
    for metric in &family.metrics {
        write_metric(name, metric, w)?;
    }
    Ok(())
}

fn write_metric<W: Write>(name: &str, metric: &Metric, w: &mut W) -> std::io::Result<()> {
    let labels = &metric.labels;
    match &metric.value {
        MetricValue::Counter(v) | MetricValue::Gauge(v) | MetricValue::Untyped(v) => {
            write_sample(w, name, "", labels, None, &format_float(*v))
        }
        MetricValue::Histogram {
            buckets,
            sum,
            count,
        } => {
            let mut inf_seen = false;
            for b in buckets {
                inf_seen |= b.upper_bound == f64::INFINITY;
                let le = format_float(b.upper_bound);
                let count = b.cumulative_count.to_string();
                write_sample(w, name, "_bucket", labels, Some(("le", &le)), &count)?;
            }
            if !inf_seen {
                write_sample(w, name, "_bucket", labels, Some(("le", "+Inf")), &count.to_string())?;
            }
            write_sample(w, name, "_sum", labels, None, &format_float(*sum))?;
            write_sample(w, name, "_count", labels, None, &count.to_string())
        }
        MetricValue::Summary {
            quantiles,
            sum,
            count,
        } => {
            for q in quantiles {
                let quantile = format_float(q.quantile);
                let value = format_float(q.value);
                write_sample(w, name, "", labels, Some(("quantile", &quantile)), &value)?;
            }
            write_sample(w, name, "_sum", labels, None, &format_float(*sum))?;
            write_sample(w, name, "_count", labels, None, &count.to_string())
        }
    }
}

fn write_sample<W: Write>(
    w: &mut W,
    name: &str,
    suffix: &str,
    labels: &[LabelPair],
    extra: Option<(&str, &str)>,
    value: &str,
) -> std::io::Result<()> {
    let mut pairs: Vec<String> = labels
        .iter()
        .map(|l| format!("{}=\"{}\"", l.name, escape_label(&l.value)))
        .collect();
    if let Some((k, v)) = extra {
        pairs.push(format!("{}=\"{}\"", k, escape_label(v)));
    }
    if pairs.is_empty() {
        writeln!(w, "{name}{suffix} {value}")
    } else {
        writeln!(w, "{name}{suffix}{{{}}} {value}", pairs.join(","))
    }
}

// --------------------
// Protobuf
// --------------------

fn proto_type(t: MetricType) -> proto::MetricType {
    match t {
        MetricType::Counter => proto::MetricType::COUNTER,
        MetricType::Gauge => proto::MetricType::GAUGE,
        MetricType::Histogram => proto::MetricType::HISTOGRAM,
        MetricType::Summary => proto::MetricType::SUMMARY,
        MetricType::Untyped => proto::MetricType::UNTYPED,
    }
}

/// Convert to the wire model of the `prometheus` crate.
pub fn to_proto(family: &MetricFamily) -> proto::MetricFamily {
    let mut mf = proto::MetricFamily::default();
    mf.set_name(family.name.clone());
    mf.set_help(family.help.clone());
    mf.set_field_type(proto_type(family.metric_type));
    let metrics: Vec<proto::Metric> = family.metrics.iter().map(to_proto_metric).collect();
    mf.set_metric(metrics.into());
    mf
}

fn to_proto_metric(metric: &Metric) -> proto::Metric {
    let mut m = proto::Metric::default();
    let labels: Vec<proto::LabelPair> = metric
        .labels
        .iter()
        .map(|l| {
            let mut lp = proto::LabelPair::default();
            lp.set_name(l.name.clone());
            lp.set_value(l.value.clone());
            lp
        })
        .collect();
    m.set_label(labels.into());

    match &metric.value {
        MetricValue::Counter(v) => {
            let mut c = proto::Counter::default();
            c.set_value(*v);
            m.set_counter(c);
        }
        MetricValue::Gauge(v) => {
            let mut g = proto::Gauge::default();
            g.set_value(*v);
            m.set_gauge(g);
        }
        MetricValue::Untyped(v) => {
            let mut u = proto::Untyped::default();
            u.set_value(*v);
            m.set_untyped(u);
        }
        MetricValue::Histogram {
            buckets,
            sum,
            count,
        } => {
            let mut h = proto::Histogram::default();
            h.set_sample_sum(*sum);
            h.set_sample_count(*count);
            let buckets: Vec<proto::Bucket> = buckets
                .iter()
                .map(|b| {
                    let mut pb = proto::Bucket::default();
                    pb.set_upper_bound(b.upper_bound);
                    pb.set_cumulative_count(b.cumulative_count);
                    pb
                })
                .collect();
            h.set_bucket(buckets.into());
            m.set_histogram(h);
        }
        MetricValue::Summary {
            quantiles,
            sum,
            count,
        } => {
            let mut s = proto::Summary::default();
            s.set_sample_sum(*sum);
            s.set_sample_count(*count);
            let quantiles: Vec<proto::Quantile> = quantiles
                .iter()
                .map(|q| {
                    let mut pq = proto::Quantile::default();
                    pq.set_quantile(q.quantile);
                    pq.set_value(q.value);
                    pq
                })
                .collect();
            s.set_quantile(quantiles.into());
            m.set_summary(s);
        }
    }
    m
}
