//! Merge behavior of a single aggregate store.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::io::{self, Write};
use std::sync::Arc;

use common::{job, load, options, render_text, store, RecordingSink};
use pushprism_core::error::PushPrismError;
use pushprism_core::merge::prepare_family;
use pushprism_core::model::MetricFamily;
use pushprism_core::{
    AggregateStore, Format, GaugeBehavior, IdentityLabels, IgnoredLabels, MetricType,
};

struct Case {
    name: &'static str,
    a: &'static str,
    b: &'static str,
    want: &'static str,
    ignored: &'static [&'static str],
    gauge: GaugeBehavior,
}

const CASES: &[Case] = &[
    Case {
        name: "simple_gauge",
        a: "gauge_input.prom",
        b: "gauge_input.prom",
        want: "gauge_sum.prom",
        ignored: &[],
        gauge: GaugeBehavior::Sum,
    },
    Case {
        name: "simple_gauge_replace",
        a: "gauge_input.prom",
        b: "gauge_input.prom",
        want: "gauge_single.prom",
        ignored: &[],
        gauge: GaugeBehavior::Replace,
    },
    Case {
        name: "all_types",
        a: "in1.prom",
        b: "in2.prom",
        want: "in_sum.prom",
        ignored: &[],
        gauge: GaugeBehavior::Sum,
    },
    Case {
        name: "all_types_replace",
        a: "in1.prom",
        b: "in2.prom",
        want: "in_replace.prom",
        ignored: &[],
        gauge: GaugeBehavior::Replace,
    },
    Case {
        name: "multilabel",
        a: "multilabel1.prom",
        b: "multilabel2.prom",
        want: "counter_ab_sum.prom",
        ignored: &["ignore_label"],
        gauge: GaugeBehavior::Sum,
    },
    Case {
        name: "label_fields",
        a: "label_fields1.prom",
        b: "label_fields2.prom",
        want: "label_fields_sum.prom",
        ignored: &[],
        gauge: GaugeBehavior::Sum,
    },
    Case {
        name: "reordered_labels",
        a: "reordered1.prom",
        b: "reordered2.prom",
        want: "counter_ab_sum.prom",
        ignored: &[],
        gauge: GaugeBehavior::Sum,
    },
    Case {
        name: "ignored_labels",
        a: "ignored1.prom",
        b: "ignored2.prom",
        want: "counter_ab_sum.prom",
        ignored: &["IGNORE_ME"],
        gauge: GaugeBehavior::Sum,
    },
    Case {
        name: "summary",
        a: "summary_input.prom",
        b: "summary_input.prom",
        want: "summary_sum.prom",
        ignored: &[],
        gauge: GaugeBehavior::Sum,
    },
];

#[test]
fn two_pushes_merge_per_type() {
    for case in CASES {
        let agg = store(case.ignored, case.gauge);
        agg.ingest(load(case.a).as_bytes(), &job()).unwrap();
        agg.ingest(load(case.b).as_bytes(), &job()).unwrap();
        assert_eq!(render_text(&agg), load(case.want), "case {}", case.name);
    }
}

#[test]
fn counter_pushes_add_up() {
    let agg = store(&[], GaugeBehavior::Sum);
    agg.ingest(b"# TYPE counter counter\ncounter 31\n", &job()).unwrap();
    agg.ingest(b"# TYPE counter counter\ncounter 29\n", &job()).unwrap();
    assert_eq!(
        render_text(&agg),
        "# TYPE counter counter\ncounter{job=\"test\"} 60\n"
    );
}

#[test]
fn empty_push_is_a_no_op() {
    let agg = store(&[], GaugeBehavior::Sum);
    agg.ingest(b"", &job()).unwrap();
    agg.ingest(b"\n# nothing here\n", &job()).unwrap();
    assert!(agg.is_empty());
}

#[test]
fn series_with_different_label_names_merge_side_by_side() {
    let agg = store(&[], GaugeBehavior::Sum);
    agg.ingest(b"# TYPE g gauge\ng 1\ng{a=\"b\"} 2\n", &job()).unwrap();
    agg.ingest(b"# TYPE g gauge\ng{a=\"b\"} 3\n", &job()).unwrap();
    assert_eq!(
        render_text(&agg),
        "# TYPE g gauge\ng{a=\"b\",job=\"test\"} 5\ng{job=\"test\"} 1\n"
    );
}

#[test]
fn duplicate_series_in_one_push_is_rejected() {
    let agg = store(&[], GaugeBehavior::Sum);
    let err = agg
        .ingest(load("duplicate_labels.prom").as_bytes(), &job())
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        r#"duplicate labels: {__name__="ui_external_lib_loaded", job="test", loaded="true", name="Munchkin"}"#
    );
    assert!(agg.is_empty());
}

#[test]
fn ignored_label_collapsing_two_series_is_a_duplicate() {
    let agg = store(&["pod"], GaugeBehavior::Sum);
    let payload = "# TYPE c counter\nc{pod=\"a\"} 1\nc{pod=\"b\"} 2\n";
    let err = agg.ingest(payload.as_bytes(), &job()).unwrap_err();
    assert!(matches!(err, PushPrismError::DuplicateLabels(_)));
}

#[test]
fn identity_label_clash_is_rejected() {
    let agg = store(&[], GaugeBehavior::Sum);
    let payload = "# TYPE c counter\nc{job=\"other\"} 1\n";
    let err = agg.ingest(payload.as_bytes(), &job()).unwrap_err();
    assert!(matches!(err, PushPrismError::DuplicateLabel(ref name) if name == "job"));
}

#[test]
fn type_change_is_incompatible_and_keeps_stored_state() {
    let agg = store(&[], GaugeBehavior::Sum);
    agg.ingest(b"# TYPE x counter\nx 1\n", &job()).unwrap();
    let err = agg.ingest(b"# TYPE x gauge\nx 5\n", &job()).unwrap_err();
    assert!(matches!(err, PushPrismError::IncompatibleMetricDefinition(_)));
    assert_eq!(render_text(&agg), "# TYPE x counter\nx{job=\"test\"} 1\n");
}

#[test]
fn histogram_shape_change_is_incompatible_and_keeps_stored_state() {
    let agg = store(&[], GaugeBehavior::Sum);
    let first = "\
# TYPE h histogram
h_bucket{le=\"1\"} 1
h_bucket{le=\"+Inf\"} 2
h_sum 3
h_count 2
";
    let shifted = "\
# TYPE h histogram
h_bucket{le=\"2\"} 1
h_bucket{le=\"+Inf\"} 1
h_sum 1
h_count 1
";
    agg.ingest(first.as_bytes(), &job()).unwrap();
    let before = render_text(&agg);

    let err = agg.ingest(shifted.as_bytes(), &job()).unwrap_err();
    assert!(matches!(err, PushPrismError::IncompatibleMetricDefinition(_)));
    assert_eq!(render_text(&agg), before);
}

#[test]
fn histogram_shape_is_per_series() {
    let agg = store(&[], GaugeBehavior::Sum);
    let narrow = b"# TYPE h histogram\nh_bucket{le=\"1\"} 1\nh_count 1\n";
    let wide = b"# TYPE h histogram\nh_bucket{le=\"5\"} 1\nh_count 1\n";
    agg.ingest(narrow, &IdentityLabels::job("a")).unwrap();
    agg.ingest(wide, &IdentityLabels::job("b")).unwrap();
    assert_eq!(agg.snapshot("h").unwrap().len(), 2);
}

#[test]
fn failure_mid_push_keeps_earlier_families() {
    let agg = store(&[], GaugeBehavior::Sum);
    agg.ingest(b"# TYPE second gauge\nsecond 1\n", &job()).unwrap();

    let push = "\
# TYPE first counter
first 1
# TYPE second counter
second 1
# TYPE third counter
third 1
";
    let err = agg.ingest(push.as_bytes(), &job()).unwrap_err();
    assert!(matches!(err, PushPrismError::IncompatibleMetricDefinition(_)));

    assert_eq!(agg.family_names(), ["first", "second"]);
    assert_eq!(agg.snapshot("second").unwrap().metric_type, MetricType::Gauge);
}

#[test]
fn parse_error_mutates_nothing() {
    let agg = store(&[], GaugeBehavior::Sum);
    let err = agg.ingest(b"# TYPE ok counter\nok 1\nbroken{ 1\n", &job()).unwrap_err();
    assert!(matches!(err, PushPrismError::Parse(_)));
    assert!(agg.is_empty());
}

#[test]
fn empty_family_is_rejected() {
    let family = MetricFamily::new("nothing", MetricType::Counter);
    let err = prepare_family(family, &job(), &IgnoredLabels::default()).unwrap_err();
    assert!(matches!(err, PushPrismError::EmptyFamily(ref name) if name == "nothing"));
}

#[test]
fn render_sorts_families_and_series() {
    let agg = store(&[], GaugeBehavior::Sum);
    let payload = "\
# TYPE zeta counter
zeta{k=\"b\"} 1
zeta{k=\"a\"} 1
# TYPE alpha gauge
alpha 2
";
    agg.ingest(payload.as_bytes(), &job()).unwrap();
    assert_eq!(
        render_text(&agg),
        "# TYPE alpha gauge\nalpha{job=\"test\"} 2\n# TYPE zeta counter\nzeta{job=\"test\",k=\"a\"} 1\nzeta{job=\"test\",k=\"b\"} 1\n"
    );
}

#[test]
fn untyped_samples_add_up() {
    let agg = store(&[], GaugeBehavior::Sum);
    agg.ingest(b"loose 1.5\n", &job()).unwrap();
    agg.ingest(b"loose 2\n", &job()).unwrap();
    assert_eq!(render_text(&agg), "# TYPE loose untyped\nloose{job=\"test\"} 3.5\n");
}

#[test]
fn summary_keeps_pushed_quantiles() {
    let agg = store(&[], GaugeBehavior::Sum);
    let a = "# TYPE s summary\ns{quantile=\"0.5\"} 10\ns_sum 10\ns_count 1\n";
    let b = "# TYPE s summary\ns{quantile=\"0.5\"} 30\ns_sum 30\ns_count 1\n";
    agg.ingest(a.as_bytes(), &job()).unwrap();
    agg.ingest(b.as_bytes(), &job()).unwrap();
    assert_eq!(
        render_text(&agg),
        "# TYPE s summary\ns{job=\"test\",quantile=\"0.5\"} 30\ns_sum{job=\"test\"} 40\ns_count{job=\"test\"} 2\n"
    );
}

#[test]
fn protobuf_render_writes_delimited_messages() {
    let agg = store(&[], GaugeBehavior::Sum);
    agg.ingest(load("in1.prom").as_bytes(), &job()).unwrap();
    let mut buf = Vec::new();
    agg.render(&mut buf, Format::Protobuf).unwrap();
    assert!(!buf.is_empty());
    assert!(buf.windows(b"histogram".len()).any(|w| w == b"histogram"));
}

#[test]
fn sink_sees_family_counts() {
    let sink = Arc::new(RecordingSink::default());
    let agg = AggregateStore::new(options(&[], GaugeBehavior::Sum), sink.clone());
    agg.ingest(load("in1.prom").as_bytes(), &job()).unwrap();
    agg.ingest(load("label_fields1.prom").as_bytes(), &job()).unwrap();
    assert_eq!(*sink.total_families.lock(), Some(4));
    assert_eq!(sink.family_metrics.lock().get("ui_page_render_errors"), Some(&2));

    render_text(&agg);
    let by_type = sink.type_families.lock().clone();
    assert_eq!(by_type.get(&MetricType::Counter), Some(&2));
    assert_eq!(by_type.get(&MetricType::Gauge), Some(&1));
    assert_eq!(by_type.get(&MetricType::Histogram), Some(&1));
}

#[test]
fn concurrent_pushes_into_one_family_all_land() {
    let agg = Arc::new(store(&[], GaugeBehavior::Sum));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let agg = Arc::clone(&agg);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    agg.ingest(b"# TYPE hits counter\nhits 1\n", &job()).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(render_text(&agg), "# TYPE hits counter\nhits{job=\"test\"} 400\n");
}

/// Accepts `room` bytes, then fails every write.
struct ShortWriter {
    buf: Vec<u8>,
    room: usize,
}

impl Write for ShortWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.buf.len() + data.len() > self.room {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "full"));
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn encode_failure_stops_render_and_keeps_written_prefix() {
    let sink = Arc::new(RecordingSink::default());
    let agg = AggregateStore::new(options(&[], GaugeBehavior::Sum), sink.clone());
    agg.ingest(b"# TYPE a counter\na 1\n# TYPE b counter\nb 1\n", &job())
        .unwrap();
    sink.family_metrics.lock().clear();
    sink.type_families.lock().clear();

    let first = "# TYPE a counter\na{job=\"test\"} 1\n";
    let mut w = ShortWriter {
        buf: Vec::new(),
        room: first.len() + 4,
    };
    let err = agg.render(&mut w, Format::Text).unwrap_err();

    assert_eq!(err.kind(), "encode");
    assert!(err.to_string().contains("b:"), "{err}");
    assert_eq!(String::from_utf8(w.buf).unwrap(), first);
    assert!(sink.family_metrics.lock().is_empty());
    assert!(sink.type_families.lock().is_empty());
}
