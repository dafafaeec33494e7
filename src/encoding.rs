//! Prometheus text exposition format (version 0.0.4).
//!
//! Renders registry snapshots for scraping by a Prometheus server or a
//! compatible agent.

use std::fmt::Write;

use crate::{
    labels::Labels,
    metrics::{HistogramSnapshot, MetricValue},
    registry::FamilySnapshot,
};

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render a list of family snapshots into the text format. Families without
/// any instances still get their HELP and TYPE lines.
pub fn encode(families: &[FamilySnapshot]) -> String {
    let mut out = String::new();
    for family in families {
        encode_family(family, &mut out);
    }
    out
}

fn encode_family(family: &FamilySnapshot, out: &mut String) {
    let _ = writeln!(out, "# HELP {} {}", family.name, escape_help(&family.help));
    let _ = writeln!(out, "# TYPE {} {}", family.name, family.kind);
    for sample in &family.samples {
        match &sample.value {
            MetricValue::Counter(v) | MetricValue::Gauge(v) => {
                write_series(out, &family.name, "", &sample.labels, None, &format_value(*v));
            }
            MetricValue::Histogram(h) => encode_histogram(out, &family.name, &sample.labels, h),
        }
    }
}

fn encode_histogram(out: &mut String, name: &str, labels: &Labels, h: &HistogramSnapshot) {
    for (bound, count) in h.bounds.iter().zip(&h.buckets) {
        write_series(
            out,
            name,
            "_bucket",
            labels,
            Some(&format_value(*bound)),
            &count.to_string(),
        );
    }
    let count = h.count.to_string();
    write_series(out, name, "_bucket", labels, Some("+Inf"), &count);
    write_series(out, name, "_sum", labels, None, &format_value(h.sum));
    write_series(out, name, "_count", labels, None, &count);
}

fn write_series(
    out: &mut String,
    name: &str,
    suffix: &str,
    labels: &Labels,
    le: Option<&str>,
    value: &str,
) {
    out.push_str(name);
    out.push_str(suffix);
    if !labels.is_empty() || le.is_some() {
        out.push('{');
        let mut first = true;
        for (k, v) in labels.iter().chain(le.map(|le| ("le", le))) {
            if !first {
                out.push(',');
            }
            first = false;
            let _ = write!(out, "{}=\"{}\"", k, escape_label(v));
        }
        out.push('}');
    }
    out.push(' ');
    out.push_str(value);
    out.push('\n');
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        v.to_string()
    }
}

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_help(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\n', "\\n")
}
