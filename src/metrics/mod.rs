use std::fmt;

use crate::facade::{FamilyMap, FamilyMaps};

pub(crate) mod counter;
pub(crate) mod gauge;
pub(crate) mod histogram;

/// The three kinds of metric a family can hold. Each kind lives in its own
/// namespace, so a counter family and a gauge family may share a name.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point-in-time read of a histogram. `buckets[i]` is the cumulative count
/// of observations less than or equal to `bounds[i]`; the implicit `+Inf`
/// bucket is `count`.
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramSnapshot {
    pub bounds: Vec<f64>,
    pub buckets: Vec<u64>,
    pub count: u64,
    pub sum: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MetricValue {
    Counter(f64),
    Gauge(f64),
    Histogram(HistogramSnapshot),
}

mod sealed {
    pub trait Sealed {}
}

/// A trait representing the public metric interface. This is common across all
/// metric kinds and lets [`crate::Family`] and [`crate::Metrics`] stay generic
/// over the kind they hold. It is sealed; the set of kinds is fixed.
pub trait Metric: sealed::Sealed + Clone + Send + Sync + 'static {
    const KIND: MetricKind;

    /// Read the current value. Reads are not destructive, every scrape sees the
    /// cumulative state.
    fn value(&self) -> MetricValue;

    #[doc(hidden)]
    fn family_map(maps: &FamilyMaps) -> &FamilyMap<Self>;
}
