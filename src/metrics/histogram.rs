use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;

use super::{HistogramSnapshot, Metric, MetricKind, MetricValue};
use crate::{
    error::{Error, Result},
    facade::{FamilyMap, FamilyMaps},
};

#[derive(Debug)]
struct HistogramInner {
    /// counts[i] is the number of observations that landed in bucket i only,
    /// the last slot being the implicit +Inf bucket. They are made cumulative
    /// on read.
    counts: Vec<u64>,
    count: u64,
    sum: f64,
}

impl HistogramInner {
    fn new(buckets: usize) -> Self {
        Self {
            counts: vec![0; buckets + 1],
            count: 0,
            sum: 0f64,
        }
    }
}

#[derive(Debug)]
struct Shared {
    /// Upper bounds are fixed for the lifetime of the histogram so they live
    /// outside the lock.
    bounds: Box<[f64]>,
    state: Mutex<HistogramInner>,
}

/// A threadsafe histogram over explicit, caller supplied bucket upper bounds.
/// An observation lands in the first bucket whose bound is greater than or
/// equal to it.
#[derive(Clone, Debug)]
pub struct Histogram {
    inner: Arc<Shared>,
}

impl Histogram {
    /// Create a histogram with the given bucket upper bounds. The bounds must
    /// be finite and strictly ascending; `+Inf` is always implied. An empty
    /// slice is fine and yields a histogram that only tracks count and sum.
    pub fn new(bounds: &[f64]) -> Result<Self> {
        validate_bounds(bounds)?;
        Ok(Self {
            inner: Arc::new(Shared {
                bounds: bounds.into(),
                state: Mutex::new(HistogramInner::new(bounds.len())),
            }),
        })
    }

    pub fn bounds(&self) -> &[f64] {
        &self.inner.bounds
    }

    pub fn record(&self, value: f64) {
        let bounds = &self.inner.bounds;
        // NaN compares false against everything and belongs in +Inf.
        let bucket = if value.is_nan() {
            bounds.len()
        } else {
            bounds.partition_point(|bound| *bound < value)
        };
        let mut state = self.inner.state.lock();
        state.counts[bucket] += 1;
        state.count += 1;
        state.sum += value;
    }

    pub fn record_duration_sec(&self, value: Duration) {
        self.record(value.as_secs_f64());
    }

    pub fn record_duration_ms(&self, value: Duration) {
        self.record(value.as_secs_f64() * 1_000.0)
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let (counts, count, sum) = {
            let state = self.inner.state.lock();
            (state.counts.clone(), state.count, state.sum)
        };
        let buckets = counts[..self.inner.bounds.len()]
            .iter()
            .scan(0u64, |acc, c| {
                *acc += c;
                Some(*acc)
            })
            .collect();
        HistogramSnapshot {
            bounds: self.inner.bounds.to_vec(),
            buckets,
            count,
            sum,
        }
    }
}

fn validate_bounds(bounds: &[f64]) -> Result<()> {
    let finite = bounds.iter().all(|b| b.is_finite());
    let ascending = bounds.windows(2).all(|w| w[0] < w[1]);
    if finite && ascending {
        Ok(())
    } else {
        Err(Error::InvalidBuckets)
    }
}

impl super::sealed::Sealed for Histogram {}

impl Metric for Histogram {
    const KIND: MetricKind = MetricKind::Histogram;

    fn value(&self) -> MetricValue {
        let snapshot = self.snapshot();
        tracing::trace!(message = "histogram.value", count = snapshot.count, sum = snapshot.sum, buckets = ?snapshot.buckets);
        MetricValue::Histogram(snapshot)
    }

    fn family_map(maps: &FamilyMaps) -> &FamilyMap<Self> {
        &maps.histograms
    }
}
