use std::sync::Arc;

use super::{Metric, MetricKind, MetricValue};
use crate::{
    facade::{FamilyMap, FamilyMaps},
    utils::AtomicF64,
};

/// A monotonic counter. The value only ever goes up; deltas that are negative,
/// zero or NaN are dropped on the floor instead of being reported, since
/// instrumentation must never interrupt the code it instruments.
#[derive(Clone, Default, Debug)]
pub struct Counter {
    inner: Arc<AtomicF64>,
}

impl Counter {
    pub fn incr_by(&self, value: f64) {
        // NaN fails this comparison too.
        if value > 0.0 {
            self.inner.fetch_add(value);
        }
    }

    pub fn incr(&self) {
        self.incr_by(1.0);
    }

    pub fn get(&self) -> f64 {
        self.inner.load()
    }
}

impl super::sealed::Sealed for Counter {}

impl Metric for Counter {
    const KIND: MetricKind = MetricKind::Counter;

    fn value(&self) -> MetricValue {
        MetricValue::Counter(self.get())
    }

    fn family_map(maps: &FamilyMaps) -> &FamilyMap<Self> {
        &maps.counters
    }
}
