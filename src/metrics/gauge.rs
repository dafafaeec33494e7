use std::sync::Arc;

use super::{Metric, MetricKind, MetricValue};
use crate::{
    facade::{FamilyMap, FamilyMaps},
    utils::AtomicF64,
};

#[derive(Clone, Default, Debug)]
pub struct Gauge {
    inner: Arc<AtomicF64>,
}

impl Gauge {
    pub fn incr_by(&self, value: f64) {
        self.inner.fetch_add(value);
    }

    pub fn incr(&self) {
        self.incr_by(1.0);
    }

    pub fn decr_by(&self, value: f64) {
        self.incr_by(-value)
    }

    pub fn decr(&self) {
        self.decr_by(1.0)
    }

    pub fn set(&self, value: f64) {
        self.inner.store(value)
    }

    pub fn get(&self) -> f64 {
        self.inner.load()
    }
}

impl super::sealed::Sealed for Gauge {}

impl Metric for Gauge {
    const KIND: MetricKind = MetricKind::Gauge;

    fn value(&self) -> MetricValue {
        MetricValue::Gauge(self.get())
    }

    fn family_map(maps: &FamilyMaps) -> &FamilyMap<Self> {
        &maps.gauges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_is_last_write_wins() {
        let gauge = Gauge::default();
        gauge.set(10.0);
        gauge.set(-3.0);
        assert_eq!(gauge.get(), -3.0);
    }

    #[test]
    fn up_and_down() {
        let gauge = Gauge::default();
        gauge.incr();
        gauge.incr_by(4.0);
        gauge.decr();
        gauge.decr_by(0.5);
        assert_eq!(gauge.value(), MetricValue::Gauge(3.5));
    }
}
