use std::{fmt, marker::PhantomData, sync::Arc};

use dashmap::DashMap;
use smallvec::SmallVec;

use crate::{
    error::{Error, Result},
    labels::{lid, validate_label_name, Labels},
    metrics::{counter::Counter, gauge::Gauge, histogram::Histogram, Metric, MetricKind},
    registry::{Collect, FamilySnapshot, Sample},
    utils::BuildNoopHasher,
    Metrics,
};

/// Instances keyed by their pre-hashed label-set id. Colliding label sets share
/// a slot vector, which nearly always holds exactly one entry.
type InstanceMap<M> = DashMap<u64, SmallVec<[(Labels, M); 1]>, BuildNoopHasher>;

pub(crate) struct FamilyInner<M> {
    name: String,
    help: String,
    base: Labels,
    instances: InstanceMap<M>,
}

/// A named, typed group of metric instances that share a help string and a set
/// of base labels. Instances are told apart by their full label set, base
/// labels merged with the labels given at resolve time.
///
/// `Family` is a cheap handle; clones point at the same instances.
pub struct Family<M: Metric> {
    inner: Arc<FamilyInner<M>>,
}

impl<M: Metric> Clone for Family<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<M: Metric> fmt::Debug for Family<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Family")
            .field("kind", &M::KIND)
            .field("name", &self.inner.name)
            .field("base", &self.inner.base)
            .field("instances", &self.len())
            .finish()
    }
}

impl<M: Metric> Family<M> {
    pub(crate) fn new(name: &str, help: &str, base_labels: &[(&str, &str)]) -> Result<Self> {
        validate_metric_name(name)?;
        let base = Labels::from_pairs(base_labels);
        for (key, _) in base.iter() {
            validate_label_key::<M>(key)?;
        }
        Ok(Self {
            inner: Arc::new(FamilyInner {
                name: name.to_string(),
                help: help.to_string(),
                base,
                instances: DashMap::with_hasher(BuildNoopHasher),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn help(&self) -> &str {
        &self.inner.help
    }

    pub fn base_labels(&self) -> &Labels {
        &self.inner.base
    }

    /// Number of distinct instances created so far.
    pub fn len(&self) -> usize {
        self.inner.instances.iter().map(|slots| slots.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn collectable(&self) -> Arc<dyn Collect> {
        self.inner.clone()
    }

    /// Resolving is a fairly heavy weight operation: we merge and sort labels,
    /// hash them and take a shard lock. Callers on a hot path should resolve
    /// once and keep the returned handle around; bumping a cached handle is
    /// coordination free for counters and gauges.
    fn resolve_with<F>(&self, labels: &[(&str, &str)], make: F) -> Result<M>
    where
        F: FnOnce() -> Result<M>,
    {
        let merged = self.inner.base.merged(labels);
        let lid = lid(&merged);
        if let Some(slots) = self.inner.instances.get(&lid) {
            if let Some((_, metric)) = slots.iter().find(|(l, _)| l.matches(&merged)) {
                return Ok(metric.clone());
            }
        }

        // Only pay for validation when we are about to create something.
        for (key, _) in labels {
            validate_label_key::<M>(key)?;
        }
        let mut slots = self.inner.instances.entry(lid).or_default();
        // Someone may have raced us between the read and the write lock.
        if let Some((_, metric)) = slots.iter().find(|(l, _)| l.matches(&merged)) {
            return Ok(metric.clone());
        }
        let metric = make()?;
        let labels: Labels = merged.iter().copied().collect();
        tracing::debug!(message = "created metric instance", kind = %M::KIND, family = %self.inner.name, labels = %labels);
        slots.push((labels, metric.clone()));
        Ok(metric)
    }
}

impl Family<Counter> {
    /// Look up or create the counter for `labels` merged over the base labels.
    /// Slow, avoid in hot loops; prefer resolving once and caching the handle.
    pub fn add(&self, labels: &[(&str, &str)]) -> Result<Counter> {
        self.resolve_with(labels, || Ok(Counter::default()))
    }
}

impl Family<Gauge> {
    /// Look up or create the gauge for `labels` merged over the base labels.
    /// Slow, avoid in hot loops; prefer resolving once and caching the handle.
    pub fn add(&self, labels: &[(&str, &str)]) -> Result<Gauge> {
        self.resolve_with(labels, || Ok(Gauge::default()))
    }
}

impl Family<Histogram> {
    /// Look up or create the histogram for `labels` merged over the base
    /// labels.
    ///
    /// `bounds` are only used when the instance is created. Once a histogram
    /// exists for a label set its bucket edges are fixed, and a later call with
    /// different `bounds` gets the original histogram back (a warning is
    /// logged). Pick one set of bounds per family and stick with it.
    pub fn add(&self, labels: &[(&str, &str)], bounds: &[f64]) -> Result<Histogram> {
        let histogram = self.resolve_with(labels, || Histogram::new(bounds))?;
        if histogram.bounds() != bounds {
            tracing::warn!(message = "histogram already exists with different bucket boundaries, keeping the original", family = %self.inner.name, existing = ?histogram.bounds(), requested = ?bounds);
        }
        Ok(histogram)
    }
}

impl<M: Metric> Collect for FamilyInner<M> {
    fn kind(&self) -> MetricKind {
        M::KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn collect(&self) -> FamilySnapshot {
        let mut samples = Vec::with_capacity(self.instances.len());
        for slots in self.instances.iter() {
            for (labels, metric) in slots.value() {
                samples.push(Sample {
                    labels: labels.clone(),
                    value: metric.value(),
                });
            }
        }
        samples.sort_by(|a, b| a.labels.cmp(&b.labels));
        FamilySnapshot {
            name: self.name.clone(),
            help: self.help.clone(),
            kind: M::KIND,
            samples,
        }
    }
}

/// Metric names follow `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub(crate) fn validate_metric_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidMetricName(name.to_string()))
    }
}

/// Histograms render their bucket edge as the `le` label, so it can't be used
/// as a regular label on a histogram family.
fn validate_label_key<M: Metric>(key: &str) -> Result<()> {
    validate_label_name(key)?;
    if M::KIND == MetricKind::Histogram && key == "le" {
        return Err(Error::InvalidLabelName(key.to_string()));
    }
    Ok(())
}

/// A constant definition of a metric family. Provides a single spot for
/// defining the schema of a family at compile time; [`FamilyDef::register`]
/// declares it on a [`Metrics`] at runtime.
///
/// ```
/// use pullmetrics::{CounterDef, Metrics};
///
/// const REQUESTS: CounterDef = CounterDef::new("requests_total", "Number of handled requests");
///
/// let metrics = Metrics::new();
/// let requests = REQUESTS.register(&metrics, &[("service", "api")]).unwrap();
/// requests.add(&[("method", "GET")]).unwrap().incr();
/// ```
pub struct FamilyDef<M> {
    name: &'static str,
    help: &'static str,
    _kind: PhantomData<M>,
}

pub type CounterDef = FamilyDef<Counter>;
pub type GaugeDef = FamilyDef<Gauge>;
pub type HistogramDef = FamilyDef<Histogram>;

impl<M: Metric> FamilyDef<M> {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            _kind: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn register(&self, metrics: &Metrics, base_labels: &[(&str, &str)]) -> Result<Family<M>> {
        metrics.add_family(self.name, self.help, base_labels)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;
    use crate::metrics::MetricValue;

    #[test]
    fn same_labels_same_instance() {
        let family = Family::<Counter>::new("requests_total", "help", &[("service", "api")]).unwrap();
        let a = family.add(&[("method", "GET"), ("code", "200")]).unwrap();
        let b = family.add(&[("code", "200"), ("method", "GET")]).unwrap();
        a.incr();
        b.incr();
        assert_eq!(family.len(), 1);
        assert_eq!(a.get(), 2.0);
    }

    #[test]
    fn caller_labels_override_base() {
        let family = Family::<Gauge>::new("temperature", "help", &[("zone", "a")]).unwrap();
        family.add(&[("zone", "b")]).unwrap().set(1.0);
        family.add(&[]).unwrap().set(2.0);
        let snapshot = family.inner.collect();
        let labels: Vec<String> = snapshot.samples.iter().map(|s| s.labels.to_string()).collect();
        assert_eq!(labels, vec![r#"{zone="a"}"#, r#"{zone="b"}"#]);
        assert_eq!(snapshot.samples[1].value, MetricValue::Gauge(1.0));
    }

    #[test]
    fn histogram_bounds_first_write_wins() {
        let family = Family::<Histogram>::new("latency", "help", &[]).unwrap();
        let first = family.add(&[("op", "read")], &[1.0, 2.0]).unwrap();
        let second = family.add(&[("op", "read")], &[10.0, 20.0]).unwrap();
        assert_eq!(second.bounds(), &[1.0, 2.0]);
        first.record(1.5);
        second.record(15.0);
        let snap = first.snapshot();
        assert_eq!(snap.buckets, vec![0, 1]);
        assert_eq!(snap.count, 2);
        assert_eq!(family.len(), 1);
    }

    #[test]
    fn invalid_names() {
        assert!(matches!(
            Family::<Counter>::new("bad name", "", &[]),
            Err(Error::InvalidMetricName(_))
        ));
        assert!(matches!(
            Family::<Counter>::new("ok:name_1", "", &[("1bad", "x")]),
            Err(Error::InvalidLabelName(_))
        ));
        assert!(matches!(
            Family::<Histogram>::new("latency", "", &[("le", "x")]),
            Err(Error::InvalidLabelName(_))
        ));
        // le is only reserved on histograms
        assert!(Family::<Gauge>::new("ratio", "", &[("le", "x")]).is_ok());
    }

    #[test]
    fn invalid_label_creates_nothing() {
        let family = Family::<Counter>::new("requests_total", "", &[]).unwrap();
        assert!(family.add(&[("__name__", "x")]).is_err());
        let hist = Family::<Histogram>::new("latency", "", &[]).unwrap();
        assert!(hist.add(&[("le", "1")], &[1.0]).is_err());
        assert!(hist.add(&[("op", "read")], &[3.0, 1.0]).is_err());
        assert!(family.is_empty());
        assert!(hist.is_empty());
    }

    #[test]
    fn concurrent_resolve() {
        let family = Arc::new(Family::<Counter>::new("hits_total", "", &[]).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let family = family.clone();
                thread::spawn(move || {
                    let shard = if i % 2 == 0 { "even" } else { "odd" };
                    for _ in 0..500 {
                        family.add(&[("shard", shard)]).unwrap().incr();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(family.len(), 2);
        assert_eq!(family.add(&[("shard", "even")]).unwrap().get(), 2000.0);
        assert_eq!(family.add(&[("shard", "odd")]).unwrap().get(), 2000.0);
    }
}
