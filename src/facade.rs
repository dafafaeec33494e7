use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use parking_lot::{Mutex, RwLock};

use crate::{
    encoding,
    error::{Error, Result},
    exposer::{Exposer, ExposerConfig},
    family::Family,
    metrics::{counter::Counter, gauge::Gauge, histogram::Histogram, Metric},
    registry::Registry,
};

#[doc(hidden)]
pub type FamilyMap<M> = RwLock<HashMap<String, Family<M>>>;

/// One name→family map per metric kind. Kinds never share a map, so the same
/// name can be used by a counter and a gauge without colliding.
#[doc(hidden)]
#[derive(Default)]
pub struct FamilyMaps {
    pub(crate) counters: FamilyMap<Counter>,
    pub(crate) gauges: FamilyMap<Gauge>,
    pub(crate) histograms: FamilyMap<Histogram>,
}

/// The mutation half of [`Metrics`]. Components that only record events can
/// take a `&dyn Recorder` instead of the whole facade.
pub trait Recorder: Send + Sync {
    fn increment(&self, name: &str, labels: &[(&str, &str)], value: f64);

    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64);

    fn observe(&self, name: &str, labels: &[(&str, &str)], value: f64, bounds: &[f64]);
}

/// Single entry point for declaring metric families, mutating their instances
/// by name and exposing everything for scraping.
///
/// Mutations never fail from the caller's point of view: an unknown family,
/// invalid labels or invalid bucket boundaries are logged through `tracing`
/// and the call becomes a no-op. A missing metric is a monitoring gap, not an
/// outage.
///
/// Families are expected to be declared once during start up. Mutations are
/// safe to call from any number of threads at once.
pub struct Metrics {
    registry: Arc<Registry>,
    families: FamilyMaps,
    exposer: Mutex<Option<Exposer>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::with_registry(Arc::new(Registry::new()))
    }

    pub fn with_registry(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            families: FamilyMaps::default(),
            exposer: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Declare a family of kind `M`.
    ///
    /// Registering a name twice for the same kind is a configuration bug: it is
    /// logged as an error and the new family replaces the old one, both for
    /// lookups by name and for scrapes. The returned handle is always the new
    /// family; handles to the old one keep working but are no longer exposed.
    ///
    /// Fails only if the name or one of the base label names is invalid.
    pub fn add_family<M: Metric>(
        &self,
        name: &str,
        help: &str,
        base_labels: &[(&str, &str)],
    ) -> Result<Family<M>> {
        let family = Family::<M>::new(name, help, base_labels).inspect_err(|e| {
            tracing::error!(message = "invalid family definition", kind = %M::KIND, family = name, error = %e);
        })?;
        let mut families = M::family_map(&self.families).write();
        if families.contains_key(name) {
            tracing::error!(message = "family already registered, replacing it", kind = %M::KIND, family = name);
        }
        families.insert(name.to_string(), family.clone());
        self.registry.register(family.collectable());
        tracing::debug!(message = "registered family", kind = %M::KIND, family = name);
        Ok(family)
    }

    pub fn add_counter_family(
        &self,
        name: &str,
        help: &str,
        base_labels: &[(&str, &str)],
    ) -> Result<Family<Counter>> {
        self.add_family(name, help, base_labels)
    }

    pub fn add_gauge_family(
        &self,
        name: &str,
        help: &str,
        base_labels: &[(&str, &str)],
    ) -> Result<Family<Gauge>> {
        self.add_family(name, help, base_labels)
    }

    pub fn add_histogram_family(
        &self,
        name: &str,
        help: &str,
        base_labels: &[(&str, &str)],
    ) -> Result<Family<Histogram>> {
        self.add_family(name, help, base_labels)
    }

    pub fn family<M: Metric>(&self, name: &str) -> Option<Family<M>> {
        M::family_map(&self.families).read().get(name).cloned()
    }

    pub fn counter_family(&self, name: &str) -> Option<Family<Counter>> {
        self.family(name)
    }

    pub fn gauge_family(&self, name: &str) -> Option<Family<Gauge>> {
        self.family(name)
    }

    pub fn histogram_family(&self, name: &str) -> Option<Family<Histogram>> {
        self.family(name)
    }

    /// Increase the counter for `labels` in family `name` by `value`. Negative
    /// values are ignored by the counter.
    pub fn increment(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        if let Err(e) = self.try_increment(name, labels, value) {
            report(name, &e);
        }
    }

    /// Increase the counter for `labels` in family `name` by one.
    pub fn incr(&self, name: &str, labels: &[(&str, &str)]) {
        self.increment(name, labels, 1.0)
    }

    pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        if let Err(e) = self.try_set_gauge(name, labels, value) {
            report(name, &e);
        }
    }

    /// Record `value` into the histogram for `labels` in family `name`.
    ///
    /// `bounds` only matter the first time a label set is seen. After that the
    /// histogram keeps its original bucket edges and any different `bounds`
    /// are ignored (with a warning).
    pub fn observe(&self, name: &str, labels: &[(&str, &str)], value: f64, bounds: &[f64]) {
        if let Err(e) = self.try_observe(name, labels, value, bounds) {
            report(name, &e);
        }
    }

    fn lookup<M: Metric>(&self, name: &str) -> Result<Family<M>> {
        self.family::<M>(name).ok_or_else(|| Error::FamilyNotFound {
            kind: M::KIND,
            name: name.to_string(),
        })
    }

    fn try_increment(&self, name: &str, labels: &[(&str, &str)], value: f64) -> Result<()> {
        self.lookup::<Counter>(name)?.add(labels)?.incr_by(value);
        Ok(())
    }

    fn try_set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) -> Result<()> {
        self.lookup::<Gauge>(name)?.add(labels)?.set(value);
        Ok(())
    }

    fn try_observe(
        &self,
        name: &str,
        labels: &[(&str, &str)],
        value: f64,
        bounds: &[f64],
    ) -> Result<()> {
        self.lookup::<Histogram>(name)?
            .add(labels, bounds)?
            .record(value);
        Ok(())
    }

    /// Start exposing the registry on `endpoint` (`host:port`) under
    /// [`crate::DEFAULT_PATH`]. Returns the bound address.
    ///
    /// A bind failure is logged and returned; whether that is fatal is up to
    /// the caller.
    pub fn serve(&self, endpoint: &str) -> Result<SocketAddr> {
        self.serve_with(&ExposerConfig::default().with_endpoint(endpoint))
    }

    /// Like [`Metrics::serve`] with full control over the exposer. A running
    /// exposer is stopped before the new one binds.
    pub fn serve_with(&self, config: &ExposerConfig) -> Result<SocketAddr> {
        let mut exposer = self.exposer.lock();
        if let Some(previous) = exposer.take() {
            tracing::warn!(message = "exposer already running, restarting it", addr = %previous.local_addr());
            previous.stop();
        }
        match Exposer::bind(config, self.registry.clone()) {
            Ok(started) => {
                let addr = started.local_addr();
                *exposer = Some(started);
                Ok(addr)
            }
            Err(e) => {
                tracing::error!(message = "failed to start exposer", endpoint = %config.endpoint, error = %e);
                Err(e)
            }
        }
    }

    pub fn stop(&self) {
        if let Some(exposer) = self.exposer.lock().take() {
            exposer.stop();
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.exposer.lock().as_ref().map(Exposer::local_addr)
    }

    /// Render the current state in the text exposition format, for callers
    /// that want to serve it from their own HTTP stack.
    pub fn render(&self) -> String {
        encoding::encode(&self.registry.gather())
    }
}

impl Recorder for Metrics {
    fn increment(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        Metrics::increment(self, name, labels, value)
    }

    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        Metrics::set_gauge(self, name, labels, value)
    }

    fn observe(&self, name: &str, labels: &[(&str, &str)], value: f64, bounds: &[f64]) {
        Metrics::observe(self, name, labels, value, bounds)
    }
}

fn report(name: &str, error: &Error) {
    tracing::error!(message = "metric update dropped", family = name, error = %error);
}
