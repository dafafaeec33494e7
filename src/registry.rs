use std::{collections::HashSet, sync::Arc};

use parking_lot::RwLock;

use crate::{
    labels::Labels,
    metrics::{MetricKind, MetricValue},
};

/// One instance of a family as seen by a scrape.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub labels: Labels,
    pub value: MetricValue,
}

/// A point-in-time copy of a family. Samples are sorted by labels.
#[derive(Clone, Debug, PartialEq)]
pub struct FamilySnapshot {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub samples: Vec<Sample>,
}

impl FamilySnapshot {
    pub fn sample(&self, labels: &Labels) -> Option<&MetricValue> {
        self.samples
            .iter()
            .find(|s| &s.labels == labels)
            .map(|s| &s.value)
    }
}

/// The registry's view of a family: something that can be named and
/// snapshotted without knowing its metric kind statically.
pub(crate) trait Collect: Send + Sync + 'static {
    fn kind(&self) -> MetricKind;

    fn name(&self) -> &str;

    fn collect(&self) -> FamilySnapshot;
}

/// The set of all families across all kinds, in registration order. The
/// registry is shared between the [`crate::Metrics`] facade that fills it and
/// the [`crate::Exposer`] that reads it during scrapes.
#[derive(Default)]
pub struct Registry {
    families: RwLock<Vec<Arc<dyn Collect>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            families: Default::default(),
        }
    }

    /// Add a family, replacing any family of the same kind and name in place.
    /// Returns true if something was replaced.
    ///
    /// Kinds have separate namespaces, but an exposition can only carry one
    /// family per name. When the name is already taken by another kind the
    /// family is still stored, and [`Registry::gather`] leaves it out.
    pub(crate) fn register(&self, family: Arc<dyn Collect>) -> bool {
        let mut families = self.families.write();
        if let Some(other) = families
            .iter()
            .find(|f| f.kind() != family.kind() && f.name() == family.name())
        {
            tracing::error!(
                message = "family name already used by another kind, it will not be exposed",
                name = family.name(),
                kind = %family.kind(),
                exposed_kind = %other.kind()
            );
        }
        match families
            .iter_mut()
            .find(|f| f.kind() == family.kind() && f.name() == family.name())
        {
            Some(slot) => {
                *slot = family;
                true
            }
            None => {
                families.push(family);
                false
            }
        }
    }

    /// Snapshot every family. Each instance is read independently, there is no
    /// atomicity across instances.
    ///
    /// Names are unique in the result: when families of different kinds share
    /// a name, only the earliest registered one is gathered.
    pub fn gather(&self) -> Vec<FamilySnapshot> {
        // Clone the handles out so that collection doesn't hold the registry
        // lock while it walks instance maps.
        let families: Vec<Arc<dyn Collect>> = self.families.read().clone();
        let mut seen = HashSet::with_capacity(families.len());
        families
            .iter()
            .filter(|f| seen.insert(f.name()))
            .map(|f| f.collect())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.families.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.read().is_empty()
    }
}
