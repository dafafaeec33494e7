use std::{
    collections::BTreeMap,
    fmt,
    hash::{Hash, Hasher},
};

use smallvec::SmallVec;
use twox_hash::XxHash64;

use crate::error::{Error, Result};

const LID_SEED: u64 = 0xdeadbeef;

/// Borrowed, key-sorted label pairs. Most label sets are small enough to stay
/// on the stack.
pub(crate) type LabelPairs<'a> = SmallVec<[(&'a str, &'a str); 8]>;

/// An ordered-by-key set of label pairs. Two label sets are equal iff they hold
/// the same key/value pairs, which makes [`Labels`] the identity of a metric
/// instance within its family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Labels {
    inner: BTreeMap<String, String>,
}

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a label set from borrowed pairs. A later duplicate key overrides an
    /// earlier one.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        pairs.iter().copied().collect()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.inner.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Merge `labels` over these labels without allocating. Keys in `labels`
    /// win over ours, and a later duplicate within `labels` wins over an
    /// earlier one. The result is sorted by key.
    pub(crate) fn merged<'a>(&'a self, labels: &[(&'a str, &'a str)]) -> LabelPairs<'a> {
        let mut pairs: LabelPairs<'a> = self.iter().collect();
        for &(key, value) in labels {
            match pairs.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => pairs.push((key, value)),
            }
        }
        pairs.sort_unstable_by(|a, b| a.0.cmp(b.0));
        pairs
    }

    /// Compare against sorted borrowed pairs.
    pub(crate) fn matches(&self, pairs: &[(&str, &str)]) -> bool {
        self.len() == pairs.len()
            && self
                .iter()
                .zip(pairs)
                .all(|((k, v), (pk, pv))| k == *pk && v == *pv)
    }
}

impl<K, V> FromIterator<(K, V)> for Labels
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            inner: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Labels {
    fn from(pairs: [(&str, &str); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<&[(&str, &str)]> for Labels {
    fn from(pairs: &[(&str, &str)]) -> Self {
        Self::from_pairs(pairs)
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}={v:?}")?;
        }
        f.write_str("}")
    }
}

/// Calculate a label-set id. This is used as a pre-hashed key for the instance
/// maps inside a family.
/// NOTE: pairs **must** be sorted by key to get a stable lid.
pub(crate) fn lid(pairs: &[(&str, &str)]) -> u64 {
    debug_assert!(pairs.windows(2).all(|w| w[0].0 < w[1].0));
    let mut hasher = XxHash64::with_seed(LID_SEED);
    pairs.hash(&mut hasher);
    hasher.finish()
}

/// Label names follow `[a-zA-Z_][a-zA-Z0-9_]*`, and the `__` prefix is
/// reserved for internal use by scrapers.
pub(crate) fn validate_label_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && !name.starts_with("__")
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidLabelName(name.to_string()))
    }
}
