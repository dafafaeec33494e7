use std::{
    hash::{BuildHasher, Hasher},
    sync::atomic::{AtomicU64, Ordering},
};

/// Pass a u64 value straight through as the hash. This is only useful if you
/// are pre-hashing a `HashMap` key and don't want to do duplicate the work.
pub struct NoopHasher {
    inner: u64,
}

impl Hasher for NoopHasher {
    fn finish(&self) -> u64 {
        self.inner
    }

    fn write(&mut self, _bytes: &[u8]) {
        debug_assert!(
            false,
            "NoopHasher only supports u64s that were already hashed"
        )
    }

    fn write_u64(&mut self, i: u64) {
        self.inner = i;
    }
}

/// An implementation of [`BuildHasher`] that just passes a u64 key straight
/// through.
#[derive(Default, Debug, Clone, Copy)]
pub struct BuildNoopHasher;

impl BuildHasher for BuildNoopHasher {
    type Hasher = NoopHasher;

    fn build_hasher(&self) -> Self::Hasher {
        NoopHasher { inner: 0 }
    }
}

/// An f64 stored as raw bits in an [`AtomicU64`]. There is no native atomic
/// float, so read-modify-write goes through a CAS loop.
#[derive(Debug, Default)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed)
    }

    pub fn fetch_add(&self, delta: f64) -> f64 {
        // The closure never returns None, so fetch_update can't fail.
        let prev = self
            .bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + delta).to_bits())
            })
            .unwrap_or_else(|bits| bits);
        f64::from_bits(prev)
    }
}
