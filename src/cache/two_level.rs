use std::collections::HashSet;

use parking_lot::Mutex;
use tracing::trace;

use super::TileCache;
use crate::tile::{CachedBitmap, TileKey};

/// Composition of a fast and a slow cache tier.
///
/// The slow tier receives every tile. The fast tier only receives tiles of
/// the current working set, plus tiles promoted on a slow-tier hit, so a
/// tile rendered once and never seen again does not crowd out visible ones.
pub struct TwoLevelCache<F, S> {
    fast: F,
    slow: S,
    working_set: Mutex<HashSet<TileKey>>,
}

impl<F: TileCache, S: TileCache> TwoLevelCache<F, S> {
    pub fn new(fast: F, slow: S) -> Self {
        Self {
            fast,
            slow,
            working_set: Mutex::new(HashSet::new()),
        }
    }

    /// The fast tier.
    pub fn fast(&self) -> &F {
        &self.fast
    }

    /// The slow tier.
    pub fn slow(&self) -> &S {
        &self.slow
    }
}

impl<F: TileCache, S: TileCache> TileCache for TwoLevelCache<F, S> {
    fn contains_key(&self, key: &TileKey) -> bool {
        self.fast.contains_key(key) || self.slow.contains_key(key)
    }

    fn get(&self, key: &TileKey) -> Option<CachedBitmap> {
        if let Some(bitmap) = self.fast.get(key) {
            return Some(bitmap);
        }
        let bitmap = self.slow.get(key)?;
        trace!(key = %key, "promoting tile into fast tier");
        self.fast.put(key.clone(), bitmap.clone());
        Some(bitmap)
    }

    fn get_immediately(&self, key: &TileKey) -> Option<CachedBitmap> {
        self.fast.get(key)
    }

    fn put(&self, key: TileKey, bitmap: CachedBitmap) {
        if self.working_set.lock().contains(&key) {
            self.fast.put(key.clone(), bitmap.clone());
        }
        self.slow.put(key, bitmap);
    }

    fn purge(&self) {
        self.fast.purge();
        self.slow.purge();
    }

    fn set_working_set(&self, keys: &HashSet<TileKey>) {
        *self.working_set.lock() = keys.clone();
        self.fast.set_working_set(keys);
        self.slow.set_working_set(keys);

        for key in keys {
            if self.fast.contains_key(key) {
                continue;
            }
            if let Some(bitmap) = self.slow.get(key) {
                self.fast.put(key.clone(), bitmap);
            }
        }
    }

    fn capacity(&self) -> usize {
        self.fast.capacity().max(self.slow.capacity())
    }

    fn capacity_first_level(&self) -> usize {
        self.fast.capacity()
    }

    fn destroy(&self) {
        self.fast.destroy();
        self.slow.destroy();
    }
}
