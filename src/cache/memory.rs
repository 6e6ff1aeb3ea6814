use std::collections::HashSet;

use parking_lot::Mutex;
use tracing::trace;

use super::working_set::WorkingSetCache;
use super::TileCache;
use crate::tile::{CachedBitmap, TileKey};

/// Default number of tiles held in memory.
pub const DEFAULT_MEMORY_CACHE_CAPACITY: usize = 64;

/// In-memory tile cache.
///
/// Holds one [`CachedBitmap`] handle per key. Handing out a bitmap clones
/// the handle; evicting, replacing or purging drops the cache's handle, so
/// the pixels stay alive for every other holder.
///
/// # Example
///
/// ```
/// use tileforge::cache::{MemoryCache, TileCache};
/// use tileforge::tile::{CachedBitmap, RenderParams, Tile, TileBitmap, TileKey};
/// use image::Rgba;
///
/// let cache = MemoryCache::new(16);
/// let key = TileKey::new(Tile::new(1, 2, 3, 256), false, RenderParams::default());
/// let bitmap = CachedBitmap::new(TileBitmap::filled(256, 256, Rgba([0, 0, 0, 255])));
///
/// cache.put(key.clone(), bitmap.clone());
/// assert!(cache.get(&key).unwrap().ptr_eq(&bitmap));
/// ```
pub struct MemoryCache {
    cache: Mutex<WorkingSetCache<TileKey, CachedBitmap>>,
}

impl MemoryCache {
    /// Create a cache holding at most `capacity` tiles.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(WorkingSetCache::new(capacity)),
        }
    }

    /// Number of cached tiles.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Check if no tile is cached.
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CACHE_CAPACITY)
    }
}

impl TileCache for MemoryCache {
    fn contains_key(&self, key: &TileKey) -> bool {
        self.cache.lock().contains_key(key)
    }

    fn get(&self, key: &TileKey) -> Option<CachedBitmap> {
        self.cache.lock().get(key).cloned()
    }

    fn get_immediately(&self, key: &TileKey) -> Option<CachedBitmap> {
        self.get(key)
    }

    fn put(&self, key: TileKey, bitmap: CachedBitmap) {
        let displaced = self.cache.lock().put(key, bitmap);
        // Released outside the lock
        if let Some((key, _bitmap)) = displaced {
            trace!(key = %key, "released tile from memory cache");
        }
    }

    fn purge(&self) {
        let entries = self.cache.lock().drain();
        trace!(count = entries.len(), "purged memory cache");
    }

    fn set_working_set(&self, keys: &HashSet<TileKey>) {
        self.cache.lock().set_working_set(keys);
    }

    fn capacity(&self) -> usize {
        self.cache.lock().capacity()
    }

    fn capacity_first_level(&self) -> usize {
        self.capacity()
    }

    fn destroy(&self) {
        self.purge();
    }
}
