//! Tile cache hierarchy.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     TwoLevelCache                         │
//! │   get: fast ──miss──► slow ──hit──► promote into fast     │
//! │   put: slow always, fast only for working-set keys        │
//! │  ┌─────────────────────┐      ┌─────────────────────────┐ │
//! │  │ MemoryCache         │      │ FileCache               │ │
//! │  │ TileKey → bitmap    │      │ TileKey → path on disk  │ │
//! │  └──────────┬──────────┘      └────────────┬────────────┘ │
//! └─────────────┼──────────────────────────────┼──────────────┘
//!               ▼                              ▼
//!        WorkingSetCache  ───────────►  LruCache (slot arena)
//! ```
//!
//! # Components
//!
//! - [`LruCache`]: access-ordered arena with O(1) touch and evict, handing
//!   displaced entries back to the owner
//! - [`WorkingSetCache`]: LRU that keeps the visible tiles resident
//! - [`MemoryCache`]: shared bitmap handles in memory
//! - [`FileCache`]: PNG files under `<root>/<zoom>/<x>/<y>.tile`
//! - [`TwoLevelCache`]: composes a fast and a slow tier
//!
//! All tiers implement [`TileCache`] and lock internally, so they can be
//! shared across the worker pool and the display thread.

mod file;
mod lru;
mod memory;
mod two_level;
mod working_set;

use std::collections::HashSet;
use std::sync::Arc;

use crate::tile::{CachedBitmap, TileKey};

pub use file::{FileCache, FileCacheOptions, CACHE_INDEX_FILE_NAME, TILE_FILE_EXTENSION};
pub use lru::{IterLru, LruCache};
pub use memory::{MemoryCache, DEFAULT_MEMORY_CACHE_CAPACITY};
pub use two_level::TwoLevelCache;
pub use working_set::WorkingSetCache;

/// A store of rendered tiles.
///
/// Failures inside a tier never surface here: a tier that cannot read an
/// entry reports a miss, and a tier that cannot write stops storing.
pub trait TileCache: Send + Sync {
    /// Whether a tile is stored, without touching its recency.
    fn contains_key(&self, key: &TileKey) -> bool;

    /// Fetch a tile, marking it recently used.
    fn get(&self, key: &TileKey) -> Option<CachedBitmap>;

    /// Fetch a tile only if it can be served without slow I/O.
    fn get_immediately(&self, key: &TileKey) -> Option<CachedBitmap>;

    /// Store a tile, replacing any previous bitmap for the key.
    fn put(&self, key: TileKey, bitmap: CachedBitmap);

    /// Remove every tile.
    fn purge(&self);

    /// Replace the set of currently visible tiles.
    fn set_working_set(&self, keys: &HashSet<TileKey>);

    /// Maximum number of tiles.
    fn capacity(&self) -> usize;

    /// Maximum number of tiles in the fastest tier.
    fn capacity_first_level(&self) -> usize;

    /// Release all resources; persistent tiers save their state.
    fn destroy(&self);
}

impl<T: TileCache + ?Sized> TileCache for Arc<T> {
    fn contains_key(&self, key: &TileKey) -> bool {
        (**self).contains_key(key)
    }

    fn get(&self, key: &TileKey) -> Option<CachedBitmap> {
        (**self).get(key)
    }

    fn get_immediately(&self, key: &TileKey) -> Option<CachedBitmap> {
        (**self).get_immediately(key)
    }

    fn put(&self, key: TileKey, bitmap: CachedBitmap) {
        (**self).put(key, bitmap)
    }

    fn purge(&self) {
        (**self).purge()
    }

    fn set_working_set(&self, keys: &HashSet<TileKey>) {
        (**self).set_working_set(keys)
    }

    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn capacity_first_level(&self) -> usize {
        (**self).capacity_first_level()
    }

    fn destroy(&self) {
        (**self).destroy()
    }
}
