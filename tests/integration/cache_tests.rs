//! Tile cache integration tests.
//!
//! Tests verify:
//! - The two-level cache over a memory and a disk tier
//! - Persistent disk caches surviving a restart
//! - Working-set aware eviction
//! - Concurrent access from several threads

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use image::Rgba;

use tileforge::cache::{FileCache, FileCacheOptions, MemoryCache, TileCache, TwoLevelCache};
use tileforge::tile::{CachedBitmap, RenderParams, Tile, TileBitmap, TileKey};

fn key(x: u32, y: u32) -> TileKey {
    TileKey::new(Tile::new(x, y, 11, 16), false, RenderParams::default())
}

fn bitmap(shade: u8) -> CachedBitmap {
    CachedBitmap::new(TileBitmap::filled(16, 16, Rgba([shade, shade, shade, 255])))
}

fn persistent_options(capacity: usize) -> FileCacheOptions {
    FileCacheOptions {
        capacity,
        persistent: true,
        tile_size: 16,
        ..Default::default()
    }
}

/// A persistent disk cache whose startup scan has finished.
fn file_cache(root: &Path, capacity: usize) -> FileCache {
    let cache = FileCache::new(root, persistent_options(capacity)).unwrap();
    cache.wait_for_scan();
    cache
}

fn count_tile_files(root: &Path) -> usize {
    fn walk(dir: &Path, count: &mut usize) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, count);
            } else if path.extension().is_some_and(|ext| ext == "tile") {
                *count += 1;
            }
        }
    }
    let mut count = 0;
    walk(root, &mut count);
    count
}

fn first_pixel(bitmap: &CachedBitmap) -> Rgba<u8> {
    *bitmap.pixels().get_pixel(0, 0)
}

// =============================================================================
// Two-Level Cache
// =============================================================================

#[test]
fn test_slow_hit_promotes_into_memory() {
    let dir = tempfile::tempdir().unwrap();
    let cache = TwoLevelCache::new(
        MemoryCache::new(4),
        file_cache(dir.path(), 16),
    );

    cache.put(key(1, 1), bitmap(10));
    assert!(!cache.fast().contains_key(&key(1, 1)));
    assert!(cache.slow().contains_key(&key(1, 1)));

    let loaded = cache.get(&key(1, 1)).unwrap();
    assert_eq!(first_pixel(&loaded), Rgba([10, 10, 10, 255]));
    assert!(cache.fast().contains_key(&key(1, 1)));
    assert!(cache.get_immediately(&key(1, 1)).is_some());
}

#[test]
fn test_working_set_goes_to_memory() {
    let dir = tempfile::tempdir().unwrap();
    let cache = TwoLevelCache::new(
        MemoryCache::new(4),
        file_cache(dir.path(), 16),
    );

    let visible: HashSet<TileKey> = [key(2, 2)].into_iter().collect();
    cache.set_working_set(&visible);
    cache.put(key(2, 2), bitmap(20));
    cache.put(key(3, 3), bitmap(30));

    assert!(cache.fast().contains_key(&key(2, 2)));
    assert!(!cache.fast().contains_key(&key(3, 3)));
    assert_eq!(cache.capacity(), 16);
    assert_eq!(cache.capacity_first_level(), 4);
}

#[test]
fn test_persistent_cache_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let cache = TwoLevelCache::new(
            MemoryCache::new(4),
            file_cache(dir.path(), 16),
        );
        for i in 0..3 {
            cache.put(key(i, i), bitmap(i as u8 * 50));
        }
        cache.destroy();
    }
    assert_eq!(count_tile_files(dir.path()), 3);

    let cache = TwoLevelCache::new(MemoryCache::new(4), file_cache(dir.path(), 16));

    assert_eq!(cache.slow().len(), 3);
    let restored = cache.get(&key(2, 2)).unwrap();
    assert_eq!(first_pixel(&restored), Rgba([100, 100, 100, 255]));
}

#[test]
fn test_non_persistent_cache_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let options = FileCacheOptions {
        persistent: false,
        ..persistent_options(16)
    };
    let cache = FileCache::new(dir.path(), options).unwrap();

    cache.put(key(1, 2), bitmap(1));
    cache.put(key(3, 4), bitmap(2));
    assert_eq!(count_tile_files(dir.path()), 2);

    cache.destroy();
    assert_eq!(count_tile_files(dir.path()), 0);
}

#[test]
fn test_purge_clears_both_tiers() {
    let dir = tempfile::tempdir().unwrap();
    let cache = TwoLevelCache::new(
        MemoryCache::new(4),
        file_cache(dir.path(), 16),
    );
    cache.put(key(1, 1), bitmap(1));
    cache.get(&key(1, 1));

    cache.purge();
    assert!(!cache.contains_key(&key(1, 1)));
    assert!(cache.fast().is_empty());
    assert_eq!(count_tile_files(dir.path()), 0);
}

// =============================================================================
// Eviction
// =============================================================================

#[test]
fn test_disk_capacity_bounds_files() {
    let dir = tempfile::tempdir().unwrap();
    let cache = file_cache(dir.path(), 2);

    for i in 0..5 {
        cache.put(key(i, 0), bitmap(i as u8));
    }

    assert_eq!(cache.len(), 2);
    assert_eq!(count_tile_files(dir.path()), 2);
    assert!(cache.contains_key(&key(3, 0)));
    assert!(cache.contains_key(&key(4, 0)));
}

#[test]
fn test_visible_tiles_survive_eviction() {
    let cache = MemoryCache::new(2);
    let visible: HashSet<TileKey> = [key(0, 0)].into_iter().collect();
    cache.set_working_set(&visible);

    cache.put(key(0, 0), bitmap(0));
    for i in 1..10 {
        cache.put(key(i, 0), bitmap(i as u8));
    }

    assert!(cache.contains_key(&key(0, 0)));
    assert!(cache.contains_key(&key(9, 0)));
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_evicted_bitmap_stays_alive_for_holders() {
    let cache = MemoryCache::new(1);
    cache.put(key(0, 0), bitmap(42));
    let held = cache.get(&key(0, 0)).unwrap();

    cache.put(key(1, 0), bitmap(43));
    assert!(!cache.contains_key(&key(0, 0)));
    assert_eq!(held.ref_count(), 1);
    assert_eq!(first_pixel(&held), Rgba([42, 42, 42, 255]));
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_access() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(TwoLevelCache::new(
        MemoryCache::new(8),
        file_cache(dir.path(), 64),
    ));

    let handles: Vec<_> = (0..4u32)
        .map(|thread| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 0..8 {
                    let tile_key = key(thread, i);
                    cache.put(tile_key.clone(), bitmap((thread * 8 + i) as u8));
                    assert!(cache.get(&tile_key).is_some());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cache.slow().len(), 32);
    assert_eq!(count_tile_files(dir.path()), 32);
}
