//! Render scheduler integration tests.
//!
//! Tests verify:
//! - The worker pool renders queued jobs into the cache
//! - Jobs run nearest to the viewport first
//! - Failed jobs are dropped without caching anything
//! - Viewport moves reorder the queue
//! - Shutdown stops the workers

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use image::Rgba;

use tileforge::cache::{MemoryCache, TileCache};
use tileforge::layer::TileLayer;
use tileforge::scheduler::{JobQueue, RenderJob, WorkerPool, DEFAULT_ZOOM_PENALTY};
use tileforge::tile::{CachedBitmap, RenderParams, Tile, TileBitmap, TileKey};
use tileforge::viewport::{Dimension, MapPosition, Viewport};

use super::test_utils::{test_map_index, wait_until, StubRenderer};

const TIMEOUT: Duration = Duration::from_secs(5);

fn tile(x: u32, y: u32) -> Tile {
    Tile::new(x, y, 11, 256)
}

fn key(x: u32, y: u32) -> TileKey {
    TileKey::new(tile(x, y), false, RenderParams::default())
}

/// Viewport centered on tile 1083/690 at zoom 11.
fn viewport() -> Arc<Viewport> {
    Arc::new(Viewport::new(
        MapPosition::new(tile(1083, 690).center(), 11),
        Dimension::new(200, 200),
        256,
    ))
}

fn is_idle(queue: &JobQueue) -> bool {
    queue.is_empty() && queue.in_flight() == 0
}

// =============================================================================
// Worker Pool
// =============================================================================

#[test]
fn test_pool_renders_queued_jobs() {
    let viewport = viewport();
    let queue = Arc::new(JobQueue::new(&viewport, DEFAULT_ZOOM_PENALTY));
    let cache = Arc::new(MemoryCache::new(16));
    let renderer = Arc::new(StubRenderer::new(Rgba([1, 2, 3, 255]), 4));
    let (redraw_tx, redraw_rx) = mpsc::channel();

    let mut pool = WorkerPool::start(
        2,
        Arc::clone(&queue),
        cache.clone(),
        renderer.clone(),
        test_map_index(),
        redraw_tx,
    )
    .unwrap();
    assert_eq!(pool.len(), 2);

    for x in 1082..1086 {
        assert!(queue.add_job(RenderJob::new(key(x, 690))));
    }

    let mut notified = Vec::new();
    for _ in 0..4 {
        notified.push(redraw_rx.recv_timeout(TIMEOUT).unwrap());
    }
    pool.shutdown();

    for x in 1082..1086 {
        assert!(cache.contains_key(&key(x, 690)));
        assert!(notified.contains(&key(x, 690)));
    }
    assert_eq!(renderer.calls(), 4);
}

#[test]
fn test_single_worker_renders_nearest_first() {
    let viewport = viewport();
    let queue = Arc::new(JobQueue::new(&viewport, DEFAULT_ZOOM_PENALTY));
    let renderer = Arc::new(StubRenderer::new(Rgba([0, 0, 0, 255]), 4));

    // Queued before any worker runs, farthest first
    for x in [1086, 1084, 1083] {
        queue.add_job(RenderJob::new(key(x, 690)));
    }

    let (redraw_tx, redraw_rx) = mpsc::channel();
    let mut pool = WorkerPool::start(
        1,
        Arc::clone(&queue),
        Arc::new(MemoryCache::new(16)),
        renderer.clone(),
        test_map_index(),
        redraw_tx,
    )
    .unwrap();

    for _ in 0..3 {
        redraw_rx.recv_timeout(TIMEOUT).unwrap();
    }
    pool.shutdown();

    assert_eq!(
        renderer.executed(),
        vec![key(1083, 690), key(1084, 690), key(1086, 690)]
    );
}

#[test]
fn test_failed_job_is_dropped() {
    let viewport = viewport();
    let queue = Arc::new(JobQueue::new(&viewport, DEFAULT_ZOOM_PENALTY));
    let cache = Arc::new(MemoryCache::new(16));
    let renderer = Arc::new(StubRenderer::new(Rgba([0, 0, 0, 255]), 4));
    renderer.fail_on(key(1083, 690));
    let (redraw_tx, redraw_rx) = mpsc::channel();

    let mut pool = WorkerPool::start(
        1,
        Arc::clone(&queue),
        cache.clone(),
        renderer.clone(),
        test_map_index(),
        redraw_tx,
    )
    .unwrap();

    queue.add_job(RenderJob::new(key(1083, 690)));
    assert!(wait_until(TIMEOUT, || renderer.calls() == 1 && is_idle(&queue)));

    assert!(!cache.contains_key(&key(1083, 690)));
    assert!(redraw_rx.try_recv().is_err());

    // The key may be requested again
    assert!(queue.add_job(RenderJob::new(key(1083, 690))));
    assert!(wait_until(TIMEOUT, || renderer.calls() == 2 && is_idle(&queue)));
    pool.shutdown();
}

#[test]
fn test_cached_tile_is_skipped() {
    let viewport = viewport();
    let queue = Arc::new(JobQueue::new(&viewport, DEFAULT_ZOOM_PENALTY));
    let cache = Arc::new(MemoryCache::new(16));
    cache.put(
        key(1083, 690),
        CachedBitmap::new(TileBitmap::filled(4, 4, Rgba([9, 9, 9, 255]))),
    );
    let renderer = Arc::new(StubRenderer::new(Rgba([0, 0, 0, 255]), 4));
    let (redraw_tx, _redraw_rx) = mpsc::channel();

    queue.add_job(RenderJob::new(key(1083, 690)));
    let mut pool = WorkerPool::start(
        1,
        Arc::clone(&queue),
        cache.clone(),
        renderer.clone(),
        test_map_index(),
        redraw_tx,
    )
    .unwrap();

    assert!(wait_until(TIMEOUT, || is_idle(&queue)));
    pool.shutdown();
    assert_eq!(renderer.calls(), 0);
}

#[test]
fn test_shutdown_stops_workers() {
    let viewport = viewport();
    let queue = Arc::new(JobQueue::new(&viewport, DEFAULT_ZOOM_PENALTY));
    let renderer = Arc::new(
        StubRenderer::new(Rgba([0, 0, 0, 255]), 4).with_delay(Duration::from_millis(20)),
    );
    let (redraw_tx, _redraw_rx) = mpsc::channel();

    let mut pool = WorkerPool::start(
        2,
        Arc::clone(&queue),
        Arc::new(MemoryCache::new(64)),
        renderer.clone(),
        test_map_index(),
        redraw_tx,
    )
    .unwrap();

    for x in 1070..1100 {
        queue.add_job(RenderJob::new(key(x, 690)));
    }
    pool.shutdown();

    assert!(pool.is_empty());
    assert!(queue.is_shutdown());
    assert!(queue.is_empty());
    assert!(renderer.calls() < 30);
    assert!(!queue.add_job(RenderJob::new(key(1083, 690))));
}

// =============================================================================
// Rescheduling
// =============================================================================

#[test]
fn test_viewport_move_reorders_queue() {
    let viewport = viewport();
    let queue = Arc::new(JobQueue::new(&viewport, DEFAULT_ZOOM_PENALTY));
    let layer = TileLayer::new(
        Arc::new(MemoryCache::new(16)),
        Arc::clone(&queue),
        Arc::clone(&viewport),
        false,
        RenderParams::default(),
    );

    assert!(layer.request_tile(tile(1083, 690)).scheduled);
    assert!(layer.request_tile(tile(1090, 690)).scheduled);

    viewport.set_center(tile(1090, 690).center());
    layer.update_viewport();

    let first = queue.poll().unwrap();
    assert_eq!(first.key, key(1090, 690));
    assert!(first.priority < 1e-6);
    queue.complete(&first);

    let second = queue.poll().unwrap();
    assert_eq!(second.key, key(1083, 690));
}
