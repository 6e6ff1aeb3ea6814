//! End-to-end pipeline tests.
//!
//! Tests verify:
//! - A cache miss queues a job, whose result turns the next request into
//!   a hit
//! - Map file, caches, scheduler, tile layer and frame buffer together
//!   compose a complete frame
//! - Zoom levels without map data never fill the cache

use std::io::Write;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::Rgba;

use tileforge::cache::{FileCache, FileCacheOptions, MemoryCache, TileCache, TwoLevelCache};
use tileforge::format::MapFile;
use tileforge::framebuffer::{BufferingStrategy, FrameBuffer};
use tileforge::io::MemoryRangeReader;
use tileforge::layer::TileLayer;
use tileforge::scheduler::{DebugRenderer, JobQueue, WorkerPool, DEFAULT_ZOOM_PENALTY};
use tileforge::tile::{RenderParams, Tile};
use tileforge::viewport::{Dimension, MapPosition, Viewport};

use super::test_utils::{wait_until, MapFileBuilder, RecordingSurface, StubRenderer, SubFile};

const TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Miss, Render, Hit
// =============================================================================

#[test]
fn test_miss_renders_then_hits() {
    let builder = MapFileBuilder::new();
    let file = {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&builder.build()).unwrap();
        file.flush().unwrap();
        file
    };
    let map = MapFile::open(file.path()).unwrap();

    let tile = Tile::new(1083, 690, 11, 1);
    let viewport = Arc::new(Viewport::new(
        MapPosition::new(tile.center(), 11),
        Dimension::new(1, 1),
        1,
    ));
    let queue = Arc::new(JobQueue::new(&viewport, DEFAULT_ZOOM_PENALTY));
    let cache = Arc::new(MemoryCache::new(16));
    let layer = TileLayer::new(
        Arc::clone(&cache),
        Arc::clone(&queue),
        Arc::clone(&viewport),
        false,
        RenderParams::default(),
    );

    // Miss: one job with a finite priority
    let response = layer.request_tile(tile);
    assert!(!response.is_hit());
    assert!(response.scheduled);
    assert_eq!(queue.len(), 1);

    let renderer = Arc::new(StubRenderer::new(Rgba([5, 6, 7, 255]), 1));
    let (redraw_tx, redraw_rx) = mpsc::channel();
    let mut pool = WorkerPool::start(
        1,
        Arc::clone(&queue),
        cache.clone(),
        renderer.clone(),
        Arc::clone(map.index()),
        redraw_tx,
    )
    .unwrap();

    let rendered = redraw_rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(rendered, layer.tile_key(tile));
    assert!(wait_until(TIMEOUT, || queue.in_flight() == 0));

    // Hit: the 1x1 bitmap, and no new job
    let response = layer.request_tile(tile);
    let bitmap = response.bitmap.unwrap();
    assert_eq!(bitmap.dimensions(), (1, 1));
    assert_eq!(*bitmap.pixels().get_pixel(0, 0), Rgba([5, 6, 7, 255]));
    assert!(!response.scheduled);
    assert!(queue.is_empty());

    pool.shutdown();
    assert_eq!(renderer.calls(), 1);
}

#[test]
fn test_queued_job_priority_is_finite() {
    let tile = Tile::new(1083, 690, 11, 256);
    let viewport = Arc::new(Viewport::new(
        MapPosition::new(Tile::new(1085, 690, 11, 256).center(), 11),
        Dimension::new(256, 256),
        256,
    ));
    let queue = Arc::new(JobQueue::new(&viewport, DEFAULT_ZOOM_PENALTY));
    let layer = TileLayer::new(
        Arc::new(MemoryCache::new(4)),
        Arc::clone(&queue),
        viewport,
        false,
        RenderParams::default(),
    );

    layer.request_tile(tile);
    let job = queue.poll().unwrap();
    assert!(job.priority.is_finite());
    assert!((job.priority - 512.0).abs() < 1e-3);
}

// =============================================================================
// Full Frame
// =============================================================================

#[test]
fn test_compose_full_frame() {
    let dir = tempfile::tempdir().unwrap();
    let map = MapFile::from_reader(Arc::new(MemoryRangeReader::new(
        MapFileBuilder::new().build(),
        "memory://frame.map",
    )))
    .unwrap();

    let center = map.index().info().bounding_box.center();
    let viewport = Arc::new(Viewport::new(
        MapPosition::new(center, 11),
        Dimension::new(300, 200),
        256,
    ));
    let cache = Arc::new(TwoLevelCache::new(
        MemoryCache::new(16),
        FileCache::new(dir.path(), FileCacheOptions::default()).unwrap(),
    ));
    let queue = Arc::new(JobQueue::new(&viewport, DEFAULT_ZOOM_PENALTY));
    let tile_color = Rgba([10, 20, 30, 255]);
    let (redraw_tx, redraw_rx) = mpsc::channel();
    let mut pool = WorkerPool::start(
        2,
        Arc::clone(&queue),
        cache.clone(),
        Arc::new(DebugRenderer::new(tile_color)),
        Arc::clone(map.index()),
        redraw_tx,
    )
    .unwrap();

    let layer = TileLayer::new(
        Arc::clone(&cache),
        Arc::clone(&queue),
        Arc::clone(&viewport),
        false,
        RenderParams::default(),
    );
    let frame_buffer = FrameBuffer::new(BufferingStrategy::Triple, Rgba([255, 255, 255, 255]));
    frame_buffer.resize(viewport.dimension());
    let mut surface = RecordingSurface::default();

    let visible = layer.update_viewport();
    assert!(!visible.is_empty());

    let deadline = Instant::now() + TIMEOUT;
    let mut drawn = 0;
    while Instant::now() < deadline {
        let slot = frame_buffer.get_drawing_slot().unwrap();
        slot.fill(Rgba([255, 255, 255, 255]));
        drawn = layer.draw(&slot);
        frame_buffer.release_producer(viewport.position());
        frame_buffer.draw(&mut surface);
        if drawn == visible.len() {
            break;
        }
        let _ = redraw_rx.recv_timeout(Duration::from_millis(50));
    }
    pool.shutdown();

    assert_eq!(drawn, visible.len());
    let (pixel, position) = surface.frames.last().copied().unwrap();
    assert_eq!(pixel, tile_color);
    assert_eq!(position, viewport.position());

    // Visible tiles went to both tiers
    for key in &visible {
        assert!(cache.fast().contains_key(key));
        assert!(cache.slow().contains_key(key));
    }

    frame_buffer.destroy();
    cache.destroy();
}

#[test]
fn test_zoom_gap_never_fills_cache() {
    let builder = MapFileBuilder::new()
        .with_sub_files(vec![SubFile::new(5, 5, 6), SubFile::new(10, 10, 12)]);
    let map = MapFile::from_reader(Arc::new(MemoryRangeReader::new(
        builder.build(),
        "memory://gap.map",
    )))
    .unwrap();

    let center = map.index().info().bounding_box.center();
    let viewport = Arc::new(Viewport::new(
        MapPosition::new(center, 8),
        Dimension::new(256, 256),
        256,
    ));
    let cache = Arc::new(MemoryCache::new(16));
    let queue = Arc::new(JobQueue::new(&viewport, DEFAULT_ZOOM_PENALTY));
    let (redraw_tx, redraw_rx) = mpsc::channel();
    let mut pool = WorkerPool::start(
        1,
        Arc::clone(&queue),
        cache.clone(),
        Arc::new(DebugRenderer::default()),
        Arc::clone(map.index()),
        redraw_tx,
    )
    .unwrap();

    let layer = TileLayer::new(
        Arc::clone(&cache),
        Arc::clone(&queue),
        Arc::clone(&viewport),
        false,
        RenderParams::default(),
    );
    let visible = layer.update_viewport();
    for tile in viewport.visible_tiles() {
        assert!(layer.request_tile(tile).scheduled);
    }

    assert!(wait_until(TIMEOUT, || queue.is_empty() && queue.in_flight() == 0));
    pool.shutdown();

    assert!(!visible.is_empty());
    assert!(cache.is_empty());
    assert!(redraw_rx.try_recv().is_err());
}
