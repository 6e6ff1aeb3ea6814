//! # tileforge
//!
//! Support engine for rendering map tiles from binary map files.
//!
//! This library provides the pieces a map view needs around a tile
//! renderer: it reads the header and block index of "mapsforge binary OSM"
//! map files, keeps rendered tiles in a memory and a disk cache, schedules
//! render jobs by their distance to the viewport, and hands finished frames
//! from a compositing thread to a display thread.
//!
//! ## Features
//!
//! - **Map file index**: fail-fast header parser, zoom lookup table and
//!   LRU-cached block index access
//! - **Tile caches**: working-set aware LRU in memory and on disk, composed
//!   into a two-level cache
//! - **Render scheduler**: priority queue ordered by viewport distance,
//!   served by a pool of worker threads
//! - **Frame buffer**: double or triple buffering with soft and hard slot
//!   locks
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`io`] - Range readers and the index block cache
//! - [`mod@format`] - Map file header, sub-files and Mercator math
//! - [`tile`] - Tile keys and shared bitmaps
//! - [`cache`] - Tile cache tiers
//! - [`viewport`] - Map position and visible tiles
//! - [`scheduler`] - Render jobs, job queue and worker pool
//! - [`layer`] - Tile layer tying viewport, cache and scheduler together
//! - [`framebuffer`] - Frame buffer swap protocol
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::{mpsc, Arc};
//! use tileforge::{
//!     DebugRenderer, Dimension, JobQueue, MapFile, MapPosition, MemoryCache, RenderParams,
//!     TileLayer, Viewport, WorkerPool,
//! };
//!
//! let map = MapFile::open("berlin.map").unwrap();
//! let center = map.index().info().bounding_box.center();
//! let viewport = Arc::new(Viewport::new(
//!     MapPosition::new(center, 14),
//!     Dimension::new(1024, 768),
//!     256,
//! ));
//!
//! let cache = Arc::new(MemoryCache::new(64));
//! let queue = Arc::new(JobQueue::new(&viewport, 5.0));
//! let (redraw_tx, redraw_rx) = mpsc::channel();
//! let mut pool = WorkerPool::start(
//!     4,
//!     queue.clone(),
//!     cache.clone(),
//!     Arc::new(DebugRenderer::default()),
//!     map.index().clone(),
//!     redraw_tx,
//! )
//! .unwrap();
//!
//! let layer = TileLayer::new(cache, queue, viewport, false, RenderParams::default());
//! layer.update_viewport();
//! for tile in layer.viewport().visible_tiles() {
//!     layer.request_tile(tile);
//! }
//! let _ = redraw_rx.recv();
//! pool.shutdown();
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod framebuffer;
pub mod io;
pub mod layer;
pub mod scheduler;
pub mod tile;
pub mod viewport;

// Re-export commonly used types
pub use cache::{FileCache, FileCacheOptions, MemoryCache, TileCache, TwoLevelCache};
pub use config::{Cli, Command, EngineConfig};
pub use error::{CacheError, FormatError, IoError, RenderError};
pub use format::{BoundingBox, LatLong, MapFile, MapFileIndex, MapFileInfo, SubFileParameter};
pub use framebuffer::{BufferingStrategy, DisplaySurface, FrameBuffer, LockState};
pub use io::{FileRangeReader, IndexEntry, MemoryRangeReader, RangeReader};
pub use layer::{TileLayer, TileResponse};
pub use scheduler::{DebugFlags, DebugRenderer, JobQueue, RenderJob, Renderer, WorkerPool};
pub use tile::{CachedBitmap, RenderParams, Tile, TileBitmap, TileKey};
pub use viewport::{Dimension, MapPosition, Viewport};
