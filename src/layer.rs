//! Tile layer: the link between the viewport, the caches and the scheduler.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           TileLayer                             │
//! │   request_tile(tile)                                            │
//! │     1. Build the key       3. Miss: queue a render job          │
//! │     2. Look up the cache      (unless queued or in flight)      │
//! │                                                                 │
//! │   update_viewport()        draw(canvas)                         │
//! │     visible tiles ──►        blit cached tiles, request the     │
//! │     working set              missing ones                       │
//! └──────────┬───────────────────────────┬──────────────────────────┘
//!            ▼                           ▼
//!      ┌───────────┐               ┌───────────┐
//!      │ TileCache │               │ JobQueue  │
//!      └───────────┘               └───────────┘
//! ```

use std::collections::HashSet;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::cache::TileCache;
use crate::scheduler::{DebugFlags, JobQueue, RenderJob};
use crate::tile::{CachedBitmap, RenderParams, Tile, TileBitmap, TileKey};
use crate::viewport::{MapPosition, Viewport};

// =============================================================================
// Tile Response
// =============================================================================

/// Outcome of a tile request.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// The bitmap, if it was cached
    pub bitmap: Option<CachedBitmap>,

    /// Whether a render job was queued by this request
    pub scheduled: bool,
}

impl TileResponse {
    pub fn is_hit(&self) -> bool {
        self.bitmap.is_some()
    }
}

// =============================================================================
// Tile Layer
// =============================================================================

/// A map layer made of rendered tiles.
///
/// The layer never renders itself: a miss queues a [`RenderJob`], and the
/// worker pool fills the cache in the background.
pub struct TileLayer<C: TileCache> {
    cache: Arc<C>,
    queue: Arc<JobQueue>,
    viewport: Arc<Viewport>,
    positions: Mutex<Receiver<MapPosition>>,
    has_alpha: bool,
    render_params: RenderParams,
    debug: DebugFlags,
}

impl<C: TileCache> TileLayer<C> {
    pub fn new(
        cache: Arc<C>,
        queue: Arc<JobQueue>,
        viewport: Arc<Viewport>,
        has_alpha: bool,
        render_params: RenderParams,
    ) -> Self {
        let positions = Mutex::new(viewport.subscribe());
        Self {
            cache,
            queue,
            viewport,
            positions,
            has_alpha,
            render_params,
            debug: DebugFlags::default(),
        }
    }

    /// Debug flags attached to every queued job.
    pub fn with_debug(mut self, debug: DebugFlags) -> Self {
        self.debug = debug;
        self
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn viewport(&self) -> &Arc<Viewport> {
        &self.viewport
    }

    /// Key of `tile` rendered for this layer.
    pub fn tile_key(&self, tile: Tile) -> TileKey {
        TileKey::new(tile, self.has_alpha, self.render_params.clone())
    }

    /// Look a tile up, queueing a render job on a miss.
    pub fn request_tile(&self, tile: Tile) -> TileResponse {
        let key = self.tile_key(tile);
        if let Some(bitmap) = self.cache.get(&key) {
            trace!(key = %key, "tile cache hit");
            return TileResponse {
                bitmap: Some(bitmap),
                scheduled: false,
            };
        }

        let scheduled =
            tile.is_valid() && self.queue.add_job(RenderJob::new(key).with_debug(self.debug));
        TileResponse {
            bitmap: None,
            scheduled,
        }
    }

    /// Apply pending viewport changes: the visible tiles become the cache's
    /// working set and queued jobs are reprioritized.
    ///
    /// Returns the keys of the visible tiles.
    pub fn update_viewport(&self) -> HashSet<TileKey> {
        let moved = {
            let positions = self.positions.lock();
            let mut moved = false;
            while positions.try_recv().is_ok() {
                moved = true;
            }
            moved
        };

        let keys: HashSet<TileKey> = self
            .viewport
            .visible_tiles()
            .into_iter()
            .map(|tile| self.tile_key(tile))
            .collect();
        self.cache.set_working_set(&keys);

        if moved {
            self.queue.request_reschedule();
        }
        debug!(visible = keys.len(), moved, "updated tile layer viewport");
        keys
    }

    /// Draw the visible tiles onto `canvas`, centered on the viewport.
    ///
    /// Missing tiles are requested. Returns the number of tiles drawn.
    pub fn draw(&self, canvas: &TileBitmap) -> usize {
        let position = self.viewport.position();
        let tile_size = self.viewport.tile_size();
        let (center_x, center_y) = position.center_pixel(position.zoom_level, tile_size);
        let left = center_x - canvas.width() as f64 / 2.0;
        let top = center_y - canvas.height() as f64 / 2.0;

        let mut drawn = 0;
        for tile in self.viewport.visible_tiles() {
            let Some(bitmap) = self.request_tile(tile).bitmap else {
                continue;
            };
            let x = (tile.tile_x as f64 * tile_size as f64 - left).round() as i64;
            let y = (tile.tile_y as f64 * tile_size as f64 - top).round() as i64;
            canvas.draw_bitmap(&bitmap, x, y);
            drawn += 1;
        }
        drawn
    }
}
