use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use image::Rgba;
use tracing::{debug, info, warn};

use super::job::RenderJob;
use super::queue::JobQueue;
use crate::cache::TileCache;
use crate::error::RenderError;
use crate::format::MapFileIndex;
use crate::tile::{CachedBitmap, TileBitmap, TileKey};

// =============================================================================
// Renderer
// =============================================================================

/// Turns map data into the pixels of one tile.
pub trait Renderer: Send + Sync {
    fn execute_job(&self, job: &RenderJob, map: &MapFileIndex) -> Result<TileBitmap, RenderError>;
}

impl<T: Renderer + ?Sized> Renderer for Arc<T> {
    fn execute_job(&self, job: &RenderJob, map: &MapFileIndex) -> Result<TileBitmap, RenderError> {
        (**self).execute_job(job, map)
    }
}

/// Renderer painting flat tiles, for warming caches and checking the
/// pipeline without a map theme.
///
/// Tiles outside the map area get the transparent or white "no data"
/// color; tiles inside get the background color, optionally shaded by
/// zoom level and framed.
#[derive(Debug, Clone)]
pub struct DebugRenderer {
    background: Rgba<u8>,
    frame: Rgba<u8>,
}

impl DebugRenderer {
    pub fn new(background: Rgba<u8>) -> Self {
        Self {
            background,
            frame: Rgba([255, 0, 0, 255]),
        }
    }

    fn fill_color(&self, job: &RenderJob) -> Rgba<u8> {
        if !job.debug.shade_by_zoom {
            return self.background;
        }
        let shade = 255 - (job.key.tile.zoom_level as u32 * 10).min(200) as u8;
        let Rgba([r, g, b, a]) = self.background;
        let scale = |c: u8| ((c as u32 * shade as u32) / 255) as u8;
        Rgba([scale(r), scale(g), scale(b), a])
    }
}

impl Default for DebugRenderer {
    fn default() -> Self {
        Self::new(Rgba([242, 239, 233, 255]))
    }
}

impl Renderer for DebugRenderer {
    fn execute_job(&self, job: &RenderJob, map: &MapFileIndex) -> Result<TileBitmap, RenderError> {
        let tile = &job.key.tile;
        let query_zoom = map.query_zoom_level(tile.zoom_level);
        if map.sub_file_parameter(query_zoom).is_none() {
            return Err(RenderError::NoSubFile(query_zoom));
        }

        let size = tile.tile_size;
        let bounds = tile.bounding_box();
        let map_bounds = &map.info().bounding_box;
        let inside = bounds.min_latitude <= map_bounds.max_latitude
            && bounds.max_latitude >= map_bounds.min_latitude
            && bounds.min_longitude <= map_bounds.max_longitude
            && bounds.max_longitude >= map_bounds.min_longitude;

        let color = match (inside, job.key.has_alpha) {
            (true, _) => self.fill_color(job),
            (false, true) => Rgba([0, 0, 0, 0]),
            (false, false) => Rgba([255, 255, 255, 255]),
        };
        let bitmap = TileBitmap::filled(size, size, color);

        if job.debug.draw_tile_frame && size > 0 {
            let mut pixels = bitmap.pixels_mut();
            for i in 0..size {
                pixels.put_pixel(i, 0, self.frame);
                pixels.put_pixel(i, size - 1, self.frame);
                pixels.put_pixel(0, i, self.frame);
                pixels.put_pixel(size - 1, i, self.frame);
            }
        }
        Ok(bitmap)
    }
}

// =============================================================================
// Worker Pool
// =============================================================================

/// Default number of render threads: one per CPU plus one.
pub fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        + 1
}

/// Shared state of the render threads.
struct WorkerContext {
    queue: Arc<JobQueue>,
    cache: Arc<dyn TileCache>,
    renderer: Arc<dyn Renderer>,
    map: Arc<MapFileIndex>,
}

/// Fixed set of threads draining a [`JobQueue`].
///
/// Each worker takes the most urgent job, skips it if the tile is cached
/// by now, renders it, stores the result and sends the key on the redraw
/// channel. A failed render is logged and dropped; it is only retried if
/// the job is queued again.
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `threads` workers.
    pub fn start(
        threads: usize,
        queue: Arc<JobQueue>,
        cache: Arc<dyn TileCache>,
        renderer: Arc<dyn Renderer>,
        map: Arc<MapFileIndex>,
        redraw: Sender<TileKey>,
    ) -> std::io::Result<Self> {
        let context = Arc::new(WorkerContext {
            queue: Arc::clone(&queue),
            cache,
            renderer,
            map,
        });

        let mut pool = Self {
            queue,
            handles: Vec::with_capacity(threads),
        };
        for id in 0..threads {
            let context = Arc::clone(&context);
            let redraw = redraw.clone();
            let handle = thread::Builder::new()
                .name(format!("tileforge-worker-{}", id))
                .spawn(move || run_worker(&context, &redraw));
            match handle {
                Ok(handle) => pool.handles.push(handle),
                Err(e) => {
                    pool.shutdown();
                    return Err(e);
                }
            }
        }

        info!(threads, "Started render workers");
        Ok(pool)
    }

    /// Number of running workers.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop the queue and wait for every worker to finish its current job.
    pub fn shutdown(&mut self) {
        self.queue.shutdown();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("render worker panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(context: &WorkerContext, redraw: &Sender<TileKey>) {
    while let Some(job) = context.queue.take() {
        if context.cache.contains_key(&job.key) {
            debug!(key = %job.key, "tile cached meanwhile, skipping job");
            context.queue.complete(&job);
            continue;
        }

        match context.renderer.execute_job(&job, &context.map) {
            Ok(bitmap) => {
                context.cache.put(job.key.clone(), CachedBitmap::new(bitmap));
                // The display side may be gone already
                let _ = redraw.send(job.key.clone());
            }
            Err(e) => {
                warn!(key = %job.key, error = %e, "Render job failed");
            }
        }
        context.queue.complete(&job);
    }
}
