//! tileforge - Tile rendering support engine for binary map files.
//!
//! This binary inspects map files and tile caches, and warms the caches by
//! rendering the tiles around a location.

use clap::Parser;
use image::RgbaImage;
use std::process::ExitCode;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tileforge::{
    cache::{FileCache, FileCacheOptions, MemoryCache, TileCache, TwoLevelCache},
    config::{CacheConfig, Cli, Command, IndexConfig, InfoConfig, WarmConfig},
    format::{mercator, LatLong, MapFile},
    framebuffer::{DisplaySurface, FrameBuffer},
    io::FileRangeReader,
    layer::TileLayer,
    scheduler::{DebugFlags, DebugRenderer, JobQueue, WorkerPool},
    tile::{RenderParams, TileBitmap},
    viewport::{Dimension, MapPosition, Viewport},
};

/// How long the compositing loop waits for a finished tile before checking
/// whether the scheduler went idle.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Info(config) => run_info(config),
        Command::Index(config) => run_index(config),
        Command::Cache(config) => run_cache(config),
        Command::Warm(config) => run_warm(config),
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tileforge=debug"
    } else {
        "tileforge=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Print a value as pretty JSON.
fn print_json(value: &serde_json::Value) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Info Command
// =============================================================================

fn run_info(config: InfoConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    let map = match MapFile::open(&config.map_file) {
        Ok(map) => map,
        Err(e) => {
            eprintln!("Error: {}: {}", config.map_file.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let index = map.index();
    let info = index.info();

    if config.json {
        return print_json(&serde_json::json!({
            "identifier": map.identifier(),
            "info": info,
            "zoom_level_min": index.zoom_level_min(),
            "zoom_level_max": index.zoom_level_max(),
            "sub_files": index.sub_files(),
        }));
    }

    let bbox = &info.bounding_box;
    println!("Map file: {}", map.identifier());
    println!("═════════════════════════════════");
    println!("  Version:      {}", info.file_version);
    println!("  Size:         {} bytes", info.file_size);
    println!("  Map date:     {} ms", info.map_date);
    println!(
        "  Bounds:       ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bbox.min_latitude, bbox.min_longitude, bbox.max_latitude, bbox.max_longitude
    );
    println!("  Tile size:    {} px", info.tile_pixel_size);
    println!("  Projection:   {}", info.projection_name);
    println!(
        "  Zoom levels:  {} - {}",
        index.zoom_level_min(),
        index.zoom_level_max()
    );
    println!(
        "  Tags:         {} POI, {} way",
        info.poi_tags.len(),
        info.way_tags.len()
    );

    let optional = &info.optional;
    if optional.is_debug_file {
        println!("  Debug file:   yes");
    }
    if let Some(start) = optional.start_position {
        println!(
            "  Start:        ({:.6}, {:.6})",
            start.latitude, start.longitude
        );
    }
    if let Some(zoom) = optional.start_zoom_level {
        println!("  Start zoom:   {}", zoom);
    }
    if let Some(ref language) = optional.language_preference {
        println!("  Language:     {}", language);
    }
    if let Some(ref comment) = optional.comment {
        println!("  Comment:      {}", comment);
    }
    if let Some(ref created_by) = optional.created_by {
        println!("  Created by:   {}", created_by);
    }

    println!();
    println!("Sub-files:");
    println!("─────────────────");
    for sub_file in index.sub_files() {
        println!(
            "  zoom {:>2}-{:<2} base {:>2}  {:>6} blocks ({}x{})  {} bytes at {}",
            sub_file.zoom_level_min,
            sub_file.zoom_level_max,
            sub_file.base_zoom_level,
            sub_file.number_of_blocks,
            sub_file.blocks_width,
            sub_file.blocks_height,
            sub_file.sub_file_size,
            sub_file.start_address
        );
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Index Command
// =============================================================================

fn run_index(config: IndexConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let map = match MapFile::open(&config.map_file) {
        Ok(map) => map,
        Err(e) => {
            eprintln!("Error: {}: {}", config.map_file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let tile_x = mercator::longitude_to_tile_x(config.lon, config.zoom);
    let tile_y = mercator::latitude_to_tile_y(config.lat, config.zoom);
    let query_zoom = map.index().query_zoom_level(config.zoom);

    let entry = match map.tile_index_entry(tile_x, tile_y, config.zoom) {
        Ok(entry) => entry,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if config.json {
        return print_json(&serde_json::json!({
            "tile": { "x": tile_x, "y": tile_y, "zoom": config.zoom },
            "query_zoom_level": query_zoom,
            "block": entry.map(|(block_number, entry)| serde_json::json!({
                "number": block_number,
                "offset": entry.block_offset,
                "is_water": entry.is_water,
            })),
        }));
    }

    println!(
        "Tile {}/{}/{} (query zoom {})",
        config.zoom, tile_x, tile_y, query_zoom
    );
    match entry {
        Some((block_number, entry)) => {
            println!("✓ Block {}", block_number);
            println!("  Offset:  {}", entry.block_offset);
            println!("  Water:   {}", if entry.is_water { "yes" } else { "no" });
        }
        None => {
            println!("✗ No block covers this tile");
        }
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Cache Command
// =============================================================================

fn run_cache(config: CacheConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    let options = FileCacheOptions {
        capacity: config.capacity,
        persistent: true,
        tile_size: config.tile_size,
        ..Default::default()
    };
    let cache = match FileCache::new(&config.cache_dir, options) {
        Ok(cache) => cache,
        Err(e) => {
            eprintln!("Error: {}: {}", config.cache_dir.display(), e);
            return ExitCode::FAILURE;
        }
    };
    cache.wait_for_scan();

    let stored = cache.len();
    if config.purge {
        cache.purge();
    }

    let code = if config.json {
        print_json(&serde_json::json!({
            "root": cache.root(),
            "tiles": stored,
            "capacity": cache.capacity(),
            "disabled": cache.is_disabled(),
            "purged": config.purge,
        }))
    } else {
        println!("Tile cache: {}", cache.root().display());
        if cache.is_disabled() {
            println!("✗ Cache is disabled");
        } else {
            println!("✓ {} of {} tiles", stored, cache.capacity());
        }
        if config.purge {
            println!("✓ Purged {} tiles", stored);
        }
        ExitCode::SUCCESS
    };

    cache.destroy();
    code
}

// =============================================================================
// Warm Command
// =============================================================================

fn run_warm(config: WarmConfig) -> ExitCode {
    init_logging(config.engine.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let engine = &config.engine;
    let reader = match FileRangeReader::open(&config.map_file) {
        Ok(reader) => reader,
        Err(e) => {
            error!("Failed to open {}: {}", config.map_file.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let map = match MapFile::with_index_cache_capacity(Arc::new(reader), engine.index_cache_blocks)
    {
        Ok(map) => map,
        Err(e) => {
            error!("Failed to read {}: {}", config.map_file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let position = start_position(&config, &map);
    let viewport = Arc::new(Viewport::new(
        position,
        Dimension::new(config.width, config.height),
        engine.tile_size,
    ));

    info!("Configuration:");
    info!("  Map file: {}", map.identifier());
    info!(
        "  Center: ({:.6}, {:.6}) at zoom {}",
        position.center.latitude, position.center.longitude, position.zoom_level
    );
    info!("  Workers: {}", engine.worker_count());
    info!(
        "  Cache: {} tiles in memory, {}",
        engine.memory_cache_tiles,
        match config.cache_dir {
            Some(ref dir) => format!("{} tiles in {}", engine.file_cache_tiles, dir.display()),
            None => "no disk cache".to_string(),
        }
    );

    let memory = MemoryCache::new(engine.memory_cache_tiles);
    match config.cache_dir {
        Some(ref dir) => {
            let options = FileCacheOptions {
                capacity: engine.file_cache_tiles,
                persistent: true,
                tile_size: engine.tile_size,
                ..Default::default()
            };
            match FileCache::new(dir, options) {
                Ok(file_cache) => {
                    let cache = TwoLevelCache::new(memory, file_cache);
                    warm(&config, &map, viewport, Arc::new(cache))
                }
                Err(e) => {
                    error!("Failed to open tile cache {}: {}", dir.display(), e);
                    ExitCode::FAILURE
                }
            }
        }
        None => warm(&config, &map, viewport, Arc::new(memory)),
    }
}

/// Frame position from the arguments, falling back to the map's start
/// position and the center of its bounding box.
fn start_position(config: &WarmConfig, map: &MapFile) -> MapPosition {
    let index = map.index();
    let info = index.info();
    let center = match (config.lat, config.lon) {
        (Some(lat), Some(lon)) => LatLong::new(lat, lon),
        _ => info
            .optional
            .start_position
            .unwrap_or_else(|| info.bounding_box.center()),
    };
    let zoom = config
        .zoom
        .or(info.optional.start_zoom_level)
        .unwrap_or_else(|| index.zoom_level_min());
    MapPosition::new(center, zoom)
}

/// Render the visible tiles into the cache, composing frames as tiles
/// arrive.
fn warm<C: TileCache + 'static>(
    config: &WarmConfig,
    map: &MapFile,
    viewport: Arc<Viewport>,
    cache: Arc<C>,
) -> ExitCode {
    let engine = &config.engine;
    let background = engine.background_color();
    let debug = DebugFlags {
        draw_tile_frame: config.debug_tiles,
        shade_by_zoom: config.debug_tiles,
    };

    let queue = Arc::new(JobQueue::new(&viewport, engine.zoom_penalty));
    let (redraw_tx, redraw_rx) = mpsc::channel();
    let mut pool = match WorkerPool::start(
        engine.worker_count(),
        Arc::clone(&queue),
        Arc::clone(&cache) as Arc<dyn TileCache>,
        Arc::new(DebugRenderer::new(background)),
        Arc::clone(map.index()),
        redraw_tx,
    ) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to start render workers: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let layer = TileLayer::new(
        Arc::clone(&cache),
        queue,
        Arc::clone(&viewport),
        false,
        RenderParams::default(),
    )
    .with_debug(debug);

    let frame_buffer = FrameBuffer::new(engine.buffering, background);
    frame_buffer.resize(viewport.dimension());
    let mut surface = ImageSurface::default();

    let visible = layer.update_viewport().len();
    let started = Instant::now();
    let deadline = started + Duration::from_secs(config.timeout);
    let mut drawn = 0;

    loop {
        if let Some(slot) = frame_buffer.get_drawing_slot() {
            slot.fill(background);
            drawn = layer.draw(&slot);
            frame_buffer.release_producer(viewport.position());
            frame_buffer.draw(&mut surface);
        }
        if drawn >= visible {
            break;
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(drawn, visible, "Timed out waiting for tiles");
            break;
        }
        match redraw_rx.recv_timeout(POLL_INTERVAL.min(deadline - now)) {
            Ok(_) => {
                while redraw_rx.try_recv().is_ok() {}
            }
            Err(RecvTimeoutError::Timeout) => {
                let queue = layer.queue();
                let idle = queue.is_empty() && queue.in_flight() == 0;
                if idle && redraw_rx.try_recv().is_err() {
                    warn!(drawn, visible, "Render queue idle with tiles missing");
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    pool.shutdown();
    frame_buffer.destroy();

    info!(
        "Drew {} of {} tiles in {} frame(s), {:.2}s",
        drawn,
        visible,
        surface.frames,
        started.elapsed().as_secs_f64()
    );

    let mut code = ExitCode::SUCCESS;
    if let Some(ref output) = config.output {
        match surface.image {
            Some(ref image) => match image.save(output) {
                Ok(()) => info!("Wrote frame to {}", output.display()),
                Err(e) => {
                    error!("Failed to write {}: {}", output.display(), e);
                    code = ExitCode::FAILURE;
                }
            },
            None => {
                error!("No frame was composed");
                code = ExitCode::FAILURE;
            }
        }
    }

    cache.destroy();
    code
}

/// Display surface keeping the last frame shown.
#[derive(Default)]
struct ImageSurface {
    image: Option<RgbaImage>,
    frames: usize,
}

impl DisplaySurface for ImageSurface {
    fn draw_bitmap(&mut self, bitmap: &TileBitmap, _position: &MapPosition) {
        self.image = Some((*bitmap.pixels()).clone());
        self.frames += 1;
    }
}
