//! Configuration management for tileforge.
//!
//! This module provides:
//! - Command-line arguments via clap, one subcommand per tool
//! - [`EngineConfig`], the settings shared by the cache, scheduler and frame
//!   buffer, constructed once and passed by reference
//! - Environment variables with the `TILEFORGE_` prefix for every engine
//!   setting
//!
//! # Example
//!
//! ```ignore
//! use tileforge::config::{Cli, Command};
//! use clap::Parser;
//!
//! let cli = Cli::parse();
//! if let Command::Warm(config) = cli.command {
//!     println!("{} workers", config.engine.worker_count());
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `TILEFORGE_WORKERS` - Render threads (default: CPU count + 1)
//! - `TILEFORGE_ZOOM_PENALTY` - Priority weight per zoom level (default: 5)
//! - `TILEFORGE_MEMORY_CACHE_TILES` - Tiles kept in memory (default: 64)
//! - `TILEFORGE_FILE_CACHE_TILES` - Tiles kept on disk (default: 1024)
//! - `TILEFORGE_INDEX_CACHE_BLOCKS` - Cached index blocks (default: 64)
//! - `TILEFORGE_TILE_SIZE` - Tile size in pixels (default: 256)
//! - `TILEFORGE_BACKGROUND` - Background color as `#rrggbb` (default: #f2efe9)
//! - `TILEFORGE_BUFFERING` - `double` or `triple` (default: double)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use image::Rgba;

use crate::cache::DEFAULT_MEMORY_CACHE_CAPACITY;
use crate::format::ZOOM_LEVEL_MAX;
use crate::framebuffer::BufferingStrategy;
use crate::io::DEFAULT_INDEX_CACHE_CAPACITY;
use crate::scheduler::{default_worker_count, DEFAULT_ZOOM_PENALTY};
use crate::tile::DEFAULT_TILE_SIZE;

// =============================================================================
// Default Values
// =============================================================================

/// Default number of tiles kept on disk.
pub const DEFAULT_FILE_CACHE_CAPACITY: usize = 1024;

/// Default background color.
pub const DEFAULT_BACKGROUND: &str = "#f2efe9";

/// Default frame width in pixels.
pub const DEFAULT_FRAME_WIDTH: u32 = 1024;

/// Default frame height in pixels.
pub const DEFAULT_FRAME_HEIGHT: u32 = 768;

/// Largest supported tile size in pixels.
pub const MAX_TILE_SIZE: u32 = 4096;

// =============================================================================
// CLI Structure
// =============================================================================

/// tileforge - Tile rendering support engine for binary map files.
#[derive(Parser, Debug, Clone)]
#[command(name = "tileforge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the header of a map file
    Info(InfoConfig),

    /// Look up the block index entry of a location
    Index(IndexConfig),

    /// Inspect or purge a tile cache directory
    Cache(CacheConfig),

    /// Render the tiles around a location into the caches
    Warm(WarmConfig),
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Settings of the rendering engine.
#[derive(Args, Debug, Clone)]
pub struct EngineConfig {
    /// Number of render threads (default: CPU count + 1).
    #[arg(long, env = "TILEFORGE_WORKERS")]
    pub workers: Option<usize>,

    /// Priority weight applied per zoom level between a job and the viewport.
    #[arg(long, default_value_t = DEFAULT_ZOOM_PENALTY, env = "TILEFORGE_ZOOM_PENALTY")]
    pub zoom_penalty: f64,

    /// Maximum number of tiles in the memory cache.
    #[arg(long, default_value_t = DEFAULT_MEMORY_CACHE_CAPACITY, env = "TILEFORGE_MEMORY_CACHE_TILES")]
    pub memory_cache_tiles: usize,

    /// Maximum number of tiles in the disk cache.
    #[arg(long, default_value_t = DEFAULT_FILE_CACHE_CAPACITY, env = "TILEFORGE_FILE_CACHE_TILES")]
    pub file_cache_tiles: usize,

    /// Maximum number of cached index blocks per map file.
    #[arg(long, default_value_t = DEFAULT_INDEX_CACHE_CAPACITY, env = "TILEFORGE_INDEX_CACHE_BLOCKS")]
    pub index_cache_blocks: usize,

    /// Tile size in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "TILEFORGE_TILE_SIZE")]
    pub tile_size: u32,

    /// Background color as #rrggbb or #rrggbbaa.
    #[arg(long, default_value = DEFAULT_BACKGROUND, env = "TILEFORGE_BACKGROUND")]
    pub background: String,

    /// Frame buffering: double or triple.
    #[arg(long, default_value = "double", env = "TILEFORGE_BUFFERING")]
    pub buffering: BufferingStrategy,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: None,
            zoom_penalty: DEFAULT_ZOOM_PENALTY,
            memory_cache_tiles: DEFAULT_MEMORY_CACHE_CAPACITY,
            file_cache_tiles: DEFAULT_FILE_CACHE_CAPACITY,
            index_cache_blocks: DEFAULT_INDEX_CACHE_CAPACITY,
            tile_size: DEFAULT_TILE_SIZE,
            background: DEFAULT_BACKGROUND.to_string(),
            buffering: BufferingStrategy::Double,
            verbose: false,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == Some(0) {
            return Err("workers must be greater than 0".to_string());
        }

        if !self.zoom_penalty.is_finite() || self.zoom_penalty < 0.0 {
            return Err("zoom_penalty must be a non-negative number".to_string());
        }

        if self.tile_size == 0 || self.tile_size > MAX_TILE_SIZE {
            return Err(format!("tile_size must be between 1 and {}", MAX_TILE_SIZE));
        }

        if self.index_cache_blocks == 0 {
            return Err("index_cache_blocks must be greater than 0".to_string());
        }

        parse_color(&self.background)?;

        Ok(())
    }

    /// Number of render threads to start.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(default_worker_count)
    }

    /// The background color, or opaque white if it does not parse (call
    /// `validate()` first).
    pub fn background_color(&self) -> Rgba<u8> {
        parse_color(&self.background).unwrap_or(Rgba([255, 255, 255, 255]))
    }
}

/// Parse `#rrggbb` or `#rrggbbaa`.
pub fn parse_color(value: &str) -> Result<Rgba<u8>, String> {
    let invalid = || format!("invalid color {:?}, expected #rrggbb or #rrggbbaa", value);
    let hex = value.strip_prefix('#').ok_or_else(invalid)?;
    if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
        return Err(invalid());
    }

    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
    Ok(Rgba([channel(0)?, channel(2)?, channel(4)?, alpha]))
}

// =============================================================================
// Info Command
// =============================================================================

/// Configuration for the info command.
#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    /// Path to the map file.
    pub map_file: PathBuf,

    /// Print JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Index Command
// =============================================================================

/// Configuration for the index command.
#[derive(Args, Debug, Clone)]
pub struct IndexConfig {
    /// Path to the map file.
    pub map_file: PathBuf,

    /// Latitude of the location.
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    /// Longitude of the location.
    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,

    /// Zoom level of the tile.
    #[arg(long)]
    pub zoom: u8,

    /// Print JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl IndexConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        validate_location(Some(self.lat), Some(self.lon))?;
        validate_zoom(Some(self.zoom))
    }
}

// =============================================================================
// Cache Command
// =============================================================================

/// Configuration for the cache command.
#[derive(Args, Debug, Clone)]
pub struct CacheConfig {
    /// Tile cache directory.
    pub cache_dir: PathBuf,

    /// Delete every cached tile.
    #[arg(long, default_value_t = false)]
    pub purge: bool,

    /// Tile size of the cached tiles.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "TILEFORGE_TILE_SIZE")]
    pub tile_size: u32,

    /// Maximum number of tiles in the disk cache.
    #[arg(long, default_value_t = DEFAULT_FILE_CACHE_CAPACITY, env = "TILEFORGE_FILE_CACHE_TILES")]
    pub capacity: usize,

    /// Print JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Warm Command
// =============================================================================

/// Configuration for the warm command.
#[derive(Args, Debug, Clone)]
pub struct WarmConfig {
    /// Path to the map file.
    pub map_file: PathBuf,

    /// Persistent tile cache directory; tiles are kept in memory only if
    /// omitted.
    #[arg(long, env = "TILEFORGE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Latitude of the frame center (default: map start position).
    #[arg(long, allow_hyphen_values = true)]
    pub lat: Option<f64>,

    /// Longitude of the frame center (default: map start position).
    #[arg(long, allow_hyphen_values = true)]
    pub lon: Option<f64>,

    /// Zoom level (default: map start zoom level).
    #[arg(long)]
    pub zoom: Option<u8>,

    /// Frame width in pixels.
    #[arg(long, default_value_t = DEFAULT_FRAME_WIDTH)]
    pub width: u32,

    /// Frame height in pixels.
    #[arg(long, default_value_t = DEFAULT_FRAME_HEIGHT)]
    pub height: u32,

    /// Write the composed frame to this PNG file.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Outline every tile and shade it by zoom level.
    #[arg(long, default_value_t = false)]
    pub debug_tiles: bool,

    /// Seconds to wait for outstanding tiles.
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    #[command(flatten)]
    pub engine: EngineConfig,
}

impl WarmConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.engine.validate()?;
        validate_location(self.lat, self.lon)?;
        validate_zoom(self.zoom)?;

        if self.width == 0 || self.height == 0 {
            return Err("frame width and height must be greater than 0".to_string());
        }
        if self.timeout == 0 {
            return Err("timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

fn validate_location(lat: Option<f64>, lon: Option<f64>) -> Result<(), String> {
    if lat.is_some() != lon.is_some() {
        return Err("--lat and --lon must be given together".to_string());
    }
    if let Some(lat) = lat {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(format!("latitude {} out of range", lat));
        }
    }
    if let Some(lon) = lon {
        if !(-180.0..=180.0).contains(&lon) {
            return Err(format!("longitude {} out of range", lon));
        }
    }
    Ok(())
}

fn validate_zoom(zoom: Option<u8>) -> Result<(), String> {
    match zoom {
        Some(zoom) if zoom > ZOOM_LEVEL_MAX => Err(format!(
            "zoom level must be at most {}",
            ZOOM_LEVEL_MAX
        )),
        _ => Ok(()),
    }
}

// =============================================================================
// Tests
// =============================================================================
