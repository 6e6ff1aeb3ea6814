use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::format::mercator::{
    self, map_size, pixel_x_to_longitude, pixel_y_to_latitude, tile_x_to_longitude, tile_y_to_latitude,
};
use crate::format::{BoundingBox, LatLong, ZOOM_LEVEL_MAX};

/// Default tile size in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

// =============================================================================
// Tile
// =============================================================================

/// A square map tile at a zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    /// Column, 0 at the antimeridian
    pub tile_x: u32,

    /// Row, 0 at the northern edge of the map
    pub tile_y: u32,

    /// Zoom level
    pub zoom_level: u8,

    /// Side length in pixels
    pub tile_size: u32,
}

impl Tile {
    /// Create a tile.
    pub const fn new(tile_x: u32, tile_y: u32, zoom_level: u8, tile_size: u32) -> Self {
        Self {
            tile_x,
            tile_y,
            zoom_level,
            tile_size,
        }
    }

    /// Highest tile number at this zoom level.
    pub fn max_tile_number(zoom_level: u8) -> u32 {
        mercator::max_tile_number(zoom_level)
    }

    /// Whether the zoom level is supported and the tile numbers are inside
    /// the world map.
    pub fn is_valid(&self) -> bool {
        if self.zoom_level > ZOOM_LEVEL_MAX {
            return false;
        }
        let max = Self::max_tile_number(self.zoom_level);
        self.tile_x <= max && self.tile_y <= max
    }

    /// Pixel coordinates of the tile center on the world map at the
    /// tile's zoom level.
    pub fn center_pixel(&self) -> (f64, f64) {
        let size = self.tile_size as f64;
        (
            self.tile_x as f64 * size + size / 2.0,
            self.tile_y as f64 * size + size / 2.0,
        )
    }

    /// Geographic area covered by the tile.
    pub fn bounding_box(&self) -> BoundingBox {
        let north = tile_y_to_latitude(self.tile_y, self.zoom_level);
        let south = tile_y_to_latitude(self.tile_y + 1, self.zoom_level);
        let west = tile_x_to_longitude(self.tile_x, self.zoom_level);
        let east = tile_x_to_longitude(self.tile_x + 1, self.zoom_level);
        BoundingBox {
            min_latitude: south,
            min_longitude: west,
            max_latitude: north,
            max_longitude: east,
        }
    }

    /// Geographic point at the pixel center of the tile.
    pub fn center(&self) -> LatLong {
        let size = map_size(self.zoom_level, self.tile_size);
        let (pixel_x, pixel_y) = self.center_pixel();
        LatLong::new(
            pixel_y_to_latitude(pixel_y, size),
            pixel_x_to_longitude(pixel_x, size),
        )
    }

    /// The four tiles covering this one at the next zoom level.
    pub fn children(&self) -> [Tile; 4] {
        let x = self.tile_x * 2;
        let y = self.tile_y * 2;
        let z = self.zoom_level + 1;
        [
            Tile::new(x, y, z, self.tile_size),
            Tile::new(x + 1, y, z, self.tile_size),
            Tile::new(x, y + 1, z, self.tile_size),
            Tile::new(x + 1, y + 1, z, self.tile_size),
        ]
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom_level, self.tile_x, self.tile_y)
    }
}

// =============================================================================
// Render Parameters
// =============================================================================

/// Parameters that change the rendered pixels of a tile.
///
/// Two renderings of the same tile with different parameters are distinct
/// cache entries and distinct jobs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderParams {
    /// Identifier of the render theme
    pub style: Arc<str>,

    /// User scale factor in percent
    pub scale_percent: u16,
}

impl RenderParams {
    /// Create render parameters.
    pub fn new(style: impl Into<Arc<str>>, scale_percent: u16) -> Self {
        Self {
            style: style.into(),
            scale_percent,
        }
    }
}

impl Default for RenderParams {
    fn default() -> Self {
        Self::new("default", 100)
    }
}

// =============================================================================
// Tile Key
// =============================================================================

/// Key identifying a rendered tile, in the caches and in the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    /// The tile
    pub tile: Tile,

    /// Whether the bitmap carries an alpha channel
    pub has_alpha: bool,

    /// Render parameters
    pub render_params: RenderParams,
}

impl TileKey {
    /// Create a new key.
    pub fn new(tile: Tile, has_alpha: bool, render_params: RenderParams) -> Self {
        Self {
            tile,
            has_alpha,
            render_params,
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}[{}%{}]",
            self.tile,
            self.tile.tile_size,
            self.render_params.scale_percent,
            if self.has_alpha { ",alpha" } else { "" }
        )
    }
}
