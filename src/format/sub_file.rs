//! Sub-file parameters and the zoom level lookup table.
//!
//! A map file is split into sub-files, each covering an inclusive range of
//! zoom levels. Every sub-file stores its map data in blocks laid out on
//! the tile grid of its base zoom level, preceded by an index with one
//! 5-byte entry per block.

use serde::Serialize;
use tracing::debug;

use super::geo::BoundingBox;
use super::mercator::{latitude_to_tile_y, longitude_to_tile_x};

/// Number of bytes of a single block index entry.
pub const BYTES_PER_INDEX_ENTRY: u64 = 5;

/// Length of the debug signature preceding the index in debug files.
pub const SIGNATURE_LENGTH_INDEX: u64 = 16;

// =============================================================================
// SubFileParameter
// =============================================================================

/// Location and block grid of one sub-file.
#[derive(Debug, Clone, Serialize)]
pub struct SubFileParameter {
    /// Zoom level at which the block grid is defined
    pub base_zoom_level: u8,

    /// Lowest zoom level served by this sub-file
    pub zoom_level_min: u8,

    /// Highest zoom level served by this sub-file
    pub zoom_level_max: u8,

    /// Absolute position of the sub-file in the map file
    pub start_address: u64,

    /// Size of the sub-file in bytes
    pub sub_file_size: u64,

    /// Absolute position of the block index
    pub index_start_address: u64,

    /// Absolute end position of the block index
    pub index_end_address: u64,

    /// Northernmost tile row of the grid
    pub boundary_tile_top: u32,

    /// Southernmost tile row of the grid
    pub boundary_tile_bottom: u32,

    /// Westernmost tile column of the grid
    pub boundary_tile_left: u32,

    /// Easternmost tile column of the grid
    pub boundary_tile_right: u32,

    /// Number of block columns
    pub blocks_width: u64,

    /// Number of block rows
    pub blocks_height: u64,

    /// Total number of blocks
    pub number_of_blocks: u64,
}

impl SubFileParameter {
    /// Build a sub-file description, deriving its block grid from the
    /// bounding box of the map at the base zoom level.
    pub fn new(
        base_zoom_level: u8,
        zoom_level_min: u8,
        zoom_level_max: u8,
        start_address: u64,
        index_start_address: u64,
        sub_file_size: u64,
        bounding_box: &BoundingBox,
    ) -> Self {
        let boundary_tile_bottom = latitude_to_tile_y(bounding_box.min_latitude, base_zoom_level);
        let boundary_tile_left = longitude_to_tile_x(bounding_box.min_longitude, base_zoom_level);
        let boundary_tile_top = latitude_to_tile_y(bounding_box.max_latitude, base_zoom_level);
        let boundary_tile_right = longitude_to_tile_x(bounding_box.max_longitude, base_zoom_level);

        let blocks_width = (boundary_tile_right - boundary_tile_left) as u64 + 1;
        let blocks_height = (boundary_tile_bottom - boundary_tile_top) as u64 + 1;
        let number_of_blocks = blocks_width * blocks_height;

        Self {
            base_zoom_level,
            zoom_level_min,
            zoom_level_max,
            start_address,
            sub_file_size,
            index_start_address,
            index_end_address: index_start_address + number_of_blocks * BYTES_PER_INDEX_ENTRY,
            boundary_tile_top,
            boundary_tile_bottom,
            boundary_tile_left,
            boundary_tile_right,
            blocks_width,
            blocks_height,
            number_of_blocks,
        }
    }

    /// Whether this sub-file serves the given zoom level.
    pub fn covers(&self, zoom_level: u8) -> bool {
        (self.zoom_level_min..=self.zoom_level_max).contains(&zoom_level)
    }

    /// Block number of a tile at the base zoom level.
    ///
    /// Returns `None` for tiles outside the block grid.
    pub fn block_number(&self, tile_x: u32, tile_y: u32) -> Option<u64> {
        if tile_x < self.boundary_tile_left
            || tile_x > self.boundary_tile_right
            || tile_y < self.boundary_tile_top
            || tile_y > self.boundary_tile_bottom
        {
            return None;
        }
        let column = (tile_x - self.boundary_tile_left) as u64;
        let row = (tile_y - self.boundary_tile_top) as u64;
        Some(row * self.blocks_width + column)
    }
}

impl PartialEq for SubFileParameter {
    fn eq(&self, other: &Self) -> bool {
        self.start_address == other.start_address
            && self.sub_file_size == other.sub_file_size
            && self.base_zoom_level == other.base_zoom_level
    }
}

impl Eq for SubFileParameter {}

// =============================================================================
// ZoomLookupTable
// =============================================================================

/// Maps every zoom level `0..=zoom_max` to the index of the covering
/// sub-file.
///
/// Built in file order; when sub-files overlap, the later one wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoomLookupTable {
    entries: Vec<Option<usize>>,
}

impl ZoomLookupTable {
    /// Build the table from sub-files in file order.
    pub fn build(sub_files: &[SubFileParameter]) -> Self {
        let zoom_max = sub_files
            .iter()
            .map(|s| s.zoom_level_max as usize)
            .max()
            .unwrap_or(0);
        let mut entries = vec![None; zoom_max + 1];

        for (index, sub_file) in sub_files.iter().enumerate() {
            for zoom in sub_file.zoom_level_min..=sub_file.zoom_level_max {
                let slot = &mut entries[zoom as usize];
                if let Some(previous) = slot.replace(index) {
                    debug!(
                        zoom_level = zoom,
                        previous, index, "sub-file zoom ranges overlap, later sub-file wins"
                    );
                }
            }
        }

        Self { entries }
    }

    /// Index of the sub-file covering a zoom level.
    pub fn get(&self, zoom_level: u8) -> Option<usize> {
        self.entries.get(zoom_level as usize).copied().flatten()
    }

    /// Number of zoom levels in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
