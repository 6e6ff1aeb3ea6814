use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::header::{read_header_prefix, HEADER_PREFIX_SIZE, ZOOM_LEVEL_MAX};
use super::index::MapFileIndex;
use super::sub_file::SubFileParameter;
use crate::error::FormatError;
use crate::io::{
    FileRangeReader, IndexCache, IndexEntry, RangeReader, DEFAULT_INDEX_CACHE_CAPACITY,
};

/// An opened map file: the parsed header plus cached access to the block
/// indexes of its sub-files.
///
/// Only the header is read on open. Index blocks are fetched on demand
/// through an LRU cache shared by all threads using the file.
pub struct MapFile<R: RangeReader = FileRangeReader> {
    index: Arc<MapFileIndex>,
    index_cache: IndexCache<R>,
    identifier: String,
}

impl MapFile<FileRangeReader> {
    /// Open a map file on disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FormatError> {
        let reader = FileRangeReader::open(path)?;
        Self::from_reader(Arc::new(reader))
    }
}

impl<R: RangeReader> MapFile<R> {
    /// Parse the header of a map file behind any range reader.
    pub fn from_reader(reader: Arc<R>) -> Result<Self, FormatError> {
        Self::with_index_cache_capacity(reader, DEFAULT_INDEX_CACHE_CAPACITY)
    }

    /// Like [`from_reader`](Self::from_reader) with an explicit index cache
    /// capacity in blocks.
    pub fn with_index_cache_capacity(
        reader: Arc<R>,
        capacity: usize,
    ) -> Result<Self, FormatError> {
        let file_size = reader.size();
        let identifier = reader.identifier().to_string();

        let prefix = read_available(reader.as_ref(), HEADER_PREFIX_SIZE)?;
        let header_size = read_header_prefix(&prefix)? as usize;

        let header = read_available(reader.as_ref(), HEADER_PREFIX_SIZE + header_size)?;
        let index = MapFileIndex::parse_header(&header, file_size)?;

        info!(
            identifier = %identifier,
            file_size,
            sub_files = index.sub_files().len(),
            zoom_min = index.zoom_level_min(),
            zoom_max = index.zoom_level_max(),
            "Opened map file"
        );

        Ok(Self {
            index: Arc::new(index),
            index_cache: IndexCache::new(reader, capacity),
            identifier,
        })
    }

    /// The parsed header.
    pub fn index(&self) -> &Arc<MapFileIndex> {
        &self.index
    }

    /// Identifier of the underlying resource.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Read the index entry of a block.
    ///
    /// Fails with [`FormatError::InvalidBlockNumber`] for block numbers
    /// outside the sub-file grid.
    pub fn index_entry(
        &self,
        sub_file: &SubFileParameter,
        block_number: u64,
    ) -> Result<IndexEntry, FormatError> {
        self.index_cache.get_index_entry(sub_file, block_number)
    }

    /// Read the index entry of the block holding a tile.
    ///
    /// The tile is given at `zoom_level`; it is mapped onto the block grid
    /// of the covering sub-file. Returns `Ok(None)` when no sub-file covers
    /// the zoom level or the tile lies outside the map.
    pub fn tile_index_entry(
        &self,
        tile_x: u32,
        tile_y: u32,
        zoom_level: u8,
    ) -> Result<Option<(u64, IndexEntry)>, FormatError> {
        let query_zoom = self.index.query_zoom_level(zoom_level);
        let Some(sub_file) = self.index.sub_file_parameter(query_zoom) else {
            return Ok(None);
        };

        let Some(block_number) = tile_to_base_zoom(tile_x, tile_y, zoom_level, sub_file)
            .and_then(|(block_x, block_y)| sub_file.block_number(block_x, block_y))
        else {
            debug!(tile_x, tile_y, zoom_level, "tile outside sub-file grid");
            return Ok(None);
        };

        let entry = self.index_entry(sub_file, block_number)?;
        Ok(Some((block_number, entry)))
    }
}

/// Map a tile onto the tile grid of the sub-file's base zoom level.
///
/// Returns `None` for zoom levels beyond [`ZOOM_LEVEL_MAX`].
fn tile_to_base_zoom(
    tile_x: u32,
    tile_y: u32,
    zoom_level: u8,
    sub_file: &SubFileParameter,
) -> Option<(u32, u32)> {
    if zoom_level > ZOOM_LEVEL_MAX {
        return None;
    }
    let base = sub_file.base_zoom_level;
    if zoom_level >= base {
        let shift = u32::from(zoom_level - base);
        Some((tile_x.checked_shr(shift)?, tile_y.checked_shr(shift)?))
    } else {
        let shift = u32::from(base - zoom_level);
        Some((tile_x.checked_shl(shift)?, tile_y.checked_shl(shift)?))
    }
}

/// Read the first `len` bytes, reporting a short file as truncated.
fn read_available<R: RangeReader + ?Sized>(
    reader: &R,
    len: usize,
) -> Result<bytes::Bytes, FormatError> {
    let size = reader.size();
    if (len as u64) > size {
        return Err(FormatError::Truncated {
            offset: 0,
            needed: len,
            available: size as usize,
        });
    }
    Ok(reader.read_exact_at(0, len)?)
}
