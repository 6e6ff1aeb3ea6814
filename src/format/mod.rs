//! Binary map file format.
//!
//! This module parses the header of "mapsforge binary OSM" map files and
//! provides random access to the block index of each sub-file.
//!
//! # Key Concepts
//!
//! - **Header**: magic bytes, metadata (bounding box, date, tag tables),
//!   optional fields selected by a flags byte, and the sub-file table.
//!   Parsing fails on the first violation; there is no partial result.
//!
//! - **Sub-file**: a region of the file serving an inclusive zoom range.
//!   Its map data is split into blocks on the tile grid of its base zoom
//!   level, with a 5-byte index entry per block.
//!
//! - **Zoom lookup table**: maps every zoom level to the covering sub-file.
//!   Requested zoom levels are first clamped into the supported range.

mod geo;
mod header;
mod index;
mod map_file;
pub mod mercator;
mod sub_file;

pub use geo::{microdegrees_to_degrees, BoundingBox, LatLong};
pub use header::{
    read_header_prefix, MapFileInfo, OptionalFields, BASE_ZOOM_LEVEL_MAX, BINARY_OSM_MAGIC_BYTE,
    HEADER_PREFIX_SIZE, HEADER_SIZE_MAX, HEADER_SIZE_MIN, SUPPORTED_FILE_VERSION_MAX,
    SUPPORTED_FILE_VERSION_MIN, ZOOM_LEVEL_MAX,
};
pub use index::MapFileIndex;
pub use map_file::MapFile;
pub use sub_file::{
    SubFileParameter, ZoomLookupTable, BYTES_PER_INDEX_ENTRY, SIGNATURE_LENGTH_INDEX,
};
