//! Binary map file header parsing.
//!
//! # Header Structure
//!
//! All integers are big-endian; strings are prefixed with a variable-byte
//! encoded length.
//!
//! ```text
//! 20 bytes  magic "mapsforge binary OSM"
//! u32       remaining header size (70 ..= 1_000_000)
//! ----------- remaining header -----------
//! u32       file version
//! u64       file size
//! i64       map date (ms since epoch)
//! 4 x i32   bounding box (min lat, min lon, max lat, max lon), microdegrees
//! u16       tile pixel size
//! string    projection name ("Mercator")
//! u8        optional fields flags
//! ...       optional fields (start position, start zoom, language,
//!           comment, created by), each only if flagged
//! u16 + n   POI tags
//! u16 + n   way tags
//! u8        number of sub-files, then per sub-file:
//!           u8 base zoom, u8 zoom min, u8 zoom max, u64 start, u64 size
//! ```

use serde::Serialize;

use super::geo::{microdegrees_to_degrees, BoundingBox, LatLong};
use super::sub_file::{SubFileParameter, SIGNATURE_LENGTH_INDEX};
use crate::error::FormatError;
use crate::io::ReadBuffer;

// =============================================================================
// Constants
// =============================================================================

/// Magic bytes at the start of every map file.
pub const BINARY_OSM_MAGIC_BYTE: &str = "mapsforge binary OSM";

/// Length of the fixed prefix: magic bytes plus remaining header size.
pub const HEADER_PREFIX_SIZE: usize = BINARY_OSM_MAGIC_BYTE.len() + 4;

/// Minimum size of the remaining header, and lowest valid sub-file address.
pub const HEADER_SIZE_MIN: u32 = 70;

/// Maximum size of the remaining header.
pub const HEADER_SIZE_MAX: u32 = 1_000_000;

/// Lowest supported file version.
pub const SUPPORTED_FILE_VERSION_MIN: u32 = 3;

/// Highest supported file version.
pub const SUPPORTED_FILE_VERSION_MAX: u32 = 5;

/// Earliest valid map date (2008-01-10).
const MAP_DATE_MIN: i64 = 1_200_000_000_000;

/// The only supported projection.
const MERCATOR: &str = "Mercator";

/// Highest valid zoom level of a sub-file or the start zoom.
pub const ZOOM_LEVEL_MAX: u8 = 22;

/// Highest valid base zoom level of a sub-file.
pub const BASE_ZOOM_LEVEL_MAX: u8 = 20;

const HEADER_BITMASK_DEBUG: u8 = 0x80;
const HEADER_BITMASK_START_POSITION: u8 = 0x40;
const HEADER_BITMASK_START_ZOOM_LEVEL: u8 = 0x20;
const HEADER_BITMASK_LANGUAGE_PREFERENCE: u8 = 0x10;
const HEADER_BITMASK_COMMENT: u8 = 0x08;
const HEADER_BITMASK_CREATED_BY: u8 = 0x04;

/// Required length of a language preference.
const LANGUAGE_PREFERENCE_LENGTH: usize = 2;

// =============================================================================
// MapFileInfo
// =============================================================================

/// Fields present only when flagged in the header.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptionalFields {
    /// Whether the file carries debug signatures
    pub is_debug_file: bool,

    /// Suggested initial map center
    pub start_position: Option<LatLong>,

    /// Suggested initial zoom level
    pub start_zoom_level: Option<u8>,

    /// Two-letter preferred language for names
    pub language_preference: Option<String>,

    /// Free text comment
    pub comment: Option<String>,

    /// Name of the tool that wrote the file
    pub created_by: Option<String>,
}

/// Validated metadata of a map file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapFileInfo {
    /// Area covered by the map
    pub bounding_box: BoundingBox,

    /// Size of the file in bytes
    pub file_size: u64,

    /// Format version
    pub file_version: u32,

    /// Date of the map data in milliseconds since the epoch
    pub map_date: i64,

    /// Tile size in pixels the data was prepared for
    pub tile_pixel_size: u16,

    /// Projection name, always "Mercator"
    pub projection_name: String,

    /// Flagged optional fields
    #[serde(flatten)]
    pub optional: OptionalFields,

    /// POI tag table
    pub poi_tags: Vec<String>,

    /// Way tag table
    pub way_tags: Vec<String>,

    /// Number of sub-files
    pub number_of_sub_files: u8,
}

/// Result of parsing the whole header.
pub(crate) struct ParsedHeader {
    pub info: MapFileInfo,
    pub sub_files: Vec<SubFileParameter>,
}

// =============================================================================
// Parsing
// =============================================================================

/// Validate the magic bytes and read the remaining header size.
///
/// Requires the first [`HEADER_PREFIX_SIZE`] bytes of the file.
pub fn read_header_prefix(bytes: &[u8]) -> Result<u32, FormatError> {
    let mut buffer = ReadBuffer::new(bytes);

    let magic = buffer.read_bytes(BINARY_OSM_MAGIC_BYTE.len())?;
    if magic != BINARY_OSM_MAGIC_BYTE.as_bytes() {
        return Err(FormatError::InvalidMagic(
            String::from_utf8_lossy(magic).into_owned(),
        ));
    }

    let header_size = buffer.read_u32()?;
    if !(HEADER_SIZE_MIN..=HEADER_SIZE_MAX).contains(&header_size) {
        return Err(FormatError::InvalidHeaderSize(header_size));
    }

    Ok(header_size)
}

/// Parse the header from the start of the file.
///
/// `bytes` must hold at least the prefix plus the remaining header;
/// `file_size` is the actual size of the file.
pub(crate) fn parse_header(bytes: &[u8], file_size: u64) -> Result<ParsedHeader, FormatError> {
    let header_size = read_header_prefix(bytes)? as usize;

    // Bound the remaining header so nothing past it is ever interpreted
    let mut prefix = ReadBuffer::new(bytes);
    prefix.skip(HEADER_PREFIX_SIZE)?;
    let header = prefix.read_bytes(header_size)?;
    let mut buffer = ReadBuffer::new(header);

    let file_version = buffer.read_u32()?;
    if !(SUPPORTED_FILE_VERSION_MIN..=SUPPORTED_FILE_VERSION_MAX).contains(&file_version) {
        return Err(FormatError::UnsupportedVersion(file_version));
    }

    let header_file_size = buffer.read_u64()?;
    if header_file_size != file_size {
        return Err(FormatError::FileSizeMismatch {
            header: header_file_size,
            actual: file_size,
        });
    }

    let map_date = buffer.read_i64()?;
    if map_date < MAP_DATE_MIN {
        return Err(FormatError::InvalidMapDate(map_date));
    }

    let bounding_box = read_bounding_box(&mut buffer)?;
    let tile_pixel_size = buffer.read_u16()?;

    let projection_name = buffer.read_utf8()?.unwrap_or_default();
    if projection_name != MERCATOR {
        return Err(FormatError::UnsupportedProjection(projection_name));
    }

    let optional = read_optional_fields(&mut buffer)?;
    let poi_tags = read_tags(&mut buffer, "POI")?;
    let way_tags = read_tags(&mut buffer, "way")?;

    let sub_files =
        read_sub_file_parameters(&mut buffer, file_size, optional.is_debug_file, &bounding_box)?;

    let info = MapFileInfo {
        bounding_box,
        file_size,
        file_version,
        map_date,
        tile_pixel_size,
        projection_name,
        optional,
        poi_tags,
        way_tags,
        number_of_sub_files: sub_files.len() as u8,
    };

    Ok(ParsedHeader { info, sub_files })
}

fn read_bounding_box(buffer: &mut ReadBuffer<'_>) -> Result<BoundingBox, FormatError> {
    let min_latitude = microdegrees_to_degrees(buffer.read_i32()?);
    let min_longitude = microdegrees_to_degrees(buffer.read_i32()?);
    let max_latitude = microdegrees_to_degrees(buffer.read_i32()?);
    let max_longitude = microdegrees_to_degrees(buffer.read_i32()?);
    BoundingBox::new(min_latitude, min_longitude, max_latitude, max_longitude)
}

fn read_optional_fields(buffer: &mut ReadBuffer<'_>) -> Result<OptionalFields, FormatError> {
    let flags = buffer.read_u8()?;
    let mut fields = OptionalFields {
        is_debug_file: flags & HEADER_BITMASK_DEBUG != 0,
        ..Default::default()
    };

    if flags & HEADER_BITMASK_START_POSITION != 0 {
        let lat = microdegrees_to_degrees(buffer.read_i32()?);
        let lon = microdegrees_to_degrees(buffer.read_i32()?);
        let position = LatLong::new(lat, lon);
        if !position.is_valid() {
            return Err(FormatError::InvalidStartPosition { lat, lon });
        }
        fields.start_position = Some(position);
    }

    if flags & HEADER_BITMASK_START_ZOOM_LEVEL != 0 {
        let zoom = buffer.read_u8()?;
        if zoom > ZOOM_LEVEL_MAX {
            return Err(FormatError::InvalidStartZoom(zoom));
        }
        fields.start_zoom_level = Some(zoom);
    }

    if flags & HEADER_BITMASK_LANGUAGE_PREFERENCE != 0 {
        let language = buffer.read_utf8()?;
        if let Some(language) = &language {
            if language.len() != LANGUAGE_PREFERENCE_LENGTH {
                return Err(FormatError::InvalidLanguage(language.clone()));
            }
        }
        fields.language_preference = language;
    }

    if flags & HEADER_BITMASK_COMMENT != 0 {
        fields.comment = buffer.read_utf8()?;
    }

    if flags & HEADER_BITMASK_CREATED_BY != 0 {
        fields.created_by = buffer.read_utf8()?;
    }

    Ok(fields)
}

fn read_tags(buffer: &mut ReadBuffer<'_>, kind: &'static str) -> Result<Vec<String>, FormatError> {
    let count = buffer.read_u16()? as usize;
    let mut tags = Vec::with_capacity(count);
    for index in 0..count {
        match buffer.read_utf8() {
            Ok(Some(tag)) => tags.push(tag),
            Ok(None) | Err(FormatError::InvalidString { .. }) => {
                return Err(FormatError::NullTag { kind, index });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(tags)
}

fn read_sub_file_parameters(
    buffer: &mut ReadBuffer<'_>,
    file_size: u64,
    is_debug_file: bool,
    bounding_box: &BoundingBox,
) -> Result<Vec<SubFileParameter>, FormatError> {
    let count = buffer.read_u8()?;
    if count < 1 {
        return Err(FormatError::InvalidSubFileCount(count));
    }

    let mut sub_files = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let base_zoom_level = buffer.read_u8()?;
        if base_zoom_level > BASE_ZOOM_LEVEL_MAX {
            return Err(FormatError::InvalidBaseZoom(base_zoom_level));
        }

        let zoom_level_min = buffer.read_u8()?;
        if zoom_level_min > ZOOM_LEVEL_MAX {
            return Err(FormatError::InvalidZoomMin(zoom_level_min));
        }

        let zoom_level_max = buffer.read_u8()?;
        if zoom_level_max > ZOOM_LEVEL_MAX {
            return Err(FormatError::InvalidZoomMax(zoom_level_max));
        }

        if zoom_level_min > zoom_level_max {
            return Err(FormatError::InvalidZoomRange {
                min: zoom_level_min,
                max: zoom_level_max,
            });
        }

        let start_address = buffer.read_u64()?;
        if start_address < HEADER_SIZE_MIN as u64 || start_address >= file_size {
            return Err(FormatError::InvalidStartAddress(start_address));
        }

        let index_start_address = if is_debug_file {
            start_address + SIGNATURE_LENGTH_INDEX
        } else {
            start_address
        };

        let sub_file_size = buffer.read_u64()?;
        if sub_file_size < 1 {
            return Err(FormatError::InvalidSubFileSize(sub_file_size));
        }

        sub_files.push(SubFileParameter::new(
            base_zoom_level,
            zoom_level_min,
            zoom_level_max,
            start_address,
            index_start_address,
            sub_file_size,
            bounding_box,
        ));
    }

    Ok(sub_files)
}
