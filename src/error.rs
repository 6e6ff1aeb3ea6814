use thiserror::Error;

/// I/O errors that can occur when reading map data
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error reported by the underlying file or device
    #[error("I/O error: {0}")]
    Io(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            IoError::NotFound(err.to_string())
        } else {
            IoError::Io(err.to_string())
        }
    }
}

/// Errors that can occur when parsing a binary map file header.
///
/// Parsing fails fast: the first violation is reported and no partial
/// header is ever returned.
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// The buffer ended before a field could be read
    #[error("Truncated header: need {needed} bytes at offset {offset}, only {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Magic string at the start of the file does not match
    #[error("Invalid magic bytes: {0:?}")]
    InvalidMagic(String),

    /// Remaining header size outside [70, 1_000_000]
    #[error("Invalid remaining header size: {0}")]
    InvalidHeaderSize(u32),

    /// File version outside the supported range
    #[error("Unsupported file version: {0}")]
    UnsupportedVersion(u32),

    /// File size stored in the header differs from the actual size
    #[error("Invalid file size: header says {header}, actual size is {actual}")]
    FileSizeMismatch { header: u64, actual: u64 },

    /// Map date before 2008-01-10
    #[error("Invalid map date: {0}")]
    InvalidMapDate(i64),

    /// Bounding box with inverted or out-of-range coordinates
    #[error("Invalid bounding box: ({min_lat}, {min_lon}) - ({max_lat}, {max_lon})")]
    InvalidBoundingBox {
        min_lat: f64,
        min_lon: f64,
        max_lat: f64,
        max_lon: f64,
    },

    /// Projection other than Mercator
    #[error("Unsupported projection: {0}")]
    UnsupportedProjection(String),

    /// Map start position outside valid coordinates
    #[error("Invalid map start position: ({lat}, {lon})")]
    InvalidStartPosition { lat: f64, lon: f64 },

    /// Map start zoom level above 22
    #[error("Invalid map start zoom level: {0}")]
    InvalidStartZoom(u8),

    /// Language preference that is not a two-letter code
    #[error("Invalid language preference: {0:?}")]
    InvalidLanguage(String),

    /// Empty or undecodable entry in a tag table
    #[error("{kind} tag must not be null: {index}")]
    NullTag { kind: &'static str, index: usize },

    /// String that could not be decoded as UTF-8 or has an invalid length
    #[error("Invalid string at offset {offset}: {message}")]
    InvalidString { offset: usize, message: String },

    /// Zero sub-files
    #[error("Invalid number of sub-files: {0}")]
    InvalidSubFileCount(u8),

    /// Base zoom level above 20
    #[error("Invalid base zoom level: {0}")]
    InvalidBaseZoom(u8),

    /// Minimum zoom level above 22
    #[error("Invalid minimum zoom level: {0}")]
    InvalidZoomMin(u8),

    /// Maximum zoom level above 22
    #[error("Invalid maximum zoom level: {0}")]
    InvalidZoomMax(u8),

    /// Minimum zoom level greater than maximum zoom level
    #[error("Invalid zoom level range: {min} {max}")]
    InvalidZoomRange { min: u8, max: u8 },

    /// Sub-file start address outside [70, file size)
    #[error("Invalid start address: {0}")]
    InvalidStartAddress(u64),

    /// Sub-file size of zero
    #[error("Invalid sub-file size: {0}")]
    InvalidSubFileSize(u64),

    /// Block number outside the sub-file grid
    #[error("Invalid block number: {block} (sub-file has {blocks} blocks)")]
    InvalidBlockNumber { block: u64, blocks: u64 },
}

/// Errors raised inside the disk cache tier.
///
/// These never escape a cache operation: a failed read is reported as a
/// miss and a failed write disables the tier.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// File system error
    #[error("Cache I/O error: {0}")]
    Io(String),

    /// Stored tile could not be decoded
    #[error("Corrupted cache entry: {0}")]
    Decode(String),

    /// Bitmap could not be encoded for storage
    #[error("Failed to encode tile: {0}")]
    Encode(String),

    /// Serialized index could not be read or written
    #[error("Cache index error: {0}")]
    Index(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err.to_string())
    }
}

/// Errors reported by a tile renderer.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// The map file has no sub-file for the requested zoom level
    #[error("No sub-file covers zoom level {0}")]
    NoSubFile(u8),

    /// Map data could not be read
    #[error("Map data error: {0}")]
    Format(#[from] FormatError),

    /// Renderer-specific failure
    #[error("Render failed: {0}")]
    Failed(String),
}
