use tracing::debug;

use super::header::{parse_header, MapFileInfo};
use super::sub_file::{SubFileParameter, ZoomLookupTable};
use crate::error::FormatError;

/// Validated header of a map file with its zoom level lookup table.
///
/// Built once per opened file and immutable afterwards. Renderers receive
/// it to locate the sub-file and blocks of a tile.
#[derive(Debug, Clone)]
pub struct MapFileIndex {
    info: MapFileInfo,
    sub_files: Vec<SubFileParameter>,
    zoom_table: ZoomLookupTable,
    zoom_level_min: u8,
    zoom_level_max: u8,
}

impl MapFileIndex {
    /// Parse a complete map file held in memory.
    ///
    /// The actual file size is the length of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        Self::parse_header(bytes, bytes.len() as u64)
    }

    /// Parse a map file of which only the header is in memory.
    ///
    /// `bytes` must start at the beginning of the file and hold the whole
    /// header; `file_size` is the actual size of the file.
    pub fn parse_header(bytes: &[u8], file_size: u64) -> Result<Self, FormatError> {
        let parsed = parse_header(bytes, file_size)?;

        // At least one sub-file is guaranteed by the parser
        let zoom_level_min = parsed
            .sub_files
            .iter()
            .map(|s| s.zoom_level_min)
            .min()
            .unwrap_or(0);
        let zoom_level_max = parsed
            .sub_files
            .iter()
            .map(|s| s.zoom_level_max)
            .max()
            .unwrap_or(0);

        let zoom_table = ZoomLookupTable::build(&parsed.sub_files);

        debug!(
            version = parsed.info.file_version,
            sub_files = parsed.sub_files.len(),
            zoom_level_min,
            zoom_level_max,
            "Parsed map file header"
        );

        Ok(Self {
            info: parsed.info,
            sub_files: parsed.sub_files,
            zoom_table,
            zoom_level_min,
            zoom_level_max,
        })
    }

    /// Map metadata.
    pub fn info(&self) -> &MapFileInfo {
        &self.info
    }

    /// Sub-files in file order.
    pub fn sub_files(&self) -> &[SubFileParameter] {
        &self.sub_files
    }

    /// The zoom level lookup table.
    pub fn zoom_table(&self) -> &ZoomLookupTable {
        &self.zoom_table
    }

    /// Lowest zoom level served by any sub-file.
    pub fn zoom_level_min(&self) -> u8 {
        self.zoom_level_min
    }

    /// Highest zoom level served by any sub-file.
    pub fn zoom_level_max(&self) -> u8 {
        self.zoom_level_max
    }

    /// Clamp a requested zoom level into the range the file supports.
    pub fn query_zoom_level(&self, zoom_level: u8) -> u8 {
        zoom_level.clamp(self.zoom_level_min, self.zoom_level_max)
    }

    /// Sub-file covering a query zoom level.
    ///
    /// Use [`query_zoom_level`](Self::query_zoom_level) first to map an
    /// arbitrary zoom level into the supported range.
    pub fn sub_file_parameter(&self, query_zoom_level: u8) -> Option<&SubFileParameter> {
        self.zoom_table
            .get(query_zoom_level)
            .and_then(|index| self.sub_files.get(index))
    }
}
