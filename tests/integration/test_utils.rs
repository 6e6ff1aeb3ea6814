//! Test utilities for integration tests.
//!
//! This module provides a builder for synthetic map files with populated
//! block indexes, a reader that records its requests, a stub renderer and
//! a recording display surface.

use bytes::Bytes;
use image::Rgba;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tileforge::error::{IoError, RenderError};
use tileforge::format::{mercator, MapFileIndex, BINARY_OSM_MAGIC_BYTE};
use tileforge::framebuffer::DisplaySurface;
use tileforge::io::RangeReader;
use tileforge::scheduler::{RenderJob, Renderer};
use tileforge::tile::{TileBitmap, TileKey};
use tileforge::viewport::MapPosition;

/// Bounding box of the test maps in microdegrees: (50, 10) - (51, 11).
pub const TEST_BOUNDING_BOX: [i32; 4] = [50_000_000, 10_000_000, 51_000_000, 11_000_000];

/// Size of the (zero-filled) map data following each block index.
const BLOCK_DATA_LEN: u64 = 256;

// =============================================================================
// Map File Builder
// =============================================================================

/// One sub-file of a synthetic map file.
#[derive(Debug, Clone)]
pub struct SubFile {
    pub base_zoom: u8,
    pub zoom_min: u8,
    pub zoom_max: u8,
    /// Block numbers flagged as water
    pub water_blocks: HashSet<u64>,
}

impl SubFile {
    pub fn new(base_zoom: u8, zoom_min: u8, zoom_max: u8) -> Self {
        Self {
            base_zoom,
            zoom_min,
            zoom_max,
            water_blocks: HashSet::new(),
        }
    }

    pub fn with_water(mut self, block: u64) -> Self {
        self.water_blocks.insert(block);
        self
    }
}

/// Builds complete map files: header, then for every sub-file its block
/// index followed by zeroed block data.
///
/// Block `n` of a sub-file with `b` blocks has the offset `5 * b + n`.
#[derive(Debug, Clone)]
pub struct MapFileBuilder {
    pub version: u32,
    pub bounding_box: [i32; 4],
    pub start_position: Option<(i32, i32)>,
    pub start_zoom: Option<u8>,
    pub comment: Option<String>,
    pub created_by: Option<String>,
    pub poi_tags: Vec<String>,
    pub way_tags: Vec<String>,
    pub sub_files: Vec<SubFile>,
}

impl Default for MapFileBuilder {
    fn default() -> Self {
        Self {
            version: 3,
            bounding_box: TEST_BOUNDING_BOX,
            start_position: None,
            start_zoom: None,
            comment: None,
            created_by: None,
            poi_tags: Vec::new(),
            way_tags: Vec::new(),
            sub_files: vec![SubFile::new(10, 10, 12)],
        }
    }
}

impl MapFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sub_files(mut self, sub_files: Vec<SubFile>) -> Self {
        self.sub_files = sub_files;
        self
    }

    /// Number of blocks in the grid of a sub-file.
    pub fn number_of_blocks(&self, sub_file: &SubFile) -> u64 {
        let [min_lat, min_lon, max_lat, max_lon] = self.bounding_box.map(|v| v as f64 / 1e6);
        let zoom = sub_file.base_zoom;
        let width = mercator::longitude_to_tile_x(max_lon, zoom)
            - mercator::longitude_to_tile_x(min_lon, zoom)
            + 1;
        let height = mercator::latitude_to_tile_y(min_lat, zoom)
            - mercator::latitude_to_tile_y(max_lat, zoom)
            + 1;
        width as u64 * height as u64
    }

    fn sub_file_size(&self, sub_file: &SubFile) -> u64 {
        self.number_of_blocks(sub_file) * 5 + BLOCK_DATA_LEN
    }

    pub fn build(&self) -> Vec<u8> {
        // Addresses are fixed-width, so the header length does not depend
        // on them.
        let header_len = (BINARY_OSM_MAGIC_BYTE.len() + 4 + self.header_body(0).len()) as u64;
        let body = self.header_body(header_len);

        let mut out = Vec::new();
        out.extend_from_slice(BINARY_OSM_MAGIC_BYTE.as_bytes());
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);

        for sub_file in &self.sub_files {
            let blocks = self.number_of_blocks(sub_file);
            for block in 0..blocks {
                let mut raw = blocks * 5 + block;
                if sub_file.water_blocks.contains(&block) {
                    raw |= 0x80_0000_0000;
                }
                out.extend_from_slice(&raw.to_be_bytes()[3..]);
            }
            out.resize(out.len() + BLOCK_DATA_LEN as usize, 0);
        }
        out
    }

    fn file_size(&self, header_len: u64) -> u64 {
        header_len
            + self
                .sub_files
                .iter()
                .map(|s| self.sub_file_size(s))
                .sum::<u64>()
    }

    fn header_body(&self, header_len: u64) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.version.to_be_bytes());
        body.extend_from_slice(&self.file_size(header_len).to_be_bytes());
        body.extend_from_slice(&1_300_000_000_000i64.to_be_bytes());
        for value in self.bounding_box {
            body.extend_from_slice(&value.to_be_bytes());
        }
        body.extend_from_slice(&256u16.to_be_bytes());
        write_string(&mut body, "Mercator");

        let mut flags = 0u8;
        if self.start_position.is_some() {
            flags |= 0x40;
        }
        if self.start_zoom.is_some() {
            flags |= 0x20;
        }
        if self.comment.is_some() {
            flags |= 0x08;
        }
        if self.created_by.is_some() {
            flags |= 0x04;
        }
        body.push(flags);

        if let Some((lat, lon)) = self.start_position {
            body.extend_from_slice(&lat.to_be_bytes());
            body.extend_from_slice(&lon.to_be_bytes());
        }
        if let Some(zoom) = self.start_zoom {
            body.push(zoom);
        }
        for text in [&self.comment, &self.created_by].into_iter().flatten() {
            write_string(&mut body, text);
        }

        for tags in [&self.poi_tags, &self.way_tags] {
            body.extend_from_slice(&(tags.len() as u16).to_be_bytes());
            for tag in tags {
                write_string(&mut body, tag);
            }
        }

        body.push(self.sub_files.len() as u8);
        let mut start = header_len;
        for sub_file in &self.sub_files {
            body.push(sub_file.base_zoom);
            body.push(sub_file.zoom_min);
            body.push(sub_file.zoom_max);
            body.extend_from_slice(&start.to_be_bytes());
            let size = self.sub_file_size(sub_file);
            body.extend_from_slice(&size.to_be_bytes());
            start += size;
        }
        body
    }
}

fn write_string(out: &mut Vec<u8>, value: &str) {
    let mut len = value.len() as u32;
    loop {
        let byte = (len & 0x7F) as u8;
        len >>= 7;
        if len == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
    out.extend_from_slice(value.as_bytes());
}

/// Parsed header of the default test map.
pub fn test_map_index() -> Arc<MapFileIndex> {
    Arc::new(MapFileIndex::parse(&MapFileBuilder::new().build()).unwrap())
}

// =============================================================================
// Tracking Range Reader
// =============================================================================

/// An in-memory range reader that records every request.
pub struct TrackingReader {
    data: Bytes,
    requests: Mutex<Vec<(u64, usize)>>,
}

impl TrackingReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Bytes::from(data),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<(u64, usize)> {
        self.requests.lock().clone()
    }

    pub fn reset_tracking(&self) {
        self.requests.lock().clear();
    }
}

impl RangeReader for TrackingReader {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.requests.lock().push((offset, len));
        let start = offset as usize;
        let end = start + len;
        if end > self.data.len() {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.data.len() as u64,
            });
        }
        Ok(self.data.slice(start..end))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        "memory://tracking"
    }
}

// =============================================================================
// Stub Renderer
// =============================================================================

/// Renderer returning small flat bitmaps and recording the jobs it ran.
pub struct StubRenderer {
    color: Rgba<u8>,
    size: u32,
    delay: Duration,
    executed: Mutex<Vec<TileKey>>,
    calls: AtomicUsize,
    failing: Mutex<HashSet<TileKey>>,
}

impl StubRenderer {
    pub fn new(color: Rgba<u8>, size: u32) -> Self {
        Self {
            color,
            size,
            delay: Duration::ZERO,
            executed: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_on(&self, key: TileKey) {
        self.failing.lock().insert(key);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Keys of the successful jobs in execution order.
    pub fn executed(&self) -> Vec<TileKey> {
        self.executed.lock().clone()
    }
}

impl Renderer for StubRenderer {
    fn execute_job(&self, job: &RenderJob, _map: &MapFileIndex) -> Result<TileBitmap, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.failing.lock().contains(&job.key) {
            return Err(RenderError::Failed(format!("refusing {}", job.key)));
        }
        self.executed.lock().push(job.key.clone());
        Ok(TileBitmap::filled(self.size, self.size, self.color))
    }
}

// =============================================================================
// Recording Surface
// =============================================================================

/// Display surface remembering the frames it was shown.
#[derive(Default)]
pub struct RecordingSurface {
    /// (first pixel, position) of every frame
    pub frames: Vec<(Rgba<u8>, MapPosition)>,
}

impl DisplaySurface for RecordingSurface {
    fn draw_bitmap(&mut self, bitmap: &TileBitmap, position: &MapPosition) {
        let pixel = *bitmap.pixels().get_pixel(0, 0);
        self.frames.push((pixel, *position));
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
