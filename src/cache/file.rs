//! Disk tile cache.
//!
//! Tiles are stored as PNG files in a three-level tree:
//!
//! ```text
//! <root>/<zoom>/<tile_x>/<tile_y>.tile
//! ```
//!
//! The key → path index lives in memory behind a read/write lock. In
//! persistent mode the index survives restarts: `destroy` writes it to
//! `index.json`, and the next instance loads that file or, if it is
//! missing, rebuilds the index by walking the tree on a background thread.
//!
//! A file cache serves a single render scope (tile size, alpha and render
//! parameters), since only the tile numbers are recoverable from a path.

use std::collections::HashSet;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::SystemTime;

use image::ImageFormat;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::working_set::WorkingSetCache;
use super::TileCache;
use crate::error::CacheError;
use crate::tile::{CachedBitmap, RenderParams, Tile, TileBitmap, TileKey, DEFAULT_TILE_SIZE};

/// Extension of tile files.
pub const TILE_FILE_EXTENSION: &str = "tile";

/// Name of the serialized index in the cache root.
pub const CACHE_INDEX_FILE_NAME: &str = "index.json";

/// Extension of files being written.
const TEMP_FILE_EXTENSION: &str = "tmp";

// =============================================================================
// Options
// =============================================================================

/// Settings of a [`FileCache`].
#[derive(Debug, Clone)]
pub struct FileCacheOptions {
    /// Maximum number of tiles on disk
    pub capacity: usize,

    /// Keep tiles and index across restarts
    pub persistent: bool,

    /// Tile size of the served render scope
    pub tile_size: u32,

    /// Alpha channel of the served render scope
    pub has_alpha: bool,

    /// Render parameters of the served render scope
    pub render_params: RenderParams,
}

impl Default for FileCacheOptions {
    fn default() -> Self {
        Self {
            capacity: 1024,
            persistent: false,
            tile_size: DEFAULT_TILE_SIZE,
            has_alpha: false,
            render_params: RenderParams::default(),
        }
    }
}

// =============================================================================
// Serialized Index
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    tile_size: u32,
    /// Least recently used first
    tiles: Vec<IndexRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexRecord {
    zoom_level: u8,
    tile_x: u32,
    tile_y: u32,
}

// =============================================================================
// File Cache
// =============================================================================

/// Index value: the tile file and the write that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TileEntry {
    path: PathBuf,
    generation: u64,
}

struct Inner {
    root: PathBuf,
    options: FileCacheOptions,
    index: RwLock<WorkingSetCache<TileKey, TileEntry>>,
    generation: AtomicU64,
    disabled: AtomicBool,
    stop_scan: AtomicBool,
}

/// Tile cache storing PNG files on disk.
///
/// - A file that cannot be read or decoded is removed and reported as a
///   miss.
/// - A failed write disables the cache for the rest of the process: its
///   files are removed and every later operation is a no-op.
pub struct FileCache {
    inner: Arc<Inner>,
    scan: Mutex<Option<JoinHandle<()>>>,
}

impl FileCache {
    /// Open a cache rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>, options: FileCacheOptions) -> Result<Self, CacheError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let inner = Arc::new(Inner {
            index: RwLock::new(WorkingSetCache::new(options.capacity)),
            root,
            options,
            generation: AtomicU64::new(0),
            disabled: AtomicBool::new(false),
            stop_scan: AtomicBool::new(false),
        });

        let mut scan = None;
        if inner.options.persistent {
            match inner.load_index() {
                Ok(restored) => {
                    info!(root = %inner.root.display(), restored, "Loaded tile cache index");
                }
                Err(e) => {
                    debug!(error = %e, "No usable cache index, scanning cache directory");
                    let scanner = Arc::clone(&inner);
                    let handle = std::thread::Builder::new()
                        .name("tileforge-cache-scan".to_string())
                        .spawn(move || scanner.scan())?;
                    scan = Some(handle);
                }
            }
        }

        Ok(Self {
            inner,
            scan: Mutex::new(scan),
        })
    }

    /// Root directory of the cache.
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Whether a write failure disabled the cache.
    pub fn is_disabled(&self) -> bool {
        self.inner.is_disabled()
    }

    /// Whether the cache keeps its tiles across restarts.
    pub fn is_persistent(&self) -> bool {
        self.inner.options.persistent
    }

    /// Number of indexed tiles.
    pub fn len(&self) -> usize {
        self.inner.index.read().len()
    }

    /// Check if no tile is indexed.
    pub fn is_empty(&self) -> bool {
        self.inner.index.read().is_empty()
    }

    /// Block until the background directory scan, if any, has finished.
    pub fn wait_for_scan(&self) {
        let handle = self.scan.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("cache directory scan panicked");
            }
        }
    }

    fn stop_scan(&self) {
        self.inner.stop_scan.store(true, Ordering::SeqCst);
        self.wait_for_scan();
    }
}

impl Drop for FileCache {
    fn drop(&mut self) {
        self.stop_scan();
    }
}

impl TileCache for FileCache {
    fn contains_key(&self, key: &TileKey) -> bool {
        !self.inner.is_disabled() && self.inner.index.read().contains_key(key)
    }

    fn get(&self, key: &TileKey) -> Option<CachedBitmap> {
        if self.inner.is_disabled() {
            return None;
        }
        let entry = self.inner.index.write().get(key).cloned()?;

        match read_tile(&entry.path) {
            Ok(bitmap) => Some(CachedBitmap::new(bitmap)),
            Err(e) => {
                warn!(key = %key, path = %entry.path.display(), error = %e, "Dropping unreadable cached tile");
                self.inner.drop_unreadable(key, &entry);
                None
            }
        }
    }

    fn get_immediately(&self, key: &TileKey) -> Option<CachedBitmap> {
        self.get(key)
    }

    fn put(&self, key: TileKey, bitmap: CachedBitmap) {
        if self.inner.is_disabled() || self.inner.index.read().capacity() == 0 {
            return;
        }
        if !self.inner.in_scope(&key) {
            debug!(key = %key, "tile outside the render scope of the file cache");
            return;
        }

        let path = self.inner.tile_path(&key.tile);
        if let Err(e) = write_tile(&path, &bitmap, self.inner.options.has_alpha) {
            error!(path = %path.display(), error = %e, "Failed to write tile, disabling file cache");
            self.inner.disable();
            return;
        }

        let entry = self.inner.entry(path);
        let displaced = self.inner.index.write().put(key, entry.clone());
        if let Some((_, old)) = displaced {
            if old.path != entry.path {
                remove_file(&old.path);
            }
        }
    }

    fn purge(&self) {
        let entries = self.inner.index.write().drain();
        for (_, entry) in &entries {
            remove_file(&entry.path);
        }
        prune_empty_dirs(&self.inner.root);
        debug!(count = entries.len(), "purged file cache");
    }

    fn set_working_set(&self, keys: &HashSet<TileKey>) {
        if !self.inner.is_disabled() {
            self.inner.index.write().set_working_set(keys);
        }
    }

    fn capacity(&self) -> usize {
        if self.inner.is_disabled() {
            0
        } else {
            self.inner.index.read().capacity()
        }
    }

    fn capacity_first_level(&self) -> usize {
        self.capacity()
    }

    fn destroy(&self) {
        self.stop_scan();
        if self.inner.is_disabled() {
            return;
        }
        if self.inner.options.persistent {
            match self.inner.save_index() {
                Ok(count) => info!(root = %self.inner.root.display(), count, "Saved tile cache index"),
                Err(e) => warn!(error = %e, "Failed to save tile cache index"),
            }
        } else {
            self.purge();
        }
    }
}

impl Inner {
    fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    fn in_scope(&self, key: &TileKey) -> bool {
        key.tile.tile_size == self.options.tile_size
            && key.has_alpha == self.options.has_alpha
            && key.render_params == self.options.render_params
    }

    fn key_for(&self, tile_x: u32, tile_y: u32, zoom_level: u8) -> TileKey {
        TileKey::new(
            Tile::new(tile_x, tile_y, zoom_level, self.options.tile_size),
            self.options.has_alpha,
            self.options.render_params.clone(),
        )
    }

    fn entry(&self, path: PathBuf) -> TileEntry {
        TileEntry {
            path,
            generation: self.generation.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Remove an entry whose file could not be read, unless a newer write
    /// replaced it in the meantime.
    fn drop_unreadable(&self, key: &TileKey, entry: &TileEntry) {
        let mut index = self.index.write();
        if index.peek(key) != Some(entry) {
            debug!(key = %key, "cached tile rewritten during read, keeping it");
            return;
        }
        index.remove(key);
        remove_file(&entry.path);
    }

    fn tile_path(&self, tile: &Tile) -> PathBuf {
        self.root
            .join(tile.zoom_level.to_string())
            .join(tile.tile_x.to_string())
            .join(format!("{}.{}", tile.tile_y, TILE_FILE_EXTENSION))
    }

    fn disable(&self) {
        if self.disabled.swap(true, Ordering::SeqCst) {
            return;
        }
        let entries = self.index.write().drain();
        for (_, entry) in &entries {
            remove_file(&entry.path);
        }
    }

    /// Restore the index from `index.json`, removing the file.
    fn load_index(&self) -> Result<usize, CacheError> {
        let path = self.root.join(CACHE_INDEX_FILE_NAME);
        let data = fs::read(&path)?;
        remove_file(&path);

        let file: IndexFile =
            serde_json::from_slice(&data).map_err(|e| CacheError::Index(e.to_string()))?;
        if file.tile_size != self.options.tile_size {
            return Err(CacheError::Index(format!(
                "index written for tile size {}, expected {}",
                file.tile_size, self.options.tile_size
            )));
        }

        let mut index = self.index.write();
        for record in file.tiles {
            let key = self.key_for(record.tile_x, record.tile_y, record.zoom_level);
            let tile_path = self.tile_path(&key.tile);
            if tile_path.is_file() {
                if let Some((_, evicted)) = index.put(key, self.entry(tile_path)) {
                    remove_file(&evicted.path);
                }
            }
        }
        Ok(index.len())
    }

    fn save_index(&self) -> Result<usize, CacheError> {
        let tiles: Vec<IndexRecord> = self
            .index
            .read()
            .keys_lru()
            .map(|key| IndexRecord {
                zoom_level: key.tile.zoom_level,
                tile_x: key.tile.tile_x,
                tile_y: key.tile.tile_y,
            })
            .collect();
        let count = tiles.len();

        let file = IndexFile {
            tile_size: self.options.tile_size,
            tiles,
        };
        let data = serde_json::to_vec(&file).map_err(|e| CacheError::Index(e.to_string()))?;
        fs::write(self.root.join(CACHE_INDEX_FILE_NAME), data)?;
        Ok(count)
    }

    /// Walk the cache tree and insert found tiles, newest first, behind
    /// everything already indexed.
    fn scan(&self) {
        let mut found = Vec::new();
        for (zoom_level, zoom_dir) in numbered_entries::<u8>(&self.root) {
            for (tile_x, x_dir) in numbered_entries::<u32>(&zoom_dir) {
                let Ok(files) = fs::read_dir(&x_dir) else {
                    continue;
                };
                for file in files.flatten() {
                    let path = file.path();
                    if path.extension().and_then(|e| e.to_str()) != Some(TILE_FILE_EXTENSION) {
                        continue;
                    }
                    let Some(tile_y) = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .and_then(|s| s.parse::<u32>().ok())
                    else {
                        continue;
                    };
                    let modified = file
                        .metadata()
                        .and_then(|m| m.modified())
                        .unwrap_or(SystemTime::UNIX_EPOCH);
                    found.push((modified, self.key_for(tile_x, tile_y, zoom_level), path));
                }
            }
        }

        found.sort_by(|a, b| b.0.cmp(&a.0));
        let total = found.len();
        let mut restored = 0;

        for (_, key, path) in found {
            if self.stop_scan.load(Ordering::SeqCst) || self.is_disabled() {
                break;
            }
            let rejected = {
                let mut index = self.index.write();
                if index.contains_key(&key) {
                    continue;
                }
                index.put_cold(key, self.entry(path))
            };
            // Cold inserts into a full index are handed straight back
            match rejected {
                Some((_, entry)) => remove_file(&entry.path),
                None => restored += 1,
            }
        }

        info!(root = %self.root.display(), total, restored, "Finished cache directory scan");
    }
}

/// Subdirectories of `dir` whose names parse as numbers.
fn numbered_entries<T: std::str::FromStr>(dir: &Path) -> Vec<(T, PathBuf)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| {
            let number = entry.file_name().to_str()?.parse::<T>().ok()?;
            Some((number, entry.path()))
        })
        .collect()
}

fn read_tile(path: &Path) -> Result<TileBitmap, CacheError> {
    let data = fs::read(path)?;
    let image = image::load_from_memory_with_format(&data, ImageFormat::Png)
        .map_err(|e| CacheError::Decode(e.to_string()))?
        .into_rgba8();
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or_else(|_| SystemTime::now());
    Ok(TileBitmap::from_image(image).with_timestamp(modified))
}

fn write_tile(path: &Path, bitmap: &TileBitmap, has_alpha: bool) -> Result<(), CacheError> {
    let mut data = Vec::new();
    {
        let pixels = bitmap.pixels();
        let result = if has_alpha {
            pixels.write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
        } else {
            image::DynamicImage::ImageRgba8((*pixels).clone())
                .into_rgb8()
                .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
        };
        result.map_err(|e| CacheError::Encode(e.to_string()))?;
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp = path.with_extension(TEMP_FILE_EXTENSION);
    fs::write(&temp, &data)?;
    fs::rename(&temp, path)?;
    Ok(())
}

fn remove_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %path.display(), error = %e, "failed to remove cache file");
        }
    }
}

/// Remove empty tile directories below the root.
fn prune_empty_dirs(root: &Path) {
    for (_, zoom_dir) in numbered_entries::<u8>(root) {
        for (_, x_dir) in numbered_entries::<u32>(&zoom_dir) {
            remove_empty_dir(&x_dir);
        }
        remove_empty_dir(&zoom_dir);
    }
}

fn remove_empty_dir(dir: &Path) {
    if let Err(e) = fs::remove_dir(dir) {
        if !is_dir_not_empty(&e) {
            debug!(path = %dir.display(), error = %e, "failed to remove cache directory");
        }
    }
}

/// Whether `remove_dir` failed because the directory still has entries.
fn is_dir_not_empty(error: &std::io::Error) -> bool {
    // ENOTEMPTY on Linux and macOS, ERROR_DIR_NOT_EMPTY on Windows
    matches!(error.raw_os_error(), Some(39) | Some(66) | Some(145))
}
