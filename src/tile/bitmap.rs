use std::ops::Deref;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use image::{Rgba, RgbaImage};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

// =============================================================================
// Tile Bitmap
// =============================================================================

/// Pixel buffer of a rendered tile or a frame.
///
/// Pixels sit behind a read/write lock so that a frame buffer slot can be
/// drawn into by the producer while other holders keep the handle.
#[derive(Debug)]
pub struct TileBitmap {
    pixels: RwLock<RgbaImage>,
    timestamp: SystemTime,
    expiration: Option<SystemTime>,
}

impl TileBitmap {
    /// Wrap an image, timestamped now.
    pub fn from_image(image: RgbaImage) -> Self {
        Self {
            pixels: RwLock::new(image),
            timestamp: SystemTime::now(),
            expiration: None,
        }
    }

    /// Create a bitmap filled with one colour.
    pub fn filled(width: u32, height: u32, color: Rgba<u8>) -> Self {
        Self::from_image(RgbaImage::from_pixel(width, height, color))
    }

    /// Set the time the underlying data was retrieved.
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the time after which the bitmap should be re-rendered.
    pub fn with_expiration(mut self, expiration: SystemTime) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn width(&self) -> u32 {
        self.pixels.read().width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.read().height()
    }

    /// Width and height in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.read().dimensions()
    }

    /// Time the underlying data was retrieved.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Expiration time, if any.
    pub fn expiration(&self) -> Option<SystemTime> {
        self.expiration
    }

    /// Whether the expiration time has passed.
    pub fn is_expired(&self) -> bool {
        self.expiration
            .map(|expiration| expiration <= SystemTime::now())
            .unwrap_or(false)
    }

    /// Lock the pixels for reading.
    pub fn pixels(&self) -> RwLockReadGuard<'_, RgbaImage> {
        self.pixels.read()
    }

    /// Lock the pixels for writing.
    pub fn pixels_mut(&self) -> RwLockWriteGuard<'_, RgbaImage> {
        self.pixels.write()
    }

    /// Fill every pixel with one colour.
    pub fn fill(&self, color: Rgba<u8>) {
        for pixel in self.pixels.write().pixels_mut() {
            *pixel = color;
        }
    }

    /// Copy another bitmap onto this one with its top-left corner at
    /// (`x`, `y`); parts falling outside are clipped.
    pub fn draw_bitmap(&self, source: &TileBitmap, x: i64, y: i64) {
        let source = source.pixels.read();
        let mut target = self.pixels.write();
        image::imageops::replace(&mut *target, &*source, x, y);
    }
}

// =============================================================================
// Cached Bitmap
// =============================================================================

/// Shared handle to a [`TileBitmap`].
///
/// Every clone is one more holder (a cache tier, a frame buffer, an
/// in-flight draw); dropping a clone releases it. The pixel memory is freed
/// when the last holder drops its handle, never earlier, so evicting a
/// bitmap from a cache cannot free it under a concurrent draw.
#[derive(Debug, Clone)]
pub struct CachedBitmap(Arc<TileBitmap>);

impl CachedBitmap {
    /// Take shared ownership of a bitmap; the count starts at one.
    pub fn new(bitmap: TileBitmap) -> Self {
        Self(Arc::new(bitmap))
    }

    /// Number of live holders.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Whether both handles share the same pixels.
    pub fn ptr_eq(&self, other: &CachedBitmap) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Non-owning handle, upgradeable while any holder remains.
    pub fn downgrade(&self) -> Weak<TileBitmap> {
        Arc::downgrade(&self.0)
    }
}

impl Deref for CachedBitmap {
    type Target = TileBitmap;

    fn deref(&self) -> &TileBitmap {
        &self.0
    }
}

impl From<TileBitmap> for CachedBitmap {
    fn from(bitmap: TileBitmap) -> Self {
        Self::new(bitmap)
    }
}
