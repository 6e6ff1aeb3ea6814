//! Tiles, tile keys and rendered bitmaps.
//!
//! A [`TileKey`] identifies one rendering of a tile: the tile numbers, its
//! pixel size, whether it has an alpha channel and the render parameters.
//! The same key addresses a cache slot and a render job.
//!
//! Rendered pixels travel as [`CachedBitmap`] handles from the renderer to
//! the caches and on to the frame buffer:
//!
//! ```text
//! ┌──────────┐  TileBitmap  ┌─────────────┐  CachedBitmap  ┌──────────────┐
//! │ Renderer │ ───────────► │ Tile caches │ ─────────────► │ Frame buffer │
//! └──────────┘              └─────────────┘   (clone = +1) └──────────────┘
//! ```

mod bitmap;
mod key;

pub use bitmap::{CachedBitmap, TileBitmap};
pub use key::{RenderParams, Tile, TileKey, DEFAULT_TILE_SIZE};
