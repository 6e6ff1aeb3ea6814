//! Viewport model.
//!
//! The viewport holds the map position (center and zoom level) and the
//! pixel dimension of the visible area. Consumers subscribe to position
//! changes through a channel instead of registering callbacks:
//!
//! ```text
//!               set_center / set_zoom / set_position / set_dimension
//!                                   │
//!                                   ▼
//!                          ┌─────────────────┐
//!                          │    Viewport     │
//!                          └────────┬────────┘
//!                    MapPosition    │    MapPosition
//!                ┌──────────────────┴──────────────────┐
//!                ▼                                     ▼
//!        JobQueue (reschedule)              TileLayer (working set)
//! ```
//!
//! Subscribers whose receiver was dropped are forgotten on the next
//! notification.

use std::sync::mpsc::{self, Receiver, Sender};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::trace;

use crate::format::mercator::{
    latitude_to_pixel_y, longitude_to_pixel_x, map_size, pixel_x_to_longitude,
    pixel_y_to_latitude,
};
use crate::format::{BoundingBox, LatLong, ZOOM_LEVEL_MAX};
use crate::tile::Tile;

// =============================================================================
// Map Position
// =============================================================================

/// Center and zoom level of the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapPosition {
    pub center: LatLong,
    pub zoom_level: u8,
}

impl MapPosition {
    pub const fn new(center: LatLong, zoom_level: u8) -> Self {
        Self { center, zoom_level }
    }

    /// Pixel coordinates of the center on the world map at `zoom_level`.
    pub fn center_pixel(&self, zoom_level: u8, tile_size: u32) -> (f64, f64) {
        let size = map_size(zoom_level, tile_size);
        (
            longitude_to_pixel_x(self.center.longitude, size),
            latitude_to_pixel_y(self.center.latitude, size),
        )
    }
}

// =============================================================================
// Dimension
// =============================================================================

/// Size of a drawing area in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Dimension {
    pub width: u32,
    pub height: u32,
}

impl Dimension {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether the area has no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

// =============================================================================
// Viewport
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct ViewportState {
    position: MapPosition,
    dimension: Dimension,
}

/// The visible part of the map.
pub struct Viewport {
    state: RwLock<ViewportState>,
    subscribers: Mutex<Vec<Sender<MapPosition>>>,
    tile_size: u32,
}

impl Viewport {
    /// Create a viewport; the zoom level is clamped to the supported range.
    pub fn new(position: MapPosition, dimension: Dimension, tile_size: u32) -> Self {
        let position = MapPosition::new(position.center, position.zoom_level.min(ZOOM_LEVEL_MAX));
        Self {
            state: RwLock::new(ViewportState {
                position,
                dimension,
            }),
            subscribers: Mutex::new(Vec::new()),
            tile_size,
        }
    }

    /// Receive every later position change.
    pub fn subscribe(&self) -> Receiver<MapPosition> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn position(&self) -> MapPosition {
        self.state.read().position
    }

    pub fn current_center(&self) -> LatLong {
        self.state.read().position.center
    }

    pub fn current_zoom(&self) -> u8 {
        self.state.read().position.zoom_level
    }

    pub fn dimension(&self) -> Dimension {
        self.state.read().dimension
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn set_center(&self, center: LatLong) {
        let zoom_level = self.current_zoom();
        self.set_position(MapPosition::new(center, zoom_level));
    }

    pub fn set_zoom(&self, zoom_level: u8) {
        let center = self.current_center();
        self.set_position(MapPosition::new(center, zoom_level));
    }

    /// Move the map, notifying subscribers if anything changed.
    pub fn set_position(&self, position: MapPosition) {
        let position = MapPosition::new(position.center, position.zoom_level.min(ZOOM_LEVEL_MAX));
        {
            let mut state = self.state.write();
            if state.position == position {
                return;
            }
            state.position = position;
        }
        self.notify(position);
    }

    /// Resize the visible area; subscribers are notified since the set of
    /// visible tiles changes.
    pub fn set_dimension(&self, dimension: Dimension) {
        let position = {
            let mut state = self.state.write();
            if state.dimension == dimension {
                return;
            }
            state.dimension = dimension;
            state.position
        };
        self.notify(position);
    }

    /// Geographic area currently visible, clipped to the world map.
    pub fn bounding_box(&self) -> BoundingBox {
        let (left, top, right, bottom) = self.pixel_bounds();
        let size = map_size(self.current_zoom(), self.tile_size);
        BoundingBox {
            min_latitude: pixel_y_to_latitude(bottom, size),
            min_longitude: pixel_x_to_longitude(left, size),
            max_latitude: pixel_y_to_latitude(top, size),
            max_longitude: pixel_x_to_longitude(right, size),
        }
    }

    /// Tiles intersecting the visible area, row by row.
    pub fn visible_tiles(&self) -> Vec<Tile> {
        let state = *self.state.read();
        if state.dimension.is_empty() {
            return Vec::new();
        }
        let zoom_level = state.position.zoom_level;
        let (left, top, right, bottom) = self.pixel_bounds();
        let tile_size = self.tile_size as f64;
        let max = Tile::max_tile_number(zoom_level);

        let tile_number = |pixel: f64| ((pixel / tile_size).floor().max(0.0) as u32).min(max);
        let (x_min, x_max) = (tile_number(left), tile_number(right));
        let (y_min, y_max) = (tile_number(top), tile_number(bottom));

        let mut tiles = Vec::with_capacity(((x_max - x_min + 1) * (y_max - y_min + 1)) as usize);
        for tile_y in y_min..=y_max {
            for tile_x in x_min..=x_max {
                tiles.push(Tile::new(tile_x, tile_y, zoom_level, self.tile_size));
            }
        }
        tiles
    }

    /// Left, top, right and bottom pixel of the visible area.
    fn pixel_bounds(&self) -> (f64, f64, f64, f64) {
        let state = *self.state.read();
        let size = map_size(state.position.zoom_level, self.tile_size) as f64;
        let (center_x, center_y) = state
            .position
            .center_pixel(state.position.zoom_level, self.tile_size);
        let half_width = state.dimension.width as f64 / 2.0;
        let half_height = state.dimension.height as f64 / 2.0;

        // Exclusive right and bottom edges
        let clamp = |pixel: f64| pixel.clamp(0.0, (size - 1.0).max(0.0));
        (
            clamp(center_x - half_width),
            clamp(center_y - half_height),
            clamp(center_x + half_width - 1.0),
            clamp(center_y + half_height - 1.0),
        )
    }

    fn notify(&self, position: MapPosition) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(position).is_ok());
        trace!(
            zoom = position.zoom_level,
            subscribers = subscribers.len(),
            "viewport changed"
        );
    }
}

impl std::fmt::Debug for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = *self.state.read();
        f.debug_struct("Viewport")
            .field("position", &state.position)
            .field("dimension", &state.dimension)
            .field("tile_size", &self.tile_size)
            .finish()
    }
}
