//! Spherical (Web) Mercator projection.
//!
//! Converts between geographic coordinates, pixel coordinates on the
//! square world map at a given zoom level, and tile numbers. The world map
//! at zoom `z` is `tile_size << z` pixels wide and tall; pixel (0, 0) is the
//! north-west corner.

use std::f64::consts::PI;

/// Maximum latitude representable in the projection.
pub const LATITUDE_MAX: f64 = 85.05112877980659;

/// Minimum latitude representable in the projection.
pub const LATITUDE_MIN: f64 = -LATITUDE_MAX;

/// Tile size used when only tile numbers matter.
const DUMMY_TILE_SIZE: u32 = 256;

/// Zoom levels above this one saturate the pixel math.
const MAX_SHIFT: u8 = 32;

/// Side length of the world map in pixels.
#[inline]
pub fn map_size(zoom_level: u8, tile_size: u32) -> u64 {
    (tile_size as u64) << zoom_level.min(MAX_SHIFT)
}

/// Highest tile number at a zoom level, saturating at `u32::MAX`.
#[inline]
pub fn max_tile_number(zoom_level: u8) -> u32 {
    1u32.checked_shl(zoom_level as u32).map_or(u32::MAX, |tiles| tiles - 1)
}

/// Convert a longitude to an x pixel coordinate.
pub fn longitude_to_pixel_x(longitude: f64, map_size: u64) -> f64 {
    (longitude + 180.0) / 360.0 * map_size as f64
}

/// Convert a latitude to a y pixel coordinate, clamped to the map.
pub fn latitude_to_pixel_y(latitude: f64, map_size: u64) -> f64 {
    let sin_latitude = (latitude * (PI / 180.0)).sin();
    let size = map_size as f64;
    let pixel_y =
        (0.5 - ((1.0 + sin_latitude) / (1.0 - sin_latitude)).ln() / (4.0 * PI)) * size;
    pixel_y.clamp(0.0, size)
}

/// Convert an x pixel coordinate to a longitude.
pub fn pixel_x_to_longitude(pixel_x: f64, map_size: u64) -> f64 {
    360.0 * ((pixel_x / map_size as f64) - 0.5)
}

/// Convert a y pixel coordinate to a latitude.
pub fn pixel_y_to_latitude(pixel_y: f64, map_size: u64) -> f64 {
    let y = 0.5 - (pixel_y / map_size as f64);
    90.0 - 360.0 * (-y * 2.0 * PI).exp().atan() / PI
}

fn pixel_to_tile(pixel: f64, zoom_level: u8, tile_size: u32) -> u32 {
    let max_tile = max_tile_number(zoom_level) as f64;
    (pixel / tile_size as f64).clamp(0.0, max_tile) as u32
}

/// Convert a longitude to a tile x number at the given zoom level.
pub fn longitude_to_tile_x(longitude: f64, zoom_level: u8) -> u32 {
    let pixel_x = longitude_to_pixel_x(longitude, map_size(zoom_level, DUMMY_TILE_SIZE));
    pixel_to_tile(pixel_x, zoom_level, DUMMY_TILE_SIZE)
}

/// Convert a latitude to a tile y number at the given zoom level.
pub fn latitude_to_tile_y(latitude: f64, zoom_level: u8) -> u32 {
    let pixel_y = latitude_to_pixel_y(latitude, map_size(zoom_level, DUMMY_TILE_SIZE));
    pixel_to_tile(pixel_y, zoom_level, DUMMY_TILE_SIZE)
}

/// Longitude of the west edge of a tile column.
pub fn tile_x_to_longitude(tile_x: u32, zoom_level: u8) -> f64 {
    let size = map_size(zoom_level, DUMMY_TILE_SIZE);
    pixel_x_to_longitude(tile_x as f64 * DUMMY_TILE_SIZE as f64, size)
}

/// Latitude of the north edge of a tile row.
pub fn tile_y_to_latitude(tile_y: u32, zoom_level: u8) -> f64 {
    let size = map_size(zoom_level, DUMMY_TILE_SIZE);
    pixel_y_to_latitude(tile_y as f64 * DUMMY_TILE_SIZE as f64, size)
}
