use crate::tile::Tile;
use crate::viewport::MapPosition;

/// Default weight applied per zoom level between a job and the viewport.
pub const DEFAULT_ZOOM_PENALTY: f64 = 5.0;

/// Urgency of rendering `tile` for the viewport at `position`; smaller is
/// more urgent.
///
/// The base value is the pixel distance between the tile center and the
/// viewport center, both at the tile's zoom level. A tile at another zoom
/// level has its distance scaled back to the viewport zoom (multiplied by
/// `2^Δ` for coarser tiles, divided for finer ones) and then multiplied by
/// `Δ × zoom_penalty`.
pub fn job_priority(tile: &Tile, position: &MapPosition, zoom_penalty: f64) -> f64 {
    let (tile_x, tile_y) = tile.center_pixel();
    let (center_x, center_y) = position.center_pixel(tile.zoom_level, tile.tile_size);
    let distance = (tile_x - center_x).hypot(tile_y - center_y);

    let delta = tile.zoom_level.abs_diff(position.zoom_level);
    if delta == 0 {
        return distance;
    }

    let scale = 2f64.powi(delta as i32);
    let scaled = if tile.zoom_level < position.zoom_level {
        distance * scale
    } else {
        distance / scale
    };
    scaled * delta as f64 * zoom_penalty
}
