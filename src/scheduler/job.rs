use std::fmt;
use std::hash::{Hash, Hasher};

use crate::tile::TileKey;

/// Debug drawing options carried by a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugFlags {
    /// Outline the tile border
    pub draw_tile_frame: bool,

    /// Shade the background by zoom level
    pub shade_by_zoom: bool,
}

/// A pending render of one tile.
///
/// Jobs are identified by their key alone: two jobs for the same key are
/// equal whatever their priority or debug flags, so a queue never holds
/// both.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub key: TileKey,

    /// Smaller values are rendered first
    pub priority: f64,

    pub debug: DebugFlags,
}

impl RenderJob {
    /// Create a job with the lowest urgency until it is prioritized.
    pub fn new(key: TileKey) -> Self {
        Self {
            key,
            priority: f64::MAX,
            debug: DebugFlags::default(),
        }
    }

    pub fn with_debug(mut self, debug: DebugFlags) -> Self {
        self.debug = debug;
        self
    }
}

impl PartialEq for RenderJob {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for RenderJob {}

impl Hash for RenderJob {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for RenderJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (priority {:.1})", self.key, self.priority)
    }
}
