//! Frame buffer swap protocol.
//!
//! ```text
//!   compositing thread                         display thread
//!   ──────────────────                         ──────────────
//!   get_drawing_slot() ──► producer slot
//!        draw layers         (SoftLocked)
//!   release_producer() ──► ready ──swap──►  consumer slot ──► draw(surface)
//!                                             (SoftLocked while blitting)
//! ```
//!
//! Each slot is `Unlocked`, `SoftLocked` while drawn or shown, or
//! `HardLocked` once the buffer is destroyed. Double buffering makes the
//! producer wait until its last frame has been swapped in; triple buffering
//! lets it continue on a spare slot, replacing a frame that was never shown.

mod buffer;
mod slot;

pub use buffer::FrameBuffer;
pub use slot::{FrameBufferSlot, LockState};

use crate::tile::TileBitmap;
use crate::viewport::MapPosition;

/// How many off-screen frames a [`FrameBuffer`] keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferingStrategy {
    /// One producer slot and one consumer slot
    #[default]
    Double,

    /// An extra slot so the producer never waits for the display
    Triple,
}

impl BufferingStrategy {
    pub fn slot_count(&self) -> usize {
        match self {
            BufferingStrategy::Double => 2,
            BufferingStrategy::Triple => 3,
        }
    }
}

impl std::str::FromStr for BufferingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "double" => Ok(BufferingStrategy::Double),
            "triple" => Ok(BufferingStrategy::Triple),
            other => Err(format!("unknown buffering strategy: {}", other)),
        }
    }
}

/// Target of finished frames, such as a window or an image file.
pub trait DisplaySurface {
    /// Show a frame drawn for `position`.
    fn draw_bitmap(&mut self, bitmap: &TileBitmap, position: &MapPosition);
}
