use image::Rgba;

use crate::tile::{CachedBitmap, TileBitmap};
use crate::viewport::{Dimension, MapPosition};

/// Lock state of a frame buffer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Free to acquire
    Unlocked,

    /// Being drawn by the producer or shown by the consumer
    SoftLocked,

    /// Torn down; never unlocked again
    HardLocked,
}

/// One off-screen bitmap of a frame buffer.
///
/// A resize is only recorded while the slot might be in use; the bitmap is
/// reallocated when the slot is next acquired in the `Unlocked` state.
#[derive(Debug)]
pub struct FrameBufferSlot {
    bitmap: Option<CachedBitmap>,
    lock: LockState,
    pending_resize: Option<Dimension>,
    position: Option<MapPosition>,
}

impl FrameBufferSlot {
    pub(crate) fn new() -> Self {
        Self {
            bitmap: None,
            lock: LockState::Unlocked,
            pending_resize: None,
            position: None,
        }
    }

    pub fn lock_state(&self) -> LockState {
        self.lock
    }

    pub fn bitmap(&self) -> Option<&CachedBitmap> {
        self.bitmap.as_ref()
    }

    pub fn pending_resize(&self) -> Option<Dimension> {
        self.pending_resize
    }

    /// Position of the frame last drawn into this slot.
    pub fn position(&self) -> Option<MapPosition> {
        self.position
    }

    pub(crate) fn is_soft_locked(&self) -> bool {
        self.lock == LockState::SoftLocked
    }

    pub(crate) fn request_resize(&mut self, dimension: Dimension) {
        if self.lock != LockState::HardLocked {
            self.pending_resize = Some(dimension);
        }
    }

    /// Reallocate the bitmap if a resize is pending and the slot is free.
    pub(crate) fn apply_pending_resize(&mut self, background: Rgba<u8>) {
        if self.lock != LockState::Unlocked {
            return;
        }
        if let Some(dimension) = self.pending_resize.take() {
            self.bitmap = (!dimension.is_empty()).then(|| {
                CachedBitmap::new(TileBitmap::filled(
                    dimension.width,
                    dimension.height,
                    background,
                ))
            });
            self.position = None;
        }
    }

    pub(crate) fn soft_lock(&mut self) {
        if self.lock == LockState::Unlocked {
            self.lock = LockState::SoftLocked;
        }
    }

    pub(crate) fn unlock(&mut self) {
        if self.lock == LockState::SoftLocked {
            self.lock = LockState::Unlocked;
        }
    }

    pub(crate) fn set_position(&mut self, position: MapPosition) {
        self.position = Some(position);
    }

    /// Tear the slot down, dropping its bitmap handle.
    pub(crate) fn hard_lock(&mut self) {
        self.lock = LockState::HardLocked;
        self.bitmap = None;
        self.pending_resize = None;
        self.position = None;
    }
}
