use image::Rgba;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use super::slot::{FrameBufferSlot, LockState};
use super::{BufferingStrategy, DisplaySurface};
use crate::tile::CachedBitmap;
use crate::viewport::{Dimension, MapPosition};

struct BufferState {
    slots: Vec<FrameBufferSlot>,
    producer: usize,
    consumer: usize,
    /// Finished frame waiting to be swapped in
    ready: Option<usize>,
    frame_position: Option<MapPosition>,
    dimension: Option<Dimension>,
    destroyed: bool,
}

impl BufferState {
    /// The slot that is neither producer nor consumer.
    fn spare(&self) -> usize {
        (0..self.slots.len())
            .find(|&index| index != self.producer && index != self.consumer)
            .unwrap_or(self.producer)
    }

    fn any_soft_locked(&self) -> bool {
        self.slots.iter().any(FrameBufferSlot::is_soft_locked)
    }
}

/// Off-screen frames shared by a compositing thread and a display thread.
///
/// The producer acquires a slot with [`get_drawing_slot`], draws the
/// visible layers into it and hands it over with [`release_producer`].
/// The display thread calls [`draw`] on every repaint; it swaps in the
/// newest finished frame if there is one and otherwise repeats the current
/// frame, so it never waits for rendering.
///
/// [`get_drawing_slot`]: FrameBuffer::get_drawing_slot
/// [`release_producer`]: FrameBuffer::release_producer
/// [`draw`]: FrameBuffer::draw
pub struct FrameBuffer {
    state: Mutex<BufferState>,
    changed: Condvar,
    strategy: BufferingStrategy,
    background: Rgba<u8>,
}

impl FrameBuffer {
    pub fn new(strategy: BufferingStrategy, background: Rgba<u8>) -> Self {
        let slots = (0..strategy.slot_count())
            .map(|_| FrameBufferSlot::new())
            .collect();
        Self {
            state: Mutex::new(BufferState {
                slots,
                producer: 0,
                consumer: 1,
                ready: None,
                frame_position: None,
                dimension: None,
                destroyed: false,
            }),
            changed: Condvar::new(),
            strategy,
            background,
        }
    }

    pub fn strategy(&self) -> BufferingStrategy {
        self.strategy
    }

    /// Acquire the producer slot for drawing the next frame.
    ///
    /// Blocks while the slot is still locked and, with double buffering,
    /// while the previous frame has not been swapped in. Returns `None`
    /// before the first [`resize`](FrameBuffer::resize) and after
    /// [`destroy`](FrameBuffer::destroy).
    pub fn get_drawing_slot(&self) -> Option<CachedBitmap> {
        let mut state = self.state.lock();
        loop {
            if state.destroyed {
                return None;
            }
            let producer = state.producer;
            let waiting_for_swap =
                self.strategy == BufferingStrategy::Double && state.ready.is_some();
            if !state.slots[producer].is_soft_locked() && !waiting_for_swap {
                break;
            }
            self.changed.wait(&mut state);
        }

        let producer = state.producer;
        let slot = &mut state.slots[producer];
        slot.apply_pending_resize(self.background);
        let bitmap = slot.bitmap()?.clone();
        slot.soft_lock();
        trace!(slot = producer, "acquired drawing slot");
        Some(bitmap)
    }

    /// Hand the frame drawn into the producer slot to the display side.
    pub fn release_producer(&self, position: MapPosition) {
        let mut state = self.state.lock();
        let producer = state.producer;
        if !state.slots[producer].is_soft_locked() {
            return;
        }
        state.slots[producer].unlock();
        state.slots[producer].set_position(position);

        if self.strategy == BufferingStrategy::Triple {
            // An unconsumed frame is superseded and its slot reused
            let next = state.ready.unwrap_or_else(|| state.spare());
            if state.ready.is_some() {
                trace!("superseded unconsumed frame");
            }
            state.producer = next;
        }
        state.ready = Some(producer);
        drop(state);
        self.changed.notify_all();
    }

    /// Show the newest frame on `surface`.
    ///
    /// Returns `false` if there is no frame to show yet.
    pub fn draw<S: DisplaySurface + ?Sized>(&self, surface: &mut S) -> bool {
        let (index, bitmap, position) = {
            let mut state = self.state.lock();
            loop {
                if state.destroyed {
                    return false;
                }
                let consumer = state.consumer;
                if !state.slots[consumer].is_soft_locked() {
                    break;
                }
                self.changed.wait(&mut state);
            }
            self.swap(&mut state);

            let consumer = state.consumer;
            let (Some(bitmap), Some(position)) =
                (state.slots[consumer].bitmap().cloned(), state.frame_position)
            else {
                return false;
            };
            state.slots[consumer].soft_lock();
            (consumer, bitmap, position)
        };

        surface.draw_bitmap(&bitmap, &position);
        drop(bitmap);

        self.state.lock().slots[index].unlock();
        self.changed.notify_all();
        true
    }

    fn swap(&self, state: &mut BufferState) {
        let Some(ready) = state.ready else {
            return;
        };
        if state.slots[ready].lock_state() != LockState::Unlocked {
            return;
        }

        let previous = state.consumer;
        state.consumer = ready;
        if state.producer == ready {
            state.producer = previous;
        }
        state.ready = None;
        state.frame_position = state.slots[ready].position();
        trace!(slot = ready, "swapped in new frame");
        self.changed.notify_all();
    }

    /// Request new bitmap dimensions; each slot is reallocated the next time
    /// it is acquired while unlocked.
    pub fn resize(&self, dimension: Dimension) {
        let mut state = self.state.lock();
        if state.destroyed || state.dimension == Some(dimension) {
            return;
        }
        state.dimension = Some(dimension);
        for slot in &mut state.slots {
            slot.request_resize(dimension);
        }
        debug!(width = dimension.width, height = dimension.height, "frame buffer resized");
    }

    /// Wait for every draw in progress, then release all bitmaps.
    ///
    /// Blocked producers wake up and get `None`.
    pub fn destroy(&self) {
        let mut state = self.state.lock();
        while state.any_soft_locked() {
            self.changed.wait(&mut state);
        }
        state.destroyed = true;
        state.ready = None;
        for slot in &mut state.slots {
            slot.hard_lock();
        }
        drop(state);
        self.changed.notify_all();
        debug!("frame buffer destroyed");
    }

    /// Position of the frame currently shown.
    pub fn frame_position(&self) -> Option<MapPosition> {
        self.state.lock().frame_position
    }

    pub fn dimension(&self) -> Option<Dimension> {
        self.state.lock().dimension
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    /// Lock states of all slots, producer first, then consumer.
    pub fn lock_states(&self) -> Vec<LockState> {
        let state = self.state.lock();
        let mut order = vec![state.producer, state.consumer];
        let rest: Vec<usize> = (0..state.slots.len())
            .filter(|i| !order.contains(i))
            .collect();
        order.extend(rest);
        order
            .into_iter()
            .map(|i| state.slots[i].lock_state())
            .collect()
    }
}
