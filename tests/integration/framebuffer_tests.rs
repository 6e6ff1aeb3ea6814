//! Frame buffer integration tests.
//!
//! Tests verify:
//! - Frames cross from a compositing thread to a display thread in order
//! - Triple buffering lets the producer run ahead of the display
//! - Resizes take effect on the next acquired slot
//! - Destroying the buffer releases blocked producers

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::Rgba;

use tileforge::format::LatLong;
use tileforge::framebuffer::{BufferingStrategy, FrameBuffer, LockState};
use tileforge::viewport::{Dimension, MapPosition};

use super::test_utils::RecordingSurface;

const BACKGROUND: Rgba<u8> = Rgba([242, 239, 233, 255]);

fn position(zoom: u8) -> MapPosition {
    MapPosition::new(LatLong::new(50.5, 10.5), zoom)
}

fn frame_buffer(strategy: BufferingStrategy) -> Arc<FrameBuffer> {
    let buffer = Arc::new(FrameBuffer::new(strategy, BACKGROUND));
    buffer.resize(Dimension::new(8, 8));
    buffer
}

/// Draw one frame filled with `shade`.
fn produce(buffer: &FrameBuffer, shade: u8, zoom: u8) -> bool {
    let Some(slot) = buffer.get_drawing_slot() else {
        return false;
    };
    slot.fill(Rgba([shade, shade, shade, 255]));
    buffer.release_producer(position(zoom));
    true
}

/// Zoom levels of the distinct frames shown, in order.
fn shown_zooms(surface: &RecordingSurface) -> Vec<u8> {
    let mut zooms: Vec<u8> = surface.frames.iter().map(|(_, p)| p.zoom_level).collect();
    zooms.dedup();
    zooms
}

// =============================================================================
// Producer and Consumer
// =============================================================================

#[test]
fn test_double_buffering_shows_every_frame() {
    let buffer = frame_buffer(BufferingStrategy::Double);

    let producer = {
        let buffer = Arc::clone(&buffer);
        thread::spawn(move || {
            for zoom in 1..=5u8 {
                assert!(produce(&buffer, zoom * 10, zoom));
            }
        })
    };

    let mut surface = RecordingSurface::default();
    let deadline = Instant::now() + Duration::from_secs(5);
    while shown_zooms(&surface).len() < 5 && Instant::now() < deadline {
        buffer.draw(&mut surface);
        thread::sleep(Duration::from_millis(1));
    }
    producer.join().unwrap();

    assert_eq!(shown_zooms(&surface), vec![1, 2, 3, 4, 5]);
    for (pixel, position) in &surface.frames {
        let shade = position.zoom_level * 10;
        assert_eq!(*pixel, Rgba([shade, shade, shade, 255]));
    }
}

#[test]
fn test_no_frame_before_first_release() {
    let buffer = frame_buffer(BufferingStrategy::Double);
    let mut surface = RecordingSurface::default();

    assert!(!buffer.draw(&mut surface));
    assert!(surface.frames.is_empty());
    assert!(buffer.frame_position().is_none());
}

#[test]
fn test_triple_buffering_producer_runs_ahead() {
    let buffer = frame_buffer(BufferingStrategy::Triple);

    // Without any display, the producer never blocks
    for zoom in 0..10u8 {
        assert!(produce(&buffer, zoom, zoom));
    }

    let mut surface = RecordingSurface::default();
    assert!(buffer.draw(&mut surface));
    assert_eq!(surface.frames.len(), 1);
    assert_eq!(surface.frames[0].0, Rgba([9, 9, 9, 255]));
    assert_eq!(buffer.frame_position(), Some(position(9)));
}

#[test]
fn test_display_repeats_current_frame() {
    let buffer = frame_buffer(BufferingStrategy::Triple);
    produce(&buffer, 7, 3);

    let mut surface = RecordingSurface::default();
    assert!(buffer.draw(&mut surface));
    assert!(buffer.draw(&mut surface));
    assert_eq!(surface.frames.len(), 2);
    assert_eq!(shown_zooms(&surface), vec![3]);
}

// =============================================================================
// Resize and Destroy
// =============================================================================

#[test]
fn test_resize_applies_to_next_slot() {
    let buffer = frame_buffer(BufferingStrategy::Double);
    produce(&buffer, 1, 1);
    buffer.draw(&mut RecordingSurface::default());

    buffer.resize(Dimension::new(16, 4));
    assert_eq!(buffer.dimension(), Some(Dimension::new(16, 4)));

    let slot = buffer.get_drawing_slot().unwrap();
    assert_eq!(slot.dimensions(), (16, 4));
    assert_eq!(*slot.pixels().get_pixel(0, 0), BACKGROUND);
    buffer.release_producer(position(2));
}

#[test]
fn test_destroy_releases_blocked_producer() {
    let buffer = frame_buffer(BufferingStrategy::Double);
    assert!(produce(&buffer, 1, 1));

    // The previous frame was never shown, so this producer waits
    let producer = {
        let buffer = Arc::clone(&buffer);
        thread::spawn(move || buffer.get_drawing_slot().is_none())
    };
    thread::sleep(Duration::from_millis(50));

    buffer.destroy();
    assert!(producer.join().unwrap());
    assert!(buffer.is_destroyed());
    assert!(buffer
        .lock_states()
        .iter()
        .all(|state| *state == LockState::HardLocked));
    assert!(!buffer.draw(&mut RecordingSurface::default()));
}
