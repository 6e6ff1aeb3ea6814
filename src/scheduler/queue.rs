//! Priority queue of render jobs.
//!
//! Jobs are polled lowest priority value first, then in insertion order.
//! Priorities depend on the viewport, but they are not recomputed on every
//! viewport change: a change only marks the queue dirty, and the next poll
//! recomputes every queued job once before picking one.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::mpsc::Receiver;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use super::job::RenderJob;
use super::priority::job_priority;
use crate::tile::TileKey;
use crate::viewport::{MapPosition, Viewport};

// =============================================================================
// Queued Job
// =============================================================================

struct QueuedJob {
    job: RenderJob,
    sequence: u64,
}

// BinaryHeap is a max-heap: the smallest priority, then the oldest job, is
// the greatest element
impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.job.priority.total_cmp(&self.job.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            ordering => ordering,
        }
    }
}

// =============================================================================
// Job Queue
// =============================================================================

struct QueueState {
    heap: BinaryHeap<QueuedJob>,
    queued: HashSet<TileKey>,
    in_flight: HashSet<TileKey>,
    positions: Receiver<MapPosition>,
    position: MapPosition,
    next_sequence: u64,
    dirty: bool,
    shutdown: bool,
}

impl QueueState {
    /// Adopt the latest viewport position, if any arrived.
    fn drain_positions(&mut self) {
        while let Ok(position) = self.positions.try_recv() {
            self.position = position;
            self.dirty = true;
        }
    }

    fn reschedule(&mut self, zoom_penalty: f64) {
        let mut jobs = std::mem::take(&mut self.heap).into_vec();
        for queued in &mut jobs {
            queued.job.priority = job_priority(&queued.job.key.tile, &self.position, zoom_penalty);
        }
        self.heap = BinaryHeap::from(jobs);
        self.dirty = false;
        trace!(jobs = self.heap.len(), "rescheduled render jobs");
    }

    fn pop(&mut self, zoom_penalty: f64) -> Option<RenderJob> {
        self.drain_positions();
        if self.dirty {
            self.reschedule(zoom_penalty);
        }
        let QueuedJob { job, .. } = self.heap.pop()?;
        self.queued.remove(&job.key);
        self.in_flight.insert(job.key.clone());
        Some(job)
    }
}

/// Render jobs waiting for a worker.
///
/// A key is held at most once, counting both queued jobs and jobs a worker
/// has taken but not yet completed.
pub struct JobQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    zoom_penalty: f64,
}

impl JobQueue {
    /// Create a queue prioritizing against `viewport`.
    pub fn new(viewport: &Viewport, zoom_penalty: f64) -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                queued: HashSet::new(),
                in_flight: HashSet::new(),
                positions: viewport.subscribe(),
                position: viewport.position(),
                next_sequence: 0,
                dirty: false,
                shutdown: false,
            }),
            available: Condvar::new(),
            zoom_penalty,
        }
    }

    /// Queue a job, returning `false` if its key is already queued or being
    /// rendered.
    pub fn add_job(&self, mut job: RenderJob) -> bool {
        let mut state = self.state.lock();
        if state.shutdown
            || state.queued.contains(&job.key)
            || state.in_flight.contains(&job.key)
        {
            return false;
        }

        state.drain_positions();
        job.priority = job_priority(&job.key.tile, &state.position, self.zoom_penalty);
        trace!(job = %job, "queued render job");

        state.queued.insert(job.key.clone());
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.heap.push(QueuedJob { job, sequence });
        drop(state);

        self.available.notify_one();
        true
    }

    /// Mark priorities as stale; they are recomputed on the next poll.
    pub fn request_reschedule(&self) {
        self.state.lock().dirty = true;
    }

    /// Remove the most urgent job without waiting.
    pub fn poll(&self) -> Option<RenderJob> {
        self.state.lock().pop(self.zoom_penalty)
    }

    /// Remove the most urgent job, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is shut down.
    pub fn take(&self) -> Option<RenderJob> {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return None;
            }
            if let Some(job) = state.pop(self.zoom_penalty) {
                return Some(job);
            }
            self.available.wait(&mut state);
        }
    }

    /// Finish a job taken by `poll` or `take`.
    pub fn complete(&self, job: &RenderJob) {
        self.state.lock().in_flight.remove(&job.key);
    }

    /// Whether a job for `key` is queued or being rendered.
    pub fn contains(&self, key: &TileKey) -> bool {
        let state = self.state.lock();
        state.queued.contains(key) || state.in_flight.contains(key)
    }

    /// Number of queued jobs.
    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().heap.is_empty()
    }

    /// Number of jobs taken but not completed.
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Drop every queued job.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.heap.clear();
        state.queued.clear();
    }

    /// Drop queued jobs and wake every waiting worker.
    pub fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            state.shutdown = true;
            debug!(dropped = state.heap.len(), "shutting down job queue");
            state.heap.clear();
            state.queued.clear();
        }
        self.available.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }
}
