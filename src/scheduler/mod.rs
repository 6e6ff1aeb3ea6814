//! Render job scheduling.
//!
//! ```text
//!   TileLayer ──add_job──► JobQueue ◄──MapPosition── Viewport
//!                             │
//!                        take (blocking)
//!                             ▼
//!              ┌──────────────────────────────┐
//!              │ WorkerPool (N threads)       │
//!              │  cached? ──yes──► skip       │
//!              │  Renderer::execute_job       │
//!              │  TileCache::put              │
//!              └──────────────┬───────────────┘
//!                             │ TileKey
//!                             ▼
//!                      redraw channel
//! ```
//!
//! Jobs are ordered by their distance to the viewport center, with a
//! penalty for every zoom level between the job and the viewport.

mod job;
mod priority;
mod queue;
mod worker;

pub use job::{DebugFlags, RenderJob};
pub use priority::{job_priority, DEFAULT_ZOOM_PENALTY};
pub use queue::JobQueue;
pub use worker::{default_worker_count, DebugRenderer, Renderer, WorkerPool};
