//! Chunk streaming: desired-set diffing, pooled chunk records, and budgeted
//! asynchronous height-field generation.
//!
//! # Invariants
//! - Exactly one [`ChunkRecord`] exists per loaded key.
//! - Within one update, retirement runs before creation and regeneration,
//!   and the scheduler applies finished work before starting new work.
//! - In-flight generation tasks never exceed the configured cap.
//! - A retired chunk's pending task is cancelled before its container can be
//!   reused under another key.
//! - Generation failures are logged and retried; they never abort an update.

mod backend;
mod config;
mod desired;
mod factory;
mod manager;
mod pool;
mod record;
mod scheduler;
mod stats;
mod threaded;

pub use backend::{
    BackendError, ComputeBackend, CpuBackend, GenerationPoll, GenerationRequest, TaskHandle,
};
pub use config::{ConfigError, StreamConfig};
pub use desired::{DesiredChunk, DesiredSet, cells_in_radius, compute_desired_set};
pub use factory::{HandleFactory, ResourceFactory, ResourceHandle};
pub use manager::{ChunkManager, StreamError};
pub use pool::{ChunkPool, PoolConfig};
pub use record::{ChunkRecord, ChunkState};
pub use scheduler::{PendingTask, Scheduler, SchedulerBudget, SchedulerMode, TickStats};
pub use stats::{FrameTimer, ReconcileReport, StreamStats};
pub use threaded::ThreadedBackend;
