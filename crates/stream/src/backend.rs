//! Compute backend contract and the in-process CPU implementation.

use std::collections::BTreeMap;
use std::fmt;
use terrastream_common::ChunkKey;
use terrastream_heightfield::{
    FieldError, FieldSpec, HeightField, TerrainParams, generate_chunk_field,
};

/// Opaque handle to one submitted generation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub u64);

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("compute backend unavailable: {0}")]
    Unavailable(String),
    #[error("submit rejected: {0}")]
    Rejected(String),
    #[error("generation failed: {0}")]
    Generation(#[from] FieldError),
    #[error("malformed readback: expected {expected} samples per side, got {actual}")]
    Malformed { expected: u32, actual: u32 },
    #[error("unknown task handle {0}")]
    UnknownHandle(TaskHandle),
    #[error("compute backend disconnected")]
    Disconnected,
}

/// Everything a backend needs to produce one chunk's height field.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub key: ChunkKey,
    pub field: FieldSpec,
    pub world_size: f32,
    pub terrain: TerrainParams,
}

impl GenerationRequest {
    pub fn generate(&self) -> Result<HeightField, FieldError> {
        generate_chunk_field(&self.field, &self.terrain)
    }
}

/// Result of polling a task handle. `Ready` and `Failed` consume the task.
#[derive(Debug)]
pub enum GenerationPoll {
    Pending,
    Ready(HeightField),
    Failed(BackendError),
}

/// Request/response contract for height-field generation. Work may run
/// anywhere; the control thread only ever polls.
pub trait ComputeBackend {
    fn name(&self) -> &str;

    /// Startup capability check. An error disables streaming.
    fn probe(&mut self) -> Result<(), BackendError>;

    fn submit(&mut self, request: GenerationRequest) -> Result<TaskHandle, BackendError>;

    fn poll(&mut self, handle: TaskHandle) -> GenerationPoll;

    /// Release a handle. Any result that arrives afterwards is dropped.
    /// Disposing an unknown or consumed handle is a no-op.
    fn dispose(&mut self, handle: TaskHandle);

    /// Generate on the calling thread, for the synchronous fallback.
    fn generate_sync(&mut self, request: &GenerationRequest) -> Result<HeightField, BackendError> {
        Ok(request.generate()?)
    }
}

#[derive(Debug)]
struct CpuTask {
    request: GenerationRequest,
    remaining_polls: u32,
}

/// Runs generation on the control thread when a task is polled.
///
/// `with_latency(n)` makes every task report `Pending` for its first `n`
/// polls, which gives tests a deterministic notion of "in flight".
#[derive(Debug, Default)]
pub struct CpuBackend {
    latency: u32,
    next: u64,
    tasks: BTreeMap<TaskHandle, CpuTask>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(polls: u32) -> Self {
        Self {
            latency: polls,
            ..Self::default()
        }
    }

    /// Tasks submitted and not yet consumed or disposed.
    pub fn outstanding(&self) -> usize {
        self.tasks.len()
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn probe(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn submit(&mut self, request: GenerationRequest) -> Result<TaskHandle, BackendError> {
        self.next += 1;
        let handle = TaskHandle(self.next);
        self.tasks.insert(
            handle,
            CpuTask {
                request,
                remaining_polls: self.latency,
            },
        );
        Ok(handle)
    }

    fn poll(&mut self, handle: TaskHandle) -> GenerationPoll {
        let Some(task) = self.tasks.get_mut(&handle) else {
            return GenerationPoll::Failed(BackendError::UnknownHandle(handle));
        };
        if task.remaining_polls > 0 {
            task.remaining_polls -= 1;
            return GenerationPoll::Pending;
        }
        let Some(task) = self.tasks.remove(&handle) else {
            return GenerationPoll::Failed(BackendError::UnknownHandle(handle));
        };
        match task.request.generate() {
            Ok(field) => GenerationPoll::Ready(field),
            Err(e) => GenerationPoll::Failed(e.into()),
        }
    }

    fn dispose(&mut self, handle: TaskHandle) {
        self.tasks.remove(&handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrastream_common::ChunkCoord;

    fn request(resolution: u32) -> GenerationRequest {
        let coord = ChunkCoord::new(3, -2);
        GenerationRequest {
            key: ChunkKey::Base(coord),
            field: FieldSpec {
                noise_coord: coord,
                resolution,
                base_resolution: 17,
                scale: 1,
            },
            world_size: 100.0,
            terrain: TerrainParams::default(),
        }
    }

    #[test]
    fn latency_delays_completion() {
        let mut backend = CpuBackend::with_latency(2);
        let h = backend.submit(request(9)).unwrap();
        assert!(matches!(backend.poll(h), GenerationPoll::Pending));
        assert!(matches!(backend.poll(h), GenerationPoll::Pending));
        match backend.poll(h) {
            GenerationPoll::Ready(field) => assert_eq!(field.resolution(), 9),
            other => panic!("expected ready, got {other:?}"),
        }
        assert_eq!(backend.outstanding(), 0);
    }

    #[test]
    fn disposed_handle_is_unknown() {
        let mut backend = CpuBackend::with_latency(1);
        let h = backend.submit(request(9)).unwrap();
        backend.dispose(h);
        assert!(matches!(
            backend.poll(h),
            GenerationPoll::Failed(BackendError::UnknownHandle(_))
        ));
        backend.dispose(h);
    }

    #[test]
    fn uneven_lattice_step_fails_task() {
        let mut backend = CpuBackend::new();
        let h = backend.submit(request(10)).unwrap();
        assert!(matches!(
            backend.poll(h),
            GenerationPoll::Failed(BackendError::Generation(FieldError::UnevenStep { .. }))
        ));
    }

    #[test]
    fn sync_matches_async_result() {
        let mut backend = CpuBackend::new();
        let sync = backend.generate_sync(&request(17)).unwrap();
        let h = backend.submit(request(17)).unwrap();
        let GenerationPoll::Ready(polled) = backend.poll(h) else {
            panic!("expected ready");
        };
        assert_eq!(sync, polled);
    }
}
