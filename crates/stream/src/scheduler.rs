use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use terrastream_common::ChunkKey;
use terrastream_heightfield::{HeightField, TerrainParams};

use crate::backend::{BackendError, ComputeBackend, GenerationPoll, GenerationRequest, TaskHandle};
use crate::desired::DesiredChunk;
use crate::factory::ResourceFactory;
use crate::record::ChunkRecord;

/// How queued generation requests are serviced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerMode {
    /// Submit to the backend and poll on later ticks.
    #[default]
    Async,
    /// Generate and apply every queued request inside the tick.
    Sync,
}

/// Per-tick budgets for the async scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerBudget {
    pub mode: SchedulerMode,
    /// Cap on tasks submitted and not yet resolved.
    pub max_in_flight: usize,
    pub max_starts_per_tick: usize,
    pub max_applies_per_tick: usize,
}

impl Default for SchedulerBudget {
    fn default() -> Self {
        Self {
            mode: SchedulerMode::Async,
            max_in_flight: 16,
            max_starts_per_tick: 4,
            max_applies_per_tick: 4,
        }
    }
}

/// One submitted request and the descriptor it was built from.
#[derive(Debug, Clone)]
pub struct PendingTask {
    pub key: ChunkKey,
    pub desc: DesiredChunk,
    pub handle: TaskHandle,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub started: usize,
    pub applied: usize,
    pub failed: usize,
    pub submit_errors: usize,
    pub in_flight: usize,
    pub queued: usize,
}

/// Budgeted bridge between the chunk map and a compute backend.
///
/// A key is in at most one of `in_flight` and `queued` except while a
/// freshly queued descriptor waits for an older in-flight task to resolve.
#[derive(Debug)]
pub struct Scheduler {
    budget: SchedulerBudget,
    terrain: TerrainParams,
    in_flight: BTreeMap<ChunkKey, PendingTask>,
    queued: BTreeMap<ChunkKey, DesiredChunk>,
}

impl Scheduler {
    pub fn new(budget: SchedulerBudget, terrain: TerrainParams) -> Self {
        Self {
            budget,
            terrain,
            in_flight: BTreeMap::new(),
            queued: BTreeMap::new(),
        }
    }

    pub fn budget(&self) -> &SchedulerBudget {
        &self.budget
    }

    /// Queue a request. A descriptor already queued for the key is replaced.
    pub fn enqueue(&mut self, desc: DesiredChunk) {
        tracing::trace!(key = %desc.key, resolution = desc.resolution, "queue generation");
        self.queued.insert(desc.key, desc);
    }

    pub fn is_pending(&self, key: &ChunkKey) -> bool {
        self.in_flight.contains_key(key) || self.queued.contains_key(key)
    }

    pub fn is_in_flight(&self, key: &ChunkKey) -> bool {
        self.in_flight.contains_key(key)
    }

    pub fn is_queued(&self, key: &ChunkKey) -> bool {
        self.queued.contains_key(key)
    }

    pub fn in_flight(&self) -> impl Iterator<Item = &PendingTask> {
        self.in_flight.values()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// Refresh the start priority of pending work after the observer moved.
    pub fn update_priority(&mut self, key: &ChunkKey, distance: i64) {
        if let Some(desc) = self.queued.get_mut(key) {
            desc.distance = distance;
        }
        if let Some(task) = self.in_flight.get_mut(key) {
            task.desc.distance = distance;
        }
    }

    /// Drop all pending work for `key`. The in-flight entry is removed before
    /// the handle is disposed so a late result has nowhere to land.
    pub fn cancel<B: ComputeBackend + ?Sized>(&mut self, key: &ChunkKey, backend: &mut B) -> bool {
        let queued = self.queued.remove(key).is_some();
        let Some(task) = self.in_flight.remove(key) else {
            return queued;
        };
        backend.dispose(task.handle);
        tracing::debug!(key = %key, handle = %task.handle, "cancelled generation");
        true
    }

    pub fn cancel_all<B: ComputeBackend + ?Sized>(&mut self, backend: &mut B) -> usize {
        let tasks = std::mem::take(&mut self.in_flight);
        let count = tasks.len() + self.queued.len();
        self.queued.clear();
        for task in tasks.into_values() {
            backend.dispose(task.handle);
        }
        count
    }

    pub fn request_for(&self, desc: &DesiredChunk) -> GenerationRequest {
        GenerationRequest {
            key: desc.key,
            field: desc.field_spec(),
            world_size: desc.world_size,
            terrain: self.terrain,
        }
    }

    /// Run one scheduler step: apply completed results, then start queued
    /// requests nearest-first.
    pub fn tick<B, F>(
        &mut self,
        backend: &mut B,
        records: &mut BTreeMap<ChunkKey, ChunkRecord>,
        factory: &mut F,
    ) -> TickStats
    where
        B: ComputeBackend + ?Sized,
        F: ResourceFactory + ?Sized,
    {
        let _span = tracing::debug_span!("scheduler_tick").entered();
        let mut stats = match self.budget.mode {
            SchedulerMode::Async => {
                let mut stats = self.apply_completed(backend, records, factory);
                self.start_queued(backend, records, &mut stats);
                stats
            }
            SchedulerMode::Sync => self.run_sync(backend, records, factory),
        };
        stats.in_flight = self.in_flight.len();
        stats.queued = self.queued.len();
        tracing::trace!(
            started = stats.started,
            applied = stats.applied,
            failed = stats.failed,
            in_flight = stats.in_flight,
            queued = stats.queued,
            "scheduler tick complete"
        );
        stats
    }

    fn apply_completed<B, F>(
        &mut self,
        backend: &mut B,
        records: &mut BTreeMap<ChunkKey, ChunkRecord>,
        factory: &mut F,
    ) -> TickStats
    where
        B: ComputeBackend + ?Sized,
        F: ResourceFactory + ?Sized,
    {
        let mut stats = TickStats::default();
        let keys: Vec<ChunkKey> = self.in_flight.keys().copied().collect();
        for key in keys {
            if stats.applied + stats.failed >= self.budget.max_applies_per_tick {
                break;
            }
            let Some(handle) = self.in_flight.get(&key).map(|t| t.handle) else {
                continue;
            };
            let outcome = match backend.poll(handle) {
                GenerationPoll::Pending => continue,
                GenerationPoll::Ready(field) => Ok(field),
                GenerationPoll::Failed(e) => Err(e),
            };
            let Some(task) = self.in_flight.remove(&key) else {
                continue;
            };
            backend.dispose(task.handle);

            let Some(record) = records.get_mut(&key) else {
                tracing::debug!(key = %key, "result for unloaded chunk dropped");
                continue;
            };
            match outcome.and_then(|field| record.apply(&task.desc, field)) {
                Ok(()) => {
                    factory.upload(record);
                    stats.applied += 1;
                    tracing::debug!(
                        key = %key,
                        resolution = task.desc.resolution,
                        "applied height field"
                    );
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "generation failed, requeueing");
                    record.mark_failed();
                    self.queued
                        .entry(key)
                        .or_insert_with(|| record.target().clone());
                    stats.failed += 1;
                }
            }
        }
        stats
    }

    fn start_queued<B>(
        &mut self,
        backend: &mut B,
        records: &mut BTreeMap<ChunkKey, ChunkRecord>,
        stats: &mut TickStats,
    ) where
        B: ComputeBackend + ?Sized,
    {
        let free = self.budget.max_in_flight.saturating_sub(self.in_flight.len());
        let allowed = free.min(self.budget.max_starts_per_tick);
        if allowed == 0 {
            return;
        }

        let mut order: Vec<(i64, ChunkKey)> = self
            .queued
            .values()
            .filter(|d| !self.in_flight.contains_key(&d.key))
            .map(|d| (d.distance, d.key))
            .collect();
        order.sort_unstable();

        for (_, key) in order {
            if stats.started >= allowed {
                break;
            }
            let Some(record) = records.get_mut(&key) else {
                self.queued.remove(&key);
                continue;
            };
            let Some(desc) = self.queued.get(&key) else {
                continue;
            };
            let request = self.request_for(desc);
            match backend.submit(request) {
                Ok(handle) => {
                    let Some(desc) = self.queued.remove(&key) else {
                        backend.dispose(handle);
                        continue;
                    };
                    tracing::debug!(
                        key = %key,
                        handle = %handle,
                        resolution = desc.resolution,
                        "started generation"
                    );
                    record.mark_generating();
                    self.in_flight.insert(key, PendingTask { key, desc, handle });
                    stats.started += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        key = %key,
                        backend = backend.name(),
                        error = %e,
                        "submit failed"
                    );
                    stats.submit_errors += 1;
                    break;
                }
            }
        }
    }

    fn run_sync<B, F>(
        &mut self,
        backend: &mut B,
        records: &mut BTreeMap<ChunkKey, ChunkRecord>,
        factory: &mut F,
    ) -> TickStats
    where
        B: ComputeBackend + ?Sized,
        F: ResourceFactory + ?Sized,
    {
        let mut stats = TickStats::default();
        let mut order: Vec<DesiredChunk> = std::mem::take(&mut self.queued).into_values().collect();
        order.sort_by_key(|d| (d.distance, d.key));

        for desc in order {
            if let Some(task) = self.in_flight.remove(&desc.key) {
                backend.dispose(task.handle);
            }
            let Some(record) = records.get_mut(&desc.key) else {
                continue;
            };
            let result: Result<HeightField, BackendError> =
                backend.generate_sync(&self.request_for(&desc));
            match result.and_then(|field| record.apply(&desc, field)) {
                Ok(()) => {
                    factory.upload(record);
                    stats.started += 1;
                    stats.applied += 1;
                }
                Err(e) => {
                    tracing::warn!(key = %desc.key, error = %e, "sync generation failed");
                    stats.failed += 1;
                }
            }
        }
        stats
    }
}
