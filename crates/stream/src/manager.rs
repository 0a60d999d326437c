use glam::Vec2;
use std::collections::BTreeMap;
use std::time::Instant;
use terrastream_common::{ChunkCoord, ChunkKey};
use terrastream_lod::aggregate_of;
use terrastream_origin::FloatingOrigin;

use crate::backend::{BackendError, ComputeBackend};
use crate::config::{ConfigError, StreamConfig};
use crate::desired::{DesiredChunk, DesiredSet, compute_desired_set};
use crate::factory::{HandleFactory, ResourceFactory};
use crate::pool::ChunkPool;
use crate::record::ChunkRecord;
use crate::scheduler::{Scheduler, TickStats};
use crate::stats::{FrameTimer, ReconcileReport, StreamStats};

const TIMER_HISTORY: usize = 120;

/// Fatal errors. Generation failures never show up here.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("streaming disabled: {0}")]
    Backend(#[from] BackendError),
}

/// Owns every loaded chunk, the retired-chunk pool, the floating origin and
/// the generation scheduler. Everything here runs on the caller's thread.
pub struct ChunkManager<B: ComputeBackend, F: ResourceFactory = HandleFactory> {
    config: StreamConfig,
    origin: FloatingOrigin,
    backend: B,
    factory: F,
    loaded: BTreeMap<ChunkKey, ChunkRecord>,
    pool: ChunkPool,
    scheduler: Scheduler,
    stats: StreamStats,
    timer: FrameTimer,
}

impl<B: ComputeBackend> ChunkManager<B, HandleFactory> {
    pub fn new(config: StreamConfig, backend: B) -> Result<Self, StreamError> {
        Self::with_factory(config, backend, HandleFactory::new())
    }
}

impl<B: ComputeBackend, F: ResourceFactory> ChunkManager<B, F> {
    /// Validate the configuration and probe the backend. Either failing
    /// leaves streaming disabled.
    pub fn with_factory(
        config: StreamConfig,
        mut backend: B,
        factory: F,
    ) -> Result<Self, StreamError> {
        config.validate()?;
        if let Err(e) = backend.probe() {
            tracing::error!(backend = backend.name(), error = %e, "compute backend unavailable");
            return Err(e.into());
        }
        tracing::info!(
            backend = backend.name(),
            render_distance = config.render_distance,
            chunk_size = config.chunk_size,
            "chunk manager ready"
        );
        Ok(Self {
            origin: FloatingOrigin::new(config.chunk_size, config.origin_threshold),
            pool: ChunkPool::new(config.pool),
            scheduler: Scheduler::new(config.scheduler, config.terrain),
            backend,
            factory,
            loaded: BTreeMap::new(),
            stats: StreamStats::default(),
            timer: FrameTimer::new(TIMER_HISTORY),
            config,
        })
    }

    /// One streaming step: shift the origin if the observer strayed too far,
    /// diff the desired set against loaded chunks, then run the scheduler.
    pub fn update(&mut self, observer: &mut Vec2) -> &StreamStats {
        let _span = tracing::info_span!("stream_update").entered();
        let start = Instant::now();

        let shifted = self.origin.shift_if_needed(observer);
        let (observer_chunk, _) = self.origin.absolute_of(*observer);
        let desired = self.compute_desired(observer_chunk);
        let reconcile = self.reconcile(&desired);
        let tick = self.tick();

        let elapsed = start.elapsed();
        self.timer.record(elapsed);
        self.stats = StreamStats {
            shifted,
            observer_chunk,
            reconcile,
            tick,
            loaded: self.loaded.len(),
            ready: self.loaded.values().filter(|r| r.is_ready()).count(),
            pooled: self.pool.len(),
            elapsed,
        };
        tracing::trace!(
            observer = %observer_chunk,
            loaded = self.stats.loaded,
            ready = self.stats.ready,
            pooled = self.stats.pooled,
            "stream update complete"
        );
        &self.stats
    }

    pub fn compute_desired(&self, observer: ChunkCoord) -> DesiredSet {
        compute_desired_set(&self.config, &self.origin, observer)
    }

    /// Bring the loaded set in line with `desired`. Retirements run before
    /// creations so a key changing shape never exists twice.
    pub fn reconcile(&mut self, desired: &DesiredSet) -> ReconcileReport {
        let _span = tracing::debug_span!("reconcile", desired = desired.len()).entered();
        let mut report = ReconcileReport::default();

        let gone: Vec<ChunkKey> = self
            .loaded
            .keys()
            .filter(|k| !desired.contains_key(k))
            .copied()
            .collect();
        for key in gone {
            if let Some(record) = self.loaded.remove(&key) {
                self.retire(record, &mut report);
            }
        }

        for (key, desc) in desired {
            if let Some(record) = self.loaded.get_mut(key) {
                let stale = record.target().needs_regeneration(desc);
                // The cached field already matches: drop the pending rebuild.
                let settled =
                    stale && record.is_ready() && !record.applied().needs_regeneration(desc);
                if settled {
                    if self.scheduler.cancel(key, &mut self.backend) {
                        report.cancelled += 1;
                    }
                    tracing::debug!(
                        key = %key,
                        resolution = desc.resolution,
                        "pending regeneration dropped"
                    );
                    record.settle();
                }
                let regenerate = stale && !settled;
                let moved = record.target().placement_differs(desc);
                if regenerate {
                    if self.scheduler.cancel(key, &mut self.backend) {
                        report.cancelled += 1;
                    }
                    tracing::debug!(
                        key = %key,
                        from = record.target().resolution,
                        to = desc.resolution,
                        "regenerating chunk"
                    );
                    record.retarget(desc.clone());
                    self.scheduler.enqueue(desc.clone());
                    report.regenerated += 1;
                }
                if moved || record.target().distance != desc.distance {
                    record.reposition(desc);
                }
                if moved {
                    self.factory.place(record);
                    report.repositioned += 1;
                }
                if !regenerate {
                    if self.scheduler.is_pending(key) {
                        self.scheduler.update_priority(key, desc.distance);
                    } else if !record.is_ready() {
                        self.scheduler.enqueue(record.target().clone());
                        report.requeued += 1;
                    }
                }
                continue;
            }
            self.create(desc.clone(), &mut report);
        }

        if report.actions() > 0 {
            tracing::debug!(
                created = report.created,
                reused = report.reused,
                retired = report.retired,
                regenerated = report.regenerated,
                "reconcile complete"
            );
        }
        report
    }

    /// Apply finished generation results and start queued ones.
    pub fn tick(&mut self) -> TickStats {
        self.scheduler
            .tick(&mut self.backend, &mut self.loaded, &mut self.factory)
    }

    /// Jump to `target` without moving the observer's local position. All
    /// loaded chunks and pending work are dropped and the desired set is
    /// rebuilt around the target.
    pub fn teleport(&mut self, target: ChunkCoord, observer: Vec2) -> ReconcileReport {
        let _span = tracing::info_span!("teleport", target = %target).entered();
        let mut report = self.clear();
        self.origin.teleport(target, observer);
        let desired = self.compute_desired(target);
        let seeded = self.reconcile(&desired);
        report.created += seeded.created;
        report.reused += seeded.reused;
        report
    }

    /// Cancel all pending work and retire every loaded chunk into the pool.
    pub fn clear(&mut self) -> ReconcileReport {
        let mut report = ReconcileReport {
            cancelled: self.scheduler.cancel_all(&mut self.backend),
            ..ReconcileReport::default()
        };
        let loaded = std::mem::take(&mut self.loaded);
        for record in loaded.into_values() {
            self.retire(record, &mut report);
        }
        report
    }

    /// Release every pooled container back to the factory.
    pub fn purge_pool(&mut self) -> usize {
        let drained = self.pool.drain();
        let count = drained.len();
        for record in drained {
            self.factory.release(record.resources());
        }
        count
    }

    fn create(&mut self, desc: DesiredChunk, report: &mut ReconcileReport) {
        let record = match self.pool.pop(desc.resolution) {
            Some(mut record) => {
                tracing::debug!(
                    key = %desc.key,
                    handle = record.resources().0,
                    "reusing pooled container"
                );
                record.reassign(desc.clone());
                report.reused += 1;
                record
            }
            None => {
                let handle = self.factory.allocate(desc.resolution);
                tracing::debug!(key = %desc.key, handle = handle.0, "allocated container");
                ChunkRecord::new(handle, desc.clone())
            }
        };
        self.factory.place(&record);
        self.scheduler.enqueue(desc.clone());
        self.loaded.insert(desc.key, record);
        report.created += 1;
    }

    fn retire(&mut self, mut record: ChunkRecord, report: &mut ReconcileReport) {
        let key = record.key();
        if self.scheduler.cancel(&key, &mut self.backend) {
            report.cancelled += 1;
        }
        self.factory.retire(&record);
        record.reset();
        report.retired += 1;
        tracing::debug!(key = %key, "retired chunk");
        if let Some(rejected) = self.pool.push(record) {
            self.factory.release(rejected.resources());
            report.discarded += 1;
        }
    }

    /// Chunks eligible for detail scatter: ready, not aggregated, at the
    /// finest resolution and within `detail_radius` of `observer`.
    pub fn detail_chunks(
        &self,
        observer: ChunkCoord,
    ) -> impl Iterator<Item = &ChunkRecord> + '_ {
        self.loaded
            .values()
            .filter(move |r| self.is_detail_eligible(r, observer))
    }

    pub fn is_detail_eligible(&self, record: &ChunkRecord, observer: ChunkCoord) -> bool {
        record.is_ready()
            && !record.is_super()
            && record.lod_resolution() == self.config.lod.base_resolution
            && record.noise_coord().chebyshev(observer) <= self.config.detail_radius
    }

    /// Terrain height under a local position, from whichever ready chunk or
    /// superchunk covers it.
    pub fn height_at_local(&self, local: Vec2) -> Option<f32> {
        let (coord, offset) = self.origin.absolute_of(local);
        if let Some(record) = self.loaded.get(&ChunkKey::Base(coord)) {
            return record.height_at(offset);
        }
        let scale = self.config.superchunks.scale;
        let key = ChunkKey::Super {
            coord: aggregate_of(coord, scale),
            scale,
        };
        let record = self.loaded.get(&key)?;
        let rel = coord - record.min_base_coord();
        let size = self.config.chunk_size;
        record.height_at(offset + Vec2::new(rel.x as f32 * size, rel.y as f32 * size))
    }

    pub fn ready_chunks(&self) -> impl Iterator<Item = &ChunkRecord> {
        self.loaded.values().filter(|r| r.is_ready())
    }

    pub fn get(&self, key: &ChunkKey) -> Option<&ChunkRecord> {
        self.loaded.get(key)
    }

    pub fn loaded(&self) -> &BTreeMap<ChunkKey, ChunkRecord> {
        &self.loaded
    }

    pub fn loaded_len(&self) -> usize {
        self.loaded.len()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn origin(&self) -> &FloatingOrigin {
        &self.origin
    }

    /// Tracked entities are registered through the origin.
    pub fn origin_mut(&mut self) -> &mut FloatingOrigin {
        &mut self.origin
    }

    pub fn pool(&self) -> &ChunkPool {
        &self.pool
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub fn timer(&self) -> &FrameTimer {
        &self.timer
    }
}
