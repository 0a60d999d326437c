use std::collections::BTreeMap;

use glam::Vec2;
use terrastream_common::{ChunkCoord, ChunkKey};
use terrastream_heightfield::{HeightField, generate_chunk_field};
use terrastream_stream::{
    BackendError, ChunkManager, ComputeBackend, CpuBackend, GenerationPoll, GenerationRequest,
    StreamConfig, StreamError, TaskHandle,
};

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Ready,
    Fail,
    WrongSize,
}

/// Backend whose tasks resolve only when the test says so.
#[derive(Debug, Default)]
struct ScriptedBackend {
    unavailable: bool,
    reject_submits: bool,
    next: u64,
    tasks: BTreeMap<TaskHandle, GenerationRequest>,
    outcomes: BTreeMap<TaskHandle, Outcome>,
    disposed: Vec<TaskHandle>,
    submits: usize,
}

impl ScriptedBackend {
    fn handle_for(&self, key: ChunkKey) -> Option<TaskHandle> {
        self.tasks
            .iter()
            .filter(|(_, r)| r.key == key)
            .map(|(h, _)| *h)
            .max()
    }

    fn resolve(&mut self, handle: TaskHandle, outcome: Outcome) {
        self.outcomes.insert(handle, outcome);
    }

    fn resolve_all(&mut self) {
        let handles: Vec<TaskHandle> = self.tasks.keys().copied().collect();
        for h in handles {
            self.resolve(h, Outcome::Ready);
        }
    }
}

impl ComputeBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn probe(&mut self) -> Result<(), BackendError> {
        if self.unavailable {
            return Err(BackendError::Unavailable("no device".into()));
        }
        Ok(())
    }

    fn submit(&mut self, request: GenerationRequest) -> Result<TaskHandle, BackendError> {
        if self.reject_submits {
            return Err(BackendError::Rejected("queue full".into()));
        }
        self.next += 1;
        self.submits += 1;
        let handle = TaskHandle(self.next);
        self.tasks.insert(handle, request);
        Ok(handle)
    }

    fn poll(&mut self, handle: TaskHandle) -> GenerationPoll {
        if !self.tasks.contains_key(&handle) {
            return GenerationPoll::Failed(BackendError::UnknownHandle(handle));
        }
        let Some(outcome) = self.outcomes.remove(&handle) else {
            return GenerationPoll::Pending;
        };
        let Some(request) = self.tasks.remove(&handle) else {
            return GenerationPoll::Failed(BackendError::UnknownHandle(handle));
        };
        match outcome {
            Outcome::Ready => match request.generate() {
                Ok(field) => GenerationPoll::Ready(field),
                Err(e) => GenerationPoll::Failed(e.into()),
            },
            Outcome::Fail => GenerationPoll::Failed(BackendError::Rejected("device lost".into())),
            Outcome::WrongSize => GenerationPoll::Ready(HeightField::flat(
                request.field.resolution + 2,
                0.5,
            )),
        }
    }

    fn dispose(&mut self, handle: TaskHandle) {
        if self.tasks.remove(&handle).is_some() {
            self.disposed.push(handle);
        }
        self.outcomes.remove(&handle);
    }
}

fn config() -> StreamConfig {
    let mut config = StreamConfig::default();
    config.chunk_size = 100.0;
    config.render_distance = 2;
    config.origin_threshold = 100.0;
    config.lod.base_resolution = 17;
    config.lod.resolutions = vec![17, 9];
    config.lod.distances = vec![1, 2];
    config.scheduler.max_in_flight = 4;
    config.scheduler.max_starts_per_tick = 2;
    config.scheduler.max_applies_per_tick = 3;
    config
}

fn manager(config: StreamConfig) -> ChunkManager<ScriptedBackend> {
    ChunkManager::new(config, ScriptedBackend::default()).unwrap()
}

fn base(x: i64, y: i64) -> ChunkKey {
    ChunkKey::Base(ChunkCoord::new(x, y))
}

#[test]
fn unavailable_backend_disables_streaming() {
    let backend = ScriptedBackend {
        unavailable: true,
        ..ScriptedBackend::default()
    };
    assert!(matches!(
        ChunkManager::new(config(), backend),
        Err(StreamError::Backend(BackendError::Unavailable(_)))
    ));
}

#[test]
fn shift_scenario_recentres_origin_and_desired_set() {
    let mut m = manager(config());
    let mut observer = Vec2::ZERO;
    m.update(&mut observer);
    assert_eq!(m.loaded_len(), 25);
    for x in -2..=2 {
        for y in -2..=2 {
            assert!(m.get(&base(x, y)).is_some());
        }
    }

    observer = Vec2::new(150.0, 0.0);
    let stats = m.update(&mut observer).clone();
    assert_eq!(stats.shifted, Some(ChunkCoord::new(1, 0)));
    assert_eq!(m.origin().origin(), ChunkCoord::new(1, 0));
    assert_eq!(observer, Vec2::new(50.0, 0.0));
    assert_eq!(stats.observer_chunk, ChunkCoord::new(1, 0));

    // Column x = -2 left, column x = 3 arrived; everything else stayed.
    assert_eq!(stats.reconcile.retired, 5);
    assert_eq!(stats.reconcile.created, 5);
    assert_eq!(stats.reconcile.reused, 5);
    assert!(m.get(&base(-2, 0)).is_none());
    assert!(m.get(&base(3, 0)).is_some());
    let r = m.get(&base(1, 1)).unwrap();
    assert_eq!(r.local_position(), Vec2::new(0.0, 100.0));
}

#[test]
fn diff_of_one_key_performs_one_action() {
    let mut m = manager(config());
    let full = m.compute_desired(ChunkCoord::ZERO);
    m.reconcile(&full);
    m.backend_mut().resolve_all();
    for _ in 0..20 {
        m.tick();
        m.backend_mut().resolve_all();
    }
    assert_eq!(m.ready_chunks().count(), 25);
    let submits = m.backend().submits;

    let mut fewer = full.clone();
    fewer.remove(&base(2, 2));
    let report = m.reconcile(&fewer);
    assert_eq!(report.actions(), 1);
    assert_eq!(report.retired, 1);

    let report = m.reconcile(&full);
    assert_eq!(report.actions(), 1);
    assert_eq!(report.created, 1);

    let mut coarser = full.clone();
    if let Some(d) = coarser.get_mut(&base(0, 1)) {
        d.resolution = 9;
    }
    let report = m.reconcile(&coarser);
    assert_eq!(report.actions(), 1);
    assert_eq!(report.regenerated, 1);
    assert_eq!(report.repositioned, 0);

    // Only the recreated and the regenerated chunk went back to the backend.
    m.tick();
    assert_eq!(m.backend().submits, submits + 2);
}

#[test]
fn crossing_a_band_edge_and_back_keeps_the_cached_field() {
    let mut m = manager(config());
    let full = m.compute_desired(ChunkCoord::ZERO);
    m.reconcile(&full);
    for _ in 0..20 {
        m.tick();
        m.backend_mut().resolve_all();
    }
    assert_eq!(m.ready_chunks().count(), 25);
    let submits = m.backend().submits;

    let mut coarser = full.clone();
    if let Some(d) = coarser.get_mut(&base(0, 1)) {
        d.resolution = 9;
    }

    // Back before the coarse rebuild started.
    assert_eq!(m.reconcile(&coarser).regenerated, 1);
    let report = m.reconcile(&full);
    assert_eq!(report.regenerated, 0);
    assert_eq!(report.actions(), 0);
    assert_eq!(report.cancelled, 1);
    assert!(!m.scheduler().is_pending(&base(0, 1)));
    let record = m.get(&base(0, 1)).unwrap();
    assert_eq!(record.lod_resolution(), 17);
    assert_eq!(record.target().resolution, 17);
    assert!(record.is_ready());

    // Back while the coarse rebuild is in flight: the task is disposed.
    m.reconcile(&coarser);
    m.tick();
    let coarse = m.backend().handle_for(base(0, 1)).unwrap();
    assert_eq!(m.backend().submits, submits + 1);
    let report = m.reconcile(&full);
    assert_eq!(report.regenerated, 0);
    assert!(m.backend().disposed.contains(&coarse));
    assert!(!m.scheduler().is_pending(&base(0, 1)));

    m.tick();
    assert_eq!(m.backend().submits, submits + 1);
    assert_eq!(m.get(&base(0, 1)).unwrap().lod_resolution(), 17);
}

#[test]
fn retired_container_is_reused_for_same_resolution() {
    let mut m = manager(config());
    let full = m.compute_desired(ChunkCoord::ZERO);
    let mut only_a = full.clone();
    only_a.retain(|k, _| *k == base(0, 0));
    let mut only_b = full.clone();
    only_b.retain(|k, _| *k == base(1, 0));
    assert_eq!(only_a[&base(0, 0)].resolution, only_b[&base(1, 0)].resolution);

    m.reconcile(&only_a);
    let handle = m.get(&base(0, 0)).unwrap().resources();
    let allocated = m.factory().allocated();

    m.reconcile(&BTreeMap::new());
    assert_eq!(m.pool().len(), 1);

    let report = m.reconcile(&only_b);
    assert_eq!(report.reused, 1);
    assert_eq!(m.get(&base(1, 0)).unwrap().resources(), handle);
    assert_eq!(m.factory().allocated(), allocated);
    assert!(m.pool().is_empty());
}

#[test]
fn in_flight_cap_and_start_budget_hold_every_tick() {
    let mut m = manager(config());
    let mut observer = Vec2::ZERO;
    for step in 0..40 {
        let stats = m.update(&mut observer).clone();
        assert!(stats.tick.in_flight <= 4, "step {step}: {}", stats.tick.in_flight);
        assert!(stats.tick.started <= 2, "step {step}: {}", stats.tick.started);
        assert!(stats.tick.applied + stats.tick.failed <= 3);
        assert!(m.scheduler().in_flight_len() <= 4);

        // Resolve every other task and move now and then.
        let handles: Vec<TaskHandle> = m.backend().tasks.keys().copied().step_by(2).collect();
        for h in handles {
            m.backend_mut().resolve(h, Outcome::Ready);
        }
        if step % 7 == 0 {
            observer.x += 60.0;
        }
    }
}

#[test]
fn retired_chunk_result_never_lands_in_reused_container() {
    let mut m = manager(config());
    let full = m.compute_desired(ChunkCoord::ZERO);
    let mut only_a = full.clone();
    only_a.retain(|k, _| *k == base(0, 0));
    let mut only_b = full.clone();
    only_b.retain(|k, _| *k == base(1, 0));

    m.reconcile(&only_a);
    m.tick();
    let stale = m.backend().handle_for(base(0, 0)).unwrap();

    let report = m.reconcile(&BTreeMap::new());
    assert_eq!(report.cancelled, 1);
    assert!(m.backend().disposed.contains(&stale));
    assert!(!m.scheduler().is_pending(&base(0, 0)));

    m.reconcile(&only_b);
    // The stale handle cannot be resolved any more.
    m.backend_mut().resolve(stale, Outcome::Ready);
    m.tick();
    m.tick();
    let b = m.get(&base(1, 0)).unwrap();
    assert!(!b.is_ready());
    assert_eq!(b.key(), base(1, 0));

    let fresh = m.backend().handle_for(base(1, 0)).unwrap();
    assert_ne!(fresh, stale);
    m.backend_mut().resolve(fresh, Outcome::Ready);
    m.tick();
    let b = m.get(&base(1, 0)).unwrap();
    assert!(b.is_ready());
    assert_eq!(b.noise_coord(), ChunkCoord::new(1, 0));
}

#[test]
fn failed_and_malformed_results_are_retried() {
    let mut m = manager(config());
    let mut only_a = m.compute_desired(ChunkCoord::ZERO);
    only_a.retain(|k, _| *k == base(0, 0));

    m.reconcile(&only_a);
    m.tick();
    let h = m.backend().handle_for(base(0, 0)).unwrap();
    m.backend_mut().resolve(h, Outcome::Fail);
    let t = m.tick();
    assert_eq!(t.failed, 1);
    assert!(!m.get(&base(0, 0)).unwrap().is_ready());
    assert!(m.scheduler().is_pending(&base(0, 0)));

    let h = m.backend().handle_for(base(0, 0)).unwrap();
    m.backend_mut().resolve(h, Outcome::WrongSize);
    let t = m.tick();
    assert_eq!(t.failed, 1);
    assert!(m.get(&base(0, 0)).unwrap().height_field().is_none());

    let h = m.backend().handle_for(base(0, 0)).unwrap();
    m.backend_mut().resolve(h, Outcome::Ready);
    m.tick();
    let record = m.get(&base(0, 0)).unwrap();
    assert!(record.is_ready());
    let field = record.height_field().unwrap();
    assert_eq!(field.resolution(), record.lod_resolution());
}

#[test]
fn rejected_submits_leave_chunks_waiting_until_backend_recovers() {
    let mut m = manager(config());
    m.backend_mut().reject_submits = true;
    let mut observer = Vec2::ZERO;
    let stats = m.update(&mut observer).clone();
    assert_eq!(stats.tick.started, 0);
    assert_eq!(stats.tick.submit_errors, 1);
    assert_eq!(stats.tick.queued, 25);

    let stats = m.update(&mut observer).clone();
    assert_eq!(stats.loaded, 25);
    assert_eq!(stats.ready, 0);

    m.backend_mut().reject_submits = false;
    let stats = m.update(&mut observer).clone();
    assert_eq!(stats.tick.started, 2);
}

#[test]
fn teleport_reseeds_far_away_with_exact_heights() {
    let mut config = config();
    config.scheduler.mode = terrastream_stream::SchedulerMode::Sync;
    let terrain = config.terrain;
    let mut m = ChunkManager::new(config, CpuBackend::new()).unwrap();
    let mut observer = Vec2::new(30.0, 40.0);
    m.update(&mut observer);

    let target = ChunkCoord::new(2_000_000_007, -5);
    let report = m.teleport(target, observer);
    assert_eq!(report.retired, 25);
    assert_eq!(report.created, 25);
    assert_eq!(report.reused, 25);
    assert_eq!(m.origin().origin(), target);
    assert_eq!(m.factory().allocated(), 25);

    m.tick();
    let record = m.get(&ChunkKey::Base(target)).unwrap();
    assert!(record.is_ready());
    let expected = generate_chunk_field(&record.target().field_spec(), &terrain).unwrap();
    assert_eq!(record.height_field(), Some(&expected));

    // The observer never moved locally, yet now stands on the target chunk.
    let (chunk, _) = m.origin().absolute_of(observer);
    assert_eq!(chunk, target);
}

#[test]
fn superchunks_serve_far_ring_and_answer_height_queries() {
    let mut config = config();
    config.render_distance = 8;
    config.superchunks.enabled = true;
    config.superchunks.scale = 4;
    config.superchunks.near_radius = 2;
    config.superchunks.resolution = 17;
    config.scheduler.mode = terrastream_stream::SchedulerMode::Sync;
    let mut m = ChunkManager::new(config, CpuBackend::new()).unwrap();
    let mut observer = Vec2::new(10.0, 10.0);
    m.update(&mut observer);

    let supers: Vec<_> = m.loaded().values().filter(|r| r.is_super()).collect();
    assert!(!supers.is_empty());
    for r in &supers {
        assert!(r.is_ready());
        assert!(!r.want_collider());
        assert_eq!(r.world_size(), 400.0);
        assert_eq!(
            r.min_base_coord(),
            ChunkCoord::new(r.noise_coord().x * 4, r.noise_coord().y * 4)
        );
    }
    // Local (650, 50) lies in base chunk (6, 0), served by superchunk (1, 0).
    assert!(m.get(&base(6, 0)).is_none());
    assert!(m.height_at_local(Vec2::new(650.0, 50.0)).is_some());
    assert_eq!(m.detail_chunks(ChunkCoord::ZERO).filter(|r| r.is_super()).count(), 0);
}
