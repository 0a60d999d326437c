use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use terrastream_common::{ChunkCoord, EntityId};

/// An event record produced by every origin mutation.
///
/// Collaborators that keep their own copies of local positions (render
/// transforms, physics bodies) drain these and apply the same translation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OriginEvent {
    /// The origin moved by `by` chunks. Every local position moved by
    /// `-by * chunk_size`.
    Shifted { by: ChunkCoord, origin: ChunkCoord },
    /// The origin was recomputed so the observer's local chunk maps to a new
    /// absolute chunk. Local positions did not move.
    Teleported {
        previous: ChunkCoord,
        origin: ChunkCoord,
    },
}

/// True when either axis of the observer's local position exceeds `threshold`.
pub fn should_shift(observer: Vec2, threshold: f32) -> bool {
    observer.x.abs() > threshold || observer.y.abs() > threshold
}

/// Whole-chunk translation that brings `local` back into the chunk nearest
/// the local origin: `floor(local / chunk_size)` per axis.
pub fn shift_chunks(local: Vec2, chunk_size: f32) -> ChunkCoord {
    ChunkCoord::new(
        (local.x / chunk_size).floor() as i64,
        (local.y / chunk_size).floor() as i64,
    )
}

/// The floating origin: which absolute chunk sits at local chunk `(0, 0)`,
/// plus the local positions of every entity that must follow a shift.
///
/// Uses BTreeMap so shifts visit tracked entities in a deterministic order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloatingOrigin {
    chunk_size: f32,
    threshold: f32,
    origin: ChunkCoord,
    entities: BTreeMap<EntityId, Vec2>,
    #[serde(skip)]
    event_log: Vec<OriginEvent>,
}

impl FloatingOrigin {
    /// Create an origin at absolute chunk `(0, 0)`.
    pub fn new(chunk_size: f32, threshold: f32) -> Self {
        Self::with_origin(chunk_size, threshold, ChunkCoord::ZERO)
    }

    pub fn with_origin(chunk_size: f32, threshold: f32, origin: ChunkCoord) -> Self {
        assert!(chunk_size > 0.0, "chunk_size must be positive");
        Self {
            chunk_size,
            threshold,
            origin,
            entities: BTreeMap::new(),
            event_log: Vec::new(),
        }
    }

    pub fn origin(&self) -> ChunkCoord {
        self.origin
    }

    pub fn chunk_size(&self) -> f32 {
        self.chunk_size
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Absolute chunk containing `local`, plus the offset inside that chunk.
    pub fn absolute_of(&self, local: Vec2) -> (ChunkCoord, Vec2) {
        let cells = shift_chunks(local, self.chunk_size);
        let offset = Vec2::new(
            local.x - cells.x as f32 * self.chunk_size,
            local.y - cells.y as f32 * self.chunk_size,
        );
        (self.origin + cells, offset)
    }

    /// Local position of `offset` inside the absolute chunk `coord`.
    ///
    /// Only meaningful for chunks near the origin; far chunks lose precision
    /// exactly the way any far local position would.
    pub fn local_of(&self, coord: ChunkCoord, offset: Vec2) -> Vec2 {
        self.chunk_min_local(coord) + offset
    }

    /// Local position of the minimum corner of the absolute chunk `coord`.
    pub fn chunk_min_local(&self, coord: ChunkCoord) -> Vec2 {
        let rel = coord - self.origin;
        Vec2::new(
            rel.x as f32 * self.chunk_size,
            rel.y as f32 * self.chunk_size,
        )
    }

    pub fn should_shift(&self, observer: Vec2) -> bool {
        should_shift(observer, self.threshold)
    }

    /// Re-centre on the observer's chunk.
    ///
    /// Subtracts a whole-chunk translation from the observer and every
    /// tracked entity and adds it to the origin. Returns the translation in
    /// chunks, or `None` when the observer already sits in local chunk `(0, 0)`.
    pub fn shift(&mut self, observer: &mut Vec2) -> Option<ChunkCoord> {
        let by = shift_chunks(*observer, self.chunk_size);
        if by == ChunkCoord::ZERO {
            return None;
        }
        let delta = Vec2::new(
            by.x as f32 * self.chunk_size,
            by.y as f32 * self.chunk_size,
        );
        *observer -= delta;
        for position in self.entities.values_mut() {
            *position -= delta;
        }
        self.origin = self.origin + by;
        self.event_log.push(OriginEvent::Shifted {
            by,
            origin: self.origin,
        });
        tracing::info!(
            by = %by,
            origin = %self.origin,
            tracked = self.entities.len(),
            "origin shifted"
        );
        Some(by)
    }

    /// Shift only if the observer has crossed the threshold.
    pub fn shift_if_needed(&mut self, observer: &mut Vec2) -> Option<ChunkCoord> {
        if self.should_shift(*observer) {
            self.shift(observer)
        } else {
            None
        }
    }

    /// Make the observer's current local chunk map to `target` without
    /// moving any local position.
    pub fn teleport(&mut self, target: ChunkCoord, observer: Vec2) {
        let previous = self.origin;
        let local_chunk = shift_chunks(observer, self.chunk_size);
        self.origin = target - local_chunk;
        self.event_log.push(OriginEvent::Teleported {
            previous,
            origin: self.origin,
        });
        tracing::info!(
            target = %target,
            previous = %previous,
            origin = %self.origin,
            "origin teleported"
        );
    }

    /// Start tracking an entity at a local position. Returns its id.
    pub fn track(&mut self, local: Vec2) -> EntityId {
        let id = EntityId::new();
        self.track_with_id(id, local);
        id
    }

    pub fn track_with_id(&mut self, id: EntityId, local: Vec2) {
        self.entities.insert(id, local);
    }

    /// Stop tracking an entity. Returns its last local position.
    pub fn untrack(&mut self, id: EntityId) -> Option<Vec2> {
        self.entities.remove(&id)
    }

    pub fn position(&self, id: EntityId) -> Option<Vec2> {
        self.entities.get(&id).copied()
    }

    /// Move a tracked entity in local space. Returns false if it is unknown.
    pub fn set_position(&mut self, id: EntityId, local: Vec2) -> bool {
        match self.entities.get_mut(&id) {
            Some(position) => {
                *position = local;
                true
            }
            None => false,
        }
    }

    /// Absolute chunk and in-chunk offset of a tracked entity.
    pub fn absolute_position(&self, id: EntityId) -> Option<(ChunkCoord, Vec2)> {
        self.position(id).map(|local| self.absolute_of(local))
    }

    pub fn tracked_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entities(&self) -> &BTreeMap<EntityId, Vec2> {
        &self.entities
    }

    pub fn events(&self) -> &[OriginEvent] {
        &self.event_log
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<OriginEvent> {
        std::mem::take(&mut self.event_log)
    }
}
