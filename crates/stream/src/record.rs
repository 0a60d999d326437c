use glam::Vec2;
use terrastream_common::{ChunkCoord, ChunkKey};
use terrastream_heightfield::HeightField;

use crate::backend::BackendError;
use crate::desired::DesiredChunk;
use crate::factory::ResourceHandle;

/// Generation state of a loaded chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// Desired but no generation task has started yet.
    Created,
    /// A generation task is in flight and no field has been applied yet.
    Generating,
    /// A height field has been applied.
    Ready,
}

/// Runtime entity for one streamed chunk or superchunk.
///
/// `applied` describes what the cached height field was generated from;
/// `target` is what the chunk is currently being built toward. They differ
/// only while a regeneration is pending.
#[derive(Debug)]
pub struct ChunkRecord {
    resources: ResourceHandle,
    applied: DesiredChunk,
    target: DesiredChunk,
    state: ChunkState,
    height_field: Option<HeightField>,
}

impl ChunkRecord {
    pub(crate) fn new(resources: ResourceHandle, desc: DesiredChunk) -> Self {
        Self {
            resources,
            applied: desc.clone(),
            target: desc,
            state: ChunkState::Created,
            height_field: None,
        }
    }

    /// Point a pooled container at a new chunk.
    pub(crate) fn reassign(&mut self, desc: DesiredChunk) {
        self.applied = desc.clone();
        self.target = desc;
        self.state = ChunkState::Created;
        self.height_field = None;
    }

    /// Clear generated data before the container goes back to the pool.
    pub(crate) fn reset(&mut self) {
        self.state = ChunkState::Created;
        self.height_field = None;
    }

    pub(crate) fn retarget(&mut self, desc: DesiredChunk) {
        self.target = desc;
    }

    /// Drop a pending regeneration and build toward the applied field again.
    pub(crate) fn settle(&mut self) {
        self.target = self.applied.clone();
    }

    /// Update placement attributes without touching the field.
    pub(crate) fn reposition(&mut self, desc: &DesiredChunk) {
        for d in [&mut self.applied, &mut self.target] {
            d.local_position = desc.local_position;
            d.want_collider = desc.want_collider;
            d.distance = desc.distance;
        }
    }

    pub(crate) fn mark_generating(&mut self) {
        if self.state == ChunkState::Created {
            self.state = ChunkState::Generating;
        }
    }

    pub(crate) fn mark_failed(&mut self) {
        if self.state == ChunkState::Generating {
            self.state = ChunkState::Created;
        }
    }

    /// Install a generated field. Rejects fields whose dimensions do not
    /// match the resolution they were requested at.
    pub(crate) fn apply(
        &mut self,
        desc: &DesiredChunk,
        field: HeightField,
    ) -> Result<(), BackendError> {
        if field.resolution() != desc.resolution {
            return Err(BackendError::Malformed {
                expected: desc.resolution,
                actual: field.resolution(),
            });
        }
        // Placement may have moved since submission; keep the live values.
        self.applied = DesiredChunk {
            local_position: self.target.local_position,
            want_collider: self.target.want_collider,
            distance: self.target.distance,
            ..desc.clone()
        };
        self.height_field = Some(field);
        self.state = ChunkState::Ready;
        Ok(())
    }

    pub fn key(&self) -> ChunkKey {
        self.applied.key
    }

    pub fn resources(&self) -> ResourceHandle {
        self.resources
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ChunkState::Ready
    }

    pub fn is_super(&self) -> bool {
        self.applied.is_super
    }

    pub fn super_scale(&self) -> u32 {
        self.applied.super_scale
    }

    pub fn noise_coord(&self) -> ChunkCoord {
        self.applied.noise_coord
    }

    pub fn min_base_coord(&self) -> ChunkCoord {
        self.applied.min_base_coord
    }

    pub fn lod_resolution(&self) -> u32 {
        self.applied.resolution
    }

    pub fn world_size(&self) -> f32 {
        self.applied.world_size
    }

    pub fn base_verts(&self) -> u32 {
        self.applied.base_verts
    }

    pub fn want_collider(&self) -> bool {
        self.applied.want_collider
    }

    pub fn local_position(&self) -> Vec2 {
        self.applied.local_position
    }

    pub fn height_field(&self) -> Option<&HeightField> {
        self.height_field.as_ref()
    }

    pub fn applied(&self) -> &DesiredChunk {
        &self.applied
    }

    pub fn target(&self) -> &DesiredChunk {
        &self.target
    }

    /// Height at an offset from the chunk's minimum corner, in local units.
    pub fn height_at(&self, offset: Vec2) -> Option<f32> {
        let field = self.height_field.as_ref()?;
        let size = self.applied.world_size;
        Some(field.sample(offset.x / size, offset.y / size))
    }
}
