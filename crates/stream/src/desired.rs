use glam::Vec2;
use std::collections::BTreeMap;
use terrastream_common::{ChunkCoord, ChunkKey};
use terrastream_heightfield::FieldSpec;
use terrastream_origin::FloatingOrigin;

use crate::config::StreamConfig;

/// What a chunk should be this tick. Recomputed every update and used only
/// for diffing against loaded records.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredChunk {
    pub key: ChunkKey,
    pub is_super: bool,
    pub super_scale: u32,
    /// Coordinate handed to the height function.
    pub noise_coord: ChunkCoord,
    /// Placement anchor: lowest base chunk covered.
    pub min_base_coord: ChunkCoord,
    pub resolution: u32,
    pub world_size: f32,
    pub base_verts: u32,
    pub want_collider: bool,
    /// Local position of the minimum corner under the current origin.
    pub local_position: Vec2,
    /// Chebyshev distance from the observer, used as start priority.
    pub distance: i64,
}

/// Desired chunks keyed for deterministic iteration.
pub type DesiredSet = BTreeMap<ChunkKey, DesiredChunk>;

impl DesiredChunk {
    /// Descriptor for an individual base chunk.
    pub fn base(
        config: &StreamConfig,
        origin: &FloatingOrigin,
        cell: ChunkCoord,
        distance: i64,
    ) -> Self {
        Self {
            key: ChunkKey::Base(cell),
            is_super: false,
            super_scale: 1,
            noise_coord: cell,
            min_base_coord: cell,
            resolution: config.lod.resolution_for(distance),
            world_size: config.chunk_size,
            base_verts: config.lod.base_resolution,
            want_collider: distance <= config.collision_radius,
            local_position: origin.chunk_min_local(cell),
            distance,
        }
    }

    /// Descriptor for a superchunk key produced by the aggregation rule.
    pub fn superchunk(
        config: &StreamConfig,
        origin: &FloatingOrigin,
        key: ChunkKey,
        observer: ChunkCoord,
    ) -> Self {
        let scale = key.scale();
        let min_base_coord = key.min_base_coord();
        Self {
            key,
            is_super: true,
            super_scale: scale,
            noise_coord: key.noise_coord(),
            min_base_coord,
            resolution: config.superchunks.resolution,
            world_size: config.chunk_size * scale as f32,
            base_verts: config.lod.base_resolution,
            want_collider: config.superchunks.collide,
            local_position: origin.chunk_min_local(min_base_coord),
            distance: config
                .superchunks
                .footprint_distance(key.noise_coord(), observer),
        }
    }

    /// True when the generated field would differ: resolution, super
    /// flag/scale, noise coordinate, vertex count or world size changed.
    pub fn needs_regeneration(&self, other: &DesiredChunk) -> bool {
        self.resolution != other.resolution
            || self.is_super != other.is_super
            || self.super_scale != other.super_scale
            || self.noise_coord != other.noise_coord
            || self.base_verts != other.base_verts
            || self.world_size != other.world_size
    }

    /// True when only placement-level attributes changed; those are fixed in
    /// place without touching the field.
    pub fn placement_differs(&self, other: &DesiredChunk) -> bool {
        self.local_position != other.local_position || self.want_collider != other.want_collider
    }

    /// Where this chunk's samples sit on the absolute lattice.
    pub fn field_spec(&self) -> FieldSpec {
        FieldSpec {
            noise_coord: self.noise_coord,
            resolution: self.resolution,
            base_resolution: self.base_verts,
            scale: self.super_scale,
        }
    }
}

/// All cells within a square radius of a center cell.
pub fn cells_in_radius(center: ChunkCoord, radius: i64) -> impl Iterator<Item = ChunkCoord> {
    let r = radius.max(0);
    (-r..=r).flat_map(move |dy| (-r..=r).map(move |dx| center.offset(dx, dy)))
}

/// Desired chunks around `observer`: every cell within `render_distance`,
/// with cells past the superchunk near radius merged into aggregates whose
/// footprint stays clear of the near square.
pub fn compute_desired_set(
    config: &StreamConfig,
    origin: &FloatingOrigin,
    observer: ChunkCoord,
) -> DesiredSet {
    let mut desired = DesiredSet::new();
    for cell in cells_in_radius(observer, config.render_distance) {
        if let Some(key) = config.superchunks.aggregate_for(cell, observer) {
            desired
                .entry(key)
                .or_insert_with(|| DesiredChunk::superchunk(config, origin, key, observer));
            continue;
        }
        let distance = cell.chebyshev(observer);
        desired.insert(
            ChunkKey::Base(cell),
            DesiredChunk::base(config, origin, cell, distance),
        );
    }
    desired
}
