use serde::{Deserialize, Serialize};
use terrastream_common::{ChunkCoord, ChunkKey, floor_div};

use crate::LodError;
use crate::ladder::LodConfig;
use crate::resolution::{MIN_LADDER_RESOLUTION, is_pow2_plus_one};

/// Aggregate cell containing a base chunk.
pub fn aggregate_of(base: ChunkCoord, scale: u32) -> ChunkCoord {
    let s = i64::from(scale.max(1));
    ChunkCoord::new(floor_div(base.x, s), floor_div(base.y, s))
}

/// Inclusive base-chunk bounds covered by an aggregate cell.
pub fn footprint(aggregate: ChunkCoord, scale: u32) -> (ChunkCoord, ChunkCoord) {
    let s = i64::from(scale.max(1));
    let min = ChunkCoord::new(aggregate.x.wrapping_mul(s), aggregate.y.wrapping_mul(s));
    (min, min.offset(s - 1, s - 1))
}

/// Whether an aggregate's footprint intersects the square of Chebyshev
/// radius `near_radius` around `observer`.
pub fn overlaps_near_square(
    aggregate: ChunkCoord,
    scale: u32,
    observer: ChunkCoord,
    near_radius: i64,
) -> bool {
    let (min, max) = footprint(aggregate, scale);
    let near_min = observer.offset(-near_radius, -near_radius);
    let near_max = observer.offset(near_radius, near_radius);
    min.x <= near_max.x && max.x >= near_min.x && min.y <= near_max.y && max.y >= near_min.y
}

fn axis_gap(lo: i64, hi: i64, p: i64) -> i64 {
    if p < lo {
        lo - p
    } else if p > hi {
        p - hi
    } else {
        0
    }
}

/// Merge rule for distant base chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperchunkConfig {
    pub enabled: bool,
    /// Base chunks per side of one superchunk.
    pub scale: u32,
    /// Chebyshev radius served by individual base chunks.
    pub near_radius: i64,
    /// Samples per side of a superchunk field.
    pub resolution: u32,
    /// Whether superchunks request collision geometry.
    pub collide: bool,
}

impl Default for SuperchunkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scale: 4,
            near_radius: 4,
            resolution: 65,
            collide: false,
        }
    }
}

impl SuperchunkConfig {
    /// The superchunk resolution obeys the same range as ladder entries, and
    /// its fields sit on the base lattice only when their spacing divides
    /// `(base - 1) * scale`.
    pub fn validate(&self, lod: &LodConfig) -> Result<(), LodError> {
        if !self.enabled {
            return Ok(());
        }
        if self.scale == 0 {
            return Err(LodError::Superchunk { field: "scale" });
        }
        if self.near_radius < 0 {
            return Err(LodError::Superchunk {
                field: "near_radius",
            });
        }
        let min = MIN_LADDER_RESOLUTION.max(lod.min_resolution);
        let max = lod.max_resolution;
        if self.resolution < min || self.resolution > max {
            return Err(LodError::OutOfRange {
                index: 0,
                value: self.resolution,
                min,
                max,
            });
        }
        if !is_pow2_plus_one(self.resolution) {
            return Err(LodError::NotPow2PlusOne {
                index: 0,
                value: self.resolution,
            });
        }
        let base_spacing = lod
            .base_resolution.saturating_sub(1).saturating_mul(self.scale);
        if base_spacing % (self.resolution - 1) != 0 {
            return Err(LodError::NotDivisor {
                index: 0,
                value: self.resolution,
                base_spacing,
            });
        }
        Ok(())
    }

    /// Superchunk key serving `cell`, or `None` when the cell must be an
    /// individual base chunk: inside the near radius, or in an aggregate
    /// whose footprint touches the near square.
    pub fn aggregate_for(&self, cell: ChunkCoord, observer: ChunkCoord) -> Option<ChunkKey> {
        if !self.enabled || self.scale <= 1 || cell.chebyshev(observer) <= self.near_radius {
            return None;
        }
        let coord = aggregate_of(cell, self.scale);
        if overlaps_near_square(coord, self.scale, observer, self.near_radius) {
            return None;
        }
        Some(ChunkKey::Super {
            coord,
            scale: self.scale,
        })
    }

    /// Chebyshev distance from the observer to the nearest base chunk of an
    /// aggregate.
    pub fn footprint_distance(&self, aggregate: ChunkCoord, observer: ChunkCoord) -> i64 {
        let (min, max) = footprint(aggregate, self.scale);
        axis_gap(min.x, max.x, observer.x).max(axis_gap(min.y, max.y, observer.y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled(scale: u32, near_radius: i64) -> SuperchunkConfig {
        SuperchunkConfig {
            enabled: true,
            scale,
            near_radius,
            ..SuperchunkConfig::default()
        }
    }

    #[test]
    fn aggregate_uses_floor_division() {
        assert_eq!(aggregate_of(ChunkCoord::new(3, 4), 4), ChunkCoord::new(0, 1));
        assert_eq!(aggregate_of(ChunkCoord::new(-1, -4), 4), ChunkCoord::new(-1, -1));
        assert_eq!(aggregate_of(ChunkCoord::new(-5, 0), 4), ChunkCoord::new(-2, 0));
    }

    #[test]
    fn footprint_is_inclusive() {
        let (min, max) = footprint(ChunkCoord::new(-1, 2), 4);
        assert_eq!(min, ChunkCoord::new(-4, 8));
        assert_eq!(max, ChunkCoord::new(-1, 11));
    }

    #[test]
    fn near_cells_are_never_aggregated() {
        let cfg = enabled(4, 2);
        assert_eq!(cfg.aggregate_for(ChunkCoord::new(2, -2), ChunkCoord::ZERO), None);
    }

    #[test]
    fn aggregate_overlapping_near_square_falls_back() {
        let cfg = enabled(4, 2);
        // Cell (3, 0) is beyond the near radius but its aggregate (0, 0)
        // covers base chunks 0..=3, which touch the near square.
        assert_eq!(cfg.aggregate_for(ChunkCoord::new(3, 0), ChunkCoord::ZERO), None);
        // Cell (4, 0) lives in aggregate (1, 0) covering 4..=7: clear of the square.
        assert_eq!(
            cfg.aggregate_for(ChunkCoord::new(4, 0), ChunkCoord::ZERO),
            Some(ChunkKey::Super {
                coord: ChunkCoord::new(1, 0),
                scale: 4
            })
        );
    }

    #[test]
    fn disabled_config_never_aggregates() {
        let cfg = SuperchunkConfig::default();
        assert_eq!(cfg.aggregate_for(ChunkCoord::new(100, 0), ChunkCoord::ZERO), None);
    }

    #[test]
    fn footprint_distance_measures_nearest_cell() {
        let cfg = enabled(4, 2);
        assert_eq!(cfg.footprint_distance(ChunkCoord::new(1, 0), ChunkCoord::ZERO), 4);
        assert_eq!(cfg.footprint_distance(ChunkCoord::new(-2, -2), ChunkCoord::ZERO), 5);
        assert_eq!(cfg.footprint_distance(ChunkCoord::new(0, 0), ChunkCoord::new(2, 2)), 0);
    }

    fn lod(base_resolution: u32) -> LodConfig {
        LodConfig {
            base_resolution,
            ..LodConfig::default()
        }
    }

    #[test]
    fn validate_checks_super_resolution_against_lattice() {
        let mut cfg = enabled(4, 2);
        cfg.resolution = 65;
        assert_eq!(cfg.validate(&lod(17)), Ok(()));
        cfg.resolution = 129;
        assert!(matches!(cfg.validate(&lod(17)), Err(LodError::NotDivisor { .. })));
        cfg.resolution = 60;
        assert!(matches!(cfg.validate(&lod(17)), Err(LodError::NotPow2PlusOne { .. })));
        cfg.scale = 0;
        assert_eq!(cfg.validate(&lod(17)), Err(LodError::Superchunk { field: "scale" }));
    }

    #[test]
    fn super_resolution_must_be_in_ladder_range() {
        let mut cfg = enabled(4, 2);
        // 3 is 2^1 + 1 and divides any even spacing, but is below the floor.
        cfg.resolution = 3;
        assert_eq!(
            cfg.validate(&lod(17)),
            Err(LodError::OutOfRange {
                index: 0,
                value: 3,
                min: MIN_LADDER_RESOLUTION,
                max: 2049,
            })
        );

        let mut bounds = lod(129);
        bounds.min_resolution = 33;
        bounds.max_resolution = 257;
        cfg.resolution = 17;
        assert!(matches!(
            cfg.validate(&bounds),
            Err(LodError::OutOfRange { min: 33, .. })
        ));
        cfg.resolution = 513;
        assert!(matches!(
            cfg.validate(&bounds),
            Err(LodError::OutOfRange { max: 257, .. })
        ));
        cfg.resolution = 257;
        assert_eq!(cfg.validate(&bounds), Ok(()));
    }
}
