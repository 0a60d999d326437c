use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an entity whose local position follows origin shifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

/// Absolute chunk coordinate in the unbounded grid.
///
/// This is the seed input to terrain generation, so it stays exact: it is
/// only ever combined with other integers.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ChunkCoord {
    pub x: i64,
    pub y: i64,
}

impl ChunkCoord {
    pub const ZERO: ChunkCoord = ChunkCoord { x: 0, y: 0 };

    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i64, dy: i64) -> Self {
        Self {
            x: self.x.wrapping_add(dx),
            y: self.y.wrapping_add(dy),
        }
    }

    /// Chebyshev distance, `max(|dx|, |dy|)`.
    pub fn chebyshev(self, other: ChunkCoord) -> i64 {
        let dx = self.x.wrapping_sub(other.x).wrapping_abs();
        let dy = self.y.wrapping_sub(other.y).wrapping_abs();
        dx.max(dy)
    }
}

impl std::ops::Add for ChunkCoord {
    type Output = ChunkCoord;

    fn add(self, rhs: ChunkCoord) -> ChunkCoord {
        self.offset(rhs.x, rhs.y)
    }
}

impl std::ops::Sub for ChunkCoord {
    type Output = ChunkCoord;

    fn sub(self, rhs: ChunkCoord) -> ChunkCoord {
        ChunkCoord {
            x: self.x.wrapping_sub(rhs.x),
            y: self.y.wrapping_sub(rhs.y),
        }
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Identity of a streamed cell: either a single base chunk or a superchunk
/// covering `scale x scale` base chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChunkKey {
    Base(ChunkCoord),
    Super { coord: ChunkCoord, scale: u32 },
}

impl ChunkKey {
    pub fn is_super(&self) -> bool {
        matches!(self, ChunkKey::Super { .. })
    }

    /// Coordinate passed to the height function for this key.
    pub fn noise_coord(&self) -> ChunkCoord {
        match *self {
            ChunkKey::Base(coord) => coord,
            ChunkKey::Super { coord, .. } => coord,
        }
    }

    pub fn scale(&self) -> u32 {
        match *self {
            ChunkKey::Base(_) => 1,
            ChunkKey::Super { scale, .. } => scale,
        }
    }

    /// Lowest base-chunk coordinate covered by this key.
    pub fn min_base_coord(&self) -> ChunkCoord {
        match *self {
            ChunkKey::Base(coord) => coord,
            ChunkKey::Super { coord, scale } => {
                let s = i64::from(scale);
                ChunkCoord::new(coord.x.wrapping_mul(s), coord.y.wrapping_mul(s))
            }
        }
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkKey::Base(coord) => write!(f, "chunk{coord}"),
            ChunkKey::Super { coord, scale } => write!(f, "super{coord}x{scale}"),
        }
    }
}

/// Floor division for a positive divisor; rounds toward negative infinity.
pub fn floor_div(value: i64, divisor: i64) -> i64 {
    debug_assert!(divisor > 0, "floor_div requires a positive divisor");
    value.div_euclid(divisor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_uniqueness() {
        let a = EntityId::new();
        let b = EntityId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn chebyshev_is_max_axis_distance() {
        let a = ChunkCoord::new(3, -2);
        assert_eq!(a.chebyshev(ChunkCoord::ZERO), 3);
        assert_eq!(ChunkCoord::new(-1, 5).chebyshev(a), 7);
    }

    #[test]
    fn floor_div_rounds_down_for_negatives() {
        assert_eq!(floor_div(7, 4), 1);
        assert_eq!(floor_div(-1, 4), -1);
        assert_eq!(floor_div(-4, 4), -1);
        assert_eq!(floor_div(-5, 4), -2);
    }

    #[test]
    fn super_key_covers_scaled_base_range() {
        let key = ChunkKey::Super {
            coord: ChunkCoord::new(-1, 2),
            scale: 4,
        };
        assert!(key.is_super());
        assert_eq!(key.min_base_coord(), ChunkCoord::new(-4, 8));
        assert_eq!(key.noise_coord(), ChunkCoord::new(-1, 2));
        assert_eq!(ChunkKey::Base(ChunkCoord::ZERO).scale(), 1);
    }

    #[test]
    fn keys_order_base_before_super() {
        let base = ChunkKey::Base(ChunkCoord::new(100, 100));
        let sup = ChunkKey::Super {
            coord: ChunkCoord::ZERO,
            scale: 2,
        };
        assert!(base < sup);
    }
}
