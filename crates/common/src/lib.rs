//! Shared types for the terrastream engine.
//!
//! # Invariants
//! - Absolute chunk coordinates are integers and never round-trip through floats.
//! - Keys order deterministically so iteration is reproducible across platforms.

mod types;

pub use types::{ChunkCoord, ChunkKey, EntityId, floor_div};
