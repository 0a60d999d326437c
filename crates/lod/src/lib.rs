//! LOD policy: which resolution a chunk gets at a given distance, and when
//! distant base chunks merge into superchunks.
//!
//! # Invariants
//! - Every resolution handed out has the form `2^n + 1`.
//! - A legal ladder's spacings are integer multiples of the finest spacing, so
//!   neighbours at different LOD levels share boundary vertices exactly.
//! - Illegal configuration is reported, never silently corrected; fixing is a
//!   separate, explicit call.

mod ladder;
mod resolution;
mod superchunk;

pub use ladder::{LodConfig, check_distances, fix_ladder, is_legal_ladder};
pub use resolution::{
    MIN_LADDER_RESOLUTION, SnapMode, is_pow2_plus_one, resolution_for_distance, validate_resolution,
};
pub use superchunk::{SuperchunkConfig, aggregate_of, footprint, overlaps_near_square};

/// Configuration errors reported by ladder and resolution validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LodError {
    #[error("base resolution {0} is not of the form 2^n + 1")]
    IllegalBase(u32),
    #[error("ladder entry {index} ({value}) is outside [{min}, {max}]")]
    OutOfRange {
        index: usize,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error("ladder entry {index} ({value}) is not of the form 2^n + 1")]
    NotPow2PlusOne { index: usize, value: u32 },
    #[error("ladder entry {index} ({value}): {value} - 1 does not divide base spacing {base_spacing}")]
    NotDivisor {
        index: usize,
        value: u32,
        base_spacing: u32,
    },
    #[error("resolution ladder has {resolutions} entries but distance ladder has {distances}")]
    LengthMismatch { resolutions: usize, distances: usize },
    #[error("distance ladder is not strictly ascending at entry {index} ({value})")]
    DistancesNotAscending { index: usize, value: i64 },
    #[error("superchunk {field} must be positive")]
    Superchunk { field: &'static str },
}
