//! Deterministic height function and chunk height fields.
//!
//! # Invariants
//! - Noise is evaluated on 64-bit integer lattice coordinates; nothing is
//!   converted to a floating-point world position before hashing.
//! - The same `(x, y, seed, params)` yields bit-identical output no matter how
//!   far from the nominal origin it is evaluated.
//! - Chunks and superchunks sample one shared absolute cell lattice, so
//!   neighbouring fields agree exactly on their shared edges.

mod field;
mod noise;

pub use field::{FieldError, FieldSpec, HeightField, generate_chunk_field};
pub use noise::{
    NoiseParams, Shaping, TerrainParams, WarpParams, fbm01, height01, lattice_hash, lattice_value,
    mix64, ridged01, value_noise, warped01,
};
