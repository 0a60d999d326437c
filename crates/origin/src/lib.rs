//! Coordinate model: exact absolute chunk coordinates plus small local positions.
//!
//! # Invariants
//! - `absolute = origin + local` holds for the observer and every tracked entity.
//! - The origin only moves by whole chunks, so it stays chunk-aligned.
//! - All origin mutations flow through `shift` or `teleport` and are logged.

pub mod frame;

pub use frame::{FloatingOrigin, OriginEvent, shift_chunks, should_shift};
