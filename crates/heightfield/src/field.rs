use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use terrastream_common::ChunkCoord;

use crate::noise::TerrainParams;

/// Errors from building or reading back a height field.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("resolution {0} is too small, need at least 2 samples per side")]
    ResolutionTooSmall(u32),
    #[error("sample count mismatch: resolution {resolution} needs {expected} samples, got {actual}")]
    SampleCount {
        resolution: u32,
        expected: usize,
        actual: usize,
    },
    #[error("{cells} cells per chunk cannot be split evenly into {intervals} intervals")]
    UnevenStep { cells: i64, intervals: i64 },
}

/// Square grid of normalised height samples, row-major (`y` outer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeightField {
    resolution: u32,
    samples: Vec<f32>,
}

impl HeightField {
    /// A field with every sample at `value`.
    pub fn flat(resolution: u32, value: f32) -> Self {
        let n = resolution as usize;
        Self {
            resolution,
            samples: vec![value; n * n],
        }
    }

    /// Wrap a raw readback, rejecting buffers whose size does not match.
    pub fn from_samples(resolution: u32, samples: Vec<f32>) -> Result<Self, FieldError> {
        let n = resolution as usize;
        if samples.len() != n * n {
            return Err(FieldError::SampleCount {
                resolution,
                expected: n * n,
                actual: samples.len(),
            });
        }
        Ok(Self {
            resolution,
            samples,
        })
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn get(&self, ix: u32, iy: u32) -> Option<f32> {
        if ix >= self.resolution || iy >= self.resolution {
            return None;
        }
        self.samples
            .get(iy as usize * self.resolution as usize + ix as usize)
            .copied()
    }

    /// Bilinear sample at normalised coordinates; `(0, 0)` is the minimum
    /// corner and `(1, 1)` the maximum. Inputs are clamped.
    pub fn sample(&self, u: f32, v: f32) -> f32 {
        let last = self.resolution.saturating_sub(1);
        if last == 0 {
            return self.samples.first().copied().unwrap_or(0.0);
        }
        let fx = u.clamp(0.0, 1.0) * last as f32;
        let fy = v.clamp(0.0, 1.0) * last as f32;
        let x0 = (fx.floor() as u32).min(last - 1);
        let y0 = (fy.floor() as u32).min(last - 1);
        let tx = fx - x0 as f32;
        let ty = fy - y0 as f32;
        let at = |x: u32, y: u32| self.samples[y as usize * self.resolution as usize + x as usize];
        let top = at(x0, y0) + (at(x0 + 1, y0) - at(x0, y0)) * tx;
        let bottom = at(x0, y0 + 1) + (at(x0 + 1, y0 + 1) - at(x0, y0 + 1)) * tx;
        top + (bottom - top) * ty
    }

    /// Smallest and largest sample.
    pub fn min_max(&self) -> (f32, f32) {
        self.samples
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &h| {
                (lo.min(h), hi.max(h))
            })
    }
}

/// Placement of one chunk or superchunk on the absolute cell lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Chunk coordinate in units of `scale` base chunks.
    pub noise_coord: ChunkCoord,
    /// Samples per side of the output field.
    pub resolution: u32,
    /// Samples per side of a base chunk at the finest LOD.
    pub base_resolution: u32,
    /// Base chunks per side covered by this field.
    pub scale: u32,
}

impl FieldSpec {
    /// Lattice cells spanned by one side of this field.
    pub fn cells_per_side(&self) -> i64 {
        i64::from(self.base_resolution.saturating_sub(1)) * i64::from(self.scale.max(1))
    }

    /// Lattice cells between neighbouring samples.
    pub fn step(&self) -> Result<i64, FieldError> {
        if self.resolution < 2 {
            return Err(FieldError::ResolutionTooSmall(self.resolution));
        }
        let cells = self.cells_per_side();
        let intervals = i64::from(self.resolution - 1);
        if cells == 0 || cells % intervals != 0 {
            return Err(FieldError::UnevenStep { cells, intervals });
        }
        Ok(cells / intervals)
    }

    /// Absolute lattice cell of sample `(0, 0)`.
    pub fn origin_cell(&self) -> (i64, i64) {
        let cells = self.cells_per_side();
        (
            self.noise_coord.x.wrapping_mul(cells),
            self.noise_coord.y.wrapping_mul(cells),
        )
    }
}

/// Evaluate the height function for every sample of a chunk.
///
/// Rows are evaluated in parallel; each sample depends only on its own
/// lattice cell, so the result is identical to a sequential pass.
pub fn generate_chunk_field(
    spec: &FieldSpec,
    terrain: &TerrainParams,
) -> Result<HeightField, FieldError> {
    let step = spec.step()?;
    let (ox, oy) = spec.origin_cell();
    let n = spec.resolution as usize;
    let mut samples = vec![0.0f32; n * n];
    samples
        .par_chunks_mut(n)
        .enumerate()
        .for_each(|(iy, row)| {
            let y = oy.wrapping_add(iy as i64 * step);
            for (ix, out) in row.iter_mut().enumerate() {
                let x = ox.wrapping_add(ix as i64 * step);
                *out = terrain.sample(x, y);
            }
        });
    HeightField::from_samples(spec.resolution, samples)
}
