use serde::{Deserialize, Serialize};

use crate::LodError;
use crate::resolution::{
    MIN_LADDER_RESOLUTION, SnapMode, is_pow2_plus_one, resolution_for_distance,
    validate_resolution,
};

/// Check that every ladder entry is in `[9, base]`, of the form `2^n + 1`,
/// and that its spacing `entry - 1` divides the finest spacing `base - 1`.
///
/// The error's `Display` is the human-readable reason.
pub fn is_legal_ladder(base_resolution: u32, ladder: &[u32]) -> Result<(), LodError> {
    let base_spacing = base_resolution.saturating_sub(1);
    for (index, &value) in ladder.iter().enumerate() {
        if value < MIN_LADDER_RESOLUTION || value > base_resolution {
            return Err(LodError::OutOfRange {
                index,
                value,
                min: MIN_LADDER_RESOLUTION,
                max: base_resolution,
            });
        }
        if !is_pow2_plus_one(value) {
            return Err(LodError::NotPow2PlusOne { index, value });
        }
        if base_spacing % (value - 1) != 0 {
            return Err(LodError::NotDivisor {
                index,
                value,
                base_spacing,
            });
        }
    }
    Ok(())
}

/// Distance thresholds must be strictly ascending and parallel to the
/// resolution ladder.
pub fn check_distances(resolution_count: usize, distances: &[i64]) -> Result<(), LodError> {
    if resolution_count != distances.len() {
        return Err(LodError::LengthMismatch {
            resolutions: resolution_count,
            distances: distances.len(),
        });
    }
    for (index, pair) in distances.windows(2).enumerate() {
        if pair[1] <= pair[0] {
            return Err(LodError::DistancesNotAscending {
                index: index + 1,
                value: pair[1],
            });
        }
    }
    Ok(())
}

/// Explicit correction: snap every entry down to the nearest legal resolution
/// whose spacing divides `base - 1`. Entry count is preserved so a parallel
/// distance ladder stays aligned.
pub fn fix_ladder(base_resolution: u32, ladder: &[u32]) -> Vec<u32> {
    let base_spacing = base_resolution.saturating_sub(1).max(1);
    let floor = MIN_LADDER_RESOLUTION.min(base_resolution);
    ladder
        .iter()
        .map(|&entry| {
            let mut value = validate_resolution(entry, floor, base_resolution, SnapMode::Down);
            while value > 3 && base_spacing % (value - 1) != 0 {
                value = (value - 1) / 2 + 1;
            }
            value
        })
        .collect()
}

/// Distance-to-resolution policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    pub enabled: bool,
    /// Finest resolution, used for the nearest band and when LOD is off.
    pub base_resolution: u32,
    /// Resolution per band, finest first.
    pub resolutions: Vec<u32>,
    /// Upper Chebyshev distance (in chunks) of each band, ascending.
    pub distances: Vec<i64>,
    pub min_resolution: u32,
    pub max_resolution: u32,
    pub snap: SnapMode,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_resolution: 129,
            resolutions: vec![129, 65, 33, 17],
            distances: vec![1, 3, 6, 12],
            min_resolution: MIN_LADDER_RESOLUTION,
            max_resolution: 2049,
            snap: SnapMode::Up,
        }
    }
}

impl LodConfig {
    /// Report the first configuration problem, if any.
    pub fn validate(&self) -> Result<(), LodError> {
        if !is_pow2_plus_one(self.base_resolution)
            || self.base_resolution < self.min_resolution
            || self.base_resolution > self.max_resolution
        {
            return Err(LodError::IllegalBase(self.base_resolution));
        }
        if !self.enabled {
            return Ok(());
        }
        is_legal_ladder(self.base_resolution, &self.resolutions)?;
        check_distances(self.resolutions.len(), &self.distances)
    }

    /// A corrected copy of this config. Never applied implicitly.
    pub fn fixed(&self) -> LodConfig {
        let base_resolution = validate_resolution(
            self.base_resolution,
            self.min_resolution,
            self.max_resolution,
            self.snap,
        );
        let resolutions = fix_ladder(base_resolution, &self.resolutions);

        let mut distances = self.distances.clone();
        distances.truncate(resolutions.len());
        while distances.len() < resolutions.len() {
            let next = distances.last().map_or(1, |d| d + 1);
            distances.push(next);
        }
        for i in 1..distances.len() {
            if distances[i] <= distances[i - 1] {
                distances[i] = distances[i - 1] + 1;
            }
        }

        if resolutions != self.resolutions || base_resolution != self.base_resolution {
            tracing::info!(
                base = base_resolution,
                ?resolutions,
                "lod ladder corrected"
            );
        }

        LodConfig {
            base_resolution,
            resolutions,
            distances,
            ..self.clone()
        }
    }

    /// Resolution for a chunk at Chebyshev distance `distance` from the observer.
    pub fn resolution_for(&self, distance: i64) -> u32 {
        if !self.enabled {
            return self.base_resolution;
        }
        resolution_for_distance(
            distance,
            &self.resolutions,
            &self.distances,
            self.base_resolution,
        )
    }
}
