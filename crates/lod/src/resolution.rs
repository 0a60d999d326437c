use serde::{Deserialize, Serialize};

/// Smallest resolution a LOD ladder may contain.
pub const MIN_LADDER_RESOLUTION: u32 = 9;

/// Direction used when a candidate resolution falls between two legal ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapMode {
    #[default]
    Up,
    Down,
}

/// True for `2^n + 1` with `n >= 1`.
pub fn is_pow2_plus_one(value: u32) -> bool {
    value >= 3 && (value - 1).is_power_of_two()
}

fn snap_up(value: u32) -> u32 {
    let spacing = value.saturating_sub(1).max(2);
    spacing
        .checked_next_power_of_two()
        .unwrap_or(1 << 31)
        .saturating_add(1)
}

fn snap_down(value: u32) -> u32 {
    let spacing = value.saturating_sub(1).max(2);
    (1u32 << (31 - spacing.leading_zeros())) + 1
}

/// Clamp to `[min, max]`, force odd, then snap `value - 1` to a power of two.
///
/// The requested direction wins when it stays in range; otherwise the other
/// direction is used. Only a range containing no `2^n + 1` value at all can
/// produce a result outside it.
pub fn validate_resolution(candidate: u32, min: u32, max: u32, snap: SnapMode) -> u32 {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    let mut value = candidate.clamp(lo, hi).max(3);
    if value % 2 == 0 {
        value = if value < hi { value + 1 } else { value - 1 };
    }
    let up = snap_up(value);
    let down = snap_down(value);
    let in_range = |r: u32| r >= lo && r <= hi;
    let (preferred, fallback) = match snap {
        SnapMode::Up => (up, down),
        SnapMode::Down => (down, up),
    };
    if in_range(preferred) {
        preferred
    } else if in_range(fallback) {
        fallback
    } else {
        preferred
    }
}

/// Resolution for the first distance threshold `distance` does not exceed,
/// else the last entry. Falls back to `base_resolution` when the ladders are
/// empty or of different lengths.
pub fn resolution_for_distance(
    distance: i64,
    resolutions: &[u32],
    distances: &[i64],
    base_resolution: u32,
) -> u32 {
    if resolutions.is_empty() || resolutions.len() != distances.len() {
        return base_resolution;
    }
    for (i, &threshold) in distances.iter().enumerate() {
        if distance <= threshold {
            return resolutions[i];
        }
    }
    resolutions[resolutions.len() - 1]
}
