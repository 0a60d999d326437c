use serde::{Deserialize, Serialize};

const WARP_SALT_X: u64 = 0x5741_5250_5f58;
const WARP_SALT_Y: u64 = 0x5741_5250_5f59;
const RIDGE_SALT: u64 = 0x5249_4447_45;

/// Splitmix64 finalizer: xor-shift, multiply by odd constant, twice, then a
/// final xor-shift. Full avalanche over all 64 bits.
#[inline]
pub fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Hash of one integer lattice point.
#[inline]
pub fn lattice_hash(x: i64, y: i64, seed: i32, salt: u64) -> u64 {
    let mut h = (seed as i64 as u64) ^ salt.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    h = mix64(h ^ (x as u64).wrapping_mul(0xd6e8_feb8_6659_fd93));
    mix64(h ^ (y as u64).wrapping_mul(0xa076_1d64_78bd_642f))
}

/// Pseudo-random value in `[0, 1)` for one lattice point (top 53 bits).
#[inline]
pub fn lattice_value(x: i64, y: i64, seed: i32, salt: u64) -> f64 {
    (lattice_hash(x, y, seed, salt) >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}

#[inline]
fn smoothstep(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

#[inline]
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Value noise with a lattice cell of `2^shift` grid cells.
///
/// The lattice corner is `coord >> shift` (an arithmetic shift, i.e. floor
/// division) and the interpolation weight comes from the low bits, so the
/// only floating-point inputs are small fractions in `[0, 1)`.
pub fn value_noise(x: i64, y: i64, shift: u32, seed: i32, salt: u64) -> f64 {
    let shift = shift.min(62);
    let cx = x >> shift;
    let cy = y >> shift;
    let mask = (1i64 << shift) - 1;
    let inv = 1.0 / (1u64 << shift) as f64;
    let tx = smoothstep((x & mask) as f64 * inv);
    let ty = smoothstep((y & mask) as f64 * inv);

    let nx = cx.wrapping_add(1);
    let ny = cy.wrapping_add(1);
    let v00 = lattice_value(cx, cy, seed, salt);
    let v10 = lattice_value(nx, cy, seed, salt);
    let v01 = lattice_value(cx, ny, seed, salt);
    let v11 = lattice_value(nx, ny, seed, salt);

    lerp(lerp(v00, v10, tx), lerp(v01, v11, tx), ty)
}

/// Octave parameters for the fractal height function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseParams {
    pub octaves: u32,
    /// Amplitude multiplier per octave.
    pub persistence: f32,
    /// Frequency multiplier per octave; applied as a drop of
    /// `log2(lacunarity)` in the lattice shift.
    pub lacunarity: f32,
    /// Lattice cell size of the first octave is `2^base_shift` cells.
    pub base_shift: u32,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            octaves: 5,
            persistence: 0.5,
            lacunarity: 2.0,
            base_shift: 8,
        }
    }
}

impl NoiseParams {
    fn octave_shift(&self, octave: u32) -> u32 {
        let step = f64::from(self.lacunarity.max(1.0)).log2();
        let drop = (step * f64::from(octave)).round() as i64;
        (i64::from(self.base_shift) - drop).max(0) as u32
    }

    fn fold(&self, mut per_octave: impl FnMut(u32, u32) -> f64) -> f32 {
        let mut amplitude = 1.0f64;
        let mut total = 0.0f64;
        let mut sum = 0.0f64;
        for octave in 0..self.octaves.max(1) {
            sum += per_octave(octave, self.octave_shift(octave)) * amplitude;
            total += amplitude;
            amplitude *= f64::from(self.persistence);
        }
        (sum / total).clamp(0.0, 1.0) as f32
    }
}

/// Fractal sum of value noise normalised to `[0, 1]`.
pub fn fbm01(x: i64, y: i64, seed: i32, params: &NoiseParams) -> f32 {
    params.fold(|octave, shift| value_noise(x, y, shift, seed, u64::from(octave)))
}

/// The height contract: `(absoluteCellX, absoluteCellY, seed, params) -> [0, 1]`.
pub fn height01(x: i64, y: i64, seed: i32, params: &NoiseParams) -> f32 {
    fbm01(x, y, seed, params)
}

/// Ridged variant: each octave is folded around its midpoint and squared,
/// which produces sharp crests where plain fbm has smooth hills.
pub fn ridged01(x: i64, y: i64, seed: i32, params: &NoiseParams) -> f32 {
    params.fold(|octave, shift| {
        let v = value_noise(x, y, shift, seed, RIDGE_SALT ^ u64::from(octave));
        let ridge = 1.0 - (2.0 * v - 1.0).abs();
        ridge * ridge
    })
}

/// Domain warp settings. Displacements are whole cells so warping never
/// leaves the integer lattice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarpParams {
    /// Maximum displacement in cells along each axis.
    pub amplitude: u32,
    /// Lattice shift of the low-frequency warp noise.
    pub shift: u32,
}

impl Default for WarpParams {
    fn default() -> Self {
        Self {
            amplitude: 64,
            shift: 9,
        }
    }
}

impl WarpParams {
    fn displace(&self, x: i64, y: i64, seed: i32) -> (i64, i64) {
        let amp = f64::from(self.amplitude);
        let wx = (value_noise(x, y, self.shift, seed, WARP_SALT_X) - 0.5) * 2.0 * amp;
        let wy = (value_noise(x, y, self.shift, seed, WARP_SALT_Y) - 0.5) * 2.0 * amp;
        (x.wrapping_add(wx.round() as i64), y.wrapping_add(wy.round() as i64))
    }
}

/// Domain-warped fbm.
pub fn warped01(x: i64, y: i64, seed: i32, params: &NoiseParams, warp: &WarpParams) -> f32 {
    let (wx, wy) = warp.displace(x, y, seed);
    fbm01(wx, wy, seed, params)
}

/// Which octave response to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shaping {
    #[default]
    Fbm,
    Ridged,
}

/// Everything the generator needs besides the chunk placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainParams {
    pub seed: i32,
    pub noise: NoiseParams,
    pub shaping: Shaping,
    pub warp: Option<WarpParams>,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 1337,
            noise: NoiseParams::default(),
            shaping: Shaping::Fbm,
            warp: None,
        }
    }
}

impl TerrainParams {
    /// Height at an absolute lattice cell.
    pub fn sample(&self, x: i64, y: i64) -> f32 {
        let (x, y) = match &self.warp {
            Some(warp) => warp.displace(x, y, self.seed),
            None => (x, y),
        };
        match self.shaping {
            Shaping::Fbm => fbm01(x, y, self.seed, &self.noise),
            Shaping::Ridged => ridged01(x, y, self.seed, &self.noise),
        }
    }
}
