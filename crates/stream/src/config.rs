//! Streaming configuration, loaded once at startup.

use serde::{Deserialize, Serialize};
use std::path::Path;
use terrastream_heightfield::TerrainParams;
use terrastream_lod::{LodConfig, LodError, SuperchunkConfig};

use crate::pool::PoolConfig;
use crate::scheduler::SchedulerBudget;

/// Errors from loading or validating a [`StreamConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unsupported config format {0:?}, expected .json, .yaml or .yml")]
    UnsupportedFormat(String),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("LOD configuration: {0}")]
    Lod(#[from] LodError),
}

/// Everything the streaming engine reads at startup. Changing any of it at
/// runtime requires a full clear/teleport cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Side length of one base chunk in local units.
    pub chunk_size: f32,
    /// Chebyshev radius, in chunks, of the desired set.
    pub render_distance: i64,
    /// Local distance from the origin on either axis that triggers a shift.
    pub origin_threshold: f32,
    /// Base chunks within this radius request collision geometry.
    pub collision_radius: i64,
    /// Ready max-LOD chunks within this radius are offered to detail scatter.
    pub detail_radius: i64,
    pub terrain: TerrainParams,
    pub lod: LodConfig,
    pub superchunks: SuperchunkConfig,
    pub scheduler: SchedulerBudget,
    pub pool: PoolConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100.0,
            render_distance: 8,
            origin_threshold: 1000.0,
            collision_radius: 1,
            detail_radius: 2,
            terrain: TerrainParams::default(),
            lod: LodConfig::default(),
            superchunks: SuperchunkConfig::default(),
            scheduler: SchedulerBudget::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl StreamConfig {
    /// Load from a `.json`, `.yaml` or `.yml` file. Does not validate.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "json" => Self::from_json_str(&text),
            "yaml" | "yml" => Self::from_yaml_str(&text),
            _ => Err(ConfigError::UnsupportedFormat(ext)),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Report the first configuration problem. Nothing is corrected here;
    /// use [`LodConfig::fixed`] explicitly for ladder repair.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.chunk_size.is_finite() && self.chunk_size > 0.0) {
            return Err(invalid("chunk_size", "must be a positive finite number"));
        }
        if !(self.origin_threshold.is_finite() && self.origin_threshold > 0.0) {
            return Err(invalid(
                "origin_threshold",
                "must be a positive finite number",
            ));
        }
        if self.render_distance < 0 {
            return Err(invalid("render_distance", "must not be negative"));
        }
        let budget = &self.scheduler;
        if budget.max_in_flight == 0 {
            return Err(invalid("scheduler.max_in_flight", "must be at least 1"));
        }
        if budget.max_starts_per_tick == 0 {
            return Err(invalid("scheduler.max_starts_per_tick", "must be at least 1"));
        }
        if budget.max_applies_per_tick == 0 {
            return Err(invalid(
                "scheduler.max_applies_per_tick",
                "must be at least 1",
            ));
        }
        let noise = &self.terrain.noise;
        if noise.octaves == 0 {
            return Err(invalid("terrain.noise.octaves", "must be at least 1"));
        }
        if !(noise.persistence.is_finite() && noise.persistence > 0.0) {
            return Err(invalid(
                "terrain.noise.persistence",
                "must be a positive finite number",
            ));
        }
        if !(noise.lacunarity.is_finite() && noise.lacunarity >= 1.0) {
            return Err(invalid(
                "terrain.noise.lacunarity",
                "must be a finite number of at least 1",
            ));
        }
        self.lod.validate()?;
        self.superchunks.validate(&self.lod)?;
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
