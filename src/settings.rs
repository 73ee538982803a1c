//! Engine configuration.
//!
//! Every knob has a default; hosts override any subset from a TOML file or
//! from `SHOCKWAVE__<SECTION>__<KEY>` environment variables.
//!
//! | Section       | Key                      | Default | Description                              |
//! |---------------|--------------------------|---------|------------------------------------------|
//! | *(root)*      | `worker_pool_size`       | `6`     | Compute threads for rings and craters    |
//! | `mutation`    | `worker_count`           | `2`     | Drain workers on the mutation context    |
//! | `mutation`    | `blocks_per_batch`       | `500`   | Changes applied per worker tick          |
//! | `mutation`    | `batch_interval_ms`      | `50`    | Sleep between worker ticks               |
//! | `mutation`    | `queue_capacity`         | `100000`| Bounded queue size (backpressure point)  |
//! | `cache`       | `max_entries`            | `256`   | Snapshots per world cache                |
//! | `cache`       | `global_max_snapshots`   | `2048`  | Snapshots across all worlds              |
//! | `cache`       | `ttl_secs`               | `60`    | Age after which a snapshot is evicted    |
//! | `shockwave`   | `max_radius`             | `200`   | Radius where the wave stops              |
//! | `shockwave`   | `height`                 | `60`    | Vertical reach above each column         |
//! | `shockwave`   | `speed`                  | `300.0` | Destruction front speed (blocks/s)       |
//! | `shockwave`   | `min_destruction_power`  | `2.0`   | Explosion power at the max radius        |
//! | `shockwave`   | `max_destruction_power`  | `5.0`   | Explosion power at the centre            |

use crate::error::{EngineError, Result};
use crate::material::Material;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "SHOCKWAVE";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    pub worker_count: usize,
    pub blocks_per_batch: usize,
    pub batch_interval_ms: u64,
    pub queue_capacity: usize,
    /// `submit_batch` yields to other producers after this many sends.
    pub submit_chunk_size: usize,
    /// Batches at least this large are grouped by chunk section first.
    pub chunk_group_threshold: usize,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            blocks_per_batch: 500,
            batch_interval_ms: 50,
            queue_capacity: 100_000,
            submit_chunk_size: 10_000,
            chunk_group_threshold: 100,
        }
    }
}

impl MutationConfig {
    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub global_max_snapshots: usize,
    pub ttl_secs: u64,
    /// Share of entries (oldest by last access) dropped per eviction cycle.
    pub eviction_fraction: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 256,
            global_max_snapshots: 2048,
            ttl_secs: 60,
            eviction_fraction: 0.2,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShockwaveConfig {
    pub max_radius: i32,
    pub height: i32,
    /// Destruction front speed in blocks per second.
    pub speed: f64,
    /// The effect front runs this much faster than the destruction front.
    pub effect_speed_multiplier: f64,
    pub radius_start: i32,
    /// Rings below this radius affect entities but do not destroy blocks.
    pub destroy_start: i32,
    pub min_destruction_power: f64,
    pub max_destruction_power: f64,
    pub tick_interval_ms: u64,
    pub circle_cache_capacity: usize,
    pub max_inflight_rings: usize,
    /// Samples per block of arc length on the smallest rings.
    pub max_sample_density: f64,
    /// Samples per block of arc length never drop below this.
    pub min_sample_density: f64,
    /// Radius at which the density has halved.
    pub density_falloff: f64,
}

impl Default for ShockwaveConfig {
    fn default() -> Self {
        Self {
            max_radius: 200,
            height: 60,
            speed: 300.0,
            effect_speed_multiplier: 1.25,
            radius_start: 0,
            destroy_start: 0,
            min_destruction_power: 2.0,
            max_destruction_power: 5.0,
            tick_interval_ms: 5,
            circle_cache_capacity: 512,
            max_inflight_rings: 32,
            max_sample_density: 4.0,
            min_sample_density: 1.0,
            density_falloff: 32.0,
        }
    }
}

impl ShockwaveConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Empirically tuned constants of the wall and roof penetration passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenetrationTuning {
    pub min_power: f64,
    pub power_exponent: f64,
    pub penetration_scale: f64,
    pub min_penetration: i32,
    pub max_penetration: i32,
    pub min_variance: f64,
    pub max_variance: f64,
    pub wall_depth_base: f64,
    pub wall_depth_power: f64,
    pub power_decay: f64,
    pub decay_floor: f64,
    pub decay_ceiling: f64,
    pub min_step_power: f64,
    pub jump_power_penalty: f64,
    pub jump_search_base: f64,
    pub jump_search_power: f64,
    /// Sideways search radius per unit of power; no search below radius 2.
    pub lateral_search_scale: f64,
    /// Chance of a sideways search at an air gap, plus `0.2 × power`.
    pub lateral_search_chance: f64,
    pub lateral_attempts_base: f64,
    pub lateral_attempts_power: f64,
    /// Power multiplier for a block reached by the sideways search.
    pub lateral_power_penalty: f64,
}

impl Default for PenetrationTuning {
    fn default() -> Self {
        Self {
            min_power: 0.05,
            power_exponent: 1.2,
            penetration_scale: 12.0,
            min_penetration: 1,
            max_penetration: 15,
            min_variance: 0.2,
            max_variance: 0.5,
            wall_depth_base: 0.7,
            wall_depth_power: 0.6,
            power_decay: 0.85,
            decay_floor: 0.7,
            decay_ceiling: 0.95,
            min_step_power: 0.08,
            jump_power_penalty: 0.7,
            jump_search_base: 10.0,
            jump_search_power: 15.0,
            lateral_search_scale: 4.0,
            lateral_search_chance: 0.6,
            lateral_attempts_base: 3.0,
            lateral_attempts_power: 3.0,
            lateral_power_penalty: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CraterConfig {
    /// How far (blocks) outside the footprint a rim column may be scorched.
    pub rim_band: f64,
    /// Amplitude of the hash noise added to the scorch gradient index.
    pub scorch_noise: f64,
    /// Scorch materials ordered from least to most burnt.
    pub scorch_gradient: Vec<Material>,
}

impl Default for CraterConfig {
    fn default() -> Self {
        Self {
            rim_band: 1.4,
            scorch_noise: 0.15,
            scorch_gradient: vec![
                Material::COARSE_DIRT,
                Material::TUFF,
                Material::COBBLED_DEEPSLATE,
                Material::BASALT,
                Material::BLACKSTONE,
                Material::OBSIDIAN,
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub max_tree_height: i32,
    /// Above this power logs are destroyed instead of toppled.
    pub destroy_threshold: f64,
    pub tilt_scale: f64,
    pub charred_log: Material,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_tree_height: 60,
            destroy_threshold: 0.4,
            tilt_scale: 6.0,
            charred_log: Material::POLISHED_BASALT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    /// Padding added around each ring's bounding volume.
    pub margin: f64,
    pub grid_cell_size: f64,
    /// Horizontal distance from a column at which an entity is hit.
    pub hit_reach: f64,
    pub knockback_strength: f64,
    pub knockback_lift: f64,
    pub base_damage: f64,
    /// Damage dealt to living entities standing inside the crater footprint.
    pub crater_damage: f64,
    pub shake_magnitude: f64,
    pub shake_decay: f64,
    pub shake_pitch_period: f64,
    pub shake_yaw_period: f64,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            margin: 4.0,
            grid_cell_size: 2.0,
            hit_reach: 1.5,
            knockback_strength: 2.5,
            knockback_lift: 0.4,
            base_damage: 20.0,
            crater_damage: 1000.0,
            shake_magnitude: 2.6,
            shake_decay: 0.04,
            shake_pitch_period: 3.7,
            shake_yaw_period: 3.0,
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub worker_pool_size: usize,
    pub mutation: MutationConfig,
    pub cache: CacheConfig,
    pub shockwave: ShockwaveConfig,
    pub penetration: PenetrationTuning,
    pub crater: CraterConfig,
    pub tree: TreeConfig,
    pub entity: EntityConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 6,
            mutation: MutationConfig::default(),
            cache: CacheConfig::default(),
            shockwave: ShockwaveConfig::default(),
            penetration: PenetrationTuning::default(),
            crater: CraterConfig::default(),
            tree: TreeConfig::default(),
            entity: EntityConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Layer defaults, an optional TOML/JSON file and environment overrides,
    /// then validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );
        let loaded: EngineConfig = builder.build()?.try_deserialize()?;
        loaded.validated()
    }

    /// Normalize recoverable mistakes and reject the rest.
    pub fn validated(mut self) -> Result<Self> {
        let wave = &mut self.shockwave;
        if wave.min_destruction_power > wave.max_destruction_power {
            std::mem::swap(&mut wave.min_destruction_power, &mut wave.max_destruction_power);
        }
        if wave.max_radius <= 0 {
            return Err(EngineError::InvalidGeometry(format!(
                "shockwave max_radius must be positive, got {}",
                wave.max_radius
            )));
        }
        if wave.height < 0 {
            return Err(EngineError::InvalidGeometry(format!(
                "shockwave height must not be negative, got {}",
                wave.height
            )));
        }
        if wave.speed.is_nan() || wave.speed <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "shockwave speed must be positive, got {}",
                wave.speed
            )));
        }
        wave.effect_speed_multiplier = wave.effect_speed_multiplier.max(1.0);
        wave.radius_start = wave.radius_start.clamp(0, wave.max_radius);
        wave.min_sample_density = wave.min_sample_density.max(1.0);
        wave.max_sample_density = wave.max_sample_density.max(wave.min_sample_density);
        wave.circle_cache_capacity = wave.circle_cache_capacity.max(1);
        wave.max_inflight_rings = wave.max_inflight_rings.max(1);

        if self.mutation.queue_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "mutation queue_capacity must be at least 1".into(),
            ));
        }
        self.mutation.worker_count = self.mutation.worker_count.max(1);
        self.mutation.blocks_per_batch = self.mutation.blocks_per_batch.max(1);
        self.mutation.submit_chunk_size = self.mutation.submit_chunk_size.max(1);
        self.worker_pool_size = self.worker_pool_size.max(1);

        if self.cache.max_entries == 0 || self.cache.global_max_snapshots == 0 {
            return Err(EngineError::InvalidConfig(
                "cache limits must be at least 1".into(),
            ));
        }
        self.cache.eviction_fraction = self.cache.eviction_fraction.clamp(0.01, 1.0);

        let tuning = &mut self.penetration;
        if tuning.min_penetration > tuning.max_penetration {
            std::mem::swap(&mut tuning.min_penetration, &mut tuning.max_penetration);
        }
        tuning.min_penetration = tuning.min_penetration.max(1);
        if tuning.decay_floor > tuning.decay_ceiling {
            std::mem::swap(&mut tuning.decay_floor, &mut tuning.decay_ceiling);
        }

        if self.crater.scorch_gradient.is_empty() {
            return Err(EngineError::InvalidConfig(
                "crater scorch_gradient must list at least one material".into(),
            ));
        }
        if self.entity.grid_cell_size <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "entity grid_cell_size must be positive".into(),
            ));
        }
        Ok(self)
    }
}
