//! Crater generation: an elliptical footprint with a paraboloid floor,
//! carved in parallel 16×16 sub-regions, with a scorched rim.
//!
//! ```text
//!            rim (scorched, just outside the footprint)
//!   ~~~~~~\ ___________________________________ /~~~~~~  ← surface
//!          \        carved to air              /
//!           \_____                       _____/
//!                 \_______floor_________/           floorY = cy - ry·(1 - nd)
//! ```
//!
//! `nd` is the normalized elliptical distance squared,
//! `dx²/rx² + dz²/rz²`; a column is inside the footprint when `nd <= 1`.

use crate::cache::SpatialBlockCache;
use crate::error::{EngineError, Result};
use crate::hash::wang_noise;
use crate::material::Material;
use crate::mutation::{BlockChangeRequest, WorldMutationQueue};
use crate::pool::ComputePool;
use crate::raycast::RayCaster;
use crate::settings::CraterConfig;
use crate::transform::{is_blacklisted, is_liquid};
use crate::types::{pack_column, unpack_column, BlockPos, ChunkPos};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CraterSpec {
    center: BlockPos,
    radius_x: i32,
    radius_y: i32,
    radius_z: i32,
    destruction_height: i32,
}

impl CraterSpec {
    pub fn new(
        center: BlockPos,
        radius_x: i32,
        radius_y: i32,
        radius_z: i32,
        destruction_height: i32,
    ) -> Result<Self> {
        if radius_x <= 0 || radius_y <= 0 || radius_z <= 0 {
            return Err(EngineError::InvalidGeometry(format!(
                "crater radii must be positive, got ({}, {}, {})",
                radius_x, radius_y, radius_z
            )));
        }
        if destruction_height < 0 {
            return Err(EngineError::InvalidGeometry(format!(
                "crater destruction height must not be negative, got {}",
                destruction_height
            )));
        }
        Ok(Self {
            center,
            radius_x,
            radius_y,
            radius_z,
            destruction_height,
        })
    }

    pub fn center(&self) -> BlockPos {
        self.center
    }

    pub fn radius_x(&self) -> i32 {
        self.radius_x
    }

    pub fn radius_y(&self) -> i32 {
        self.radius_y
    }

    pub fn radius_z(&self) -> i32 {
        self.radius_z
    }

    pub fn destruction_height(&self) -> i32 {
        self.destruction_height
    }

    /// Radius reported when nothing better is known.
    pub fn fallback_radius(&self) -> f64 {
        self.radius_x.max(self.radius_z) as f64
    }

    /// `dx²/rx² + dz²/rz²` for a world column.
    pub fn normalized_distance_sq(&self, x: i32, z: i32) -> f64 {
        let dx = (x - self.center.x) as f64 / self.radius_x as f64;
        let dz = (z - self.center.z) as f64 / self.radius_z as f64;
        dx * dx + dz * dz
    }

    /// Paraboloid floor under a column inside the footprint.
    pub fn floor_y(&self, normalized_distance_sq: f64) -> i32 {
        (self.center.y as f64 - self.radius_y as f64 * (1.0 - normalized_distance_sq)).round() as i32
    }
}

// ---------------------------------------------------------------------------
// Region map
// ---------------------------------------------------------------------------

/// Floor-Y per footprint column, keyed by packed `(x, z)`.
#[derive(Debug, Clone, Default)]
pub struct SolidRegionMap {
    floors: HashMap<u64, i32>,
}

impl SolidRegionMap {
    pub fn build(spec: &CraterSpec) -> Self {
        let c = spec.center;
        let mut floors = HashMap::new();
        for x in (c.x - spec.radius_x)..=(c.x + spec.radius_x) {
            for z in (c.z - spec.radius_z)..=(c.z + spec.radius_z) {
                let nd = spec.normalized_distance_sq(x, z);
                if nd <= 1.0 {
                    floors.insert(pack_column(x, z), spec.floor_y(nd));
                }
            }
        }
        Self { floors }
    }

    pub fn floor_at(&self, x: i32, z: i32) -> Option<i32> {
        self.floors.get(&pack_column(x, z)).copied()
    }

    pub fn contains(&self, x: i32, z: i32) -> bool {
        self.floors.contains_key(&pack_column(x, z))
    }

    pub fn len(&self) -> usize {
        self.floors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.floors.is_empty()
    }

    /// Footprint columns grouped by chunk, in chunk order.
    fn by_chunk(&self) -> Vec<Vec<(i32, i32, i32)>> {
        let mut units: BTreeMap<ChunkPos, Vec<(i32, i32, i32)>> = BTreeMap::new();
        for (&key, &floor) in &self.floors {
            let (x, z) = unpack_column(key);
            units
                .entry(ChunkPos::containing(x, z))
                .or_default()
                .push((x, z, floor));
        }
        units.into_values().collect()
    }

    /// Columns outside the footprint that touch it (8-neighbourhood).
    pub fn rim_columns(&self) -> Vec<(i32, i32)> {
        let mut rim: Vec<u64> = Vec::new();
        for &key in self.floors.keys() {
            let (x, z) = unpack_column(key);
            for dx in -1..=1 {
                for dz in -1..=1 {
                    if dx == 0 && dz == 0 {
                        continue;
                    }
                    let neighbour = pack_column(x + dx, z + dz);
                    if !self.floors.contains_key(&neighbour) {
                        rim.push(neighbour);
                    }
                }
            }
        }
        rim.sort_unstable();
        rim.dedup();
        rim.into_iter().map(unpack_column).collect()
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Everything a crater would change, before it is queued.
#[derive(Debug, Default)]
pub struct CraterPlan {
    pub region: SolidRegionMap,
    /// Blocks above the floor turned to air.
    pub carve: Vec<BlockChangeRequest>,
    /// Floor and rim blocks rewritten from the scorch gradient.
    pub scorch: Vec<BlockChangeRequest>,
    /// Largest horizontal distance of a scorched block from the centre.
    pub effective_radius: f64,
}

#[derive(Default)]
struct UnitOutput {
    carve: Vec<BlockChangeRequest>,
    scorch: Vec<BlockChangeRequest>,
    max_scorch_distance: Option<f64>,
}

impl UnitOutput {
    fn scorched(&mut self, change: BlockChangeRequest, distance: f64) {
        self.scorch.push(change);
        self.max_scorch_distance = Some(self.max_scorch_distance.map_or(distance, |d| d.max(distance)));
    }
}

fn scorchable(m: Material) -> bool {
    !m.is_air() && !is_blacklisted(m) && !is_liquid(m)
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Removes expired snapshots when generation ends, however it ends.
struct CleanupGuard(Arc<SpatialBlockCache>);

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let removed = self.0.cleanup();
        if removed > 0 {
            debug!("Crater cleanup released {} cached snapshots", removed);
        }
    }
}

#[derive(Clone)]
pub struct SolidRegionGenerator {
    cache: Arc<SpatialBlockCache>,
    ray: RayCaster,
    config: CraterConfig,
}

impl SolidRegionGenerator {
    pub fn new(cache: Arc<SpatialBlockCache>, config: CraterConfig) -> Self {
        Self {
            ray: RayCaster::new(cache.clone()),
            cache,
            config,
        }
    }

    /// Carve the crater and return its effective radius.
    ///
    /// Planning runs on the compute pool; the result is queued through
    /// `queue` with backpressure.  Failures are logged and fall back to
    /// `max(radius_x, radius_z)`.
    pub async fn generate(
        &self,
        spec: CraterSpec,
        queue: &WorldMutationQueue,
        pool: &ComputePool,
    ) -> f64 {
        let _cleanup = CleanupGuard(self.cache.clone());

        let planner = self.clone();
        let plan = match pool.run("crater plan", move || planner.plan(&spec)).await {
            Ok(plan) => plan,
            Err(e) => {
                error!("Crater generation at {} failed: {}", spec.center, e);
                return spec.fallback_radius();
            }
        };

        let carved = plan.carve.len();
        let scorched = plan.scorch.len();
        for batch in [plan.carve, plan.scorch] {
            if let Err(e) = queue.submit_batch(batch).await {
                warn!("Crater at {} stopped queueing changes: {}", spec.center, e);
                break;
            }
        }
        info!(
            "Crater at {}: {} columns, {} blocks carved, {} scorched, radius {:.1}",
            spec.center,
            plan.region.len(),
            carved,
            scorched,
            plan.effective_radius
        );
        plan.effective_radius
    }

    /// Compute every change without queueing anything.
    pub fn plan(&self, spec: &CraterSpec) -> CraterPlan {
        let (min_y, max_y) = self.cache.height_range();
        let top = (spec.center.y + spec.destruction_height).min(max_y - 1);
        let c = spec.center;

        let region = SolidRegionMap::build(spec);
        self.cache.preload(ChunkPos::covering(
            c.x - spec.radius_x - 1,
            c.z - spec.radius_z - 1,
            c.x + spec.radius_x + 1,
            c.z + spec.radius_z + 1,
        ));

        let units = region.by_chunk();
        let carved: Vec<UnitOutput> = units
            .par_iter()
            .map(|columns| self.carve_unit(spec, columns, top))
            .collect();

        let rim = region.rim_columns();
        let scan_depth = (top - min_y + 1).max(0);
        let rimmed: Vec<UnitOutput> = rim
            .par_chunks(64)
            .map(|columns| self.scorch_rim(spec, columns, top, scan_depth))
            .collect();

        let mut plan = CraterPlan {
            region,
            ..Default::default()
        };
        let mut max_distance: Option<f64> = None;
        for out in carved.into_iter().chain(rimmed) {
            plan.carve.extend(out.carve);
            plan.scorch.extend(out.scorch);
            if let Some(d) = out.max_scorch_distance {
                max_distance = Some(max_distance.map_or(d, |m| m.max(d)));
            }
        }
        plan.effective_radius = max_distance
            .filter(|d| *d > 0.0)
            .unwrap_or_else(|| spec.fallback_radius());
        plan
    }

    fn carve_unit(&self, spec: &CraterSpec, columns: &[(i32, i32, i32)], top: i32) -> UnitOutput {
        let mut out = UnitOutput::default();
        for &(x, z, floor) in columns {
            for y in (floor + 1..=top).rev() {
                let m = self.cache.material(x, y, z);
                if !m.is_air() && !is_blacklisted(m) {
                    out.carve.push(BlockChangeRequest::air(BlockPos::new(x, y, z)));
                }
            }

            let floor_material = self.cache.material(x, floor, z);
            if scorchable(floor_material) {
                let nd = spec.normalized_distance_sq(x, z);
                let pos = BlockPos::new(x, floor, z);
                let scorch = self.scorch_material(pos, nd.sqrt());
                out.scorched(
                    BlockChangeRequest::set(pos, scorch),
                    pos.horizontal_distance(spec.center),
                );
            }
        }
        out
    }

    fn scorch_rim(&self, spec: &CraterSpec, columns: &[(i32, i32)], top: i32, depth: i32) -> UnitOutput {
        let mut out = UnitOutput::default();
        let short_radius = spec.radius_x.min(spec.radius_z) as f64;
        for &(x, z) in columns {
            let distance = spec.normalized_distance_sq(x, z).sqrt();
            let overshoot = (distance - 1.0) * short_radius;
            if overshoot > self.config.rim_band {
                continue;
            }
            let y = self.ray.first_solid_below(x, top, z, depth);
            if RayCaster::missed(top, y, depth) {
                continue;
            }
            let pos = BlockPos::new(x, y, z);
            if !scorchable(self.cache.material(x, y, z)) {
                continue;
            }
            let scorch = self.scorch_material(pos, distance.min(1.0));
            out.scorched(
                BlockChangeRequest::set(pos, scorch),
                pos.horizontal_distance(spec.center),
            );
        }
        out
    }

    /// Gradient entry for a normalized distance; closer to the centre picks
    /// a more burnt material.
    pub fn scorch_material(&self, pos: BlockPos, normalized_distance: f64) -> Material {
        let gradient = &self.config.scorch_gradient;
        let Some(&least_burnt) = gradient.first() else {
            return Material::COARSE_DIRT;
        };
        let noise = (wang_noise(pos.x, pos.y, pos.z) - 0.5) * 2.0 * self.config.scorch_noise;
        let t = (normalized_distance + noise).clamp(0.0, 1.0);
        let index = ((1.0 - t) * gradient.len() as f64).floor() as usize;
        gradient
            .get(index.min(gradient.len() - 1))
            .copied()
            .unwrap_or(least_burnt)
    }
}
