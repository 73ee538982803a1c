//! Per-column destruction for a ring of the shockwave.
//!
//! A column whose surface has an exposed side is treated as a wall and is
//! stripped vertically; anything else is a roof or floor and is drilled
//! downward with decaying power.
//!
//! | Path | Depth                                   | Result per block                    |
//! |------|-----------------------------------------|-------------------------------------|
//! | wall | `height × (0.7 + 0.6·power)`            | air, or transformed below the top   |
//! | roof | seeded `max_pen` in `[1, 15 × 1.4]`     | layered table by depth ratio        |
//!
//! An air gap under a roof is crossed by a ray jump straight down; at power
//! 0.5 and above a seeded sideways search may pick nearby ground instead.
//!
//! All randomness comes from an RNG seeded by the surface coordinate, so a
//! column always makes the same decisions regardless of the worker that
//! processes it.

use crate::cache::SpatialBlockCache;
use crate::hash::position_rng;
use crate::material::Material;
use crate::mutation::BlockChangeRequest;
use crate::raycast::RayCaster;
use crate::settings::PenetrationTuning;
use crate::transform::{is_attached, is_blacklisted, is_liquid, is_shaped, TransformationRule};
use crate::types::BlockPos;
use dashmap::DashSet;
use rand::rngs::SmallRng;
use rand::Rng;
use std::sync::Arc;

const CARDINALS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

pub struct PenetrationProcessor {
    cache: Arc<SpatialBlockCache>,
    ray: RayCaster,
    rule: Arc<TransformationRule>,
    tuning: PenetrationTuning,
    height: i32,
    processed: DashSet<u64>,
}

impl PenetrationProcessor {
    pub fn new(
        cache: Arc<SpatialBlockCache>,
        rule: Arc<TransformationRule>,
        tuning: PenetrationTuning,
        height: i32,
    ) -> Self {
        Self {
            ray: RayCaster::new(cache.clone()),
            cache,
            rule,
            tuning,
            height,
            processed: DashSet::new(),
        }
    }

    /// Mark a coordinate as decided.  Returns `false` if it already was.
    pub fn claim(&self, pos: BlockPos) -> bool {
        self.processed.insert(pos.pack())
    }

    pub fn min_power(&self) -> f64 {
        self.tuning.min_power
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn clear(&self) {
        self.processed.clear();
    }

    /// Decide every change for the column whose top solid block is
    /// `surface`, appending them to `out`.
    pub fn process_column(&self, surface: BlockPos, power: f64, out: &mut Vec<BlockChangeRequest>) {
        if power < self.tuning.min_power {
            return;
        }
        let mut rng = position_rng(surface);
        let max_pen = self.max_penetration(power, &mut rng);

        if self.is_wall(surface) || self.is_wall(surface.below()) {
            self.strip_wall(surface, power, &mut rng, out);
        } else {
            self.drill_roof(surface, power, max_pen, &mut rng, out);
        }
    }

    /// Seeded penetration depth for a normalized power.
    pub fn max_penetration<R: Rng + ?Sized>(&self, power: f64, rng: &mut R) -> i32 {
        let t = &self.tuning;
        let base = (power.powf(t.power_exponent) * t.penetration_scale)
            .round()
            .clamp(t.min_penetration as f64, t.max_penetration as f64);
        let variance = (power * 0.6).clamp(t.min_variance, t.max_variance);
        let distance = 1.0 - power.clamp(0.0, 1.0);
        let offset = (rng.gen::<f64>() * 2.0 - 1.0) * base * variance * (1.0 - distance * 0.5);

        let lo = ((base * 0.7) as i32).max(1);
        let hi = ((base * 1.4) as i32).max(lo);
        ((base + offset).round() as i32).clamp(lo, hi)
    }

    /// A block with air on any cardinal side is part of a wall.
    pub fn is_wall(&self, pos: BlockPos) -> bool {
        CARDINALS
            .iter()
            .any(|&(dx, dz)| self.cache.material(pos.x + dx, pos.y, pos.z + dz).is_air())
    }

    fn has_attached_neighbour(&self, pos: BlockPos) -> bool {
        CARDINALS
            .iter()
            .any(|&(dx, dz)| is_attached(self.cache.material(pos.x + dx, pos.y, pos.z + dz)))
    }

    // -----------------------------------------------------------------------
    // Wall path
    // -----------------------------------------------------------------------

    fn strip_wall(&self, start: BlockPos, power: f64, rng: &mut SmallRng, out: &mut Vec<BlockChangeRequest>) {
        if !self.claim(start) {
            return;
        }
        let t = &self.tuning;
        let max_depth = (self.height as f64 * (t.wall_depth_base + power * t.wall_depth_power)) as i32;

        for depth in 0..max_depth {
            let pos = start.offset(0, -depth, 0);
            if depth > 0 && !self.is_wall(pos) {
                break;
            }
            let m = self.cache.material(pos.x, pos.y, pos.z);
            if is_blacklisted(m) || m.is_air() {
                continue;
            }
            if is_liquid(m) {
                break;
            }
            if depth > 0 && !self.claim(pos) {
                continue;
            }

            let result = if depth > 0 && rng.gen::<f64>() < power {
                self.rule.transform(m, power, rng)
            } else {
                Material::AIR
            };
            let physics = (result.is_air() && depth == 0) || self.has_attached_neighbour(pos);
            out.push(change(pos, result, physics));
        }
    }

    // -----------------------------------------------------------------------
    // Roof path
    // -----------------------------------------------------------------------

    fn drill_roof(
        &self,
        start: BlockPos,
        power: f64,
        max_pen: i32,
        rng: &mut SmallRng,
        out: &mut Vec<BlockChangeRequest>,
    ) {
        let t = &self.tuning;
        let decay = t.power_decay - 0.15 * (1.0 - power.powf(1.5));
        let jitter = ((power * 3.0 + 1.0) as i32).max(1);
        let offsets: Vec<(i32, i32)> = (0..max_pen)
            .map(|i| {
                let level_variance = (i as f64 * 0.15 + power * 0.2).min(1.0);
                if rng.gen::<f64>() < 0.3 + level_variance {
                    (rng.gen_range(-jitter..=jitter), rng.gen_range(-jitter..=jitter))
                } else {
                    (0, 0)
                }
            })
            .collect();
        let search_depth = (t.jump_search_base + power * t.jump_search_power) as i32;
        let lateral_radius = ((power * t.lateral_search_scale) as i32).max(1);
        let lateral_attempts = (t.lateral_attempts_base + power * power * t.lateral_attempts_power) as i32;
        let (min_y, _) = self.cache.height_range();

        let (x, z) = (start.x, start.z);
        let mut y = start.y;
        let mut current = power;
        let mut count = 0;

        while count < max_pen && current > t.min_step_power && y > min_y {
            let (ox, oz) = offsets.get(count as usize).copied().unwrap_or((0, 0));
            let pos = BlockPos::new(x + ox, y, z + oz);
            let jittered = ox != 0 || oz != 0;

            if !self.claim(pos) {
                y -= 1;
                count += 1;
                continue;
            }

            let m = self.cache.material(pos.x, pos.y, pos.z);
            if is_blacklisted(m) || is_liquid(m) {
                if jittered {
                    self.fall_back_straight(BlockPos::new(x, y, z), current, count, max_pen, rng, out);
                }
                break;
            }

            if m.is_air() {
                if jittered {
                    self.fall_back_straight(BlockPos::new(x, y, z), current, count, max_pen, rng, out);
                }
                if lateral_radius > 1 && rng.gen::<f64>() < t.lateral_search_chance + power * 0.2 {
                    if let Some((hit, hm)) = self.search_sideways(pos, lateral_radius, lateral_attempts, search_depth, rng) {
                        out.push(self.roof_block(hit, hm, current * t.lateral_power_penalty, count, max_pen, rng));
                        y -= 1;
                        count += 1;
                        current *= decay;
                        continue;
                    }
                }
                let next = self.ray.first_solid_below(pos.x, y, pos.z, search_depth);
                if RayCaster::missed(y, next, search_depth) {
                    break;
                }
                y = next;
                current *= t.jump_power_penalty;
                continue;
            }

            out.push(self.roof_block(pos, m, current, count, max_pen, rng));
            y -= 1;
            let factor = decay + (rng.gen::<f64>() * 0.1 - 0.05) + power * 0.08;
            current *= factor.clamp(t.decay_floor, t.decay_ceiling);
            count += 1;
        }
    }

    fn fall_back_straight(
        &self,
        pos: BlockPos,
        power: f64,
        count: i32,
        max_pen: i32,
        rng: &mut SmallRng,
        out: &mut Vec<BlockChangeRequest>,
    ) {
        let m = self.cache.material(pos.x, pos.y, pos.z);
        if m.is_air() || is_blacklisted(m) || is_liquid(m) || !self.claim(pos) {
            return;
        }
        out.push(self.roof_block(pos, m, power, count, max_pen, rng));
    }

    /// Cast down from random columns around an air gap. Strong blasts open
    /// cavities sideways instead of only straight down.
    fn search_sideways(
        &self,
        from: BlockPos,
        radius: i32,
        attempts: i32,
        depth: i32,
        rng: &mut SmallRng,
    ) -> Option<(BlockPos, Material)> {
        for _ in 0..attempts {
            let x = from.x + rng.gen_range(-radius..=radius);
            let z = from.z + rng.gen_range(-radius..=radius);
            let y = self.ray.first_solid_below(x, from.y, z, depth);
            if RayCaster::missed(from.y, y, depth) {
                continue;
            }
            let hit = BlockPos::new(x, y, z);
            let m = self.cache.material(x, y, z);
            if m.is_air() || is_blacklisted(m) || is_liquid(m) || !self.claim(hit) {
                continue;
            }
            return Some((hit, m));
        }
        None
    }

    /// Layered outcome table: shallow layers vanish, deeper ones mix rubble
    /// and cavities.
    fn roof_block(
        &self,
        pos: BlockPos,
        m: Material,
        power: f64,
        count: i32,
        max_pen: i32,
        rng: &mut SmallRng,
    ) -> BlockChangeRequest {
        let adjusted = (power + (rng.gen::<f64>() * 0.2 - 0.1) * power).clamp(0.0, 1.0);
        let ratio = count as f64 / max_pen.max(1) as f64;

        let result = if ratio < 0.3 {
            Material::AIR
        } else if adjusted > 0.7 && rng.gen::<f64>() < adjusted * 0.9 {
            Material::AIR
        } else if ratio < 0.6 && adjusted > 0.5 {
            if rng.gen::<f64>() < adjusted * 0.8 {
                Material::AIR
            } else {
                self.rule.transform(m, adjusted * 0.8, rng)
            }
        } else if ratio >= 0.6 {
            if rng.gen::<f64>() < 0.7 - adjusted * 0.3 {
                self.rule.transform(m, adjusted, rng)
            } else {
                Material::AIR
            }
        } else if rng.gen::<f64>() < adjusted * 0.8 {
            Material::AIR
        } else {
            self.rule.transform(m, adjusted * 0.6, rng)
        };

        let physics = count == 0 || (!result.is_air() && rng.gen::<f64>() < 0.2);
        change(pos, result, physics)
    }
}

fn change(pos: BlockPos, material: Material, physics: bool) -> BlockChangeRequest {
    BlockChangeRequest::set(pos, material)
        .with_physics(physics)
        .copying_orientation(is_shaped(material))
}
