//! Trees caught by the wave: leaves are stripped, weak blasts topple the
//! trunk away from the centre, strong blasts remove it.

use crate::cache::SpatialBlockCache;
use crate::material::Material;
use crate::mutation::BlockChangeRequest;
use crate::settings::TreeConfig;
use crate::types::{BlockPos, Vec3};
use std::sync::Arc;

fn is_leaves(m: Material) -> bool {
    m.name_ends_with("_LEAVES")
}

fn is_log(m: Material) -> bool {
    m.name_ends_with("_LOG") || m.name_ends_with("_WOOD")
}

pub fn is_tree_material(m: Material) -> bool {
    is_leaves(m) || is_log(m)
}

pub struct TreeBurner {
    cache: Arc<SpatialBlockCache>,
    center: BlockPos,
    config: TreeConfig,
}

impl TreeBurner {
    pub fn new(cache: Arc<SpatialBlockCache>, center: BlockPos, config: TreeConfig) -> Self {
        Self {
            cache,
            center,
            config,
        }
    }

    pub fn is_tree_block(&self, pos: BlockPos) -> bool {
        is_tree_material(self.cache.material(pos.x, pos.y, pos.z))
    }

    /// Lowest Y of the tree standing at `pos`: one above the first non-tree
    /// block found walking down, skipping air.
    pub fn find_tree_base(&self, pos: BlockPos) -> i32 {
        let (min_y, _) = self.cache.height_range();
        let floor = min_y.max(pos.y - self.config.max_tree_height);
        let mut y = pos.y;
        while y > floor {
            let m = self.cache.material(pos.x, y, pos.z);
            if !m.is_air() && !is_tree_material(m) {
                return y + 1;
            }
            y -= 1;
        }
        floor
    }

    /// The ground block the tree stands on.
    pub fn tree_terrain(&self, pos: BlockPos) -> BlockPos {
        pos.with_y(self.find_tree_base(pos) - 1)
    }

    /// Burn the tree at `impact`, toppling it away from the explosion centre.
    pub fn burn(&self, impact: BlockPos, power: f64, out: &mut Vec<BlockChangeRequest>) {
        let direction = impact.center().sub(self.center.center()).horizontal_normalized();
        self.burn_toward(impact, power, direction, out);
    }

    /// Burn the tree at `impact`, toppling it along `direction`.
    pub fn burn_toward(&self, impact: BlockPos, power: f64, direction: Vec3, out: &mut Vec<BlockChangeRequest>) {
        if !self.is_tree_block(impact) {
            return;
        }
        let base = self.find_tree_base(impact);
        let top = impact.y.min(base + self.config.max_tree_height);
        let span = (top - base).max(1) as f64;

        for y in (base..=top).rev() {
            let pos = impact.with_y(y);
            let m = self.cache.material(pos.x, y, pos.z);
            if is_leaves(m) {
                out.push(BlockChangeRequest::air(pos).with_physics(true));
            } else if is_log(m) {
                if power > self.config.destroy_threshold {
                    out.push(BlockChangeRequest::air(pos).with_physics(true));
                    continue;
                }
                let tilt = (y - base) as f64 / span * power * self.config.tilt_scale;
                let dx = (direction.x * tilt).round() as i32;
                let dz = (direction.z * tilt).round() as i32;
                if dx == 0 && dz == 0 {
                    out.push(BlockChangeRequest::set(pos, self.config.charred_log));
                } else {
                    out.push(BlockChangeRequest::set(pos.offset(dx, 0, dz), self.config.charred_log));
                    out.push(BlockChangeRequest::air(pos).with_physics(true));
                }
            }
        }
    }
}
