//! Downward column scan.

use crate::cache::SpatialBlockCache;
use std::sync::Arc;

#[derive(Clone)]
pub struct RayCaster {
    cache: Arc<SpatialBlockCache>,
}

impl RayCaster {
    pub fn new(cache: Arc<SpatialBlockCache>) -> Self {
        Self { cache }
    }

    /// Walk down from `start_y` until a non-air block is found or `max_depth`
    /// blocks have been examined.  Returns the Y of the hit, or
    /// `start_y - max_depth` when nothing was found (see
    /// [`RayCaster::missed`]).
    pub fn first_solid_below(&self, x: i32, start_y: i32, z: i32, max_depth: i32) -> i32 {
        let mut current = start_y;
        for _ in 0..max_depth.max(0) {
            if !self.cache.material(x, current, z).is_air() {
                return current;
            }
            current -= 1;
        }
        current
    }

    /// Whether a result of [`RayCaster::first_solid_below`] means "no hit".
    pub fn missed(start_y: i32, result: i32, max_depth: i32) -> bool {
        result <= start_y - max_depth
    }
}
