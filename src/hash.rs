//! Deterministic per-position hashing.
//!
//! Pure functions, no shared RNG stream: every worker can derive the same
//! random decisions for the same block without coordinating with others.

use crate::types::BlockPos;
use rand::rngs::SmallRng;
use rand::SeedableRng;

/// Hash a block position into a float in `[0, 1]`.
pub fn wang_noise(x: i32, y: i32, z: i32) -> f64 {
    let mut h = (x as u32).wrapping_mul(0x1f1f_1f1f)
        ^ (y as u32).wrapping_mul(0x27d4_eb2d)
        ^ (z as u32).wrapping_mul(0x85eb_ca77);
    h ^= h >> 15;
    h = h.wrapping_mul(0xc2b2_ae3d);
    h ^= h >> 13;
    (h & 0x7fff_ffff) as f64 / 2_147_483_647.0
}

/// Seed used for per-column penetration decisions.
pub fn column_seed(x: i32, y: i32, z: i32) -> u64 {
    let x = (x as i64).wrapping_mul(73);
    let z = (z as i64).wrapping_mul(31);
    let y = (y as i64).wrapping_mul(13);
    (x ^ z ^ y) as u64
}

/// Small, fast RNG seeded from a block position.
pub fn position_rng(pos: BlockPos) -> SmallRng {
    SmallRng::seed_from_u64(column_seed(pos.x, pos.y, pos.z))
}
