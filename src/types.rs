//! Core types shared across all modules: block coordinates and their packed
//! keys, chunk coordinates, vectors, bounding volumes and engine stats.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Coordinate packing
// ---------------------------------------------------------------------------

/// Bits per axis in a packed block key.
pub const PACK_BITS: u32 = 21;
const PACK_MASK: u64 = (1 << PACK_BITS) - 1;

/// Smallest coordinate representable in a packed key (inclusive).
pub const PACK_MIN: i32 = -(1 << (PACK_BITS - 1));
/// Largest coordinate representable in a packed key (inclusive).
pub const PACK_MAX: i32 = (1 << (PACK_BITS - 1)) - 1;

/// Pack a block coordinate into a single 64-bit key.
///
/// Each axis keeps its low 21 bits, so the mapping is bijective over
/// `[PACK_MIN, PACK_MAX]` on every axis.
#[inline]
pub fn pack_coordinates(x: i32, y: i32, z: i32) -> u64 {
    (x as u64 & PACK_MASK)
        | ((y as u64 & PACK_MASK) << PACK_BITS)
        | ((z as u64 & PACK_MASK) << (2 * PACK_BITS))
}

/// Inverse of [`pack_coordinates`].
#[inline]
pub fn unpack_coordinates(key: u64) -> (i32, i32, i32) {
    (
        sign_extend(key & PACK_MASK),
        sign_extend((key >> PACK_BITS) & PACK_MASK),
        sign_extend((key >> (2 * PACK_BITS)) & PACK_MASK),
    )
}

#[inline]
fn sign_extend(field: u64) -> i32 {
    let shift = 64 - PACK_BITS;
    (((field << shift) as i64) >> shift) as i32
}

/// Pack an `(x, z)` column into a 64-bit key (full 32 bits per axis).
#[inline]
pub fn pack_column(x: i32, z: i32) -> u64 {
    ((x as u32 as u64) << 32) | (z as u32 as u64)
}

/// Inverse of [`pack_column`].
#[inline]
pub fn unpack_column(key: u64) -> (i32, i32) {
    ((key >> 32) as u32 as i32, key as u32 as i32)
}

// ---------------------------------------------------------------------------
// Block and chunk coordinates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn with_y(self, y: i32) -> Self {
        Self::new(self.x, y, self.z)
    }

    pub fn below(self) -> Self {
        self.offset(0, -1, 0)
    }

    pub fn pack(self) -> u64 {
        pack_coordinates(self.x, self.y, self.z)
    }

    pub fn unpack(key: u64) -> Self {
        let (x, y, z) = unpack_coordinates(key);
        Self::new(x, y, z)
    }

    pub fn column_key(self) -> u64 {
        pack_column(self.x, self.z)
    }

    pub fn chunk(self) -> ChunkPos {
        ChunkPos::containing(self.x, self.z)
    }

    /// Block centre as a floating point position.
    pub fn center(self) -> Vec3 {
        Vec3::new(self.x as f64 + 0.5, self.y as f64, self.z as f64 + 0.5)
    }

    pub fn horizontal_distance(self, other: BlockPos) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dz = (self.z - other.z) as f64;
        (dx * dx + dz * dz).sqrt()
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{},{}]", self.x, self.y, self.z)
    }
}

/// A 16×16 column of blocks, addressed by `(x >> 4, z >> 4)`.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const SIZE: i32 = 16;

    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn containing(block_x: i32, block_z: i32) -> Self {
        Self::new(block_x >> 4, block_z >> 4)
    }

    pub fn min_block_x(self) -> i32 {
        self.x << 4
    }

    pub fn min_block_z(self) -> i32 {
        self.z << 4
    }

    /// Every chunk overlapping the block rectangle `[min, max]` (inclusive).
    pub fn covering(min_x: i32, min_z: i32, max_x: i32, max_z: i32) -> Vec<ChunkPos> {
        let (lo, hi) = (Self::containing(min_x, min_z), Self::containing(max_x, max_z));
        let mut chunks = Vec::with_capacity(((hi.x - lo.x + 1) * (hi.z - lo.z + 1)).max(0) as usize);
        for cx in lo.x..=hi.x {
            for cz in lo.z..=hi.z {
                chunks.push(Self::new(cx, cz));
            }
        }
        chunks
    }
}

impl std::fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

// ---------------------------------------------------------------------------
// Basic math
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn horizontal_length(self) -> f64 {
        (self.x * self.x + self.z * self.z).sqrt()
    }

    /// Unit vector, or zero when the length is degenerate.
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len < f64::EPSILON {
            Self::zero()
        } else {
            self.scale(1.0 / len)
        }
    }

    /// Unit vector in the XZ plane, or zero when degenerate.
    pub fn horizontal_normalized(self) -> Self {
        let len = self.horizontal_length();
        if len < f64::EPSILON {
            Self::zero()
        } else {
            Self::new(self.x / len, 0.0, self.z / len)
        }
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    pub fn add(self, o: Vec3) -> Self {
        Self::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }

    pub fn sub(self, o: Vec3) -> Self {
        Self::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// Axis-aligned bounding box used for entity queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }
}

/// Linear interpolation between `a` and `b`.
#[inline]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Remap `value` from `[from_min, from_max]` onto `[to_min, to_max]`.
#[inline]
pub fn remap(value: f64, from_min: f64, from_max: f64, to_min: f64, to_max: f64) -> f64 {
    let span = from_max - from_min;
    if span.abs() < f64::EPSILON {
        return to_min;
    }
    to_min + (value - from_min) / span * (to_max - to_min)
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    pub registered_worlds: usize,
    pub active_explosions: usize,
    pub completed_explosions: u64,
    pub cached_snapshots: usize,
    pub pending_mutations: usize,
    pub applied_mutations: u64,
    pub skipped_mutations: u64,
    pub failed_mutations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_round_trips_across_range() {
        let samples = [PACK_MIN, PACK_MIN + 1, -4097, -1, 0, 1, 255, 4096, PACK_MAX - 1, PACK_MAX];
        for &x in &samples {
            for &y in &samples {
                for &z in &samples {
                    assert_eq!(unpack_coordinates(pack_coordinates(x, y, z)), (x, y, z));
                }
            }
        }
    }

    #[test]
    fn packed_keys_are_distinct_for_neighbours() {
        let origin = BlockPos::new(-1, 64, -1);
        let keys: std::collections::HashSet<u64> = [
            origin,
            origin.offset(1, 0, 0),
            origin.offset(0, 1, 0),
            origin.offset(0, 0, 1),
            origin.offset(-1, -1, -1),
        ]
        .iter()
        .map(|p| p.pack())
        .collect();
        assert_eq!(keys.len(), 5);
    }

    #[test]
    fn column_packing_round_trips_negative_values() {
        for &(x, z) in &[(0, 0), (-1, 1), (i32::MIN, i32::MAX), (123_456, -987_654)] {
            assert_eq!(unpack_column(pack_column(x, z)), (x, z));
        }
    }

    #[test]
    fn chunk_of_negative_block_rounds_down() {
        assert_eq!(BlockPos::new(-1, 0, -17).chunk(), ChunkPos::new(-1, -2));
        assert_eq!(BlockPos::new(15, 0, 16).chunk(), ChunkPos::new(0, 1));
    }

    #[test]
    fn remap_handles_degenerate_span() {
        assert_eq!(remap(3.0, 2.0, 2.0, 0.0, 1.0), 0.0);
        assert!((remap(3.5, 2.0, 5.0, 0.0, 1.0) - 0.5).abs() < 1e-9);
    }
}
