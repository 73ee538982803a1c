//! Spatial block cache: immutable chunk snapshots keyed by chunk coordinate,
//! bounded per world and process-wide, evicted by recency and age.
//!
//! ```text
//! SpatialBlockCache (one per world, shared by every explosion in it)
//!   ├── entries: ChunkPos → CacheEntry { Arc<ChunkSnapshot>, last access, hits }
//!   └── budget:  SnapshotBudget (shared by every cache in the registry)
//! ```
//!
//! Snapshots never change once stored, so a racing eviction can only cost an
//! extra fetch from the host; it can never return wrong data.

use crate::host::BlockSource;
use crate::material::Material;
use crate::settings::CacheConfig;
use crate::types::ChunkPos;
use log::{debug, trace};
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

const SECTION_HEIGHT: i32 = 16;
const SECTION_VOLUME: usize = 16 * 16 * SECTION_HEIGHT as usize;

// ---------------------------------------------------------------------------
// Chunk snapshot
// ---------------------------------------------------------------------------

enum Section {
    Uniform(Material),
    Mixed(Box<[Material]>),
}

impl Section {
    fn get(&self, index: usize) -> Material {
        match self {
            Section::Uniform(m) => *m,
            Section::Mixed(blocks) => blocks[index],
        }
    }
}

/// Immutable copy of one chunk's block materials.
///
/// Stored as 16-block-high sections; sections made of a single material (air
/// above the surface, solid stone below) keep one value instead of 4096.
pub struct ChunkSnapshot {
    pos: ChunkPos,
    min_y: i32,
    max_y: i32,
    sections: Vec<Section>,
    /// Highest non-air Y per column, `min_y - 1` for empty columns.
    heightmap: Box<[i32; 256]>,
}

impl ChunkSnapshot {
    /// Build a snapshot by sampling `sample(world_x, y, world_z)` for every
    /// block of the chunk between `min_y` (inclusive) and `max_y` (exclusive).
    pub fn from_fn<F>(pos: ChunkPos, min_y: i32, max_y: i32, mut sample: F) -> Self
    where
        F: FnMut(i32, i32, i32) -> Material,
    {
        let max_y = max_y.max(min_y);
        let section_count = ((max_y - min_y) + SECTION_HEIGHT - 1) / SECTION_HEIGHT;
        let base_x = pos.min_block_x();
        let base_z = pos.min_block_z();

        let mut heightmap = Box::new([min_y - 1; 256]);
        let mut sections = Vec::with_capacity(section_count as usize);
        let mut scratch = vec![Material::AIR; SECTION_VOLUME];

        for s in 0..section_count {
            let section_base = min_y + s * SECTION_HEIGHT;
            let mut uniform = true;
            for dy in 0..SECTION_HEIGHT {
                let y = section_base + dy;
                for lz in 0..16 {
                    for lx in 0..16 {
                        let m = if y < max_y {
                            sample(base_x + lx, y, base_z + lz)
                        } else {
                            Material::AIR
                        };
                        let idx = Self::index(lx as usize, dy, lz as usize);
                        scratch[idx] = m;
                        uniform &= m == scratch[0];
                        if !m.is_air() {
                            heightmap[(lz * 16 + lx) as usize] = y;
                        }
                    }
                }
            }
            sections.push(if uniform {
                Section::Uniform(scratch[0])
            } else {
                Section::Mixed(scratch.clone().into_boxed_slice())
            });
        }

        Self {
            pos,
            min_y,
            max_y,
            sections,
            heightmap,
        }
    }

    #[inline]
    fn index(lx: usize, dy: i32, lz: usize) -> usize {
        (dy as usize * 16 + lz) * 16 + lx
    }

    pub fn pos(&self) -> ChunkPos {
        self.pos
    }

    pub fn min_y(&self) -> i32 {
        self.min_y
    }

    pub fn max_y(&self) -> i32 {
        self.max_y
    }

    /// Material at local column `(lx, lz)` (0..16) and world `y`; air when
    /// `y` is outside the snapshot.
    pub fn material(&self, lx: usize, y: i32, lz: usize) -> Material {
        if y < self.min_y || y >= self.max_y {
            return Material::AIR;
        }
        let rel = y - self.min_y;
        let section = (rel / SECTION_HEIGHT) as usize;
        let idx = Self::index(lx & 15, rel % SECTION_HEIGHT, lz & 15);
        self.sections
            .get(section)
            .map_or(Material::AIR, |s| s.get(idx))
    }

    pub fn highest_block_y(&self, lx: usize, lz: usize) -> i32 {
        self.heightmap[(lz & 15) * 16 + (lx & 15)]
    }
}

// ---------------------------------------------------------------------------
// Process-wide budget
// ---------------------------------------------------------------------------

/// Counts live snapshots across every cache sharing this budget.
///
/// The limit is soft: a cache holding no more than its fair share is never
/// forced to evict because other caches filled the budget.
#[derive(Debug)]
pub struct SnapshotBudget {
    live: AtomicUsize,
    caches: AtomicUsize,
    max: usize,
}

impl SnapshotBudget {
    pub fn new(max: usize) -> Self {
        Self {
            live: AtomicUsize::new(0),
            caches: AtomicUsize::new(0),
            max: max.max(1),
        }
    }

    /// Number of caches currently drawing on this budget.
    pub fn caches(&self) -> usize {
        self.caches.load(Ordering::Relaxed)
    }

    /// Snapshots each attached cache may keep regardless of global pressure.
    pub fn fair_share(&self) -> usize {
        (self.max / self.caches().max(1)).max(1)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn is_exhausted(&self) -> bool {
        self.live() >= self.max
    }

    fn acquire(&self) {
        self.live.fetch_add(1, Ordering::Relaxed);
    }

    fn release(&self, n: usize) {
        if n == 0 {
            return;
        }
        // Saturating: a cache dropped mid-eviction must not wrap the counter.
        let _ = self
            .live
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(n))
            });
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

struct CacheEntry {
    snapshot: Arc<ChunkSnapshot>,
    created: Instant,
    last_access_ms: AtomicU64,
    hits: AtomicU32,
}

impl CacheEntry {
    fn new(snapshot: Arc<ChunkSnapshot>, now_ms: u64) -> Self {
        Self {
            snapshot,
            created: Instant::now(),
            last_access_ms: AtomicU64::new(now_ms),
            hits: AtomicU32::new(0),
        }
    }

    fn touch(&self, now_ms: u64) -> Arc<ChunkSnapshot> {
        self.last_access_ms.store(now_ms, Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.snapshot.clone()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub fetch_failures: u64,
}

pub struct SpatialBlockCache {
    source: Arc<dyn BlockSource>,
    config: CacheConfig,
    budget: Arc<SnapshotBudget>,
    min_y: i32,
    max_y: i32,
    epoch: Instant,
    entries: RwLock<HashMap<ChunkPos, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    fetch_failures: AtomicU64,
}

impl SpatialBlockCache {
    pub fn new(source: Arc<dyn BlockSource>, config: CacheConfig, budget: Arc<SnapshotBudget>) -> Self {
        let (min_y, max_y) = source.height_range();
        budget.caches.fetch_add(1, Ordering::Relaxed);
        Self {
            source,
            config,
            budget,
            min_y,
            max_y,
            epoch: Instant::now(),
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
        }
    }

    pub fn height_range(&self) -> (i32, i32) {
        (self.min_y, self.max_y)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, chunk: ChunkPos) -> bool {
        self.entries.read().contains_key(&chunk)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Material at a world coordinate.  Air outside the world's height range
    /// or when the chunk could not be fetched.
    pub fn material(&self, x: i32, y: i32, z: i32) -> Material {
        if y < self.min_y || y >= self.max_y {
            return Material::AIR;
        }
        match self.snapshot(ChunkPos::containing(x, z)) {
            Some(s) => s.material((x & 15) as usize, y, (z & 15) as usize),
            None => Material::AIR,
        }
    }

    /// Highest non-air Y of a column, `min_y - 1` when the column is empty
    /// or its chunk is unavailable.
    pub fn highest_surface_y(&self, x: i32, z: i32) -> i32 {
        match self.snapshot(ChunkPos::containing(x, z)) {
            Some(s) => s.highest_block_y((x & 15) as usize, (z & 15) as usize),
            None => self.min_y - 1,
        }
    }

    /// Cached snapshot for `chunk`, fetching it from the host on a miss.
    pub fn snapshot(&self, chunk: ChunkPos) -> Option<Arc<ChunkSnapshot>> {
        let now = self.now_ms();
        if let Some(entry) = self.entries.read().get(&chunk) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.touch(now));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        // Fetch outside the lock; the host may be slow.
        let fetched = self.fetch(chunk)?;
        let snapshot = self.insert(chunk, fetched, now);
        self.evict_if_needed(&[chunk]);
        Some(snapshot)
    }

    fn fetch(&self, chunk: ChunkPos) -> Option<Arc<ChunkSnapshot>> {
        match self.source.chunk_snapshot(chunk) {
            Ok(s) => Some(Arc::new(s)),
            Err(e) => {
                self.fetch_failures.fetch_add(1, Ordering::Relaxed);
                debug!("Snapshot fetch for chunk {} failed: {}", chunk, e);
                None
            }
        }
    }

    fn insert(&self, chunk: ChunkPos, fetched: Arc<ChunkSnapshot>, now: u64) -> Arc<ChunkSnapshot> {
        let mut entries = self.entries.write();
        match entries.entry(chunk) {
            // Another thread won the race; keep the first copy.
            Entry::Occupied(e) => e.get().touch(now),
            Entry::Vacant(v) => {
                self.budget.acquire();
                v.insert(CacheEntry::new(fetched.clone(), now));
                fetched
            }
        }
    }

    /// Fetch every missing chunk in `chunks` in one parallel pass.
    ///
    /// At most `max_entries - 1` chunks are loaded, in request order; the
    /// rest are fetched on demand.  Room is made before inserting so the
    /// preloaded chunks are not the ones evicted.
    pub fn preload<I>(&self, chunks: I) -> usize
    where
        I: IntoIterator<Item = ChunkPos>,
    {
        let mut missing: Vec<ChunkPos> = {
            let entries = self.entries.read();
            let mut seen = HashSet::new();
            chunks
                .into_iter()
                .filter(|c| !entries.contains_key(c) && seen.insert(*c))
                .collect()
        };
        if missing.is_empty() {
            return 0;
        }
        let limit = self.config.max_entries.saturating_sub(1).max(1);
        if missing.len() > limit {
            debug!("Preload of {} chunks capped at {}", missing.len(), limit);
            missing.truncate(limit);
        }

        let fetched: Vec<(ChunkPos, Arc<ChunkSnapshot>)> = missing
            .par_iter()
            .filter_map(|&c| self.fetch(c).map(|s| (c, s)))
            .collect();
        self.misses
            .fetch_add(missing.len() as u64, Ordering::Relaxed);

        let loaded: Vec<ChunkPos> = fetched.iter().map(|(c, _)| *c).collect();
        let room = (self.len() + loaded.len() + 1).saturating_sub(self.config.max_entries);
        if room > 0 {
            self.evict_keeping(&loaded, 0, room);
        }
        let now = self.now_ms();
        for (chunk, snapshot) in fetched {
            self.insert(chunk, snapshot, now);
        }
        trace!("Preloaded {} of {} requested chunks", loaded.len(), missing.len());
        self.evict_if_needed(&loaded);
        loaded.len()
    }

    // -----------------------------------------------------------------------
    // Eviction
    // -----------------------------------------------------------------------

    /// Evict when this cache is full, or when the shared budget is exhausted
    /// and this cache holds more than its fair share.  `fresh` entries were
    /// just inserted and are never chosen.
    fn evict_if_needed(&self, fresh: &[ChunkPos]) {
        let len = self.len();
        if len >= self.config.max_entries {
            self.evict_keeping(fresh, 0, len + 1 - self.config.max_entries);
        } else if self.budget.is_exhausted() {
            let share = self.budget.fair_share();
            if len > share {
                let over = self.budget.live().saturating_sub(self.budget.max());
                self.evict_keeping(fresh, share, over);
            }
        }
    }

    /// Drop every expired entry plus the least recently used share, and
    /// always enough to get back under the per-cache limit.
    pub fn evict(&self) -> usize {
        let needed = (self.len() + 1).saturating_sub(self.config.max_entries);
        self.evict_keeping(&[], 0, needed)
    }

    /// LRU eviction of at least `needed` entries (or the configured
    /// fraction, if larger) that skips `keep` and never shrinks the cache
    /// below `floor`.
    fn evict_keeping(&self, keep: &[ChunkPos], floor: usize, needed: usize) -> usize {
        let ttl = self.config.ttl();
        let mut entries = self.entries.write();
        let len = entries.len();
        if len == 0 {
            return 0;
        }

        let mut by_access: Vec<(u64, ChunkPos)> = entries
            .iter()
            .filter(|(pos, _)| !keep.contains(pos))
            .map(|(pos, e)| (e.last_access_ms.load(Ordering::Relaxed), *pos))
            .collect();
        by_access.sort_unstable();

        let fraction = (len as f64 * self.config.eviction_fraction).ceil() as usize;
        let oldest = fraction
            .max(needed)
            .min(len.saturating_sub(floor))
            .min(by_access.len());

        let before = entries.len();
        for (_, pos) in by_access.iter().take(oldest) {
            entries.remove(pos);
        }
        entries.retain(|pos, e| keep.contains(pos) || e.created.elapsed() < ttl);
        let removed = before - entries.len();
        drop(entries);

        self.budget.release(removed);
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        if removed > 0 {
            debug!(
                "Evicted {} chunk snapshots ({} cached, {} live process-wide)",
                removed,
                len - removed,
                self.budget.live()
            );
        }
        removed
    }

    /// Drop snapshots older than the TTL.  Entries still fresh stay, since
    /// other explosions in the same world may be reading them.
    pub fn cleanup(&self) -> usize {
        let ttl = self.config.ttl();
        let removed = {
            let mut entries = self.entries.write();
            let before = entries.len();
            entries.retain(|_, e| e.created.elapsed() < ttl);
            before - entries.len()
        };
        self.budget.release(removed);
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Drop everything.
    pub fn clear(&self) {
        let removed = {
            let mut entries = self.entries.write();
            let n = entries.len();
            entries.clear();
            n
        };
        self.budget.release(removed);
    }
}

impl Drop for SpatialBlockCache {
    fn drop(&mut self) {
        let n = self.entries.get_mut().len();
        self.budget.release(n);
        self.budget.caches.fetch_sub(1, Ordering::Relaxed);
    }
}
