//! In-memory world host.
//!
//! A procedurally generated base layer plus a sparse override map, with
//! entities and write counters.  Implements every host trait, so it backs
//! the simulation binary and the integration tests.

use crate::cache::ChunkSnapshot;
use crate::error::WorldError;
use crate::host::{
    BlockSink, BlockSource, CameraShake, EntityHost, EntityId, EntityInfo, EntityKind, EventSink,
    SoundCue,
};
use crate::material::{Axis, Biome, BlockState, Facing, Half, Material, Orientation, RailShape};
use crate::types::{Aabb, BlockPos, ChunkPos, Vec3};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::ThreadId;

type Generator = dyn Fn(i32, i32, i32) -> Material + Send + Sync;

/// Default orientation properties a block kind carries when placed.
pub fn default_orientation(material: Material) -> Orientation {
    let name = material.name();
    let mut o = Orientation::default();
    if name.ends_with("_STAIRS") {
        o.facing = Some(Facing::North);
        o.half = Some(Half::Bottom);
        o.waterlogged = Some(false);
    } else if name.ends_with("_SLAB") {
        o.half = Some(Half::Bottom);
        o.waterlogged = Some(false);
    } else if name.ends_with("_WALL") {
        o.waterlogged = Some(false);
    } else if name.ends_with("_TRAPDOOR") || name.ends_with("_DOOR") {
        o.facing = Some(Facing::North);
        o.half = Some(Half::Bottom);
        o.open = Some(false);
        o.powered = Some(false);
    } else if name.ends_with("_LOG") || name.ends_with("_WOOD") || name.ends_with("BASALT") {
        o.axis = Some(Axis::Y);
    } else if name.ends_with("RAIL") {
        o.rail_shape = Some(RailShape::NorthSouth);
    } else if matches!(name, "GRASS_BLOCK" | "PODZOL" | "MYCELIUM") {
        o.snowy = Some(false);
    } else if matches!(name, "WHEAT" | "CARROTS" | "POTATOES") {
        o.age = Some(0);
        o.max_age = Some(7);
    } else if matches!(name, "BEETROOTS" | "NETHER_WART") {
        o.age = Some(0);
        o.max_age = Some(3);
    }
    o
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryEntity {
    pub info: EntityInfo,
    pub velocity: Vec3,
    pub damage_taken: f64,
    pub shakes: Vec<CameraShake>,
    pub sounds: Vec<SoundCue>,
}

pub struct MemoryWorld {
    min_y: i32,
    max_y: i32,
    generator: Box<Generator>,
    overrides: RwLock<HashMap<BlockPos, BlockState>>,
    biomes: RwLock<HashMap<BlockPos, Biome>>,
    unloaded: RwLock<HashSet<ChunkPos>>,
    entities: RwLock<HashMap<EntityId, MemoryEntity>>,
    next_entity: AtomicU64,
    material_writes: AtomicUsize,
    orientation_writes: AtomicUsize,
    physics_updates: AtomicUsize,
    snapshot_fetches: AtomicUsize,
    write_log: Mutex<Vec<(BlockPos, Material)>>,
    writer_threads: Mutex<HashSet<ThreadId>>,
    events: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryWorld {
    pub fn new<F>(min_y: i32, max_y: i32, generator: F) -> Self
    where
        F: Fn(i32, i32, i32) -> Material + Send + Sync + 'static,
    {
        Self {
            min_y,
            max_y: max_y.max(min_y),
            generator: Box::new(generator),
            overrides: RwLock::new(HashMap::new()),
            biomes: RwLock::new(HashMap::new()),
            unloaded: RwLock::new(HashSet::new()),
            entities: RwLock::new(HashMap::new()),
            next_entity: AtomicU64::new(1),
            material_writes: AtomicUsize::new(0),
            orientation_writes: AtomicUsize::new(0),
            physics_updates: AtomicUsize::new(0),
            snapshot_fetches: AtomicUsize::new(0),
            write_log: Mutex::new(Vec::new()),
            writer_threads: Mutex::new(HashSet::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// `material` from `min_y` up to and including `ground_y`, air above.
    pub fn flat(min_y: i32, max_y: i32, ground_y: i32, material: Material) -> Self {
        Self::new(min_y, max_y, move |_, y, _| {
            if y <= ground_y {
                material
            } else {
                Material::AIR
            }
        })
    }

    /// Bedrock floor, stone, three layers of dirt and a grass surface at
    /// `ground_y`.
    pub fn layered(min_y: i32, max_y: i32, ground_y: i32) -> Self {
        Self::new(min_y, max_y, move |_, y, _| {
            if y == min_y {
                Material::BEDROCK
            } else if y > ground_y {
                Material::AIR
            } else if y == ground_y {
                Material::GRASS_BLOCK
            } else if y > ground_y - 4 {
                Material::DIRT
            } else {
                Material::STONE
            }
        })
    }

    // -----------------------------------------------------------------------
    // Direct access (tests, harness setup)
    // -----------------------------------------------------------------------

    pub fn place(&self, pos: BlockPos, material: Material) {
        self.place_state(
            pos,
            BlockState::with_orientation(material, default_orientation(material)),
        );
    }

    pub fn place_state(&self, pos: BlockPos, state: BlockState) {
        self.overrides.write().insert(pos, state);
    }

    pub fn state_at(&self, pos: BlockPos) -> BlockState {
        if let Some(state) = self.overrides.read().get(&pos) {
            return state.clone();
        }
        let material = self.generated(pos.x, pos.y, pos.z);
        BlockState::with_orientation(material, default_orientation(material))
    }

    pub fn material_at(&self, pos: BlockPos) -> Material {
        self.state_at(pos).material
    }

    pub fn biome_at(&self, pos: BlockPos) -> Option<Biome> {
        self.biomes.read().get(&pos).cloned()
    }

    fn generated(&self, x: i32, y: i32, z: i32) -> Material {
        if y < self.min_y || y >= self.max_y {
            Material::AIR
        } else {
            (self.generator)(x, y, z)
        }
    }

    pub fn unload_chunk(&self, chunk: ChunkPos) {
        self.unloaded.write().insert(chunk);
    }

    pub fn load_chunk(&self, chunk: ChunkPos) {
        self.unloaded.write().remove(&chunk);
    }

    fn check_loaded(&self, chunk: ChunkPos) -> Result<(), WorldError> {
        if self.unloaded.read().contains(&chunk) {
            Err(WorldError::ChunkUnloaded(chunk))
        } else {
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    pub fn spawn_entity(&self, kind: EntityKind, position: Vec3) -> EntityId {
        let id = self.next_entity.fetch_add(1, Ordering::Relaxed);
        self.entities.write().insert(
            id,
            MemoryEntity {
                info: EntityInfo { id, kind, position },
                velocity: Vec3::zero(),
                damage_taken: 0.0,
                shakes: Vec::new(),
                sounds: Vec::new(),
            },
        );
        id
    }

    pub fn despawn(&self, id: EntityId) {
        self.entities.write().remove(&id);
    }

    pub fn entity(&self, id: EntityId) -> Option<MemoryEntity> {
        self.entities.read().get(&id).cloned()
    }

    fn with_entity<R>(
        &self,
        id: EntityId,
        f: impl FnOnce(&mut MemoryEntity) -> R,
    ) -> Result<R, WorldError> {
        self.entities
            .write()
            .get_mut(&id)
            .map(f)
            .ok_or(WorldError::EntityInvalid(id))
    }

    // -----------------------------------------------------------------------
    // Counters
    // -----------------------------------------------------------------------

    pub fn material_writes(&self) -> usize {
        self.material_writes.load(Ordering::Relaxed)
    }

    pub fn orientation_writes(&self) -> usize {
        self.orientation_writes.load(Ordering::Relaxed)
    }

    pub fn physics_updates(&self) -> usize {
        self.physics_updates.load(Ordering::Relaxed)
    }

    pub fn snapshot_fetches(&self) -> usize {
        self.snapshot_fetches.load(Ordering::Relaxed)
    }

    pub fn write_log(&self) -> Vec<(BlockPos, Material)> {
        self.write_log.lock().clone()
    }

    /// Material writes recorded in column `(x, z)`.
    pub fn writes_in_column(&self, x: i32, z: i32) -> usize {
        self.write_log
            .lock()
            .iter()
            .filter(|(p, _)| p.x == x && p.z == z)
            .count()
    }

    /// Distinct threads that have written blocks or touched entities.
    pub fn writer_thread_count(&self) -> usize {
        self.writer_threads.lock().len()
    }

    pub fn published_events(&self) -> Vec<(String, Vec<u8>)> {
        self.events.lock().clone()
    }

    fn note_writer(&self) {
        self.writer_threads.lock().insert(std::thread::current().id());
    }
}

// ---------------------------------------------------------------------------
// Host traits
// ---------------------------------------------------------------------------

impl BlockSource for MemoryWorld {
    fn height_range(&self) -> (i32, i32) {
        (self.min_y, self.max_y)
    }

    fn chunk_snapshot(&self, chunk: ChunkPos) -> Result<ChunkSnapshot, WorldError> {
        self.check_loaded(chunk)?;
        self.snapshot_fetches.fetch_add(1, Ordering::Relaxed);
        let overrides = self.overrides.read();
        Ok(ChunkSnapshot::from_fn(chunk, self.min_y, self.max_y, |x, y, z| {
            match overrides.get(&BlockPos::new(x, y, z)) {
                Some(state) => state.material,
                None => self.generated(x, y, z),
            }
        }))
    }
}

impl BlockSink for MemoryWorld {
    fn block_state(&self, pos: BlockPos) -> Result<BlockState, WorldError> {
        self.check_loaded(pos.chunk())?;
        Ok(self.state_at(pos))
    }

    fn set_material(
        &self,
        pos: BlockPos,
        material: Material,
        physics: bool,
    ) -> Result<(), WorldError> {
        self.check_loaded(pos.chunk())?;
        if pos.y < self.min_y || pos.y >= self.max_y {
            return Err(WorldError::OutOfBounds(pos));
        }
        self.note_writer();
        self.place(pos, material);
        self.material_writes.fetch_add(1, Ordering::Relaxed);
        if physics {
            self.physics_updates.fetch_add(1, Ordering::Relaxed);
        }
        self.write_log.lock().push((pos, material));
        Ok(())
    }

    fn set_orientation(&self, pos: BlockPos, orientation: &Orientation) -> Result<(), WorldError> {
        self.check_loaded(pos.chunk())?;
        self.note_writer();
        let mut overrides = self.overrides.write();
        let material = match overrides.get(&pos) {
            Some(state) => state.material,
            None => self.generated(pos.x, pos.y, pos.z),
        };
        overrides.insert(pos, BlockState::with_orientation(material, orientation.clone()));
        self.orientation_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn set_biome(&self, pos: BlockPos, biome: &Biome) -> Result<(), WorldError> {
        self.check_loaded(pos.chunk())?;
        self.note_writer();
        self.biomes.write().insert(pos, biome.clone());
        Ok(())
    }
}

impl EntityHost for MemoryWorld {
    fn nearby_entities(&self, bounds: &Aabb) -> Vec<EntityInfo> {
        self.note_writer();
        self.entities
            .read()
            .values()
            .filter(|e| bounds.contains(e.info.position))
            .map(|e| e.info)
            .collect()
    }

    fn apply_velocity(&self, id: EntityId, velocity: Vec3) -> Result<(), WorldError> {
        self.note_writer();
        self.with_entity(id, |e| e.velocity = e.velocity.add(velocity))
    }

    fn apply_damage(&self, id: EntityId, amount: f64) -> Result<(), WorldError> {
        self.with_entity(id, |e| e.damage_taken += amount)
    }

    fn camera_shake(&self, id: EntityId, shake: CameraShake) {
        let _ = self.with_entity(id, |e| e.shakes.push(shake));
    }

    fn play_sound(&self, id: EntityId, cue: SoundCue) {
        let _ = self.with_entity(id, |e| e.sounds.push(cue));
    }
}

impl EventSink for MemoryWorld {
    fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), WorldError> {
        self.events.lock().push((subject.to_string(), payload));
        Ok(())
    }
}
