//! Host collaborator traits.
//!
//! The engine never owns world storage or entities.  A host (game server,
//! test harness, the in-memory world in [`crate::memory`]) implements these
//! narrow traits and hands them over in a [`WorldBinding`].
//!
//! | Trait         | Thread affinity               | Used by                         |
//! |---------------|-------------------------------|---------------------------------|
//! | `BlockSource` | any thread, any rate          | `SpatialBlockCache`             |
//! | `BlockSink`   | mutation context only         | `WorldMutationQueue` workers    |
//! | `EntityHost`  | mutation context only         | shockwave entity jobs           |
//! | `EventSink`   | any thread                    | `ExplosionService`              |

use crate::cache::ChunkSnapshot;
use crate::error::WorldError;
use crate::material::{Biome, BlockState, Material, Orientation};
use crate::types::{Aabb, BlockPos, ChunkPos, Vec3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldId(pub String);

impl WorldId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl std::fmt::Display for WorldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub type EntityId = u64;

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

/// Read side of the live world.  Must be callable from any thread.
pub trait BlockSource: Send + Sync {
    /// `(min_y, max_y)`: inclusive lower bound, exclusive upper bound.
    fn height_range(&self) -> (i32, i32);

    /// An immutable copy of one chunk's materials at the time of the call.
    fn chunk_snapshot(&self, chunk: ChunkPos) -> Result<ChunkSnapshot, WorldError>;
}

/// Write side of the live world.  Only ever called from the mutation context.
pub trait BlockSink: Send + Sync {
    fn block_state(&self, pos: BlockPos) -> Result<BlockState, WorldError>;

    /// Replace the block; the new block gets its kind's default orientation.
    fn set_material(&self, pos: BlockPos, material: Material, physics: bool)
        -> Result<(), WorldError>;

    fn set_orientation(&self, pos: BlockPos, orientation: &Orientation) -> Result<(), WorldError>;

    fn set_biome(&self, pos: BlockPos, biome: &Biome) -> Result<(), WorldError>;
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A controllable player avatar.
    Player,
    /// Anything that can take damage.
    Living,
    /// Items, projectiles, vehicles…
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub id: EntityId,
    pub kind: EntityKind,
    pub position: Vec3,
}

/// Time-boxed camera shake parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraShake {
    pub magnitude: f64,
    /// Magnitude lost per tick; the effect ends when it reaches zero.
    pub decay: f64,
    pub pitch_period: f64,
    pub yaw_period: f64,
}

impl CameraShake {
    /// Ticks until the shake has fully decayed.
    pub fn duration_ticks(&self) -> u32 {
        if self.decay <= 0.0 {
            return 0;
        }
        (self.magnitude / self.decay).ceil() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundCue {
    ShockwaveHit,
}

/// Live entity access.  Only ever called from the mutation context.
pub trait EntityHost: Send + Sync {
    fn nearby_entities(&self, bounds: &Aabb) -> Vec<EntityInfo>;

    fn apply_velocity(&self, id: EntityId, velocity: Vec3) -> Result<(), WorldError>;

    fn apply_damage(&self, id: EntityId, amount: f64) -> Result<(), WorldError>;

    fn camera_shake(&self, id: EntityId, shake: CameraShake);

    fn play_sound(&self, _id: EntityId, _cue: SoundCue) {}
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Outbound sink for serialized [`crate::protocol`] events.
pub trait EventSink: Send + Sync {
    fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), WorldError>;
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// Everything the engine needs to act on one world.
#[derive(Clone)]
pub struct WorldBinding {
    pub id: WorldId,
    pub blocks: Arc<dyn BlockSource>,
    pub sink: Arc<dyn BlockSink>,
    pub entities: Arc<dyn EntityHost>,
}

impl WorldBinding {
    /// Bind a host that implements all three world traits.
    pub fn from_host<H>(id: WorldId, host: Arc<H>) -> Self
    where
        H: BlockSource + BlockSink + EntityHost + 'static,
    {
        Self {
            id,
            blocks: host.clone(),
            sink: host.clone(),
            entities: host,
        }
    }
}

impl std::fmt::Debug for WorldBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldBinding").field("id", &self.id).finish()
    }
}
