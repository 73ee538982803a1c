//! Shockwave World Engine
//!
//! Concurrent crater, shockwave and block-mutation engine for voxel game
//! servers.  The host implements the traits in [`host`]; the engine reads
//! through a chunk snapshot cache, decides on a compute pool, and funnels
//! every live-world write through one mutation context.
//!
//! ## Architecture
//!
//! ```text
//! ExplosionService  (service.rs)      ← detonation orchestration, events
//!   ├── SolidRegionGenerator  (crater.rs)
//!   ├── ShockwavePropagator   (shockwave.rs)
//!   │     ├── PenetrationProcessor  (penetration.rs)
//!   │     ├── TreeBurner            (tree.rs)
//!   │     └── TransformationRule    (transform.rs)
//!   └── WorldRegistry  (registry.rs)  ← per-world resources
//!         ├── SpatialBlockCache   (cache.rs)    ← RayCaster (raycast.rs)
//!         └── WorldMutationQueue  (mutation.rs) → MutationContext (context.rs)
//! ```
//!
//! CPU-heavy planning runs on a rayon [`pool::ComputePool`]; entity and
//! block writes run on the [`context::MutationContext`].

pub mod cache;
pub mod context;
pub mod crater;
pub mod error;
pub mod hash;
pub mod host;
pub mod material;
pub mod memory;
pub mod mutation;
pub mod penetration;
pub mod pool;
pub mod protocol;
pub mod raycast;
pub mod registry;
pub mod service;
pub mod settings;
pub mod shockwave;
pub mod transform;
pub mod tree;
pub mod types;

// Convenience re-exports
pub use cache::{ChunkSnapshot, SnapshotBudget, SpatialBlockCache};
pub use context::MutationContext;
pub use crater::{CraterPlan, CraterSpec, SolidRegionGenerator};
pub use error::{EngineError, Result, WorldError};
pub use host::{BlockSink, BlockSource, EntityHost, EventSink, WorldBinding, WorldId};
pub use material::{Biome, BlockState, Material, Orientation};
pub use memory::MemoryWorld;
pub use mutation::{BlockChangeRequest, ChangeOutcome, WorldMutationQueue};
pub use penetration::PenetrationProcessor;
pub use pool::ComputePool;
pub use raycast::RayCaster;
pub use registry::{WorldRegistry, WorldResources};
pub use service::{DetonationRequest, ExplosionService};
pub use settings::EngineConfig;
pub use shockwave::{CancelToken, ExplosionHandle, ExplosionReport, ShockwavePhase, ShockwavePropagator};
pub use transform::TransformationRule;
pub use tree::TreeBurner;
pub use types::{BlockPos, ChunkPos, EngineStats, Vec3};
