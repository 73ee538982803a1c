//! `shockwave.explosion.*` event protocol.
//!
//! Every message the engine publishes through an [`EventSink`] is defined
//! here and serialized as JSON.
//!
//! ## Subjects
//!
//! | Subject                          | Payload                               |
//! |----------------------------------|---------------------------------------|
//! | `shockwave.explosion.started`    | `ExplosionEvent<ExplosionStarted>`    |
//! | `shockwave.explosion.crater`     | `ExplosionEvent<CraterCompleted>`     |
//! | `shockwave.explosion.finished`   | `ExplosionEvent<ExplosionFinished>`   |
//!
//! ## Design rules
//!
//! 1. Every struct is `Serialize + Deserialize` with snake_case JSON.
//! 2. Every event carries the world name and the explosion id.
//! 3. Block-level changes are never published; only summaries.
//!
//! [`EventSink`]: crate::host::EventSink

use crate::shockwave::ExplosionReport;
use crate::types::BlockPos;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Common envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplosionEvent<T> {
    pub world: String,
    pub explosion_id: u64,
    pub payload: T,
}

impl<T> ExplosionEvent<T> {
    pub fn new(world: impl Into<String>, explosion_id: u64, payload: T) -> Self {
        Self {
            world: world.into(),
            explosion_id,
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A detonation was accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplosionStarted {
    pub center: BlockPos,
    /// Zero when no crater is carved.
    pub crater_radius: i32,
    pub crater_depth: i32,
    pub shockwave_radius: i32,
    pub shockwave_height: i32,
}

/// The crater has been planned and queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CraterCompleted {
    pub effective_radius: f64,
}

/// The explosion ended, normally or by cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplosionFinished {
    pub report: ExplosionReport,
}

// ---------------------------------------------------------------------------
// Subject helpers
// ---------------------------------------------------------------------------

pub mod subjects {
    pub const EXPLOSION_STARTED: &str = "shockwave.explosion.started";
    pub const CRATER_COMPLETED: &str = "shockwave.explosion.crater";
    pub const EXPLOSION_FINISHED: &str = "shockwave.explosion.finished";
}
