//! Error types.
//!
//! [`WorldError`] is what host collaborators return for transient failures
//! (unloaded chunk, despawned entity).  The engine catches these where they
//! happen, logs them and skips the affected block or entity.
//!
//! [`EngineError`] is only returned from construction, configuration and API
//! boundaries; once an explosion is running nothing is propagated upwards.

use crate::types::{BlockPos, ChunkPos};
use thiserror::Error;

/// Transient failures reported by the host world.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorldError {
    #[error("chunk {0} is not loaded")]
    ChunkUnloaded(ChunkPos),

    #[error("entity {0} is no longer valid")]
    EntityInvalid(u64),

    #[error("position {0} is outside the world")]
    OutOfBounds(BlockPos),

    #[error("host error: {0}")]
    Host(String),
}

/// Errors surfaced by engine construction and API calls.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("configuration source error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("mutation queue is closed")]
    QueueClosed,

    #[error("compute worker panicked while running {0}")]
    WorkerPanicked(&'static str),

    #[error("mutation context unavailable: {0}")]
    ContextUnavailable(String),

    #[error("world '{0}' is not registered")]
    UnknownWorld(String),

    #[error("explosion {0} is not active")]
    UnknownExplosion(u64),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    World(#[from] WorldError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
