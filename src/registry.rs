//! Per-world shared resources.
//!
//! Every registered world owns one [`SpatialBlockCache`] and one
//! [`WorldMutationQueue`]; every explosion in that world shares them.  All
//! worlds share the compute pool, the mutation context and the global
//! snapshot budget.

use crate::cache::{SnapshotBudget, SpatialBlockCache};
use crate::context::MutationContext;
use crate::error::{EngineError, Result};
use crate::host::{WorldBinding, WorldId};
use crate::mutation::WorldMutationQueue;
use crate::pool::ComputePool;
use crate::settings::{EngineConfig, MutationConfig};
use crate::types::EngineStats;
use log::{debug, info};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub struct WorldResources {
    pub binding: WorldBinding,
    pub cache: Arc<SpatialBlockCache>,
    pub queue: Arc<WorldMutationQueue>,
}

impl WorldResources {
    pub fn id(&self) -> &WorldId {
        &self.binding.id
    }
}

pub struct WorldRegistry {
    config: RwLock<EngineConfig>,
    context: MutationContext,
    pool: Arc<ComputePool>,
    budget: Arc<SnapshotBudget>,
    worlds: RwLock<HashMap<WorldId, Arc<WorldResources>>>,
}

impl WorldRegistry {
    /// Build a registry with its own compute pool sized by
    /// `worker_pool_size`.
    pub fn new(config: EngineConfig, context: MutationContext) -> Result<Self> {
        let pool = Arc::new(ComputePool::new(config.worker_pool_size)?);
        Ok(Self::with_pool(config, context, pool))
    }

    pub fn with_pool(config: EngineConfig, context: MutationContext, pool: Arc<ComputePool>) -> Self {
        let budget = Arc::new(SnapshotBudget::new(config.cache.global_max_snapshots));
        Self {
            config: RwLock::new(config),
            context,
            pool,
            budget,
            worlds: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> EngineConfig {
        self.config.read().clone()
    }

    pub fn context(&self) -> &MutationContext {
        &self.context
    }

    pub fn pool(&self) -> &Arc<ComputePool> {
        &self.pool
    }

    pub fn budget(&self) -> &Arc<SnapshotBudget> {
        &self.budget
    }

    // -----------------------------------------------------------------------
    // Worlds
    // -----------------------------------------------------------------------

    /// Register a world and start its mutation workers.  Registering an id
    /// twice returns the existing resources.
    pub fn register(&self, binding: WorldBinding) -> Arc<WorldResources> {
        if let Some(existing) = self.worlds.read().get(&binding.id) {
            return existing.clone();
        }

        let config = self.config();
        let mut worlds = self.worlds.write();
        worlds
            .entry(binding.id.clone())
            .or_insert_with(|| {
                let cache = Arc::new(SpatialBlockCache::new(
                    binding.blocks.clone(),
                    config.cache.clone(),
                    self.budget.clone(),
                ));
                let queue = Arc::new(WorldMutationQueue::new(
                    binding.sink.clone(),
                    self.context.clone(),
                    config.mutation.clone(),
                ));
                queue.start();
                info!("Registered world '{}'", binding.id);
                Arc::new(WorldResources {
                    binding: binding.clone(),
                    cache,
                    queue,
                })
            })
            .clone()
    }

    pub fn get(&self, id: &WorldId) -> Result<Arc<WorldResources>> {
        self.worlds
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownWorld(id.to_string()))
    }

    pub fn contains(&self, id: &WorldId) -> bool {
        self.worlds.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.worlds.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.worlds.read().is_empty()
    }

    pub fn world_ids(&self) -> Vec<WorldId> {
        let mut ids: Vec<WorldId> = self.worlds.read().keys().cloned().collect();
        ids.sort_by(|a, b| a.0.cmp(&b.0));
        ids
    }

    /// Drain and stop a world's queue, then drop its cached snapshots.
    pub async fn remove(&self, id: &WorldId) -> Result<()> {
        let removed = self
            .worlds
            .write()
            .remove(id)
            .ok_or_else(|| EngineError::UnknownWorld(id.to_string()))?;
        removed.queue.flush().await;
        removed.queue.shutdown().await;
        removed.cache.clear();
        info!("Removed world '{}'", id);
        Ok(())
    }

    pub async fn shutdown_all(&self) {
        let worlds: Vec<Arc<WorldResources>> = self.worlds.write().drain().map(|(_, w)| w).collect();
        for world in worlds {
            world.queue.shutdown().await;
            world.cache.clear();
            debug!("Stopped world '{}'", world.id());
        }
    }

    /// Apply new mutation settings to every registered queue.
    pub async fn reconfigure_mutation(&self, mutation: MutationConfig) {
        self.config.write().mutation = mutation.clone();
        let queues: Vec<Arc<WorldMutationQueue>> =
            self.worlds.read().values().map(|w| w.queue.clone()).collect();
        for queue in queues {
            queue.reconfigure(mutation.clone()).await;
        }
    }

    pub fn stats(&self) -> EngineStats {
        let worlds = self.worlds.read();
        let mut stats = EngineStats {
            registered_worlds: worlds.len(),
            ..Default::default()
        };
        for world in worlds.values() {
            let mutations = world.queue.stats();
            stats.cached_snapshots += world.cache.len();
            stats.pending_mutations += world.queue.pending();
            stats.applied_mutations += mutations.applied;
            stats.skipped_mutations += mutations.skipped;
            stats.failed_mutations += mutations.failed;
        }
        stats
    }
}
