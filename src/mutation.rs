//! World mutation queue: the only path by which block and biome writes reach
//! the live world.
//!
//! ```text
//! processors (any thread)                         mutation context (one thread)
//!   submit / try_submit / submit_batch ──► flume::bounded ──► worker 0..n
//!                                                               │ up to N changes
//!                                                               │ per tick, then sleep
//!                                                               ▼
//!                                                           BlockSink
//! ```
//!
//! The channel is bounded; `submit` suspends producers when it is full and
//! `try_submit` reports failure instead.  Per-write failures become
//! [`ChangeOutcome::Failed`] and never stop a worker.

use crate::context::MutationContext;
use crate::error::{EngineError, Result, WorldError};
use crate::host::BlockSink;
use crate::material::{Biome, Material};
use crate::settings::MutationConfig;
use crate::types::BlockPos;
use log::{debug, info, trace};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

/// One block and/or biome change.  Built once, then moved into the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockChangeRequest {
    pos: BlockPos,
    material: Option<Material>,
    copy_orientation: bool,
    apply_physics: bool,
    biome: Option<Biome>,
}

impl BlockChangeRequest {
    pub fn set(pos: BlockPos, material: Material) -> Self {
        Self {
            pos,
            material: Some(material),
            copy_orientation: false,
            apply_physics: false,
            biome: None,
        }
    }

    pub fn air(pos: BlockPos) -> Self {
        Self::set(pos, Material::AIR)
    }

    /// Change only the biome at `pos`.
    pub fn biome_only(pos: BlockPos, biome: Biome) -> Self {
        Self {
            pos,
            material: None,
            copy_orientation: false,
            apply_physics: false,
            biome: Some(biome),
        }
    }

    pub fn with_physics(mut self, apply: bool) -> Self {
        self.apply_physics = apply;
        self
    }

    pub fn copying_orientation(mut self, copy: bool) -> Self {
        self.copy_orientation = copy;
        self
    }

    pub fn pos(&self) -> BlockPos {
        self.pos
    }

    pub fn material(&self) -> Option<Material> {
        self.material
    }

    pub fn copies_orientation(&self) -> bool {
        self.copy_orientation
    }

    pub fn applies_physics(&self) -> bool {
        self.apply_physics
    }

    pub fn biome(&self) -> Option<&Biome> {
        self.biome.as_ref()
    }

    fn section_key(&self) -> (i32, i32, i32) {
        (self.pos.x >> 4, self.pos.z >> 4, self.pos.y >> 4)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeOutcome {
    Applied,
    /// The block already had the target material and no biome was set.
    Skipped,
    Failed(WorldError),
}

/// Apply a single change through `sink`.  Must run on the mutation context.
pub fn apply_change(sink: &dyn BlockSink, change: &BlockChangeRequest) -> ChangeOutcome {
    match try_apply(sink, change) {
        Ok(true) => ChangeOutcome::Applied,
        Ok(false) => ChangeOutcome::Skipped,
        Err(e) => ChangeOutcome::Failed(e),
    }
}

fn try_apply(sink: &dyn BlockSink, change: &BlockChangeRequest) -> std::result::Result<bool, WorldError> {
    let mut wrote = false;

    if let Some(target) = change.material {
        let previous = sink.block_state(change.pos)?;
        if previous.material != target {
            sink.set_material(change.pos, target, change.apply_physics)?;
            wrote = true;

            if change.copy_orientation && !previous.orientation.is_empty() {
                let fresh = sink.block_state(change.pos)?;
                let mut merged = fresh.orientation.clone();
                if merged.merge_from(&previous.orientation) > 0 && merged != fresh.orientation {
                    sink.set_orientation(change.pos, &merged)?;
                }
            }
        }
    }

    if let Some(biome) = &change.biome {
        sink.set_biome(change.pos, biome)?;
        wrote = true;
    }

    Ok(wrote)
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MutationStats {
    submitted: AtomicU64,
    applied: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationStatsSnapshot {
    pub submitted: u64,
    pub applied: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl MutationStats {
    pub fn snapshot(&self) -> MutationStatsSnapshot {
        MutationStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn absorb(&self, tally: &BatchTally) {
        self.applied.fetch_add(tally.applied, Ordering::Relaxed);
        self.skipped.fetch_add(tally.skipped, Ordering::Relaxed);
        self.failed.fetch_add(tally.failed, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct BatchTally {
    applied: u64,
    skipped: u64,
    failed: u64,
}

impl BatchTally {
    fn record(&mut self, outcome: &ChangeOutcome) {
        match outcome {
            ChangeOutcome::Applied => self.applied += 1,
            ChangeOutcome::Skipped => self.skipped += 1,
            ChangeOutcome::Failed(_) => self.failed += 1,
        }
    }

    fn total(&self) -> usize {
        (self.applied + self.skipped + self.failed) as usize
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

struct WorkerShared {
    rx: flume::Receiver<BlockChangeRequest>,
    sink: Arc<dyn BlockSink>,
    settings: RwLock<MutationConfig>,
    pending: AtomicUsize,
    idle: Notify,
    stats: MutationStats,
}

impl WorkerShared {
    fn handle(&self, change: BlockChangeRequest, tally: &mut BatchTally) {
        let outcome = apply_change(self.sink.as_ref(), &change);
        if let ChangeOutcome::Failed(e) = &outcome {
            debug!("Block change at {} failed: {}", change.pos, e);
        }
        tally.record(&outcome);
        self.finish_one();
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Counts a change as pending from before it enters the channel.  Dropped
/// uncommitted (send failed, or the submitting future was cancelled) it
/// releases the count again.
struct Reservation<'a> {
    shared: &'a WorkerShared,
    committed: bool,
}

impl<'a> Reservation<'a> {
    fn new(shared: &'a WorkerShared) -> Self {
        shared.pending.fetch_add(1, Ordering::AcqRel);
        Self {
            shared,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
        self.shared.stats.submitted.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.shared.finish_one();
        }
    }
}

struct WorkerGroup {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

async fn run_worker(index: usize, shared: Arc<WorkerShared>, mut shutdown: watch::Receiver<bool>) {
    trace!("Mutation worker {} started", index);
    loop {
        let first = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = shared.rx.recv_async() => match next {
                Ok(change) => change,
                Err(_) => break,
            },
        };

        // Re-read every tick so batch size and interval changes apply
        // without a restart.
        let (limit, interval) = {
            let s = shared.settings.read();
            (s.blocks_per_batch.max(1), s.batch_interval())
        };

        let mut tally = BatchTally::default();
        shared.handle(first, &mut tally);
        while tally.total() < limit {
            match shared.rx.try_recv() {
                Ok(change) => shared.handle(change, &mut tally),
                Err(_) => break,
            }
        }
        shared.stats.absorb(&tally);
        trace!(
            "Mutation worker {} tick: {} applied, {} skipped, {} failed",
            index,
            tally.applied,
            tally.skipped,
            tally.failed
        );

        if interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(interval).await;
        }
    }
    trace!("Mutation worker {} stopped", index);
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

pub struct WorldMutationQueue {
    tx: flume::Sender<BlockChangeRequest>,
    shared: Arc<WorkerShared>,
    context: MutationContext,
    capacity: usize,
    workers: Mutex<Option<WorkerGroup>>,
}

impl WorldMutationQueue {
    /// Create a queue.  Workers are not running until [`start`](Self::start).
    pub fn new(sink: Arc<dyn BlockSink>, context: MutationContext, config: MutationConfig) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = flume::bounded(capacity);
        Self {
            tx,
            shared: Arc::new(WorkerShared {
                rx,
                sink,
                settings: RwLock::new(config),
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
                stats: MutationStats::default(),
            }),
            context,
            capacity,
            workers: Mutex::new(None),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Requests waiting in the channel.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    /// Requests submitted but not yet applied or skipped.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> MutationStatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn config(&self) -> MutationConfig {
        self.shared.settings.read().clone()
    }

    pub fn is_running(&self) -> bool {
        self.workers.lock().is_some()
    }

    pub fn worker_count(&self) -> usize {
        self.workers
            .lock()
            .as_ref()
            .map_or(0, |group| group.handles.len())
    }

    // -----------------------------------------------------------------------
    // Worker lifecycle
    // -----------------------------------------------------------------------

    /// Spawn the configured number of workers on the mutation context.  No-op
    /// when already running.
    pub fn start(&self) {
        let mut workers = self.workers.lock();
        if workers.is_some() {
            return;
        }
        let count = self.shared.settings.read().worker_count.max(1);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handles = (0..count)
            .map(|i| {
                self.context
                    .spawn(run_worker(i, self.shared.clone(), shutdown_rx.clone()))
            })
            .collect();
        *workers = Some(WorkerGroup { shutdown, handles });
        debug!("Started {} mutation workers", count);
    }

    /// Stop the workers.  Requests still queued stay queued and are applied
    /// when workers start again.
    pub async fn shutdown(&self) {
        let group = self.workers.lock().take();
        if let Some(group) = group {
            let _ = group.shutdown.send(true);
            for handle in group.handles {
                let _ = handle.await;
            }
            debug!("Mutation workers stopped ({} still queued)", self.len());
        }
    }

    /// Swap configuration.  Batch size and interval take effect on the next
    /// worker tick; a worker-count change restarts the workers.
    pub async fn reconfigure(&self, config: MutationConfig) {
        let restart = {
            let mut settings = self.shared.settings.write();
            let restart = settings.worker_count != config.worker_count;
            if config.queue_capacity != self.capacity {
                debug!(
                    "Queue capacity change ({} -> {}) needs a new queue; keeping {}",
                    self.capacity, config.queue_capacity, self.capacity
                );
            }
            *settings = config;
            restart
        };
        if restart && self.is_running() {
            self.shutdown().await;
            self.start();
            info!("Mutation workers restarted ({} workers)", self.worker_count());
        }
    }

    // -----------------------------------------------------------------------
    // Producers
    // -----------------------------------------------------------------------

    /// Queue a change, suspending while the queue is full.
    pub async fn submit(&self, change: BlockChangeRequest) -> Result<()> {
        let reservation = Reservation::new(&self.shared);
        self.tx
            .send_async(change)
            .await
            .map_err(|_| EngineError::QueueClosed)?;
        reservation.commit();
        Ok(())
    }

    /// Queue a change without waiting; `false` when the queue is full.
    pub fn try_submit(&self, change: BlockChangeRequest) -> bool {
        let reservation = Reservation::new(&self.shared);
        if self.tx.try_send(change).is_err() {
            return false;
        }
        reservation.commit();
        true
    }

    /// Queue many changes, yielding between chunks so one large producer
    /// cannot starve others.  Large batches are grouped by chunk section
    /// first; the relative order of changes in one column is preserved.
    pub async fn submit_batch(&self, mut changes: Vec<BlockChangeRequest>) -> Result<usize> {
        let (chunk_size, group_threshold) = {
            let s = self.shared.settings.read();
            (s.submit_chunk_size.max(1), s.chunk_group_threshold)
        };
        if changes.len() >= group_threshold {
            changes.sort_by_key(BlockChangeRequest::section_key);
        }

        let total = changes.len();
        let mut sent = 0;
        for change in changes {
            self.submit(change).await?;
            sent += 1;
            if sent % chunk_size == 0 && sent < total {
                tokio::task::yield_now().await;
            }
        }
        Ok(sent)
    }

    /// Wait until every submitted change has been applied or skipped.
    /// Returns immediately when no workers are running.
    pub async fn flush(&self) {
        loop {
            let idle = self.shared.idle.notified();
            if self.pending() == 0 || !self.is_running() {
                return;
            }
            idle.await;
        }
    }
}

impl Drop for WorldMutationQueue {
    fn drop(&mut self) {
        if let Some(group) = self.workers.get_mut().take() {
            let _ = group.shutdown.send(true);
        }
    }
}
