//! Expanding-wavefront scheduler.
//!
//! ```text
//!   tick ──► RadiusTracker::advance(elapsed)
//!              │ effect radius r₁        │ destruction radius r₂ (slower)
//!              ▼                         ▼
//!        entity job per new ring   destruction job per new ring
//!        (query + apply on the     (penetration / tree burning on the
//!         mutation context)         compute pool, then submit_batch)
//!              └──────────── JoinSet + Semaphore ───────────┘
//! ```
//!
//! Phases are published on a `watch` channel:
//! `Idle → Propagating → Draining → Complete`.  A [`CancelToken`] stops the
//! loop and aborts every outstanding ring job.

use crate::cache::SpatialBlockCache;
use crate::context::MutationContext;
use crate::error::{EngineError, Result};
use crate::host::{CameraShake, EntityHost, EntityId, EntityInfo, EntityKind, SoundCue};
use crate::mutation::{BlockChangeRequest, WorldMutationQueue};
use crate::penetration::PenetrationProcessor;
use crate::pool::ComputePool;
use crate::settings::{EngineConfig, EntityConfig, ShockwaveConfig};
use crate::transform::TransformationRule;
use crate::tree::TreeBurner;
use crate::types::{lerp, pack_column, remap, Aabb, BlockPos, ChunkPos, Vec3};
use dashmap::DashSet;
use log::{debug, info, trace, warn};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::f64::consts::TAU;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::Instrument;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShockwaveParams {
    pub center: BlockPos,
    pub radius: i32,
    pub height: i32,
    pub radius_start: i32,
    pub destroy_start: i32,
}

impl ShockwaveParams {
    pub fn from_config(center: BlockPos, config: &ShockwaveConfig) -> Self {
        Self {
            center,
            radius: config.max_radius,
            height: config.height,
            radius_start: config.radius_start,
            destroy_start: config.destroy_start,
        }
    }

    pub fn with_radius(mut self, radius: i32, height: i32) -> Self {
        self.radius = radius;
        self.height = height;
        self
    }

    pub fn starting_at(mut self, radius_start: i32) -> Self {
        self.radius_start = radius_start;
        self
    }

    pub fn validated(mut self) -> Result<Self> {
        if self.radius <= 0 {
            return Err(EngineError::InvalidGeometry(format!(
                "shockwave radius must be positive, got {}",
                self.radius
            )));
        }
        if self.height < 0 {
            return Err(EngineError::InvalidGeometry(format!(
                "shockwave height must not be negative, got {}",
                self.height
            )));
        }
        self.radius_start = self.radius_start.clamp(0, self.radius);
        self.destroy_start = self.destroy_start.max(0);
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Radius tracking
// ---------------------------------------------------------------------------

/// Converts elapsed time into the effect and destruction radii.  Both are
/// clamped to the maximum and never decrease.
#[derive(Debug, Clone)]
pub struct RadiusTracker {
    start: i32,
    max: i32,
    speed: f64,
    effect_multiplier: f64,
    effect: i32,
    destruction: i32,
}

impl RadiusTracker {
    pub fn new(start: i32, max: i32, speed: f64, effect_multiplier: f64) -> Self {
        let start = start.clamp(0, max.max(0));
        Self {
            start,
            max: max.max(0),
            speed: speed.max(0.0),
            effect_multiplier: effect_multiplier.max(1.0),
            effect: start,
            destruction: start,
        }
    }

    pub fn advance(&mut self, elapsed: Duration) -> (i32, i32) {
        let travelled = elapsed.as_secs_f64() * self.speed;
        let destruction = (self.start as f64 + travelled).floor();
        let effect = (self.start as f64 + travelled * self.effect_multiplier).floor();
        self.destruction = self.destruction.max((destruction.min(self.max as f64)) as i32);
        self.effect = self.effect.max((effect.min(self.max as f64)) as i32);
        (self.effect, self.destruction)
    }

    pub fn effect(&self) -> i32 {
        self.effect
    }

    pub fn destruction(&self) -> i32 {
        self.destruction
    }

    pub fn is_complete(&self) -> bool {
        self.destruction >= self.max
    }
}

// ---------------------------------------------------------------------------
// Circle samples
// ---------------------------------------------------------------------------

/// Memoized `(cos θ, sin θ)` samples per radius.  Sample density per block
/// of arc length falls as the radius grows.
pub struct CircleCache {
    entries: Mutex<LruCache<i32, Arc<[(f64, f64)]>>>,
    max_density: f64,
    min_density: f64,
    falloff: f64,
}

impl CircleCache {
    pub fn new(capacity: usize, max_density: f64, min_density: f64, falloff: f64) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            max_density: max_density.max(min_density),
            min_density,
            falloff: falloff.max(f64::EPSILON),
        }
    }

    pub fn from_config(config: &ShockwaveConfig) -> Self {
        Self::new(
            config.circle_cache_capacity,
            config.max_sample_density,
            config.min_sample_density,
            config.density_falloff,
        )
    }

    /// Samples per block of arc length at `radius`.
    pub fn density(&self, radius: i32) -> f64 {
        (self.max_density / (1.0 + radius.max(0) as f64 / self.falloff)).max(self.min_density)
    }

    pub fn sample_count(&self, radius: i32) -> usize {
        if radius <= 0 {
            return 1;
        }
        ((TAU * radius as f64 * self.density(radius)).ceil() as usize).max(8)
    }

    pub fn samples(&self, radius: i32) -> Arc<[(f64, f64)]> {
        let mut entries = self.entries.lock();
        if let Some(samples) = entries.get(&radius) {
            return samples.clone();
        }
        let count = self.sample_count(radius);
        let step = TAU / count as f64;
        let samples: Arc<[(f64, f64)]> = (0..count)
            .map(|i| {
                let angle = step * i as f64;
                (angle.cos(), angle.sin())
            })
            .collect();
        entries.put(radius, samples.clone());
        samples
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

// ---------------------------------------------------------------------------
// Rings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ShockwaveRing {
    pub radius: i32,
    pub power: f64,
    /// Surface blocks under the ring, deduplicated in sample order.
    pub columns: Vec<BlockPos>,
}

impl ShockwaveRing {
    /// Volume in which entities can be reached by this ring.
    pub fn entity_bounds(&self, margin: f64, height: i32) -> Option<Aabb> {
        let first = self.columns.first()?;
        let (mut min, mut max) = (first.center(), first.center());
        for column in &self.columns[1..] {
            let c = column.center();
            min = Vec3::new(min.x.min(c.x), min.y.min(c.y), min.z.min(c.z));
            max = Vec3::new(max.x.max(c.x), max.y.max(c.y), max.z.max(c.z));
        }
        Some(Aabb::new(
            Vec3::new(min.x - margin, min.y - margin, min.z - margin),
            Vec3::new(max.x + margin, max.y + height as f64 + margin, max.z + margin),
        ))
    }
}

/// Columns bucketed by grid cell for entity hit tests.
struct EntityGrid {
    cell_size: f64,
    cells: HashMap<(i64, i64), Vec<BlockPos>>,
}

impl EntityGrid {
    fn new(columns: &[BlockPos], cell_size: f64) -> Self {
        let mut grid = Self {
            cell_size,
            cells: HashMap::new(),
        };
        for &column in columns {
            let c = column.center();
            grid.cells.entry(grid.cell_of(c.x, c.z)).or_default().push(column);
        }
        grid
    }

    fn cell_of(&self, x: f64, z: f64) -> (i64, i64) {
        ((x / self.cell_size).floor() as i64, (z / self.cell_size).floor() as i64)
    }

    /// Columns in the cell containing `p` and its eight neighbours.
    fn near(&self, p: Vec3) -> impl Iterator<Item = &BlockPos> {
        let (cx, cz) = self.cell_of(p.x, p.z);
        (-1..=1)
            .flat_map(move |dx| (-1..=1).map(move |dz| (cx + dx, cz + dz)))
            .filter_map(|cell| self.cells.get(&cell))
            .flatten()
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Everything the wave does to one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityImpact {
    pub id: EntityId,
    pub velocity: Vec3,
    pub damage: f64,
    pub shake: Option<CameraShake>,
    pub sound: Option<SoundCue>,
}

pub fn compute_impact(entity: &EntityInfo, center: BlockPos, power: f64, config: &EntityConfig) -> EntityImpact {
    let away = entity.position.sub(center.center()).horizontal_normalized();
    let velocity = away
        .scale(power * config.knockback_strength)
        .add(Vec3::new(0.0, config.knockback_lift, 0.0));
    let damage = match entity.kind {
        EntityKind::Other => 0.0,
        EntityKind::Player | EntityKind::Living => config.base_damage * power,
    };
    let (shake, sound) = match entity.kind {
        EntityKind::Player => {
            let slowdown = 1.0 / power.max(0.1);
            let shake = CameraShake {
                magnitude: config.shake_magnitude * power,
                decay: config.shake_decay,
                pitch_period: config.shake_pitch_period * slowdown,
                yaw_period: config.shake_yaw_period * slowdown,
            };
            (Some(shake), Some(SoundCue::ShockwaveHit))
        }
        _ => (None, None),
    };
    EntityImpact {
        id: entity.id,
        velocity,
        damage,
        shake,
        sound,
    }
}

fn apply_impact(host: &dyn EntityHost, impact: &EntityImpact) {
    if let Err(e) = host.apply_velocity(impact.id, impact.velocity) {
        debug!("Skipping knockback for entity {}: {}", impact.id, e);
        return;
    }
    if impact.damage > 0.0 {
        if let Err(e) = host.apply_damage(impact.id, impact.damage) {
            debug!("Skipping damage for entity {}: {}", impact.id, e);
            return;
        }
    }
    if let Some(shake) = impact.shake {
        host.camera_shake(impact.id, shake);
    }
    if let Some(cue) = impact.sound {
        host.play_sound(impact.id, cue);
    }
}

// ---------------------------------------------------------------------------
// Cancellation and completion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShockwavePhase {
    Idle,
    Propagating,
    Draining,
    Complete,
}

/// Cancels an explosion and every job it spawned.
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { state: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExplosionReport {
    pub explosion_id: u64,
    pub crater_radius: Option<f64>,
    pub rings_processed: usize,
    pub effect_radius: i32,
    pub destruction_radius: i32,
    pub entities_hit: usize,
    pub blocks_submitted: usize,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

/// Caller-side view of a running explosion.
#[derive(Clone)]
pub struct ExplosionHandle {
    id: u64,
    cancel: CancelToken,
    report: watch::Receiver<Option<ExplosionReport>>,
    phase: watch::Receiver<ShockwavePhase>,
}

impl ExplosionHandle {
    pub(crate) fn new(
        id: u64,
        cancel: CancelToken,
        report: watch::Receiver<Option<ExplosionReport>>,
        phase: watch::Receiver<ShockwavePhase>,
    ) -> Self {
        Self {
            id,
            cancel,
            report,
            phase,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn phase(&self) -> ShockwavePhase {
        *self.phase.borrow()
    }

    pub fn phases(&self) -> watch::Receiver<ShockwavePhase> {
        self.phase.clone()
    }

    /// The completion channel; holds `Some` once the explosion has ended.
    pub fn subscribe(&self) -> watch::Receiver<Option<ExplosionReport>> {
        self.report.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.report.borrow().is_some()
    }

    pub async fn finished(&self) -> Result<ExplosionReport> {
        let mut rx = self.report.clone();
        let report = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| EngineError::WorkerPanicked("explosion task"))?;
        (*report).clone().ok_or(EngineError::UnknownExplosion(self.id))
    }
}

// ---------------------------------------------------------------------------
// Propagator
// ---------------------------------------------------------------------------

/// Shared collaborators of an explosion in one world.
#[derive(Clone)]
pub struct ExplosionResources {
    pub cache: Arc<SpatialBlockCache>,
    pub queue: Arc<WorldMutationQueue>,
    pub entities: Arc<dyn EntityHost>,
    pub context: MutationContext,
    pub pool: Arc<ComputePool>,
    pub rule: Arc<TransformationRule>,
}

enum JobOutcome {
    Entities(usize),
    Destruction(usize),
}

pub struct ShockwavePropagator {
    id: u64,
    params: ShockwaveParams,
    config: ShockwaveConfig,
    entity_config: EntityConfig,
    resources: ExplosionResources,
    circles: CircleCache,
    penetration: PenetrationProcessor,
    trees: TreeBurner,
    visited: DashSet<EntityId>,
    phase: watch::Sender<ShockwavePhase>,
    rings_processed: AtomicUsize,
    blocks_submitted: AtomicUsize,
}

impl ShockwavePropagator {
    pub fn new(id: u64, params: ShockwaveParams, config: &EngineConfig, resources: ExplosionResources) -> Result<Self> {
        let params = params.validated()?;
        let (phase, _) = watch::channel(ShockwavePhase::Idle);
        Ok(Self {
            id,
            circles: CircleCache::from_config(&config.shockwave),
            penetration: PenetrationProcessor::new(
                resources.cache.clone(),
                resources.rule.clone(),
                config.penetration.clone(),
                params.height,
            ),
            trees: TreeBurner::new(resources.cache.clone(), params.center, config.tree.clone()),
            params,
            config: config.shockwave.clone(),
            entity_config: config.entity.clone(),
            resources,
            visited: DashSet::new(),
            phase,
            rings_processed: AtomicUsize::new(0),
            blocks_submitted: AtomicUsize::new(0),
        })
    }

    /// Publish phase changes on an existing channel instead of a private one.
    pub fn with_phase_channel(mut self, phase: watch::Sender<ShockwavePhase>) -> Self {
        phase.send_replace(ShockwavePhase::Idle);
        self.phase = phase;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn params(&self) -> &ShockwaveParams {
        &self.params
    }

    pub fn phases(&self) -> watch::Receiver<ShockwavePhase> {
        self.phase.subscribe()
    }

    /// Normalized explosion power at `radius`, in `[0, 1]`.
    pub fn power_at(&self, radius: i32) -> f64 {
        let (min, max) = (self.config.min_destruction_power, self.config.max_destruction_power);
        let t = (radius as f64 / self.params.radius as f64).clamp(0.0, 1.0);
        remap(lerp(max, min, t), min, max, 0.0, 1.0).clamp(0.0, 1.0)
    }

    /// Sample the circle at `radius`, preload every touched chunk in one
    /// call, and resolve each distinct column to its surface block.
    pub fn build_ring(&self, radius: i32) -> ShockwaveRing {
        let c = self.params.center;
        let samples = self.circles.samples(radius);
        let r = radius as f64;

        let mut seen = HashSet::with_capacity(samples.len());
        let mut points = Vec::with_capacity(samples.len());
        let mut chunks = BTreeSet::new();
        for &(cos, sin) in samples.iter() {
            let x = (c.x as f64 + r * cos).round() as i32;
            let z = (c.z as f64 + r * sin).round() as i32;
            if seen.insert(pack_column(x, z)) {
                points.push((x, z));
                chunks.insert(ChunkPos::containing(x, z));
            }
        }
        self.resources.cache.preload(chunks);

        let columns = points
            .into_iter()
            .map(|(x, z)| BlockPos::new(x, self.resources.cache.highest_surface_y(x, z), z))
            .collect();
        ShockwaveRing {
            radius,
            power: self.power_at(radius),
            columns,
        }
    }

    /// All block changes the destruction front makes at one ring.
    pub fn destruction_changes(&self, ring: &ShockwaveRing) -> Vec<BlockChangeRequest> {
        let mut out = Vec::new();
        if ring.power < self.penetration.min_power() {
            return out;
        }
        for &column in &ring.columns {
            if self.trees.is_tree_block(column) {
                self.trees.burn(column, ring.power, &mut out);
                let terrain = self.trees.tree_terrain(column);
                self.penetration.process_column(terrain, ring.power, &mut out);
            } else {
                self.penetration.process_column(column, ring.power, &mut out);
            }
        }
        out
    }

    /// Entities inside the ring's reach that have not been hit yet.
    pub fn entities_hit_by(&self, ring: &ShockwaveRing, entities: &[EntityInfo]) -> Vec<EntityInfo> {
        let grid = EntityGrid::new(&ring.columns, self.entity_config.grid_cell_size);
        let margin = self.entity_config.margin;
        let reach = self.entity_config.hit_reach;
        let height = self.params.height as f64;

        entities
            .iter()
            .filter(|entity| {
                let p = entity.position;
                grid.near(p).any(|column| {
                    let c = column.center();
                    let (dx, dz) = (p.x - c.x, p.z - c.z);
                    (dx * dx + dz * dz).sqrt() <= reach
                        && p.y >= c.y - margin
                        && p.y <= c.y + height + margin
                })
            })
            .filter(|entity| self.visited.insert(entity.id))
            .copied()
            .collect()
    }

    pub fn entities_hit(&self) -> usize {
        self.visited.len()
    }

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    async fn strike_entities(self: Arc<Self>, radius: i32) -> Result<JobOutcome> {
        let this = self.clone();
        let ring = self
            .resources
            .pool
            .run("shockwave ring", move || this.build_ring(radius))
            .await?;
        let Some(bounds) = ring.entity_bounds(self.entity_config.margin, self.params.height) else {
            return Ok(JobOutcome::Entities(0));
        };

        let host = self.resources.entities.clone();
        let nearby = self.resources.context.run(move || host.nearby_entities(&bounds)).await?;
        if nearby.is_empty() {
            return Ok(JobOutcome::Entities(0));
        }

        let impacts: Vec<EntityImpact> = self
            .entities_hit_by(&ring, &nearby)
            .iter()
            .map(|entity| compute_impact(entity, self.params.center, ring.power, &self.entity_config))
            .collect();
        let hits = impacts.len();
        if hits > 0 {
            let host = self.resources.entities.clone();
            self.resources
                .context
                .run(move || {
                    for impact in &impacts {
                        apply_impact(host.as_ref(), impact);
                    }
                })
                .await?;
            debug!("Ring {} hit {} entities", radius, hits);
        }
        Ok(JobOutcome::Entities(hits))
    }

    async fn destroy_ring(self: Arc<Self>, radius: i32) -> Result<JobOutcome> {
        let this = self.clone();
        let changes = self
            .resources
            .pool
            .run("shockwave destruction", move || {
                let ring = this.build_ring(radius);
                this.destruction_changes(&ring)
            })
            .await?;
        let submitted = self.resources.queue.submit_batch(changes).await?;
        self.blocks_submitted.fetch_add(submitted, Ordering::Relaxed);
        self.rings_processed.fetch_add(1, Ordering::Relaxed);
        trace!("Ring {} queued {} block changes", radius, submitted);
        Ok(JobOutcome::Destruction(submitted))
    }

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------

    /// Propagate until the destruction front reaches the maximum radius or
    /// `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancelToken) -> ExplosionReport {
        let span = tracing::info_span!("shockwave", id = self.id, center = %self.params.center);
        self.clone().propagate(cancel).instrument(span).await
    }

    async fn propagate(self: Arc<Self>, cancel: CancelToken) -> ExplosionReport {
        let started = Instant::now();
        let p = self.params;
        info!(
            "Shockwave {} starting at {}: radius {} → {}, height {}",
            self.id, p.center, p.radius_start, p.radius, p.height
        );
        self.phase.send_replace(ShockwavePhase::Propagating);

        let mut tracker = RadiusTracker::new(p.radius_start, p.radius, self.config.speed, self.config.effect_speed_multiplier);
        let permits = Arc::new(Semaphore::new(self.config.max_inflight_rings.max(1)));
        let mut jobs: JoinSet<Result<JobOutcome>> = JoinSet::new();
        let mut next_effect = tracker.effect();
        let mut next_destruction = tracker.destruction();
        let mut cancelled = false;

        'propagate: loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let (effect, destruction) = tracker.advance(started.elapsed());

            while next_effect <= effect {
                // Jobs parked on queue backpressure can hold every permit.
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break 'propagate;
                    }
                    permit = permits.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break 'propagate,
                    },
                };
                let this = self.clone();
                let radius = next_effect;
                jobs.spawn(async move {
                    let _permit = permit;
                    this.strike_entities(radius).await
                });
                next_effect += 1;
            }

            while next_destruction <= destruction {
                let radius = next_destruction;
                next_destruction += 1;
                if radius < p.destroy_start {
                    continue;
                }
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break 'propagate;
                    }
                    permit = permits.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break 'propagate,
                    },
                };
                let this = self.clone();
                jobs.spawn(async move {
                    let _permit = permit;
                    this.destroy_ring(radius).await
                });
            }

            while let Some(finished) = jobs.try_join_next() {
                log_job(finished);
            }

            if tracker.is_complete() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(self.config.tick_interval()) => {}
            }
        }

        if cancelled {
            jobs.abort_all();
        } else {
            self.phase.send_replace(ShockwavePhase::Draining);
            debug!("Shockwave {} draining {} ring jobs", self.id, jobs.len());
        }
        loop {
            tokio::select! {
                next = jobs.join_next() => match next {
                    Some(finished) => log_job(finished),
                    None => break,
                },
                _ = cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                    jobs.abort_all();
                }
            }
        }

        let report = ExplosionReport {
            explosion_id: self.id,
            crater_radius: None,
            rings_processed: self.rings_processed.load(Ordering::Relaxed),
            effect_radius: tracker.effect(),
            destruction_radius: tracker.destruction(),
            entities_hit: self.visited.len(),
            blocks_submitted: self.blocks_submitted.load(Ordering::Relaxed),
            cancelled,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        self.cleanup();
        self.phase.send_replace(ShockwavePhase::Complete);
        info!(
            "Shockwave {} {} after {} ms: {} rings, {} blocks, {} entities",
            self.id,
            if cancelled { "cancelled" } else { "complete" },
            report.elapsed_ms,
            report.rings_processed,
            report.blocks_submitted,
            report.entities_hit
        );
        report
    }

    fn cleanup(&self) {
        let removed = self.resources.cache.cleanup();
        self.penetration.clear();
        self.circles.clear();
        debug!("Shockwave {} cleaned up ({} snapshots expired)", self.id, removed);
    }
}

fn log_job(finished: std::result::Result<Result<JobOutcome>, tokio::task::JoinError>) {
    match finished {
        Ok(Ok(JobOutcome::Entities(hits))) => trace!("Entity job finished with {} hits", hits),
        Ok(Ok(JobOutcome::Destruction(blocks))) => trace!("Destruction job queued {} blocks", blocks),
        Ok(Err(e)) => warn!("Ring job failed: {}", e),
        Err(e) if e.is_cancelled() => {}
        Err(e) => warn!("Ring job panicked: {}", e),
    }
}
