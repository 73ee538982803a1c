//! ExplosionService – detonation orchestration across registered worlds.
//!
//! A detonation runs as one Tokio task:
//!
//! ```text
//! detonate()
//!   ├── publish  shockwave.explosion.started
//!   ├── lethal damage inside the crater footprint   (mutation context)
//!   ├── SolidRegionGenerator::generate              (compute pool → queue)
//!   ├── publish  shockwave.explosion.crater
//!   ├── ShockwavePropagator::run  from crater radius − 1
//!   └── publish  shockwave.explosion.finished       → ExplosionHandle
//! ```

use crate::crater::{CraterSpec, SolidRegionGenerator};
use crate::error::{EngineError, Result};
use crate::host::{EntityKind, EventSink, WorldId};
use crate::protocol::{subjects, CraterCompleted, ExplosionEvent, ExplosionFinished, ExplosionStarted};
use crate::registry::{WorldRegistry, WorldResources};
use crate::settings::EngineConfig;
use crate::shockwave::{
    CancelToken, ExplosionHandle, ExplosionReport, ExplosionResources, ShockwaveParams,
    ShockwavePhase, ShockwavePropagator,
};
use crate::transform::TransformationRule;
use crate::types::{Aabb, BlockPos, EngineStats, Vec3};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::Instrument;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetonationRequest {
    pub center: BlockPos,
    /// Horizontal crater radius; zero skips the crater.
    pub crater_radius: i32,
    pub crater_depth: i32,
    pub shockwave_radius: i32,
    pub shockwave_height: i32,
}

impl DetonationRequest {
    pub fn new(center: BlockPos, crater_radius: i32, crater_depth: i32, shockwave_radius: i32, shockwave_height: i32) -> Self {
        Self {
            center,
            crater_radius,
            crater_depth,
            shockwave_radius,
            shockwave_height,
        }
    }

    /// Sizes derived from a single blast power figure.
    pub fn from_blast_power(center: BlockPos, blast_power: f64) -> Self {
        let shockwave_radius = blast_power * 800.0;
        let crater_radius = ((shockwave_radius / 2.0).round() as i32).clamp(20, 180);
        Self {
            center,
            crater_radius,
            crater_depth: crater_radius / 6,
            shockwave_radius: shockwave_radius.round() as i32,
            shockwave_height: (blast_power * 300.0).round() as i32,
        }
    }

    /// A shockwave without a crater.
    pub fn shockwave_only(center: BlockPos, radius: i32, height: i32) -> Self {
        Self::new(center, 0, 0, radius, height)
    }

    pub fn has_crater(&self) -> bool {
        self.crater_radius > 0
    }

    fn validate(&self) -> Result<()> {
        if self.crater_radius < 0 {
            return Err(EngineError::InvalidGeometry(format!(
                "crater radius must not be negative, got {}",
                self.crater_radius
            )));
        }
        if self.has_crater() && self.crater_depth <= 0 {
            return Err(EngineError::InvalidGeometry(format!(
                "crater depth must be positive, got {}",
                self.crater_depth
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

struct ActiveExplosion {
    world: WorldId,
    handle: ExplosionHandle,
}

pub struct ExplosionService {
    registry: Arc<WorldRegistry>,
    rule: Arc<TransformationRule>,
    events: Option<Arc<dyn EventSink>>,
    active: Arc<Mutex<HashMap<u64, ActiveExplosion>>>,
    next_id: AtomicU64,
    completed: Arc<AtomicU64>,
}

impl ExplosionService {
    pub fn new(registry: Arc<WorldRegistry>) -> Self {
        Self {
            registry,
            rule: Arc::new(TransformationRule::default()),
            events: None,
            active: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            completed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_rule(mut self, rule: TransformationRule) -> Self {
        self.rule = Arc::new(rule);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn registry(&self) -> &Arc<WorldRegistry> {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Detonation
    // -----------------------------------------------------------------------

    /// Start an explosion in `world`.  Must be called from within a Tokio
    /// runtime; the explosion runs as a task on it.
    pub fn detonate(&self, world: &WorldId, request: DetonationRequest) -> Result<ExplosionHandle> {
        request.validate()?;
        let config = self.registry.config();
        let params = ShockwaveParams::from_config(request.center, &config.shockwave)
            .with_radius(request.shockwave_radius, request.shockwave_height)
            .validated()?;
        let crater = if request.has_crater() {
            Some(CraterSpec::new(
                request.center,
                request.crater_radius,
                request.crater_depth,
                request.crater_radius,
                request.shockwave_height,
            )?)
        } else {
            None
        };
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| EngineError::ContextUnavailable(e.to_string()))?;
        let resources = self.registry.get(world)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancelToken::new();
        let (report_tx, report_rx) = watch::channel(None);
        let (phase_tx, phase_rx) = watch::channel(ShockwavePhase::Idle);
        let handle = ExplosionHandle::new(id, cancel.clone(), report_rx, phase_rx);

        self.active.lock().insert(
            id,
            ActiveExplosion {
                world: world.clone(),
                handle: handle.clone(),
            },
        );

        let explosion = ExplosionResources {
            cache: resources.cache.clone(),
            queue: resources.queue.clone(),
            entities: resources.binding.entities.clone(),
            context: self.registry.context().clone(),
            pool: self.registry.pool().clone(),
            rule: self.rule.clone(),
        };
        let detonation = Detonation {
            id,
            request,
            params,
            crater,
            config,
            world: resources,
            explosion,
            events: self.events.clone(),
            cancel,
            phase: phase_tx,
        };
        let active = self.active.clone();
        let completed = self.completed.clone();
        let span = tracing::info_span!("explosion", id, world = %world);
        runtime.spawn(
            async move {
                let report = detonation.run().await;
                active.lock().remove(&id);
                completed.fetch_add(1, Ordering::Relaxed);
                report_tx.send_replace(Some(report));
            }
            .instrument(span),
        );

        info!("Detonation {} accepted in '{}' at {}", id, world, request.center);
        Ok(handle)
    }

    pub fn handle(&self, id: u64) -> Option<ExplosionHandle> {
        self.active.lock().get(&id).map(|a| a.handle.clone())
    }

    pub fn active_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.active.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    pub fn cancel(&self, id: u64) -> Result<()> {
        let active = self.active.lock();
        let explosion = active.get(&id).ok_or(EngineError::UnknownExplosion(id))?;
        explosion.handle.cancel();
        debug!("Cancelling explosion {} in '{}'", id, explosion.world);
        Ok(())
    }

    /// Cancel every running explosion; returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let active = self.active.lock();
        for explosion in active.values() {
            explosion.handle.cancel();
        }
        active.len()
    }

    /// Cancel every explosion running in `world`.
    pub fn cancel_world(&self, world: &WorldId) -> usize {
        let active = self.active.lock();
        let mut cancelled = 0;
        for explosion in active.values().filter(|a| &a.world == world) {
            explosion.handle.cancel();
            cancelled += 1;
        }
        cancelled
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            active_explosions: self.active_count(),
            completed_explosions: self.completed.load(Ordering::Relaxed),
            ..self.registry.stats()
        }
    }
}

// ---------------------------------------------------------------------------
// Detonation task
// ---------------------------------------------------------------------------

struct Detonation {
    id: u64,
    request: DetonationRequest,
    params: ShockwaveParams,
    crater: Option<CraterSpec>,
    config: EngineConfig,
    world: Arc<WorldResources>,
    explosion: ExplosionResources,
    events: Option<Arc<dyn EventSink>>,
    cancel: CancelToken,
    phase: watch::Sender<ShockwavePhase>,
}

impl Detonation {
    async fn run(self) -> ExplosionReport {
        let started = Instant::now();
        let r = self.request;
        self.publish(
            subjects::EXPLOSION_STARTED,
            ExplosionStarted {
                center: r.center,
                crater_radius: r.crater_radius,
                crater_depth: r.crater_depth,
                shockwave_radius: r.shockwave_radius,
                shockwave_height: r.shockwave_height,
            },
        );

        let mut crater_radius = None;
        let mut start = self.params.radius_start;
        if let Some(spec) = self.crater {
            self.strike_crater_zone(&spec).await;
            let generator = SolidRegionGenerator::new(self.explosion.cache.clone(), self.config.crater.clone());
            let carved = tokio::select! {
                radius = generator.generate(spec, &self.explosion.queue, &self.explosion.pool) => Some(radius),
                _ = self.cancel.cancelled() => None,
            };
            match carved {
                Some(radius) => {
                    crater_radius = Some(radius);
                    start = (radius.round() as i32 - 1).max(0);
                    self.publish(subjects::CRATER_COMPLETED, CraterCompleted { effective_radius: radius });
                }
                None => return self.finish(self.cancelled_report(), started),
            }
        }

        let params = self.params.starting_at(start);
        let propagator = match ShockwavePropagator::new(self.id, params, &self.config, self.explosion.clone()) {
            Ok(p) => p.with_phase_channel(self.phase.clone()),
            Err(e) => {
                error!("Explosion {} could not start its shockwave: {}", self.id, e);
                return self.finish(self.cancelled_report(), started);
            }
        };
        let mut report = Arc::new(propagator).run(self.cancel.clone()).await;
        report.crater_radius = crater_radius;
        self.finish(report, started)
    }

    /// Living entities inside the crater are killed outright.
    async fn strike_crater_zone(&self, spec: &CraterSpec) {
        let reach = spec.radius_x().max(spec.radius_z()) as f64;
        let center = spec.center().center();
        let bounds = Aabb::new(
            center.sub(Vec3::new(reach, reach, reach)),
            center.add(Vec3::new(reach, reach, reach)),
        );
        let damage = self.config.entity.crater_damage;
        let host = self.world.binding.entities.clone();
        let struck = self
            .explosion
            .context
            .run(move || {
                let mut struck = 0;
                for entity in host.nearby_entities(&bounds) {
                    if entity.kind == EntityKind::Other || entity.position.sub(center).length() >= reach {
                        continue;
                    }
                    match host.apply_damage(entity.id, damage) {
                        Ok(()) => struck += 1,
                        Err(e) => debug!("Skipping crater damage for entity {}: {}", entity.id, e),
                    }
                }
                struck
            })
            .await;
        match struck {
            Ok(0) => {}
            Ok(n) => info!("Explosion {} killed {} entities inside the crater", self.id, n),
            Err(e) => warn!("Explosion {} could not reach crater entities: {}", self.id, e),
        }
    }

    fn cancelled_report(&self) -> ExplosionReport {
        ExplosionReport {
            explosion_id: self.id,
            effect_radius: self.params.radius_start,
            destruction_radius: self.params.radius_start,
            cancelled: true,
            ..Default::default()
        }
    }

    fn finish(&self, mut report: ExplosionReport, started: Instant) -> ExplosionReport {
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        self.phase.send_replace(ShockwavePhase::Complete);
        self.publish(
            subjects::EXPLOSION_FINISHED,
            ExplosionFinished {
                report: report.clone(),
            },
        );
        report
    }

    fn publish<T: Serialize>(&self, subject: &str, payload: T) {
        let Some(events) = &self.events else {
            return;
        };
        let event = ExplosionEvent::new(self.world.id().to_string(), self.id, payload);
        match serde_json::to_vec(&event) {
            Ok(bytes) => {
                if let Err(e) = events.publish(subject, bytes) {
                    warn!("Failed to publish {}: {}", subject, e);
                }
            }
            Err(e) => warn!("Failed to encode {}: {}", subject, e),
        }
    }
}
