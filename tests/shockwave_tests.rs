//! ShockwavePropagator tests

#[cfg(test)]
mod tests {
    use shockwave_world::host::{EntityInfo, EntityKind, SoundCue};
    use shockwave_world::settings::EntityConfig;
    use shockwave_world::shockwave::{compute_impact, ExplosionResources, ShockwaveParams};
    use shockwave_world::{
        BlockPos, CancelToken, ComputePool, EngineConfig, Material, MemoryWorld, MutationContext,
        ShockwavePhase, ShockwavePropagator, SnapshotBudget, SpatialBlockCache,
        TransformationRule, Vec3, WorldMutationQueue,
    };
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    const GROUND: i32 = 64;

    fn make_world() -> Arc<MemoryWorld> {
        Arc::new(MemoryWorld::layered(0, 128, GROUND))
    }

    fn make_config(speed: f64) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.shockwave.speed = speed;
        config.shockwave.tick_interval_ms = 2;
        config.mutation.batch_interval_ms = 0;
        config
    }

    fn make_resources(world: Arc<MemoryWorld>, config: &EngineConfig) -> ExplosionResources {
        let context = MutationContext::current().expect("runtime");
        let queue = Arc::new(WorldMutationQueue::new(world.clone(), context.clone(), config.mutation.clone()));
        queue.start();
        ExplosionResources {
            cache: Arc::new(SpatialBlockCache::new(
                world.clone(),
                config.cache.clone(),
                Arc::new(SnapshotBudget::new(config.cache.global_max_snapshots)),
            )),
            queue,
            entities: world,
            context,
            pool: Arc::new(ComputePool::new(2).expect("pool")),
            rule: Arc::new(TransformationRule::default()),
        }
    }

    fn make_params(config: &EngineConfig, radius: i32) -> ShockwaveParams {
        ShockwaveParams::from_config(BlockPos::new(0, GROUND, 0), &config.shockwave).with_radius(radius, 10)
    }

    fn make_propagator(world: Arc<MemoryWorld>, radius: i32, speed: f64) -> ShockwavePropagator {
        let config = make_config(speed);
        let params = make_params(&config, radius);
        ShockwavePropagator::new(1, params, &config, make_resources(world, &config)).expect("valid shockwave")
    }

    fn entity(id: u64, kind: EntityKind, x: f64, z: f64) -> EntityInfo {
        EntityInfo {
            id,
            kind,
            position: Vec3::new(x, GROUND as f64 + 1.0, z),
        }
    }

    // -----------------------------------------------------------------------
    // Parameters
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn rejects_non_positive_radius() {
        let config = make_config(100.0);
        let params = make_params(&config, 0);
        let result = ShockwavePropagator::new(1, params, &config, make_resources(make_world(), &config));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn power_falls_from_centre_to_edge() {
        let wave = make_propagator(make_world(), 40, 100.0);
        assert!((wave.power_at(0) - 1.0).abs() < 1e-9);
        assert!(wave.power_at(40).abs() < 1e-9);
        let mut last = f64::MAX;
        for r in 0..=40 {
            let p = wave.power_at(r);
            assert!(p <= last, "power rose at radius {}", r);
            last = p;
        }
    }

    // -----------------------------------------------------------------------
    // Rings
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn ring_columns_are_distinct_surface_blocks() {
        let wave = make_propagator(make_world(), 40, 100.0);
        let ring = wave.build_ring(20);
        assert!(ring.columns.len() > 80);

        let mut seen = HashSet::new();
        for column in &ring.columns {
            assert!(seen.insert((column.x, column.z)), "column {} repeated", column);
            assert_eq!(column.y, GROUND);
            let d = column.horizontal_distance(BlockPos::new(0, GROUND, 0));
            assert!((d - 20.0).abs() < 1.5, "column {} is {} from the centre", column, d);
        }
    }

    #[tokio::test]
    async fn zero_radius_ring_is_the_centre() {
        let wave = make_propagator(make_world(), 40, 100.0);
        let ring = wave.build_ring(0);
        assert_eq!(ring.columns, vec![BlockPos::new(0, GROUND, 0)]);
    }

    #[tokio::test]
    async fn trees_on_the_ring_are_burned() {
        let world = make_world();
        for y in GROUND + 1..=GROUND + 4 {
            world.place(BlockPos::new(10, y, 0), Material::OAK_LOG);
        }
        let wave = make_propagator(world, 40, 100.0);
        let ring = wave.build_ring(10);
        assert!(ring.columns.contains(&BlockPos::new(10, GROUND + 4, 0)));

        let changes = wave.destruction_changes(&ring);
        let logs_touched = changes
            .iter()
            .filter(|c| c.pos().y > GROUND && c.pos().z == 0 && c.pos().x >= 10)
            .count();
        assert!(logs_touched >= 4, "tree left standing: {} changes", logs_touched);
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn entity_is_hit_only_once() {
        let wave = make_propagator(make_world(), 40, 100.0);
        let near = entity(1, EntityKind::Living, 8.5, 0.5);
        let far = entity(2, EntityKind::Living, 30.5, 0.5);

        let hits = wave.entities_hit_by(&wave.build_ring(8), &[near, far]);
        assert_eq!(hits, vec![near]);
        let again = wave.entities_hit_by(&wave.build_ring(9), &[near, far]);
        assert!(again.is_empty(), "already visited");
        assert_eq!(wave.entities_hit(), 1);
    }

    #[test]
    fn players_get_knockback_shake_and_sound() {
        let config = EntityConfig::default();
        let player = entity(7, EntityKind::Player, 10.5, 0.5);
        let impact = compute_impact(&player, BlockPos::new(0, GROUND, 0), 0.5, &config);

        assert!(impact.velocity.x > 0.0, "pushed away from the centre");
        assert!(impact.velocity.z.abs() < 1e-9);
        assert_eq!(impact.velocity.y, config.knockback_lift);
        assert_eq!(impact.damage, config.base_damage * 0.5);
        let shake = impact.shake.expect("players shake");
        assert_eq!(shake.magnitude, config.shake_magnitude * 0.5);
        assert_eq!(impact.sound, Some(SoundCue::ShockwaveHit));
    }

    #[test]
    fn other_entities_are_only_pushed() {
        let config = EntityConfig::default();
        let item = entity(8, EntityKind::Other, -4.5, 0.5);
        let impact = compute_impact(&item, BlockPos::new(0, GROUND, 0), 0.9, &config);
        assert!(impact.velocity.x < 0.0);
        assert_eq!(impact.damage, 0.0);
        assert!(impact.shake.is_none());
        assert!(impact.sound.is_none());
    }

    // -----------------------------------------------------------------------
    // Propagation
    // -----------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn propagates_to_the_full_radius() {
        let world = make_world();
        let player = world.spawn_entity(EntityKind::Player, Vec3::new(8.5, 65.0, 0.5));
        let living = world.spawn_entity(EntityKind::Living, Vec3::new(0.5, 65.0, -5.5));
        let outside = world.spawn_entity(EntityKind::Living, Vec3::new(100.5, 65.0, 0.5));

        let config = make_config(400.0);
        let resources = make_resources(world.clone(), &config);
        let queue = resources.queue.clone();
        let wave = Arc::new(
            ShockwavePropagator::new(1, make_params(&config, 12), &config, resources).expect("valid shockwave"),
        );
        let phases = wave.phases();
        let report = wave.clone().run(CancelToken::new()).await;

        assert!(!report.cancelled);
        assert_eq!(report.destruction_radius, 12);
        assert_eq!(report.effect_radius, 12);
        assert_eq!(report.rings_processed, 13);
        assert_eq!(report.entities_hit, 2);
        assert!(report.blocks_submitted > 0);
        assert_eq!(*phases.borrow(), ShockwavePhase::Complete);

        let player = world.entity(player).expect("player");
        assert!(player.velocity.x > 0.0);
        assert!(player.damage_taken > 0.0);
        assert_eq!(player.shakes.len(), 1);
        assert_eq!(player.sounds, vec![SoundCue::ShockwaveHit]);

        let living = world.entity(living).expect("living");
        assert!(living.velocity.z < 0.0);
        assert!(living.shakes.is_empty());

        assert_eq!(world.entity(outside).expect("outside").velocity, Vec3::zero());

        queue.flush().await;
        assert!(world.material_writes() > 0);
        queue.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancellation_stops_the_wave() {
        let wave = Arc::new(make_propagator(make_world(), 200, 20.0));
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            trigger.cancel();
        });

        let report = tokio::time::timeout(Duration::from_secs(5), wave.clone().run(cancel))
            .await
            .expect("cancelled wave must stop promptly");
        assert!(report.cancelled);
        assert!(report.destruction_radius < 200);
        assert_eq!(*wave.phases().borrow(), ShockwavePhase::Complete);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancellation_is_not_blocked_by_a_full_queue() {
        let mut config = make_config(100.0);
        config.mutation.queue_capacity = 4;
        config.shockwave.max_inflight_rings = 2;
        let resources = make_resources(make_world(), &config);
        let queue = resources.queue.clone();
        // Nothing drains the queue, so ring jobs park on backpressure
        // holding every permit.
        queue.shutdown().await;

        let wave = Arc::new(
            ShockwavePropagator::new(1, make_params(&config, 100), &config, resources).expect("valid shockwave"),
        );
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let report = tokio::time::timeout(Duration::from_secs(5), wave.clone().run(cancel))
            .await
            .expect("cancel must not wait for queue space");
        assert!(report.cancelled);
        assert_eq!(queue.len(), 4, "queue stayed full");
        assert_eq!(*wave.phases().borrow(), ShockwavePhase::Complete);
    }

    #[tokio::test]
    async fn cancelled_before_start_does_nothing() {
        let wave = Arc::new(make_propagator(make_world(), 50, 100.0));
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(cancel.is_cancelled());

        let report = wave.run(cancel).await;
        assert!(report.cancelled);
        assert_eq!(report.rings_processed, 0);
        assert_eq!(report.blocks_submitted, 0);
        assert_eq!(report.destruction_radius, 0);
    }
}
