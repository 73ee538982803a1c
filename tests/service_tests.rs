//! ExplosionService and WorldRegistry tests

#[cfg(test)]
mod tests {
    use shockwave_world::error::EngineError;
    use shockwave_world::host::{EntityKind, EventSink, WorldBinding, WorldId};
    use shockwave_world::protocol::{subjects, ExplosionEvent, ExplosionFinished, ExplosionStarted};
    use shockwave_world::{
        BlockPos, DetonationRequest, EngineConfig, ExplosionService, Material, MemoryWorld,
        MutationContext, ShockwavePhase, Vec3, WorldRegistry,
    };
    use std::sync::Arc;
    use std::time::Duration;

    const GROUND: i32 = 64;

    fn make_config(speed: f64) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.worker_pool_size = 2;
        config.shockwave.speed = speed;
        config.shockwave.tick_interval_ms = 2;
        config.mutation.batch_interval_ms = 0;
        config
    }

    fn make_registry(speed: f64) -> Arc<WorldRegistry> {
        let context = MutationContext::dedicated("service-test").expect("context thread");
        Arc::new(WorldRegistry::new(make_config(speed), context).expect("registry"))
    }

    fn make_world() -> Arc<MemoryWorld> {
        Arc::new(MemoryWorld::layered(0, 160, GROUND))
    }

    fn make_service(speed: f64) -> (ExplosionService, Arc<MemoryWorld>, WorldId) {
        let registry = make_registry(speed);
        let world = make_world();
        let id = WorldId::new("overworld");
        registry.register(WorldBinding::from_host(id.clone(), world.clone()));
        let events: Arc<dyn EventSink> = world.clone();
        (ExplosionService::new(registry).with_events(events), world, id)
    }

    fn subjects_of(world: &MemoryWorld) -> Vec<String> {
        world.published_events().into_iter().map(|(s, _)| s).collect()
    }

    // -----------------------------------------------------------------------
    // Registry
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn registering_twice_returns_the_same_resources() {
        let registry = make_registry(300.0);
        let world = make_world();
        let id = WorldId::new("overworld");

        let a = registry.register(WorldBinding::from_host(id.clone(), world.clone()));
        let b = registry.register(WorldBinding::from_host(id.clone(), world));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a.cache, &b.cache));
        assert_eq!(registry.len(), 1);
        assert!(a.queue.is_running());
        assert_eq!(registry.world_ids(), vec![id.clone()]);

        registry.remove(&id).await.expect("remove");
        assert!(!registry.contains(&id));
        assert!(!a.queue.is_running());
    }

    #[tokio::test]
    async fn unknown_world_is_an_error() {
        let registry = make_registry(300.0);
        let missing = WorldId::new("nether");
        assert!(matches!(registry.get(&missing), Err(EngineError::UnknownWorld(_))));
        assert!(registry.remove(&missing).await.is_err());

        let service = ExplosionService::new(registry);
        let request = DetonationRequest::shockwave_only(BlockPos::new(0, GROUND, 0), 10, 5);
        assert!(matches!(service.detonate(&missing, request), Err(EngineError::UnknownWorld(_))));
    }

    #[tokio::test]
    async fn reconfigure_reaches_every_world() {
        let registry = make_registry(300.0);
        let first = registry.register(WorldBinding::from_host(WorldId::new("a"), make_world()));
        let second = registry.register(WorldBinding::from_host(WorldId::new("b"), make_world()));

        let mut mutation = registry.config().mutation;
        mutation.worker_count = 4;
        registry.reconfigure_mutation(mutation).await;

        assert_eq!(first.queue.worker_count(), 4);
        assert_eq!(second.queue.worker_count(), 4);
        assert_eq!(registry.config().mutation.worker_count, 4);
        registry.shutdown_all().await;
        assert!(registry.is_empty());
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    #[test]
    fn sizes_derive_from_blast_power() {
        let center = BlockPos::new(0, GROUND, 0);
        let request = DetonationRequest::from_blast_power(center, 0.1);
        assert_eq!(request.shockwave_radius, 80);
        assert_eq!(request.shockwave_height, 30);
        assert_eq!(request.crater_radius, 40);
        assert_eq!(request.crater_depth, 6);

        let tiny = DetonationRequest::from_blast_power(center, 0.01);
        assert_eq!(tiny.crater_radius, 20, "crater radius has a floor");
        let huge = DetonationRequest::from_blast_power(center, 1.0);
        assert_eq!(huge.crater_radius, 180, "crater radius has a ceiling");
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected() {
        let (service, _, id) = make_service(300.0);
        let center = BlockPos::new(0, GROUND, 0);
        assert!(service.detonate(&id, DetonationRequest::new(center, -1, 3, 10, 5)).is_err());
        assert!(service.detonate(&id, DetonationRequest::new(center, 5, 0, 10, 5)).is_err());
        assert!(service.detonate(&id, DetonationRequest::shockwave_only(center, 0, 5)).is_err());
        assert_eq!(service.active_count(), 0);
    }

    #[test]
    fn detonate_needs_a_runtime() {
        let (service, _, id) = make_service(300.0);
        let request = DetonationRequest::shockwave_only(BlockPos::new(0, GROUND, 0), 10, 5);
        assert!(matches!(
            service.detonate(&id, request),
            Err(EngineError::ContextUnavailable(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Detonation
    // -----------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shockwave_only_detonation_completes() {
        let (service, world, id) = make_service(500.0);
        let request = DetonationRequest::shockwave_only(BlockPos::new(0, GROUND, 0), 10, 5);
        let handle = service.detonate(&id, request).expect("detonate");

        let report = handle.finished().await.expect("report");
        assert!(!report.cancelled);
        assert_eq!(report.explosion_id, handle.id());
        assert_eq!(report.crater_radius, None);
        assert_eq!(report.destruction_radius, 10);
        assert!(handle.is_finished());
        assert_eq!(handle.phase(), ShockwavePhase::Complete);
        assert_eq!(service.active_count(), 0);
        assert_eq!(service.stats().completed_explosions, 1);

        assert_eq!(
            subjects_of(&world),
            vec![subjects::EXPLOSION_STARTED.to_string(), subjects::EXPLOSION_FINISHED.to_string()]
        );
        let events = world.published_events();
        let started: ExplosionEvent<ExplosionStarted> =
            serde_json::from_slice(&events[0].1).expect("started event");
        assert_eq!(started.world, "overworld");
        assert_eq!(started.payload.shockwave_radius, 10);
        let finished: ExplosionEvent<ExplosionFinished> =
            serde_json::from_slice(&events[1].1).expect("finished event");
        assert_eq!(finished.explosion_id, handle.id());
        assert_eq!(finished.payload.report.destruction_radius, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn crater_comes_before_the_shockwave() {
        let (service, world, id) = make_service(500.0);
        let victim = world.spawn_entity(EntityKind::Living, Vec3::new(1.5, GROUND as f64 + 1.0, 0.5));
        let debris = world.spawn_entity(EntityKind::Other, Vec3::new(-1.5, GROUND as f64 + 1.0, 0.5));
        let center = BlockPos::new(0, GROUND, 0);

        let handle = service
            .detonate(&id, DetonationRequest::new(center, 6, 3, 16, 10))
            .expect("detonate");
        let report = handle.finished().await.expect("report");

        let crater_radius = report.crater_radius.expect("crater radius");
        assert!(crater_radius >= 6.0, "crater radius {}", crater_radius);
        assert_eq!(report.destruction_radius, 16);
        assert_eq!(
            subjects_of(&world),
            vec![
                subjects::EXPLOSION_STARTED.to_string(),
                subjects::CRATER_COMPLETED.to_string(),
                subjects::EXPLOSION_FINISHED.to_string(),
            ]
        );

        let victim = world.entity(victim).expect("victim");
        assert!(victim.damage_taken >= 1000.0, "damage {}", victim.damage_taken);
        assert_eq!(world.entity(debris).expect("debris").damage_taken, 0.0);

        service.registry().get(&id).expect("world").queue.flush().await;
        assert_eq!(world.material_at(BlockPos::new(0, GROUND - 1, 0)), Material::AIR);
        assert_eq!(world.material_at(BlockPos::new(0, GROUND, 0)), Material::AIR);
        assert_ne!(world.material_at(BlockPos::new(0, GROUND - 3, 0)), Material::AIR, "scorched floor");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelled_detonation_reports_cancellation() {
        let (service, _, id) = make_service(20.0);
        let request = DetonationRequest::shockwave_only(BlockPos::new(0, GROUND, 0), 200, 10);
        let handle = service.detonate(&id, request).expect("detonate");
        assert_eq!(service.active_ids(), vec![handle.id()]);
        assert!(service.handle(handle.id()).is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        service.cancel(handle.id()).expect("cancel");

        let report = tokio::time::timeout(Duration::from_secs(5), handle.finished())
            .await
            .expect("cancelled explosion must finish promptly")
            .expect("report");
        assert!(report.cancelled);
        assert!(report.destruction_radius < 200);
        assert_eq!(service.active_count(), 0);
        assert!(matches!(service.cancel(handle.id()), Err(EngineError::UnknownExplosion(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_world_only_touches_that_world() {
        let (service, _, id) = make_service(20.0);
        let other = WorldId::new("end");
        service
            .registry()
            .register(WorldBinding::from_host(other.clone(), make_world()));

        let center = BlockPos::new(0, GROUND, 0);
        let here = service
            .detonate(&id, DetonationRequest::shockwave_only(center, 200, 10))
            .expect("detonate");
        let there = service
            .detonate(&other, DetonationRequest::shockwave_only(center, 200, 10))
            .expect("detonate");
        assert_eq!(service.active_count(), 2);

        assert_eq!(service.cancel_world(&other), 1);
        assert!(there.finished().await.expect("report").cancelled);
        assert!(!here.is_finished());

        assert_eq!(service.cancel_all(), 1);
        assert!(here.finished().await.expect("report").cancelled);
    }
}
