//! SpatialBlockCache and RayCaster tests

#[cfg(test)]
mod tests {
    use shockwave_world::settings::CacheConfig;
    use shockwave_world::{
        BlockPos, ChunkPos, Material, MemoryWorld, RayCaster, SnapshotBudget, SpatialBlockCache,
    };
    use std::sync::Arc;

    fn make_world() -> Arc<MemoryWorld> {
        Arc::new(MemoryWorld::flat(0, 128, 63, Material::STONE))
    }

    fn make_cache(world: Arc<MemoryWorld>, max_entries: usize) -> SpatialBlockCache {
        let config = CacheConfig {
            max_entries,
            ..Default::default()
        };
        SpatialBlockCache::new(world, config, Arc::new(SnapshotBudget::new(4096)))
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    #[test]
    fn reads_materials_through_snapshots() {
        let world = make_world();
        world.place(BlockPos::new(3, 64, 5), Material::OAK_LOG);
        let cache = make_cache(world, 16);

        assert_eq!(cache.material(3, 63, 5), Material::STONE);
        assert_eq!(cache.material(3, 64, 5), Material::OAK_LOG);
        assert_eq!(cache.material(3, 65, 5), Material::AIR);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn out_of_height_reads_are_air() {
        let cache = make_cache(make_world(), 16);
        assert_eq!(cache.material(0, -1, 0), Material::AIR);
        assert_eq!(cache.material(0, 128, 0), Material::AIR);
        assert_eq!(cache.material(0, 10_000, 0), Material::AIR);
    }

    #[test]
    fn snapshots_are_not_refreshed_by_later_writes() {
        let world = make_world();
        let cache = make_cache(world.clone(), 16);
        assert_eq!(cache.material(1, 63, 1), Material::STONE);

        world.place(BlockPos::new(1, 63, 1), Material::AIR);
        assert_eq!(
            cache.material(1, 63, 1),
            Material::STONE,
            "cached snapshot must stay immutable"
        );
    }

    #[test]
    fn highest_surface_finds_top_block() {
        let world = make_world();
        for y in 64..70 {
            world.place(BlockPos::new(-7, y, 12), Material::OAK_LOG);
        }
        let cache = make_cache(world, 16);
        assert_eq!(cache.highest_surface_y(0, 0), 63);
        assert_eq!(cache.highest_surface_y(-7, 12), 69);
    }

    #[test]
    fn empty_column_surface_is_below_the_world() {
        let world = Arc::new(MemoryWorld::flat(-64, 64, -100, Material::STONE));
        let cache = make_cache(world, 16);
        assert_eq!(cache.highest_surface_y(4, 4), -65);
    }

    #[test]
    fn failed_fetch_reads_as_air_and_is_not_cached() {
        let world = make_world();
        world.unload_chunk(ChunkPos::new(2, 2));
        let cache = make_cache(world.clone(), 16);

        assert_eq!(cache.material(40, 10, 40), Material::AIR);
        assert_eq!(cache.highest_surface_y(40, 40), -1);
        assert!(!cache.contains(ChunkPos::new(2, 2)));
        assert_eq!(cache.stats().fetch_failures, 2);

        world.load_chunk(ChunkPos::new(2, 2));
        assert_eq!(cache.material(40, 10, 40), Material::STONE);
    }

    // -----------------------------------------------------------------------
    // Preload
    // -----------------------------------------------------------------------

    #[test]
    fn preload_fetches_each_missing_chunk_once() {
        let world = make_world();
        let cache = make_cache(world.clone(), 64);
        let chunks = ChunkPos::covering(-16, -16, 31, 31);
        assert_eq!(chunks.len(), 9);

        let loaded = cache.preload(chunks.iter().copied().chain(chunks.iter().copied()));
        assert_eq!(loaded, 9);
        assert_eq!(world.snapshot_fetches(), 9);

        assert_eq!(cache.preload(chunks), 0, "already cached");
        assert_eq!(world.snapshot_fetches(), 9);

        cache.material(-16, 0, 31);
        assert_eq!(cache.stats().hits, 1);
    }

    // -----------------------------------------------------------------------
    // Eviction
    // -----------------------------------------------------------------------

    #[test]
    fn entry_count_never_exceeds_the_limit() {
        let cache = make_cache(make_world(), 4);
        for i in 0..20 {
            cache.material(i * 16, 0, 0);
            assert!(cache.len() <= 4, "len {} after {} chunks", cache.len(), i + 1);
        }
        assert!(cache.stats().evictions > 0);
    }

    #[test]
    fn global_budget_is_shared_between_caches() {
        let world = make_world();
        let budget = Arc::new(SnapshotBudget::new(4));
        let config = CacheConfig {
            max_entries: 100,
            ..Default::default()
        };
        let a = SpatialBlockCache::new(world.clone(), config.clone(), budget.clone());
        let b = SpatialBlockCache::new(world, config, budget.clone());

        for i in 0..10 {
            a.material(i * 16, 0, 0);
            b.material(0, 0, i * 16);
            assert!(
                budget.live() <= budget.max(),
                "{} live snapshots, budget {}",
                budget.live(),
                budget.max()
            );
        }
        assert_eq!(budget.live(), a.len() + b.len());

        drop(a);
        assert_eq!(budget.live(), b.len(), "dropping a cache releases its share");
    }

    #[test]
    fn cache_within_its_share_keeps_entries_when_budget_is_full() {
        let world = make_world();
        let budget = Arc::new(SnapshotBudget::new(4));
        let config = CacheConfig {
            max_entries: 100,
            ..Default::default()
        };
        let a = SpatialBlockCache::new(world.clone(), config.clone(), budget.clone());
        for i in 0..4 {
            a.material(i * 16, 0, 0);
        }
        assert_eq!(a.len(), 4);
        assert!(budget.is_exhausted());

        let b = SpatialBlockCache::new(world.clone(), config, budget.clone());
        assert_eq!(budget.fair_share(), 2);
        let fetches = world.snapshot_fetches();
        for _ in 0..100 {
            assert_eq!(b.material(0, 10, 200), Material::STONE);
        }
        assert_eq!(world.snapshot_fetches() - fetches, 1, "one chunk fetched once");
        assert_eq!(b.len(), 1);
        assert_eq!(b.stats().hits, 99);

        // The over-share cache gives way on its next insert.
        a.material(1000, 0, 0);
        assert!(a.len() <= 3, "a kept {} entries", a.len());
        assert!(a.contains(ChunkPos::containing(1000, 0)), "fresh entry survives");
    }

    #[test]
    fn preload_is_capped_and_keeps_what_it_loaded() {
        let world = make_world();
        let cache = make_cache(world.clone(), 4);
        let first = ChunkPos::covering(0, 0, 47, 47);
        assert_eq!(first.len(), 9);

        assert_eq!(cache.preload(first.iter().copied()), 3);
        assert_eq!(world.snapshot_fetches(), 3);
        for chunk in &first[..3] {
            assert!(cache.contains(*chunk), "{} not preloaded", chunk);
        }

        let second = ChunkPos::covering(160, 160, 207, 207);
        assert_eq!(cache.preload(second.iter().copied()), 3);
        assert_eq!(cache.len(), 3);
        for chunk in &second[..3] {
            assert!(cache.contains(*chunk), "{} evicted by its own preload", chunk);
        }
    }

    #[test]
    fn cleanup_only_drops_expired_entries() {
        let world = make_world();
        let fresh = make_cache(world.clone(), 16);
        fresh.preload(ChunkPos::covering(0, 0, 31, 31));
        assert_eq!(fresh.cleanup(), 0);
        assert_eq!(fresh.len(), 4);

        let expiring = SpatialBlockCache::new(
            world,
            CacheConfig {
                ttl_secs: 0,
                ..Default::default()
            },
            Arc::new(SnapshotBudget::new(64)),
        );
        expiring.preload(ChunkPos::covering(0, 0, 31, 31));
        expiring.cleanup();
        assert!(expiring.is_empty());
    }

    #[test]
    fn clear_releases_budget() {
        let budget = Arc::new(SnapshotBudget::new(64));
        let cache = SpatialBlockCache::new(make_world(), CacheConfig::default(), budget.clone());
        cache.preload(ChunkPos::covering(0, 0, 47, 47));
        assert_eq!(budget.live(), 9);
        cache.clear();
        assert_eq!(budget.live(), 0);
        assert!(cache.is_empty());
    }

    // -----------------------------------------------------------------------
    // RayCaster
    // -----------------------------------------------------------------------

    #[test]
    fn ray_finds_first_solid_block() {
        let world = make_world();
        world.place(BlockPos::new(0, 80, 0), Material::GLASS);
        let ray = RayCaster::new(Arc::new(make_cache(world, 16)));

        assert_eq!(ray.first_solid_below(0, 100, 0, 50), 80);
        assert_eq!(ray.first_solid_below(1, 100, 1, 50), 63);
        assert!(!RayCaster::missed(100, 63, 50));
    }

    #[test]
    fn ray_reports_miss_when_depth_runs_out() {
        let ray = RayCaster::new(Arc::new(make_cache(make_world(), 16)));
        let result = ray.first_solid_below(0, 100, 0, 10);
        assert_eq!(result, 90);
        assert!(RayCaster::missed(100, result, 10));
    }
}
