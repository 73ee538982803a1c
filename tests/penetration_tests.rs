//! PenetrationProcessor tests

#[cfg(test)]
mod tests {
    use shockwave_world::settings::{CacheConfig, PenetrationTuning};
    use shockwave_world::{
        BlockChangeRequest, BlockPos, Material, MemoryWorld, PenetrationProcessor, SnapshotBudget,
        SpatialBlockCache, TransformationRule,
    };
    use std::collections::HashSet;
    use std::sync::Arc;

    fn make_world(surface: Material) -> Arc<MemoryWorld> {
        Arc::new(MemoryWorld::flat(0, 128, 64, surface))
    }

    fn make_processor(world: Arc<MemoryWorld>, height: i32) -> PenetrationProcessor {
        make_tuned_processor(world, height, PenetrationTuning::default())
    }

    fn make_tuned_processor(world: Arc<MemoryWorld>, height: i32, tuning: PenetrationTuning) -> PenetrationProcessor {
        let cache = Arc::new(SpatialBlockCache::new(
            world,
            CacheConfig::default(),
            Arc::new(SnapshotBudget::new(256)),
        ));
        PenetrationProcessor::new(cache, Arc::new(TransformationRule::default()), tuning, height)
    }

    /// Fill the box `min..=max` with `material`.
    fn fill(world: &MemoryWorld, min: BlockPos, max: BlockPos, material: Material) {
        for x in min.x..=max.x {
            for y in min.y..=max.y {
                for z in min.z..=max.z {
                    world.place(BlockPos::new(x, y, z), material);
                }
            }
        }
    }

    fn run(processor: &PenetrationProcessor, surface: BlockPos, power: f64) -> Vec<BlockChangeRequest> {
        let mut out = Vec::new();
        processor.process_column(surface, power, &mut out);
        out
    }

    // -----------------------------------------------------------------------
    // Claims
    // -----------------------------------------------------------------------

    #[test]
    fn a_position_is_claimed_once() {
        let p = make_processor(make_world(Material::STONE), 20);
        let pos = BlockPos::new(1, 2, 3);
        assert!(p.claim(pos));
        assert!(!p.claim(pos));
        assert_eq!(p.processed_count(), 1);

        p.clear();
        assert!(p.claim(pos));
    }

    #[test]
    fn weak_power_is_ignored() {
        let p = make_processor(make_world(Material::STONE), 20);
        let out = run(&p, BlockPos::new(0, 64, 0), p.min_power() / 2.0);
        assert!(out.is_empty());
        assert_eq!(p.processed_count(), 0);
    }

    // -----------------------------------------------------------------------
    // Roof path
    // -----------------------------------------------------------------------

    #[test]
    fn roof_is_drilled_downward() {
        let p = make_processor(make_world(Material::STONE), 20);
        let surface = BlockPos::new(0, 64, 0);
        assert!(!p.is_wall(surface));

        let out = run(&p, surface, 0.8);
        assert!(!out.is_empty());
        let first = &out[0];
        assert_eq!(first.pos().y, 64);
        assert_eq!(first.material(), Some(Material::AIR), "the top layer always vanishes");
        assert!(first.applies_physics());

        for change in &out {
            let pos = change.pos();
            assert!(pos.y <= 64 && pos.y >= 64 - 21, "change at {} out of depth", pos);
            assert!(pos.x.abs() <= 4 && pos.z.abs() <= 4, "change at {} too far sideways", pos);
        }
    }

    #[test]
    fn repeated_column_never_rewrites_a_block() {
        let p = make_processor(make_world(Material::STONE), 20);
        let surface = BlockPos::new(7, 64, -7);

        let first: HashSet<BlockPos> = run(&p, surface, 0.6).iter().map(|c| c.pos()).collect();
        let second = run(&p, surface, 0.6);
        for change in &second {
            assert!(!first.contains(&change.pos()), "{} decided twice", change.pos());
        }
    }

    #[test]
    fn penetration_depth_is_seeded_and_bounded() {
        use shockwave_world::hash::position_rng;

        let p = make_processor(make_world(Material::STONE), 20);
        let pos = BlockPos::new(3, 64, 9);
        let a = p.max_penetration(0.7, &mut position_rng(pos));
        let b = p.max_penetration(0.7, &mut position_rng(pos));
        assert_eq!(a, b);
        assert!((1..=21).contains(&a), "depth {}", a);
    }

    #[test]
    fn indestructible_floor_is_left_alone() {
        let p = make_processor(make_world(Material::BEDROCK), 20);
        let out = run(&p, BlockPos::new(0, 64, 0), 1.0);
        assert!(out.is_empty(), "bedrock changed: {:?}", out);
    }

    #[test]
    fn air_gap_under_a_roof_is_jumped() {
        let world = make_world(Material::STONE);
        fill(&world, BlockPos::new(-12, 78, -12), BlockPos::new(12, 80, 12), Material::STONE);
        let p = make_processor(world, 20);

        let out = run(&p, BlockPos::new(0, 80, 0), 1.0);
        assert!(out.iter().any(|c| c.pos().y <= 64), "drill stopped at the gap");
        for change in &out {
            let y = change.pos().y;
            assert!(!(65..=77).contains(&y), "change at {} inside the gap", change.pos());
        }
    }

    #[test]
    fn jitter_onto_bedrock_falls_back_to_the_straight_column() {
        let world = make_world(Material::STONE);
        fill(&world, BlockPos::new(-6, 40, -6), BlockPos::new(6, 80, 6), Material::BEDROCK);
        fill(&world, BlockPos::new(0, 40, 0), BlockPos::new(0, 80, 0), Material::STONE);
        let p = make_processor(world, 20);

        let out = run(&p, BlockPos::new(0, 80, 0), 1.0);
        assert!(!out.is_empty());
        for (i, change) in out.iter().enumerate() {
            let pos = change.pos();
            assert_eq!((pos.x, pos.z), (0, 0), "{} is off the straight column", pos);
            assert_eq!(pos.y, 80 - i as i32, "straight column is drilled without gaps");
        }
    }

    #[test]
    fn sideways_search_finds_ground_beside_a_pit() {
        let tuning = PenetrationTuning {
            lateral_search_scale: 8.0,
            ..Default::default()
        };
        let columns: Vec<(i32, i32)> = (0..4).flat_map(|i| (0..2).map(move |j| (i * 20, j * 20))).collect();

        let build = || {
            let world = Arc::new(MemoryWorld::flat(0, 128, 5, Material::STONE));
            fill(&world, BlockPos::new(-10, 78, -10), BlockPos::new(70, 80, 30), Material::STONE);
            fill(&world, BlockPos::new(-10, 60, -10), BlockPos::new(70, 60, 30), Material::STONE);
            // A pit under every column, wider than the drill's jitter.
            for &(x, z) in &columns {
                fill(&world, BlockPos::new(x - 4, 60, z - 4), BlockPos::new(x + 4, 60, z + 4), Material::AIR);
            }
            world
        };
        let ledge_hits = |tuning: PenetrationTuning| {
            let p = make_tuned_processor(build(), 20, tuning);
            columns
                .iter()
                .flat_map(|&(x, z)| run(&p, BlockPos::new(x, 80, z), 1.0))
                .filter(|c| c.pos().y == 60)
                .count()
        };

        assert!(ledge_hits(tuning.clone()) > 0, "no sideways hit on the ledge");
        let without = PenetrationTuning {
            lateral_search_scale: 0.0,
            ..tuning
        };
        assert_eq!(ledge_hits(without), 0, "the ledge is out of reach of the straight drill");
    }

    #[test]
    fn roof_drilling_is_repeatable() {
        let build = || {
            let world = make_world(Material::STONE);
            fill(&world, BlockPos::new(-12, 78, -12), BlockPos::new(12, 80, 12), Material::STONE);
            make_processor(world, 20)
        };
        let surface = BlockPos::new(0, 80, 0);
        assert_eq!(run(&build(), surface, 0.9), run(&build(), surface, 0.9));
    }

    // -----------------------------------------------------------------------
    // Wall path
    // -----------------------------------------------------------------------

    #[test]
    fn exposed_pillar_is_stripped_as_a_wall() {
        let world = make_world(Material::STONE);
        for y in 65..=70 {
            world.place(BlockPos::new(0, y, 0), Material::STONE);
        }
        let p = make_processor(world, 10);
        let top = BlockPos::new(0, 70, 0);
        assert!(p.is_wall(top));

        let out = run(&p, top, 0.5);
        assert_eq!(out.len(), 6, "stops where the block is no longer exposed");
        assert_eq!(out[0], BlockChangeRequest::air(top).with_physics(true));
        for change in &out {
            let pos = change.pos();
            assert_eq!((pos.x, pos.z), (0, 0));
            assert!((65..=70).contains(&pos.y));
            let m = change.material();
            assert!(
                m == Some(Material::AIR) || m == Some(Material::COBBLED_DEEPSLATE),
                "unexpected {:?}",
                m
            );
        }
    }

    #[test]
    fn wall_block_beside_a_torch_gets_physics() {
        let world = make_world(Material::STONE);
        for y in 65..=70 {
            world.place(BlockPos::new(0, y, 0), Material::STONE);
        }
        world.place(BlockPos::new(1, 67, 0), Material::WALL_TORCH);
        let p = make_processor(world, 10);

        let out = run(&p, BlockPos::new(0, 70, 0), 0.5);
        let beside = out
            .iter()
            .find(|c| c.pos() == BlockPos::new(0, 67, 0))
            .expect("block beside the torch is stripped");
        assert!(beside.applies_physics(), "attached torch must be updated");
        let above = out
            .iter()
            .find(|c| c.pos() == BlockPos::new(0, 69, 0))
            .expect("block below the top is stripped");
        assert!(!above.applies_physics());
    }
}
