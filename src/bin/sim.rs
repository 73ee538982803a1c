//! shockwave-sim binary
//!
//! Builds an in-memory world (layered terrain, a few trees and houses,
//! scattered entities), detonates once, and prints the explosion report and
//! engine stats as JSON.  Ctrl-C cancels the running explosion.
//!
//! ## Configuration (flags / env)
//!
//! | Flag / env                  | Default | Description                            |
//! |-----------------------------|---------|----------------------------------------|
//! | `--config` `SHOCKWAVE_CONFIG` | –     | TOML file layered under `SHOCKWAVE__*` |
//! | `--blast-power`             | `0.1`   | Sizes crater and shockwave             |
//! | `--ground-y`                | `64`    | Grass surface height                   |
//! | `--radius`                  | –       | Override the shockwave radius          |
//! | `--height`                  | –       | Override the shockwave height          |
//! | `--no-crater`               | off     | Skip the crater                        |
//! | `--trees` / `--entities`    | `24/16` | Scene population                       |
//! | `--seed`                    | `42`    | Scene layout seed                      |

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use shockwave_world::host::{EntityKind, EventSink, WorldBinding, WorldId};
use shockwave_world::{
    BlockPos, DetonationRequest, EngineConfig, ExplosionService, Material, MemoryWorld,
    MutationContext, Vec3, WorldRegistry,
};
use std::path::PathBuf;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "shockwave-sim", about = "Shockwave World simulation harness", version)]
struct Args {
    /// Engine configuration file (TOML)
    #[arg(long, env = "SHOCKWAVE_CONFIG")]
    config: Option<PathBuf>,

    /// Blast power; crater and shockwave sizes derive from it
    #[arg(long, default_value_t = 0.1)]
    blast_power: f64,

    /// Grass surface height of the generated terrain
    #[arg(long, default_value_t = 64)]
    ground_y: i32,

    /// Shockwave radius override
    #[arg(long)]
    radius: Option<i32>,

    /// Shockwave height override
    #[arg(long)]
    height: Option<i32>,

    /// Detonate without carving a crater
    #[arg(long, default_value_t = false)]
    no_crater: bool,

    /// Trees scattered around ground zero
    #[arg(long, default_value_t = 24)]
    trees: usize,

    /// Entities scattered around ground zero
    #[arg(long, default_value_t = 16)]
    entities: usize,

    /// Scene layout seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

fn plant_tree(world: &MemoryWorld, base: BlockPos, height: i32) {
    for dy in 0..height {
        world.place(base.offset(0, dy, 0), Material::OAK_LOG);
    }
    let crown = base.offset(0, height, 0);
    for dx in -2..=2 {
        for dz in -2..=2 {
            for dy in -1..=1 {
                if dx == 0 && dz == 0 && dy < 1 {
                    continue;
                }
                world.place(crown.offset(dx, dy, dz), Material::OAK_LEAVES);
            }
        }
    }
}

fn build_house(world: &MemoryWorld, corner: BlockPos) {
    for dx in 0..7 {
        for dz in 0..7 {
            let edge = dx == 0 || dz == 0 || dx == 6 || dz == 6;
            for dy in 0..4 {
                if edge {
                    world.place(corner.offset(dx, dy, dz), Material::STONE_BRICKS);
                }
            }
            world.place(corner.offset(dx, 4, dz), Material::OAK_SLAB);
        }
    }
    world.place(corner.offset(3, 1, 0), Material::AIR);
    world.place(corner.offset(3, 2, 0), Material::GLASS_PANE);
    world.place(corner.offset(1, 2, 1), Material::WALL_TORCH);
}

fn populate(world: &MemoryWorld, args: &Args, reach: i32) {
    let mut rng = SmallRng::seed_from_u64(args.seed);
    let surface = args.ground_y + 1;
    for _ in 0..args.trees {
        let (x, z) = (rng.gen_range(-reach..=reach), rng.gen_range(-reach..=reach));
        plant_tree(world, BlockPos::new(x, surface, z), rng.gen_range(4..=7));
    }
    for i in 0..4 {
        let (x, z) = (rng.gen_range(-reach..=reach), rng.gen_range(-reach..=reach));
        build_house(world, BlockPos::new(x, surface, z));
        log::debug!("House {} at ({}, {})", i, x, z);
    }
    for i in 0..args.entities {
        let kind = if i % 4 == 0 { EntityKind::Player } else { EntityKind::Living };
        let (x, z) = (rng.gen_range(-reach..=reach), rng.gen_range(-reach..=reach));
        world.spawn_entity(kind, Vec3::new(x as f64 + 0.5, surface as f64, z as f64 + 0.5));
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("shockwave_world=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = EngineConfig::load(args.config.as_deref()).context("loading engine configuration")?;

    let mut request = DetonationRequest::from_blast_power(BlockPos::new(0, args.ground_y, 0), args.blast_power);
    if let Some(radius) = args.radius {
        request.shockwave_radius = radius;
    }
    if let Some(height) = args.height {
        request.shockwave_height = height;
    }
    if args.no_crater {
        request.crater_radius = 0;
    }

    log::info!(
        "Starting shockwave-sim (blast_power={}, radius={}, height={}, crater={})",
        args.blast_power,
        request.shockwave_radius,
        request.shockwave_height,
        request.crater_radius,
    );

    let world = Arc::new(MemoryWorld::layered(-64, 320, args.ground_y));
    populate(&world, &args, request.shockwave_radius.max(16));

    let context = MutationContext::dedicated("shockwave-mutation").context("starting mutation context")?;
    let registry = Arc::new(WorldRegistry::new(config, context).context("building world registry")?);
    let world_id = WorldId::new("sim");
    registry.register(WorldBinding::from_host(world_id.clone(), world.clone()));

    let events: Arc<dyn EventSink> = world.clone();
    let service = ExplosionService::new(registry.clone()).with_events(events);
    let handle = service.detonate(&world_id, request).context("detonating")?;

    let report = tokio::select! {
        report = handle.finished() => report?,
        _ = tokio::signal::ctrl_c() => {
            log::warn!("Interrupted, cancelling explosion {}", handle.id());
            handle.cancel();
            handle.finished().await?
        }
    };

    let queue = registry.get(&world_id)?.queue.clone();
    queue.flush().await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    println!("{}", serde_json::to_string_pretty(&service.stats())?);
    log::info!(
        "{} blocks written, {} events published",
        world.material_writes(),
        world.published_events().len()
    );

    registry.shutdown_all().await;
    Ok(())
}
