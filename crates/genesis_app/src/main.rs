//! # genesis_app
//!
//! Seeds a world through every creation path (direct, prototype
//! instantiation, encoded records and command buffers submitted from a
//! task), then runs the demo systems on the tick loop.

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec3;
use tracing::info;
use tracing_subscriber::EnvFilter;

use genesis_app::components::{Lifetime, Name, Position, Prototype, Velocity};
use genesis_app::systems;
use genesis_app::tick::{TickConfig, TickLoop};
use genesis_world::{CommandBuffer, World};

#[derive(Debug, Parser)]
#[command(name = "genesis_app", about = "Run the genesis ECS demo simulation")]
struct Args {
    /// Target ticks per second
    #[arg(long, default_value_t = 60.0)]
    tick_rate: f64,

    /// Ticks to run before exiting (0 = until Ctrl-C)
    #[arg(long, default_value_t = 300)]
    max_ticks: u64,

    /// Copies of the prototype created at startup
    #[arg(short, long, default_value_t = 256)]
    count: usize,

    /// Spawn one copy of each prototype every N ticks
    #[arg(long, default_value_t = 30)]
    spawn_every: u64,

    /// Seconds each spawned entity lives
    #[arg(long, default_value_t = 2.0)]
    lifetime: f32,

    /// Log directive added on top of RUST_LOG
    #[arg(long, default_value = "genesis_app=info")]
    log: String,
}

impl From<&Args> for TickConfig {
    fn from(args: &Args) -> Self {
        Self {
            tick_rate: args.tick_rate,
            max_ticks: args.max_ticks,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(args.log.parse()?))
        .init();

    let config = TickConfig::from(&args);
    config.validate().context("invalid --tick-rate")?;

    info!(?args, "genesis starting");

    let mut tick_loop = TickLoop::new(config);
    systems::register_defaults(tick_loop.registry_mut(), args.spawn_every);
    seed(tick_loop.world_mut(), &args)?;

    // An outside producer: records on its own task, submits, and the loop
    // applies the buffer at the start of the next tick.
    let submitter = tick_loop.submitter();
    tokio::spawn(async move {
        let mut buffer = CommandBuffer::new();
        let beacon = buffer.create_entity()?;
        buffer.add_component(beacon, Name("beacon".into()))?;
        buffer.add_component(beacon, Position(Vec3::new(0.0, 10.0, 0.0)))?;
        submitter.submit(buffer)
    })
    .await??;

    info!(
        entities = tick_loop.world().entity_count(),
        archetypes = tick_loop.world().archetype_count(),
        systems = tick_loop.registry().len(),
        "world seeded"
    );

    tokio::select! {
        () = tick_loop.run_async() => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("interrupted");
        }
    }

    let world = tick_loop.world();
    info!(
        ticks = tick_loop.tick_id(),
        entities = world.entity_count(),
        archetypes = world.archetype_count(),
        "genesis shut down"
    );
    Ok(())
}

/// Build the prototype, its initial copies and a record-built replica.
fn seed(world: &mut World, args: &Args) -> Result<()> {
    let template = world.create();
    world.add_component(template, Position(Vec3::ZERO))?;
    world.add_component(template, Velocity(Vec3::new(1.0, 0.5, 0.0)))?;
    world.add_component(template, Lifetime {
        remaining: args.lifetime,
    })?;

    // Copies are taken before the template is tagged, so they are simulated.
    let copies = world.instantiate(template, args.count)?;
    let records = world.snapshot(template)?;
    world.add_component(template, Prototype)?;

    let replica = world.spawn_from_records(&records)?;
    world.insert_component(replica, Name("replica".into()))?;

    info!(
        %template,
        copies = copies.len(),
        %replica,
        "seeded world"
    );
    Ok(())
}
