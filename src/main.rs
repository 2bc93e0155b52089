//! entsync - entity attribute synchronization runtime
//!
//! Headless demo host: spawns a handful of entities, churns their attributes
//! every tick and streams the resulting frames to an in-process observer that
//! mirrors them, then checks the mirror against the server.

mod config;

use anyhow::{Context, Result};
use bevy_ecs::system::{Query, Res, Resource};
use clap::Parser;
use config::ServerConfig;
use entsync_core::scoped_rng;
use entsync_ecs::{Synced, TickClock};
use entsync_entity::{
    EntityKind, EntityView, ItemView, LivingView, SchemaRegistry, VillagerView, ZombieView,
};
use entsync_net::EntityMirror;
use entsync_server::{OutboundFrames, SyncServer};
use glam::DVec3;
use rand::Rng;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Entity attribute synchronization demo host", long_about = None)]
struct Args {
    /// Path to the server configuration file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Number of ticks to run (overrides the config)
    #[arg(long)]
    ticks: Option<u64>,
    /// Seed for the attribute churn (overrides the config)
    #[arg(long)]
    seed: Option<u64>,
    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    write_config: bool,
}

#[derive(Resource)]
struct ChurnSeed(u64);

/// Gameplay stand-in: flips a few attributes per tick, reproducibly.
fn churn_attributes(clock: Res<TickClock>, seed: Res<ChurnSeed>, mut entities: Query<&mut Synced>) {
    let mut rng = scoped_rng(seed.0, clock.0);
    for mut entity in &mut entities {
        if rng.gen_bool(0.2) {
            if let Some(mut zombie) = entity.view::<ZombieView>() {
                let baby = zombie.is_baby();
                zombie.set_baby(!baby);
            }
        }
        if rng.gen_bool(0.1) {
            if let Some(mut living) = entity.view::<LivingView>() {
                living.set_health(rng.gen_range(1.0..20.0));
            }
        }
        if rng.gen_bool(0.05) {
            if let Some(mut view) = entity.view::<EntityView>() {
                let on_fire = view.is_on_fire();
                view.set_on_fire(!on_fire);
            }
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (mut config, load_error) = match ServerConfig::try_load_from_path(&args.config) {
        Ok(Some(config)) => (config, None),
        Ok(None) => (ServerConfig::default(), None),
        Err(err) => (ServerConfig::default(), Some(err)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .init();

    info!("Starting entsync v{}", env!("CARGO_PKG_VERSION"));
    if let Some(err) = load_error {
        warn!("{err:#}. Using defaults");
    }
    if let Some(ticks) = args.ticks {
        config.demo_ticks = ticks;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.write_config {
        config
            .save_to_path(&args.config)
            .with_context(|| format!("Failed to write {}", args.config.display()))?;
        info!("Wrote configuration to {}", args.config.display());
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(run(config))
}

async fn run(config: ServerConfig) -> Result<()> {
    let registry = SchemaRegistry::build().context("Entity schema table is inconsistent")?;
    let mut server = SyncServer::new(registry.clone(), config.view_distance_chunks);
    server.insert_resource(ChurnSeed(config.seed));
    server.add_systems(churn_attributes);
    spawn_demo_entities(&mut server, config.demo_zombies);

    let changes = Arc::new(AtomicUsize::new(0));
    {
        let changes = changes.clone();
        server.on_metadata_changed(None, move |event| {
            changes.fetch_add(event.indices.len(), Ordering::Relaxed);
            debug!(entity = event.entity, kind = %event.kind, indices = ?event.indices, "metadata changed");
        });
    }

    let (observer, frames) = server.connect_observer((0, 0));
    let worker = tokio::spawn(mirror_frames(registry, frames));

    let period = Duration::from_secs_f64(1.0 / f64::from(config.tick_rate_hz.max(1)));
    let mut interval = tokio::time::interval(period);
    let mut frames_sent = 0;
    for _ in 0..config.demo_ticks {
        interval.tick().await;
        frames_sent += server.tick().frames_sent;
    }

    server.disconnect_observer(observer);
    let mirror = worker.await.context("Network worker panicked")?;
    info!(
        ticks = config.demo_ticks,
        frames_sent,
        attribute_changes = changes.load(Ordering::Relaxed),
        rejected = mirror.rejected(),
        "Demo finished"
    );

    let mut diverged = 0;
    for id in server.entity_ids() {
        let (Some(live), Some(mirrored)) = (server.entity(id), mirror.entity(id)) else {
            continue;
        };
        let mirrored: Vec<_> = mirrored.values().map(|(i, v)| (i, v.clone())).collect();
        if mirrored != live.store().snapshot() {
            warn!(entity = id, "Observer mirror diverged from server");
            diverged += 1;
        }
    }
    if diverged == 0 {
        info!("Observer mirror matches the server for every entity");
    }
    Ok(())
}

fn spawn_demo_entities(server: &mut SyncServer, zombies: u32) {
    for i in 0..zombies {
        let id = server.spawn(
            EntityKind::Zombie,
            DVec3::new(f64::from(i) * 6.0, 64.0, 0.0),
        );
        server.with_entity(id, |zombie| {
            if let Some(mut view) = zombie.view::<ZombieView>() {
                view.set_health(20.0);
                view.set_left_handed(i % 2 == 1);
            }
        });
    }

    let villager = server.spawn(EntityKind::Villager, DVec3::new(-8.0, 64.0, 4.0));
    server.with_entity(villager, |villager| {
        if let Some(mut view) = villager.view::<VillagerView>() {
            view.set_head_shake_timer(20);
        }
    });

    let item = server.spawn(EntityKind::Item, DVec3::new(2.0, 65.0, -3.0));
    server.with_entity(item, |item| {
        if let Some(mut view) = item.view::<ItemView>() {
            view.set_item(Some(entsync_metadata::ItemStack::new(1, 16)));
            view.set_no_gravity(true);
        }
    });
}

async fn mirror_frames(registry: SchemaRegistry, mut frames: OutboundFrames) -> EntityMirror {
    let mut mirror = EntityMirror::new(registry);
    while let Some(frame) = frames.recv().await {
        // Malformed frames are logged by the mirror and dropped.
        let _ = mirror.receive(&frame);
    }
    debug!(tracked = mirror.tracked().count(), "Observer stream closed");
    mirror
}
