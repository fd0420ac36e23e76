//! # Skirmish Server
//!
//! Headless demo host for the Skirmish simulation core.
//!
//! Builds a sandbox encounter and runs the fixed-tick loop:
//! - AI engine decisions, movement and NPC fire
//! - Projectile integration and splash damage
//! - Death routing from the event bus back into the AI engine
//!
//! Usage: `skirmish [config.toml] [seconds]`

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod scenario;
mod timing;

use std::sync::Arc;

use anyhow::Result;
use glam::Vec3;
use skirmish_common::{EntityId, ShutdownSignal};
use skirmish_sim::{
    AiEngine, Armory, EntityRegistry, EventBus, FireOutcome, GroundSampler, ProjectileEngine, Shard, SimConfig, SimEvent,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::scenario::{Scenario, ROCKET};
use crate::timing::TickClock;

/// Simulation step.
const TICK_MS: u64 = 50;

/// Player fires a rocket this often.
const PLAYER_FIRE_INTERVAL_MS: u64 = 2000;

/// Main entry point.
fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("skirmish=info".parse()?))
        .init();

    info!("Skirmish server starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "skirmish.toml".to_string());
    let run_secs: u64 = match args.next() {
        Some(s) => s.parse()?,
        None => 30,
    };
    let config = SimConfig::load_from(&config_path);

    let bus = EventBus::new(4096);
    let projectiles = Arc::new(ProjectileEngine::new(config.projectiles.clone()).with_events(bus.sender()));
    let ai = AiEngine::new(&config, Arc::clone(&projectiles)).with_events(bus.sender());
    let scenario = scenario::build(&config, &bus, &ai, 8, 0x5EED)?;

    run(&scenario, &ai, &projectiles, &bus, run_secs * 1000);

    info!("Skirmish server shutdown complete");
    Ok(())
}

/// Runs the fixed-tick loop for `duration_ms` of simulated time.
fn run(scenario: &Scenario, ai: &AiEngine, projectiles: &ProjectileEngine, bus: &EventBus, duration_ms: u64) {
    let shutdown = ShutdownSignal::new();
    let mut clock = TickClock::new(TICK_MS);
    let mut last_player_shot = 0;
    let mut kills = 0u32;

    while !shutdown.is_triggered() {
        for _ in 0..clock.due_steps() {
            let now = scenario.shard.advance_time(TICK_MS);
            move_player(scenario, now);
            if now >= last_player_shot + PLAYER_FIRE_INTERVAL_MS {
                last_player_shot = now;
                player_fire(scenario, projectiles);
            }

            ai.tick(TICK_MS as f64, now, &shutdown);
            projectiles.tick(TICK_MS as f64, now, &shutdown);
            kills += route_events(scenario, ai, bus);

            if now >= duration_ms {
                shutdown.trigger();
                break;
            }
        }
        clock.wait();
    }

    info!(
        "Simulated {} ms: {} kills, {} NPCs tracked, {} projectiles in flight, {} steps dropped",
        scenario.shard.current_time_ms(),
        kills,
        ai.npc_count(),
        projectiles.in_flight_count(),
        clock.dropped()
    );
}

/// Walks the player around a slow circle.
fn move_player(scenario: &Scenario, now: u64) {
    let angle = now as f32 / 20_000.0 * std::f32::consts::TAU;
    let mut position = Vec3::new(angle.cos() * 15.0, angle.sin() * 15.0, 0.0);
    position.z = scenario.shard.sample_ground_height(position).unwrap_or(0.0);
    scenario.player.write().position = position;
}

/// Fires a rocket at the nearest living NPC.
fn player_fire(scenario: &Scenario, projectiles: &ProjectileEngine) {
    let player = scenario.player.read().clone();
    if !player.is_alive() {
        return;
    }

    let nearest = scenario
        .shard
        .characters()
        .into_iter()
        .filter_map(|handle| {
            let c = handle.read();
            (!c.player_controlled && c.is_alive())
                .then(|| (c.position + Vec3::Z * c.collision_height * 0.5, player.position.distance(c.position)))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1));
    let Some((aim_point, _)) = nearest else {
        return;
    };

    let origin = player.position + Vec3::Z * player.collision_height * 0.7;
    let ammo = scenario.shard.ammo(ROCKET);
    match projectiles.fire_projectile(&player, 0, origin, aim_point - origin, ammo.as_ref()) {
        Ok(FireOutcome::InFlight) => debug!("Player rocket away"),
        Ok(FireOutcome::Resolved(result)) => debug!("Player shot resolved: {:?}", result.direct),
        Err(e) => warn!("Player fire failed: {e}"),
    }
}

/// Feeds kills back into the AI engine; revives the player on death. Returns NPC kills.
fn route_events(scenario: &Scenario, ai: &AiEngine, bus: &EventBus) -> u32 {
    let mut kills = 0;
    for event in bus.drain() {
        match event {
            SimEvent::CharacterKilled { entity_id, source } => {
                on_killed(scenario, ai, entity_id, source, &mut kills);
            },
            SimEvent::SpawnFailed { monster_type, reason } => {
                warn!("Spawn of {} failed: {}", monster_type, reason);
            },
            other => debug!("{other:?}"),
        }
    }
    kills
}

fn on_killed(scenario: &Scenario, ai: &AiEngine, entity_id: EntityId, source: Option<EntityId>, kills: &mut u32) {
    let Some(handle) = scenario.shard.character(entity_id) else {
        return;
    };
    let player_controlled = handle.read().player_controlled;
    if player_controlled {
        let mut player = handle.write();
        player.health = player.max_health;
        info!("Player {} killed by {:?}, revived", entity_id, source);
    } else {
        *kills += 1;
        ai.on_npc_death(&handle);
    }
}
