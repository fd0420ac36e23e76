//! Demo encounter: rolling terrain, a ring of hostile NPCs and one player.

use std::sync::Arc;

use glam::Vec3;
use skirmish_common::{AmmoId, DamageType, EntityId, FactionId, MonsterTypeId, WeaponId};
use skirmish_sim::{
    AiEngine, AmmoStats, Character, EntityRegistry, EventBus, GroundSampler, HostileFactions, HostileRoster,
    MonsterRecord, MonsterTemplate, NpcProfile, SandboxShard, SharedCharacter, SimConfig, WeaponStats,
};
use tracing::info;

/// Rifle carried by every demo character.
pub const RIFLE: WeaponId = WeaponId::new(1);

/// Slow splash round used by the player.
pub const ROCKET: AmmoId = AmmoId::new(10);

/// Hitscan round used by NPCs.
pub const BULLET: AmmoId = AmmoId::new(11);

const NEUTRAL_CRITTER: MonsterTypeId = MonsterTypeId::new(90);

/// Gentle hills with a bottomless crater south-east of the origin.
pub fn terrain(position: Vec3) -> Option<f32> {
    let crater = Vec3::new(24.0, -24.0, 0.0);
    if position.truncate().distance(crater.truncate()) < 6.0 {
        return None;
    }
    Some((position.x * 0.05).sin() * 2.0 + (position.y * 0.07).cos() * 1.5)
}

/// A populated demo world.
pub struct Scenario {
    /// Shared shard
    pub shard: Arc<SandboxShard>,
    /// Player character
    pub player: SharedCharacter,
}

fn monster_templates(hostile: FactionId) -> Vec<MonsterTemplate> {
    let grunt = NpcProfile {
        attack_range: 25.0,
        aggro_radius: 35.0,
        leash_radius: 60.0,
        normal_speed: 4.0,
        fast_speed: 7.0,
        attack_interval_ms: 1500,
        damage: 8,
        aim_inaccuracy: 0.05,
        ammo: Some(BULLET),
        respawn_delay_ms: 10_000,
    };
    let brute = NpcProfile {
        attack_range: 12.0,
        fast_speed: 5.0,
        damage: 20,
        attack_interval_ms: 2500,
        ..grunt
    };

    vec![
        MonsterTemplate {
            record: MonsterRecord {
                id: MonsterTypeId::new(356),
                faction: hostile,
                chassis_id: 1,
            },
            profile: grunt,
            max_health: 120,
            collision_height: 2.0,
            weapon: Some(RIFLE),
        },
        MonsterTemplate {
            record: MonsterRecord {
                id: MonsterTypeId::new(357),
                faction: hostile,
                chassis_id: 2,
            },
            profile: brute,
            max_health: 300,
            collision_height: 2.6,
            weapon: Some(RIFLE),
        },
        MonsterTemplate {
            record: MonsterRecord {
                id: NEUTRAL_CRITTER,
                faction: FactionId::NEUTRAL,
                chassis_id: 3,
            },
            profile: NpcProfile::default(),
            max_health: 40,
            collision_height: 1.0,
            weapon: None,
        },
    ]
}

/// Builds the shard, spawns `npc_count` hostile NPCs plus a neutral critter and registers them.
pub fn build(config: &SimConfig, bus: &EventBus, ai: &AiEngine, npc_count: usize, seed: u64) -> anyhow::Result<Scenario> {
    let shard = SandboxShard::new(terrain)
        .with_events(bus.sender())
        .with_nav_grid(Vec3::ZERO, &config.nav);

    let hostile_faction = config.factions.hostile.first().copied().unwrap_or(FactionId::new(2));
    for template in monster_templates(hostile_faction) {
        shard.add_template(template);
    }
    shard.add_weapon(
        RIFLE,
        WeaponStats {
            range: 80.0,
            damage_per_round: 35,
            headshot_mult: 2.0,
        },
    );
    shard.add_ammo(
        ROCKET,
        AmmoStats::default()
            .with_speed(60.0)
            .with_gravity(4.0)
            .with_splash(5.0, 0.25)
            .with_damage_type(DamageType(2)),
    );
    shard.add_ammo(BULLET, AmmoStats::default().with_damage_type(DamageType(1)));

    let roster = HostileRoster::build(
        &shard.monster_records(),
        &HostileFactions::from(&config.factions),
        config.factions.fallback_monster_type,
    );

    let shard = Arc::new(shard);
    ai.init(shard.clone());

    let mut rng = fastrand::Rng::with_seed(seed);
    for i in 0..npc_count {
        let angle = i as f32 / npc_count.max(1) as f32 * std::f32::consts::TAU;
        let mut position = Vec3::new(angle.cos() * 40.0, angle.sin() * 40.0, 0.0);
        position.z = shard.sample_ground_height(position).unwrap_or(0.0);
        let npc = shard.spawn_character(roster.pick(&mut rng), position, None)?;
        ai.register_npc(&npc);
    }
    let critter = shard.spawn_character(NEUTRAL_CRITTER, Vec3::new(-5.0, 5.0, 0.0), None)?;
    ai.register_npc(&critter);

    let start = Vec3::new(0.0, 0.0, terrain(Vec3::ZERO).unwrap_or(0.0));
    let player = shard.add_player(
        Character::player(EntityId::new(), start)
            .with_health(500, 500)
            .with_weapon(RIFLE),
    );

    info!(
        "Scenario ready: {} NPCs, roster {:?}, player {}",
        ai.npc_count(),
        roster.types(),
        player.read().id
    );
    Ok(Scenario { shard, player })
}
