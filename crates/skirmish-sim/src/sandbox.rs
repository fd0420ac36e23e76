//! In-memory shard.
//!
//! Implements every collaborator trait over plain maps so the engines can run
//! without a game server: characters are vertical cylinders, terrain is a
//! height function, and every broadcast, damage event and flush is recorded
//! for inspection.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use ahash::RandomState;
use crossbeam_channel::Sender;
use dashmap::DashMap;
use glam::Vec3;
use parking_lot::{Mutex, RwLock};
use skirmish_common::{AmmoId, EntityId, MonsterTypeId, SimError, SimResult, WeaponId};
use tracing::debug;

use crate::config::NavConfig;
use crate::events::{publish, SimEvent};
use crate::faction::MonsterRecord;
use crate::nav::NavGrid;
use crate::world::{
    share, AmmoStats, Armory, Character, DamageEvent, EntityRegistry, GroundSampler, NpcProfile,
    Observers, PhysicsQuery, PoseUpdate, RayHit, Shard, SharedCharacter, WeaponStats,
};

/// Ray marching step.
const RAY_STEP: f32 = 0.05;

/// Horizontal radius of a character's collision cylinder.
pub const CHARACTER_RADIUS: f32 = 0.5;

type Ground = Box<dyn Fn(Vec3) -> Option<f32> + Send + Sync>;

/// Spawn data for a monster archetype.
#[derive(Debug, Clone, PartialEq)]
pub struct MonsterTemplate {
    /// Archetype record
    pub record: MonsterRecord,
    /// Combat tuning
    pub profile: NpcProfile,
    /// Health on spawn
    pub max_health: i32,
    /// Collision height
    pub collision_height: f32,
    /// Equipped weapon
    pub weapon: Option<WeaponId>,
}

/// Shard backed by in-memory maps.
pub struct SandboxShard {
    entities: DashMap<EntityId, SharedCharacter, RandomState>,
    ground: Ground,
    templates: DashMap<MonsterTypeId, MonsterTemplate, RandomState>,
    weapons: DashMap<WeaponId, WeaponStats, RandomState>,
    ammo: DashMap<AmmoId, AmmoStats, RandomState>,
    clients: RwLock<Vec<EntityId>>,
    nav: Option<NavGrid>,
    clock: AtomicU64,
    fail_spawns: AtomicBool,
    events: Option<Sender<SimEvent>>,
    broadcasts: Mutex<Vec<PoseUpdate>>,
    damage_log: Mutex<Vec<(EntityId, DamageEvent)>>,
    flushes: Mutex<Vec<EntityId>>,
    removed: Mutex<Vec<EntityId>>,
}

impl SandboxShard {
    /// Creates a shard over the given terrain.
    pub fn new(ground: impl Fn(Vec3) -> Option<f32> + Send + Sync + 'static) -> Self {
        Self {
            entities: DashMap::with_hasher(RandomState::new()),
            ground: Box::new(ground),
            templates: DashMap::with_hasher(RandomState::new()),
            weapons: DashMap::with_hasher(RandomState::new()),
            ammo: DashMap::with_hasher(RandomState::new()),
            clients: RwLock::new(Vec::new()),
            nav: None,
            clock: AtomicU64::new(0),
            fail_spawns: AtomicBool::new(false),
            events: None,
            broadcasts: Mutex::new(Vec::new()),
            damage_log: Mutex::new(Vec::new()),
            flushes: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
        }
    }

    /// Creates a shard with flat ground at `height`.
    #[must_use]
    pub fn flat(height: f32) -> Self {
        Self::new(move |_| Some(height))
    }

    /// Publish kill events to `sender`.
    #[must_use]
    pub fn with_events(mut self, sender: Sender<SimEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Builds the navigation grid for the area around `center`.
    #[must_use]
    pub fn with_nav_grid(mut self, center: Vec3, config: &NavConfig) -> Self {
        let grid = NavGrid::build(&self, center, config.build_radius, config.cell_size, config.max_step_height);
        self.nav = Some(grid);
        self
    }

    // === Setup ===

    /// Inserts a character.
    pub fn insert(&self, character: Character) -> SharedCharacter {
        let id = character.id;
        let handle = share(character);
        self.entities.insert(id, Arc::clone(&handle));
        handle
    }

    /// Inserts a player character and marks its client as playing.
    pub fn add_player(&self, character: Character) -> SharedCharacter {
        let id = character.id;
        let handle = self.insert(Character {
            player_controlled: true,
            ..character
        });
        self.clients.write().push(id);
        handle
    }

    /// Takes a client out of the playing state.
    pub fn disconnect(&self, id: EntityId) {
        self.clients.write().retain(|&c| c != id);
    }

    /// Registers a monster archetype.
    pub fn add_template(&self, template: MonsterTemplate) {
        self.templates.insert(template.record.id, template);
    }

    /// Registers weapon stats.
    pub fn add_weapon(&self, id: WeaponId, stats: WeaponStats) {
        self.weapons.insert(id, stats);
    }

    /// Registers an ammo descriptor.
    pub fn add_ammo(&self, id: AmmoId, stats: AmmoStats) {
        self.ammo.insert(id, stats);
    }

    /// Monster records of every registered archetype.
    #[must_use]
    pub fn monster_records(&self) -> Vec<MonsterRecord> {
        self.templates.iter().map(|t| t.record).collect()
    }

    /// Makes every subsequent spawn fail.
    pub fn set_spawn_failure(&self, fail: bool) {
        self.fail_spawns.store(fail, Ordering::Relaxed);
    }

    // === Clock ===

    /// Sets the shard clock.
    pub fn set_time(&self, time_ms: u64) {
        self.clock.store(time_ms, Ordering::Relaxed);
    }

    /// Advances the shard clock, returning the new time.
    pub fn advance_time(&self, delta_ms: u64) -> u64 {
        self.clock.fetch_add(delta_ms, Ordering::Relaxed) + delta_ms
    }

    // === Inspection ===

    /// Whether the entity exists.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Number of entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// All character handles.
    #[must_use]
    pub fn characters(&self) -> Vec<SharedCharacter> {
        self.entities.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Pose broadcasts so far.
    #[must_use]
    pub fn broadcasts(&self) -> Vec<PoseUpdate> {
        self.broadcasts.lock().clone()
    }

    /// Damage applied so far, with targets.
    #[must_use]
    pub fn damage_log(&self) -> Vec<(EntityId, DamageEvent)> {
        self.damage_log.lock().clone()
    }

    /// Change flushes so far.
    #[must_use]
    pub fn flushes(&self) -> Vec<EntityId> {
        self.flushes.lock().clone()
    }

    /// Entities removed so far.
    #[must_use]
    pub fn removed(&self) -> Vec<EntityId> {
        self.removed.lock().clone()
    }

    /// Forgets recorded broadcasts, damage, flushes and removals.
    pub fn clear_logs(&self) {
        self.broadcasts.lock().clear();
        self.damage_log.lock().clear();
        self.flushes.lock().clear();
        self.removed.lock().clear();
    }

    fn entity_at(&self, point: Vec3, ignore: EntityId) -> Option<EntityId> {
        self.entities.iter().find_map(|entry| {
            if *entry.key() == ignore {
                return None;
            }
            let c = entry.value().read();
            let horizontal = (point.x - c.position.x).hypot(point.y - c.position.y);
            let inside = horizontal <= CHARACTER_RADIUS
                && point.z >= c.position.z
                && point.z <= c.position.z + c.collision_height;
            inside.then_some(c.id)
        })
    }
}

impl std::fmt::Debug for SandboxShard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxShard")
            .field("entities", &self.entities.len())
            .field("templates", &self.templates.len())
            .field("clients", &self.clients.read().len())
            .field("time_ms", &self.clock.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Collaborator implementations
// ============================================================================

impl EntityRegistry for SandboxShard {
    fn character(&self, id: EntityId) -> Option<SharedCharacter> {
        self.entities.get(&id).map(|e| Arc::clone(e.value()))
    }

    fn remove(&self, id: EntityId) {
        if self.entities.remove(&id).is_some() {
            self.clients.write().retain(|&c| c != id);
            self.removed.lock().push(id);
        }
    }

    fn spawn_character(
        &self,
        monster_type: MonsterTypeId,
        position: Vec3,
        owner: Option<EntityId>,
    ) -> SimResult<SharedCharacter> {
        if self.fail_spawns.load(Ordering::Relaxed) {
            return Err(SimError::SpawnFailed {
                monster_type,
                reason: "entity manager exhausted".to_string(),
            });
        }
        let template = self
            .templates
            .get(&monster_type)
            .map(|t| t.value().clone())
            .ok_or_else(|| SimError::SpawnFailed {
                monster_type,
                reason: "unknown monster type".to_string(),
            })?;

        let mut character = Character::npc(EntityId::new(), monster_type, template.record.faction, position)
            .with_profile(template.profile)
            .with_health(template.max_health, template.max_health)
            .with_collision_height(template.collision_height);
        character.weapon = template.weapon;
        character.owner = owner;

        debug!("Spawned {} (type {}) at {:?}", character.id, monster_type, position);
        Ok(self.insert(character))
    }

    fn apply_damage(&self, target: EntityId, damage: DamageEvent) {
        let Some(handle) = self.character(target) else {
            return;
        };
        let killed = {
            let mut c = handle.write();
            let was_alive = c.is_alive();
            c.health -= damage.amount;
            was_alive && !c.is_alive()
        };
        self.damage_log.lock().push((target, damage));

        if killed {
            publish(
                self.events.as_ref(),
                SimEvent::CharacterKilled {
                    entity_id: target,
                    source: damage.source.is_valid().then_some(damage.source),
                },
            );
        }
    }

    fn apply_healing(&self, target: EntityId, amount: i32) {
        if let Some(handle) = self.character(target) {
            let mut c = handle.write();
            c.health = (c.health + amount).min(c.max_health);
        }
    }

    fn flush_changes(&self, id: EntityId) {
        self.flushes.lock().push(id);
    }
}

impl GroundSampler for SandboxShard {
    fn sample_ground_height(&self, position: Vec3) -> Option<f32> {
        (self.ground)(position)
    }
}

impl PhysicsQuery for SandboxShard {
    fn ray_cast(&self, origin: Vec3, direction: Vec3, ignore: EntityId, _trace: u32, max_distance: f32) -> RayHit {
        let direction = direction.normalize_or_zero();
        if direction == Vec3::ZERO || max_distance <= 0.0 {
            return RayHit::MISS;
        }

        let steps = (max_distance / RAY_STEP).ceil() as usize;
        for i in 0..=steps {
            let t = (i as f32 * RAY_STEP).min(max_distance);
            let point = origin + direction * t;

            if let Some(id) = self.entity_at(point, ignore) {
                return RayHit::entity(id, point);
            }
            if self.sample_ground_height(point).is_some_and(|h| point.z < h) {
                return RayHit::terrain(point);
            }
        }
        RayHit::MISS
    }

    fn entities_in_radius(&self, center: Vec3, radius: f32, exclude: EntityId) -> Vec<(EntityId, f32)> {
        self.entities
            .iter()
            .filter(|e| *e.key() != exclude)
            .filter_map(|e| {
                let distance = e.value().read().position.distance(center);
                (distance <= radius).then_some((*e.key(), distance))
            })
            .collect()
    }
}

impl Observers for SandboxShard {
    fn playing_characters(&self) -> Vec<SharedCharacter> {
        self.clients
            .read()
            .iter()
            .filter_map(|&id| self.character(id))
            .collect()
    }

    fn broadcast_pose(&self, pose: PoseUpdate) {
        if !self.clients.read().is_empty() {
            self.broadcasts.lock().push(pose);
        }
    }

    fn short_time(&self) -> u16 {
        (self.clock.load(Ordering::Relaxed) & 0xFFFF) as u16
    }
}

impl Armory for SandboxShard {
    fn equipped_weapon(&self, character: &Character) -> Option<WeaponStats> {
        character
            .weapon
            .and_then(|id| self.weapons.get(&id).map(|w| *w.value()))
    }

    fn ammo(&self, id: AmmoId) -> Option<AmmoStats> {
        self.ammo.get(&id).map(|a| *a.value())
    }
}

impl Shard for SandboxShard {
    fn entities(&self) -> &dyn EntityRegistry {
        self
    }

    fn physics(&self) -> &dyn PhysicsQuery {
        self
    }

    fn observers(&self) -> &dyn Observers {
        self
    }

    fn armory(&self) -> &dyn Armory {
        self
    }

    fn nav_grid(&self) -> Option<&NavGrid> {
        self.nav.as_ref()
    }

    fn current_time_ms(&self) -> u64 {
        self.clock.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::world::DamageFlags;
    use skirmish_common::{DamageType, FactionId};

    fn template(id: u32) -> MonsterTemplate {
        MonsterTemplate {
            record: MonsterRecord {
                id: MonsterTypeId::new(id),
                faction: FactionId::new(2),
                chassis_id: 1,
            },
            profile: NpcProfile::default(),
            max_health: 250,
            collision_height: 2.2,
            weapon: None,
        }
    }

    #[test]
    fn test_ray_hits_character_before_terrain() {
        let shard = SandboxShard::flat(0.0);
        let target = shard.insert(Character::player(EntityId::new(), Vec3::new(10.0, 0.0, 0.0)));
        let id = target.read().id;

        let hit = shard.ray_cast(Vec3::new(0.0, 0.0, 1.0), Vec3::X, EntityId::NULL, 0, 50.0);
        assert_eq!(hit.hit_entity(), Some(id));
        assert!((hit.position.x - 9.5).abs() < RAY_STEP * 1.01);

        let ignored = shard.ray_cast(Vec3::new(0.0, 0.0, 1.0), Vec3::X, id, 0, 50.0);
        assert!(!ignored.hit_anything);

        let down = shard.ray_cast(Vec3::new(0.0, 5.0, 1.0), Vec3::new(0.0, 0.0, -1.0), EntityId::NULL, 0, 5.0);
        assert!(down.hit_anything);
        assert_eq!(down.hit_entity(), None);
    }

    #[test]
    fn test_spawn_from_template() {
        let shard = SandboxShard::flat(0.0);
        shard.add_template(template(7));
        let owner = EntityId::from_raw(99);

        let spawned = shard
            .spawn_character(MonsterTypeId::new(7), Vec3::ONE, Some(owner))
            .expect("spawn");
        let c = spawned.read();
        assert_eq!(c.health, 250);
        assert_eq!(c.owner, Some(owner));
        assert_eq!(c.spawn_position, Vec3::ONE);
        assert!(shard.contains(c.id));
        assert_eq!(shard.monster_records().len(), 1);
    }

    #[test]
    fn test_spawn_failures() {
        let shard = SandboxShard::flat(0.0);
        assert!(shard.spawn_character(MonsterTypeId::new(1), Vec3::ZERO, None).is_err());

        shard.add_template(template(1));
        shard.set_spawn_failure(true);
        assert!(matches!(
            shard.spawn_character(MonsterTypeId::new(1), Vec3::ZERO, None),
            Err(SimError::SpawnFailed { .. })
        ));
    }

    #[test]
    fn test_lethal_damage_publishes_kill_once() {
        let bus = EventBus::new(16);
        let shard = SandboxShard::flat(0.0).with_events(bus.sender());
        let victim = shard.insert(Character::player(EntityId::new(), Vec3::ZERO).with_health(30, 100));
        let id = victim.read().id;
        let hit = DamageEvent {
            amount: 20,
            source: EntityId::NULL,
            damage_type: DamageType::GENERIC,
            flags: DamageFlags::NONE,
        };

        shard.apply_damage(id, hit);
        shard.apply_damage(id, hit);
        shard.apply_damage(id, hit);

        let events = bus.drain();
        assert_eq!(
            events,
            vec![SimEvent::CharacterKilled {
                entity_id: id,
                source: None
            }]
        );
    }

    #[test]
    fn test_healing_caps_at_max() {
        let shard = SandboxShard::flat(0.0);
        let c = shard.insert(Character::player(EntityId::new(), Vec3::ZERO).with_health(90, 100));
        let id = c.read().id;
        shard.apply_healing(id, 50);
        assert_eq!(c.read().health, 100);
    }

    #[test]
    fn test_broadcast_only_with_playing_clients() {
        let shard = SandboxShard::flat(0.0);
        let npc = Character::npc(EntityId::new(), MonsterTypeId::NONE, FactionId::NEUTRAL, Vec3::ZERO);
        shard.broadcast_pose(npc.pose());
        assert!(shard.broadcasts().is_empty());

        let player = shard.add_player(Character::player(EntityId::new(), Vec3::ZERO));
        shard.broadcast_pose(npc.pose());
        assert_eq!(shard.broadcasts().len(), 1);

        shard.disconnect(player.read().id);
        assert!(shard.playing_characters().is_empty());
    }

    #[test]
    fn test_nav_grid_built_from_terrain() {
        let shard = SandboxShard::flat(0.0).with_nav_grid(Vec3::ZERO, &NavConfig {
            build_radius: 10.0,
            ..NavConfig::default()
        });
        let grid = shard.nav_grid().expect("grid");
        assert!(grid.is_built());
        assert_eq!(grid.dimensions(), (11, 11));
    }
}
