//! Character record and the collaborator surface the simulation core consumes.
//!
//! Everything outside the AI, navigation and projectile code (entity storage,
//! physics queries, observer networking, weapon data) is reached through the
//! traits in this module. The host implements them; [`crate::sandbox`] provides
//! an in-memory implementation for tests and the demo server.

use std::sync::Arc;

use glam::{Quat, Vec3};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use skirmish_common::{
    AmmoId, DamageType, EntityId, Facing, FactionId, MonsterTypeId, SimResult, WeaponId,
};

use crate::nav::NavGrid;

// ============================================================================
// Movement and damage payloads
// ============================================================================

/// Movement-state flags sent with pose updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MovementState(pub u16);

impl MovementState {
    /// Standing still (attacking, idle at spawn).
    pub const STANDING: Self = Self(0x1000);
    /// Running with the movement flag set.
    pub const RUNNING: Self = Self(0x2004);
}

/// Extra flags attached to a damage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DamageFlags {
    /// Headshot / critical hit
    pub critical: bool,
}

impl DamageFlags {
    /// No flags.
    pub const NONE: Self = Self { critical: false };
    /// Critical hit.
    pub const CRITICAL: Self = Self { critical: true };
}

/// A single application of damage to a character.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageEvent {
    /// Damage amount (signed; the target interprets negatives)
    pub amount: i32,
    /// Entity responsible for the damage
    pub source: EntityId,
    /// Damage type tag
    pub damage_type: DamageType,
    /// Hit flags
    pub flags: DamageFlags,
}

/// Pose broadcast pushed to every playing observer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseUpdate {
    /// Entity whose pose changed
    pub entity: EntityId,
    /// World position
    pub position: Vec3,
    /// Body rotation
    pub rotation: Quat,
    /// Aim direction
    pub aim: Vec3,
    /// Wrapping short timestamp from the shard clock
    pub short_time: u16,
    /// Movement-state flags
    pub movement_state: MovementState,
}

/// Result of a bounded ray query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Whether anything (entity or static geometry) was hit
    pub hit_anything: bool,
    /// Hit entity, [`EntityId::NULL`] for terrain or no hit
    pub entity: EntityId,
    /// Hit position (meaningless when nothing was hit)
    pub position: Vec3,
}

impl RayHit {
    /// A ray that hit nothing.
    pub const MISS: Self = Self {
        hit_anything: false,
        entity: EntityId::NULL,
        position: Vec3::ZERO,
    };

    /// A ray that stopped on static geometry.
    #[must_use]
    pub const fn terrain(position: Vec3) -> Self {
        Self {
            hit_anything: true,
            entity: EntityId::NULL,
            position,
        }
    }

    /// A ray that stopped on an entity.
    #[must_use]
    pub const fn entity(entity: EntityId, position: Vec3) -> Self {
        Self {
            hit_anything: true,
            entity,
            position,
        }
    }

    /// Returns the hit entity, if the ray stopped on one.
    #[must_use]
    pub fn hit_entity(&self) -> Option<EntityId> {
        (self.hit_anything && self.entity.is_valid()).then_some(self.entity)
    }
}

// ============================================================================
// Weapon data
// ============================================================================

/// Resolved stats of an equipped weapon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeaponStats {
    /// Maximum range; zero means "use the default range"
    pub range: f32,
    /// Damage per round
    pub damage_per_round: i32,
    /// Headshot damage multiplier
    pub headshot_mult: f32,
}

/// Resolved ammunition descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmmoStats {
    /// Damage type tag
    pub damage_type: DamageType,
    /// Projectile speed in units/s; zero means hitscan
    pub projectile_speed: f32,
    /// Downward acceleration in units/s²
    pub gravity: f32,
    /// Splash radius; zero disables splash
    pub impact_radius: f32,
    /// Minimum splash fraction at the edge of the radius; zero means "use the default"
    pub min_damage_frac: f32,
}

impl Default for AmmoStats {
    fn default() -> Self {
        Self {
            damage_type: DamageType::GENERIC,
            projectile_speed: 0.0,
            gravity: 0.0,
            impact_radius: 0.0,
            min_damage_frac: 0.0,
        }
    }
}

impl AmmoStats {
    /// Set projectile speed.
    #[must_use]
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.projectile_speed = speed;
        self
    }

    /// Set gravity.
    #[must_use]
    pub fn with_gravity(mut self, gravity: f32) -> Self {
        self.gravity = gravity;
        self
    }

    /// Set splash radius and minimum falloff fraction.
    #[must_use]
    pub fn with_splash(mut self, radius: f32, min_damage_frac: f32) -> Self {
        self.impact_radius = radius;
        self.min_damage_frac = min_damage_frac;
        self
    }

    /// Set damage type.
    #[must_use]
    pub fn with_damage_type(mut self, damage_type: DamageType) -> Self {
        self.damage_type = damage_type;
        self
    }

    /// Whether this ammo deals splash damage.
    #[must_use]
    pub fn has_splash(&self) -> bool {
        self.impact_radius > 0.0
    }
}

// ============================================================================
// Character record
// ============================================================================

/// Combat tuning of a non-player character.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NpcProfile {
    /// Range at which the NPC stops to shoot
    pub attack_range: f32,
    /// Distance at which an idle NPC notices a player
    pub aggro_radius: f32,
    /// Maximum pursuit distance from spawn (and from the target while chasing)
    pub leash_radius: f32,
    /// Walking speed (returning home)
    pub normal_speed: f32,
    /// Running speed (chasing)
    pub fast_speed: f32,
    /// Minimum time between shots
    pub attack_interval_ms: u64,
    /// Damage per shot
    pub damage: i32,
    /// Half-angle of the aim cone in radians
    pub aim_inaccuracy: f32,
    /// Ammunition used by the NPC's weapon
    pub ammo: Option<AmmoId>,
    /// Delay between death and respawn of a replacement
    pub respawn_delay_ms: u64,
}

impl Default for NpcProfile {
    fn default() -> Self {
        Self {
            attack_range: 30.0,
            aggro_radius: 40.0,
            leash_radius: 80.0,
            normal_speed: 4.0,
            fast_speed: 7.0,
            attack_interval_ms: 1500,
            damage: 25,
            aim_inaccuracy: 0.0,
            ammo: None,
            respawn_delay_ms: 30_000,
        }
    }
}

/// The combat-relevant subset of a character entity.
///
/// Owned by the entity registry; the AI engine only holds shared handles.
#[derive(Debug, Clone, PartialEq)]
pub struct Character {
    /// Entity ID
    pub id: EntityId,
    /// Monster archetype (NONE for players and one-off NPCs)
    pub monster_type: MonsterTypeId,
    /// Faction
    pub faction: FactionId,
    /// Whether a client controls this character
    pub player_controlled: bool,
    /// World position (feet)
    pub position: Vec3,
    /// Aim direction
    pub aim: Vec3,
    /// Body rotation
    pub rotation: Quat,
    /// Last broadcast movement-state flags
    pub movement_state: MovementState,
    /// Short timestamp of the last pose broadcast
    pub movement_short_time: u16,
    /// Collision capsule height
    pub collision_height: f32,
    /// Current health
    pub health: i32,
    /// Maximum health
    pub max_health: i32,
    /// Where the NPC spawned and returns to
    pub spawn_position: Vec3,
    /// Owning entity (weak back-reference by id)
    pub owner: Option<EntityId>,
    /// NPC combat tuning (unused for players)
    pub npc: NpcProfile,
    /// Equipped weapon record
    pub weapon: Option<WeaponId>,
    /// Time of the last weapon-fire animation trigger
    pub fire_burst_time: u64,
}

impl Character {
    /// Creates an NPC at `position`, spawning there.
    #[must_use]
    pub fn npc(id: EntityId, monster_type: MonsterTypeId, faction: FactionId, position: Vec3) -> Self {
        Self {
            id,
            monster_type,
            faction,
            player_controlled: false,
            position,
            aim: Vec3::Y,
            rotation: Quat::IDENTITY,
            movement_state: MovementState::STANDING,
            movement_short_time: 0,
            collision_height: 2.0,
            health: 100,
            max_health: 100,
            spawn_position: position,
            owner: None,
            npc: NpcProfile::default(),
            weapon: None,
            fire_burst_time: 0,
        }
    }

    /// Creates a player-controlled character.
    #[must_use]
    pub fn player(id: EntityId, position: Vec3) -> Self {
        Self {
            player_controlled: true,
            ..Self::npc(id, MonsterTypeId::NONE, FactionId::NEUTRAL, position)
        }
    }

    /// Set NPC profile.
    #[must_use]
    pub fn with_profile(mut self, profile: NpcProfile) -> Self {
        self.npc = profile;
        self
    }

    /// Set current and maximum health.
    #[must_use]
    pub fn with_health(mut self, health: i32, max_health: i32) -> Self {
        self.health = health;
        self.max_health = max_health;
        self
    }

    /// Set collision height.
    #[must_use]
    pub fn with_collision_height(mut self, height: f32) -> Self {
        self.collision_height = height;
        self
    }

    /// Set equipped weapon.
    #[must_use]
    pub fn with_weapon(mut self, weapon: WeaponId) -> Self {
        self.weapon = Some(weapon);
        self
    }

    /// Set owner.
    #[must_use]
    pub fn with_owner(mut self, owner: EntityId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Returns whether the character is alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    /// Health below maximum.
    #[must_use]
    pub fn missing_health(&self) -> i32 {
        (self.max_health - self.health).max(0)
    }

    /// Applies a facing to aim and rotation.
    pub fn face(&mut self, facing: Facing) {
        self.aim = facing.aim;
        self.rotation = facing.rotation;
    }

    /// Builds the pose broadcast payload for the current state.
    #[must_use]
    pub fn pose(&self) -> PoseUpdate {
        PoseUpdate {
            entity: self.id,
            position: self.position,
            rotation: self.rotation,
            aim: self.aim,
            short_time: self.movement_short_time,
            movement_state: self.movement_state,
        }
    }
}

/// Shared handle to a registry-owned character.
pub type SharedCharacter = Arc<RwLock<Character>>;

/// Wraps a character into a shared handle.
#[must_use]
pub fn share(character: Character) -> SharedCharacter {
    Arc::new(RwLock::new(character))
}

// ============================================================================
// Collaborator traits
// ============================================================================

/// Entity storage and the damage/heal contract on characters.
pub trait EntityRegistry {
    /// Looks up a character by ID.
    fn character(&self, id: EntityId) -> Option<SharedCharacter>;

    /// Removes an entity from the world.
    fn remove(&self, id: EntityId);

    /// Creates a character of the given archetype.
    fn spawn_character(
        &self,
        monster_type: MonsterTypeId,
        position: Vec3,
        owner: Option<EntityId>,
    ) -> SimResult<SharedCharacter>;

    /// Applies damage; death side effects are the registry's business.
    fn apply_damage(&self, target: EntityId, damage: DamageEvent);

    /// Applies healing.
    fn apply_healing(&self, target: EntityId, amount: i32);

    /// Pushes pending non-movement visual changes of an entity to observers.
    fn flush_changes(&self, id: EntityId);
}

/// Ground height queries.
pub trait GroundSampler {
    /// Ground height under `position`, if there is ground.
    fn sample_ground_height(&self, position: Vec3) -> Option<f32>;
}

impl<F> GroundSampler for F
where
    F: Fn(Vec3) -> Option<f32>,
{
    fn sample_ground_height(&self, position: Vec3) -> Option<f32> {
        self(position)
    }
}

/// Physics queries used by weapon fire and movement.
pub trait PhysicsQuery: GroundSampler {
    /// Casts a ray of at most `max_distance`, ignoring `ignore`.
    fn ray_cast(
        &self,
        origin: Vec3,
        direction: Vec3,
        ignore: EntityId,
        trace: u32,
        max_distance: f32,
    ) -> RayHit;

    /// Entities within `radius` of `center` with their distances, excluding `exclude`.
    fn entities_in_radius(&self, center: Vec3, radius: f32, exclude: EntityId) -> Vec<(EntityId, f32)>;
}

/// Connected clients.
pub trait Observers {
    /// Characters of clients currently in the playing state.
    fn playing_characters(&self) -> Vec<SharedCharacter>;

    /// Sends a pose update to every playing client.
    fn broadcast_pose(&self, pose: PoseUpdate);

    /// Current wrapping short time.
    fn short_time(&self) -> u16;
}

/// Weapon and ammunition data lookup.
pub trait Armory {
    /// Stats of the character's equipped weapon.
    fn equipped_weapon(&self, character: &Character) -> Option<WeaponStats>;

    /// Ammunition descriptor.
    fn ammo(&self, id: AmmoId) -> Option<AmmoStats>;
}

/// The simulation context the engines run inside.
pub trait Shard: Send + Sync {
    /// Entity storage.
    fn entities(&self) -> &dyn EntityRegistry;

    /// Physics queries.
    fn physics(&self) -> &dyn PhysicsQuery;

    /// Observer networking.
    fn observers(&self) -> &dyn Observers;

    /// Weapon data.
    fn armory(&self) -> &dyn Armory;

    /// Navigation grid for the active area, if one has been built.
    fn nav_grid(&self) -> Option<&NavGrid>;

    /// Current shard time in milliseconds.
    fn current_time_ms(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_health_helpers() {
        let npc = Character::npc(EntityId::from_raw(5), MonsterTypeId::new(1), FactionId::new(2), Vec3::ZERO)
            .with_health(40, 100);
        assert!(npc.is_alive());
        assert_eq!(npc.missing_health(), 60);
        assert!(!npc.player_controlled);
        assert_eq!(npc.spawn_position, Vec3::ZERO);
    }

    #[test]
    fn test_player_constructor() {
        let player = Character::player(EntityId::from_raw(9), Vec3::X);
        assert!(player.player_controlled);
        assert_eq!(player.monster_type, MonsterTypeId::NONE);
    }

    #[test]
    fn test_ray_hit_entity() {
        assert_eq!(RayHit::MISS.hit_entity(), None);
        assert_eq!(RayHit::terrain(Vec3::ZERO).hit_entity(), None);
        let id = EntityId::from_raw(3);
        assert_eq!(RayHit::entity(id, Vec3::ONE).hit_entity(), Some(id));
    }

    #[test]
    fn test_closure_ground_sampler() {
        let flat = |_: Vec3| Some(2.5);
        assert_eq!(flat.sample_ground_height(Vec3::ZERO), Some(2.5));
    }
}
