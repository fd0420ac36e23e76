//! Weapon fire resolution: hitscan rays, travel-time projectiles and splash damage.
//!
//! Fast ammunition resolves instantly with a single bounded ray query. Slow
//! ammunition becomes an [`InFlightProjectile`] that is integrated every
//! [`ProjectileEngine::tick`] until it hits a character, hits terrain or runs
//! out of range.

use std::mem;
use std::sync::Arc;

use crossbeam_channel::Sender;
use glam::Vec3;
use parking_lot::{Mutex, RwLock};
use skirmish_common::{is_headshot, DamageType, EntityId, ShutdownSignal, SimError, SimResult};
use tracing::{debug, trace};

use crate::config::ProjectileConfig;
use crate::events::{publish, SimEvent};
use crate::world::{AmmoStats, Character, DamageEvent, DamageFlags, RayHit, Shard};

/// Segments shorter than this reuse the velocity direction for the ray query.
const MIN_SEGMENT_LENGTH: f32 = 0.001;

// ============================================================================
// Shots and reports
// ============================================================================

/// A fully resolved instant shot.
#[derive(Debug, Clone, PartialEq)]
pub struct Shot {
    /// Shooter (ignored by the ray)
    pub source: EntityId,
    /// Correlation id forwarded to the physics query
    pub trace: u32,
    /// Ray origin
    pub origin: Vec3,
    /// Normalized ray direction
    pub direction: Vec3,
    /// Maximum ray length
    pub range: f32,
    /// Damage before the headshot multiplier
    pub damage: i32,
    /// Multiplier applied on headshots
    pub headshot_mult: f32,
    /// Damage type tag
    pub damage_type: DamageType,
    /// Ammo descriptor, for splash
    pub ammo: Option<AmmoStats>,
}

/// Direct hit on a character.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitReport {
    /// Target hit
    pub target: EntityId,
    /// Damage applied
    pub damage: i32,
    /// Headshot
    pub critical: bool,
    /// Hit position
    pub position: Vec3,
}

/// Splash damage on one character.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplashReport {
    /// Target hit
    pub target: EntityId,
    /// Damage applied
    pub damage: i32,
    /// Distance from the impact point
    pub distance: f32,
}

/// What an instant shot produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ShotResult {
    /// Raw ray result
    pub ray: RayHit,
    /// Direct hit, if a living character other than the shooter was hit
    pub direct: Option<HitReport>,
    /// Splash hits
    pub splash: Vec<SplashReport>,
}

/// Result of [`ProjectileEngine::fire_projectile`].
#[derive(Debug, Clone, PartialEq)]
pub enum FireOutcome {
    /// Resolved this call
    Resolved(ShotResult),
    /// Registered as an in-flight projectile
    InFlight,
}

/// A travel-time projectile.
#[derive(Debug, Clone, PartialEq)]
pub struct InFlightProjectile {
    /// Current position
    pub position: Vec3,
    /// Current velocity
    pub velocity: Vec3,
    /// Downward acceleration
    pub gravity: f32,
    /// Distance at which the projectile expires
    pub max_range: f32,
    /// Path length covered so far
    pub distance_traveled: f32,
    /// Shooter
    pub source: EntityId,
    /// Ammo descriptor
    pub ammo: AmmoStats,
    /// Damage before the headshot multiplier
    pub damage: i32,
    /// Damage type tag
    pub damage_type: DamageType,
    /// Correlation id
    pub trace: u32,
    /// Multiplier applied on headshots
    pub headshot_mult: f32,
}

/// Linear splash falloff, floored at `min_fraction`.
#[must_use]
pub fn splash_fraction(distance: f32, radius: f32, min_fraction: f32) -> f32 {
    if radius <= 0.0 {
        return min_fraction;
    }
    min_fraction.max(1.0 - distance / radius).min(1.0)
}

// ============================================================================
// Engine
// ============================================================================

/// Resolves weapon fire and owns the in-flight projectile list.
pub struct ProjectileEngine {
    shard: RwLock<Option<Arc<dyn Shard>>>,
    in_flight: Mutex<Vec<InFlightProjectile>>,
    config: ProjectileConfig,
    events: Option<Sender<SimEvent>>,
}

impl Default for ProjectileEngine {
    fn default() -> Self {
        Self::new(ProjectileConfig::default())
    }
}

impl ProjectileEngine {
    /// Creates an engine without a shard.
    #[must_use]
    pub fn new(config: ProjectileConfig) -> Self {
        Self {
            shard: RwLock::new(None),
            in_flight: Mutex::new(Vec::new()),
            config,
            events: None,
        }
    }

    /// Publish hit and expiry events to `sender`.
    #[must_use]
    pub fn with_events(mut self, sender: Sender<SimEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Attaches the shard this engine resolves fire in.
    pub fn init(&self, shard: Arc<dyn Shard>) {
        *self.shard.write() = Some(shard);
    }

    fn shard(&self) -> Option<Arc<dyn Shard>> {
        self.shard.read().clone()
    }

    /// Fires `source`'s equipped weapon from `origin` along `direction`.
    ///
    /// Ammo slower than the hitscan threshold becomes an in-flight projectile;
    /// everything else is resolved immediately.
    pub fn fire_projectile(
        &self,
        source: &Character,
        trace: u32,
        origin: Vec3,
        direction: Vec3,
        ammo: Option<&AmmoStats>,
    ) -> SimResult<FireOutcome> {
        let shard = self.shard().ok_or(SimError::NotInitialized)?;
        let weapon = shard.armory().equipped_weapon(source);

        let range = weapon
            .map(|w| w.range)
            .filter(|&r| r > 0.0)
            .unwrap_or(self.config.default_weapon_range);
        let damage = weapon.map_or(self.config.default_weapon_damage, |w| w.damage_per_round);
        let headshot_mult = weapon.map_or(1.0, |w| w.headshot_mult).max(1.0);
        let damage_type = ammo.map(|a| a.damage_type).unwrap_or_default();
        let direction = direction.normalize_or_zero();
        if direction == Vec3::ZERO {
            debug!("Shot {} from {} has no direction, treated as a miss", trace, source.id);
            return Ok(FireOutcome::Resolved(ShotResult {
                ray: RayHit::MISS,
                direct: None,
                splash: Vec::new(),
            }));
        }

        let speed = ammo.map_or(0.0, |a| a.projectile_speed);
        if speed > 0.0 && speed < self.config.hitscan_speed_threshold {
            let ammo = ammo.copied().unwrap_or_default();
            self.in_flight.lock().push(InFlightProjectile {
                position: origin,
                velocity: direction * speed,
                gravity: ammo.gravity,
                max_range: range,
                distance_traveled: 0.0,
                source: source.id,
                ammo,
                damage,
                damage_type,
                trace,
                headshot_mult,
            });
            trace!("Projectile {} from {} in flight at {:.0} u/s", trace, source.id, speed);
            return Ok(FireOutcome::InFlight);
        }

        let shot = Shot {
            source: source.id,
            trace,
            origin,
            direction,
            range,
            damage,
            headshot_mult,
            damage_type,
            ammo: ammo.copied(),
        };
        Ok(FireOutcome::Resolved(self.resolve_on(shard.as_ref(), &shot)))
    }

    /// Resolves a pre-computed instant shot (used for NPC fire).
    pub fn resolve_hitscan(&self, shot: &Shot) -> SimResult<ShotResult> {
        let shard = self.shard().ok_or(SimError::NotInitialized)?;
        Ok(self.resolve_on(shard.as_ref(), shot))
    }

    fn resolve_on(&self, shard: &dyn Shard, shot: &Shot) -> ShotResult {
        let ray = shard
            .physics()
            .ray_cast(shot.origin, shot.direction, shot.source, shot.trace, shot.range);

        let direct = ray.hit_entity().filter(|&id| id != shot.source).and_then(|target| {
            self.strike(
                shard,
                target,
                ray.position,
                shot.source,
                shot.damage,
                shot.headshot_mult,
                shot.damage_type,
            )
        });

        let splash = match shot.ammo.as_ref().filter(|a| a.has_splash()) {
            Some(ammo) => {
                let center = if ray.hit_anything {
                    ray.position
                } else {
                    shot.origin + shot.direction * shot.range
                };
                self.splash_on(shard, center, ammo, shot.damage, shot.damage_type, shot.source)
            },
            None => Vec::new(),
        };

        ShotResult { ray, direct, splash }
    }

    /// Applies a direct hit; `None` if the target is missing or already dead.
    #[allow(clippy::too_many_arguments)]
    fn strike(
        &self,
        shard: &dyn Shard,
        target: EntityId,
        hit_position: Vec3,
        source: EntityId,
        base_damage: i32,
        headshot_mult: f32,
        damage_type: DamageType,
    ) -> Option<HitReport> {
        let handle = shard.entities().character(target)?;
        let (base, height) = {
            let character = handle.read();
            if !character.is_alive() {
                return None;
            }
            (character.position, character.collision_height)
        };

        let critical = is_headshot(hit_position, base, height, self.config.headshot_height_fraction);
        let mult = if critical { headshot_mult } else { 1.0 };
        let damage = (base_damage as f32 * mult) as i32;

        shard.entities().apply_damage(
            target,
            DamageEvent {
                amount: damage,
                source,
                damage_type,
                flags: if critical {
                    DamageFlags::CRITICAL
                } else {
                    DamageFlags::NONE
                },
            },
        );
        debug!("{} hit {} for {} (critical={})", source, target, damage, critical);
        publish(
            self.events.as_ref(),
            SimEvent::CharacterHit {
                target,
                source,
                damage,
                critical,
            },
        );

        Some(HitReport {
            target,
            damage,
            critical,
            position: hit_position,
        })
    }

    /// Applies falloff damage to every living character within the ammo's impact radius.
    pub fn apply_splash_damage(
        &self,
        impact: Vec3,
        ammo: &AmmoStats,
        base_damage: i32,
        damage_type: DamageType,
        source: EntityId,
    ) -> Vec<SplashReport> {
        match self.shard() {
            Some(shard) => self.splash_on(shard.as_ref(), impact, ammo, base_damage, damage_type, source),
            None => Vec::new(),
        }
    }

    fn splash_on(
        &self,
        shard: &dyn Shard,
        impact: Vec3,
        ammo: &AmmoStats,
        base_damage: i32,
        damage_type: DamageType,
        source: EntityId,
    ) -> Vec<SplashReport> {
        if !ammo.has_splash() {
            return Vec::new();
        }
        let min_fraction = if ammo.min_damage_frac > 0.0 {
            ammo.min_damage_frac
        } else {
            self.config.default_min_damage_fraction
        };

        let mut reports = Vec::new();
        for (target, distance) in shard.physics().entities_in_radius(impact, ammo.impact_radius, source) {
            let alive = shard
                .entities()
                .character(target)
                .is_some_and(|c| c.read().is_alive());
            if !alive {
                continue;
            }

            let fraction = splash_fraction(distance, ammo.impact_radius, min_fraction);
            let damage = (base_damage as f32 * fraction) as i32;
            shard.entities().apply_damage(
                target,
                DamageEvent {
                    amount: damage,
                    source,
                    damage_type,
                    flags: DamageFlags::NONE,
                },
            );
            publish(
                self.events.as_ref(),
                SimEvent::SplashHit {
                    target,
                    source,
                    damage,
                    distance,
                },
            );
            reports.push(SplashReport {
                target,
                damage,
                distance,
            });
        }

        if !reports.is_empty() {
            debug!("Splash at {:?} hit {} characters", impact, reports.len());
        }
        reports
    }

    /// Advances every in-flight projectile by `delta_ms`.
    pub fn tick(&self, delta_ms: f64, current_time_ms: u64, shutdown: &ShutdownSignal) {
        if shutdown.is_triggered() {
            return;
        }
        let Some(shard) = self.shard() else {
            return;
        };
        let dt = (delta_ms / 1000.0) as f32;
        if dt <= 0.0 {
            return;
        }

        let mut pending = mem::take(&mut *self.in_flight.lock()).into_iter();
        let mut survivors = Vec::with_capacity(pending.len());
        for projectile in pending.by_ref() {
            if let Some(projectile) = self.advance(shard.as_ref(), projectile, dt) {
                survivors.push(projectile);
            }
            if shutdown.is_triggered() {
                break;
            }
        }
        survivors.extend(pending);

        if !survivors.is_empty() {
            trace!("{} projectiles in flight at t={}", survivors.len(), current_time_ms);
        }
        self.in_flight.lock().extend(survivors);
    }

    /// Integrates one projectile; returns it if it is still flying.
    fn advance(&self, shard: &dyn Shard, mut p: InFlightProjectile, dt: f32) -> Option<InFlightProjectile> {
        p.velocity.z -= p.gravity * dt;
        let old = p.position;
        let new = old + p.velocity * dt;
        let segment = old.distance(new);
        p.distance_traveled += segment;

        let direction = if segment > MIN_SEGMENT_LENGTH {
            (new - old) / segment
        } else {
            p.velocity.normalize_or_zero()
        };
        let ray = shard
            .physics()
            .ray_cast(old, direction, p.source, p.trace, segment);

        let impact = if let Some(target) = ray.hit_entity().filter(|&id| id != p.source) {
            self.strike(
                shard,
                target,
                ray.position,
                p.source,
                p.damage,
                p.headshot_mult,
                p.damage_type,
            );
            ray.position
        } else if ray.hit_anything {
            ray.position
        } else if p.distance_traveled >= p.max_range {
            publish(
                self.events.as_ref(),
                SimEvent::ProjectileExpired {
                    source: p.source,
                    position: new,
                },
            );
            new
        } else {
            p.position = new;
            return Some(p);
        };

        if p.ammo.has_splash() {
            self.splash_on(shard, impact, &p.ammo, p.damage, p.damage_type, p.source);
        }
        trace!("Projectile {} ended at {:?} after {:.1}", p.trace, impact, p.distance_traveled);
        None
    }

    /// Snapshot of the in-flight projectiles.
    #[must_use]
    pub fn in_flight(&self) -> Vec<InFlightProjectile> {
        self.in_flight.lock().clone()
    }

    /// Number of in-flight projectiles.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }
}

impl std::fmt::Debug for ProjectileEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectileEngine")
            .field("initialized", &self.shard.read().is_some())
            .field("in_flight", &self.in_flight_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxShard;
    use crate::world::WeaponStats;
    use proptest::prelude::*;
    use skirmish_common::{FactionId, MonsterTypeId, WeaponId};

    fn setup() -> (Arc<SandboxShard>, ProjectileEngine) {
        let shard = Arc::new(SandboxShard::flat(0.0));
        let engine = ProjectileEngine::default();
        engine.init(shard.clone());
        (shard, engine)
    }

    fn dummy(x: f32, y: f32) -> Character {
        Character::npc(EntityId::new(), MonsterTypeId::NONE, FactionId::NEUTRAL, Vec3::new(x, y, 0.0))
            .with_health(1000, 1000)
            .with_collision_height(2.0)
    }

    #[test]
    fn test_uninitialized_engine() {
        let engine = ProjectileEngine::default();
        let source = dummy(0.0, 0.0);
        assert!(matches!(
            engine.fire_projectile(&source, 1, Vec3::ZERO, Vec3::X, None),
            Err(SimError::NotInitialized)
        ));
        engine.tick(50.0, 0, &ShutdownSignal::new());
        assert!(engine
            .apply_splash_damage(Vec3::ZERO, &AmmoStats::default().with_splash(5.0, 0.0), 100, DamageType::GENERIC, EntityId::NULL)
            .is_empty());
    }

    #[test]
    fn test_hitscan_headshot_threshold() {
        let (shard, engine) = setup();
        shard.add_weapon(
            WeaponId::new(1),
            WeaponStats {
                range: 100.0,
                damage_per_round: 40,
                headshot_mult: 2.5,
            },
        );
        let shooter = shard.insert(dummy(0.0, 0.0).with_weapon(WeaponId::new(1)));
        let target = shard.insert(dummy(10.0, 0.0));
        let target_id = target.read().id;
        let source = shooter.read().clone();

        // 85% of a 2.0 collision height
        let outcome = engine
            .fire_projectile(&source, 7, Vec3::new(0.0, 0.0, 1.7), Vec3::X, None)
            .expect("fire");
        let FireOutcome::Resolved(result) = outcome else {
            panic!("hitscan should resolve");
        };
        let hit = result.direct.expect("direct hit");
        assert_eq!(hit.target, target_id);
        assert!(hit.critical);
        assert_eq!(hit.damage, 100);

        // 84%
        let outcome = engine
            .fire_projectile(&source, 8, Vec3::new(0.0, 0.0, 1.68), Vec3::X, None)
            .expect("fire");
        let FireOutcome::Resolved(result) = outcome else {
            panic!("hitscan should resolve");
        };
        let hit = result.direct.expect("direct hit");
        assert!(!hit.critical);
        assert_eq!(hit.damage, 40);

        let log = shard.damage_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].1.flags, DamageFlags::CRITICAL);
        assert_eq!(log[1].1.flags, DamageFlags::NONE);
        assert_eq!(target.read().health, 1000 - 140);
    }

    #[test]
    fn test_headshot_multiplier_floored_at_one() {
        let (shard, engine) = setup();
        shard.add_weapon(
            WeaponId::new(3),
            WeaponStats {
                range: 100.0,
                damage_per_round: 40,
                headshot_mult: 0.5,
            },
        );
        let source = shard.insert(dummy(0.0, 0.0).with_weapon(WeaponId::new(3))).read().clone();
        let target = shard.insert(dummy(10.0, 0.0));

        let outcome = engine
            .fire_projectile(&source, 1, Vec3::new(0.0, 0.0, 1.9), Vec3::X, None)
            .expect("fire");
        let FireOutcome::Resolved(result) = outcome else {
            panic!("hitscan should resolve");
        };
        let hit = result.direct.expect("direct hit");
        assert!(hit.critical);
        assert_eq!(hit.damage, 40);
        assert_eq!(target.read().health, 960);
    }

    #[test]
    fn test_zero_direction_is_a_miss() {
        let (shard, engine) = setup();
        let source = shard.insert(dummy(0.0, 0.0)).read().clone();
        let bystander = shard.insert(dummy(1.0, 0.0));
        let slow = AmmoStats::default().with_speed(100.0).with_splash(5.0, 0.0);

        let outcome = engine
            .fire_projectile(&source, 2, Vec3::new(0.0, 0.0, 1.0), Vec3::ZERO, Some(&slow))
            .expect("fire");
        let FireOutcome::Resolved(result) = outcome else {
            panic!("directionless shot should resolve");
        };
        assert_eq!(result.ray, RayHit::MISS);
        assert!(result.direct.is_none());
        assert!(result.splash.is_empty());
        assert_eq!(engine.in_flight_count(), 0);

        let outcome = engine
            .fire_projectile(&source, 3, Vec3::new(0.0, 0.0, 1.0), Vec3::ZERO, None)
            .expect("fire");
        assert!(matches!(outcome, FireOutcome::Resolved(r) if r.direct.is_none()));

        for tick in 1..=10 {
            engine.tick(1000.0, tick * 1000, &ShutdownSignal::new());
        }
        assert_eq!(engine.in_flight_count(), 0);
        assert_eq!(bystander.read().health, 1000);
    }

    #[test]
    fn test_hitscan_defaults_without_weapon() {
        let (shard, engine) = setup();
        let source = shard.insert(dummy(0.0, 0.0)).read().clone();
        let target = shard.insert(dummy(300.0, 0.0));

        let outcome = engine
            .fire_projectile(&source, 1, Vec3::new(0.0, 0.0, 1.0), Vec3::X, None)
            .expect("fire");
        let FireOutcome::Resolved(result) = outcome else {
            panic!("hitscan should resolve");
        };
        assert_eq!(result.direct.map(|h| h.damage), Some(100));
        assert_eq!(target.read().health, 900);
    }

    #[test]
    fn test_hitscan_miss_splashes_at_range_end() {
        let (shard, engine) = setup();
        shard.add_weapon(
            WeaponId::new(2),
            WeaponStats {
                range: 20.0,
                damage_per_round: 80,
                headshot_mult: 1.0,
            },
        );
        let source = shard.insert(dummy(0.0, 0.0).with_weapon(WeaponId::new(2))).read().clone();
        let bystander = shard.insert(dummy(20.0, 3.0));

        let ammo = AmmoStats::default().with_splash(4.0, 0.0);
        let outcome = engine
            .fire_projectile(&source, 1, Vec3::new(0.0, 0.0, 1.0), Vec3::X, Some(&ammo))
            .expect("fire");
        let FireOutcome::Resolved(result) = outcome else {
            panic!("hitscan should resolve");
        };
        assert!(!result.ray.hit_anything);
        assert!(result.direct.is_none());
        assert_eq!(result.splash.len(), 1);
        assert!(bystander.read().health < 1000);
    }

    #[test]
    fn test_dead_target_takes_no_direct_damage() {
        let (shard, engine) = setup();
        let source = shard.insert(dummy(0.0, 0.0)).read().clone();
        shard.insert(dummy(5.0, 0.0).with_health(0, 100));

        let outcome = engine
            .fire_projectile(&source, 1, Vec3::new(0.0, 0.0, 1.0), Vec3::X, None)
            .expect("fire");
        let FireOutcome::Resolved(result) = outcome else {
            panic!("hitscan should resolve");
        };
        assert!(result.ray.hit_anything);
        assert!(result.direct.is_none());
        assert!(shard.damage_log().is_empty());
    }

    #[test]
    fn test_slow_projectile_travels_until_range() {
        let (shard, engine) = setup();
        let source = shard.insert(dummy(0.0, 0.0)).read().clone();
        let ammo = AmmoStats::default().with_speed(100.0);
        let shutdown = ShutdownSignal::new();

        let outcome = engine
            .fire_projectile(&source, 3, Vec3::new(0.0, 0.0, 1.0), Vec3::X, Some(&ammo))
            .expect("fire");
        assert_eq!(outcome, FireOutcome::InFlight);
        assert_eq!(engine.in_flight_count(), 1);

        let mut last = 0.0;
        for tick in 1..=4 {
            engine.tick(1000.0, tick * 1000, &shutdown);
            let flying = engine.in_flight();
            assert_eq!(flying.len(), 1, "tick {tick}");
            assert!(flying[0].distance_traveled > last);
            last = flying[0].distance_traveled;
        }
        assert!((last - 400.0).abs() < 0.01);

        engine.tick(1000.0, 5000, &shutdown);
        assert_eq!(engine.in_flight_count(), 0);
        assert!(shard.damage_log().is_empty());
    }

    #[test]
    fn test_slow_projectile_hits_character() {
        let (shard, engine) = setup();
        let source = shard.insert(dummy(0.0, 0.0)).read().clone();
        let target = shard.insert(dummy(150.0, 0.0));
        let ammo = AmmoStats::default().with_speed(100.0);
        let shutdown = ShutdownSignal::new();

        engine
            .fire_projectile(&source, 4, Vec3::new(0.0, 0.0, 1.0), Vec3::X, Some(&ammo))
            .expect("fire");
        engine.tick(1000.0, 1000, &shutdown);
        assert_eq!(engine.in_flight_count(), 1);
        engine.tick(1000.0, 2000, &shutdown);
        assert_eq!(engine.in_flight_count(), 0);
        assert_eq!(target.read().health, 900);
    }

    #[test]
    fn test_gravity_drops_projectile_into_terrain() {
        let (shard, engine) = setup();
        let source = shard.insert(dummy(0.0, 0.0)).read().clone();
        let ammo = AmmoStats::default().with_speed(50.0).with_gravity(30.0);

        engine
            .fire_projectile(&source, 5, Vec3::new(0.0, 0.0, 1.0), Vec3::X, Some(&ammo))
            .expect("fire");
        engine.tick(500.0, 500, &ShutdownSignal::new());
        assert_eq!(engine.in_flight_count(), 0);
    }

    #[test]
    fn test_shutdown_keeps_projectiles() {
        let (shard, engine) = setup();
        let source = shard.insert(dummy(0.0, 0.0)).read().clone();
        let ammo = AmmoStats::default().with_speed(100.0);
        engine
            .fire_projectile(&source, 6, Vec3::new(0.0, 0.0, 1.0), Vec3::X, Some(&ammo))
            .expect("fire");

        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        engine.tick(1000.0, 1000, &shutdown);
        let flying = engine.in_flight();
        assert_eq!(flying.len(), 1);
        assert_eq!(flying[0].distance_traveled, 0.0);
    }

    #[test]
    fn test_splash_falloff() {
        let (shard, engine) = setup();
        let source = shard.insert(dummy(-50.0, 0.0));
        let source_id = source.read().id;
        let center = shard.insert(dummy(0.0, 0.0));
        let edge = shard.insert(dummy(4.0, 0.0));
        let outside = shard.insert(dummy(4.5, 0.0));

        let ammo = AmmoStats::default().with_splash(4.0, 0.0);
        let reports = engine.apply_splash_damage(Vec3::ZERO, &ammo, 100, DamageType(3), source_id);

        assert_eq!(reports.len(), 2);
        assert_eq!(center.read().health, 900);
        assert_eq!(edge.read().health, 975);
        assert_eq!(outside.read().health, 1000);
        assert!(shard.damage_log().iter().all(|(_, d)| d.damage_type == DamageType(3)));
    }

    #[test]
    fn test_splash_excludes_source_and_uses_ammo_floor() {
        let (shard, engine) = setup();
        let source = shard.insert(dummy(0.0, 0.0));
        let source_id = source.read().id;
        let near_edge = shard.insert(dummy(0.0, 3.6));

        let ammo = AmmoStats::default().with_splash(4.0, 0.5);
        engine.apply_splash_damage(Vec3::ZERO, &ammo, 100, DamageType::GENERIC, source_id);

        assert_eq!(source.read().health, 1000);
        assert_eq!(near_edge.read().health, 950);
    }

    proptest! {
        #[test]
        fn prop_splash_fraction_bounded(
            distance in 0.0f32..100.0,
            radius in 0.1f32..100.0,
            min_fraction in 0.0f32..1.0,
        ) {
            let fraction = splash_fraction(distance, radius, min_fraction);
            prop_assert!(fraction >= min_fraction);
            prop_assert!(fraction <= 1.0);
        }
    }
}
