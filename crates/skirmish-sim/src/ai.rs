//! NPC AI engine.
//!
//! Tracks registered NPCs, runs the [`behavior`](crate::behavior) state
//! machine for hostile ones at a fixed decision cadence, and carries out the
//! resulting movement, facing and weapon fire. Deaths schedule corpse removal
//! and respawns, which are processed every tick.
//!
//! All tracking structures are concurrent maps and queues so registration,
//! unregistration and death notifications may arrive from other systems while
//! a decision pass is running.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::RandomState;
use crossbeam_channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;
use glam::Vec3;
use parking_lot::{Mutex, RwLock};
use skirmish_common::{
    apply_cone_spread, facing_towards, EntityId, Facing, MonsterTypeId, ShutdownSignal, SimResult,
    MIN_FACING_DISTANCE_SQ,
};
use tracing::{debug, info, trace, warn};

use crate::behavior::{decide, AiAction, AiState, Engagement, Perception};
use crate::config::{AiConfig, SimConfig};
use crate::events::{publish, SimEvent};
use crate::faction::HostileFactions;
use crate::projectile::{ProjectileEngine, Shot};
use crate::world::{MovementState, Shard, SharedCharacter};

/// Muzzle height as a fraction of the shooter's collision height.
const MUZZLE_HEIGHT_FRACTION: f32 = 0.7;

/// Aim point height as a fraction of the target's collision height.
const AIM_HEIGHT_FRACTION: f32 = 0.5;

/// Corpse awaiting removal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingRemoval {
    /// Dead entity
    pub entity: EntityId,
    /// Removal time
    pub due_ms: u64,
}

/// Replacement awaiting spawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingRespawn {
    /// Archetype to spawn
    pub monster_type: MonsterTypeId,
    /// Where to spawn it
    pub spawn_position: Vec3,
    /// Spawn time
    pub due_ms: u64,
    /// Owner of the dead NPC
    pub owner: Option<EntityId>,
}

/// Per-NPC movement and attack bookkeeping.
#[derive(Debug, Clone, Default)]
struct NpcRuntime {
    path: Vec<Vec3>,
    cursor: usize,
    last_path_ms: u64,
    last_attack_ms: u64,
}

/// Resolved target for one decision.
#[derive(Debug, Clone, Copy)]
struct TargetInfo {
    id: EntityId,
    position: Vec3,
    collision_height: f32,
}

/// Work queue backed by an unbounded MPMC channel.
#[derive(Debug)]
struct WorkQueue<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
}

impl<T> WorkQueue<T> {
    fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    fn push(&self, item: T) {
        // The receiver lives in `self`, so the channel never disconnects.
        let _ = self.sender.send(item);
    }

    fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Takes the entries present now; `process` returns entries to keep.
    fn drain_requeue(&self, mut process: impl FnMut(T) -> Option<T>) {
        for _ in 0..self.receiver.len() {
            let Ok(item) = self.receiver.try_recv() else {
                break;
            };
            if let Some(item) = process(item) {
                self.push(item);
            }
        }
    }
}

/// Drives NPC combat behavior.
pub struct AiEngine {
    shard: RwLock<Option<Arc<dyn Shard>>>,
    projectiles: Arc<ProjectileEngine>,
    npcs: DashMap<EntityId, SharedCharacter, RandomState>,
    states: DashMap<EntityId, AiState, RandomState>,
    targets: DashMap<EntityId, EntityId, RandomState>,
    runtime: DashMap<EntityId, NpcRuntime, RandomState>,
    removals: WorkQueue<PendingRemoval>,
    respawns: WorkQueue<PendingRespawn>,
    last_decision_ms: AtomicU64,
    hostile: HostileFactions,
    config: AiConfig,
    rng: Mutex<fastrand::Rng>,
    events: Option<Sender<SimEvent>>,
}

impl AiEngine {
    /// Creates an engine firing through `projectiles`.
    #[must_use]
    pub fn new(config: &SimConfig, projectiles: Arc<ProjectileEngine>) -> Self {
        Self {
            shard: RwLock::new(None),
            projectiles,
            npcs: DashMap::with_hasher(RandomState::new()),
            states: DashMap::with_hasher(RandomState::new()),
            targets: DashMap::with_hasher(RandomState::new()),
            runtime: DashMap::with_hasher(RandomState::new()),
            removals: WorkQueue::new(),
            respawns: WorkQueue::new(),
            last_decision_ms: AtomicU64::new(0),
            hostile: HostileFactions::from(&config.factions),
            config: config.ai.clone(),
            rng: Mutex::new(fastrand::Rng::new()),
            events: None,
        }
    }

    /// Publish lifecycle events to `sender`.
    #[must_use]
    pub fn with_events(mut self, sender: Sender<SimEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Seed the aim-spread generator.
    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = fastrand::Rng::with_seed(seed);
        self
    }

    /// Attaches the shard to this engine and its projectile engine.
    pub fn init(&self, shard: Arc<dyn Shard>) {
        self.projectiles.init(Arc::clone(&shard));
        *self.shard.write() = Some(shard);
    }

    fn shard(&self) -> Option<Arc<dyn Shard>> {
        self.shard.read().clone()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Starts tracking an NPC in the Idle state. Player-controlled characters are ignored.
    pub fn register_npc(&self, npc: &SharedCharacter) {
        let (id, monster_type, faction) = {
            let c = npc.read();
            if c.player_controlled {
                return;
            }
            (c.id, c.monster_type, c.faction)
        };

        self.npcs.insert(id, Arc::clone(npc));
        self.states.insert(id, AiState::Idle);
        self.runtime.insert(id, NpcRuntime::default());

        let hostile = self.hostile.contains(faction);
        info!(
            "Registered NPC {} type={} faction={} hostile={}",
            id,
            monster_type,
            faction.raw(),
            hostile
        );
        publish(
            self.events.as_ref(),
            SimEvent::NpcRegistered {
                entity_id: id,
                monster_type,
                faction,
                hostile,
            },
        );
    }

    /// Stops tracking an NPC. Safe to call repeatedly.
    pub fn unregister_npc(&self, id: EntityId) {
        let tracked = self.npcs.remove(&id).is_some();
        self.states.remove(&id);
        self.targets.remove(&id);
        self.runtime.remove(&id);
        if tracked {
            debug!("Unregistered NPC {}", id);
        }
    }

    /// Marks an NPC dead and schedules corpse removal and, for typed NPCs, a respawn.
    pub fn on_npc_death(&self, npc: &SharedCharacter) {
        let (id, monster_type, spawn_position, respawn_delay, owner) = {
            let c = npc.read();
            if c.player_controlled {
                return;
            }
            (c.id, c.monster_type, c.spawn_position, c.npc.respawn_delay_ms, c.owner)
        };

        if let Some(mut state) = self.states.get_mut(&id) {
            *state = AiState::Dead;
        }
        self.targets.remove(&id);

        let Some(shard) = self.shard() else {
            warn!("NPC {} died before the AI engine was initialized", id);
            return;
        };
        let now = shard.current_time_ms();

        self.removals.push(PendingRemoval {
            entity: id,
            due_ms: now + self.config.corpse_delay_ms,
        });

        let respawn_scheduled = monster_type.is_some();
        if respawn_scheduled {
            self.respawns.push(PendingRespawn {
                monster_type,
                spawn_position,
                due_ms: now + respawn_delay,
                owner,
            });
        }

        info!("NPC {} died, respawn={}", id, respawn_scheduled);
        publish(
            self.events.as_ref(),
            SimEvent::NpcDied {
                entity_id: id,
                respawn_scheduled,
            },
        );
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Processes due removals and respawns, then runs a decision pass if the
    /// decision interval has elapsed.
    pub fn tick(&self, delta_ms: f64, current_time_ms: u64, shutdown: &ShutdownSignal) {
        if shutdown.is_triggered() {
            return;
        }
        let Some(shard) = self.shard() else {
            return;
        };

        self.process_removals(shard.as_ref(), current_time_ms);
        self.process_respawns(shard.as_ref(), current_time_ms);

        let last = self.last_decision_ms.load(Ordering::Relaxed);
        if current_time_ms < last + self.config.decision_interval_ms {
            return;
        }
        self.last_decision_ms.store(current_time_ms, Ordering::Relaxed);

        let snapshot: Vec<(EntityId, SharedCharacter)> = self
            .npcs
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        trace!("AI pass over {} NPCs (frame {:.1} ms)", snapshot.len(), delta_ms);

        for (id, npc) in snapshot {
            if shutdown.is_triggered() {
                break;
            }
            let Some(state) = self.state(id) else {
                continue;
            };
            if !state.is_active() || !self.hostile.contains(npc.read().faction) {
                continue;
            }
            if let Err(e) = self.update_npc(shard.as_ref(), id, &npc, state, current_time_ms) {
                warn!("AI update for NPC {} failed: {}", id, e);
            }
        }
    }

    fn process_removals(&self, shard: &dyn Shard, now: u64) {
        self.removals.drain_requeue(|entry| {
            if now < entry.due_ms {
                return Some(entry);
            }
            self.unregister_npc(entry.entity);
            shard.entities().remove(entry.entity);
            debug!("Removed corpse {}", entry.entity);
            publish(
                self.events.as_ref(),
                SimEvent::NpcRemoved {
                    entity_id: entry.entity,
                },
            );
            None
        });
    }

    fn process_respawns(&self, shard: &dyn Shard, now: u64) {
        self.respawns.drain_requeue(|entry| {
            if now < entry.due_ms {
                return Some(entry);
            }
            match shard
                .entities()
                .spawn_character(entry.monster_type, entry.spawn_position, entry.owner)
            {
                Ok(npc) => {
                    self.register_npc(&npc);
                    let id = npc.read().id;
                    info!("Respawned NPC type {} as {}", entry.monster_type, id);
                    publish(
                        self.events.as_ref(),
                        SimEvent::NpcRespawned {
                            entity_id: id,
                            monster_type: entry.monster_type,
                            position: entry.spawn_position,
                        },
                    );
                },
                Err(e) => {
                    warn!("Respawn of type {} failed: {}", entry.monster_type, e);
                    publish(
                        self.events.as_ref(),
                        SimEvent::SpawnFailed {
                            monster_type: entry.monster_type,
                            reason: e.to_string(),
                        },
                    );
                },
            }
            None
        });
    }

    fn update_npc(
        &self,
        shard: &dyn Shard,
        id: EntityId,
        npc: &SharedCharacter,
        state: AiState,
        now: u64,
    ) -> SimResult<()> {
        let (position, spawn, profile, alive) = {
            let c = npc.read();
            (c.position, c.spawn_position, c.npc, c.is_alive())
        };
        if !alive {
            return Ok(());
        }

        let target = self.acquire_target(shard, id, position);
        let last_attack = self.runtime.get(&id).map_or(0, |r| r.last_attack_ms);
        let perception = Perception {
            target: target.map(|t| t.id),
            distance_to_target: target.map_or(f32::MAX, |t| position.distance(t.position)),
            distance_to_spawn: position.distance(spawn),
            attack_ready: now >= last_attack + profile.attack_interval_ms,
        };

        let decision = decide(state, &perception, &Engagement::from(&profile), &self.config);
        for action in decision.actions {
            self.execute(shard, id, npc, action, target, now)?;
        }
        self.set_state(id, decision.next);
        Ok(())
    }

    fn execute(
        &self,
        shard: &dyn Shard,
        id: EntityId,
        npc: &SharedCharacter,
        action: AiAction,
        target: Option<TargetInfo>,
        now: u64,
    ) -> SimResult<()> {
        match action {
            AiAction::PinTarget(target_id) => self.pin_target(id, target_id),
            AiAction::ClearTarget => {
                self.targets.remove(&id);
                self.reset_path(id);
            },
            AiAction::Pursue(_) => {
                if let Some(target) = target {
                    let speed = npc.read().npc.fast_speed;
                    self.move_npc(shard, id, npc, target.position, speed, now);
                }
            },
            AiAction::Fire(_) => {
                if let Some(target) = target {
                    self.fire_weapon(shard, id, npc, &target, now)?;
                }
            },
            AiAction::FaceTarget(_) => {
                if let Some(target) = target {
                    {
                        let mut c = npc.write();
                        c.movement_state = MovementState::STANDING;
                        if let Some(facing) = facing_towards(c.position, target.position) {
                            c.face(facing);
                        }
                    }
                    broadcast_movement(shard, npc);
                }
            },
            AiAction::ReturnHome => {
                let (spawn, speed) = {
                    let c = npc.read();
                    (c.spawn_position, c.npc.normal_speed)
                };
                self.move_npc(shard, id, npc, spawn, speed, now);

                let missing = npc.read().missing_health();
                if missing > 0 {
                    let regen = ((missing as f32 * self.config.return_regen_fraction) as i32).max(1);
                    shard.entities().apply_healing(id, regen);
                }
            },
            AiAction::ArriveHome => {
                {
                    let mut c = npc.write();
                    c.position = c.spawn_position;
                    c.movement_state = MovementState::STANDING;
                    c.face(Facing::FORWARD);
                }
                broadcast_movement(shard, npc);
                self.reset_path(id);

                let missing = npc.read().missing_health();
                if missing > 0 {
                    shard.entities().apply_healing(id, missing);
                }
            },
        }
        Ok(())
    }

    /// Pins a target unless the NPC is dead or untracked. The state entry is
    /// held across the insert.
    fn pin_target(&self, id: EntityId, target: EntityId) {
        if let Some(state) = self.states.get(&id) {
            if *state != AiState::Dead {
                self.targets.insert(id, target);
            }
        }
    }

    fn set_state(&self, id: EntityId, next: AiState) {
        if let Some(mut state) = self.states.get_mut(&id) {
            if *state != AiState::Dead {
                *state = next;
            }
        }
    }

    // ========================================================================
    // Targeting
    // ========================================================================

    /// Pinned target while it is a living player, otherwise the nearest living player.
    fn acquire_target(&self, shard: &dyn Shard, id: EntityId, position: Vec3) -> Option<TargetInfo> {
        let pinned = self.targets.get(&id).map(|t| *t.value());
        if let Some(pinned) = pinned {
            let valid = shard.entities().character(pinned).and_then(|handle| {
                let c = handle.read();
                (c.player_controlled && c.is_alive()).then(|| TargetInfo {
                    id: c.id,
                    position: c.position,
                    collision_height: c.collision_height,
                })
            });
            if valid.is_some() {
                return valid;
            }
            self.targets.remove(&id);
        }

        let mut nearest: Option<(TargetInfo, f32)> = None;
        for handle in shard.observers().playing_characters() {
            let c = handle.read();
            if !c.player_controlled || !c.is_alive() {
                continue;
            }
            let distance = position.distance(c.position);
            if nearest.map_or(true, |(_, best)| distance < best) {
                nearest = Some((
                    TargetInfo {
                        id: c.id,
                        position: c.position,
                        collision_height: c.collision_height,
                    },
                    distance,
                ));
            }
        }
        nearest.map(|(target, _)| target)
    }

    // ========================================================================
    // Movement
    // ========================================================================

    fn reset_path(&self, id: EntityId) {
        if let Some(mut runtime) = self.runtime.get_mut(&id) {
            runtime.path.clear();
            runtime.cursor = 0;
        }
    }

    /// Next point to walk toward: a path waypoint when a grid is available,
    /// otherwise the destination itself.
    fn next_waypoint(&self, shard: &dyn Shard, id: EntityId, position: Vec3, destination: Vec3, now: u64) -> Vec3 {
        let Some(grid) = shard.nav_grid().filter(|g| g.is_built()) else {
            return destination;
        };
        let needs_path = {
            let Some(runtime) = self.runtime.get(&id) else {
                return destination;
            };
            runtime.path.is_empty()
                || runtime.cursor >= runtime.path.len()
                || now >= runtime.last_path_ms + self.config.repath_interval_ms
        };
        // Search without holding the runtime entry.
        let fresh = needs_path.then(|| grid.find_path(position, destination));

        let Some(mut runtime) = self.runtime.get_mut(&id) else {
            return destination;
        };
        if let Some(path) = fresh {
            trace!("NPC {} repathed: {} waypoints", id, path.len());
            runtime.path = path;
            runtime.cursor = 0;
            runtime.last_path_ms = now;
        }
        if runtime.path.is_empty() || runtime.cursor >= runtime.path.len() {
            return destination;
        }

        let advance_distance = grid.cell_size() * self.config.waypoint_advance_factor;
        let cursor = runtime.cursor;
        if position.distance(runtime.path[cursor]) < advance_distance && cursor + 1 < runtime.path.len() {
            runtime.cursor += 1;
        }
        runtime.path[runtime.cursor]
    }

    fn move_npc(&self, shard: &dyn Shard, id: EntityId, npc: &SharedCharacter, destination: Vec3, speed: f32, now: u64) {
        let position = npc.read().position;
        if (destination - position).length_squared() < MIN_FACING_DISTANCE_SQ {
            return;
        }

        let waypoint = self.next_waypoint(shard, id, position, destination, now);
        let to_waypoint = waypoint - position;
        if to_waypoint.length_squared() < MIN_FACING_DISTANCE_SQ {
            return;
        }

        let step = (speed * self.config.decision_interval_secs()).min(position.distance(destination));
        let mut next = position + to_waypoint.normalize() * step;
        if let Some(height) = shard.physics().sample_ground_height(next) {
            next.z = height;
        }

        {
            let mut c = npc.write();
            c.position = next;
            c.movement_state = MovementState::RUNNING;
            if let Some(facing) = facing_towards(next, destination) {
                c.face(facing);
            }
        }
        broadcast_movement(shard, npc);
    }

    // ========================================================================
    // Weapon fire
    // ========================================================================

    fn fire_weapon(
        &self,
        shard: &dyn Shard,
        id: EntityId,
        npc: &SharedCharacter,
        target: &TargetInfo,
        now: u64,
    ) -> SimResult<()> {
        if let Some(mut runtime) = self.runtime.get_mut(&id) {
            runtime.last_attack_ms = now;
        }
        npc.write().fire_burst_time = now;
        shard.entities().flush_changes(id);

        let (origin, profile, weapon) = {
            let c = npc.read();
            let origin = c.position + Vec3::Z * (c.collision_height * MUZZLE_HEIGHT_FRACTION);
            (origin, c.npc, shard.armory().equipped_weapon(&c))
        };
        let aim_point = target.position + Vec3::Z * (target.collision_height * AIM_HEIGHT_FRACTION);
        let direction = (aim_point - origin).normalize_or_zero();
        if direction == Vec3::ZERO {
            return Ok(());
        }
        let direction = apply_cone_spread(direction, profile.aim_inaccuracy, &mut self.rng.lock());

        let ammo = profile.ammo.and_then(|a| shard.armory().ammo(a));
        let shot = Shot {
            source: id,
            trace: 0,
            origin,
            direction,
            range: profile.attack_range,
            damage: profile.damage,
            headshot_mult: weapon.map_or(1.0, |w| w.headshot_mult).max(1.0),
            damage_type: ammo.map(|a| a.damage_type).unwrap_or_default(),
            ammo,
        };
        let result = self.projectiles.resolve_hitscan(&shot)?;
        if let Some(hit) = result.direct {
            debug!("NPC {} shot {} for {}", id, hit.target, hit.damage);
        }
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Current state of a tracked NPC.
    #[must_use]
    pub fn state(&self, id: EntityId) -> Option<AiState> {
        self.states.get(&id).map(|s| *s.value())
    }

    /// Pinned target of an NPC.
    #[must_use]
    pub fn target(&self, id: EntityId) -> Option<EntityId> {
        self.targets.get(&id).map(|t| *t.value())
    }

    /// Whether an NPC is tracked.
    #[must_use]
    pub fn is_tracked(&self, id: EntityId) -> bool {
        self.npcs.contains_key(&id)
    }

    /// Number of tracked NPCs.
    #[must_use]
    pub fn npc_count(&self) -> usize {
        self.npcs.len()
    }

    /// Cached path of an NPC.
    #[must_use]
    pub fn cached_path(&self, id: EntityId) -> Vec<Vec3> {
        self.runtime.get(&id).map(|r| r.path.clone()).unwrap_or_default()
    }

    /// Removals not yet processed.
    #[must_use]
    pub fn pending_removals(&self) -> usize {
        self.removals.len()
    }

    /// Respawns not yet processed.
    #[must_use]
    pub fn pending_respawns(&self) -> usize {
        self.respawns.len()
    }
}

impl std::fmt::Debug for AiEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiEngine")
            .field("npcs", &self.npcs.len())
            .field("pending_removals", &self.removals.len())
            .field("pending_respawns", &self.respawns.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Pushes an NPC's pose to playing observers and flushes its other changes.
fn broadcast_movement(shard: &dyn Shard, npc: &SharedCharacter) {
    let short_time = shard.observers().short_time();
    let pose = {
        let mut c = npc.write();
        c.movement_short_time = short_time;
        c.pose()
    };
    shard.observers().broadcast_pose(pose);
    shard.entities().flush_changes(pose.entity);
}
