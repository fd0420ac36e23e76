//! # Skirmish Sim
//!
//! Server-authoritative combat simulation core.
//!
//! This crate provides the systems that run once per simulation tick:
//! - NPC AI engine with aggro, chase, attack and leash behavior
//! - Navigation grid with A* pathfinding
//! - Projectile engine (hitscan, travel-time projectiles, splash damage)
//! - Collaborator traits for the host world (entities, physics, observers, weapons)
//! - Hostile faction set and monster roster
//! - Event bus for simulation notifications
//! - TOML configuration
//! - In-memory sandbox shard

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod ai;
pub mod behavior;
pub mod config;
pub mod events;
pub mod faction;
pub mod nav;
pub mod projectile;
pub mod sandbox;
pub mod world;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::ai::*;
    pub use crate::behavior::*;
    pub use crate::config::*;
    pub use crate::events::*;
    pub use crate::faction::*;
    pub use crate::nav::*;
    pub use crate::projectile::*;
    pub use crate::sandbox::*;
    pub use crate::world::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use skirmish_common::{EntityId, FactionId, MonsterTypeId, ShutdownSignal};
    use std::sync::Arc;

    #[test]
    fn test_npc_kills_player_through_shared_shard() {
        let bus = EventBus::default();
        let shard = Arc::new(SandboxShard::flat(0.0).with_events(bus.sender()));
        let config = SimConfig::default();
        let projectiles = Arc::new(ProjectileEngine::new(config.projectiles.clone()));
        let ai = AiEngine::new(&config, Arc::clone(&projectiles)).with_seed(9);
        ai.init(shard.clone());

        let npc = shard.insert(
            Character::npc(EntityId::new(), MonsterTypeId::new(1), FactionId::new(2), Vec3::ZERO).with_profile(
                NpcProfile {
                    damage: 60,
                    attack_interval_ms: 500,
                    ..NpcProfile::default()
                },
            ),
        );
        ai.register_npc(&npc);
        let player = shard.add_player(Character::player(EntityId::new(), Vec3::new(5.0, 0.0, 0.0)));
        let player_id = player.read().id;

        let shutdown = ShutdownSignal::new();
        for step in 1..=6 {
            let now = step * 500;
            shard.set_time(now);
            ai.tick(500.0, now, &shutdown);
            projectiles.tick(500.0, now, &shutdown);
        }

        assert!(!player.read().is_alive());
        assert!(bus
            .drain()
            .iter()
            .any(|e| matches!(e, SimEvent::CharacterKilled { entity_id, .. } if *entity_id == player_id)));
        assert_eq!(ai.state(npc.read().id), Some(AiState::Idle));
    }
}
