//! Event bus for simulation notifications.
//!
//! Engines publish [`SimEvent`]s through a cloned sender when one is attached;
//! the host drains the bus once per frame.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::warn;

use skirmish_common::{EntityId, FactionId, MonsterTypeId};

/// Event types that can be sent through the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    /// NPC started being tracked by the AI engine
    NpcRegistered {
        /// Entity ID
        entity_id: EntityId,
        /// Monster archetype
        monster_type: MonsterTypeId,
        /// Faction
        faction: FactionId,
        /// Whether the NPC runs combat AI
        hostile: bool,
    },
    /// A character's health reached zero
    CharacterKilled {
        /// Entity ID
        entity_id: EntityId,
        /// Killer (if any)
        source: Option<EntityId>,
    },
    /// AI engine processed an NPC death
    NpcDied {
        /// Entity ID
        entity_id: EntityId,
        /// Whether a replacement was scheduled
        respawn_scheduled: bool,
    },
    /// Corpse removed from the world
    NpcRemoved {
        /// Entity ID
        entity_id: EntityId,
    },
    /// Replacement NPC spawned
    NpcRespawned {
        /// New entity ID
        entity_id: EntityId,
        /// Monster archetype
        monster_type: MonsterTypeId,
        /// Spawn position
        position: Vec3,
    },
    /// Replacement NPC could not be spawned
    SpawnFailed {
        /// Monster archetype
        monster_type: MonsterTypeId,
        /// Failure description
        reason: String,
    },
    /// Direct weapon hit on a character
    CharacterHit {
        /// Target entity
        target: EntityId,
        /// Shooter
        source: EntityId,
        /// Damage applied
        damage: i32,
        /// Headshot
        critical: bool,
    },
    /// Splash damage on a character
    SplashHit {
        /// Target entity
        target: EntityId,
        /// Shooter
        source: EntityId,
        /// Damage applied
        damage: i32,
        /// Distance from the impact point
        distance: f32,
    },
    /// Travel-time projectile ran out of range without hitting anything
    ProjectileExpired {
        /// Shooter
        source: EntityId,
        /// Final position
        position: Vec3,
    },
}

/// Event bus for broadcasting events to subscribers.
#[derive(Debug)]
pub struct EventBus {
    /// Sender for broadcasting events
    sender: Sender<SimEvent>,
    /// Receiver for collecting events
    receiver: Receiver<SimEvent>,
    /// Channel capacity
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus {
    /// Creates a new event bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Publishes an event to the bus.
    pub fn publish(&self, event: SimEvent) {
        publish(Some(&self.sender), event);
    }

    /// Drains all pending events.
    pub fn drain(&self) -> Vec<SimEvent> {
        self.receiver.try_iter().collect()
    }

    /// Returns the number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Returns the channel capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Creates a new sender handle for publishing events.
    #[must_use]
    pub fn sender(&self) -> Sender<SimEvent> {
        self.sender.clone()
    }
}

/// Sends through an optional sender without blocking; full buses drop the event.
pub(crate) fn publish(sender: Option<&Sender<SimEvent>>, event: SimEvent) {
    let Some(sender) = sender else {
        return;
    };
    if let Err(TrySendError::Full(event)) = sender.try_send(event) {
        warn!("Event bus full, dropping {:?}", event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_and_drain() {
        let bus = EventBus::new(8);
        bus.publish(SimEvent::NpcRemoved {
            entity_id: EntityId::from_raw(1),
        });
        bus.sender()
            .try_send(SimEvent::NpcRemoved {
                entity_id: EntityId::from_raw(2),
            })
            .expect("send");

        assert_eq!(bus.pending_count(), 2);
        let events = bus.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_full_bus_drops_events() {
        let bus = EventBus::new(1);
        for raw in 1..=3 {
            bus.publish(SimEvent::NpcRemoved {
                entity_id: EntityId::from_raw(raw),
            });
        }
        assert_eq!(bus.pending_count(), 1);
        assert_eq!(
            bus.drain(),
            vec![SimEvent::NpcRemoved {
                entity_id: EntityId::from_raw(1)
            }]
        );
        assert_eq!(bus.capacity(), 1);
    }
}
