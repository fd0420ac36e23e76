//! # Skirmish Common
//!
//! Common types, utilities, and shared abstractions for the Skirmish simulation core.
//!
//! This crate provides foundational types used across the simulation crates:
//! - ID types (EntityId, MonsterTypeId, FactionId, ...)
//! - Geometry helpers (facing, aim cone, headshot zone)
//! - Common error types
//! - Shutdown signalling for the host loop
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod geometry;
pub mod ids;
pub mod shutdown;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::geometry::*;
    pub use crate::ids::*;
    pub use crate::shutdown::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_generation() {
        let id1 = EntityId::new();
        let id2 = EntityId::new();
        assert_ne!(id1, id2);
        assert!(id1.is_valid());
        assert!(!EntityId::NULL.is_valid());
    }

    #[test]
    fn test_monster_type_none() {
        assert!(!MonsterTypeId::NONE.is_some());
        assert!(MonsterTypeId::new(356).is_some());
    }

    #[test]
    fn test_shutdown_signal_shared_between_clones() {
        let signal = ShutdownSignal::new();
        let observer = signal.clone();
        assert!(!observer.is_triggered());
        signal.trigger();
        assert!(observer.is_triggered());
    }
}
