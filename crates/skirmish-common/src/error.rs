//! Error types for the Skirmish simulation core.

use thiserror::Error;

use crate::ids::MonsterTypeId;

/// Top-level error type for simulation operations.
#[derive(Debug, Error)]
pub enum SimError {
    /// The entity registry could not create a character
    #[error("Failed to spawn monster type {monster_type}: {reason}")]
    SpawnFailed {
        /// Requested archetype
        monster_type: MonsterTypeId,
        /// Why the registry refused
        reason: String,
    },

    /// An engine was used before `init` attached a shard
    #[error("Simulation context not initialized")]
    NotInitialized,
}

/// Result type alias for simulation operations.
pub type SimResult<T> = Result<T, SimError>;
