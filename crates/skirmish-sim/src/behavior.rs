//! NPC combat state machine.
//!
//! The decision logic is a pure function from the current [`AiState`] and a
//! [`Perception`] snapshot to a [`Decision`]: the next state plus the list of
//! side effects the engine must carry out. Keeping it free of I/O lets the
//! transition table be tested without a live shard.
//!
//! | State     | Condition                                   | Result                         |
//! |-----------|---------------------------------------------|--------------------------------|
//! | Idle      | target within aggro radius                  | Chase, pin target              |
//! | Chase     | no target, or target/spawn beyond leash     | Returning, clear target        |
//! | Chase     | target within attack range                  | Attack                         |
//! | Chase     | otherwise                                   | pursue at fast speed           |
//! | Attack    | no target                                   | Idle, clear target             |
//! | Attack    | target beyond break distance                | Chase                          |
//! | Attack    | spawn beyond leash                          | Returning, clear target        |
//! | Attack    | otherwise                                   | fire when ready, face target   |
//! | Returning | within snap distance of spawn               | Idle, arrive home              |
//! | Returning | otherwise                                   | walk home and regenerate       |

use serde::{Deserialize, Serialize};
use skirmish_common::EntityId;

use crate::config::AiConfig;
use crate::world::NpcProfile;

/// Behavior state of a tracked NPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AiState {
    /// Waiting at spawn for a target
    #[default]
    Idle,
    /// Running toward a target
    Chase,
    /// In range and shooting
    Attack,
    /// Walking back to spawn
    Returning,
    /// Dead, awaiting removal
    Dead,
}

impl AiState {
    /// Returns whether this state still makes decisions.
    #[must_use]
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Dead)
    }
}

/// What the NPC knows about the world at decision time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Perception {
    /// Nearest living player (pinned target if still valid)
    pub target: Option<EntityId>,
    /// Distance to `target`, `f32::MAX` without one
    pub distance_to_target: f32,
    /// Distance from the NPC to its spawn point
    pub distance_to_spawn: f32,
    /// Whether the attack interval has elapsed
    pub attack_ready: bool,
}

impl Perception {
    /// Perception with no target in sight.
    #[must_use]
    pub fn alone(distance_to_spawn: f32) -> Self {
        Self {
            target: None,
            distance_to_target: f32::MAX,
            distance_to_spawn,
            attack_ready: false,
        }
    }

    /// Perception with a target at `distance`.
    #[must_use]
    pub fn with_target(target: EntityId, distance: f32, distance_to_spawn: f32) -> Self {
        Self {
            target: Some(target),
            distance_to_target: distance,
            distance_to_spawn,
            attack_ready: false,
        }
    }

    /// Set attack readiness.
    #[must_use]
    pub fn ready(mut self, attack_ready: bool) -> Self {
        self.attack_ready = attack_ready;
        self
    }
}

/// Distances that drive the state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Engagement {
    /// Notice distance
    pub aggro_radius: f32,
    /// Pursuit limit
    pub leash_radius: f32,
    /// Shooting distance
    pub attack_range: f32,
}

impl From<&NpcProfile> for Engagement {
    fn from(profile: &NpcProfile) -> Self {
        Self {
            aggro_radius: profile.aggro_radius,
            leash_radius: profile.leash_radius,
            attack_range: profile.attack_range,
        }
    }
}

/// Side effect requested by a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiAction {
    /// Remember this target across decisions
    PinTarget(EntityId),
    /// Forget the pinned target
    ClearTarget,
    /// Move toward the target at fast speed
    Pursue(EntityId),
    /// Shoot at the target and record the attack time
    Fire(EntityId),
    /// Stand still facing the target and broadcast the pose
    FaceTarget(EntityId),
    /// Walk toward spawn at normal speed and regenerate
    ReturnHome,
    /// Snap to spawn, face forward, broadcast, heal to full
    ArriveHome,
}

/// Outcome of one decision step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// State after this step
    pub next: AiState,
    /// Side effects, in execution order
    pub actions: Vec<AiAction>,
}

impl Decision {
    fn stay(state: AiState) -> Self {
        Self {
            next: state,
            actions: Vec::new(),
        }
    }

    fn to(next: AiState, actions: Vec<AiAction>) -> Self {
        Self { next, actions }
    }
}

/// Runs one step of the state machine.
#[must_use]
pub fn decide(state: AiState, perception: &Perception, engagement: &Engagement, tuning: &AiConfig) -> Decision {
    let leash = engagement.leash_radius;

    match state {
        AiState::Dead => Decision::stay(AiState::Dead),

        AiState::Idle => match perception.target {
            Some(target) if perception.distance_to_target <= engagement.aggro_radius => {
                Decision::to(AiState::Chase, vec![AiAction::PinTarget(target)])
            }
            _ => Decision::stay(AiState::Idle),
        },

        AiState::Chase => {
            let target = match perception.target {
                Some(target)
                    if perception.distance_to_target <= leash && perception.distance_to_spawn <= leash =>
                {
                    target
                }
                _ => return Decision::to(AiState::Returning, vec![AiAction::ClearTarget]),
            };

            if perception.distance_to_target <= engagement.attack_range {
                Decision::stay(AiState::Attack)
            } else {
                Decision::to(AiState::Chase, vec![AiAction::Pursue(target)])
            }
        }

        AiState::Attack => {
            let Some(target) = perception.target else {
                return Decision::to(AiState::Idle, vec![AiAction::ClearTarget]);
            };

            if perception.distance_to_target > engagement.attack_range * tuning.attack_break_factor {
                return Decision::stay(AiState::Chase);
            }
            if perception.distance_to_spawn > leash {
                return Decision::to(AiState::Returning, vec![AiAction::ClearTarget]);
            }

            let mut actions = Vec::with_capacity(2);
            if perception.attack_ready {
                actions.push(AiAction::Fire(target));
            }
            actions.push(AiAction::FaceTarget(target));
            Decision::to(AiState::Attack, actions)
        }

        AiState::Returning => {
            if perception.distance_to_spawn < tuning.return_snap_distance {
                Decision::to(AiState::Idle, vec![AiAction::ArriveHome])
            } else {
                Decision::to(AiState::Returning, vec![AiAction::ReturnHome])
            }
        }
    }
}
