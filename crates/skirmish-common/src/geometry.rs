//! Spatial helpers shared by the AI and projectile code.
//!
//! The simulation world is Z-up: ground height is `z` and yaw rotates about `+Z`.
//! Yaw is measured as `atan2(dx, dy)`, so it is zero for a target straight
//! ahead along `+Y` and a quarter turn for a target along `+X`. The aim vector
//! carries the actual look direction.

use glam::{Quat, Vec3};
use std::f32::consts::TAU;

/// Offsets shorter than this (squared) are treated as "already there".
pub const MIN_FACING_DISTANCE_SQ: f32 = 0.01;

/// Aim direction and body rotation for an entity looking at a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Facing {
    /// Normalized aim direction
    pub aim: Vec3,
    /// Yaw-only body rotation
    pub rotation: Quat,
}

impl Facing {
    /// Facing straight ahead (`+Y`, no yaw).
    pub const FORWARD: Self = Self {
        aim: Vec3::Y,
        rotation: Quat::IDENTITY,
    };
}

/// Computes the facing needed to look from `from` towards `to`.
///
/// Returns `None` when the two points are too close for a stable direction.
#[must_use]
pub fn facing_towards(from: Vec3, to: Vec3) -> Option<Facing> {
    let offset = to - from;
    if offset.length_squared() <= MIN_FACING_DISTANCE_SQ {
        return None;
    }

    let yaw = offset.x.atan2(offset.y);
    Some(Facing {
        aim: offset.normalize(),
        rotation: Quat::from_axis_angle(Vec3::Z, yaw),
    })
}

/// Deflects `direction` by a random amount inside a cone of half-angle `max_angle` (radians).
///
/// The deviation angle is drawn uniformly from `[0, max_angle)` and the azimuth uniformly
/// from `[0, 2π)`; the offset is built in the plane orthogonal to `direction`.
#[must_use]
pub fn apply_cone_spread(direction: Vec3, max_angle: f32, rng: &mut fastrand::Rng) -> Vec3 {
    if max_angle <= 0.0 {
        return direction;
    }

    let angle = rng.f32() * max_angle;
    let azimuth = rng.f32() * TAU;

    let up = if direction.z.abs() < 0.99 { Vec3::Z } else { Vec3::X };
    let right = direction.cross(up).normalize();
    let actual_up = right.cross(direction);

    let offset = (right * azimuth.cos() + actual_up * azimuth.sin()) * angle.sin();
    (direction + offset).normalize()
}

/// Checks whether a hit lands in the head zone of a character.
///
/// The head zone is everything at or above `fraction` of the collision height,
/// measured from the character's base position.
#[must_use]
pub fn is_headshot(hit: Vec3, target_base: Vec3, collision_height: f32, fraction: f32) -> bool {
    hit.z - target_base.z >= collision_height * fraction
}
