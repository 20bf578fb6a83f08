//! Kinematic state block carried in every sync state

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::data::collection::MoverDataStruct;

/// Location error (per axis) tolerated before a client is corrected.
pub const RECONCILE_DIST_TOLERANCE: f32 = 5.0;

/// Beyond this distance between samples, interpolation snaps instead of blending.
pub const TELEPORT_SNAP_DISTANCE: f32 = 500.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatedMotionState {
    pub location: Vector3<f32>,
    pub orientation: UnitQuaternion<f32>,
    /// units/s
    pub velocity: Vector3<f32>,
    /// degrees/s
    pub angular_velocity_degrees: Vector3<f32>,
    pub move_direction_intent: Vector3<f32>,
    /// Id of the object this actor stands on, if any
    pub movement_base: Option<u32>,
}

impl Default for UpdatedMotionState {
    fn default() -> Self {
        Self {
            location: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            velocity: Vector3::zeros(),
            angular_velocity_degrees: Vector3::zeros(),
            move_direction_intent: Vector3::zeros(),
            movement_base: None,
        }
    }
}

impl UpdatedMotionState {
    pub fn at(location: Vector3<f32>) -> Self {
        Self { location, ..Self::default() }
    }
}

fn nearly_equal(a: &Vector3<f32>, b: &Vector3<f32>, tolerance: f32) -> bool {
    (a - b).iter().all(|d| d.abs() <= tolerance)
}

impl MoverDataStruct for UpdatedMotionState {
    fn should_reconcile(&self, authority: &dyn MoverDataStruct) -> bool {
        let Some(auth) = authority.downcast_ref::<UpdatedMotionState>() else {
            return true;
        };
        let near_enough = self.movement_base == auth.movement_base
            && nearly_equal(&self.location, &auth.location, RECONCILE_DIST_TOLERANCE);
        let fast_enough = nearly_equal(&self.velocity, &auth.velocity, RECONCILE_DIST_TOLERANCE);
        !near_enough || !fast_enough
    }

    fn interpolate(&mut self, from: &dyn MoverDataStruct, to: &dyn MoverDataStruct, pct: f32) {
        let (Some(from), Some(to)) =
            (from.downcast_ref::<UpdatedMotionState>(), to.downcast_ref::<UpdatedMotionState>())
        else {
            return;
        };

        if (to.location - from.location).norm_squared() > TELEPORT_SNAP_DISTANCE * TELEPORT_SNAP_DISTANCE {
            *self = to.clone();
            return;
        }

        self.movement_base = to.movement_base;
        self.location = from.location.lerp(&to.location, pct);
        self.orientation = from.orientation.slerp(&to.orientation, pct);
        self.velocity = from.velocity.lerp(&to.velocity, pct);
        self.angular_velocity_degrees = from.angular_velocity_degrees.lerp(&to.angular_velocity_degrees, pct);
        self.move_direction_intent = from.move_direction_intent.lerp(&to.move_direction_intent, pct);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_tolerance() {
        let local = UpdatedMotionState::at(Vector3::new(100.0, 0.0, 0.0));
        let mut auth = local.clone();
        auth.location.x += 4.0;
        assert!(!local.should_reconcile(&auth));
        auth.location.x += 2.0;
        assert!(local.should_reconcile(&auth));

        let mut moving = local.clone();
        moving.velocity.z = -50.0;
        assert!(local.should_reconcile(&moving));
    }

    #[test]
    fn test_interpolate_blends_nearby_and_snaps_far() {
        let from = UpdatedMotionState::at(Vector3::new(0.0, 0.0, 0.0));
        let to = UpdatedMotionState::at(Vector3::new(100.0, 0.0, 0.0));
        let mut out = UpdatedMotionState::default();
        out.interpolate(&from, &to, 0.5);
        assert!((out.location.x - 50.0).abs() < 1e-4);

        let far = UpdatedMotionState::at(Vector3::new(1000.0, 0.0, 0.0));
        out.interpolate(&from, &far, 0.1);
        assert_eq!(out.location.x, 1000.0);
    }
}
