//! Updated component collaborator
//!
//! The simulation never owns collision; it asks an [`UpdatedComponent`] to
//! sweep and teleport. [`KinematicBody`] is the in-memory implementation used
//! by tests and the scenario runner: free space above an optional flat floor.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Blocking hit reported by a sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveHit {
    /// Fraction of the requested delta applied before the hit (0.0-1.0)
    pub time: f32,
    pub normal: Vector3<f32>,
    pub location: Vector3<f32>,
}

impl MoveHit {
    /// True when the hit surface can be stood on.
    pub fn is_walkable(&self, up: &Vector3<f32>, min_normal_dot: f32) -> bool {
        self.normal.dot(up) >= min_normal_dot
    }
}

pub trait UpdatedComponent: Send {
    fn location(&self) -> Vector3<f32>;

    fn orientation(&self) -> UnitQuaternion<f32>;

    fn up_direction(&self) -> Vector3<f32> {
        Vector3::z()
    }

    /// Sweep by `delta`, stopping at the first blocking hit.
    fn move_by(&mut self, delta: Vector3<f32>, new_orientation: UnitQuaternion<f32>) -> Option<MoveHit>;

    /// Place the component without sweeping. Returns false if the spot is unavailable.
    fn teleport_to(&mut self, location: Vector3<f32>, orientation: UnitQuaternion<f32>) -> bool;

    fn half_height(&self) -> f32;

    fn set_half_height(&mut self, half_height: f32);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinematicBody {
    pub location: Vector3<f32>,
    pub orientation: UnitQuaternion<f32>,
    pub half_height: f32,
    /// Height of an infinite flat floor, if any
    pub floor_height: Option<f32>,
}

impl Default for KinematicBody {
    fn default() -> Self {
        Self {
            location: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            half_height: 90.0,
            floor_height: None,
        }
    }
}

impl KinematicBody {
    pub fn new(location: Vector3<f32>) -> Self {
        Self { location, ..Self::default() }
    }

    pub fn with_floor(mut self, floor_height: f32) -> Self {
        self.floor_height = Some(floor_height);
        self
    }

    fn bottom(&self, location: &Vector3<f32>) -> f32 {
        location.z - self.half_height
    }

    /// Resting on the floor (within `tolerance` units).
    pub fn is_on_floor(&self, tolerance: f32) -> bool {
        match self.floor_height {
            Some(floor) => (self.bottom(&self.location) - floor).abs() <= tolerance,
            None => false,
        }
    }
}

impl UpdatedComponent for KinematicBody {
    fn location(&self) -> Vector3<f32> {
        self.location
    }

    fn orientation(&self) -> UnitQuaternion<f32> {
        self.orientation
    }

    fn move_by(&mut self, delta: Vector3<f32>, new_orientation: UnitQuaternion<f32>) -> Option<MoveHit> {
        self.orientation = new_orientation;
        let target = self.location + delta;

        let Some(floor) = self.floor_height else {
            self.location = target;
            return None;
        };

        let start_bottom = self.bottom(&self.location);
        let end_bottom = self.bottom(&target);
        if delta.z >= 0.0 || end_bottom >= floor {
            self.location = target;
            return None;
        }

        let time = if start_bottom <= floor {
            0.0
        } else {
            ((start_bottom - floor) / (start_bottom - end_bottom)).clamp(0.0, 1.0)
        };
        let mut blocked = self.location + delta * time;
        blocked.z = blocked.z.max(floor + self.half_height);
        self.location = blocked;

        Some(MoveHit { time, normal: Vector3::z(), location: blocked })
    }

    fn teleport_to(&mut self, location: Vector3<f32>, orientation: UnitQuaternion<f32>) -> bool {
        if let Some(floor) = self.floor_height {
            if self.bottom(&location) < floor {
                return false;
            }
        }
        self.location = location;
        self.orientation = orientation;
        true
    }

    fn half_height(&self) -> f32 {
        self.half_height
    }

    fn set_half_height(&mut self, half_height: f32) {
        // Keep the feet planted when the capsule shrinks or grows
        self.location.z += half_height - self.half_height;
        self.half_height = half_height;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_move_without_floor() {
        let mut body = KinematicBody::new(Vector3::new(0.0, 0.0, 100.0));
        let hit = body.move_by(Vector3::new(10.0, 0.0, -500.0), UnitQuaternion::identity());
        assert!(hit.is_none());
        assert_eq!(body.location, Vector3::new(10.0, 0.0, -400.0));
    }

    #[test]
    fn test_floor_blocks_downward_sweep() {
        let mut body = KinematicBody::new(Vector3::new(0.0, 0.0, 190.0)).with_floor(0.0);
        let hit = body.move_by(Vector3::new(0.0, 0.0, -200.0), UnitQuaternion::identity()).unwrap();
        assert!((hit.time - 0.5).abs() < 1e-5);
        assert!((body.location.z - 90.0).abs() < 1e-4);
        assert!(body.is_on_floor(0.01));
        assert!(hit.is_walkable(&Vector3::z(), 0.7));
    }

    #[test]
    fn test_teleport_below_floor_fails() {
        let mut body = KinematicBody::new(Vector3::new(0.0, 0.0, 90.0)).with_floor(0.0);
        assert!(!body.teleport_to(Vector3::new(0.0, 0.0, 10.0), UnitQuaternion::identity()));
        assert!(body.teleport_to(Vector3::new(500.0, 0.0, 300.0), UnitQuaternion::identity()));
        assert_eq!(body.location.x, 500.0);
    }

    #[test]
    fn test_half_height_change_keeps_feet() {
        let mut body = KinematicBody::new(Vector3::new(0.0, 0.0, 90.0)).with_floor(0.0);
        body.set_half_height(40.0);
        assert!((body.location.z - 40.0).abs() < 1e-5);
        assert!(body.is_on_floor(0.01));
    }
}
