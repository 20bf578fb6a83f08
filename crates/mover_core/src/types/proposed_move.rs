use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// How one proposed move combines with another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MoveMixMode {
    /// Velocity is added to the cumulative move
    #[default]
    AdditiveVelocity,
    /// Velocity replaces the cumulative velocity
    OverrideVelocity,
    /// The whole proposed move replaces the cumulative one
    OverrideAll,
    /// Everything is replaced except the cumulative velocity along the up axis
    OverrideAllExceptVerticalVelocity,
}

impl MoveMixMode {
    pub fn is_override(self) -> bool {
        !matches!(self, MoveMixMode::AdditiveVelocity)
    }
}

/// Movement intent produced fresh each substep by a mode or a layered move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedMove {
    /// Mode the producer would like to switch to, if any
    pub preferred_mode: Option<String>,
    /// Direction the actor intends to move in (unit or zero)
    pub direction_intent: Vector3<f32>,
    pub has_dir_intent: bool,
    /// units/s, world space
    pub linear_velocity: Vector3<f32>,
    /// degrees/s around (roll, pitch, yaw) axes
    pub angular_velocity_degrees: Vector3<f32>,
    pub mix_mode: MoveMixMode,
}

impl Default for ProposedMove {
    fn default() -> Self {
        Self {
            preferred_mode: None,
            direction_intent: Vector3::zeros(),
            has_dir_intent: false,
            linear_velocity: Vector3::zeros(),
            angular_velocity_degrees: Vector3::zeros(),
            mix_mode: MoveMixMode::AdditiveVelocity,
        }
    }
}

impl ProposedMove {
    pub fn with_mix_mode(mix_mode: MoveMixMode) -> Self {
        Self { mix_mode, ..Self::default() }
    }

    pub fn with_velocity(linear_velocity: Vector3<f32>, mix_mode: MoveMixMode) -> Self {
        Self { linear_velocity, mix_mode, ..Self::default() }
    }

    pub fn set_direction_intent(&mut self, direction: Vector3<f32>) {
        self.direction_intent = direction;
        self.has_dir_intent = true;
    }
}

/// Projection of `v` onto the (unit) `normal`.
#[inline]
pub fn project_onto_normal(v: &Vector3<f32>, normal: &Vector3<f32>) -> Vector3<f32> {
    normal * v.dot(normal)
}

/// `v` scaled down so its length doesn't exceed `max_len`.
#[inline]
pub fn clamp_to_max_size(v: Vector3<f32>, max_len: f32) -> Vector3<f32> {
    if max_len < 1.0e-8 {
        return Vector3::zeros();
    }
    let len_sq = v.norm_squared();
    if len_sq > max_len * max_len {
        v * (max_len / len_sq.sqrt())
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_additive_and_empty() {
        let mv = ProposedMove::default();
        assert_eq!(mv.mix_mode, MoveMixMode::AdditiveVelocity);
        assert_eq!(mv.linear_velocity, Vector3::zeros());
        assert!(mv.preferred_mode.is_none());
        assert!(!mv.has_dir_intent);
    }

    #[test]
    fn test_clamp_to_max_size() {
        let clamped = clamp_to_max_size(Vector3::new(300.0, 400.0, 0.0), 100.0);
        assert!((clamped.norm() - 100.0).abs() < 1e-3);
        let untouched = clamp_to_max_size(Vector3::new(3.0, 4.0, 0.0), 100.0);
        assert_eq!(untouched, Vector3::new(3.0, 4.0, 0.0));
        assert_eq!(clamp_to_max_size(Vector3::new(1.0, 0.0, 0.0), 0.0), Vector3::zeros());
    }

    #[test]
    fn test_project_onto_up() {
        let v = Vector3::new(10.0, -5.0, 42.0);
        assert_eq!(project_onto_normal(&v, &Vector3::z()), Vector3::new(0.0, 0.0, 42.0));
    }
}
