//! Free (non-grounded) movement helpers used by the flying and falling modes

use nalgebra::{UnitQuaternion, Vector3};

use crate::data::MoveInputType;
use crate::types::{clamp_to_max_size, project_onto_normal, MoveMixMode, ProposedMove};

#[derive(Debug, Clone, PartialEq)]
pub struct FreeMoveParams {
    pub move_input_type: MoveInputType,
    pub move_input: Vector3<f32>,
    pub prior_velocity: Vector3<f32>,
    pub max_speed: f32,
    pub acceleration: f32,
    pub delta_seconds: f32,
}

/// Velocity the input asks for, before acceleration limits.
pub fn desired_velocity(input_type: MoveInputType, input: Vector3<f32>, max_speed: f32) -> Vector3<f32> {
    match input_type {
        MoveInputType::DirectionalIntent => clamp_to_max_size(input, 1.0) * max_speed,
        MoveInputType::Velocity => clamp_to_max_size(input, max_speed),
        MoveInputType::Invalid | MoveInputType::None => Vector3::zeros(),
    }
}

/// Steer the prior velocity toward the input, limited by `acceleration`.
pub fn compute_controlled_free_move(params: &FreeMoveParams) -> ProposedMove {
    let desired = desired_velocity(params.move_input_type, params.move_input, params.max_speed);
    let max_delta = params.acceleration * params.delta_seconds;
    let velocity = params.prior_velocity + clamp_to_max_size(desired - params.prior_velocity, max_delta);

    let mut proposed = ProposedMove::with_velocity(velocity, MoveMixMode::AdditiveVelocity);
    if desired.norm_squared() > f32::EPSILON {
        proposed.set_direction_intent(desired.normalize());
    }
    proposed
}

/// Like [`compute_controlled_free_move`] but only steers the plane orthogonal
/// to `up`; the vertical part of the prior velocity keeps integrating gravity.
pub fn compute_falling_move(params: &FreeMoveParams, up: &Vector3<f32>, gravity: f32) -> ProposedMove {
    let prior_vertical = project_onto_normal(&params.prior_velocity, up);
    let lateral_input = params.move_input - project_onto_normal(&params.move_input, up);
    let lateral = FreeMoveParams {
        move_input: lateral_input,
        prior_velocity: params.prior_velocity - prior_vertical,
        ..params.clone()
    };
    let mut proposed = compute_controlled_free_move(&lateral);
    proposed.linear_velocity += prior_vertical - up * (gravity * params.delta_seconds);
    proposed
}

/// Rotate by an angular velocity given in degrees/s (roll, pitch, yaw).
pub fn apply_angular_velocity(
    orientation: UnitQuaternion<f32>,
    angular_velocity_degrees: &Vector3<f32>,
    delta_seconds: f32,
) -> UnitQuaternion<f32> {
    if angular_velocity_degrees.norm_squared() <= f32::EPSILON {
        return orientation;
    }
    let step = angular_velocity_degrees.map(|d| d.to_radians() * delta_seconds);
    UnitQuaternion::from_euler_angles(step.x, step.y, step.z) * orientation
}
