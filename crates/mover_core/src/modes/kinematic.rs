//! Sweep and bookkeeping shared by the bundled kinematic modes

use nalgebra::{UnitQuaternion, Vector3};

use crate::component::MoveHit;
use crate::data::{CharacterDefaultInputs, MoveInputType, MoverTickEndData, MoverTickStartData, UpdatedMotionState};
use crate::modes::mode::SimulationTickParams;
use crate::move_library::air_movement::apply_angular_velocity;
use crate::move_library::{MovementRecord, MovementSubstep};
use crate::types::{project_onto_normal, ProposedMove};

pub(crate) fn prior_velocity(start_state: &MoverTickStartData) -> Vector3<f32> {
    start_state
        .sync_state
        .collection
        .find::<UpdatedMotionState>()
        .map(|m| m.velocity)
        .unwrap_or_else(Vector3::zeros)
}

pub(crate) fn move_input(start_state: &MoverTickStartData) -> (MoveInputType, Vector3<f32>) {
    start_state
        .input_cmd
        .collection
        .find::<CharacterDefaultInputs>()
        .map(|i| (i.move_input_type(), i.move_input()))
        .unwrap_or((MoveInputType::None, Vector3::zeros()))
}

/// Result of one swept substep.
pub(crate) struct SweepOutcome {
    pub record: MovementRecord,
    pub orientation: UnitQuaternion<f32>,
    pub hit: Option<MoveHit>,
}

/// Sweep the component by the proposed velocity; optionally slide along what was hit.
pub(crate) fn sweep(params: &mut SimulationTickParams<'_>, move_name: &str, slide: bool) -> SweepOutcome {
    let dt = params.time_step.step_secs();
    let proposed = &params.proposed_move;
    let orientation =
        apply_angular_velocity(params.component.orientation(), &proposed.angular_velocity_degrees, dt);
    let delta = proposed.linear_velocity * dt;

    let mut record = MovementRecord::new();
    record.set_delta_seconds(dt);

    let before = params.component.location();
    let hit = params.component.move_by(delta, orientation);
    let moved = params.component.location() - before;
    record.append(MovementSubstep::new(move_name, moved, true));

    if let (Some(hit), true) = (hit.as_ref(), slide) {
        let leftover = delta - moved;
        let along = leftover - project_onto_normal(&leftover, &hit.normal);
        if along.norm_squared() > f32::EPSILON {
            let before_slide = params.component.location();
            params.component.move_by(along, orientation);
            record.append(MovementSubstep::new("Slide", params.component.location() - before_slide, true));
        }
    }

    SweepOutcome { record, orientation, hit }
}

/// Write the post-move motion state and fold the local record into the tick's record.
pub(crate) fn commit_motion_state(
    params: &SimulationTickParams<'_>,
    output: &mut MoverTickEndData,
    record: &MovementRecord,
    orientation: UnitQuaternion<f32>,
    velocity: Vector3<f32>,
) {
    let proposed: &ProposedMove = &params.proposed_move;
    if let Some(motion) = output.sync_state.collection.find_or_add::<UpdatedMotionState>() {
        motion.location = params.component.location();
        motion.orientation = orientation;
        motion.velocity = velocity;
        motion.angular_velocity_degrees = proposed.angular_velocity_degrees;
        motion.move_direction_intent = if proposed.has_dir_intent { proposed.direction_intent } else { Vector3::zeros() };
        motion.movement_base = None;
    }

    for substep in record.substeps() {
        output.move_record.append(substep.clone());
    }
    let total = output.move_record.delta_seconds() + record.delta_seconds();
    output.move_record.set_delta_seconds(total);
}
