//! Bundled instant effects: teleport, velocity override and jump impulse

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{MoverSyncState, UpdatedMotionState};
use crate::instant_effects::base::{ApplyEffectParams, InstantMovementEffect};
use crate::move_library::common_blackboard::LAST_FLOOR_RESULT;
use crate::types::{project_onto_normal, MoverSimulationEvent, TeleportFailureReason};

/// Make sure `output` carries a motion state, seeding it from the start state.
fn output_motion_state<'o>(params: &ApplyEffectParams<'_>, output: &'o mut MoverSyncState) -> Option<&'o mut UpdatedMotionState> {
    if output.collection.find::<UpdatedMotionState>().is_none() {
        if let Some(start) = params.start_state.sync_state.collection.find::<UpdatedMotionState>() {
            output.collection.add_data_by_copy(start);
        }
    }
    output.collection.find_or_add::<UpdatedMotionState>()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeleportEffect {
    pub target_location: Vector3<f32>,
    /// Keep the current orientation instead of `target_rotation`
    pub use_actor_rotation: bool,
    pub target_rotation: UnitQuaternion<f32>,
}

impl Default for TeleportEffect {
    fn default() -> Self {
        Self {
            target_location: Vector3::zeros(),
            use_actor_rotation: true,
            target_rotation: UnitQuaternion::identity(),
        }
    }
}

impl TeleportEffect {
    pub fn new(target_location: Vector3<f32>) -> Self {
        Self { target_location, ..Self::default() }
    }

    pub fn with_rotation(mut self, rotation: UnitQuaternion<f32>) -> Self {
        self.use_actor_rotation = false;
        self.target_rotation = rotation;
        self
    }
}

impl InstantMovementEffect for TeleportEffect {
    fn apply_movement_effect(&mut self, params: &mut ApplyEffectParams<'_>, output: &mut MoverSyncState) -> bool {
        let from_location = params.component.location();
        let from_orientation = params.component.orientation();
        let target_orientation = if self.use_actor_rotation { from_orientation } else { self.target_rotation };
        let sim_time_ms = params.time_step.base_sim_time_ms;

        if !params.component.teleport_to(self.target_location, target_orientation) {
            debug!("Teleport to {:?} refused by the updated component", self.target_location);
            params.output_events.push(MoverSimulationEvent::TeleportFailed {
                sim_time_ms,
                attempted_location: self.target_location,
                reason: TeleportFailureReason::NotAvailable,
            });
            return false;
        }

        let to_location = params.component.location();
        let to_orientation = params.component.orientation();
        let Some(motion) = output_motion_state(params, output) else {
            return false;
        };
        motion.location = to_location;
        motion.orientation = to_orientation;

        // The old floor no longer applies
        params.blackboard.invalidate(LAST_FLOOR_RESULT);

        params.output_events.push(MoverSimulationEvent::TeleportSucceeded {
            sim_time_ms,
            from_location,
            from_orientation,
            to_location,
            to_orientation,
        });
        true
    }
}

/// Set (or add to) the velocity, optionally forcing a mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyVelocityEffect {
    pub velocity_to_apply: Vector3<f32>,
    pub additive_velocity: bool,
    pub force_movement_mode: Option<String>,
}

impl ApplyVelocityEffect {
    pub fn new(velocity_to_apply: Vector3<f32>) -> Self {
        Self { velocity_to_apply, ..Self::default() }
    }

    pub fn additive(mut self) -> Self {
        self.additive_velocity = true;
        self
    }

    pub fn forcing_mode(mut self, mode_name: impl Into<String>) -> Self {
        self.force_movement_mode = Some(mode_name.into());
        self
    }
}

impl InstantMovementEffect for ApplyVelocityEffect {
    fn apply_movement_effect(&mut self, params: &mut ApplyEffectParams<'_>, output: &mut MoverSyncState) -> bool {
        let prior = params
            .start_state
            .sync_state
            .collection
            .find::<UpdatedMotionState>()
            .map(|m| m.velocity)
            .unwrap_or_else(Vector3::zeros);
        let velocity = if self.additive_velocity { prior + self.velocity_to_apply } else { self.velocity_to_apply };

        let Some(motion) = output_motion_state(params, output) else {
            return false;
        };
        motion.velocity = velocity;
        if let Some(mode) = &self.force_movement_mode {
            output.movement_mode = mode.clone();
        }
        true
    }
}

/// Replace the vertical velocity and put the actor in the air mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JumpImpulseEffect {
    /// units/s along the component's up direction (default: 500)
    pub upwards_speed: f32,
}

impl Default for JumpImpulseEffect {
    fn default() -> Self {
        Self { upwards_speed: 500.0 }
    }
}

impl JumpImpulseEffect {
    pub fn new(upwards_speed: f32) -> Self {
        Self { upwards_speed }
    }
}

impl InstantMovementEffect for JumpImpulseEffect {
    fn apply_movement_effect(&mut self, params: &mut ApplyEffectParams<'_>, output: &mut MoverSyncState) -> bool {
        let Some(prior) = params.start_state.sync_state.collection.find::<UpdatedMotionState>().map(|m| m.velocity)
        else {
            return false;
        };
        let up = params.component.up_direction();
        let velocity = prior - project_onto_normal(&prior, &up) + up * self.upwards_speed;

        let Some(motion) = output_motion_state(params, output) else {
            return false;
        };
        motion.velocity = velocity;
        output.movement_mode = params.settings.air_mode_name.clone();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{KinematicBody, UpdatedComponent};
    use crate::config::CommonMovementSettings;
    use crate::data::MoverTickStartData;
    use crate::move_library::floor::FloorCheckResult;
    use crate::move_library::RollbackBlackboard;
    use crate::types::MoverTimeStep;

    struct Harness {
        body: KinematicBody,
        bb: RollbackBlackboard,
        start: MoverTickStartData,
        settings: CommonMovementSettings,
        events: Vec<MoverSimulationEvent>,
    }

    impl Harness {
        fn new(velocity: Vector3<f32>) -> Self {
            let mut start = MoverTickStartData::default();
            start.sync_state.movement_mode = "Flying".to_string();
            let motion = start.sync_state.collection.find_or_add::<UpdatedMotionState>().unwrap();
            motion.location = Vector3::new(0.0, 0.0, 90.0);
            motion.velocity = velocity;
            Self {
                body: KinematicBody::new(Vector3::new(0.0, 0.0, 90.0)).with_floor(0.0),
                bb: RollbackBlackboard::new(),
                start,
                settings: CommonMovementSettings::default(),
                events: Vec::new(),
            }
        }

        fn apply(&mut self, effect: &mut dyn InstantMovementEffect, output: &mut MoverSyncState) -> bool {
            let ts = MoverTimeStep::new(100.0, 16.0, 7);
            let mut params = ApplyEffectParams {
                component: &mut self.body,
                blackboard: &mut self.bb,
                start_state: &self.start,
                time_step: &ts,
                settings: &self.settings,
                output_events: &mut self.events,
            };
            effect.apply_movement_effect(&mut params, output)
        }
    }

    #[test]
    fn test_teleport_success_moves_and_reports() {
        let mut h = Harness::new(Vector3::new(50.0, 0.0, 0.0));
        h.bb.begin_simulation_frame(&MoverTimeStep::new(100.0, 16.0, 7));
        FloorCheckResult {
            blocking_hit: true,
            walkable_floor: true,
            hit_location: Vector3::zeros(),
            normal: Vector3::z(),
        }
        .publish(&mut h.bb);

        let mut output = h.start.sync_state.clone();
        let mut teleport = TeleportEffect::new(Vector3::new(500.0, 0.0, 300.0));
        assert!(h.apply(&mut teleport, &mut output));

        assert_eq!(h.body.location(), Vector3::new(500.0, 0.0, 300.0));
        let motion = output.collection.find::<UpdatedMotionState>().cloned().unwrap_or_default();
        assert_eq!(motion.location, Vector3::new(500.0, 0.0, 300.0));
        assert_eq!(motion.velocity.x, 50.0);
        assert!(matches!(h.events.as_slice(), [MoverSimulationEvent::TeleportSucceeded { .. }]));
        assert!(h.bb.try_get::<FloorCheckResult>(LAST_FLOOR_RESULT).is_none());
    }

    #[test]
    fn test_teleport_into_floor_fails() {
        let mut h = Harness::new(Vector3::zeros());
        let mut output = h.start.sync_state.clone();
        let mut teleport = TeleportEffect::new(Vector3::new(0.0, 0.0, -100.0));
        assert!(!h.apply(&mut teleport, &mut output));
        assert!(matches!(
            h.events.as_slice(),
            [MoverSimulationEvent::TeleportFailed { reason: TeleportFailureReason::NotAvailable, .. }]
        ));
    }

    #[test]
    fn test_jump_impulse_replaces_vertical_and_sets_air_mode() {
        let mut h = Harness::new(Vector3::new(100.0, 0.0, -300.0));
        let mut output = h.start.sync_state.clone();
        assert!(h.apply(&mut JumpImpulseEffect::new(600.0), &mut output));

        let motion = output.collection.find::<UpdatedMotionState>().cloned().unwrap_or_default();
        assert_eq!(motion.velocity, Vector3::new(100.0, 0.0, 600.0));
        assert_eq!(output.movement_mode, "Falling");
    }

    #[test]
    fn test_jump_impulse_needs_motion_state() {
        let mut h = Harness::new(Vector3::zeros());
        h.start.sync_state.collection.empty();
        let mut output = MoverSyncState::with_mode("Flying");
        assert!(!h.apply(&mut JumpImpulseEffect::default(), &mut output));
        assert_eq!(output.movement_mode, "Flying");
    }

    #[test]
    fn test_apply_velocity_additive_and_forced_mode() {
        let mut h = Harness::new(Vector3::new(10.0, 0.0, 0.0));
        let mut output = h.start.sync_state.clone();
        let mut effect = ApplyVelocityEffect::new(Vector3::new(5.0, 0.0, 0.0)).additive();
        assert!(h.apply(&mut effect, &mut output));
        assert_eq!(output.collection.find::<UpdatedMotionState>().map(|m| m.velocity.x), Some(15.0));
        assert_eq!(output.movement_mode, "Flying");

        let mut forced = ApplyVelocityEffect::new(Vector3::zeros()).forcing_mode("Falling");
        assert!(h.apply(&mut forced, &mut output));
        assert_eq!(output.movement_mode, "Falling");
    }
}
