//! Airborne movement: gravity plus limited air control

use tracing::debug;

use crate::data::{MoverTickEndData, MoverTickStartData};
use crate::modes::kinematic::{commit_motion_state, move_input, prior_velocity, sweep};
use crate::modes::mode::{ModeContext, MovementMode, SimulationTickParams};
use crate::move_library::air_movement::{compute_falling_move, FreeMoveParams};
use crate::move_library::common_blackboard::LAST_FLOOR_RESULT;
use crate::move_library::floor::FloorCheckResult;
use crate::types::{MoverTimeStep, ProposedMove};

/// Falls under `gravity` and hands the rest of the substep to the ground
/// mode once it lands on a walkable surface.
#[derive(Debug, Clone)]
pub struct KinematicFallingMode {
    mode_name: String,
    /// Fraction of `acceleration` available for steering in the air (default: 0.5)
    pub air_control: f32,
}

impl Default for KinematicFallingMode {
    fn default() -> Self {
        Self { mode_name: Self::NAME.to_string(), air_control: 0.5 }
    }
}

impl KinematicFallingMode {
    pub const NAME: &'static str = "Falling";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_air_control(mut self, air_control: f32) -> Self {
        self.air_control = air_control.clamp(0.0, 1.0);
        self
    }
}

impl MovementMode for KinematicFallingMode {
    fn on_registered(&mut self, mode_name: &str) {
        self.mode_name = mode_name.to_string();
    }

    fn generate_move(
        &self,
        start_state: &MoverTickStartData,
        time_step: &MoverTimeStep,
        ctx: &ModeContext<'_>,
    ) -> ProposedMove {
        let (move_input_type, move_input) = move_input(start_state);
        let params = FreeMoveParams {
            move_input_type,
            move_input,
            prior_velocity: prior_velocity(start_state),
            max_speed: ctx.settings.max_speed,
            acceleration: ctx.settings.acceleration * self.air_control,
            delta_seconds: time_step.step_secs(),
        };
        compute_falling_move(&params, &ctx.component.up_direction(), ctx.settings.gravity)
    }

    fn simulation_tick(&mut self, params: &mut SimulationTickParams<'_>, output: &mut MoverTickEndData) {
        let up = params.component.up_direction();
        let outcome = sweep(params, &self.mode_name, false);
        let mut velocity = params.proposed_move.linear_velocity;
        output.movement_end_state.remaining_ms = 0.0;

        match outcome.hit {
            Some(hit) => {
                let floor = FloorCheckResult::from_hit(&hit, &up);
                floor.publish(params.blackboard);

                let into_surface = velocity.dot(&hit.normal);
                if into_surface < 0.0 {
                    velocity -= hit.normal * into_surface;
                }

                if floor.is_walkable_floor() {
                    let ground = params.settings.ground_mode_name.clone();
                    debug!("{} landed after {:.2} of the substep, handing off to {}", self.mode_name, hit.time, ground);
                    output.movement_end_state.next_mode_name = Some(ground);
                    output.movement_end_state.remaining_ms = params.time_step.step_ms * (1.0 - hit.time);
                }
            }
            None => {
                params.blackboard.invalidate(LAST_FLOOR_RESULT);
            }
        }

        commit_motion_state(params, output, &outcome.record, outcome.orientation, velocity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::KinematicBody;
    use crate::config::CommonMovementSettings;
    use crate::data::{MoverSyncState, UpdatedMotionState};
    use crate::move_library::RollbackBlackboard;
    use crate::types::MoveMixMode;
    use nalgebra::Vector3;

    fn tick(body: &mut KinematicBody, bb: &mut RollbackBlackboard, velocity: Vector3<f32>) -> MoverTickEndData {
        let mut mode = KinematicFallingMode::new();
        let settings = CommonMovementSettings::default();
        let start = MoverTickStartData::new(MoverSyncState::with_mode(KinematicFallingMode::NAME), Default::default());
        let ts = MoverTimeStep::new(0.0, 100.0, 1);
        bb.begin_simulation_frame(&ts);
        let mut output = MoverTickEndData::default();
        let mut params = SimulationTickParams {
            component: body,
            settings: &settings,
            blackboard: bb,
            start_state: &start,
            time_step: ts,
            proposed_move: ProposedMove::with_velocity(velocity, MoveMixMode::AdditiveVelocity),
        };
        mode.simulation_tick(&mut params, &mut output);
        bb.end_simulation_frame();
        output
    }

    #[test]
    fn test_generate_move_applies_gravity() {
        let mode = KinematicFallingMode::new();
        let body = KinematicBody::default();
        let settings = CommonMovementSettings::default();
        let bb = RollbackBlackboard::new();
        let ctx = ModeContext { component: &body, settings: &settings, blackboard: &bb };
        let mut sync = MoverSyncState::with_mode(KinematicFallingMode::NAME);
        sync.collection.find_or_add::<UpdatedMotionState>();
        let start = MoverTickStartData::new(sync, Default::default());

        let mv = mode.generate_move(&start, &MoverTimeStep::new(0.0, 100.0, 1), &ctx);
        assert!((mv.linear_velocity.z + 98.0).abs() < 1e-3);
    }

    #[test]
    fn test_free_fall_keeps_mode() {
        let mut body = KinematicBody::new(Vector3::new(0.0, 0.0, 1000.0)).with_floor(0.0);
        let mut bb = RollbackBlackboard::new();
        let output = tick(&mut body, &mut bb, Vector3::new(0.0, 0.0, -100.0));
        assert!(output.movement_end_state.next_mode_name.is_none());
        assert_eq!(output.movement_end_state.remaining_ms, 0.0);
        assert!((body.location.z - 990.0).abs() < 1e-3);
    }

    #[test]
    fn test_landing_hands_remaining_time_to_ground_mode() {
        // Feet at 50, falling 100 units this substep: lands halfway through
        let mut body = KinematicBody::new(Vector3::new(0.0, 0.0, 140.0)).with_floor(0.0);
        let mut bb = RollbackBlackboard::new();
        let output = tick(&mut body, &mut bb, Vector3::new(0.0, 0.0, -1000.0));

        assert_eq!(output.movement_end_state.next_mode_name.as_deref(), Some("Flying"));
        assert!((output.movement_end_state.remaining_ms - 50.0).abs() < 1e-3);
        let motion = output.sync_state.collection.find::<UpdatedMotionState>().cloned().unwrap_or_default();
        assert!(motion.velocity.z.abs() < 1e-4);
        assert!(bb.try_get::<FloorCheckResult>(LAST_FLOOR_RESULT).is_some_and(|f| f.is_walkable_floor()));
    }
}
