//! Gravity-free movement steered directly by input

use tracing::trace;

use crate::data::{MoverTickEndData, MoverTickStartData};
use crate::modes::kinematic::{commit_motion_state, move_input, prior_velocity, sweep};
use crate::modes::mode::{ModeContext, MovementMode, SimulationTickParams};
use crate::move_library::air_movement::{compute_controlled_free_move, FreeMoveParams};
use crate::move_library::common_blackboard::LAST_FLOOR_RESULT;
use crate::types::{MoverTimeStep, ProposedMove};

#[derive(Debug, Clone)]
pub struct KinematicFlyingMode {
    mode_name: String,
}

impl Default for KinematicFlyingMode {
    fn default() -> Self {
        Self { mode_name: Self::NAME.to_string() }
    }
}

impl KinematicFlyingMode {
    pub const NAME: &'static str = "Flying";

    pub fn new() -> Self {
        Self::default()
    }
}

impl MovementMode for KinematicFlyingMode {
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
        compute_controlled_free_move(&FreeMoveParams {
            move_input_type,
            move_input,
            prior_velocity: prior_velocity(start_state),
            max_speed: ctx.settings.max_speed,
            acceleration: ctx.settings.acceleration,
            delta_seconds: time_step.step_secs(),
        })
    }

    fn simulation_tick(&mut self, params: &mut SimulationTickParams<'_>, output: &mut MoverTickEndData) {
        // Flying never stands on anything
        params.blackboard.invalidate(LAST_FLOOR_RESULT);

        let outcome = sweep(params, &self.mode_name, true);
        let velocity = if outcome.record.delta_seconds() > 0.0 {
            outcome.record.relevant_velocity()
        } else {
            params.proposed_move.linear_velocity
        };
        trace!("{} substep: {}", self.mode_name, outcome.record);

        commit_motion_state(params, output, &outcome.record, outcome.orientation, velocity);
        output.movement_end_state.remaining_ms = 0.0;
    }
}
