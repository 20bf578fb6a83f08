//! Movement mode contract
//!
//! A mode is a named strategy the state machine switches between. Each
//! substep the active mode first proposes a move ([`MovementMode::generate_move`],
//! read-only) and then, unless a transition fires, executes the mixed move
//! ([`MovementMode::simulation_tick`]).

use std::fmt;

use crate::component::UpdatedComponent;
use crate::config::CommonMovementSettings;
use crate::data::{MoverTickEndData, MoverTickStartData};
use crate::move_library::RollbackBlackboard;
use crate::types::{MoverTimeStep, ProposedMove};

/// Read-only view handed to [`MovementMode::generate_move`].
pub struct ModeContext<'a> {
    pub component: &'a dyn UpdatedComponent,
    pub settings: &'a CommonMovementSettings,
    pub blackboard: &'a RollbackBlackboard,
}

/// Everything a mode or transition sees while a substep executes.
pub struct SimulationTickParams<'a> {
    pub component: &'a mut dyn UpdatedComponent,
    pub settings: &'a CommonMovementSettings,
    pub blackboard: &'a mut RollbackBlackboard,
    pub start_state: &'a MoverTickStartData,
    pub time_step: MoverTimeStep,
    /// Mode proposal already mixed with layered moves and residual velocity
    pub proposed_move: ProposedMove,
}

pub trait MovementMode: Send + fmt::Debug {
    fn on_registered(&mut self, _mode_name: &str) {}

    fn on_unregistered(&mut self) {}

    fn activate(&mut self) {}

    fn deactivate(&mut self) {}

    /// Must be side-effect free; it may be skipped or called speculatively.
    fn generate_move(
        &self,
        start_state: &MoverTickStartData,
        time_step: &MoverTimeStep,
        ctx: &ModeContext<'_>,
    ) -> ProposedMove;

    /// Execute `params.proposed_move` and write the resulting sync state into `output`.
    ///
    /// Time not consumed goes into `output.movement_end_state.remaining_ms`.
    fn simulation_tick(&mut self, params: &mut SimulationTickParams<'_>, output: &mut MoverTickEndData);
}

/// Mode every state machine starts in; does nothing and consumes all time.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMovementMode;

impl NullMovementMode {
    pub const NAME: &'static str = "Null";
}

impl MovementMode for NullMovementMode {
    fn generate_move(&self, _: &MoverTickStartData, _: &MoverTimeStep, _: &ModeContext<'_>) -> ProposedMove {
        ProposedMove::default()
    }

    fn simulation_tick(&mut self, _params: &mut SimulationTickParams<'_>, output: &mut MoverTickEndData) {
        output.movement_end_state.remaining_ms = 0.0;
        output.movement_end_state.ended_with_no_changes = true;
    }
}
