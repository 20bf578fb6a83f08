//! Rollback hooks
//!
//! Called by the owner when an authoritative correction arrives: first
//! [`MovementModeStateMachine::on_simulation_pre_rollback`] while both the
//! discarded and the corrected states are available, then
//! [`MovementModeStateMachine::on_simulation_rollback`] once the corrected
//! state is installed.

use tracing::{debug, info};

use crate::component::UpdatedComponent;
use crate::config::CommonMovementSettings;
use crate::data::MoverSyncState;
use crate::modifiers::ModifierContext;
use crate::move_library::RollbackBlackboard;
use crate::state_machine::MovementModeStateMachine;
use crate::types::MoverTimeStep;

impl MovementModeStateMachine {
    /// Reconcile modifier lifecycles between the discarded and authoritative states.
    ///
    /// Queued modifiers are dropped: they were requested on the discarded timeline.
    pub fn on_simulation_pre_rollback(
        &mut self,
        discarded: &mut MoverSyncState,
        authority: &mut MoverSyncState,
        new_base_time_step: &MoverTimeStep,
        component: &mut dyn UpdatedComponent,
        common: &mut CommonMovementSettings,
    ) {
        self.current_base_time_step = *new_base_time_step;
        let dropped = self.queues.take_modifiers();
        if !dropped.is_empty() {
            debug!("Dropped {} queued modifiers before rollback", dropped.len());
        }

        let mut ctx = ModifierContext { component, settings: common, time_step: new_base_time_step };
        authority.movement_modifiers.reconcile_after_rollback(&mut discarded.movement_modifiers, &mut ctx);
    }

    /// Adopt the authoritative mode and forget every pending request.
    pub fn on_simulation_rollback(
        &mut self,
        sync_state: &MoverSyncState,
        new_base_time_step: &MoverTimeStep,
        blackboard: &mut RollbackBlackboard,
    ) {
        self.current_base_time_step = *new_base_time_step;
        self.clear_queued_mode();

        if self.current_mode_name != sync_state.movement_mode {
            info!(
                "Rollback to frame {} moves {} -> {}",
                new_base_time_step.server_frame, self.current_mode_name, sync_state.movement_mode
            );
            self.set_mode_immediately(&sync_state.movement_mode, false, blackboard);
        }

        self.queues.clear();
        self.instant_effects.clear();
    }
}
