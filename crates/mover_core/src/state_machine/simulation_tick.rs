//! The substep loop
//!
//! A tick is split into substeps whenever a mode hands unused time to the
//! next mode. Each substep: cancellations, queued features, instant effects,
//! modifiers, layered moves, mode proposal, transitions, then execution.

use tracing::{debug, trace, warn};

use crate::component::UpdatedComponent;
use crate::config::CommonMovementSettings;
use crate::data::{MoverSyncState, MoverTickEndData, MoverTickStartData, UpdatedMotionState};
use crate::instant_effects::ApplyEffectParams;
use crate::modes::{ModeContext, SimulationTickParams};
use crate::modifiers::ModifierContext;
use crate::move_library::RollbackBlackboard;
use crate::state_machine::MovementModeStateMachine;
use crate::types::{MoveMixMode, MoverSimulationEvent, MoverTimeStep, ProposedMove};

/// Which transition list the winning transition came from.
#[derive(Debug, Clone, Copy)]
enum ChosenTransition {
    Mode(usize),
    Global(usize),
}

impl MovementModeStateMachine {
    /// Advance the simulation by `time_step`, writing the resulting state into `output`.
    ///
    /// `output` is overwritten with `start_state`'s sync and aux state before
    /// the first substep. The blackboard frame should already be begun by
    /// the caller.
    pub fn on_simulation_tick(
        &mut self,
        component: &mut dyn UpdatedComponent,
        common: &mut CommonMovementSettings,
        blackboard: &mut RollbackBlackboard,
        start_state: &MoverTickStartData,
        time_step: &MoverTimeStep,
        output: &mut MoverTickEndData,
    ) {
        let mut sub_step = *time_step;
        self.current_base_time_step = *time_step;

        // Input to each substep; refreshed from `output` after the first one
        let mut working = start_state.clone();

        // From here on effects live in our own list so they can wait for their frame
        let pulled = self.queues.take_instant_effects();
        self.instant_effects.extend(pulled);

        if !self.queued_mode.is_set() {
            let start_mode = &working.sync_state.movement_mode;
            let start_mode = if start_mode.is_empty() || !self.modes.contains_key(start_mode) {
                if !start_mode.is_empty() {
                    warn!("Start state mode {} is not registered, using {}", start_mode, self.default_mode_name);
                }
                self.default_mode_name.clone()
            } else {
                start_mode.clone()
            };
            self.queue_next_mode(&start_mode, false);
        }
        self.advance_to_next_mode(blackboard);

        output.sync_state = start_state.sync_state.clone();
        output.aux_state = start_state.aux_state.clone();
        output.move_record.reset();
        output.movement_end_state.reset_to_defaults();

        let mut substep_count: u32 = 0;
        let mut refunded_substeps: u32 = 0;
        let mut total_used_ms: f32 = 0.0;

        while total_used_ms < time_step.step_ms {
            if substep_count > 0 {
                working.sync_state = output.sync_state.clone();
                working.aux_state = output.aux_state.clone();
            }

            working.sync_state.movement_mode = self.current_mode_name.clone();
            output.sync_state.collection.find_or_add::<UpdatedMotionState>();
            output.sync_state.movement_mode = self.current_mode_name.clone();
            output.movement_end_state.reset_to_defaults();
            sub_step.step_ms = time_step.step_ms - total_used_ms;

            // Cancellations first so they catch features queued for this substep
            for request in self.queues.take_tags_to_cancel() {
                let sync = &mut working.sync_state;
                sync.movement_modifiers.cancel_modifiers_by_tag(&request.tag, request.exact_match);
                sync.layered_moves.cancel_moves_by_tag(request.tag.clone(), request.exact_match);
                sync.layered_move_instances.cancel_moves_by_tag(request.tag, request.exact_match);
            }

            for layered_move in self.queues.take_layered_moves() {
                working.sync_state.layered_moves.queue_layered_move(layered_move);
            }
            output.sync_state.layered_moves = working.sync_state.layered_moves.clone();

            for mut instance in self.queues.take_layered_move_instances() {
                instance.populate_missing_logic(&self.move_logic);
                working.sync_state.layered_move_instances.queue_layered_move(instance);
            }
            working.sync_state.layered_move_instances.populate_missing_active_move_logic(&self.move_logic);
            output.sync_state.layered_move_instances = working.sync_state.layered_move_instances.clone();

            for modifier in self.queues.take_modifiers() {
                working.sync_state.movement_modifiers.queue_movement_modifier(modifier);
            }
            output.sync_state.movement_modifiers = working.sync_state.movement_modifiers.clone();

            let mut mode_set_from_effect = false;
            if self.apply_instant_effects(component, blackboard, &working, &sub_step, common, &mut output.sync_state) {
                // Effect results become the substep's input so the mode does not overwrite them
                working.sync_state.collection.add_from_collection(&output.sync_state.collection);

                if output.sync_state.movement_mode != self.current_mode_name {
                    mode_set_from_effect = true;
                    let forced = output.sync_state.movement_mode.clone();
                    self.set_mode_immediately(&forced, false, blackboard);
                    output.sync_state.movement_mode = self.current_mode_name.clone();
                    working.sync_state.movement_mode = self.current_mode_name.clone();
                }
            }

            for handle in self.queues.take_modifiers_to_cancel() {
                output.sync_state.movement_modifiers.cancel_modifier_from_handle(handle);
            }
            {
                let mut ctx = ModifierContext { component: &mut *component, settings: &mut *common, time_step: &sub_step };
                output.sync_state.movement_modifiers.flush_modifier_arrays(&mut ctx);
                output.sync_state.movement_modifiers.pre_movement(&mut ctx);
            }

            let mut combined_layered = ProposedMove::with_mix_mode(MoveMixMode::AdditiveVelocity);
            self.mixer.reset_mixer_state();

            output.sync_state.layered_moves.flush_move_arrays(&*component, blackboard, sub_step.base_sim_time_ms);
            output.sync_state.layered_move_instances.flush_move_arrays(&sub_step, blackboard);
            let mut has_layered_contributions = output.sync_state.layered_move_instances.generate_mixed_move(
                &working,
                &sub_step,
                &mut self.mixer,
                blackboard,
                &mut combined_layered,
            );
            has_layered_contributions |= output.sync_state.layered_moves.generate_mixed_move(
                &working,
                &sub_step,
                &mut self.mixer,
                &*component,
                blackboard,
                &mut combined_layered,
            );

            if has_layered_contributions && !mode_set_from_effect {
                if let Some(preferred) = combined_layered.preferred_mode.clone() {
                    self.set_mode_immediately(&preferred, false, blackboard);
                    output.sync_state.movement_mode = self.current_mode_name.clone();
                    working.sync_state.movement_mode = self.current_mode_name.clone();
                }
            }

            let current_mode_name = self.current_mode_name.clone();
            let mut reenter_next = false;
            let mode_ran = self.modes.contains_key(&current_mode_name);

            if let Some(registered) = self.modes.get_mut(&current_mode_name) {
                let skip_mode_move = self.settings.skip_generate_move_if_overridden
                    && has_layered_contributions
                    && combined_layered.mix_mode == MoveMixMode::OverrideAll;

                let mut combined_move = ProposedMove::default();
                let has_mode_contribution = !skip_mode_move;
                if has_mode_contribution {
                    let ctx = ModeContext { component: &*component, settings: &*common, blackboard: &*blackboard };
                    combined_move = registered.mode.generate_move(&working, &sub_step, &ctx);
                }

                if has_mode_contribution && has_layered_contributions {
                    let up = component.up_direction();
                    self.mixer.mix_proposed_moves(&combined_layered, &up, &mut combined_move);
                } else if has_layered_contributions {
                    combined_move = combined_layered;
                }

                output.sync_state.layered_moves.apply_residual_velocity(&mut combined_move);
                output.sync_state.layered_move_instances.apply_residual_velocity(&mut combined_move);

                let mut params = SimulationTickParams {
                    component: &mut *component,
                    settings: &*common,
                    blackboard: &mut *blackboard,
                    start_state: &working,
                    time_step: sub_step,
                    proposed_move: combined_move,
                };

                let eligible = |next: &Option<String>, allow_reentry: bool| match next {
                    Some(next) => *next != current_mode_name || allow_reentry,
                    None => false,
                };

                let mut chosen: Option<(ChosenTransition, String)> = None;
                for (index, transition) in registered.transitions.iter().enumerate() {
                    if substep_count > 0 && transition.first_sub_step_only() {
                        continue;
                    }
                    let result = transition.evaluate(&params);
                    if eligible(&result.next_mode, transition.allow_mode_reentry()) {
                        chosen = result.next_mode.map(|next| (ChosenTransition::Mode(index), next));
                        break;
                    }
                }
                if chosen.is_none() {
                    for (index, (_, transition)) in self.global_transitions.iter().enumerate() {
                        let result = transition.evaluate(&params);
                        if eligible(&result.next_mode, transition.allow_mode_reentry()) {
                            chosen = result.next_mode.map(|next| (ChosenTransition::Global(index), next));
                            break;
                        }
                    }
                }

                match chosen {
                    Some((which, next)) => {
                        output.movement_end_state.next_mode_name = Some(next.clone());
                        output.movement_end_state.remaining_ms = sub_step.step_ms;
                        let transition = match which {
                            ChosenTransition::Mode(index) => &mut registered.transitions[index],
                            ChosenTransition::Global(index) => &mut self.global_transitions[index].1,
                        };
                        // Read before trigger: an immediate transition clears itself
                        reenter_next = transition.allow_mode_reentry();
                        transition.trigger(&mut params);
                        debug!("Transition {} -> {} at {:.2}ms", current_mode_name, next, sub_step.base_sim_time_ms);
                        self.events.push(MoverSimulationEvent::TransitionTriggered {
                            sim_time_ms: sub_step.base_sim_time_ms,
                            from_mode: current_mode_name.clone(),
                            to_mode: next,
                        });
                    }
                    None => registered.mode.simulation_tick(&mut params, output),
                }
            }

            output.movement_end_state.remaining_ms = output.movement_end_state.remaining_ms.clamp(0.0, sub_step.step_ms);
            if let Some(next) = output.movement_end_state.next_mode_name.clone() {
                self.queue_next_mode(&next, reenter_next);
            }

            if mode_ran {
                let refunded = (sub_step.step_ms - output.movement_end_state.remaining_ms).abs()
                    <= self.settings.refund_tolerance_ms;
                if refunded {
                    refunded_substeps += 1;
                    if refunded_substeps >= self.settings.max_times_to_refund_substep {
                        warn!(
                            "Movement mode {} and {:?} are stuck giving time back to each other. Overriding to advance to next substep.",
                            current_mode_name, output.movement_end_state.next_mode_name
                        );
                        total_used_ms += sub_step.step_ms;
                    }
                } else {
                    refunded_substeps = 0;
                }
            }

            let remaining_ms = output.movement_end_state.remaining_ms;
            let used_ms = sub_step.step_ms - remaining_ms;
            self.current_base_time_step.base_sim_time_ms = sub_step.base_sim_time_ms + used_ms as f64;
            total_used_ms += used_ms;

            self.advance_to_next_mode(blackboard);
            output.sync_state.movement_mode = self.current_mode_name.clone();

            {
                let mut ctx = ModifierContext { component: &mut *component, settings: &mut *common, time_step: &sub_step };
                output.sync_state.movement_modifiers.post_movement(&mut ctx);
            }

            trace!(
                "Substep {} in {} used {:.3}ms, {:.3}ms left",
                substep_count, current_mode_name, used_ms, remaining_ms
            );
            sub_step.base_sim_time_ms += used_ms as f64;
            sub_step.step_ms = remaining_ms;

            substep_count += 1;
        }

        if !self.instant_effects.is_empty() {
            if substep_count > 0 {
                working.sync_state = output.sync_state.clone();
                working.aux_state = output.aux_state.clone();
            }
            if self.apply_instant_effects(component, blackboard, &working, &sub_step, common, &mut output.sync_state)
                && output.sync_state.movement_mode != self.current_mode_name
            {
                let forced = output.sync_state.movement_mode.clone();
                self.set_mode_immediately(&forced, false, blackboard);
                output.sync_state.movement_mode = self.current_mode_name.clone();
            }
        }
    }

    /// Apply every due effect in queue order; the rest wait for a later substep.
    ///
    /// Returns true if any applied effect changed `output`.
    pub(crate) fn apply_instant_effects(
        &mut self,
        component: &mut dyn UpdatedComponent,
        blackboard: &mut RollbackBlackboard,
        start_state: &MoverTickStartData,
        time_step: &MoverTimeStep,
        settings: &CommonMovementSettings,
        output: &mut MoverSyncState,
    ) -> bool {
        let mut applied = false;
        let mut waiting = Vec::with_capacity(self.instant_effects.len());

        for mut scheduled in std::mem::take(&mut self.instant_effects) {
            if !scheduled.is_due(time_step) {
                waiting.push(scheduled);
                continue;
            }
            let mut params = ApplyEffectParams {
                component: &mut *component,
                blackboard: &mut *blackboard,
                start_state,
                time_step,
                settings,
                output_events: &mut self.events,
            };
            let changed = scheduled.effect.apply_movement_effect(&mut params, output);
            debug!("Applied instant effect {} (changed: {})", scheduled.effect.short_name(), changed);
            applied |= changed;
        }

        // Anything queued while applying keeps its place after the waiting ones
        waiting.append(&mut self.instant_effects);
        self.instant_effects = waiting;
        applied
    }
}

// ========== Tests ==========
