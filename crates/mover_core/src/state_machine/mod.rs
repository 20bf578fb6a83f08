//! # Movement Mode State Machine
//!
//! Drives one simulated actor: owns the registered modes and transitions,
//! consumes the request queues, and runs the substep loop.
//!
//! - [`MovementModeStateMachine::on_simulation_tick`]: advance one tick
//! - [`MovementModeStateMachine::on_simulation_pre_rollback`] /
//!   [`MovementModeStateMachine::on_simulation_rollback`]: restore after a correction
//! - [`MovementQueues`]: thread-safe request queues shared with gameplay code
//!
//! ## Usage
//! ```rust
//! use mover_core::config::MoverSettings;
//! use mover_core::modes::{KinematicFallingMode, KinematicFlyingMode};
//! use mover_core::state_machine::MovementModeStateMachine;
//!
//! let mut sm = MovementModeStateMachine::new(MoverSettings::default());
//! sm.register_movement_mode(KinematicFlyingMode::NAME, Box::new(KinematicFlyingMode::new()), Vec::new(), true);
//! sm.register_movement_mode(KinematicFallingMode::NAME, Box::new(KinematicFallingMode::new()), Vec::new(), false);
//!
//! sm.queue_next_mode("Falling", false);
//! assert_eq!(sm.queued_mode_name().as_deref(), Some("Falling"));
//! sm.queue_next_mode("Swimming", false); // unregistered: ignored with a warning
//! assert_eq!(sm.queued_mode_name().as_deref(), Some("Falling"));
//! ```

mod queues;
mod rollback;
mod simulation_tick;

pub use queues::MovementQueues;

use std::fmt;
use std::sync::Arc;

use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::MoverSettings;
use crate::instant_effects::ScheduledInstantMovementEffect;
use crate::layered_moves::{LayeredMove, LayeredMoveInstance, LayeredMoveInstancedData, LayeredMoveLogic};
use crate::modes::{ImmediateMovementModeTransition, MovementMode, MovementModeTransition, NullMovementMode};
use crate::modifiers::{ModifierHandle, MovementModifier};
use crate::move_library::common_blackboard::LAST_MODE_CHANGE_RECORD;
use crate::move_library::{BlackboardEntrySettings, MovementMixer, RollbackBlackboard};
use crate::types::{GameplayTag, MoverSimulationEvent, MoverTimeStep};

/// Written to the blackboard on every mode switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeChangeRecord {
    pub mode: String,
    pub previous_mode: Option<String>,
    pub frame: u32,
    pub sim_time_ms: f64,
}

/// Handle returned by [`MovementModeStateMachine::register_global_transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalTransitionId(u32);

#[derive(Debug)]
struct RegisteredMode {
    mode: Box<dyn MovementMode>,
    transitions: Vec<Box<dyn MovementModeTransition>>,
}

impl RegisteredMode {
    fn unregister(mut self) {
        for transition in &mut self.transitions {
            transition.on_unregistered();
        }
        self.mode.on_unregistered();
    }
}

pub struct MovementModeStateMachine {
    settings: MoverSettings,
    modes: FxHashMap<String, RegisteredMode>,
    global_transitions: Vec<(GlobalTransitionId, Box<dyn MovementModeTransition>)>,
    next_global_transition_id: u32,
    default_mode_name: String,
    current_mode_name: String,
    queued_mode: ImmediateMovementModeTransition,
    queues: Arc<MovementQueues>,
    /// Effects pulled from `queues`, waiting for their scheduled frame/time
    instant_effects: Vec<ScheduledInstantMovementEffect>,
    move_logic: Vec<Arc<dyn LayeredMoveLogic>>,
    mixer: MovementMixer,
    current_base_time_step: MoverTimeStep,
    events: Vec<MoverSimulationEvent>,
}

impl fmt::Debug for MovementModeStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut modes: Vec<&str> = self.modes.keys().map(String::as_str).collect();
        modes.sort_unstable();
        f.debug_struct("MovementModeStateMachine")
            .field("modes", &modes)
            .field("current_mode", &self.current_mode_name)
            .field("default_mode", &self.default_mode_name)
            .field("queued_mode", &self.queued_mode.next_mode_name())
            .field("global_transitions", &self.global_transitions.len())
            .finish()
    }
}

impl MovementModeStateMachine {
    /// Starts with only the Null mode registered (and default).
    pub fn new(settings: MoverSettings) -> Self {
        let mut sm = Self {
            settings,
            modes: FxHashMap::default(),
            global_transitions: Vec::new(),
            next_global_transition_id: 0,
            default_mode_name: String::new(),
            current_mode_name: String::new(),
            queued_mode: ImmediateMovementModeTransition::new(),
            queues: Arc::new(MovementQueues::new()),
            instant_effects: Vec::new(),
            move_logic: Vec::new(),
            mixer: MovementMixer::new(),
            current_base_time_step: MoverTimeStep::default(),
            events: Vec::new(),
        };
        sm.register_null_mode();
        sm
    }

    fn register_null_mode(&mut self) {
        self.register_movement_mode(NullMovementMode::NAME, Box::new(NullMovementMode), Vec::new(), true);
    }

    pub fn settings(&self) -> &MoverSettings {
        &self.settings
    }

    // ========== Mode registration ==========

    /// Register (or replace) a mode under `name` with its ordered transitions.
    pub fn register_movement_mode(
        &mut self,
        name: impl Into<String>,
        mut mode: Box<dyn MovementMode>,
        mut transitions: Vec<Box<dyn MovementModeTransition>>,
        is_default: bool,
    ) {
        let name = name.into();
        if name.is_empty() {
            warn!("Refusing to register a movement mode with an empty name");
            return;
        }
        if let Some(old) = self.modes.remove(&name) {
            info!("Replacing movement mode {}", name);
            old.unregister();
        }

        mode.on_registered(&name);
        for transition in &mut transitions {
            transition.on_registered();
        }
        debug!("Registered movement mode {} ({} transitions)", name, transitions.len());
        self.modes.insert(name.clone(), RegisteredMode { mode, transitions });

        if is_default {
            self.default_mode_name = name;
        }
    }

    pub fn unregister_movement_mode(&mut self, name: &str) -> bool {
        let Some(registered) = self.modes.remove(name) else {
            return false;
        };
        if self.current_mode_name == name {
            warn!("Unregistering the active movement mode {}", name);
        }
        registered.unregister();
        if self.default_mode_name == name {
            self.default_mode_name = NullMovementMode::NAME.to_string();
        }
        true
    }

    /// Deactivate the current mode, drop every mode and fall back to Null.
    pub fn clear_all_movement_modes(&mut self) {
        if let Some(current) = self.modes.get_mut(&self.current_mode_name) {
            current.mode.deactivate();
        }
        for (_, registered) in self.modes.drain() {
            registered.unregister();
        }
        self.current_mode_name.clear();
        self.queued_mode.clear();
        self.register_null_mode();
    }

    /// Append a transition to an already registered mode.
    pub fn add_mode_transition(&mut self, mode_name: &str, mut transition: Box<dyn MovementModeTransition>) -> bool {
        match self.modes.get_mut(mode_name) {
            Some(registered) => {
                transition.on_registered();
                registered.transitions.push(transition);
                true
            }
            None => {
                warn!("Cannot add a transition to unregistered movement mode {}", mode_name);
                false
            }
        }
    }

    pub fn set_default_mode(&mut self, name: &str) -> bool {
        if !self.modes.contains_key(name) {
            warn!("Cannot make unregistered movement mode {} the default", name);
            return false;
        }
        self.default_mode_name = name.to_string();
        true
    }

    pub fn default_mode_name(&self) -> &str {
        &self.default_mode_name
    }

    pub fn is_mode_registered(&self, name: &str) -> bool {
        self.modes.contains_key(name)
    }

    pub fn find_movement_mode(&self, name: &str) -> Option<&dyn MovementMode> {
        self.modes.get(name).map(|r| r.mode.as_ref())
    }

    pub fn find_movement_mode_mut(&mut self, name: &str) -> Option<&mut (dyn MovementMode + 'static)> {
        self.modes.get_mut(name).map(|r| r.mode.as_mut())
    }

    pub fn current_mode_name(&self) -> &str {
        &self.current_mode_name
    }

    pub fn current_mode(&self) -> Option<&dyn MovementMode> {
        self.find_movement_mode(&self.current_mode_name)
    }

    // ========== Global transitions ==========

    pub fn register_global_transition(&mut self, mut transition: Box<dyn MovementModeTransition>) -> GlobalTransitionId {
        let id = GlobalTransitionId(self.next_global_transition_id);
        self.next_global_transition_id += 1;
        transition.on_registered();
        self.global_transitions.push((id, transition));
        id
    }

    pub fn unregister_global_transition(&mut self, id: GlobalTransitionId) -> bool {
        match self.global_transitions.iter().position(|(tid, _)| *tid == id) {
            Some(index) => {
                let (_, mut transition) = self.global_transitions.remove(index);
                transition.on_unregistered();
                true
            }
            None => false,
        }
    }

    pub fn clear_all_global_transitions(&mut self) {
        for (_, mut transition) in self.global_transitions.drain(..) {
            transition.on_unregistered();
        }
    }

    pub fn num_global_transitions(&self) -> usize {
        self.global_transitions.len()
    }

    // ========== Mode queueing ==========

    /// Queue a switch for the next mode advance. Unregistered names are ignored.
    pub fn queue_next_mode(&self, name: &str, should_reenter: bool) {
        if name.is_empty() {
            return;
        }
        if let Some(queued) = self.queued_mode.next_mode_name() {
            let queued_reenter = self.queued_mode.should_reenter();
            if queued != name || queued_reenter != should_reenter {
                info!(
                    "Overwriting queued mode change ({}, reenter: {}) with ({}, reenter: {})",
                    queued, queued_reenter, name, should_reenter
                );
            }
        }

        if self.modes.contains_key(name) {
            self.queued_mode.set_next_mode(name, should_reenter);
        } else {
            warn!("Attempted to queue an unregistered movement mode: {}", name);
        }
    }

    pub fn clear_queued_mode(&self) {
        self.queued_mode.clear();
    }

    pub fn queued_mode_name(&self) -> Option<String> {
        self.queued_mode.next_mode_name()
    }

    /// Queue and switch right away, recording the change in `blackboard`.
    pub fn set_mode_immediately(&mut self, name: &str, should_reenter: bool, blackboard: &mut RollbackBlackboard) {
        self.queue_next_mode(name, should_reenter);
        self.advance_to_next_mode(blackboard);
    }

    pub(crate) fn advance_to_next_mode(&mut self, blackboard: &mut RollbackBlackboard) {
        let Some(next) = self.queued_mode.next_mode_name() else {
            return;
        };
        let reenter = self.queued_mode.should_reenter();
        self.queued_mode.clear();

        if !self.modes.contains_key(&next) || (next == self.current_mode_name && !reenter) {
            return;
        }

        let previous = (!self.current_mode_name.is_empty()).then(|| self.current_mode_name.clone());
        if let Some(old) = previous.as_ref().and_then(|p| self.modes.get_mut(p)) {
            old.mode.deactivate();
        }

        self.record_mode_change(blackboard, &next, previous.clone());
        self.current_mode_name = next.clone();
        if let Some(new) = self.modes.get_mut(&next) {
            new.mode.activate();
        }

        debug!("Movement mode {:?} -> {}", previous, next);
        self.events.push(MoverSimulationEvent::ModeChanged {
            sim_time_ms: self.current_base_time_step.base_sim_time_ms,
            previous_mode: previous,
            new_mode: next,
        });
    }

    fn record_mode_change(&self, blackboard: &mut RollbackBlackboard, mode: &str, previous_mode: Option<String>) {
        if !blackboard.has_entry(LAST_MODE_CHANGE_RECORD) {
            blackboard.create_entry::<ModeChangeRecord>(
                LAST_MODE_CHANGE_RECORD,
                BlackboardEntrySettings::fixed(self.settings.last_mode_change_history),
            );
        }
        let record = ModeChangeRecord {
            mode: mode.to_string(),
            previous_mode,
            frame: self.current_base_time_step.server_frame,
            sim_time_ms: self.current_base_time_step.base_sim_time_ms,
        };
        if let Err(e) = blackboard.try_set(LAST_MODE_CHANGE_RECORD, record) {
            warn!("Could not record mode change to {}: {}", mode, e);
        }
    }

    // ========== Feature queueing ==========

    /// Shared queue handle for other threads.
    pub fn queues(&self) -> Arc<MovementQueues> {
        Arc::clone(&self.queues)
    }

    pub fn queue_layered_move(&self, layered_move: Box<dyn LayeredMove>) {
        self.queues.queue_layered_move(layered_move);
    }

    /// Queue an instanced move, binding the registered logic for its data type.
    pub fn queue_active_layered_move(&self, data: Box<dyn LayeredMoveInstancedData>) -> bool {
        let mut instance = LayeredMoveInstance::from_data(data);
        if !instance.populate_missing_logic(&self.move_logic) {
            return false;
        }
        self.queues.queue_layered_move_instance(instance);
        true
    }

    pub fn queue_movement_modifier(&self, modifier: Box<dyn MovementModifier>) -> ModifierHandle {
        self.queues.queue_movement_modifier(modifier)
    }

    pub fn cancel_modifier_from_handle(&self, handle: ModifierHandle) {
        self.queues.cancel_modifier_from_handle(handle);
    }

    pub fn find_queued_modifier(&self, handle: ModifierHandle) -> Option<Box<dyn MovementModifier>> {
        self.queues.find_queued_modifier(handle)
    }

    pub fn find_queued_modifier_by_type<T: MovementModifier + Clone>(&self) -> Option<T> {
        self.queues.find_queued_modifier_by_type::<T>()
    }

    pub fn cancel_features_with_tag(&self, tag: GameplayTag, exact_match: bool) {
        self.queues.cancel_features_with_tag(tag, exact_match);
    }

    pub fn queue_instant_movement_effect(&self, effect: ScheduledInstantMovementEffect) {
        self.queues.queue_instant_movement_effect(effect);
    }

    pub fn queue_instant_movement_effects(&self, effects: impl IntoIterator<Item = ScheduledInstantMovementEffect>) {
        self.queues.queue_instant_movement_effects(effects);
    }

    /// Includes effects already pulled in and waiting for their frame.
    pub fn has_any_instant_effects_queued(&self) -> bool {
        !self.instant_effects.is_empty() || self.queues.has_any_instant_effects_queued()
    }

    // ========== Layered move logic ==========

    /// At most one logic per data type; a second registration replaces the first.
    pub fn register_move_logic(&mut self, logic: Arc<dyn LayeredMoveLogic>) {
        let data_type = logic.instanced_data_type_name();
        if let Some(existing) = self.move_logic.iter_mut().find(|l| l.instanced_data_type_name() == data_type) {
            warn!("Replacing layered move logic for data type {}", data_type);
            *existing = logic;
            return;
        }
        self.move_logic.push(logic);
    }

    pub fn unregister_move_logic(&mut self, data_type_name: &str) -> bool {
        let before = self.move_logic.len();
        self.move_logic.retain(|l| l.instanced_data_type_name() != data_type_name);
        self.move_logic.len() != before
    }

    pub fn registered_move_logic(&self) -> &[Arc<dyn LayeredMoveLogic>] {
        &self.move_logic
    }

    // ========== Events ==========

    /// Drain events raised since the last call.
    pub fn take_events(&mut self) -> Vec<MoverSimulationEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn current_base_time_step(&self) -> &MoverTimeStep {
        &self.current_base_time_step
    }
}

// ========== Tests ==========

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layered_moves::{LaunchMoveData, LaunchMoveLogic};
    use crate::modes::{KinematicFallingMode, KinematicFlyingMode, TransitionEvalResult};
    use crate::modes::SimulationTickParams;
    use crate::types::MoveMixMode;
    use nalgebra::Vector3;

    fn machine() -> MovementModeStateMachine {
        let mut sm = MovementModeStateMachine::new(MoverSettings::default());
        sm.register_movement_mode(KinematicFlyingMode::NAME, Box::new(KinematicFlyingMode::new()), Vec::new(), true);
        sm.register_movement_mode(KinematicFallingMode::NAME, Box::new(KinematicFallingMode::new()), Vec::new(), false);
        sm
    }

    #[derive(Debug)]
    struct NeverTransition;

    impl MovementModeTransition for NeverTransition {
        fn evaluate(&self, _params: &SimulationTickParams<'_>) -> TransitionEvalResult {
            TransitionEvalResult::NO_TRANSITION
        }
    }

    #[test]
    fn test_starts_with_null_default() {
        let sm = MovementModeStateMachine::new(MoverSettings::default());
        assert_eq!(sm.default_mode_name(), "Null");
        assert!(sm.is_mode_registered("Null"));
        assert_eq!(sm.current_mode_name(), "");
    }

    #[test]
    fn test_set_mode_immediately_records_change() {
        let mut sm = machine();
        let mut bb = RollbackBlackboard::new();
        sm.set_mode_immediately("Flying", false, &mut bb);
        sm.set_mode_immediately("Falling", false, &mut bb);
        assert_eq!(sm.current_mode_name(), "Falling");

        let record = bb.try_get::<ModeChangeRecord>(LAST_MODE_CHANGE_RECORD);
        assert_eq!(record.map(|r| (r.mode, r.previous_mode)), Some(("Falling".to_string(), Some("Flying".to_string()))));

        let events = sm.take_events();
        assert_eq!(events.len(), 2);
        assert!(sm.take_events().is_empty());
    }

    #[test]
    fn test_same_mode_without_reentry_is_noop() {
        let mut sm = machine();
        let mut bb = RollbackBlackboard::new();
        sm.set_mode_immediately("Flying", false, &mut bb);
        sm.take_events();
        sm.set_mode_immediately("Flying", false, &mut bb);
        assert!(sm.take_events().is_empty());
        sm.set_mode_immediately("Flying", true, &mut bb);
        assert_eq!(sm.take_events().len(), 1);
    }

    #[test]
    fn test_clear_all_modes_falls_back_to_null() {
        let mut sm = machine();
        sm.clear_all_movement_modes();
        assert!(!sm.is_mode_registered("Flying"));
        assert_eq!(sm.default_mode_name(), "Null");
    }

    #[test]
    fn test_unregister_default_resets_to_null() {
        let mut sm = machine();
        assert!(sm.unregister_movement_mode("Flying"));
        assert!(!sm.unregister_movement_mode("Flying"));
        assert_eq!(sm.default_mode_name(), "Null");
        assert!(!sm.set_default_mode("Flying"));
    }

    #[test]
    fn test_global_transition_registration() {
        let mut sm = machine();
        let a = sm.register_global_transition(Box::new(NeverTransition));
        let b = sm.register_global_transition(Box::new(NeverTransition));
        assert_ne!(a, b);
        assert!(sm.unregister_global_transition(a));
        assert!(!sm.unregister_global_transition(a));
        assert_eq!(sm.num_global_transitions(), 1);
        sm.clear_all_global_transitions();
        assert_eq!(sm.num_global_transitions(), 0);
        assert!(sm.add_mode_transition("Falling", Box::new(NeverTransition)));
        assert!(!sm.add_mode_transition("Swimming", Box::new(NeverTransition)));
    }

    #[test]
    fn test_active_layered_move_requires_logic() {
        let mut sm = machine();
        let data = || Box::new(LaunchMoveData::new(Vector3::z(), 100.0));
        assert!(!sm.queue_active_layered_move(data()));

        sm.register_move_logic(Arc::new(LaunchMoveLogic::new(MoveMixMode::OverrideVelocity, 5)));
        sm.register_move_logic(Arc::new(LaunchMoveLogic::new(MoveMixMode::AdditiveVelocity, 1)));
        assert_eq!(sm.registered_move_logic().len(), 1);
        assert!(sm.queue_active_layered_move(data()));
        assert_eq!(sm.queues().num_queued_layered_moves(), 1);
    }
}
