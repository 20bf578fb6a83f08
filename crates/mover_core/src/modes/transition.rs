//! Movement mode transitions
//!
//! Transitions are evaluated before a mode's `simulation_tick`. The first one
//! that names a mode (other than the current one, unless it allows re-entry)
//! wins and receives the rest of the substep's time.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::modes::mode::SimulationTickParams;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionEvalResult {
    pub next_mode: Option<String>,
}

impl TransitionEvalResult {
    pub const NO_TRANSITION: TransitionEvalResult = TransitionEvalResult { next_mode: None };

    pub fn to_mode(name: impl Into<String>) -> Self {
        Self { next_mode: Some(name.into()) }
    }
}

pub trait MovementModeTransition: Send + fmt::Debug {
    /// Pure predicate; no side effects.
    fn evaluate(&self, params: &SimulationTickParams<'_>) -> TransitionEvalResult;

    /// One-time side effect once this transition is chosen.
    fn trigger(&mut self, _params: &mut SimulationTickParams<'_>) {}

    /// Only evaluated on the first substep of a tick.
    fn first_sub_step_only(&self) -> bool {
        false
    }

    fn allow_mode_reentry(&self) -> bool {
        false
    }

    fn on_registered(&mut self) {}

    fn on_unregistered(&mut self) {}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PendingMode {
    name: String,
    reenter: bool,
}

/// Fires once toward a mode set from outside, then clears itself.
///
/// Clones share the same pending slot, so a caller can keep a handle while
/// the state machine owns the registered copy.
#[derive(Debug, Clone, Default)]
pub struct ImmediateMovementModeTransition {
    pending: Arc<Mutex<Option<PendingMode>>>,
}

impl ImmediateMovementModeTransition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_next_mode(&self, name: impl Into<String>, should_reenter: bool) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = Some(PendingMode { name: name.into(), reenter: should_reenter });
    }

    pub fn next_mode_name(&self) -> Option<String> {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.as_ref().map(|p| p.name.clone())
    }

    pub fn should_reenter(&self) -> bool {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.as_ref().is_some_and(|p| p.reenter)
    }

    pub fn is_set(&self) -> bool {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    pub fn clear(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl MovementModeTransition for ImmediateMovementModeTransition {
    fn evaluate(&self, params: &SimulationTickParams<'_>) -> TransitionEvalResult {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        match pending.as_ref() {
            Some(p) if p.reenter || p.name != params.start_state.sync_state.movement_mode => {
                TransitionEvalResult::to_mode(p.name.clone())
            }
            _ => TransitionEvalResult::NO_TRANSITION,
        }
    }

    fn trigger(&mut self, _params: &mut SimulationTickParams<'_>) {
        self.clear();
    }

    fn allow_mode_reentry(&self) -> bool {
        self.should_reenter()
    }
}

// ========== Tests ==========

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::KinematicBody;
    use crate::config::CommonMovementSettings;
    use crate::data::{MoverSyncState, MoverTickStartData};
    use crate::move_library::RollbackBlackboard;
    use crate::types::{MoverTimeStep, ProposedMove};

    fn eval_in_mode(transition: &ImmediateMovementModeTransition, mode: &str) -> TransitionEvalResult {
        let mut body = KinematicBody::default();
        let settings = CommonMovementSettings::default();
        let mut bb = RollbackBlackboard::new();
        let start = MoverTickStartData { sync_state: MoverSyncState::with_mode(mode), ..Default::default() };
        let params = SimulationTickParams {
            component: &mut body,
            settings: &settings,
            blackboard: &mut bb,
            start_state: &start,
            time_step: MoverTimeStep::new(0.0, 16.0, 1),
            proposed_move: ProposedMove::default(),
        };
        transition.evaluate(&params)
    }

    #[test]
    fn test_immediate_transition_skips_current_mode_without_reentry() {
        let transition = ImmediateMovementModeTransition::new();
        assert_eq!(eval_in_mode(&transition, "Falling"), TransitionEvalResult::NO_TRANSITION);

        transition.set_next_mode("Falling", false);
        assert_eq!(eval_in_mode(&transition, "Falling"), TransitionEvalResult::NO_TRANSITION);
        assert_eq!(eval_in_mode(&transition, "Flying"), TransitionEvalResult::to_mode("Falling"));

        transition.set_next_mode("Falling", true);
        assert_eq!(eval_in_mode(&transition, "Falling"), TransitionEvalResult::to_mode("Falling"));
    }

    #[test]
    fn test_clones_share_pending_mode() {
        let handle = ImmediateMovementModeTransition::new();
        let registered = handle.clone();
        handle.set_next_mode("Flying", false);
        assert_eq!(registered.next_mode_name().as_deref(), Some("Flying"));
        registered.clear();
        assert!(!handle.is_set());
    }
}
