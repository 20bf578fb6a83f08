//! Instanced layered moves
//!
//! Behavior lives in a shared, never-replicated [`LayeredMoveLogic`] (at most
//! one per logic type per simulation). Each activation carries its own
//! replicated [`LayeredMoveInstancedData`]. A [`LayeredMoveInstance`] pairs the two.

use std::any::{self, Any};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::data::MoverTickStartData;
use crate::error::{MoverError, Result};
use crate::layered_moves::base::{duration_elapsed, FinishVelocitySettings};
use crate::move_library::{MixableMove, RollbackBlackboard};
use crate::types::{
    has_started, short_type_name, GameplayTag, MoveMixMode, MoverTimeStep, ProposedMove, NOT_STARTED_MS,
};

/// Per-activation timing, owned by the instanced data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstancedMoveTiming {
    /// Same sign convention as legacy moves (default: -1)
    pub duration_ms: f32,
    pub start_sim_time_ms: f64,
}

impl Default for InstancedMoveTiming {
    fn default() -> Self {
        Self { duration_ms: -1.0, start_sim_time_ms: NOT_STARTED_MS }
    }
}

impl InstancedMoveTiming {
    pub fn with_duration(duration_ms: f32) -> Self {
        Self { duration_ms, ..Self::default() }
    }

    pub fn has_started(&self) -> bool {
        has_started(self.start_sim_time_ms)
    }

    pub fn is_finished(&self, current_sim_time_ms: f64) -> bool {
        duration_elapsed(self.start_sim_time_ms, self.duration_ms, current_sim_time_ms)
    }
}

pub trait LayeredMoveInstancedDataBase: Any + Send + Sync + fmt::Debug + 'static {
    fn clone_data(&self) -> Box<dyn LayeredMoveInstancedData>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn data_type_name(&self) -> &'static str;
}

impl<T: LayeredMoveInstancedData + Clone> LayeredMoveInstancedDataBase for T {
    fn clone_data(&self) -> Box<dyn LayeredMoveInstancedData> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn data_type_name(&self) -> &'static str {
        any::type_name::<T>()
    }
}

/// Replicated state of one activation.
pub trait LayeredMoveInstancedData: LayeredMoveInstancedDataBase + 'static {
    fn timing(&self) -> &InstancedMoveTiming;

    fn timing_mut(&mut self) -> &mut InstancedMoveTiming;

    fn has_gameplay_tag(&self, _tag: &GameplayTag, _exact_match: bool) -> bool {
        false
    }
}

impl dyn LayeredMoveInstancedData {
    pub fn downcast_ref<T: LayeredMoveInstancedData>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: LayeredMoveInstancedData>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    pub fn short_name(&self) -> &'static str {
        short_type_name(self.data_type_name())
    }
}

/// Authoring settings shared by every activation of one logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayeredMoveLogicSettings {
    pub mix_mode: MoveMixMode,
    /// (default: 0)
    pub priority: u8,
    pub finish_velocity_settings: FinishVelocitySettings,
}

impl Default for LayeredMoveLogicSettings {
    fn default() -> Self {
        Self {
            mix_mode: MoveMixMode::AdditiveVelocity,
            priority: 0,
            finish_velocity_settings: FinishVelocitySettings::default(),
        }
    }
}

/// Stateless behavior of an instanced move. Every hook receives the data of
/// the activation being executed.
pub trait LayeredMoveLogic: Send + Sync + fmt::Debug + 'static {
    fn settings(&self) -> &LayeredMoveLogicSettings;

    /// `std::any::type_name` of the data type this logic drives
    fn instanced_data_type_name(&self) -> &'static str;

    fn on_start(
        &self,
        _data: &mut dyn LayeredMoveInstancedData,
        _time_step: &MoverTimeStep,
        _blackboard: &mut RollbackBlackboard,
    ) {
    }

    fn on_end(
        &self,
        _data: &mut dyn LayeredMoveInstancedData,
        _time_step: &MoverTimeStep,
        _blackboard: &mut RollbackBlackboard,
    ) {
    }

    fn generate_move(
        &self,
        _data: &mut dyn LayeredMoveInstancedData,
        _start_state: &MoverTickStartData,
        _time_step: &MoverTimeStep,
        _blackboard: &mut RollbackBlackboard,
        _out: &mut ProposedMove,
    ) -> bool {
        false
    }

    fn is_finished(
        &self,
        data: &dyn LayeredMoveInstancedData,
        time_step: &MoverTimeStep,
        _blackboard: &RollbackBlackboard,
    ) -> bool {
        data.timing().is_finished(time_step.base_sim_time_ms)
    }
}

/// Logic + data: one whole instanced move.
pub struct LayeredMoveInstance {
    logic: Option<Arc<dyn LayeredMoveLogic>>,
    data: Box<dyn LayeredMoveInstancedData>,
}

impl Clone for LayeredMoveInstance {
    fn clone(&self) -> Self {
        Self { logic: self.logic.clone(), data: self.data.clone_data() }
    }
}

impl fmt::Debug for LayeredMoveInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayeredMoveInstance")
            .field("logic", &self.logic.as_ref().map(|l| l.instanced_data_type_name()))
            .field("data", &self.data)
            .finish()
    }
}

impl LayeredMoveInstance {
    pub fn new(data: Box<dyn LayeredMoveInstancedData>, logic: Arc<dyn LayeredMoveLogic>) -> Self {
        Self { logic: Some(logic), data }
    }

    /// Data decoded from the wire; logic is bound later.
    pub fn from_data(data: Box<dyn LayeredMoveInstancedData>) -> Self {
        Self { logic: None, data }
    }

    pub fn has_logic(&self) -> bool {
        self.logic.is_some()
    }

    pub fn logic(&self) -> Option<&Arc<dyn LayeredMoveLogic>> {
        self.logic.as_ref()
    }

    pub fn data(&self) -> &dyn LayeredMoveInstancedData {
        self.data.as_ref()
    }

    pub fn data_type_name(&self) -> &'static str {
        self.data.data_type_name()
    }

    pub fn data_as<T: LayeredMoveInstancedData>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    pub fn data_as_mut<T: LayeredMoveInstancedData>(&mut self) -> Option<&mut T> {
        self.data.downcast_mut::<T>()
    }

    /// Overwrite the activation data; the new value must have the data's concrete type.
    pub fn set_data<T: LayeredMoveInstancedData>(&mut self, value: T) -> Result<()> {
        let found = self.data.data_type_name();
        match self.data.downcast_mut::<T>() {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(MoverError::TypeMismatch { expected: found, found: any::type_name::<T>() }),
        }
    }

    pub fn timing(&self) -> &InstancedMoveTiming {
        self.data.timing()
    }

    pub fn mix_mode(&self) -> MoveMixMode {
        self.logic.as_ref().map_or(MoveMixMode::AdditiveVelocity, |l| l.settings().mix_mode)
    }

    pub fn finish_velocity_settings(&self) -> FinishVelocitySettings {
        self.logic.as_ref().map(|l| l.settings().finish_velocity_settings.clone()).unwrap_or_default()
    }

    pub fn has_gameplay_tag(&self, tag: &GameplayTag, exact_match: bool) -> bool {
        self.data.has_gameplay_tag(tag, exact_match)
    }

    pub fn start_move(&mut self, time_step: &MoverTimeStep, blackboard: &mut RollbackBlackboard) {
        if let Some(logic) = &self.logic {
            logic.on_start(self.data.as_mut(), time_step, blackboard);
            self.data.timing_mut().start_sim_time_ms = time_step.base_sim_time_ms;
        }
    }

    /// Moves past their first substep no longer push their preferred mode.
    pub fn generate_move(
        &mut self,
        start_state: &MoverTickStartData,
        time_step: &MoverTimeStep,
        blackboard: &mut RollbackBlackboard,
        out: &mut ProposedMove,
    ) -> bool {
        let Some(logic) = &self.logic else {
            return false;
        };
        if !logic.generate_move(self.data.as_mut(), start_state, time_step, blackboard, out) {
            return false;
        }
        if self.data.timing().start_sim_time_ms < time_step.base_sim_time_ms {
            out.preferred_mode = None;
        }
        true
    }

    pub fn end_move(&mut self, time_step: &MoverTimeStep, blackboard: &mut RollbackBlackboard) {
        if let Some(logic) = &self.logic {
            logic.on_end(self.data.as_mut(), time_step, blackboard);
        }
    }

    pub fn is_finished(&self, time_step: &MoverTimeStep, blackboard: &RollbackBlackboard) -> bool {
        match &self.logic {
            Some(logic) => logic.is_finished(self.data.as_ref(), time_step, blackboard),
            None => false,
        }
    }

    /// Bind logic by matching the data type name. Returns true if logic is present afterwards.
    pub fn populate_missing_logic(&mut self, registered: &[Arc<dyn LayeredMoveLogic>]) -> bool {
        if self.logic.is_some() {
            return true;
        }
        let data_type = self.data.data_type_name();
        match registered.iter().find(|l| l.instanced_data_type_name() == data_type) {
            Some(logic) => {
                self.logic = Some(Arc::clone(logic));
                true
            }
            None => {
                warn!("Active layered move couldn't find logic for data type {} among registered logic", data_type);
                false
            }
        }
    }
}

impl MixableMove for LayeredMoveInstance {
    fn priority(&self) -> u8 {
        self.logic.as_ref().map_or(0, |l| l.settings().priority)
    }

    fn start_sim_time_ms(&self) -> f64 {
        self.data.timing().start_sim_time_ms
    }

    fn label(&self) -> &str {
        self.data.short_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default)]
    struct Dash {
        timing: InstancedMoveTiming,
        speed: f32,
    }

    impl LayeredMoveInstancedData for Dash {
        fn timing(&self) -> &InstancedMoveTiming {
            &self.timing
        }

        fn timing_mut(&mut self) -> &mut InstancedMoveTiming {
            &mut self.timing
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Other {
        timing: InstancedMoveTiming,
    }

    impl LayeredMoveInstancedData for Other {
        fn timing(&self) -> &InstancedMoveTiming {
            &self.timing
        }

        fn timing_mut(&mut self) -> &mut InstancedMoveTiming {
            &mut self.timing
        }
    }

    #[derive(Debug, Default)]
    struct DashLogic {
        settings: LayeredMoveLogicSettings,
    }

    impl LayeredMoveLogic for DashLogic {
        fn settings(&self) -> &LayeredMoveLogicSettings {
            &self.settings
        }

        fn instanced_data_type_name(&self) -> &'static str {
            any::type_name::<Dash>()
        }
    }

    #[test]
    fn test_typed_accessors_reject_wrong_type() {
        let mut instance = LayeredMoveInstance::from_data(Box::new(Dash { speed: 3.0, ..Dash::default() }));
        assert_eq!(instance.data_as::<Dash>().map(|d| d.speed), Some(3.0));
        assert!(instance.data_as::<Other>().is_none());

        let err = instance.set_data(Other::default()).unwrap_err();
        assert!(matches!(err, MoverError::TypeMismatch { .. }));
        assert!(instance.set_data(Dash { speed: 9.0, ..Dash::default() }).is_ok());
        assert_eq!(instance.data_as::<Dash>().map(|d| d.speed), Some(9.0));
    }

    #[test]
    fn test_populate_missing_logic_matches_data_type() {
        let registered: Vec<Arc<dyn LayeredMoveLogic>> = vec![Arc::new(DashLogic::default())];
        let mut dash = LayeredMoveInstance::from_data(Box::new(Dash::default()));
        assert!(!dash.has_logic());
        assert!(dash.populate_missing_logic(&registered));
        assert!(dash.has_logic());

        let mut other = LayeredMoveInstance::from_data(Box::new(Other::default()));
        assert!(!other.populate_missing_logic(&registered));
    }

    #[test]
    fn test_start_sets_time_only_with_logic() {
        let mut bb = RollbackBlackboard::new();
        let ts = MoverTimeStep::new(250.0, 16.0, 3);
        let mut orphan = LayeredMoveInstance::from_data(Box::new(Dash::default()));
        orphan.start_move(&ts, &mut bb);
        assert!(!orphan.timing().has_started());

        let mut bound = LayeredMoveInstance::new(Box::new(Dash::default()), Arc::new(DashLogic::default()));
        bound.start_move(&ts, &mut bb);
        assert_eq!(bound.timing().start_sim_time_ms, 250.0);
    }
}
