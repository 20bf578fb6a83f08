//! Layered move contract
//!
//! A layered move is a time-boxed velocity/rotation contribution mixed on top
//! of whatever the current mode proposes.
//!
//! Duration rules:
//! - `> 0`: finished once `start + duration <= now`
//! - `== 0`: finished after its first tick
//! - `< 0`: runs until cancelled or it ends itself

use std::any::{self, Any};
use std::fmt;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::component::UpdatedComponent;
use crate::data::MoverTickStartData;
use crate::move_library::{MixableMove, RollbackBlackboard};
use crate::slot_arena::CloneBoxed;
use crate::types::{
    has_started, short_type_name, GameplayTag, GameplayTagContainer, MoveMixMode, MoverTimeStep, ProposedMove,
    NOT_STARTED_MS,
};

/// What velocity a move leaves behind when it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FinishVelocityMode {
    /// Leave whatever velocity the last tick produced
    #[default]
    MaintainLastRootMotionVelocity,
    SetVelocity,
    ClampVelocity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishVelocitySettings {
    pub mode: FinishVelocityMode,
    pub set_velocity: Vector3<f32>,
    pub clamp_velocity: f32,
}

impl Default for FinishVelocitySettings {
    fn default() -> Self {
        Self { mode: FinishVelocityMode::MaintainLastRootMotionVelocity, set_velocity: Vector3::zeros(), clamp_velocity: 0.0 }
    }
}

impl FinishVelocitySettings {
    pub fn set_velocity(velocity: Vector3<f32>) -> Self {
        Self { mode: FinishVelocityMode::SetVelocity, set_velocity: velocity, ..Self::default() }
    }

    pub fn clamp_velocity(max_speed: f32) -> Self {
        Self { mode: FinishVelocityMode::ClampVelocity, clamp_velocity: max_speed, ..Self::default() }
    }
}

/// Timing and mixing fields shared by every layered move (legacy or instanced).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayeredMoveCore {
    pub mix_mode: MoveMixMode,
    /// Higher wins override conflicts (default: 0)
    pub priority: u8,
    /// See module docs for the sign convention (default: -1)
    pub duration_ms: f32,
    pub start_sim_time_ms: f64,
    pub finish_velocity_settings: FinishVelocitySettings,
    pub gameplay_tags: GameplayTagContainer,
}

impl Default for LayeredMoveCore {
    fn default() -> Self {
        Self {
            mix_mode: MoveMixMode::AdditiveVelocity,
            priority: 0,
            duration_ms: -1.0,
            start_sim_time_ms: NOT_STARTED_MS,
            finish_velocity_settings: FinishVelocitySettings::default(),
            gameplay_tags: GameplayTagContainer::new(),
        }
    }
}

impl LayeredMoveCore {
    pub fn with_timing(mix_mode: MoveMixMode, priority: u8, duration_ms: f32) -> Self {
        Self { mix_mode, priority, duration_ms, ..Self::default() }
    }

    pub fn has_started(&self) -> bool {
        has_started(self.start_sim_time_ms)
    }

    pub fn is_finished(&self, current_sim_time_ms: f64) -> bool {
        duration_elapsed(self.start_sim_time_ms, self.duration_ms, current_sim_time_ms)
    }
}

/// Shared expiry rule for legacy moves, instanced moves and modifiers.
pub(crate) fn duration_elapsed(start_sim_time_ms: f64, duration_ms: f32, current_sim_time_ms: f64) -> bool {
    let started = has_started(start_sim_time_ms);
    let time_expired =
        started && duration_ms > 0.0 && start_sim_time_ms + duration_ms as f64 <= current_sim_time_ms;
    let ticked_once = started && duration_ms == 0.0;
    time_expired || ticked_once
}

/// Object plumbing every layered move gets from the blanket impl.
pub trait LayeredMoveBase: Any + Send + Sync + fmt::Debug + 'static {
    fn clone_move(&self) -> Box<dyn LayeredMove>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn move_type_name(&self) -> &'static str;
}

impl<T: LayeredMove + Clone> LayeredMoveBase for T {
    fn clone_move(&self) -> Box<dyn LayeredMove> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn move_type_name(&self) -> &'static str {
        any::type_name::<T>()
    }
}

/// Self-contained layered move: timing data and behavior in one value.
pub trait LayeredMove: LayeredMoveBase + 'static {
    fn core(&self) -> &LayeredMoveCore;

    fn core_mut(&mut self) -> &mut LayeredMoveCore;

    fn on_start(&mut self, _component: &dyn UpdatedComponent, _blackboard: &mut RollbackBlackboard) {}

    fn on_end(
        &mut self,
        _component: &dyn UpdatedComponent,
        _blackboard: &mut RollbackBlackboard,
        _current_sim_time_ms: f64,
    ) {
    }

    /// Fill `out` with this move's contribution. Returning false means "no contribution this substep".
    fn generate_move(
        &mut self,
        start_state: &MoverTickStartData,
        time_step: &MoverTimeStep,
        component: &dyn UpdatedComponent,
        blackboard: &mut RollbackBlackboard,
        out: &mut ProposedMove,
    ) -> bool;

    fn has_gameplay_tag(&self, tag: &GameplayTag, exact_match: bool) -> bool {
        self.core().gameplay_tags.has_tag(tag, exact_match)
    }

    fn start_move(
        &mut self,
        component: &dyn UpdatedComponent,
        blackboard: &mut RollbackBlackboard,
        current_sim_time_ms: f64,
    ) {
        self.core_mut().start_sim_time_ms = current_sim_time_ms;
        self.on_start(component, blackboard);
    }

    fn end_move(
        &mut self,
        component: &dyn UpdatedComponent,
        blackboard: &mut RollbackBlackboard,
        current_sim_time_ms: f64,
    ) {
        self.on_end(component, blackboard, current_sim_time_ms);
    }

    fn is_finished(&self, current_sim_time_ms: f64) -> bool {
        self.core().is_finished(current_sim_time_ms)
    }
}

impl dyn LayeredMove {
    pub fn downcast_ref<T: LayeredMove>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: LayeredMove>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    pub fn is<T: LayeredMove>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn short_name(&self) -> &'static str {
        short_type_name(self.move_type_name())
    }
}

impl CloneBoxed for dyn LayeredMove {
    fn clone_boxed(&self) -> Box<Self> {
        self.clone_move()
    }
}

impl MixableMove for dyn LayeredMove {
    fn priority(&self) -> u8 {
        self.core().priority
    }

    fn start_sim_time_ms(&self) -> f64 {
        self.core().start_sim_time_ms
    }

    fn label(&self) -> &str {
        self.short_name()
    }
}
