//! Movement modifier contract

use std::any::{self, Any};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::component::UpdatedComponent;
use crate::config::CommonMovementSettings;
use crate::layered_moves::base::duration_elapsed;
use crate::modifiers::handle::ModifierHandle;
use crate::slot_arena::CloneBoxed;
use crate::types::{has_started, short_type_name, GameplayTag, GameplayTagContainer, MoverTimeStep, NOT_STARTED_MS};

/// Timing and identity shared by every modifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierCore {
    /// `> 0` timed, `0` one tick, `< 0` until cancelled (default: -1)
    pub duration_ms: f32,
    pub start_sim_time_ms: f64,
    /// Local only, never replicated
    #[serde(skip)]
    pub handle: ModifierHandle,
    pub gameplay_tags: GameplayTagContainer,
}

impl Default for ModifierCore {
    fn default() -> Self {
        Self {
            duration_ms: -1.0,
            start_sim_time_ms: NOT_STARTED_MS,
            handle: ModifierHandle::INVALID,
            gameplay_tags: GameplayTagContainer::new(),
        }
    }
}

impl ModifierCore {
    pub fn has_started(&self) -> bool {
        has_started(self.start_sim_time_ms)
    }

    pub fn is_finished(&self, current_sim_time_ms: f64) -> bool {
        duration_elapsed(self.start_sim_time_ms, self.duration_ms, current_sim_time_ms)
    }
}

/// What a modifier hook may touch.
pub struct ModifierContext<'a> {
    pub component: &'a mut dyn UpdatedComponent,
    pub settings: &'a mut CommonMovementSettings,
    pub time_step: &'a MoverTimeStep,
}

pub trait MovementModifierBase: Any + Send + Sync + fmt::Debug + 'static {
    fn clone_modifier(&self) -> Box<dyn MovementModifier>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn modifier_type_name(&self) -> &'static str;
}

impl<T: MovementModifier + Clone> MovementModifierBase for T {
    fn clone_modifier(&self) -> Box<dyn MovementModifier> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn modifier_type_name(&self) -> &'static str {
        any::type_name::<T>()
    }
}

/// Timed side effect wrapped around each substep's movement.
pub trait MovementModifier: MovementModifierBase + 'static {
    fn core(&self) -> &ModifierCore;

    fn core_mut(&mut self) -> &mut ModifierCore;

    fn on_start(&mut self, _ctx: &mut ModifierContext<'_>) {}

    fn on_end(&mut self, _ctx: &mut ModifierContext<'_>) {}

    fn on_pre_movement(&mut self, _ctx: &mut ModifierContext<'_>) {}

    fn on_post_movement(&mut self, _ctx: &mut ModifierContext<'_>) {}

    /// Two modifiers "match" when a queued one should fold into an active one.
    fn matches(&self, other: &dyn MovementModifier) -> bool {
        self.modifier_type_name() == other.modifier_type_name()
    }

    fn has_gameplay_tag(&self, tag: &GameplayTag, exact_match: bool) -> bool {
        self.core().gameplay_tags.has_tag(tag, exact_match)
    }

    fn start_modifier(&mut self, ctx: &mut ModifierContext<'_>) {
        self.core_mut().start_sim_time_ms = ctx.time_step.base_sim_time_ms;
        self.on_start(ctx);
    }

    fn end_modifier(&mut self, ctx: &mut ModifierContext<'_>) {
        self.on_end(ctx);
    }

    fn is_finished(&self, current_sim_time_ms: f64) -> bool {
        self.core().is_finished(current_sim_time_ms)
    }

    fn handle(&self) -> ModifierHandle {
        self.core().handle
    }

    fn overwrite_handle_if_invalid(&mut self, handle: ModifierHandle) {
        if handle.is_valid() && !self.core().handle.is_valid() {
            self.core_mut().handle = handle;
        }
    }
}

impl dyn MovementModifier {
    pub fn downcast_ref<T: MovementModifier>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: MovementModifier>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    pub fn is<T: MovementModifier>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn short_name(&self) -> &'static str {
        short_type_name(self.modifier_type_name())
    }
}

impl CloneBoxed for dyn MovementModifier {
    fn clone_boxed(&self) -> Box<Self> {
        self.clone_modifier()
    }
}
