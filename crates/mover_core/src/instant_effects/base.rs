//! Instant movement effect contract and scheduling

use std::any::{self, Any};
use std::fmt;

use crate::component::UpdatedComponent;
use crate::config::CommonMovementSettings;
use crate::data::{MoverSyncState, MoverTickStartData};
use crate::move_library::RollbackBlackboard;
use crate::slot_arena::CloneBoxed;
use crate::types::{short_type_name, MoverSimulationEvent, MoverTimeStep};

/// What an effect may read and touch while it is applied.
pub struct ApplyEffectParams<'a> {
    pub component: &'a mut dyn UpdatedComponent,
    pub blackboard: &'a mut RollbackBlackboard,
    pub start_state: &'a MoverTickStartData,
    pub time_step: &'a MoverTimeStep,
    pub settings: &'a CommonMovementSettings,
    /// Events raised by the effect; the state machine buffers them after each apply
    pub output_events: &'a mut Vec<MoverSimulationEvent>,
}

pub trait InstantMovementEffectBase: Any + Send + Sync + fmt::Debug + 'static {
    fn clone_effect(&self) -> Box<dyn InstantMovementEffect>;
    fn as_any(&self) -> &dyn Any;
    fn effect_type_name(&self) -> &'static str;
}

impl<T: InstantMovementEffect + Clone> InstantMovementEffectBase for T {
    fn clone_effect(&self) -> Box<dyn InstantMovementEffect> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn effect_type_name(&self) -> &'static str {
        any::type_name::<T>()
    }
}

/// One-shot state mutation applied outside the proposed-move pipeline.
pub trait InstantMovementEffect: InstantMovementEffectBase + 'static {
    /// Mutate `output`. Returns true if anything was changed.
    fn apply_movement_effect(&mut self, params: &mut ApplyEffectParams<'_>, output: &mut MoverSyncState) -> bool;
}

impl dyn InstantMovementEffect {
    pub fn downcast_ref<T: InstantMovementEffect>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: InstantMovementEffect>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn short_name(&self) -> &'static str {
        short_type_name(self.effect_type_name())
    }
}

impl CloneBoxed for dyn InstantMovementEffect {
    fn clone_boxed(&self) -> Box<Self> {
        self.clone_effect()
    }
}

/// An effect plus when it may run.
///
/// Fixed-step simulations schedule by server frame; variable-step ones by
/// simulation time in seconds.
#[derive(Debug)]
pub struct ScheduledInstantMovementEffect {
    pub execution_server_frame: u32,
    pub execution_server_time_secs: f64,
    pub is_fixed_dt: bool,
    pub effect: Box<dyn InstantMovementEffect>,
}

impl Clone for ScheduledInstantMovementEffect {
    fn clone(&self) -> Self {
        Self {
            execution_server_frame: self.execution_server_frame,
            execution_server_time_secs: self.execution_server_time_secs,
            is_fixed_dt: self.is_fixed_dt,
            effect: self.effect.clone_effect(),
        }
    }
}

impl ScheduledInstantMovementEffect {
    /// Run as soon as possible (the next substep that checks the queue).
    pub fn immediate(effect: Box<dyn InstantMovementEffect>) -> Self {
        Self { execution_server_frame: 0, execution_server_time_secs: 0.0, is_fixed_dt: true, effect }
    }

    /// Schedule `delay_secs` after `time_step`.
    ///
    /// With `fixed_dt_secs` the delay is rounded up to whole frames.
    pub fn schedule(
        time_step: &MoverTimeStep,
        effect: Box<dyn InstantMovementEffect>,
        delay_secs: f32,
        fixed_dt_secs: Option<f32>,
    ) -> Self {
        let delay_secs = delay_secs.max(0.0);
        let execution_server_time_secs = time_step.base_sim_time_secs() + delay_secs as f64;
        match fixed_dt_secs {
            Some(dt) if dt > 0.0 => {
                let delay_frames = if delay_secs != 0.0 { (delay_secs / dt).ceil() as u32 } else { 0 };
                Self {
                    execution_server_frame: time_step.server_frame.saturating_add(delay_frames),
                    execution_server_time_secs,
                    is_fixed_dt: true,
                    effect,
                }
            }
            _ => Self {
                execution_server_frame: time_step.server_frame,
                execution_server_time_secs,
                is_fixed_dt: false,
                effect,
            },
        }
    }

    pub fn should_execute_at_frame(&self, server_frame: u32) -> bool {
        server_frame >= self.execution_server_frame
    }

    pub fn should_execute_at_time(&self, server_time_secs: f64) -> bool {
        server_time_secs >= self.execution_server_time_secs
    }

    /// Check the predicate matching how this effect was scheduled.
    pub fn is_due(&self, time_step: &MoverTimeStep) -> bool {
        if self.is_fixed_dt {
            self.should_execute_at_frame(time_step.server_frame)
        } else {
            self.should_execute_at_time(time_step.base_sim_time_secs())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instant_effects::ApplyVelocityEffect;
    use nalgebra::Vector3;

    fn effect() -> Box<dyn InstantMovementEffect> {
        Box::new(ApplyVelocityEffect::new(Vector3::z()))
    }

    #[test]
    fn test_fixed_schedule_rounds_up_to_frames() {
        let ts = MoverTimeStep::new(1000.0, 16.0, 10);
        // 2.5 frames of delay rounds up to 3
        let scheduled = ScheduledInstantMovementEffect::schedule(&ts, effect(), 0.05, Some(0.02));
        assert!(scheduled.is_fixed_dt);
        assert_eq!(scheduled.execution_server_frame, 13);
        assert!(!scheduled.should_execute_at_frame(12));
        assert!(scheduled.should_execute_at_frame(13));

        let now = ScheduledInstantMovementEffect::schedule(&ts, effect(), 0.0, Some(0.02));
        assert_eq!(now.execution_server_frame, 10);
        assert!(now.is_due(&ts));
    }

    #[test]
    fn test_time_schedule_waits_for_sim_time() {
        let ts = MoverTimeStep::new(2000.0, 16.0, 5);
        let scheduled = ScheduledInstantMovementEffect::schedule(&ts, effect(), 0.5, None);
        assert!(!scheduled.is_fixed_dt);
        assert!(!scheduled.is_due(&ts));
        assert!(scheduled.is_due(&MoverTimeStep::new(2500.0, 16.0, 35)));
        assert!(scheduled.should_execute_at_time(2.5));
    }

    #[test]
    fn test_clone_keeps_effect_type() {
        let scheduled = ScheduledInstantMovementEffect::immediate(effect());
        let copy = scheduled.clone();
        assert!(copy.effect.is::<ApplyVelocityEffect>());
        assert_eq!(copy.effect.short_name(), "ApplyVelocityEffect");
    }
}
