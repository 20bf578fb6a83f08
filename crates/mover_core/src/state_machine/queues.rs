//! Cross-thread request queues consumed by the state machine
//!
//! Every queue has its own lock, held only around the push/drain itself.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::instant_effects::ScheduledInstantMovementEffect;
use crate::layered_moves::{LayeredMove, LayeredMoveInstance};
use crate::modifiers::{ModifierHandle, ModifierHandleGenerator, MovementModifier};
use crate::types::{GameplayTag, TagCancellationRequest};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct MovementQueues {
    layered_moves: RwLock<Vec<Box<dyn LayeredMove>>>,
    layered_move_instances: RwLock<Vec<LayeredMoveInstance>>,
    modifiers: RwLock<Vec<Box<dyn MovementModifier>>>,
    modifiers_to_cancel: RwLock<Vec<ModifierHandle>>,
    tags_to_cancel: RwLock<Vec<TagCancellationRequest>>,
    instant_effects: RwLock<Vec<ScheduledInstantMovementEffect>>,
    handles: ModifierHandleGenerator,
}

impl MovementQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_layered_move(&self, layered_move: Box<dyn LayeredMove>) {
        write(&self.layered_moves).push(layered_move);
    }

    pub fn queue_layered_move_instance(&self, instance: LayeredMoveInstance) {
        write(&self.layered_move_instances).push(instance);
    }

    /// Assigns a fresh handle (overwriting any the modifier carried) and queues it.
    pub fn queue_movement_modifier(&self, mut modifier: Box<dyn MovementModifier>) -> ModifierHandle {
        let handle = self.handles.generate();
        modifier.core_mut().handle = handle;
        debug!("Queued {} with handle {}", modifier.short_name(), handle);
        write(&self.modifiers).push(modifier);
        handle
    }

    /// Drops a still-queued modifier and records the handle for active ones.
    pub fn cancel_modifier_from_handle(&self, handle: ModifierHandle) {
        if !handle.is_valid() {
            return;
        }
        write(&self.modifiers).retain(|m| m.handle() != handle);
        write(&self.modifiers_to_cancel).push(handle);
    }

    pub fn has_queued_modifier(&self, handle: ModifierHandle) -> bool {
        handle.is_valid() && read(&self.modifiers).iter().any(|m| m.handle() == handle)
    }

    /// Clone of a queued modifier, if `handle` is still waiting to start.
    pub fn find_queued_modifier(&self, handle: ModifierHandle) -> Option<Box<dyn MovementModifier>> {
        if !handle.is_valid() {
            return None;
        }
        read(&self.modifiers).iter().find(|m| m.handle() == handle).map(|m| m.clone_modifier())
    }

    pub fn find_queued_modifier_by_type<T: MovementModifier + Clone>(&self) -> Option<T> {
        read(&self.modifiers).iter().find_map(|m| m.downcast_ref::<T>().cloned())
    }

    /// Remove matching queued items now; active ones are cancelled at the next substep.
    pub fn cancel_features_with_tag(&self, tag: GameplayTag, exact_match: bool) {
        write(&self.modifiers).retain(|m| !m.has_gameplay_tag(&tag, exact_match));
        write(&self.layered_moves).retain(|m| !m.has_gameplay_tag(&tag, exact_match));
        write(&self.layered_move_instances).retain(|m| !m.has_gameplay_tag(&tag, exact_match));
        write(&self.tags_to_cancel).push(TagCancellationRequest::new(tag, exact_match));
    }

    pub fn queue_instant_movement_effect(&self, effect: ScheduledInstantMovementEffect) {
        write(&self.instant_effects).push(effect);
    }

    pub fn queue_instant_movement_effects(&self, effects: impl IntoIterator<Item = ScheduledInstantMovementEffect>) {
        write(&self.instant_effects).extend(effects);
    }

    pub fn has_any_instant_effects_queued(&self) -> bool {
        !read(&self.instant_effects).is_empty()
    }

    pub fn num_queued_layered_moves(&self) -> usize {
        read(&self.layered_moves).len() + read(&self.layered_move_instances).len()
    }

    pub fn num_queued_modifiers(&self) -> usize {
        read(&self.modifiers).len()
    }

    pub(crate) fn take_layered_moves(&self) -> Vec<Box<dyn LayeredMove>> {
        std::mem::take(&mut *write(&self.layered_moves))
    }

    pub(crate) fn take_layered_move_instances(&self) -> Vec<LayeredMoveInstance> {
        std::mem::take(&mut *write(&self.layered_move_instances))
    }

    pub(crate) fn take_modifiers(&self) -> Vec<Box<dyn MovementModifier>> {
        std::mem::take(&mut *write(&self.modifiers))
    }

    pub(crate) fn take_modifiers_to_cancel(&self) -> Vec<ModifierHandle> {
        std::mem::take(&mut *write(&self.modifiers_to_cancel))
    }

    pub(crate) fn take_tags_to_cancel(&self) -> Vec<TagCancellationRequest> {
        std::mem::take(&mut *write(&self.tags_to_cancel))
    }

    pub(crate) fn take_instant_effects(&self) -> Vec<ScheduledInstantMovementEffect> {
        std::mem::take(&mut *write(&self.instant_effects))
    }

    /// Rollback: drop everything that was requested for the discarded timeline.
    pub(crate) fn clear(&self) {
        write(&self.layered_moves).clear();
        write(&self.layered_move_instances).clear();
        write(&self.modifiers).clear();
        write(&self.instant_effects).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layered_moves::LaunchMove;
    use crate::modifiers::{Stance, StanceModifier, CROUCH_TAG};
    use nalgebra::Vector3;

    #[test]
    fn test_modifier_handles_are_fresh_and_cancellable() {
        let queues = MovementQueues::new();
        let a = queues.queue_movement_modifier(Box::new(StanceModifier::new(Stance::Crouch)));
        let b = queues.queue_movement_modifier(Box::new(StanceModifier::new(Stance::Crouch)));
        assert_ne!(a, b);
        assert!(queues.has_queued_modifier(a));

        queues.cancel_modifier_from_handle(a);
        assert!(!queues.has_queued_modifier(a));
        assert!(queues.find_queued_modifier(b).is_some());
        assert_eq!(queues.take_modifiers_to_cancel(), vec![a]);
    }

    #[test]
    fn test_tag_cancel_drops_queued_and_records_request() {
        let queues = MovementQueues::new();
        queues.queue_movement_modifier(Box::new(StanceModifier::new(Stance::Crouch)));
        queues.queue_layered_move(Box::new(LaunchMove::new(Vector3::z(), 100.0)));

        queues.cancel_features_with_tag(GameplayTag::new(CROUCH_TAG), true);
        assert_eq!(queues.num_queued_modifiers(), 0);
        assert_eq!(queues.num_queued_layered_moves(), 1);
        assert_eq!(queues.take_tags_to_cancel().len(), 1);
        assert!(queues.take_tags_to_cancel().is_empty());
    }
}
