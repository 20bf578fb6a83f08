//! Movement Modifier Group
//!
//! Active and queued modifiers of one sync state. Queued modifiers whose type
//! is already active fold into the active one (handing over their handle)
//! instead of starting a second copy.

use std::fmt;

use tracing::{debug, info};

use crate::modifiers::base::{ModifierContext, MovementModifier};
use crate::modifiers::handle::ModifierHandle;
use crate::slot_arena::{SlotArena, SlotKey};
use crate::types::GameplayTag;

#[derive(Clone, Default)]
pub struct MovementModifierGroup {
    modifiers: SlotArena<dyn MovementModifier>,
    active: Vec<SlotKey>,
    queued: Vec<SlotKey>,
}

impl MovementModifierGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_movement_modifier(&mut self, modifier: Box<dyn MovementModifier>) {
        debug!("Queued movement modifier {} ({})", modifier.short_name(), modifier.handle());
        let key = self.modifiers.insert(modifier);
        self.queued.push(key);
    }

    /// Active matches end at the next flush; queued matches are dropped now.
    pub fn cancel_modifier_from_handle(&mut self, handle: ModifierHandle) {
        self.cancel_where(|m| m.handle() == handle);
    }

    pub fn cancel_modifiers_by_tag(&mut self, tag: &GameplayTag, exact_match: bool) {
        self.cancel_where(|m| m.has_gameplay_tag(tag, exact_match));
    }

    fn cancel_where(&mut self, matches: impl Fn(&dyn MovementModifier) -> bool) {
        for key in &self.active {
            if let Some(modifier) = self.modifiers.get_mut(*key) {
                if matches(modifier) {
                    modifier.core_mut().duration_ms = 0.0;
                }
            }
        }
        let modifiers = &mut self.modifiers;
        self.queued.retain(|key| {
            let cancel = modifiers.get(*key).map_or(true, |m| matches(m));
            if cancel {
                modifiers.remove(*key);
            }
            !cancel
        });
    }

    pub fn num_active(&self) -> usize {
        self.active.len()
    }

    pub fn num_queued(&self) -> usize {
        self.queued.len()
    }

    pub fn active_modifiers(&self) -> impl Iterator<Item = &dyn MovementModifier> {
        self.active.iter().filter_map(|key| self.modifiers.get(*key))
    }

    pub fn queued_modifiers(&self) -> impl Iterator<Item = &dyn MovementModifier> {
        self.queued.iter().filter_map(|key| self.modifiers.get(*key))
    }

    /// Searches active, then queued.
    pub fn find_modifier(&self, handle: ModifierHandle) -> Option<&dyn MovementModifier> {
        if !handle.is_valid() {
            return None;
        }
        self.active_modifiers().chain(self.queued_modifiers()).find(|m| m.handle() == handle)
    }

    pub fn find_modifier_by_type<T: MovementModifier>(&self) -> Option<&T> {
        self.active_modifiers().chain(self.queued_modifiers()).find_map(|m| m.downcast_ref::<T>())
    }

    /// End finished modifiers, then start (or fold) everything queued.
    pub fn flush_modifier_arrays(&mut self, ctx: &mut ModifierContext<'_>) {
        let now = ctx.time_step.base_sim_time_ms;
        let mut kept = Vec::with_capacity(self.active.len());
        for key in std::mem::take(&mut self.active) {
            let Some(modifier) = self.modifiers.get_mut(key) else {
                continue;
            };
            if modifier.is_finished(now) {
                modifier.end_modifier(ctx);
                debug!("Ended movement modifier {} at {:.2}ms", modifier.short_name(), now);
                self.modifiers.remove(key);
            } else {
                kept.push(key);
            }
        }
        self.active = kept;

        for key in std::mem::take(&mut self.queued) {
            let Some(queued) = self.modifiers.get(key) else {
                continue;
            };
            let queued_handle = queued.handle();
            let existing = self
                .active
                .iter()
                .copied()
                .find(|active_key| self.modifiers.get(*active_key).is_some_and(|active| queued.matches(active)));

            match existing {
                Some(active_key) => {
                    if let Some(active) = self.modifiers.get_mut(active_key) {
                        active.overwrite_handle_if_invalid(queued_handle);
                    }
                    self.modifiers.remove(key);
                }
                None => {
                    if let Some(modifier) = self.modifiers.get_mut(key) {
                        modifier.start_modifier(ctx);
                        debug!("Started movement modifier {} ({})", modifier.short_name(), modifier.handle());
                    }
                    self.active.push(key);
                }
            }
        }
    }

    pub fn pre_movement(&mut self, ctx: &mut ModifierContext<'_>) {
        for key in &self.active {
            if let Some(modifier) = self.modifiers.get_mut(*key) {
                modifier.on_pre_movement(ctx);
            }
        }
    }

    pub fn post_movement(&mut self, ctx: &mut ModifierContext<'_>) {
        for key in &self.active {
            if let Some(modifier) = self.modifiers.get_mut(*key) {
                modifier.on_post_movement(ctx);
            }
        }
    }

    /// Diff this (authoritative) group's active set against the one being discarded.
    ///
    /// Modifiers only present here get `on_start`; those only present in
    /// `discarded` get `on_end`. Matches inherit the discarded copy's handle.
    pub fn reconcile_after_rollback(&mut self, discarded: &mut MovementModifierGroup, ctx: &mut ModifierContext<'_>) {
        for key in &self.active {
            let Some(modifier) = self.modifiers.get_mut(*key) else {
                continue;
            };
            let local = discarded.active_modifiers().find(|old| modifier.matches(*old)).map(|old| old.handle());
            match local {
                Some(handle) => modifier.overwrite_handle_if_invalid(handle),
                None => {
                    info!("Modifier ({}) was started after a rollback", modifier.short_name());
                    modifier.on_start(ctx);
                }
            }
        }

        for key in &discarded.active {
            let Some(old) = discarded.modifiers.get_mut(*key) else {
                continue;
            };
            let still_active = self.active_modifiers().any(|m| m.matches(&*old));
            if !still_active {
                info!("Modifier ({}) was ended after a rollback", old.short_name());
                old.on_end(ctx);
            }
        }
    }

    /// Same modifier types in the same order.
    pub fn has_same_contents(&self, other: &MovementModifierGroup) -> bool {
        fn names<'a>(it: impl Iterator<Item = &'a dyn MovementModifier>) -> Vec<&'static str> {
            it.map(|m| m.modifier_type_name()).collect()
        }
        names(self.active_modifiers()) == names(other.active_modifiers())
            && names(self.queued_modifiers()) == names(other.queued_modifiers())
    }

    pub fn should_reconcile(&self, authority: &MovementModifierGroup) -> bool {
        !self.has_same_contents(authority)
    }

    pub fn reset(&mut self) {
        self.modifiers.clear();
        self.active.clear();
        self.queued.clear();
    }

    pub(crate) fn from_parts(active: Vec<Box<dyn MovementModifier>>, queued: Vec<Box<dyn MovementModifier>>) -> Self {
        let mut group = Self::new();
        for m in active {
            let key = group.modifiers.insert(m);
            group.active.push(key);
        }
        for m in queued {
            let key = group.modifiers.insert(m);
            group.queued.push(key);
        }
        group
    }
}

impl fmt::Debug for MovementModifierGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MovementModifierGroup")
            .field("active", &self.active_modifiers().collect::<Vec<_>>())
            .field("queued", &self.queued_modifiers().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Display for MovementModifierGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MovementModifierGroup: Active: {} Queued: {}", self.active.len(), self.queued.len())
    }
}

// ========== Tests ==========

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::KinematicBody;
    use crate::config::CommonMovementSettings;
    use crate::modifiers::base::ModifierCore;
    use crate::modifiers::handle::ModifierHandleGenerator;
    use crate::types::MoverTimeStep;

    #[derive(Debug, Clone, Default)]
    struct Haste {
        core: ModifierCore,
        starts: u32,
        ends: u32,
    }

    impl MovementModifier for Haste {
        fn core(&self) -> &ModifierCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut ModifierCore {
            &mut self.core
        }

        fn on_start(&mut self, ctx: &mut ModifierContext<'_>) {
            self.starts += 1;
            ctx.settings.max_speed *= 2.0;
        }

        fn on_end(&mut self, ctx: &mut ModifierContext<'_>) {
            self.ends += 1;
            ctx.settings.max_speed /= 2.0;
        }
    }

    fn haste(handle: ModifierHandle) -> Box<Haste> {
        let mut m = Haste::default();
        m.core.handle = handle;
        Box::new(m)
    }

    fn flush(group: &mut MovementModifierGroup, settings: &mut CommonMovementSettings, t: f64) {
        let mut body = KinematicBody::default();
        let ts = MoverTimeStep::new(t, 16.0, 0);
        let mut ctx = ModifierContext { component: &mut body, settings, time_step: &ts };
        group.flush_modifier_arrays(&mut ctx);
    }

    #[test]
    fn test_cancel_by_handle_ends_once() {
        let handles = ModifierHandleGenerator::new();
        let handle = handles.generate();
        let mut settings = CommonMovementSettings::default();
        let mut group = MovementModifierGroup::new();
        group.queue_movement_modifier(haste(handle));
        flush(&mut group, &mut settings, 0.0);
        assert_eq!(settings.max_speed, 1600.0);
        assert!(group.find_modifier(handle).is_some());

        group.cancel_modifier_from_handle(handle);
        flush(&mut group, &mut settings, 16.0);
        flush(&mut group, &mut settings, 32.0);
        assert_eq!(group.num_active(), 0);
        assert_eq!(settings.max_speed, 800.0);
    }

    #[test]
    fn test_repeat_flush_keeps_modifier_started_once() {
        let handles = ModifierHandleGenerator::new();
        let mut settings = CommonMovementSettings::default();
        let mut group = MovementModifierGroup::new();
        group.queue_movement_modifier(haste(handles.generate()));
        flush(&mut group, &mut settings, 0.0);
        flush(&mut group, &mut settings, 16.0);
        flush(&mut group, &mut settings, 32.0);

        let active = group.find_modifier_by_type::<Haste>().map(|h| (h.starts, h.core.start_sim_time_ms));
        assert_eq!(active, Some((1, 0.0)));
        assert_eq!(settings.max_speed, 1600.0);
    }

    #[test]
    fn test_queued_duplicate_folds_into_active() {
        let handles = ModifierHandleGenerator::new();
        let mut settings = CommonMovementSettings::default();
        let mut group = MovementModifierGroup::new();
        group.queue_movement_modifier(haste(ModifierHandle::INVALID));
        flush(&mut group, &mut settings, 0.0);

        let second = handles.generate();
        group.queue_movement_modifier(haste(second));
        flush(&mut group, &mut settings, 16.0);
        assert_eq!(group.num_active(), 1);
        assert_eq!(group.find_modifier_by_type::<Haste>().map(|h| h.starts), Some(1));
        assert_eq!(group.find_modifier(second).map(|m| m.handle()), Some(second));
    }

    #[test]
    fn test_cancel_queued_never_starts() {
        let handles = ModifierHandleGenerator::new();
        let handle = handles.generate();
        let mut settings = CommonMovementSettings::default();
        let mut group = MovementModifierGroup::new();
        group.queue_movement_modifier(haste(handle));
        group.cancel_modifier_from_handle(handle);
        flush(&mut group, &mut settings, 0.0);
        assert_eq!(group.num_active(), 0);
        assert_eq!(settings.max_speed, 800.0);
    }

    #[test]
    fn test_rollback_reconcile_starts_and_ends_by_diff() {
        let handles = ModifierHandleGenerator::new();
        let handle = handles.generate();
        let mut settings = CommonMovementSettings::default();
        let mut local = MovementModifierGroup::new();
        local.queue_movement_modifier(haste(handle));
        flush(&mut local, &mut settings, 0.0);
        assert_eq!(settings.max_speed, 1600.0);

        let mut authority = MovementModifierGroup::new();
        let mut body = KinematicBody::default();
        let ts = MoverTimeStep::new(0.0, 16.0, 0);
        let mut ctx = ModifierContext { component: &mut body, settings: &mut settings, time_step: &ts };
        authority.reconcile_after_rollback(&mut local, &mut ctx);
        assert_eq!(settings.max_speed, 800.0);
        assert!(authority.should_reconcile(&local));
    }
}
