//! Layered Move Group
//!
//! Owns the active and queued self-contained layered moves of one sync state.
//! Moves only change lists inside [`LayeredMoveGroup::flush_move_arrays`]:
//! tag cancellations first, then expiry, then queued activation.

use std::fmt;

use tracing::{debug, trace};

use crate::component::UpdatedComponent;
use crate::data::MoverTickStartData;
use crate::layered_moves::base::LayeredMove;
use crate::layered_moves::residual::{ResidualOverrides, ResidualVelocity};
use crate::move_library::{MovementMixer, RollbackBlackboard};
use crate::slot_arena::{SlotArena, SlotKey};
use crate::types::{GameplayTag, MoverTimeStep, ProposedMove, TagCancellationRequest};

#[derive(Clone, Default)]
pub struct LayeredMoveGroup {
    moves: SlotArena<dyn LayeredMove>,
    active: Vec<SlotKey>,
    queued: Vec<SlotKey>,
    tag_cancellation_requests: Vec<TagCancellationRequest>,
    residual: ResidualVelocity,
}

impl LayeredMoveGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_layered_move(&mut self, layered_move: Box<dyn LayeredMove>) {
        trace!("Queued layered move {}", layered_move.short_name());
        let key = self.moves.insert(layered_move);
        self.queued.push(key);
    }

    /// Matching happens inside the next flush.
    pub fn cancel_moves_by_tag(&mut self, tag: GameplayTag, exact_match: bool) {
        self.tag_cancellation_requests.push(TagCancellationRequest::new(tag, exact_match));
    }

    pub fn num_active(&self) -> usize {
        self.active.len()
    }

    pub fn num_queued(&self) -> usize {
        self.queued.len()
    }

    pub fn has_any_moves(&self) -> bool {
        !self.active.is_empty() || !self.queued.is_empty()
    }

    pub fn active_moves(&self) -> impl Iterator<Item = &dyn LayeredMove> {
        self.active.iter().filter_map(|key| self.moves.get(*key))
    }

    pub fn queued_moves(&self) -> impl Iterator<Item = &dyn LayeredMove> {
        self.queued.iter().filter_map(|key| self.moves.get(*key))
    }

    pub fn find_active_move<T: LayeredMove>(&self) -> Option<&T> {
        self.active_moves().find_map(|m| m.downcast_ref::<T>())
    }

    pub fn find_queued_move<T: LayeredMove>(&self) -> Option<&T> {
        self.queued_moves().find_map(|m| m.downcast_ref::<T>())
    }

    pub fn residual(&self) -> &ResidualVelocity {
        &self.residual
    }

    /// Apply (then clear) velocity left behind by moves that ended this substep.
    pub fn apply_residual_velocity(&mut self, proposed_move: &mut ProposedMove) {
        self.residual.apply(proposed_move);
    }

    /// Cancellations, then expiry, then activation of everything queued.
    pub fn flush_move_arrays(
        &mut self,
        component: &dyn UpdatedComponent,
        blackboard: &mut RollbackBlackboard,
        current_sim_time_ms: f64,
    ) {
        let mut overrides = ResidualOverrides::default();

        for request in std::mem::take(&mut self.tag_cancellation_requests) {
            let moves = &mut self.moves;
            self.queued.retain(|key| {
                let cancel = moves.get(*key).map_or(true, |m| m.has_gameplay_tag(&request.tag, request.exact_match));
                if cancel {
                    moves.remove(*key);
                }
                !cancel
            });
            self.end_active_where(component, blackboard, current_sim_time_ms, &mut overrides, |m| {
                m.has_gameplay_tag(&request.tag, request.exact_match)
            });
        }

        self.end_active_where(component, blackboard, current_sim_time_ms, &mut overrides, |m| {
            m.is_finished(current_sim_time_ms)
        });

        for key in std::mem::take(&mut self.queued) {
            if let Some(layered_move) = self.moves.get_mut(key) {
                layered_move.start_move(component, blackboard, current_sim_time_ms);
                debug!("Started layered move {} at {:.2}ms", layered_move.short_name(), current_sim_time_ms);
                self.active.push(key);
            }
        }
    }

    fn end_active_where(
        &mut self,
        component: &dyn UpdatedComponent,
        blackboard: &mut RollbackBlackboard,
        current_sim_time_ms: f64,
        overrides: &mut ResidualOverrides,
        mut should_end: impl FnMut(&dyn LayeredMove) -> bool,
    ) {
        let mut kept = Vec::with_capacity(self.active.len());
        for key in std::mem::take(&mut self.active) {
            let Some(layered_move) = self.moves.get_mut(key) else {
                continue;
            };
            if !should_end(layered_move) {
                kept.push(key);
                continue;
            }
            let core = layered_move.core();
            self.residual.gather(core.mix_mode, &core.finish_velocity_settings, overrides, layered_move.short_name());
            layered_move.end_move(component, blackboard, current_sim_time_ms);
            debug!("Ended layered move {} at {:.2}ms", layered_move.short_name(), current_sim_time_ms);
            self.moves.remove(key);
        }
        self.active = kept;
    }

    /// Tick every active move and mix contributions into `cumulative`.
    ///
    /// Moves past their first substep no longer push their preferred mode.
    pub fn generate_mixed_move(
        &mut self,
        start_state: &MoverTickStartData,
        time_step: &MoverTimeStep,
        mixer: &mut MovementMixer,
        component: &dyn UpdatedComponent,
        blackboard: &mut RollbackBlackboard,
        cumulative: &mut ProposedMove,
    ) -> bool {
        let mut has_contributions = false;
        for key in &self.active {
            let Some(layered_move) = self.moves.get_mut(*key) else {
                continue;
            };
            let mut move_step = ProposedMove::with_mix_mode(layered_move.core().mix_mode);
            if layered_move.generate_move(start_state, time_step, component, blackboard, &mut move_step) {
                if layered_move.core().start_sim_time_ms < time_step.base_sim_time_ms {
                    move_step.preferred_mode = None;
                }
                has_contributions = true;
                mixer.mix_layered_move(&*layered_move, &move_step, cumulative);
            }
        }
        has_contributions
    }

    /// Same move types in the same order; move state is not compared.
    pub fn has_same_contents(&self, other: &LayeredMoveGroup) -> bool {
        fn names<'a>(it: impl Iterator<Item = &'a dyn LayeredMove>) -> Vec<&'static str> {
            it.map(|m| m.move_type_name()).collect()
        }
        self.active.len() == other.active.len()
            && self.queued.len() == other.queued.len()
            && names(self.active_moves()) == names(other.active_moves())
            && names(self.queued_moves()) == names(other.queued_moves())
    }

    pub fn reset(&mut self) {
        self.residual.reset();
        self.moves.clear();
        self.active.clear();
        self.queued.clear();
        self.tag_cancellation_requests.clear();
    }

    /// Replace the lists wholesale (used when decoding a replicated group).
    pub(crate) fn from_parts(active: Vec<Box<dyn LayeredMove>>, queued: Vec<Box<dyn LayeredMove>>) -> Self {
        let mut group = Self::new();
        for m in active {
            let key = group.moves.insert(m);
            group.active.push(key);
        }
        for m in queued {
            let key = group.moves.insert(m);
            group.queued.push(key);
        }
        group
    }
}

impl fmt::Debug for LayeredMoveGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayeredMoveGroup")
            .field("active", &self.active_moves().collect::<Vec<_>>())
            .field("queued", &self.queued_moves().collect::<Vec<_>>())
            .field("tag_cancellation_requests", &self.tag_cancellation_requests)
            .finish()
    }
}

impl fmt::Display for LayeredMoveGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayeredMoveGroup. Active: {} Queued: {}", self.active.len(), self.queued.len())
    }
}

// ========== Tests ==========
