//! Layered Move Instance Group
//!
//! Same lifecycle as [`LayeredMoveGroup`](super::LayeredMoveGroup), for
//! logic + data instances. Instances are cheap to clone (logic is shared),
//! so they are held directly rather than in a slot arena.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::data::MoverTickStartData;
use crate::layered_moves::instanced::{LayeredMoveInstance, LayeredMoveInstancedData, LayeredMoveLogic};
use crate::layered_moves::residual::{ResidualOverrides, ResidualVelocity};
use crate::move_library::{MovementMixer, RollbackBlackboard};
use crate::types::{GameplayTag, MoverTimeStep, ProposedMove, TagCancellationRequest};

#[derive(Clone, Default)]
pub struct LayeredMoveInstanceGroup {
    active: Vec<LayeredMoveInstance>,
    queued: Vec<LayeredMoveInstance>,
    tag_cancellation_requests: Vec<TagCancellationRequest>,
    residual: ResidualVelocity,
}

impl LayeredMoveInstanceGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instances without logic are dropped with a warning.
    pub fn queue_layered_move(&mut self, instance: LayeredMoveInstance) {
        if !instance.has_logic() {
            warn!("Refusing to queue layered move {} without logic", instance.data().short_name());
            return;
        }
        self.queued.push(instance);
    }

    pub fn cancel_moves_by_tag(&mut self, tag: GameplayTag, exact_match: bool) {
        self.tag_cancellation_requests.push(TagCancellationRequest::new(tag, exact_match));
    }

    pub fn num_active(&self) -> usize {
        self.active.len()
    }

    pub fn num_queued(&self) -> usize {
        self.queued.len()
    }

    pub fn active_moves(&self) -> &[LayeredMoveInstance] {
        &self.active
    }

    pub fn queued_moves(&self) -> &[LayeredMoveInstance] {
        &self.queued
    }

    pub fn find_active_move<T: LayeredMoveInstancedData>(&self) -> Option<&LayeredMoveInstance> {
        self.active.iter().find(|m| m.data_as::<T>().is_some())
    }

    pub fn find_queued_move<T: LayeredMoveInstancedData>(&self) -> Option<&LayeredMoveInstance> {
        self.queued.iter().find(|m| m.data_as::<T>().is_some())
    }

    pub fn residual(&self) -> &ResidualVelocity {
        &self.residual
    }

    pub fn apply_residual_velocity(&mut self, proposed_move: &mut ProposedMove) {
        self.residual.apply(proposed_move);
    }

    pub fn flush_move_arrays(&mut self, time_step: &MoverTimeStep, blackboard: &mut RollbackBlackboard) {
        let mut overrides = ResidualOverrides::default();

        for request in std::mem::take(&mut self.tag_cancellation_requests) {
            self.queued.retain(|m| !m.has_gameplay_tag(&request.tag, request.exact_match));
            self.end_active_where(time_step, blackboard, &mut overrides, |m, _| {
                m.has_gameplay_tag(&request.tag, request.exact_match)
            });
        }

        self.end_active_where(time_step, blackboard, &mut overrides, |m, bb| m.is_finished(time_step, bb));

        for mut instance in std::mem::take(&mut self.queued) {
            if instance.has_logic() {
                instance.start_move(time_step, blackboard);
                debug!("Started layered move instance {}", instance.data().short_name());
                self.active.push(instance);
            } else {
                warn!(
                    "Queued layered move ({}) has no logic. Move will not be activated.",
                    instance.data().short_name()
                );
            }
        }
    }

    fn end_active_where(
        &mut self,
        time_step: &MoverTimeStep,
        blackboard: &mut RollbackBlackboard,
        overrides: &mut ResidualOverrides,
        mut should_end: impl FnMut(&LayeredMoveInstance, &RollbackBlackboard) -> bool,
    ) {
        let mut kept = Vec::with_capacity(self.active.len());
        for mut instance in std::mem::take(&mut self.active) {
            if !should_end(&instance, blackboard) {
                kept.push(instance);
                continue;
            }
            let settings = instance.finish_velocity_settings();
            self.residual.gather(instance.mix_mode(), &settings, overrides, instance.data().short_name());
            instance.end_move(time_step, blackboard);
            debug!("Ended layered move instance {}", instance.data().short_name());
        }
        self.active = kept;
    }

    pub fn generate_mixed_move(
        &mut self,
        start_state: &MoverTickStartData,
        time_step: &MoverTimeStep,
        mixer: &mut MovementMixer,
        blackboard: &mut RollbackBlackboard,
        cumulative: &mut ProposedMove,
    ) -> bool {
        let mut has_contributions = false;
        for instance in &mut self.active {
            let mut move_step = ProposedMove::with_mix_mode(instance.mix_mode());
            if instance.generate_move(start_state, time_step, blackboard, &mut move_step) {
                has_contributions = true;
                mixer.mix_layered_move(&*instance, &move_step, cumulative);
            }
        }
        has_contributions
    }

    /// Rebind logic on instances that arrived over the wire.
    pub fn populate_missing_active_move_logic(&mut self, registered: &[Arc<dyn LayeredMoveLogic>]) {
        for instance in self.active.iter_mut().chain(self.queued.iter_mut()) {
            instance.populate_missing_logic(registered);
        }
    }

    pub fn has_same_contents(&self, other: &LayeredMoveInstanceGroup) -> bool {
        fn same(a: &[LayeredMoveInstance], b: &[LayeredMoveInstance]) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.data_type_name() == y.data_type_name())
        }
        same(&self.active, &other.active) && same(&self.queued, &other.queued)
    }

    pub fn reset(&mut self) {
        self.residual.reset();
        self.active.clear();
        self.queued.clear();
        self.tag_cancellation_requests.clear();
    }

    pub(crate) fn from_parts(active: Vec<LayeredMoveInstance>, queued: Vec<LayeredMoveInstance>) -> Self {
        Self { active, queued, ..Self::default() }
    }
}

impl fmt::Debug for LayeredMoveInstanceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayeredMoveInstanceGroup")
            .field("active", &self.active)
            .field("queued", &self.queued)
            .finish()
    }
}
