//! Sync state, aux state, input and per-tick start/end bundles

use serde::{Deserialize, Serialize};

use crate::data::collection::MoverDataCollection;
use crate::layered_moves::{LayeredMoveGroup, LayeredMoveInstanceGroup};
use crate::move_library::MovementRecord;
use crate::modifiers::MovementModifierGroup;

/// Authoritative, replicated per-tick state.
#[derive(Debug, Clone, Default)]
pub struct MoverSyncState {
    /// Name of the mode the actor is in at the end of the tick
    pub movement_mode: String,
    pub layered_moves: LayeredMoveGroup,
    pub layered_move_instances: LayeredMoveInstanceGroup,
    pub movement_modifiers: MovementModifierGroup,
    pub collection: MoverDataCollection,
}

impl MoverSyncState {
    pub fn with_mode(movement_mode: impl Into<String>) -> Self {
        Self { movement_mode: movement_mode.into(), ..Self::default() }
    }

    /// Same mode and the same kinds of moves, modifiers and data blocks.
    pub fn has_same_contents(&self, other: &MoverSyncState) -> bool {
        self.movement_mode == other.movement_mode
            && self.layered_moves.has_same_contents(&other.layered_moves)
            && self.layered_move_instances.has_same_contents(&other.layered_move_instances)
            && self.movement_modifiers.has_same_contents(&other.movement_modifiers)
            && self.collection.has_same_contents(&other.collection)
    }

    /// True if a predicting client holding `self` must be corrected to `authority`.
    pub fn should_reconcile(&self, authority: &MoverSyncState) -> bool {
        self.movement_mode != authority.movement_mode
            || self.collection.should_reconcile(&authority.collection)
            || self.movement_modifiers.should_reconcile(&authority.movement_modifiers)
    }

    /// Blend data blocks; discrete parts (mode, moves, modifiers) come from `to`.
    pub fn interpolate(&mut self, from: &MoverSyncState, to: &MoverSyncState, pct: f32) {
        self.movement_mode = to.movement_mode.clone();
        self.layered_moves = to.layered_moves.clone();
        self.layered_move_instances = to.layered_move_instances.clone();
        self.movement_modifiers = to.movement_modifiers.clone();
        self.collection.interpolate(&from.collection, &to.collection, pct);
    }

    pub fn reset(&mut self) {
        self.movement_mode.clear();
        self.layered_moves.reset();
        self.layered_move_instances.reset();
        self.movement_modifiers.reset();
        self.collection.empty();
    }
}

/// Non-replicated state that still rolls back with the sync state.
#[derive(Debug, Clone, Default)]
pub struct MoverAuxState {
    pub collection: MoverDataCollection,
}

/// One frame of input.
#[derive(Debug, Clone, Default)]
pub struct MoverInputCmd {
    pub collection: MoverDataCollection,
}

#[derive(Debug, Clone, Default)]
pub struct MoverTickStartData {
    pub sync_state: MoverSyncState,
    pub aux_state: MoverAuxState,
    pub input_cmd: MoverInputCmd,
}

impl MoverTickStartData {
    pub fn new(sync_state: MoverSyncState, input_cmd: MoverInputCmd) -> Self {
        Self { sync_state, input_cmd, ..Self::default() }
    }
}

/// How a mode finished its part of a substep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovementModeTickEndState {
    /// Substep time the mode did not consume and hands to the next mode
    pub remaining_ms: f32,
    /// Mode to switch to after this substep, if any
    pub next_mode_name: Option<String>,
    /// Set by modes that produced no state change this substep
    pub ended_with_no_changes: bool,
}

impl MovementModeTickEndState {
    pub fn reset_to_defaults(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Default)]
pub struct MoverTickEndData {
    pub sync_state: MoverSyncState,
    pub aux_state: MoverAuxState,
    pub movement_end_state: MovementModeTickEndState,
    pub move_record: MovementRecord,
}
