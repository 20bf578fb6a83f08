//! # Simulation Driver
//!
//! [`MoverSimulation`] owns one mover: the mode state machine, its rollback
//! blackboard, the updated component and the last committed sync state.
//! Every tick is recorded (start state, time step, input) in a bounded
//! history so a correction can roll back to a past frame and replay.
//!
//! ## Usage
//! ```rust
//! use mover_core::component::KinematicBody;
//! use mover_core::config::{CommonMovementSettings, MoverSettings};
//! use mover_core::data::MoverInputCmd;
//! use mover_core::simulation::MoverSimulation;
//! use nalgebra::Vector3;
//!
//! let body = KinematicBody::new(Vector3::new(0.0, 0.0, 200.0)).with_floor(0.0);
//! let mut sim = MoverSimulation::new(MoverSettings::default(), CommonMovementSettings::default(), body)
//!     .unwrap()
//!     .with_kinematic_modes("Falling");
//!
//! for _ in 0..10 {
//!     sim.tick(16.0, MoverInputCmd::default());
//! }
//! assert_eq!(sim.frame(), 10);
//! assert!(sim.component().location.z < 200.0);
//! ```

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::component::{KinematicBody, UpdatedComponent};
use crate::config::{CommonMovementSettings, MoverSettings};
use crate::data::{
    MoverAuxState, MoverInputCmd, MoverSyncState, MoverTickEndData, MoverTickStartData, UpdatedMotionState,
};
use crate::error::{MoverError, Result};
use crate::modes::{KinematicFallingMode, KinematicFlyingMode};
use crate::move_library::RollbackBlackboard;
use crate::replication::ReplicationRegistry;
use crate::state_machine::MovementModeStateMachine;
use crate::types::{MoverSimulationEvent, MoverTimeStep};

/// One simulated frame, as needed to replay it.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub time_step: MoverTimeStep,
    /// Committed state the frame started from
    pub start_state: MoverSyncState,
    pub input: MoverInputCmd,
}

#[derive(Debug)]
pub struct MoverSimulation<C: UpdatedComponent = KinematicBody> {
    state_machine: MovementModeStateMachine,
    blackboard: RollbackBlackboard,
    component: C,
    common: CommonMovementSettings,
    sync_state: MoverSyncState,
    aux_state: MoverAuxState,
    frame: u32,
    sim_time_ms: f64,
    is_resimulating: bool,
    history: VecDeque<FrameRecord>,
    history_len: usize,
    events: Vec<MoverSimulationEvent>,
    /// Bundled types, capped at `max_replicated_items`
    registry: ReplicationRegistry,
}

impl<C: UpdatedComponent> MoverSimulation<C> {
    /// Validates both settings blocks. The sync state starts at the component's pose.
    pub fn new(settings: MoverSettings, common: CommonMovementSettings, component: C) -> Result<Self> {
        settings.validate()?;
        common.validate()?;

        let mut sync_state = MoverSyncState::default();
        if let Some(motion) = sync_state.collection.find_or_add::<UpdatedMotionState>() {
            motion.location = component.location();
            motion.orientation = component.orientation();
        }

        let history_len = settings.state_history_len;
        let registry = ReplicationRegistry::with_defaults().with_max_items(settings.max_replicated_items);
        Ok(Self {
            state_machine: MovementModeStateMachine::new(settings),
            blackboard: RollbackBlackboard::new(),
            component,
            common,
            sync_state,
            aux_state: MoverAuxState::default(),
            frame: 0,
            sim_time_ms: 0.0,
            is_resimulating: false,
            history: VecDeque::with_capacity(history_len),
            history_len,
            events: Vec::new(),
            registry,
        })
    }

    /// Register the bundled Flying and Falling modes and start in `start_mode`.
    pub fn with_kinematic_modes(mut self, start_mode: &str) -> Self {
        self.state_machine.register_movement_mode(
            KinematicFlyingMode::NAME,
            Box::new(KinematicFlyingMode::new()),
            Vec::new(),
            true,
        );
        self.state_machine.register_movement_mode(
            KinematicFallingMode::NAME,
            Box::new(KinematicFallingMode::new()),
            Vec::new(),
            false,
        );
        self.sync_state.movement_mode = start_mode.to_string();
        self
    }

    /// Replace the committed state, e.g. with the first authoritative snapshot.
    pub fn with_sync_state(mut self, mut sync_state: MoverSyncState) -> Self {
        sync_state
            .layered_move_instances
            .populate_missing_active_move_logic(self.state_machine.registered_move_logic());
        self.sync_state = sync_state;
        self
    }

    // ========== Accessors ==========

    pub fn state_machine(&self) -> &MovementModeStateMachine {
        &self.state_machine
    }

    pub fn state_machine_mut(&mut self) -> &mut MovementModeStateMachine {
        &mut self.state_machine
    }

    pub fn blackboard(&self) -> &RollbackBlackboard {
        &self.blackboard
    }

    pub fn component(&self) -> &C {
        &self.component
    }

    pub fn component_mut(&mut self) -> &mut C {
        &mut self.component
    }

    pub fn common_settings(&self) -> &CommonMovementSettings {
        &self.common
    }

    pub fn sync_state(&self) -> &MoverSyncState {
        &self.sync_state
    }

    pub fn aux_state(&self) -> &MoverAuxState {
        &self.aux_state
    }

    pub fn motion_state(&self) -> Option<&UpdatedMotionState> {
        self.sync_state.collection.find::<UpdatedMotionState>()
    }

    /// Frame the next tick will simulate.
    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn sim_time_ms(&self) -> f64 {
        self.sim_time_ms
    }

    pub fn history(&self) -> impl Iterator<Item = &FrameRecord> {
        self.history.iter()
    }

    pub fn take_events(&mut self) -> Vec<MoverSimulationEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn registry(&self) -> &ReplicationRegistry {
        &self.registry
    }

    /// Register game-specific types before encoding.
    pub fn registry_mut(&mut self) -> &mut ReplicationRegistry {
        &mut self.registry
    }

    /// Wire bytes of the committed sync state.
    pub fn sync_state_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.registry.sync_state_to_bytes(&self.sync_state)?)
    }

    // ========== Ticking ==========

    /// Simulate one frame of `dt_ms` and commit the result.
    pub fn tick(&mut self, dt_ms: f32, input: MoverInputCmd) -> MoverTickEndData {
        let mut time_step = MoverTimeStep::new(self.sim_time_ms, dt_ms.max(0.0), self.frame);
        time_step.is_resimulating = self.is_resimulating;

        let start = MoverTickStartData {
            sync_state: self.sync_state.clone(),
            aux_state: self.aux_state.clone(),
            input_cmd: input,
        };
        let mut output = MoverTickEndData::default();

        self.blackboard.begin_simulation_frame(&time_step);
        self.state_machine.on_simulation_tick(
            &mut self.component,
            &mut self.common,
            &mut self.blackboard,
            &start,
            &time_step,
            &mut output,
        );
        self.blackboard.end_simulation_frame();

        self.record_frame(FrameRecord { time_step, start_state: start.sync_state, input: start.input_cmd });

        self.sync_state = output.sync_state.clone();
        self.aux_state = output.aux_state.clone();
        self.frame = self.frame.wrapping_add(1);
        self.sim_time_ms = time_step.end_sim_time_ms();
        self.events.extend(self.state_machine.take_events());
        output
    }

    fn record_frame(&mut self, record: FrameRecord) {
        if self.history.len() >= self.history_len {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }

    // ========== Rollback ==========

    /// Install `authoritative` as the state at the start of `time_step`.
    ///
    /// History at or after the rollback frame is discarded.
    pub fn rollback(&mut self, authoritative: MoverSyncState, time_step: MoverTimeStep) {
        let mut authority = authoritative;
        let mut discarded = std::mem::take(&mut self.sync_state);

        self.state_machine.on_simulation_pre_rollback(
            &mut discarded,
            &mut authority,
            &time_step,
            &mut self.component,
            &mut self.common,
        );

        self.blackboard.begin_rollback(&time_step);
        self.state_machine.on_simulation_rollback(&authority, &time_step, &mut self.blackboard);
        self.blackboard.end_rollback();

        if let Some(motion) = authority.collection.find::<UpdatedMotionState>() {
            if !self.component.teleport_to(motion.location, motion.orientation) {
                warn!(
                    "Rollback to frame {} could not place the component at {:?}",
                    time_step.server_frame, motion.location
                );
            }
        }

        authority
            .layered_move_instances
            .populate_missing_active_move_logic(self.state_machine.registered_move_logic());

        let frame = time_step.server_frame;
        self.history.retain(|r| r.time_step.server_frame < frame);
        self.sync_state = authority;
        self.aux_state = MoverAuxState::default();
        self.frame = frame;
        self.sim_time_ms = time_step.base_sim_time_ms;
        debug!("Rolled back to frame {} ({:.3} ms)", frame, self.sim_time_ms);
    }

    fn take_history_from(&mut self, frame: u32) -> Result<(MoverTimeStep, Vec<FrameRecord>)> {
        let index = self
            .history
            .iter()
            .position(|r| r.time_step.server_frame == frame)
            .ok_or(MoverError::FrameNotInHistory { frame })?;
        let time_step = self.history[index].time_step;
        Ok((time_step, self.history.drain(index..).collect()))
    }

    fn replay(&mut self, records: &[FrameRecord]) {
        self.is_resimulating = true;
        for record in records {
            self.tick(record.time_step.step_ms, record.input.clone());
        }
        self.is_resimulating = false;
    }

    /// Roll back to the recorded start of `frame`, returning the frames that were undone.
    pub fn rollback_to_frame(&mut self, frame: u32) -> Result<Vec<FrameRecord>> {
        let (time_step, undone) = self.take_history_from(frame)?;
        if let Some(first) = undone.first() {
            self.rollback(first.start_state.clone(), time_step);
        }
        Ok(undone)
    }

    /// Roll back to `frame` and replay the recorded inputs up to the present.
    ///
    /// Moves, modifiers and effects queued from outside during the undone
    /// frames are not replayed. Returns the number of frames resimulated.
    pub fn resimulate_from(&mut self, frame: u32) -> Result<usize> {
        let undone = self.rollback_to_frame(frame)?;
        info!("Resimulating {} frames from frame {}", undone.len(), frame);
        self.replay(&undone);
        Ok(undone.len())
    }

    /// Apply a correction for `frame`: replace its start state and replay to the present.
    pub fn correct(&mut self, frame: u32, authoritative: MoverSyncState) -> Result<usize> {
        let (time_step, undone) = self.take_history_from(frame)?;
        info!("Correcting frame {} and resimulating {} frames", frame, undone.len());
        self.rollback(authoritative, time_step);
        self.replay(&undone);
        Ok(undone.len())
    }

    /// [`correct`](Self::correct) with an authoritative state received as wire bytes.
    pub fn correct_from_bytes(&mut self, frame: u32, bytes: &[u8]) -> Result<usize> {
        let authoritative = self.registry.sync_state_from_bytes(bytes)?;
        self.correct(frame, authoritative)
    }
}

// ========== Tests ==========
