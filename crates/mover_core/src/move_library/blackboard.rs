//! Rollback Blackboard
//!
//! Named, typed side-channel storage for simulation scratch data (last floor
//! result, last mode change) that must follow rollbacks without being part of
//! the replicated sync state.
//!
//! Each entry is a ring buffer of (value, timestamp) addressed by absolute
//! indices. Two cursors are kept:
//! - external: last value committed by a finished frame (what outside readers see)
//! - internal: where the in-progress frame reads/writes, one slot ahead once written
//!
//! Reads and writes made from the thread that began the current simulation
//! (or rollback) go to the internal cursor; everything else uses the external
//! one.
//!
//! ## Usage
//! ```rust
//! use mover_core::move_library::{BlackboardEntrySettings, RollbackBlackboard};
//! use mover_core::types::MoverTimeStep;
//!
//! let mut bb = RollbackBlackboard::new();
//! bb.create_entry::<f32>("LastFloorDist", BlackboardEntrySettings::default());
//!
//! bb.begin_simulation_frame(&MoverTimeStep::new(0.0, 16.0, 1));
//! bb.try_set("LastFloorDist", 2.5f32).unwrap();
//! bb.end_simulation_frame();
//!
//! assert_eq!(bb.try_get::<f32>("LastFloorDist"), Some(2.5));
//! ```

use std::any::{self, Any};
use std::thread::{self, ThreadId};

use fxhash::FxHashMap;

use crate::error::{MoverError, Result};
use crate::types::MoverTimeStep;

/// How an entry's ring buffer is sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizingPolicy {
    /// `fixed_size` slots (never fewer than 2)
    #[default]
    FixedDeclaredSize,
    /// Minimal buffer for values rollback shouldn't meaningfully change
    SingleEntry,
}

/// How long a written value stays readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistencePolicy {
    #[default]
    Forever,
    /// Readable during the frame it was written and the one after
    NextFrameOnly,
}

/// What a rollback does to buffered values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollbackPolicy {
    /// Values written at or after the resimulated frame are discarded
    #[default]
    InvalidatedOnRollback,
    /// Values survive rollbacks untouched
    KeptOnRollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlackboardEntrySettings {
    pub sizing_policy: SizingPolicy,
    pub persistence_policy: PersistencePolicy,
    pub rollback_policy: RollbackPolicy,
    pub fixed_size: u32,
}

impl BlackboardEntrySettings {
    pub fn fixed(size: u32) -> Self {
        Self { fixed_size: size, ..Self::default() }
    }

    pub fn next_frame_only() -> Self {
        Self { persistence_policy: PersistencePolicy::NextFrameOnly, ..Self::default() }
    }

    fn buffer_size(&self) -> usize {
        const MIN_BUFFER_SIZE: u32 = 2;
        match self.sizing_policy {
            SizingPolicy::FixedDeclaredSize => MIN_BUFFER_SIZE.max(self.fixed_size) as usize,
            SizingPolicy::SingleEntry => MIN_BUFFER_SIZE as usize,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct EntryTimeStamp {
    /// Negative means never written / invalidated
    time_ms: f64,
    frame: u32,
}

impl Default for EntryTimeStamp {
    fn default() -> Self {
        Self { time_ms: -1.0, frame: 0 }
    }
}

impl EntryTimeStamp {
    fn new(time_ms: f64, frame: u32) -> Self {
        Self { time_ms, frame }
    }

    fn is_valid(&self) -> bool {
        self.time_ms >= 0.0
    }

    fn invalidate(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexType {
    External,
    Internal,
}

/// Untyped view of an entry so differently-typed entries share one map.
trait BlackboardEntryAny: Send + Sync {
    fn on_simulation_frame_end(&mut self);
    fn roll_back(&mut self, new_pending_frame: u32);
    fn invalidate(&mut self, index_type: IndexType);
    fn value_type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct BlackboardEntry<T> {
    settings: BlackboardEntrySettings,
    values: Vec<Option<T>>,
    timestamps: Vec<EntryTimeStamp>,
    external_idx: u64,
    internal_idx: u64,
}

impl<T: Clone + Send + Sync + 'static> BlackboardEntry<T> {
    fn new(settings: BlackboardEntrySettings) -> Self {
        let size = settings.buffer_size();
        Self {
            settings,
            values: vec![None; size],
            timestamps: vec![EntryTimeStamp::default(); size],
            external_idx: 0,
            internal_idx: 0,
        }
    }

    fn capacity(&self) -> u64 {
        self.timestamps.len() as u64
    }

    fn slot(&self, idx: u64) -> usize {
        (idx % self.capacity()) as usize
    }

    fn cursor(&self, index_type: IndexType) -> u64 {
        match index_type {
            IndexType::External => self.external_idx,
            IndexType::Internal => self.internal_idx,
        }
    }

    fn can_read_at(&self, reader: &EntryTimeStamp, index_type: IndexType) -> bool {
        let stamp = &self.timestamps[self.slot(self.cursor(index_type))];
        if !stamp.is_valid() {
            return false;
        }
        match self.settings.persistence_policy {
            PersistencePolicy::NextFrameOnly => {
                reader.frame == stamp.frame || reader.frame == stamp.frame.wrapping_add(1)
            }
            PersistencePolicy::Forever => true,
        }
    }

    fn get(&self, reader: &EntryTimeStamp, index_type: IndexType) -> Option<T> {
        if !self.can_read_at(reader, index_type) {
            return None;
        }
        self.values[self.slot(self.cursor(index_type))].clone()
    }

    /// Writes always land one slot ahead of the committed cursor.
    fn set_internal(&mut self, value: T, stamp: EntryTimeStamp) {
        self.internal_idx = self.external_idx + 1;
        let slot = self.slot(self.internal_idx);
        self.values[slot] = Some(value);
        self.timestamps[slot] = stamp;
    }

    fn set_external(&mut self, value: T, stamp: EntryTimeStamp) {
        self.set_internal(value, stamp);
        self.external_idx = self.internal_idx;
    }
}

impl<T: Clone + Send + Sync + 'static> BlackboardEntryAny for BlackboardEntry<T> {
    fn on_simulation_frame_end(&mut self) {
        self.external_idx = self.internal_idx;
    }

    fn roll_back(&mut self, new_pending_frame: u32) {
        if self.settings.rollback_policy == RollbackPolicy::KeptOnRollback {
            return;
        }
        // Internal may be ahead if a frame was abandoned mid-simulation
        self.internal_idx = self.external_idx;

        let lowest = self.external_idx.saturating_sub(self.capacity());
        let mut idx = self.external_idx;
        loop {
            let stamp = &self.timestamps[self.slot(idx)];
            if stamp.is_valid() && stamp.frame < new_pending_frame {
                self.external_idx = idx;
                self.internal_idx = idx;
                return;
            }
            if idx == lowest {
                break;
            }
            idx -= 1;
        }

        // Nothing older than the pending frame survives
        let slot = self.slot(self.external_idx);
        self.timestamps[slot].invalidate();
    }

    fn invalidate(&mut self, index_type: IndexType) {
        let slot = self.slot(self.cursor(index_type));
        self.timestamps[slot].invalidate();
    }

    fn value_type_name(&self) -> &'static str {
        any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub struct RollbackBlackboard {
    entries: FxHashMap<String, Box<dyn BlackboardEntryAny>>,
    is_simulation_in_progress: bool,
    is_resimulating: bool,
    sim_thread: Option<ThreadId>,
    is_rollback_in_progress: bool,
    rollback_thread: Option<ThreadId>,
    /// Committed time; lags `in_progress_stamp` during a frame
    current_stamp: EntryTimeStamp,
    in_progress_stamp: EntryTimeStamp,
}

impl Default for RollbackBlackboard {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RollbackBlackboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("RollbackBlackboard")
            .field("entries", &names)
            .field("is_simulation_in_progress", &self.is_simulation_in_progress)
            .field("is_rollback_in_progress", &self.is_rollback_in_progress)
            .finish()
    }
}

impl RollbackBlackboard {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            is_simulation_in_progress: false,
            is_resimulating: false,
            sim_thread: None,
            is_rollback_in_progress: false,
            rollback_thread: None,
            current_stamp: EntryTimeStamp::default(),
            in_progress_stamp: EntryTimeStamp::default(),
        }
    }

    /// Create a typed entry. Returns false (keeping the original) if the name is taken.
    pub fn create_entry<T: Clone + Send + Sync + 'static>(
        &mut self,
        name: &str,
        settings: BlackboardEntrySettings,
    ) -> bool {
        if self.entries.contains_key(name) {
            log::warn!(
                "Skipping attempt to create blackboard entry '{}' since it already exists; original settings retained",
                name
            );
            return false;
        }
        self.entries.insert(name.to_string(), Box::new(BlackboardEntry::<T>::new(settings)));
        true
    }

    pub fn has_entry(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn is_simulation_in_progress(&self) -> bool {
        self.is_simulation_in_progress
    }

    pub fn is_resimulating(&self) -> bool {
        self.is_resimulating
    }

    /// Frame of the last committed simulation frame.
    pub fn current_frame(&self) -> u32 {
        self.current_stamp.frame
    }

    /// Store a value, dispatching to the in-simulation cursor when called from the simulating thread.
    pub fn try_set<T: Clone + Send + Sync + 'static>(&mut self, name: &str, value: T) -> Result<()> {
        let internal = self.uses_internal_index();
        let stamp = if internal {
            self.in_progress_stamp
        } else {
            // Writes before the first committed frame still count as set
            EntryTimeStamp::new(self.current_stamp.time_ms.max(0.0), self.current_stamp.frame)
        };
        let entry = self.typed_entry_mut::<T>(name)?;
        if internal {
            entry.set_internal(value, stamp);
        } else {
            entry.set_external(value, stamp);
        }
        Ok(())
    }

    /// Read a value if one is readable under the entry's persistence policy.
    pub fn try_get<T: Clone + Send + Sync + 'static>(&self, name: &str) -> Option<T> {
        self.get::<T>(name).ok()
    }

    /// Like [`Self::try_get`] but reports why the read failed.
    pub fn get<T: Clone + Send + Sync + 'static>(&self, name: &str) -> Result<T> {
        let (index_type, reader) = if self.uses_internal_index() {
            (IndexType::Internal, self.in_progress_stamp)
        } else {
            (IndexType::External, self.current_stamp)
        };
        self.typed_entry::<T>(name)?
            .get(&reader, index_type)
            .ok_or_else(|| MoverError::BlackboardEntryUnreadable { name: name.to_string() })
    }

    /// Make an entry unreadable until it's set again.
    pub fn invalidate(&mut self, name: &str) -> bool {
        let index_type = if self.uses_internal_index() { IndexType::Internal } else { IndexType::External };
        match self.entries.get_mut(name) {
            Some(entry) => {
                entry.invalidate(index_type);
                true
            }
            None => false,
        }
    }

    pub fn begin_simulation_frame(&mut self, pending: &MoverTimeStep) {
        if self.is_simulation_in_progress || self.is_rollback_in_progress {
            log::warn!(
                "Blackboard frame {} began while another frame or rollback is in progress",
                pending.server_frame
            );
        }
        self.sim_thread = Some(thread::current().id());
        self.is_simulation_in_progress = true;
        self.is_resimulating = pending.is_resimulating;
        self.in_progress_stamp = EntryTimeStamp::new(pending.base_sim_time_ms, pending.server_frame);
    }

    pub fn end_simulation_frame(&mut self) {
        if !self.uses_internal_index() {
            log::warn!("Blackboard frame ended from a thread that did not begin it");
        }
        self.is_simulation_in_progress = false;
        self.is_resimulating = false;
        self.current_stamp = self.in_progress_stamp;
        for entry in self.entries.values_mut() {
            entry.on_simulation_frame_end();
        }
    }

    /// `new_base` is the PENDING frame about to be resimulated.
    pub fn begin_rollback(&mut self, new_base: &MoverTimeStep) {
        if self.is_simulation_in_progress || self.is_rollback_in_progress {
            log::warn!("Blackboard rollback began while a frame or rollback is in progress");
            self.is_simulation_in_progress = false;
        }
        self.rollback_thread = Some(thread::current().id());
        self.is_rollback_in_progress = true;

        log::debug!(
            "Blackboard begin rollback. From F {} / T {:.3} -> F {} / T {:.3}",
            self.current_stamp.frame,
            self.current_stamp.time_ms,
            new_base.server_frame,
            new_base.base_sim_time_ms
        );

        for entry in self.entries.values_mut() {
            entry.roll_back(new_base.server_frame);
        }

        let stamp = EntryTimeStamp::new(new_base.base_sim_time_ms, new_base.server_frame);
        self.current_stamp = stamp;
        self.in_progress_stamp = stamp;
    }

    pub fn end_rollback(&mut self) {
        self.is_rollback_in_progress = false;
        self.rollback_thread = None;
    }

    fn uses_internal_index(&self) -> bool {
        let me = thread::current().id();
        (self.is_simulation_in_progress && self.sim_thread == Some(me))
            || (self.is_rollback_in_progress && self.rollback_thread == Some(me))
    }

    fn typed_entry<T: Clone + Send + Sync + 'static>(&self, name: &str) -> Result<&BlackboardEntry<T>> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| MoverError::BlackboardEntryNotFound { name: name.to_string() })?;
        let found = entry.value_type_name();
        entry
            .as_any()
            .downcast_ref::<BlackboardEntry<T>>()
            .ok_or(MoverError::TypeMismatch { expected: any::type_name::<T>(), found })
    }

    fn typed_entry_mut<T: Clone + Send + Sync + 'static>(&mut self, name: &str) -> Result<&mut BlackboardEntry<T>> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| MoverError::BlackboardEntryNotFound { name: name.to_string() })?;
        let found = entry.value_type_name();
        entry
            .as_any_mut()
            .downcast_mut::<BlackboardEntry<T>>()
            .ok_or(MoverError::TypeMismatch { expected: any::type_name::<T>(), found })
    }
}

// ========== Tests ==========
