//! Mover Data Collection
//!
//! A type-keyed bag of data blocks: at most one block per concrete type,
//! kept in insertion order so comparisons and encoding are stable.
//!
//! ## Usage
//! ```rust
//! use mover_core::data::{MoverDataCollection, UpdatedMotionState};
//!
//! let mut collection = MoverDataCollection::new();
//! if let Some(motion) = collection.find_or_add::<UpdatedMotionState>() {
//!     motion.velocity.x = 250.0;
//! }
//! assert_eq!(collection.find::<UpdatedMotionState>().map(|m| m.velocity.x), Some(250.0));
//! ```

use std::any::{self, Any, TypeId};
use std::fmt;

use crate::types::short_type_name;

/// Object-safe plumbing every data block gets for free.
pub trait MoverDataStructBase: Any + Send + Sync + fmt::Debug + 'static {
    fn clone_data(&self) -> Box<dyn MoverDataStruct>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// Full Rust type path, used as the registry key
    fn data_type_name(&self) -> &'static str;
}

impl<T: MoverDataStruct + Clone> MoverDataStructBase for T {
    fn clone_data(&self) -> Box<dyn MoverDataStruct> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn data_type_name(&self) -> &'static str {
        any::type_name::<T>()
    }
}

/// A block of sync state, aux state or input.
///
/// `interpolate` receives blocks of the same concrete type as `self`.
pub trait MoverDataStruct: MoverDataStructBase + 'static {
    /// True if a client holding `self` must be corrected to `authority`.
    fn should_reconcile(&self, _authority: &dyn MoverDataStruct) -> bool {
        false
    }

    fn interpolate(&mut self, from: &dyn MoverDataStruct, to: &dyn MoverDataStruct, pct: f32);

    /// Fold an older block of inputs into this one (e.g. latch button presses).
    fn merge(&mut self, _from: &dyn MoverDataStruct) {}

    /// Fade transient values while inputs are being extrapolated.
    fn decay(&mut self, _decay_amount: f32) {}
}

impl dyn MoverDataStruct {
    pub fn downcast_ref<T: MoverDataStruct>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: MoverDataStruct>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    fn concrete_type_id(&self) -> TypeId {
        self.as_any().type_id()
    }

    pub fn short_name(&self) -> &'static str {
        short_type_name(self.data_type_name())
    }
}

#[derive(Debug, Default)]
pub struct MoverDataCollection {
    data_array: Vec<Box<dyn MoverDataStruct>>,
}

impl Clone for MoverDataCollection {
    fn clone(&self) -> Self {
        Self { data_array: self.data_array.iter().map(|d| d.clone_data()).collect() }
    }
}

impl MoverDataCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data_array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_array.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn MoverDataStruct> {
        self.data_array.iter().map(|d| d.as_ref())
    }

    pub fn empty(&mut self) {
        self.data_array.clear();
    }

    fn position_of(&self, type_id: TypeId) -> Option<usize> {
        self.data_array.iter().position(|d| d.concrete_type_id() == type_id)
    }

    pub fn find<T: MoverDataStruct>(&self) -> Option<&T> {
        self.data_array.iter().find_map(|d| d.downcast_ref::<T>())
    }

    pub fn find_mut<T: MoverDataStruct>(&mut self) -> Option<&mut T> {
        self.data_array.iter_mut().find_map(|d| d.downcast_mut::<T>())
    }

    /// Find a block of the same concrete type as `like`.
    pub fn find_by_type_of(&self, like: &dyn MoverDataStruct) -> Option<&dyn MoverDataStruct> {
        self.position_of(like.concrete_type_id()).map(|i| self.data_array[i].as_ref())
    }

    /// Find the block of type `T`, adding a default one first if there is none.
    ///
    /// `None` only when a block's `as_any` and `as_any_mut` disagree on its type.
    pub fn find_or_add<T: MoverDataStruct + Default>(&mut self) -> Option<&mut T> {
        if self.position_of(TypeId::of::<T>()).is_none() {
            self.data_array.push(Box::new(T::default()));
        }
        self.find_mut::<T>()
    }

    /// Add a fresh default block, replacing any existing block of that type.
    pub fn add_data_by_type<T: MoverDataStruct + Default>(&mut self) -> Option<&mut T> {
        self.remove_data_by_type::<T>();
        self.find_or_add::<T>()
    }

    /// Insert `data`, replacing any block of the same type in place.
    pub fn add_or_overwrite_data(&mut self, data: Box<dyn MoverDataStruct>) {
        match self.position_of(data.concrete_type_id()) {
            Some(pos) => self.data_array[pos] = data,
            None => self.data_array.push(data),
        }
    }

    /// Deep-copy `data` in, replacing any block of the same type.
    pub fn add_data_by_copy(&mut self, data: &dyn MoverDataStruct) {
        self.add_or_overwrite_data(data.clone_data());
    }

    pub fn remove_data_by_type<T: MoverDataStruct>(&mut self) -> bool {
        match self.position_of(TypeId::of::<T>()) {
            Some(pos) => {
                self.data_array.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Copy every block from `other`, overwriting same-typed blocks.
    pub fn add_from_collection(&mut self, other: &MoverDataCollection) {
        for data in other.iter() {
            self.add_data_by_copy(data);
        }
    }

    /// True if any block differs enough that `self` must be corrected to `authority`.
    pub fn should_reconcile(&self, authority: &MoverDataCollection) -> bool {
        if self.len() != authority.len() {
            return true;
        }
        authority.iter().any(|auth| match self.find_by_type_of(auth) {
            Some(local) => local.should_reconcile(auth),
            None => true,
        })
    }

    /// Blend matching blocks; blocks only present on one side are copied over.
    pub fn interpolate(&mut self, from: &MoverDataCollection, to: &MoverDataCollection, pct: f32) {
        for from_data in from.iter() {
            match to.find_by_type_of(from_data) {
                Some(to_data) => {
                    let mut blended = from_data.clone_data();
                    blended.interpolate(from_data, to_data, pct);
                    self.add_or_overwrite_data(blended);
                }
                None => self.add_data_by_copy(from_data),
            }
        }
        for to_data in to.iter() {
            if from.find_by_type_of(to_data).is_none() {
                self.add_data_by_copy(to_data);
            }
        }
    }

    /// Merge blocks from an older collection into this one.
    pub fn merge(&mut self, from: &MoverDataCollection) {
        for from_data in from.iter() {
            match self.position_of(from_data.concrete_type_id()) {
                Some(pos) => self.data_array[pos].merge(from_data),
                None => self.add_data_by_copy(from_data),
            }
        }
    }

    pub fn decay(&mut self, decay_amount: f32) {
        for data in &mut self.data_array {
            data.decay(decay_amount);
        }
    }

    /// Same block types in the same order; values are not compared.
    pub fn has_same_contents(&self, other: &MoverDataCollection) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|(a, b)| a.concrete_type_id() == b.concrete_type_id())
    }
}

// ========== Tests ==========
