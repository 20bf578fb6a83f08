//! Generational slot arena
//!
//! Groups own their boxed moves/modifiers here and keep only [`SlotKey`]s in
//! their active/queued lists. Cloning the arena deep-copies every live slot
//! and keeps keys stable, so a cloned group's lists still point at its own
//! copies.

use std::fmt;

/// Deep copy for (possibly unsized) boxed values.
pub trait CloneBoxed {
    fn clone_boxed(&self) -> Box<Self>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    index: u32,
    generation: u32,
}

struct Slot<T: ?Sized> {
    generation: u32,
    value: Option<Box<T>>,
}

pub struct SlotArena<T: ?Sized> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T: ?Sized> Default for SlotArena<T> {
    fn default() -> Self {
        Self { slots: Vec::new(), free: Vec::new(), live: 0 }
    }
}

impl<T: ?Sized> SlotArena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn insert(&mut self, value: Box<T>) -> SlotKey {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.value = Some(value);
            return SlotKey { index, generation: slot.generation };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, value: Some(value) });
        SlotKey { index, generation: 0 }
    }

    pub fn remove(&mut self, key: SlotKey) -> Option<Box<T>> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let value = slot.value.take()?;
        self.free.push(key.index);
        self.live -= 1;
        Some(value)
    }

    pub fn get(&self, key: SlotKey) -> Option<&T> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.value.as_deref()
    }

    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.value.as_deref_mut()
    }

    pub fn contains(&self, key: SlotKey) -> bool {
        self.get(key).is_some()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.live = 0;
    }
}

impl<T: ?Sized + CloneBoxed> Clone for SlotArena<T> {
    fn clone(&self) -> Self {
        let slots = self
            .slots
            .iter()
            .map(|slot| Slot {
                generation: slot.generation,
                value: slot.value.as_ref().map(|v| v.clone_boxed()),
            })
            .collect();
        Self { slots, free: self.free.clone(), live: self.live }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for SlotArena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.slots.iter().filter_map(|s| s.value.as_deref())).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl CloneBoxed for String {
        fn clone_boxed(&self) -> Box<Self> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn test_stale_key_after_reuse() {
        let mut arena: SlotArena<String> = SlotArena::new();
        let a = arena.insert(Box::new("a".into()));
        assert_eq!(arena.remove(a).as_deref().map(String::as_str), Some("a"));

        let b = arena.insert(Box::new("b".into()));
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(b).map(String::as_str), Some("b"));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_clone_is_deep_and_keys_stay_valid() {
        let mut arena: SlotArena<String> = SlotArena::new();
        let key = arena.insert(Box::new("launch".into()));
        let mut copy = arena.clone();
        if let Some(v) = copy.get_mut(key) {
            v.push_str("-edited");
        }
        assert_eq!(arena.get(key).map(String::as_str), Some("launch"));
        assert_eq!(copy.get(key).map(String::as_str), Some("launch-edited"));
    }
}
