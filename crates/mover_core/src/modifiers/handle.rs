//! Modifier handles

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// Identifies one queued modifier for explicit cancellation. `0` is never handed out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModifierHandle(u32);

impl ModifierHandle {
    pub const INVALID: ModifierHandle = ModifierHandle(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ModifierHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-simulation handle source. Shared between threads through the movement queues.
#[derive(Debug, Default)]
pub struct ModifierHandleGenerator {
    last: AtomicU32,
}

impl ModifierHandleGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate(&self) -> ModifierHandle {
        loop {
            let id = self.last.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if id != 0 {
                return ModifierHandle(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique_and_valid() {
        let gen = ModifierHandleGenerator::new();
        let a = gen.generate();
        let b = gen.generate();
        assert!(a.is_valid() && b.is_valid());
        assert_ne!(a, b);
        assert!(!ModifierHandle::INVALID.is_valid());
    }

    #[test]
    fn test_wraparound_skips_zero() {
        let gen = ModifierHandleGenerator { last: AtomicU32::new(u32::MAX - 1) };
        assert_eq!(gen.generate().raw(), u32::MAX);
        assert_eq!(gen.generate().raw(), 1);
    }

    #[test]
    fn test_generators_are_independent() {
        let a = ModifierHandleGenerator::new();
        let b = ModifierHandleGenerator::new();
        assert_eq!(a.generate(), b.generate());
    }
}
