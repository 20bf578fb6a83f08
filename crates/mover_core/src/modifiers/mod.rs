//! # Movement Modifiers
//!
//! Timed side effects (stances, buffs) that wrap each substep with
//! pre/post-movement hooks instead of proposing velocity.
//!
//! ## Usage
//! ```rust
//! use mover_core::modifiers::{ModifierHandleGenerator, MovementModifierGroup, Stance, StanceModifier};
//!
//! let handles = ModifierHandleGenerator::new();
//! let mut crouch = StanceModifier::new(Stance::Crouch);
//! crouch.core.handle = handles.generate();
//! let handle = crouch.core.handle;
//!
//! let mut group = MovementModifierGroup::new();
//! group.queue_movement_modifier(Box::new(crouch));
//! assert!(group.find_modifier(handle).is_some());
//! ```

pub mod base;
pub mod group;
pub mod handle;
pub mod stance;

pub use base::{ModifierContext, ModifierCore, MovementModifier, MovementModifierBase};
pub use group::MovementModifierGroup;
pub use handle::{ModifierHandle, ModifierHandleGenerator};
pub use stance::{Stance, StanceModifier, CROUCH_TAG, PRONE_TAG};
