//! # Instant Movement Effects
//!
//! One-shot mutations (teleports, velocity kicks) applied to the sync state
//! between substeps, bypassing the mixer.
//!
//! ## Usage
//! ```rust
//! use mover_core::instant_effects::{ScheduledInstantMovementEffect, TeleportEffect};
//! use mover_core::types::MoverTimeStep;
//! use nalgebra::Vector3;
//!
//! let now = MoverTimeStep::new(0.0, 16.0, 100);
//! let teleport = Box::new(TeleportEffect::new(Vector3::new(0.0, 0.0, 500.0)));
//! let scheduled = ScheduledInstantMovementEffect::schedule(&now, teleport, 0.05, Some(0.02));
//! assert_eq!(scheduled.execution_server_frame, 103);
//! ```

pub mod base;
pub mod basic;

pub use base::{ApplyEffectParams, InstantMovementEffect, InstantMovementEffectBase, ScheduledInstantMovementEffect};
pub use basic::{ApplyVelocityEffect, JumpImpulseEffect, TeleportEffect};
