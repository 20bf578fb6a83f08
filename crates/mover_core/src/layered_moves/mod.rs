//! # Layered Moves
//!
//! Time-boxed velocity contributions mixed on top of the active mode.
//!
//! Two flavors:
//! - self-contained moves ([`LayeredMove`]) that carry data and behavior together
//! - instanced moves ([`LayeredMoveInstance`]): shared [`LayeredMoveLogic`] plus
//!   per-activation [`LayeredMoveInstancedData`]
//!
//! ## Usage
//! ```rust
//! use mover_core::layered_moves::{LaunchMove, LayeredMoveGroup};
//! use nalgebra::Vector3;
//!
//! let mut group = LayeredMoveGroup::new();
//! group.queue_layered_move(Box::new(LaunchMove::new(Vector3::new(0.0, 0.0, 600.0), 250.0)));
//! assert_eq!(group.num_queued(), 1);
//! ```

pub mod base;
pub mod basic;
pub mod group;
pub mod instance_group;
pub mod instanced;
pub mod residual;

pub use base::{FinishVelocityMode, FinishVelocitySettings, LayeredMove, LayeredMoveBase, LayeredMoveCore};
pub use basic::{
    JumpImpulseMove, JumpToMove, LaunchMove, LaunchMoveData, LaunchMoveLogic, LinearVelocityMove, MoveToMove,
    RadialImpulseMove,
};
pub use group::LayeredMoveGroup;
pub use instance_group::LayeredMoveInstanceGroup;
pub use instanced::{
    InstancedMoveTiming, LayeredMoveInstance, LayeredMoveInstancedData, LayeredMoveInstancedDataBase,
    LayeredMoveLogic, LayeredMoveLogicSettings,
};
pub use residual::ResidualVelocity;
