//! # Movement Modes
//!
//! Named movement strategies and the transitions between them.
//!
//! - [`MovementMode`]: proposes a move, then executes the mixed result
//! - [`MovementModeTransition`]: checked before each mode tick; may hand the
//!   substep to another mode
//! - [`KinematicFlyingMode`] / [`KinematicFallingMode`]: bundled modes built
//!   on the [`UpdatedComponent`](crate::component::UpdatedComponent) sweep
//!
//! ## Usage
//! ```rust
//! use mover_core::modes::{ImmediateMovementModeTransition, KinematicFallingMode, MovementModeTransition};
//!
//! let falling = KinematicFallingMode::new().with_air_control(0.25);
//! assert_eq!(falling.air_control, 0.25);
//!
//! let jump_request = ImmediateMovementModeTransition::new();
//! jump_request.set_next_mode(KinematicFallingMode::NAME, false);
//! assert!(jump_request.is_set());
//! assert!(!jump_request.first_sub_step_only());
//! ```

pub mod falling;
pub mod flying;
mod kinematic;
pub mod mode;
pub mod transition;

pub use falling::KinematicFallingMode;
pub use flying::KinematicFlyingMode;
pub use mode::{ModeContext, MovementMode, NullMovementMode, SimulationTickParams};
pub use transition::{ImmediateMovementModeTransition, MovementModeTransition, TransitionEvalResult};
