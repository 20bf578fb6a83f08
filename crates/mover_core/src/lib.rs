//! # mover_core - Rollback-Aware Character Movement Simulation
//!
//! Advances a character's kinematic state every tick by composing a movement
//! mode state machine, time-bounded layered moves and modifiers, with
//! rollback and resimulation for client-side prediction.
//!
//! ## Features
//! - Named movement modes with per-mode and global transitions
//! - Substepping with time refunds between modes
//! - Priority-resolved layered move mixing (additive / override)
//! - Rollback blackboard for per-frame scratch data
//! - Family-tagged binary replication of the sync state

// Struct initialization pattern used intentionally
#![allow(clippy::field_reassign_with_default)]
// Simulation hooks take the full set of collaborators
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

pub mod component;
pub mod config;
pub mod data;
pub mod error;
pub mod instant_effects;
pub mod layered_moves;
pub mod modes;
pub mod modifiers;
pub mod move_library;
pub mod replication;
pub mod simulation;
mod slot_arena;
pub mod state_machine;
pub mod types;

pub use config::{CommonMovementSettings, MoverSettings};
pub use error::{MoverError, ReplicationError, Result};
pub use replication::ReplicationRegistry;
pub use simulation::MoverSimulation;
pub use state_machine::MovementModeStateMachine;
