//! # Simulation Data
//!
//! Typed data blocks and the per-tick state bundles built from them.
//!
//! - [`MoverDataCollection`]: type-keyed bag of [`MoverDataStruct`] blocks
//! - [`UpdatedMotionState`] / [`CharacterDefaultInputs`]: the bundled blocks
//! - [`MoverSyncState`]: everything that replicates and rolls back

pub mod collection;
pub mod inputs;
pub mod motion_state;
pub mod sync_state;

pub use collection::{MoverDataCollection, MoverDataStruct, MoverDataStructBase};
pub use inputs::{CharacterDefaultInputs, MoveInputType};
pub use motion_state::{UpdatedMotionState, RECONCILE_DIST_TOLERANCE, TELEPORT_SNAP_DISTANCE};
pub use sync_state::{
    MovementModeTickEndState, MoverAuxState, MoverInputCmd, MoverSyncState, MoverTickEndData, MoverTickStartData,
};
