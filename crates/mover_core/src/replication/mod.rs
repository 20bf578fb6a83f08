//! Replication codec
//!
//! Polymorphic state (layered moves, instanced move data, modifiers,
//! instant effects, data blocks) travels as registered wire ids plus a
//! MessagePack payload. Only types registered with a
//! [`ReplicationRegistry`] can be written or read.
//!
//! ## Usage
//!
//! ```
//! use mover_core::data::{MoverSyncState, UpdatedMotionState};
//! use mover_core::replication::ReplicationRegistry;
//!
//! let registry = ReplicationRegistry::with_defaults().with_max_items(16);
//! let mut state = MoverSyncState::with_mode("Walking");
//! if let Some(motion) = state.collection.find_or_add::<UpdatedMotionState>() {
//!     motion.velocity.x = 300.0;
//! }
//!
//! let bytes = registry.sync_state_to_bytes(&state).unwrap();
//! let received = registry.sync_state_from_bytes(&bytes).unwrap();
//! assert_eq!(received.movement_mode, "Walking");
//! assert!(!received.should_reconcile(&state));
//! ```

pub mod archive;
pub mod registry;

pub use archive::{NetReader, NetWriter};
pub use registry::ReplicationRegistry;
