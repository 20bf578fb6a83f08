//! Reusable pieces the state machine and modes are built from

pub mod air_movement;
pub mod blackboard;
pub mod floor;
pub mod mixer;
pub mod movement_record;

pub use blackboard::{
    BlackboardEntrySettings, PersistencePolicy, RollbackBlackboard, RollbackPolicy, SizingPolicy,
};
pub use floor::FloorCheckResult;
pub use mixer::{MixableMove, MovementMixer};
pub use movement_record::{MovementRecord, MovementSubstep};

/// Well-known blackboard entry names
pub mod common_blackboard {
    /// `ModeChangeRecord` of the most recent mode switch
    pub const LAST_MODE_CHANGE_RECORD: &str = "LastModeChangeRecord";
    /// Most recent floor check result; invalidated by teleports
    pub const LAST_FLOOR_RESULT: &str = "LastFloor";
}
