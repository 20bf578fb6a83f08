//! Floor query results shared through the blackboard

use nalgebra::Vector3;
use tracing::debug;

use crate::component::MoveHit;
use crate::move_library::blackboard::{BlackboardEntrySettings, RollbackBlackboard};
use crate::move_library::common_blackboard::LAST_FLOOR_RESULT;

/// Steepest surface (as cos of its slope) still considered walkable.
pub const DEFAULT_MAX_WALK_SLOPE_COSINE: f32 = 0.71;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloorCheckResult {
    pub blocking_hit: bool,
    pub walkable_floor: bool,
    pub hit_location: Vector3<f32>,
    pub normal: Vector3<f32>,
}

impl FloorCheckResult {
    pub fn from_hit(hit: &MoveHit, up: &Vector3<f32>) -> Self {
        Self {
            blocking_hit: true,
            walkable_floor: hit.is_walkable(up, DEFAULT_MAX_WALK_SLOPE_COSINE),
            hit_location: hit.location,
            normal: hit.normal,
        }
    }

    pub fn is_walkable_floor(&self) -> bool {
        self.blocking_hit && self.walkable_floor
    }

    /// Publish as the latest floor result, creating the entry on first use.
    pub fn publish(self, blackboard: &mut RollbackBlackboard) {
        if !blackboard.has_entry(LAST_FLOOR_RESULT) {
            blackboard.create_entry::<FloorCheckResult>(LAST_FLOOR_RESULT, BlackboardEntrySettings::next_frame_only());
        }
        if let Err(e) = blackboard.try_set(LAST_FLOOR_RESULT, self) {
            debug!("Could not record floor result: {}", e);
        }
    }
}
