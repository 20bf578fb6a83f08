//! Per-tick movement bookkeeping
//!
//! Modes append one [`MovementSubstep`] per sweep they perform. Only
//! "relevant" substeps count toward the derived velocity, so corrections like
//! depenetration or floor snapping don't show up as speed.

use std::fmt;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementSubstep {
    pub move_name: String,
    pub move_delta: Vector3<f32>,
    pub is_relevant: bool,
}

impl MovementSubstep {
    pub fn new(move_name: impl Into<String>, move_delta: Vector3<f32>, is_relevant: bool) -> Self {
        Self { move_name: move_name.into(), move_delta, is_relevant }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRecord {
    total_move_delta: Vector3<f32>,
    relevant_move_delta: Vector3<f32>,
    total_delta_seconds: f32,
    is_relevancy_locked: bool,
    relevancy_lock_value: bool,
    substeps: Vec<MovementSubstep>,
}

impl Default for MovementRecord {
    fn default() -> Self {
        Self {
            total_move_delta: Vector3::zeros(),
            relevant_move_delta: Vector3::zeros(),
            total_delta_seconds: 0.0,
            is_relevancy_locked: false,
            relevancy_lock_value: false,
            substeps: Vec::new(),
        }
    }
}

impl MovementRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, mut substep: MovementSubstep) {
        if self.is_relevancy_locked {
            substep.is_relevant = self.relevancy_lock_value;
        }
        if substep.is_relevant {
            self.relevant_move_delta += substep.move_delta;
        }
        self.total_move_delta += substep.move_delta;
        self.substeps.push(substep);
    }

    /// Force every appended substep's relevancy until unlocked.
    pub fn lock_relevancy(&mut self, value: bool) {
        self.is_relevancy_locked = true;
        self.relevancy_lock_value = value;
    }

    pub fn unlock_relevancy(&mut self) {
        self.is_relevancy_locked = false;
    }

    pub fn set_delta_seconds(&mut self, delta_seconds: f32) {
        self.total_delta_seconds = delta_seconds;
    }

    pub fn delta_seconds(&self) -> f32 {
        self.total_delta_seconds
    }

    pub fn total_move_delta(&self) -> Vector3<f32> {
        self.total_move_delta
    }

    pub fn relevant_move_delta(&self) -> Vector3<f32> {
        self.relevant_move_delta
    }

    /// Velocity implied by the relevant delta; zero when no time has been recorded.
    pub fn relevant_velocity(&self) -> Vector3<f32> {
        if self.total_delta_seconds > 0.0 {
            self.relevant_move_delta / self.total_delta_seconds
        } else {
            Vector3::zeros()
        }
    }

    pub fn substeps(&self) -> &[MovementSubstep] {
        &self.substeps
    }

    pub fn reset(&mut self) {
        self.total_move_delta = Vector3::zeros();
        self.relevant_move_delta = Vector3::zeros();
        self.total_delta_seconds = 0.0;
        self.is_relevancy_locked = false;
        self.relevancy_lock_value = false;
        self.substeps.clear();
    }
}

impl fmt::Display for MovementRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let v = self.relevant_velocity();
        let names: Vec<&str> = self.substeps.iter().map(|s| s.move_name.as_str()).collect();
        write!(
            f,
            "TotalMove: ({:.2}, {:.2}, {:.2}) over {:.3} seconds. RelevantVelocity: ({:.2}, {:.2}, {:.2}). Substeps: {}",
            self.total_move_delta.x,
            self.total_move_delta.y,
            self.total_move_delta.z,
            self.total_delta_seconds,
            v.x,
            v.y,
            v.z,
            names.join(",")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_irrelevant_substeps_only_count_in_total() {
        let mut record = MovementRecord::new();
        record.set_delta_seconds(0.5);
        record.append(MovementSubstep::new("Fly", Vector3::new(10.0, 0.0, 0.0), true));
        record.append(MovementSubstep::new("Snap", Vector3::new(0.0, 0.0, -2.0), false));

        assert_eq!(record.total_move_delta(), Vector3::new(10.0, 0.0, -2.0));
        assert_eq!(record.relevant_move_delta(), Vector3::new(10.0, 0.0, 0.0));
        assert_eq!(record.relevant_velocity(), Vector3::new(20.0, 0.0, 0.0));
    }

    #[test]
    fn test_relevancy_lock_overrides_substep_flag() {
        let mut record = MovementRecord::new();
        record.lock_relevancy(false);
        record.append(MovementSubstep::new("Depen", Vector3::new(5.0, 0.0, 0.0), true));
        record.unlock_relevancy();
        record.append(MovementSubstep::new("Fly", Vector3::new(1.0, 0.0, 0.0), true));

        assert_eq!(record.relevant_move_delta(), Vector3::new(1.0, 0.0, 0.0));
        assert!(!record.substeps()[0].is_relevant);
    }

    #[test]
    fn test_zero_time_gives_zero_velocity_and_reset_clears() {
        let mut record = MovementRecord::new();
        record.append(MovementSubstep::new("Fly", Vector3::new(1.0, 2.0, 3.0), true));
        assert_eq!(record.relevant_velocity(), Vector3::zeros());

        record.lock_relevancy(true);
        record.reset();
        assert_eq!(record, MovementRecord::default());
        assert!(record.to_string().starts_with("TotalMove: (0.00, 0.00, 0.00)"));
    }
}
