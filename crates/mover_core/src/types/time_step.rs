//! Simulation time step
//!
//! Sim time is kept in f64 milliseconds so long sessions don't lose
//! precision; step lengths are f32 like everything else per-substep.

use serde::{Deserialize, Serialize};

/// Start time of a move/modifier that has not been activated yet.
///
/// Anything below zero means "not started"; this is simply far below any
/// reachable sim time.
pub const NOT_STARTED_MS: f64 = -3.4e38;

/// Returns true if a recorded start time means "activated".
#[inline]
pub fn has_started(start_sim_time_ms: f64) -> bool {
    start_sim_time_ms >= 0.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoverTimeStep {
    /// Sim time at the start of this (sub)step
    pub base_sim_time_ms: f64,
    /// Length of this (sub)step; shrinks as substeps consume time
    pub step_ms: f32,
    /// Authoritative frame number this step belongs to
    pub server_frame: u32,
    /// True while replaying frames after a rollback
    pub is_resimulating: bool,
}

impl Default for MoverTimeStep {
    fn default() -> Self {
        Self { base_sim_time_ms: 0.0, step_ms: 0.0, server_frame: 0, is_resimulating: false }
    }
}

impl MoverTimeStep {
    pub fn new(base_sim_time_ms: f64, step_ms: f32, server_frame: u32) -> Self {
        Self { base_sim_time_ms, step_ms, server_frame, is_resimulating: false }
    }

    pub fn resimulating(mut self) -> Self {
        self.is_resimulating = true;
        self
    }

    #[inline]
    pub fn step_secs(&self) -> f32 {
        self.step_ms * 0.001
    }

    #[inline]
    pub fn end_sim_time_ms(&self) -> f64 {
        self.base_sim_time_ms + self.step_ms as f64
    }

    /// Base time expressed in seconds, used for wall-clock scheduling.
    #[inline]
    pub fn base_sim_time_secs(&self) -> f64 {
        self.base_sim_time_ms * 0.001
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_started_sentinel_is_negative() {
        assert!(!has_started(NOT_STARTED_MS));
        assert!(has_started(0.0));
    }

    #[test]
    fn test_step_secs_and_end_time() {
        let ts = MoverTimeStep::new(1000.0, 16.0, 60);
        assert!((ts.step_secs() - 0.016).abs() < 1e-6);
        assert_eq!(ts.end_sim_time_ms(), 1016.0);
        assert!(!ts.is_resimulating);
        assert!(ts.resimulating().is_resimulating);
    }
}
