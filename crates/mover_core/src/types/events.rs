//! Simulation events raised during a tick
//!
//! Events are buffered by the state machine and drained by the owner with
//! `take_events()` once the tick is done; nothing is dispatched mid-substep.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeleportFailureReason {
    /// The destination was blocked or the component refused the move
    NotAvailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MoverSimulationEvent {
    ModeChanged {
        sim_time_ms: f64,
        previous_mode: Option<String>,
        new_mode: String,
    },
    TransitionTriggered {
        sim_time_ms: f64,
        from_mode: String,
        to_mode: String,
    },
    TeleportSucceeded {
        sim_time_ms: f64,
        from_location: Vector3<f32>,
        from_orientation: UnitQuaternion<f32>,
        to_location: Vector3<f32>,
        to_orientation: UnitQuaternion<f32>,
    },
    TeleportFailed {
        sim_time_ms: f64,
        attempted_location: Vector3<f32>,
        reason: TeleportFailureReason,
    },
}

impl MoverSimulationEvent {
    pub fn sim_time_ms(&self) -> f64 {
        match self {
            MoverSimulationEvent::ModeChanged { sim_time_ms, .. }
            | MoverSimulationEvent::TransitionTriggered { sim_time_ms, .. }
            | MoverSimulationEvent::TeleportSucceeded { sim_time_ms, .. }
            | MoverSimulationEvent::TeleportFailed { sim_time_ms, .. } => *sim_time_ms,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MoverSimulationEvent::ModeChanged { .. } => "mode_changed",
            MoverSimulationEvent::TransitionTriggered { .. } => "transition_triggered",
            MoverSimulationEvent::TeleportSucceeded { .. } => "teleport_succeeded",
            MoverSimulationEvent::TeleportFailed { .. } => "teleport_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors() {
        let ev = MoverSimulationEvent::TeleportFailed {
            sim_time_ms: 250.0,
            attempted_location: Vector3::new(0.0, 0.0, -50.0),
            reason: TeleportFailureReason::NotAvailable,
        };
        assert_eq!(ev.sim_time_ms(), 250.0);
        assert_eq!(ev.label(), "teleport_failed");
    }
}
