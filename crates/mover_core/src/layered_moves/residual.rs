//! Residual velocity left behind by moves that just ended

use nalgebra::Vector3;
use tracing::debug;

use crate::layered_moves::base::{FinishVelocityMode, FinishVelocitySettings};
use crate::types::{clamp_to_max_size, MoveMixMode, ProposedMove};

/// Finish-velocity requests gathered while a group flushes.
///
/// Applied (and cleared) once per substep by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualVelocity {
    velocity: Vector3<f32>,
    /// Negative = no clamp
    clamping: f32,
    apply_velocity: bool,
}

impl Default for ResidualVelocity {
    fn default() -> Self {
        Self { velocity: Vector3::zeros(), clamping: -1.0, apply_velocity: false }
    }
}

/// Override bookkeeping for one flush pass.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ResidualOverrides {
    velocity: bool,
    clamp: bool,
}

impl ResidualVelocity {
    pub fn is_pending(&self) -> bool {
        self.apply_velocity || self.clamping >= 0.0
    }

    pub fn velocity(&self) -> Option<Vector3<f32>> {
        self.apply_velocity.then_some(self.velocity)
    }

    pub fn clamping(&self) -> Option<f32> {
        (self.clamping >= 0.0).then_some(self.clamping)
    }

    /// Fold one ending move's finish settings into the pending residual.
    pub(crate) fn gather(
        &mut self,
        mix_mode: MoveMixMode,
        settings: &FinishVelocitySettings,
        overrides: &mut ResidualOverrides,
        label: &str,
    ) {
        match settings.mode {
            FinishVelocityMode::MaintainLastRootMotionVelocity => {}
            FinishVelocityMode::SetVelocity => {
                if mix_mode.is_override() {
                    if overrides.velocity {
                        debug!("{} overrides residual velocity already set by another ending move", label);
                    }
                    overrides.velocity = true;
                    self.velocity = settings.set_velocity;
                } else if !overrides.velocity {
                    self.velocity += settings.set_velocity;
                }
                self.apply_velocity = true;
            }
            FinishVelocityMode::ClampVelocity => {
                if mix_mode.is_override() {
                    if overrides.clamp {
                        debug!("{} overrides residual clamp already set by another ending move", label);
                    }
                    overrides.clamp = true;
                    self.clamping = settings.clamp_velocity;
                } else if !overrides.clamp {
                    self.clamping = if self.clamping < 0.0 {
                        settings.clamp_velocity
                    } else {
                        self.clamping.min(settings.clamp_velocity)
                    };
                }
            }
        }
    }

    /// Write the residual into `proposed_move` and clear it.
    pub fn apply(&mut self, proposed_move: &mut ProposedMove) {
        if self.apply_velocity {
            proposed_move.linear_velocity = self.velocity;
        }
        if self.clamping >= 0.0 {
            proposed_move.linear_velocity = clamp_to_max_size(proposed_move.linear_velocity, self.clamping);
        }
        self.reset();
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_additive_set_velocities_sum() {
        let mut residual = ResidualVelocity::default();
        let mut overrides = ResidualOverrides::default();
        let a = FinishVelocitySettings::set_velocity(Vector3::new(100.0, 0.0, 0.0));
        let b = FinishVelocitySettings::set_velocity(Vector3::new(0.0, 50.0, 0.0));
        residual.gather(MoveMixMode::AdditiveVelocity, &a, &mut overrides, "a");
        residual.gather(MoveMixMode::AdditiveVelocity, &b, &mut overrides, "b");
        assert_eq!(residual.velocity(), Some(Vector3::new(100.0, 50.0, 0.0)));
    }

    #[test]
    fn test_override_replaces_and_blocks_later_additive() {
        let mut residual = ResidualVelocity::default();
        let mut overrides = ResidualOverrides::default();
        let additive = FinishVelocitySettings::set_velocity(Vector3::new(100.0, 0.0, 0.0));
        let overriding = FinishVelocitySettings::set_velocity(Vector3::new(0.0, 0.0, 10.0));
        residual.gather(MoveMixMode::AdditiveVelocity, &additive, &mut overrides, "a");
        residual.gather(MoveMixMode::OverrideVelocity, &overriding, &mut overrides, "o");
        residual.gather(MoveMixMode::AdditiveVelocity, &additive, &mut overrides, "a2");
        assert_eq!(residual.velocity(), Some(Vector3::new(0.0, 0.0, 10.0)));
    }

    #[test]
    fn test_additive_clamps_take_minimum() {
        let mut residual = ResidualVelocity::default();
        let mut overrides = ResidualOverrides::default();
        residual.gather(MoveMixMode::AdditiveVelocity, &FinishVelocitySettings::clamp_velocity(300.0), &mut overrides, "a");
        residual.gather(MoveMixMode::AdditiveVelocity, &FinishVelocitySettings::clamp_velocity(200.0), &mut overrides, "b");
        assert_eq!(residual.clamping(), Some(200.0));

        let mut proposed = ProposedMove::with_velocity(Vector3::new(400.0, 0.0, 0.0), MoveMixMode::AdditiveVelocity);
        residual.apply(&mut proposed);
        assert!((proposed.linear_velocity.x - 200.0).abs() < 1e-3);
        assert!(!residual.is_pending());
    }
}
