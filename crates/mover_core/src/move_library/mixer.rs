//! Movement Mixer
//!
//! Folds the proposed moves of every active layered move into one cumulative
//! move, then folds that into the mode's own proposal.
//!
//! Override mix modes only win when the move beats the running highest
//! priority; equal priorities go to the move that started first.
//!
//! ## Usage
//! ```rust
//! use mover_core::move_library::MovementMixer;
//! use mover_core::types::{MoveMixMode, ProposedMove};
//! use nalgebra::Vector3;
//!
//! let mut mixer = MovementMixer::new();
//! let layered = ProposedMove::with_velocity(Vector3::new(0.0, 0.0, 600.0), MoveMixMode::OverrideVelocity);
//! let mut mode_move = ProposedMove::with_velocity(Vector3::new(100.0, 0.0, 0.0), MoveMixMode::AdditiveVelocity);
//! mixer.mix_proposed_moves(&layered, &Vector3::z(), &mut mode_move);
//! assert_eq!(mode_move.linear_velocity, Vector3::new(0.0, 0.0, 600.0));
//! ```

use nalgebra::Vector3;
use tracing::{debug, warn};

use crate::types::{project_onto_normal, MoveMixMode, ProposedMove};

/// What the mixer needs to know about the move that produced a proposal.
pub trait MixableMove {
    fn priority(&self) -> u8;
    fn start_sim_time_ms(&self) -> f64;
    fn label(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovementMixer {
    current_highest_priority: u8,
    current_start_time_ms: f64,
}

impl Default for MovementMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl MovementMixer {
    pub fn new() -> Self {
        Self { current_highest_priority: 0, current_start_time_ms: f64::MAX }
    }

    /// Must run once per substep before any mixing.
    pub fn reset_mixer_state(&mut self) {
        self.current_highest_priority = 0;
        self.current_start_time_ms = f64::MAX;
    }

    pub fn current_highest_priority(&self) -> u8 {
        self.current_highest_priority
    }

    /// Mix one layered move's proposal into `cumulative`.
    pub fn mix_layered_move<M: MixableMove + ?Sized>(
        &mut self,
        active_move: &M,
        move_step: &ProposedMove,
        cumulative: &mut ProposedMove,
    ) {
        if let (Some(existing), Some(incoming)) = (&cumulative.preferred_mode, &move_step.preferred_mode) {
            if existing != incoming {
                warn!(
                    "Multiple layered moves request conflicting preferred modes. {} will override {}",
                    incoming, existing
                );
            }
        }

        if move_step.has_dir_intent
            && cumulative.mix_mode != MoveMixMode::OverrideAll
            && active_move.priority() >= self.current_highest_priority
        {
            if cumulative.has_dir_intent {
                debug!("Multiple layered moves set direction intent; highest priority is used");
            }
            cumulative.has_dir_intent = true;
            cumulative.direction_intent = move_step.direction_intent;
        }

        match move_step.mix_mode {
            MoveMixMode::OverrideVelocity => {
                if self.check_priority(active_move) {
                    self.log_override_collision(active_move, cumulative.mix_mode, false);
                    if move_step.preferred_mode.is_some() && cumulative.mix_mode != MoveMixMode::OverrideAll {
                        cumulative.preferred_mode = move_step.preferred_mode.clone();
                    }
                    cumulative.mix_mode = MoveMixMode::OverrideVelocity;
                    cumulative.linear_velocity = move_step.linear_velocity;
                    cumulative.angular_velocity_degrees = move_step.angular_velocity_degrees;
                }
            }
            MoveMixMode::AdditiveVelocity => {
                if !matches!(cumulative.mix_mode, MoveMixMode::OverrideVelocity | MoveMixMode::OverrideAll) {
                    if move_step.preferred_mode.is_some() {
                        cumulative.preferred_mode = move_step.preferred_mode.clone();
                    }
                    cumulative.linear_velocity += move_step.linear_velocity;
                    cumulative.angular_velocity_degrees += move_step.angular_velocity_degrees;
                }
            }
            MoveMixMode::OverrideAll => {
                if self.check_priority(active_move) {
                    self.log_override_collision(active_move, cumulative.mix_mode, false);
                    *cumulative = move_step.clone();
                    cumulative.mix_mode = MoveMixMode::OverrideAll;
                }
            }
            MoveMixMode::OverrideAllExceptVerticalVelocity => {
                if self.check_priority(active_move) {
                    self.log_override_collision(active_move, cumulative.mix_mode, true);
                    *cumulative = move_step.clone();
                    cumulative.mix_mode = MoveMixMode::OverrideAllExceptVerticalVelocity;
                }
            }
        }
    }

    /// Mix the combined layered result (`move_to_mix`) into the mode's proposal.
    pub fn mix_proposed_moves(
        &self,
        move_to_mix: &ProposedMove,
        up_direction: &Vector3<f32>,
        cumulative: &mut ProposedMove,
    ) {
        if move_to_mix.has_dir_intent && cumulative.mix_mode != MoveMixMode::OverrideAll {
            cumulative.has_dir_intent = true;
            cumulative.direction_intent = move_to_mix.direction_intent;
        }

        match move_to_mix.mix_mode {
            MoveMixMode::OverrideAll => {
                *cumulative = move_to_mix.clone();
            }
            MoveMixMode::AdditiveVelocity => {
                cumulative.linear_velocity += move_to_mix.linear_velocity;
                cumulative.angular_velocity_degrees += move_to_mix.angular_velocity_degrees;
            }
            MoveMixMode::OverrideVelocity => {
                cumulative.linear_velocity = move_to_mix.linear_velocity;
                cumulative.angular_velocity_degrees = move_to_mix.angular_velocity_degrees;
            }
            MoveMixMode::OverrideAllExceptVerticalVelocity => {
                let incoming_vertical = project_onto_normal(&move_to_mix.linear_velocity, up_direction);
                let incoming_non_vertical = move_to_mix.linear_velocity - incoming_vertical;
                let existing_vertical = project_onto_normal(&cumulative.linear_velocity, up_direction);
                *cumulative = move_to_mix.clone();
                cumulative.linear_velocity = incoming_non_vertical + existing_vertical;
            }
        }
    }

    /// Higher priority wins; ties go to the earlier start time.
    fn check_priority<M: MixableMove + ?Sized>(&mut self, active_move: &M) -> bool {
        let priority = active_move.priority();
        let start = active_move.start_sim_time_ms();
        if priority > self.current_highest_priority {
            self.current_highest_priority = priority;
            self.current_start_time_ms = start;
            return true;
        }
        if priority == self.current_highest_priority && start < self.current_start_time_ms {
            self.current_start_time_ms = start;
            return true;
        }
        false
    }

    fn log_override_collision<M: MixableMove + ?Sized>(
        &self,
        active_move: &M,
        existing: MoveMixMode,
        include_except_vertical: bool,
    ) {
        let collides = match existing {
            MoveMixMode::OverrideVelocity | MoveMixMode::OverrideAll => true,
            MoveMixMode::OverrideAllExceptVerticalVelocity => include_except_vertical,
            MoveMixMode::AdditiveVelocity => false,
        };
        if collides {
            debug!(
                "Multiple overriding layered moves active; {} (priority {}) takes effect",
                active_move.label(),
                active_move.priority()
            );
        }
    }
}

// ========== Tests ==========

#[cfg(test)]
mod tests {
    use super::*;

    struct TestMove {
        priority: u8,
        start: f64,
    }

    impl MixableMove for TestMove {
        fn priority(&self) -> u8 {
            self.priority
        }
        fn start_sim_time_ms(&self) -> f64 {
            self.start
        }
        fn label(&self) -> &str {
            "TestMove"
        }
    }

    fn vel(x: f32, y: f32, z: f32, mix: MoveMixMode) -> ProposedMove {
        ProposedMove::with_velocity(Vector3::new(x, y, z), mix)
    }

    #[test]
    fn test_equal_priority_earlier_start_wins_either_order() {
        let early = TestMove { priority: 3, start: 100.0 };
        let late = TestMove { priority: 3, start: 200.0 };
        let early_step = vel(1.0, 0.0, 0.0, MoveMixMode::OverrideVelocity);
        let late_step = vel(2.0, 0.0, 0.0, MoveMixMode::OverrideVelocity);

        let mut mixer = MovementMixer::new();
        let mut cumulative = ProposedMove::default();
        mixer.mix_layered_move(&late, &late_step, &mut cumulative);
        mixer.mix_layered_move(&early, &early_step, &mut cumulative);
        assert_eq!(cumulative.linear_velocity.x, 1.0);

        mixer.reset_mixer_state();
        let mut cumulative = ProposedMove::default();
        mixer.mix_layered_move(&early, &early_step, &mut cumulative);
        mixer.mix_layered_move(&late, &late_step, &mut cumulative);
        assert_eq!(cumulative.linear_velocity.x, 1.0);
    }

    #[test]
    fn test_higher_priority_override_wins() {
        let low = TestMove { priority: 1, start: 0.0 };
        let high = TestMove { priority: 9, start: 500.0 };
        let mut mixer = MovementMixer::new();
        let mut cumulative = ProposedMove::default();
        mixer.mix_layered_move(&high, &vel(0.0, 0.0, 9.0, MoveMixMode::OverrideAll), &mut cumulative);
        mixer.mix_layered_move(&low, &vel(0.0, 0.0, 1.0, MoveMixMode::OverrideAll), &mut cumulative);
        assert_eq!(cumulative.linear_velocity.z, 9.0);
        assert_eq!(cumulative.mix_mode, MoveMixMode::OverrideAll);
        assert_eq!(mixer.current_highest_priority(), 9);
    }

    #[test]
    fn test_additive_ignored_once_overridden() {
        let a = TestMove { priority: 0, start: 0.0 };
        let mut mixer = MovementMixer::new();
        let mut cumulative = ProposedMove::default();
        mixer.mix_layered_move(&a, &vel(10.0, 0.0, 0.0, MoveMixMode::AdditiveVelocity), &mut cumulative);
        mixer.mix_layered_move(&a, &vel(5.0, 0.0, 0.0, MoveMixMode::AdditiveVelocity), &mut cumulative);
        assert_eq!(cumulative.linear_velocity.x, 15.0);

        mixer.mix_layered_move(&a, &vel(0.0, 7.0, 0.0, MoveMixMode::OverrideVelocity), &mut cumulative);
        mixer.mix_layered_move(&a, &vel(100.0, 0.0, 0.0, MoveMixMode::AdditiveVelocity), &mut cumulative);
        assert_eq!(cumulative.linear_velocity, Vector3::new(0.0, 7.0, 0.0));
    }

    #[test]
    fn test_reset_clears_priority_leakage() {
        let high = TestMove { priority: 9, start: 0.0 };
        let low = TestMove { priority: 1, start: 0.0 };
        let mut mixer = MovementMixer::new();
        let mut cumulative = ProposedMove::default();
        mixer.mix_layered_move(&high, &vel(1.0, 0.0, 0.0, MoveMixMode::OverrideVelocity), &mut cumulative);

        mixer.reset_mixer_state();
        let mut next = ProposedMove::default();
        mixer.mix_layered_move(&low, &vel(2.0, 0.0, 0.0, MoveMixMode::OverrideVelocity), &mut next);
        assert_eq!(next.linear_velocity.x, 2.0);
    }

    #[test]
    fn test_override_except_vertical_keeps_existing_vertical() {
        let mixer = MovementMixer::new();
        let layered = vel(300.0, 0.0, 50.0, MoveMixMode::OverrideAllExceptVerticalVelocity);
        let mut mode_move = vel(10.0, 10.0, -980.0, MoveMixMode::AdditiveVelocity);
        mixer.mix_proposed_moves(&layered, &Vector3::z(), &mut mode_move);
        assert_eq!(mode_move.linear_velocity, Vector3::new(300.0, 0.0, -980.0));
        assert_eq!(mode_move.mix_mode, MoveMixMode::OverrideAllExceptVerticalVelocity);
    }

    #[test]
    fn test_preferred_mode_last_applied_wins() {
        let a = TestMove { priority: 0, start: 0.0 };
        let mut mixer = MovementMixer::new();
        let mut cumulative = ProposedMove::default();
        let mut first = vel(0.0, 0.0, 0.0, MoveMixMode::AdditiveVelocity);
        first.preferred_mode = Some("Falling".into());
        let mut second = first.clone();
        second.preferred_mode = Some("Flying".into());
        mixer.mix_layered_move(&a, &first, &mut cumulative);
        mixer.mix_layered_move(&a, &second, &mut cumulative);
        assert_eq!(cumulative.preferred_mode.as_deref(), Some("Flying"));
    }

    #[test]
    fn test_direction_intent_respects_priority() {
        let high = TestMove { priority: 5, start: 0.0 };
        let low = TestMove { priority: 1, start: 0.0 };
        let mut mixer = MovementMixer::new();
        let mut cumulative = ProposedMove::default();

        let mut high_step = vel(1.0, 0.0, 0.0, MoveMixMode::OverrideVelocity);
        high_step.set_direction_intent(Vector3::x());
        let mut low_step = vel(0.0, 0.0, 0.0, MoveMixMode::AdditiveVelocity);
        low_step.set_direction_intent(Vector3::y());

        mixer.mix_layered_move(&high, &high_step, &mut cumulative);
        mixer.mix_layered_move(&low, &low_step, &mut cumulative);
        assert_eq!(cumulative.direction_intent, Vector3::x());
    }

    #[cfg(all(test, feature = "proptest"))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: with equal priority the earlier start wins regardless of mix order
            #[test]
            fn prop_tie_break_is_order_independent(
                priority in 0u8..=255,
                a_start in 0.0f64..1.0e5,
                gap in 1.0f64..1.0e4,
                a_first in any::<bool>(),
            ) {
                let early = TestMove { priority, start: a_start };
                let late = TestMove { priority, start: a_start + gap };
                let early_step = vel(1.0, 0.0, 0.0, MoveMixMode::OverrideVelocity);
                let late_step = vel(2.0, 0.0, 0.0, MoveMixMode::OverrideVelocity);

                let mut mixer = MovementMixer::new();
                let mut cumulative = ProposedMove::default();
                if a_first {
                    mixer.mix_layered_move(&early, &early_step, &mut cumulative);
                    mixer.mix_layered_move(&late, &late_step, &mut cumulative);
                } else {
                    mixer.mix_layered_move(&late, &late_step, &mut cumulative);
                    mixer.mix_layered_move(&early, &early_step, &mut cumulative);
                }
                prop_assert_eq!(cumulative.linear_velocity.x, 1.0);
            }
        }
    }
}
