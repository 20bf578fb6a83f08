//! Default character input block

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::data::collection::MoverDataStruct;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MoveInputType {
    #[default]
    Invalid,
    /// Move input is an intent in -1..1 per axis; modes scale it by max speed
    DirectionalIntent,
    /// Move input is a target velocity in units/s
    Velocity,
    /// No move input this frame
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterDefaultInputs {
    move_input_type: MoveInputType,
    move_input: Vector3<f32>,
    /// Facing the character should turn toward (zero = keep current)
    pub orientation_intent: Vector3<f32>,
    /// Mode the input source would like the actor to be in
    pub suggested_movement_mode: Option<String>,
    pub is_jump_just_pressed: bool,
    pub is_jump_pressed: bool,
}

impl Default for CharacterDefaultInputs {
    fn default() -> Self {
        Self {
            move_input_type: MoveInputType::Invalid,
            move_input: Vector3::zeros(),
            orientation_intent: Vector3::zeros(),
            suggested_movement_mode: None,
            is_jump_just_pressed: false,
            is_jump_pressed: false,
        }
    }
}

impl CharacterDefaultInputs {
    /// Quantizes to two decimals so every peer simulates the same input.
    pub fn set_move_input(&mut self, input_type: MoveInputType, input: Vector3<f32>) {
        self.move_input_type = input_type;
        self.move_input = input.map(|v| (v * 100.0).round() / 100.0);
    }

    pub fn move_input(&self) -> Vector3<f32> {
        self.move_input
    }

    pub fn move_input_type(&self) -> MoveInputType {
        self.move_input_type
    }
}

impl MoverDataStruct for CharacterDefaultInputs {
    fn should_reconcile(&self, authority: &dyn MoverDataStruct) -> bool {
        authority.downcast_ref::<CharacterDefaultInputs>() != Some(self)
    }

    fn interpolate(&mut self, from: &dyn MoverDataStruct, to: &dyn MoverDataStruct, pct: f32) {
        let (Some(from), Some(to)) =
            (from.downcast_ref::<CharacterDefaultInputs>(), to.downcast_ref::<CharacterDefaultInputs>())
        else {
            return;
        };
        let closest = if pct < 0.5 { from } else { to };
        self.is_jump_just_pressed = closest.is_jump_just_pressed;
        self.is_jump_pressed = closest.is_jump_pressed;
        self.suggested_movement_mode = closest.suggested_movement_mode.clone();
        self.set_move_input(closest.move_input_type, from.move_input.lerp(&to.move_input, pct));
        self.orientation_intent = from.orientation_intent.lerp(&to.orientation_intent, pct);
    }

    fn merge(&mut self, from: &dyn MoverDataStruct) {
        if let Some(older) = from.downcast_ref::<CharacterDefaultInputs>() {
            self.is_jump_just_pressed |= older.is_jump_just_pressed;
            self.is_jump_pressed |= older.is_jump_pressed;
        }
    }

    fn decay(&mut self, decay_amount: f32) {
        self.move_input *= 1.0 - decay_amount;
        // single-use inputs
        if decay_amount.abs() > f32::EPSILON {
            self.is_jump_just_pressed = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_input_is_quantized() {
        let mut inputs = CharacterDefaultInputs::default();
        inputs.set_move_input(MoveInputType::DirectionalIntent, Vector3::new(0.123456, -0.987654, 0.0));
        assert_eq!(inputs.move_input(), Vector3::new(0.12, -0.99, 0.0));
    }

    #[test]
    fn test_merge_latches_jump_and_decay_clears_it() {
        let mut newer = CharacterDefaultInputs::default();
        let mut older = CharacterDefaultInputs::default();
        older.is_jump_just_pressed = true;
        newer.merge(&older);
        assert!(newer.is_jump_just_pressed);

        newer.set_move_input(MoveInputType::DirectionalIntent, Vector3::new(1.0, 0.0, 0.0));
        newer.decay(0.5);
        assert!(!newer.is_jump_just_pressed);
        assert!((newer.move_input().x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_any_difference_reconciles() {
        let a = CharacterDefaultInputs::default();
        let mut b = a.clone();
        assert!(!a.should_reconcile(&b));
        b.is_jump_pressed = true;
        assert!(a.should_reconcile(&b));
    }
}
