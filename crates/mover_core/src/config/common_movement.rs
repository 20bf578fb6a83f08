//! Shared movement tuning

use serde::{Deserialize, Serialize};

use crate::error::{MoverError, Result};

/// Per-mover tuning shared by modes and modifiers.
///
/// Modifiers (stances) edit a live copy of this during simulation and revert
/// their edits when they end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommonMovementSettings {
    /// Top speed from input (units/s) (default: 800)
    pub max_speed: f32,
    /// Acceleration toward the input velocity (units/s²) (default: 4000)
    pub acceleration: f32,
    /// Gravity along -up (units/s²) (default: 980)
    pub gravity: f32,
    /// Mode entered when landing (default: "Flying")
    pub ground_mode_name: String,
    /// Mode entered when airborne (default: "Falling")
    pub air_mode_name: String,
    /// Max speed multiplier while crouched (default: 0.5)
    pub crouched_max_speed_multiplier: f32,
    /// Collision half height while crouched (default: 40)
    pub crouched_half_height: f32,
    /// Collision half height while standing (default: 90)
    pub standing_half_height: f32,
}

impl Default for CommonMovementSettings {
    fn default() -> Self {
        Self {
            max_speed: 800.0,
            acceleration: 4000.0,
            gravity: 980.0,
            ground_mode_name: "Flying".to_string(),
            air_mode_name: "Falling".to_string(),
            crouched_max_speed_multiplier: 0.5,
            crouched_half_height: 40.0,
            standing_half_height: 90.0,
        }
    }
}

impl CommonMovementSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_speed < 0.0 || self.acceleration < 0.0 {
            return Err(MoverError::InvalidSettings(format!(
                "max_speed and acceleration must be non-negative, got {} / {}",
                self.max_speed, self.acceleration
            )));
        }
        if !(0.0..=1.0).contains(&self.crouched_max_speed_multiplier) {
            return Err(MoverError::InvalidSettings(format!(
                "crouched_max_speed_multiplier must be 0.0-1.0, got {}",
                self.crouched_max_speed_multiplier
            )));
        }
        if self.crouched_half_height > self.standing_half_height {
            return Err(MoverError::InvalidSettings(
                "crouched_half_height cannot exceed standing_half_height".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_common_settings_valid() {
        assert!(CommonMovementSettings::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_half_heights_rejected() {
        let mut cfg = CommonMovementSettings::default();
        cfg.crouched_half_height = 120.0;
        assert!(cfg.validate().is_err());
    }
}
