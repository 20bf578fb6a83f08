//! # Mover Configuration
//!
//! Central settings for the simulation driver, plus the shared per-mover
//! tuning consumed by the bundled modes and modifiers.
//!
//! ## Usage
//! ```rust
//! use mover_core::config::MoverSettings;
//!
//! let settings = MoverSettings::default();
//! let strict = MoverSettings::strict();
//! assert!(strict.max_times_to_refund_substep <= settings.max_times_to_refund_substep);
//! ```

mod common_movement;

pub use common_movement::CommonMovementSettings;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MoverError, Result};

/// Driver-level settings (one per simulation instance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoverSettings {
    /// Consecutive fully-refunded substeps tolerated before time is force-consumed (default: 2)
    pub max_times_to_refund_substep: u32,
    /// Skip the mode's own GenerateMove when layered moves override everything (default: true)
    pub skip_generate_move_if_overridden: bool,
    /// Cap on replicated items per group array (default: 255)
    pub max_replicated_items: u8,
    /// Tolerance used to decide a substep refunded all of its time (default: 1e-4 ms)
    pub refund_tolerance_ms: f32,
    /// Ring size of the mode change record blackboard entry (default: 4)
    pub last_mode_change_history: u32,
    /// Committed sync states kept for resimulation (default: 64)
    pub state_history_len: usize,
}

impl Default for MoverSettings {
    fn default() -> Self {
        Self {
            max_times_to_refund_substep: 2,
            skip_generate_move_if_overridden: true,
            max_replicated_items: u8::MAX,
            refund_tolerance_ms: 1.0e-4,
            last_mode_change_history: 4,
            state_history_len: 64,
        }
    }
}

impl MoverSettings {
    /// Gives up on ping-ponging modes immediately.
    pub fn strict() -> Self {
        let mut cfg = Self::default();
        cfg.max_times_to_refund_substep = 1;
        cfg
    }

    /// Lets modes hand time back and forth longer before forcing progress.
    pub fn lenient() -> Self {
        let mut cfg = Self::default();
        cfg.max_times_to_refund_substep = 8;
        cfg.skip_generate_move_if_overridden = false;
        cfg
    }

    /// Parse settings from JSON and validate them
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: MoverSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| MoverError::ParseError(e.to_string()))?;
        log::debug!("Loaded mover settings from {}", path.as_ref().display());
        Self::from_json(&content)
    }

    /// Validate configuration bounds
    pub fn validate(&self) -> Result<()> {
        if self.max_times_to_refund_substep == 0 {
            return Err(MoverError::InvalidSettings(
                "max_times_to_refund_substep must be at least 1".to_string(),
            ));
        }
        if !(self.refund_tolerance_ms >= 0.0 && self.refund_tolerance_ms < 1.0) {
            return Err(MoverError::InvalidSettings(format!(
                "refund_tolerance_ms must be 0.0-1.0, got {}",
                self.refund_tolerance_ms
            )));
        }
        if self.last_mode_change_history < 2 {
            return Err(MoverError::InvalidSettings(format!(
                "last_mode_change_history must be at least 2, got {}",
                self.last_mode_change_history
            )));
        }
        if self.state_history_len == 0 {
            return Err(MoverError::InvalidSettings(
                "state_history_len must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ========== Tests ==========
