//! Stance modifier (crouch / prone)

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::modifiers::base::{ModifierContext, ModifierCore, MovementModifier};
use crate::types::GameplayTag;

pub const CROUCH_TAG: &str = "Mover.Stance.Crouch";
pub const PRONE_TAG: &str = "Mover.Stance.Prone";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Stance {
    #[default]
    Crouch,
    Prone,
}

/// Lowers max speed and collision height while active.
///
/// Prone applies the crouch multiplier twice and halves the crouched height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StanceModifier {
    pub core: ModifierCore,
    pub stance: Stance,
}

impl Default for StanceModifier {
    fn default() -> Self {
        Self::new(Stance::Crouch)
    }
}

impl StanceModifier {
    pub fn new(stance: Stance) -> Self {
        let mut core = ModifierCore::default();
        core.gameplay_tags.add_tag(GameplayTag::new(match stance {
            Stance::Crouch => CROUCH_TAG,
            Stance::Prone => PRONE_TAG,
        }));
        Self { core, stance }
    }

    fn speed_multiplier(&self, crouched_multiplier: f32) -> f32 {
        match self.stance {
            Stance::Crouch => crouched_multiplier,
            Stance::Prone => crouched_multiplier * crouched_multiplier,
        }
    }

    fn half_height(&self, crouched_half_height: f32) -> f32 {
        match self.stance {
            Stance::Crouch => crouched_half_height,
            Stance::Prone => crouched_half_height * 0.5,
        }
    }
}

impl MovementModifier for StanceModifier {
    fn core(&self) -> &ModifierCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ModifierCore {
        &mut self.core
    }

    fn on_start(&mut self, ctx: &mut ModifierContext<'_>) {
        let multiplier = self.speed_multiplier(ctx.settings.crouched_max_speed_multiplier);
        ctx.settings.max_speed *= multiplier;
        ctx.component.set_half_height(self.half_height(ctx.settings.crouched_half_height));
    }

    fn on_end(&mut self, ctx: &mut ModifierContext<'_>) {
        let multiplier = self.speed_multiplier(ctx.settings.crouched_max_speed_multiplier);
        if multiplier > f32::EPSILON {
            ctx.settings.max_speed /= multiplier;
        } else {
            warn!("Stance {:?} ended with a zero speed multiplier; max speed left unchanged", self.stance);
        }
        ctx.component.set_half_height(ctx.settings.standing_half_height);
    }
}
