//! Mover Scenario Runner
//!
//! Scenario file (JSON / YAML) → scripted ticks → report with a SHA256 of the
//! encoded final sync state. `verify_scenario` rolls back halfway, replays
//! the script and checks the digest is unchanged.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use nalgebra::Vector3;
use rayon::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use mover_core::component::KinematicBody;
use mover_core::config::{CommonMovementSettings, MoverSettings};
use mover_core::data::{CharacterDefaultInputs, MoveInputType, MoverInputCmd};
use mover_core::instant_effects::{ScheduledInstantMovementEffect, TeleportEffect};
use mover_core::layered_moves::{JumpImpulseMove, LaunchMove};
use mover_core::modifiers::{Stance, StanceModifier, CROUCH_TAG, PRONE_TAG};
use mover_core::types::GameplayTag;
use mover_core::MoverSimulation;

/// Scenario file
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Scenario {
    pub name: String,
    /// Number of ticks (default: 120)
    #[serde(default = "default_frames")]
    pub frames: u32,
    /// Tick length in ms (default: 16.667)
    #[serde(default = "default_step_ms")]
    pub step_ms: f32,
    /// Mode active on the first tick (default: "Falling")
    #[serde(default = "default_start_mode")]
    pub start_mode: String,
    #[serde(default)]
    pub start_location: [f32; 3],
    /// Walkable floor height; `None` means no floor
    #[serde(default)]
    pub floor_z: Option<f32>,
    /// Velocity input until the first `move_input` action
    #[serde(default)]
    pub move_input: [f32; 3],
    /// X offset between parallel actors (default: 0)
    #[serde(default)]
    pub actor_spacing: f32,
    /// Per-array cap used when hashing the sync state (default: 255)
    #[serde(default = "default_max_replicated_items")]
    pub max_replicated_items: u8,
    #[serde(default)]
    pub actions: Vec<ScriptedAction>,
}

fn default_frames() -> u32 {
    120
}

fn default_step_ms() -> f32 {
    1000.0 / 60.0
}

fn default_start_mode() -> String {
    "Falling".to_string()
}

fn default_max_replicated_items() -> u8 {
    u8::MAX
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScriptedAction {
    /// Frame the action is applied on, before that frame's tick
    pub frame: u32,
    pub action: Action,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Launch { velocity: [f32; 3], duration_ms: f32 },
    JumpImpulse { upwards_speed: f32 },
    Teleport { location: [f32; 3] },
    StanceOn { stance: StanceKind },
    StanceOff { stance: StanceKind },
    RequestMode {
        mode: String,
        #[serde(default)]
        reenter: bool,
    },
    /// Replaces the velocity input from this frame on
    MoveInput { velocity: [f32; 3] },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StanceKind {
    Crouch,
    Prone,
}

impl From<StanceKind> for Stance {
    fn from(kind: StanceKind) -> Self {
        match kind {
            StanceKind::Crouch => Stance::Crouch,
            StanceKind::Prone => Stance::Prone,
        }
    }
}

impl Scenario {
    pub fn validate(&self) -> Result<()> {
        if self.frames == 0 {
            bail!("Scenario '{}': frames must be > 0", self.name);
        }
        if !self.step_ms.is_finite() || self.step_ms <= 0.0 {
            bail!("Scenario '{}': step_ms must be a positive number, got {}", self.name, self.step_ms);
        }
        if self.start_mode.is_empty() {
            bail!("Scenario '{}': start_mode must not be empty", self.name);
        }
        if let Some(late) = self.actions.iter().find(|a| a.frame >= self.frames) {
            bail!(
                "Scenario '{}': action {:?} at frame {} is past the last frame ({})",
                self.name,
                late.action,
                late.frame,
                self.frames - 1
            );
        }
        Ok(())
    }

    /// Velocity input in effect on `frame`.
    pub fn input_at(&self, frame: u32) -> [f32; 3] {
        self.actions
            .iter()
            .filter(|a| a.frame <= frame)
            .fold(self.move_input, |current, a| match a.action {
                Action::MoveInput { velocity } => velocity,
                _ => current,
            })
    }
}

/// Load a scenario; `.yaml` / `.yml` are parsed as YAML, anything else as JSON.
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file: {}", path.display()))?;

    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    let scenario: Scenario = if is_yaml {
        serde_yaml::from_str(&text).with_context(|| format!("Failed to parse YAML: {}", path.display()))?
    } else {
        serde_json::from_str(&text).with_context(|| format!("Failed to parse JSON: {}", path.display()))?
    };

    scenario.validate()?;
    Ok(scenario)
}

/// Scenario file JSON schema (pretty printed)
pub fn scenario_schema() -> Result<String> {
    let schema = schemars::schema_for!(Scenario);
    Ok(serde_json::to_string_pretty(&schema)?)
}

// ========== Reports ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorReport {
    pub actor: usize,
    pub frames: u32,
    pub mode: String,
    pub location: [f32; 3],
    pub velocity: [f32; 3],
    pub active_layered_moves: usize,
    pub active_modifiers: usize,
    pub events: usize,
    /// SHA256 of the encoded final sync state (hex)
    pub sync_state_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub scenario: String,
    pub frames: u32,
    pub step_ms: f32,
    pub actors: Vec<ActorReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyReport {
    pub scenario: String,
    pub rollback_frame: u32,
    pub resimulated_frames: usize,
    pub expected_sha256: String,
    pub actual_sha256: String,
}

impl VerifyReport {
    pub fn is_match(&self) -> bool {
        self.expected_sha256 == self.actual_sha256
    }
}

// ========== Runner ==========

/// One actor stepping through a scenario.
struct ScenarioRunner<'a> {
    scenario: &'a Scenario,
    sim: MoverSimulation,
    events: usize,
}

impl<'a> ScenarioRunner<'a> {
    fn new(scenario: &'a Scenario, actor: usize) -> Result<Self> {
        let [x, y, z] = scenario.start_location;
        let location = Vector3::new(x + scenario.actor_spacing * actor as f32, y, z);
        let mut body = KinematicBody::new(location);
        if let Some(floor) = scenario.floor_z {
            body = body.with_floor(floor);
        }

        // Keep every frame so verify can roll back to any point
        let mut settings = MoverSettings::default();
        settings.state_history_len = settings.state_history_len.max(scenario.frames as usize);
        settings.max_replicated_items = scenario.max_replicated_items;

        let sim = MoverSimulation::new(settings, CommonMovementSettings::default(), body)?
            .with_kinematic_modes(&scenario.start_mode);

        Ok(Self { scenario, sim, events: 0 })
    }

    fn apply_actions(&self, frame: u32) {
        let sm = self.sim.state_machine();
        for scripted in self.scenario.actions.iter().filter(|a| a.frame == frame) {
            match &scripted.action {
                Action::Launch { velocity, duration_ms } => {
                    sm.queue_layered_move(Box::new(LaunchMove::new(Vector3::from(*velocity), *duration_ms)));
                }
                Action::JumpImpulse { upwards_speed } => {
                    sm.queue_layered_move(Box::new(JumpImpulseMove::new(*upwards_speed)));
                }
                Action::Teleport { location } => {
                    let effect = Box::new(TeleportEffect::new(Vector3::from(*location)));
                    sm.queue_instant_movement_effect(ScheduledInstantMovementEffect::immediate(effect));
                }
                Action::StanceOn { stance } => {
                    sm.queue_movement_modifier(Box::new(StanceModifier::new((*stance).into())));
                }
                Action::StanceOff { stance } => {
                    let tag = match stance {
                        StanceKind::Crouch => CROUCH_TAG,
                        StanceKind::Prone => PRONE_TAG,
                    };
                    sm.cancel_features_with_tag(GameplayTag::new(tag), true);
                }
                Action::RequestMode { mode, reenter } => sm.queue_next_mode(mode, *reenter),
                Action::MoveInput { .. } => {}
            }
        }
    }

    fn step(&mut self, frame: u32) {
        self.apply_actions(frame);

        let mut input = MoverInputCmd::default();
        if let Some(inputs) = input.collection.find_or_add::<CharacterDefaultInputs>() {
            inputs.set_move_input(MoveInputType::Velocity, Vector3::from(self.scenario.input_at(frame)));
        }

        self.sim.tick(self.scenario.step_ms, input);
        self.events += self.sim.take_events().len();
    }

    fn run_until(&mut self, end_frame: u32) {
        while self.sim.frame() < end_frame {
            self.step(self.sim.frame());
        }
    }

    fn digest(&self) -> Result<String> {
        let bytes = self.sim.sync_state_bytes()?;
        Ok(sha256_hex(&bytes))
    }

    fn report(&self, actor: usize) -> Result<ActorReport> {
        let (location, velocity) = self
            .sim
            .motion_state()
            .map(|m| (m.location, m.velocity))
            .unwrap_or_else(|| (self.sim.component().location, Vector3::zeros()));
        let state = self.sim.sync_state();

        Ok(ActorReport {
            actor,
            frames: self.sim.frame(),
            mode: state.movement_mode.clone(),
            location: location.into(),
            velocity: velocity.into(),
            active_layered_moves: state.layered_moves.num_active() + state.layered_move_instances.num_active(),
            active_modifiers: state.movement_modifiers.num_active(),
            events: self.events,
            sync_state_sha256: self.digest()?,
        })
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Run `actors` independent copies of the scenario in parallel.
pub fn run_scenario(scenario: &Scenario, actors: usize) -> Result<RunReport> {
    scenario.validate()?;
    if actors == 0 {
        bail!("At least one actor is required");
    }

    let reports = (0..actors)
        .into_par_iter()
        .map(|actor| {
            let mut runner = ScenarioRunner::new(scenario, actor)?;
            runner.run_until(scenario.frames);
            runner.report(actor)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RunReport {
        scenario: scenario.name.clone(),
        frames: scenario.frames,
        step_ms: scenario.step_ms,
        actors: reports,
    })
}

/// Run to the end, roll back to the halfway frame and replay the script.
pub fn verify_scenario(scenario: &Scenario) -> Result<VerifyReport> {
    scenario.validate()?;

    let mut runner = ScenarioRunner::new(scenario, 0)?;
    runner.run_until(scenario.frames);
    let expected_sha256 = runner.digest()?;

    let rollback_frame = scenario.frames / 2;
    let undone = runner
        .sim
        .rollback_to_frame(rollback_frame)
        .with_context(|| format!("Frame {} is no longer in the simulation history", rollback_frame))?;
    runner.run_until(scenario.frames);

    Ok(VerifyReport {
        scenario: scenario.name.clone(),
        rollback_frame,
        resimulated_frames: undone.len(),
        expected_sha256,
        actual_sha256: runner.digest()?,
    })
}
