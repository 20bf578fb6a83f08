//! Bundled layered moves

use std::any;

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::component::UpdatedComponent;
use crate::data::{MoverTickStartData, UpdatedMotionState};
use crate::layered_moves::base::{LayeredMove, LayeredMoveCore};
use crate::layered_moves::instanced::{
    InstancedMoveTiming, LayeredMoveInstancedData, LayeredMoveLogic, LayeredMoveLogicSettings,
};
use crate::move_library::RollbackBlackboard;
use crate::types::{project_onto_normal, MoveMixMode, MoverTimeStep, ProposedMove};

/// Fixed velocity, optionally forcing a mode on its first substep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchMove {
    pub core: LayeredMoveCore,
    pub launch_velocity: Vector3<f32>,
    pub force_movement_mode: Option<String>,
}

impl Default for LaunchMove {
    fn default() -> Self {
        Self {
            core: LayeredMoveCore::with_timing(MoveMixMode::OverrideVelocity, 0, 0.0),
            launch_velocity: Vector3::zeros(),
            force_movement_mode: None,
        }
    }
}

impl LaunchMove {
    pub fn new(launch_velocity: Vector3<f32>, duration_ms: f32) -> Self {
        let mut launch = Self { launch_velocity, ..Self::default() };
        launch.core.duration_ms = duration_ms;
        launch
    }
}

impl LayeredMove for LaunchMove {
    fn core(&self) -> &LayeredMoveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LayeredMoveCore {
        &mut self.core
    }

    fn generate_move(
        &mut self,
        _start_state: &MoverTickStartData,
        _time_step: &MoverTimeStep,
        _component: &dyn UpdatedComponent,
        _blackboard: &mut RollbackBlackboard,
        out: &mut ProposedMove,
    ) -> bool {
        out.mix_mode = self.core.mix_mode;
        out.linear_velocity = self.launch_velocity;
        out.preferred_mode = self.force_movement_mode.clone();
        true
    }
}

/// Constant velocity, optionally expressed in the actor's local frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearVelocityMove {
    pub core: LayeredMoveCore,
    pub velocity: Vector3<f32>,
    /// Rotate `velocity` by the orientation at the first substep, once
    pub velocity_start_relative: bool,
    /// Rotate `velocity` by the current orientation every substep
    pub velocity_always_relative: bool,
}

impl LinearVelocityMove {
    pub fn new(velocity: Vector3<f32>, mix_mode: MoveMixMode, duration_ms: f32) -> Self {
        Self { core: LayeredMoveCore::with_timing(mix_mode, 0, duration_ms), velocity, ..Self::default() }
    }
}

impl LayeredMove for LinearVelocityMove {
    fn core(&self) -> &LayeredMoveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LayeredMoveCore {
        &mut self.core
    }

    fn generate_move(
        &mut self,
        start_state: &MoverTickStartData,
        time_step: &MoverTimeStep,
        _component: &dyn UpdatedComponent,
        _blackboard: &mut RollbackBlackboard,
        out: &mut ProposedMove,
    ) -> bool {
        let Some(motion) = start_state.sync_state.collection.find::<UpdatedMotionState>() else {
            warn!("LinearVelocityMove needs an UpdatedMotionState in the sync state");
            return false;
        };

        if self.velocity_start_relative && self.core.start_sim_time_ms == time_step.base_sim_time_ms {
            self.velocity_start_relative = false;
            self.velocity = motion.orientation * self.velocity;
        }

        out.linear_velocity = if self.velocity_always_relative {
            motion.orientation * self.velocity
        } else {
            self.velocity
        };
        true
    }
}

/// Replaces the vertical velocity for its duration, keeping lateral velocity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JumpImpulseMove {
    pub core: LayeredMoveCore,
    /// units/s along the up direction
    pub upwards_speed: f32,
}

impl Default for JumpImpulseMove {
    fn default() -> Self {
        Self { core: LayeredMoveCore::with_timing(MoveMixMode::OverrideVelocity, 0, 100.0), upwards_speed: 0.0 }
    }
}

impl JumpImpulseMove {
    pub fn new(upwards_speed: f32) -> Self {
        Self { upwards_speed, ..Self::default() }
    }
}

impl LayeredMove for JumpImpulseMove {
    fn core(&self) -> &LayeredMoveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LayeredMoveCore {
        &mut self.core
    }

    fn generate_move(
        &mut self,
        start_state: &MoverTickStartData,
        _time_step: &MoverTimeStep,
        component: &dyn UpdatedComponent,
        _blackboard: &mut RollbackBlackboard,
        out: &mut ProposedMove,
    ) -> bool {
        if self.core.mix_mode != MoveMixMode::OverrideVelocity {
            warn!("JumpImpulseMove only supports OverrideVelocity mix mode; got {:?}", self.core.mix_mode);
            return false;
        }
        let prior_velocity = start_state
            .sync_state
            .collection
            .find::<UpdatedMotionState>()
            .map_or_else(Vector3::zeros, |m| m.velocity);

        let up = component.up_direction();
        let non_upwards = prior_velocity - project_onto_normal(&prior_velocity, &up);
        out.linear_velocity = non_upwards + up * self.upwards_speed;
        true
    }
}

/// Travel from `start_location` to `target_location` over the move's duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveToMove {
    pub core: LayeredMoveCore,
    pub start_location: Vector3<f32>,
    pub target_location: Vector3<f32>,
    /// Never outrun where the path expects the actor to be after a blocked substep
    pub restrict_speed_to_expected: bool,
}

/// Slack allowed over the expected speed, units/s.
const EXPECTED_SPEED_ALLOWANCE: f32 = 0.5;

impl Default for MoveToMove {
    fn default() -> Self {
        Self {
            core: LayeredMoveCore::with_timing(MoveMixMode::OverrideVelocity, 0, 1000.0),
            start_location: Vector3::zeros(),
            target_location: Vector3::zeros(),
            restrict_speed_to_expected: false,
        }
    }
}

impl MoveToMove {
    pub fn new(start_location: Vector3<f32>, target_location: Vector3<f32>, duration_ms: f32) -> Self {
        let mut move_to = Self { start_location, target_location, ..Self::default() };
        move_to.core.duration_ms = duration_ms;
        move_to
    }

    fn path_location(&self, sim_time_ms: f64) -> Vector3<f32> {
        let fraction = ((sim_time_ms - self.core.start_sim_time_ms) / f64::from(self.core.duration_ms)) as f32;
        self.start_location.lerp(&self.target_location, fraction)
    }
}

impl LayeredMove for MoveToMove {
    fn core(&self) -> &LayeredMoveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LayeredMoveCore {
        &mut self.core
    }

    fn generate_move(
        &mut self,
        _start_state: &MoverTickStartData,
        time_step: &MoverTimeStep,
        component: &dyn UpdatedComponent,
        _blackboard: &mut RollbackBlackboard,
        out: &mut ProposedMove,
    ) -> bool {
        let delta_secs = time_step.step_secs();
        if self.core.duration_ms <= 0.0 || delta_secs <= 0.0 {
            warn!("MoveToMove needs a positive duration and step; got {} ms", self.core.duration_ms);
            return false;
        }

        let path_target = self.path_location(time_step.base_sim_time_ms);
        let mut velocity = (path_target - component.location()) / delta_secs;

        if self.restrict_speed_to_expected && velocity.amax() > 1.0e-4 {
            let expected = self.path_location(time_step.base_sim_time_ms - f64::from(time_step.step_ms));
            let expected_speed = (path_target - expected).norm() / delta_secs;
            let max_speed = expected_speed + EXPECTED_SPEED_ALLOWANCE;
            if velocity.norm_squared() > max_speed * max_speed {
                velocity = velocity.normalize() * expected_speed;
            }
        }

        out.mix_mode = self.core.mix_mode;
        out.linear_velocity = velocity;
        true
    }
}

/// Jump shaped by distance and apex height instead of launch speed. Assumes +Z is up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JumpToMove {
    pub core: LayeredMoveCore,
    pub jump_distance: f32,
    /// Apex height; `< 0` keeps the unit parabola unscaled
    pub jump_height: f32,
    /// Jump along the actor's facing instead of `jump_rotation`
    pub use_actor_rotation: bool,
    /// Only the yaw is used
    pub jump_rotation: UnitQuaternion<f32>,
    /// Mode requested while airborne (default: "Falling")
    pub air_mode_name: String,
}

impl Default for JumpToMove {
    fn default() -> Self {
        Self {
            core: LayeredMoveCore::with_timing(MoveMixMode::OverrideVelocity, 0, 1000.0),
            jump_distance: 0.0,
            jump_height: 0.0,
            use_actor_rotation: true,
            jump_rotation: UnitQuaternion::identity(),
            air_mode_name: "Falling".to_string(),
        }
    }
}

impl JumpToMove {
    pub fn new(jump_distance: f32, jump_height: f32, duration_ms: f32) -> Self {
        let mut jump = Self { jump_distance, jump_height, ..Self::default() };
        jump.core.duration_ms = duration_ms;
        jump
    }

    /// Offset from the take-off point at `fraction` of the jump, in facing space.
    fn relative_location(&self, fraction: f32, facing: &UnitQuaternion<f32>) -> Vector3<f32> {
        let phi = 2.0 * fraction - 1.0;
        let mut height = 1.0 - phi * phi;
        if self.jump_height >= 0.0 {
            height *= self.jump_height;
        }
        facing * Vector3::new(fraction * self.jump_distance, 0.0, height)
    }
}

impl LayeredMove for JumpToMove {
    fn core(&self) -> &LayeredMoveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LayeredMoveCore {
        &mut self.core
    }

    fn generate_move(
        &mut self,
        start_state: &MoverTickStartData,
        time_step: &MoverTimeStep,
        _component: &dyn UpdatedComponent,
        _blackboard: &mut RollbackBlackboard,
        out: &mut ProposedMove,
    ) -> bool {
        let Some(motion) = start_state.sync_state.collection.find::<UpdatedMotionState>() else {
            warn!("JumpToMove needs an UpdatedMotionState in the sync state");
            return false;
        };
        let delta_secs = time_step.step_secs();
        if self.core.duration_ms <= 0.0 || delta_secs <= 0.0 {
            warn!("JumpToMove needs a positive duration and step; got {} ms", self.core.duration_ms);
            return false;
        }

        let duration_ms = f64::from(self.core.duration_ms);
        let mut current = ((time_step.base_sim_time_ms - self.core.start_sim_time_ms) / duration_ms) as f32;
        let mut target = current + time_step.step_ms / self.core.duration_ms;
        // Past the end, keep replaying the final slice so the landing velocity carries on
        if target > 1.0 {
            let overshoot = target - 1.0;
            current -= overshoot;
            target -= overshoot;
        }

        let rotation = if self.use_actor_rotation { motion.orientation } else { self.jump_rotation };
        let (_, _, yaw) = rotation.euler_angles();
        let facing = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), yaw);

        out.mix_mode = self.core.mix_mode;
        out.linear_velocity =
            (self.relative_location(target, &facing) - self.relative_location(current, &facing)) / delta_secs;
        out.preferred_mode = Some(self.air_mode_name.clone());
        true
    }
}

/// Push away from (or pull toward) a point for actors within `radius` of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadialImpulseMove {
    pub core: LayeredMoveCore,
    pub location: Vector3<f32>,
    pub radius: f32,
    /// units/s
    pub magnitude: f32,
    pub is_push: bool,
    /// Drop the component of the impulse along the up direction
    pub no_vertical_velocity: bool,
    /// Apply along this direction instead of the line to `location`
    pub fixed_world_direction: Option<Vector3<f32>>,
}

impl Default for RadialImpulseMove {
    fn default() -> Self {
        Self {
            core: LayeredMoveCore::with_timing(MoveMixMode::AdditiveVelocity, 0, 0.0),
            location: Vector3::zeros(),
            radius: 1.0,
            magnitude: 0.0,
            is_push: true,
            no_vertical_velocity: false,
            fixed_world_direction: None,
        }
    }
}

impl RadialImpulseMove {
    pub fn push(location: Vector3<f32>, radius: f32, magnitude: f32) -> Self {
        Self { location, radius, magnitude, ..Self::default() }
    }

    pub fn pull(location: Vector3<f32>, radius: f32, magnitude: f32) -> Self {
        Self { is_push: false, ..Self::push(location, radius, magnitude) }
    }
}

impl LayeredMove for RadialImpulseMove {
    fn core(&self) -> &LayeredMoveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut LayeredMoveCore {
        &mut self.core
    }

    fn generate_move(
        &mut self,
        start_state: &MoverTickStartData,
        _time_step: &MoverTimeStep,
        component: &dyn UpdatedComponent,
        _blackboard: &mut RollbackBlackboard,
        out: &mut ProposedMove,
    ) -> bool {
        let Some(motion) = start_state.sync_state.collection.find::<UpdatedMotionState>() else {
            warn!("RadialImpulseMove needs an UpdatedMotionState in the sync state");
            return false;
        };
        let to_center = self.location - motion.location;
        if to_center.norm() >= self.radius {
            return false;
        }

        let mut velocity = match self.fixed_world_direction {
            Some(direction) => direction.try_normalize(1.0e-6).unwrap_or_else(Vector3::zeros) * self.magnitude,
            None => {
                let pull = to_center.try_normalize(1.0e-6).unwrap_or_else(Vector3::zeros) * self.magnitude;
                if self.is_push {
                    -pull
                } else {
                    pull
                }
            }
        };
        if self.no_vertical_velocity {
            let up = component.up_direction();
            velocity -= project_onto_normal(&velocity, &up);
        }

        out.mix_mode = self.core.mix_mode;
        out.linear_velocity = velocity;
        true
    }
}

/// Activation data for [`LaunchMoveLogic`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchMoveData {
    pub timing: InstancedMoveTiming,
    pub launch_velocity: Vector3<f32>,
    pub force_movement_mode: Option<String>,
}

impl Default for LaunchMoveData {
    fn default() -> Self {
        Self { timing: InstancedMoveTiming::with_duration(0.0), launch_velocity: Vector3::zeros(), force_movement_mode: None }
    }
}

impl LaunchMoveData {
    pub fn new(launch_velocity: Vector3<f32>, duration_ms: f32) -> Self {
        Self { timing: InstancedMoveTiming::with_duration(duration_ms), launch_velocity, force_movement_mode: None }
    }
}

impl LayeredMoveInstancedData for LaunchMoveData {
    fn timing(&self) -> &InstancedMoveTiming {
        &self.timing
    }

    fn timing_mut(&mut self) -> &mut InstancedMoveTiming {
        &mut self.timing
    }
}

#[derive(Debug, Clone)]
pub struct LaunchMoveLogic {
    settings: LayeredMoveLogicSettings,
}

impl Default for LaunchMoveLogic {
    fn default() -> Self {
        Self::new(MoveMixMode::OverrideVelocity, 0)
    }
}

impl LaunchMoveLogic {
    pub fn new(mix_mode: MoveMixMode, priority: u8) -> Self {
        Self { settings: LayeredMoveLogicSettings { mix_mode, priority, ..LayeredMoveLogicSettings::default() } }
    }
}

impl LayeredMoveLogic for LaunchMoveLogic {
    fn settings(&self) -> &LayeredMoveLogicSettings {
        &self.settings
    }

    fn instanced_data_type_name(&self) -> &'static str {
        any::type_name::<LaunchMoveData>()
    }

    fn generate_move(
        &self,
        data: &mut dyn LayeredMoveInstancedData,
        _start_state: &MoverTickStartData,
        _time_step: &MoverTimeStep,
        _blackboard: &mut RollbackBlackboard,
        out: &mut ProposedMove,
    ) -> bool {
        let Some(launch) = data.downcast_ref::<LaunchMoveData>() else {
            warn!("LaunchMoveLogic executed with {} data", data.short_name());
            return false;
        };
        out.mix_mode = self.settings.mix_mode;
        out.linear_velocity = launch.launch_velocity;
        out.preferred_mode = launch.force_movement_mode.clone();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::KinematicBody;
    use nalgebra::UnitQuaternion;
    use std::f32::consts::{FRAC_1_SQRT_2, FRAC_PI_2};

    fn start_with(motion: UpdatedMotionState) -> MoverTickStartData {
        let mut start = MoverTickStartData::default();
        start.sync_state.collection.add_or_overwrite_data(Box::new(motion));
        start
    }

    #[test]
    fn test_launch_defaults_to_one_shot_override() {
        let launch = LaunchMove::default();
        assert_eq!(launch.core.mix_mode, MoveMixMode::OverrideVelocity);
        assert_eq!(launch.core.duration_ms, 0.0);
    }

    #[test]
    fn test_linear_velocity_start_relative_rotates_once() {
        let mut motion = UpdatedMotionState::default();
        motion.orientation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);
        let start = start_with(motion);
        let body = KinematicBody::default();
        let mut bb = RollbackBlackboard::new();

        let mut m = LinearVelocityMove::new(Vector3::new(100.0, 0.0, 0.0), MoveMixMode::AdditiveVelocity, -1.0);
        m.velocity_start_relative = true;
        m.core.start_sim_time_ms = 0.0;
        let mut out = ProposedMove::default();
        assert!(m.generate_move(&start, &MoverTimeStep::new(0.0, 16.0, 0), &body, &mut bb, &mut out));
        assert!((out.linear_velocity - Vector3::new(0.0, 100.0, 0.0)).norm() < 1e-3);
        assert!(!m.velocity_start_relative);
    }

    #[test]
    fn test_jump_impulse_keeps_lateral_velocity() {
        let mut motion = UpdatedMotionState::default();
        motion.velocity = Vector3::new(200.0, 0.0, -300.0);
        let start = start_with(motion);
        let body = KinematicBody::default();
        let mut bb = RollbackBlackboard::new();

        let mut jump = JumpImpulseMove::new(500.0);
        let mut out = ProposedMove::default();
        assert!(jump.generate_move(&start, &MoverTimeStep::new(0.0, 16.0, 0), &body, &mut bb, &mut out));
        assert_eq!(out.linear_velocity, Vector3::new(200.0, 0.0, 500.0));

        jump.core.mix_mode = MoveMixMode::AdditiveVelocity;
        assert!(!jump.generate_move(&start, &MoverTimeStep::new(0.0, 16.0, 0), &body, &mut bb, &mut out));
    }

    #[test]
    fn test_move_to_heads_for_path_point() {
        let start = start_with(UpdatedMotionState::default());
        let body = KinematicBody::default();
        let mut bb = RollbackBlackboard::new();

        let mut move_to = MoveToMove::new(Vector3::zeros(), Vector3::new(1000.0, 0.0, 0.0), 1000.0);
        move_to.core.start_sim_time_ms = 0.0;
        let mut out = ProposedMove::default();
        assert!(move_to.generate_move(&start, &MoverTimeStep::new(100.0, 100.0, 1), &body, &mut bb, &mut out));
        assert!((out.linear_velocity - Vector3::new(1000.0, 0.0, 0.0)).norm() < 1e-2);
        assert_eq!(out.mix_mode, MoveMixMode::OverrideVelocity);

        // Body stuck at the origin halfway through: catch up unless restricted
        let ts = MoverTimeStep::new(500.0, 100.0, 5);
        assert!(move_to.generate_move(&start, &ts, &body, &mut bb, &mut out));
        assert!((out.linear_velocity.x - 5000.0).abs() < 1e-1);

        move_to.restrict_speed_to_expected = true;
        assert!(move_to.generate_move(&start, &ts, &body, &mut bb, &mut out));
        assert!((out.linear_velocity - Vector3::new(1000.0, 0.0, 0.0)).norm() < 1e-1);
    }

    #[test]
    fn test_jump_to_follows_parabola_and_requests_air_mode() {
        let body = KinematicBody::default();
        let mut bb = RollbackBlackboard::new();
        let mut jump = JumpToMove::new(300.0, 100.0, 1000.0);
        jump.core.start_sim_time_ms = 0.0;

        let mut out = ProposedMove::default();
        let start = start_with(UpdatedMotionState::default());
        assert!(jump.generate_move(&start, &MoverTimeStep::new(0.0, 100.0, 0), &body, &mut bb, &mut out));
        // 10% of the way: 30 units forward, 36 units up
        assert!((out.linear_velocity - Vector3::new(300.0, 0.0, 360.0)).norm() < 1e-2);
        assert_eq!(out.preferred_mode.as_deref(), Some("Falling"));

        // Past the end the last slice repeats: descending
        assert!(jump.generate_move(&start, &MoverTimeStep::new(950.0, 100.0, 9), &body, &mut bb, &mut out));
        assert!((out.linear_velocity - Vector3::new(300.0, 0.0, -360.0)).norm() < 1e-2);

        let mut turned = UpdatedMotionState::default();
        turned.orientation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);
        let start = start_with(turned);
        assert!(jump.generate_move(&start, &MoverTimeStep::new(0.0, 100.0, 0), &body, &mut bb, &mut out));
        assert!((out.linear_velocity - Vector3::new(0.0, 300.0, 360.0)).norm() < 1e-2);

        jump.core.duration_ms = 0.0;
        assert!(!jump.generate_move(&start, &MoverTimeStep::new(0.0, 100.0, 0), &body, &mut bb, &mut out));
    }

    #[test]
    fn test_radial_impulse_pushes_pulls_and_respects_radius() {
        let start = start_with(UpdatedMotionState::default());
        let body = KinematicBody::default();
        let mut bb = RollbackBlackboard::new();
        let ts = MoverTimeStep::new(0.0, 16.0, 0);
        let mut out = ProposedMove::default();

        let mut push = RadialImpulseMove::push(Vector3::new(100.0, 0.0, 0.0), 200.0, 50.0);
        assert!(push.generate_move(&start, &ts, &body, &mut bb, &mut out));
        assert!((out.linear_velocity - Vector3::new(-50.0, 0.0, 0.0)).norm() < 1e-4);
        assert_eq!(out.mix_mode, MoveMixMode::AdditiveVelocity);

        let mut pull = RadialImpulseMove::pull(Vector3::new(100.0, 0.0, 100.0), 200.0, 50.0);
        pull.no_vertical_velocity = true;
        assert!(pull.generate_move(&start, &ts, &body, &mut bb, &mut out));
        assert!((out.linear_velocity - Vector3::new(50.0 * FRAC_1_SQRT_2, 0.0, 0.0)).norm() < 1e-3);

        let mut far = RadialImpulseMove::push(Vector3::new(100.0, 0.0, 0.0), 50.0, 50.0);
        assert!(!far.generate_move(&start, &ts, &body, &mut bb, &mut out));

        push.fixed_world_direction = Some(Vector3::new(0.0, 0.0, 2.0));
        assert!(push.generate_move(&start, &ts, &body, &mut bb, &mut out));
        assert!((out.linear_velocity - Vector3::new(0.0, 0.0, 50.0)).norm() < 1e-4);
    }
}
