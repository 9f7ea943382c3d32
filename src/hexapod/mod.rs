use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use nalgebra::{Matrix3, Point3, Rotation3, Vector3};
use tracing::*;

use crate::calibration::{CalibrationData, JointCalibration, LegCalibration};
use crate::error::{ScuttleError, ScuttleResult};
use crate::joint::JointName;
use crate::leg::{JointAngles, Leg};
use crate::scuttle_config::{
    GaitDefaults, ScuttleConfig, HIGH_PROFILE_POSITION, LOW_PROFILE_POSITION, ZERO_POSITION,
};
use crate::servo_controller::{ServoController, CONTROLLER_CHANNELS};
use crate::utilities::{map_range, round_to_hundredth};

const MOTION_POLL_INTERVAL: Duration = Duration::from_millis(200);
const MOTION_START_TIMEOUT: Duration = Duration::from_secs(1);
const DEACTIVATION_DELAY: Duration = Duration::from_secs(2);

/// Named whole-body poses used as canonical task start and end points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredefinedPosition {
    Zero,
    LowProfile,
    HighProfile,
}

impl PredefinedPosition {
    pub fn key(&self) -> &'static str {
        match self {
            PredefinedPosition::Zero => ZERO_POSITION,
            PredefinedPosition::LowProfile => LOW_PROFILE_POSITION,
            PredefinedPosition::HighProfile => HIGH_PROFILE_POSITION,
        }
    }
}

/// The hexapod body: six legs on a regular hexagon plus the servo
/// controller driving them.
///
/// `current_leg_positions` and `current_leg_angles` are kept kinematically
/// consistent after every mutating operation; whichever side a command path
/// updates, the other is restored through the matching kinematics.
pub struct Hexapod {
    controller: Box<dyn ServoController>,
    legs: [Leg; 6],
    /// Mounting azimuths in radians: 0°, 60°, ... 300° from robot +X.
    leg_mount_angles: [f32; 6],
    hexagon_side_length: f32,
    end_effector_radius: f32,
    speed: u8,
    accel: u8,
    leg_to_led: [u8; 6],
    predefined_positions: BTreeMap<String, [Point3<f32>; 6]>,
    predefined_angle_positions: BTreeMap<String, [JointAngles; 6]>,
    gait_defaults: GaitDefaults,
    current_leg_positions: [Point3<f32>; 6],
    current_leg_angles: [JointAngles; 6],
}

impl Hexapod {
    pub fn new(config: ScuttleConfig, controller: Box<dyn ServoController>) -> ScuttleResult<Self> {
        config.validate()?;

        let end_effector_offset = Vector3::new(
            config.end_effector_offset[0],
            config.end_effector_offset[1],
            config.end_effector_offset[2],
        );
        let mut legs = Vec::with_capacity(6);
        for i in 0..6 {
            legs.push(Leg::new(
                i,
                &config.coxa_params,
                &config.femur_params,
                &config.tibia_params,
                (
                    config.coxa_channel_map[i],
                    config.femur_channel_map[i],
                    config.tibia_channel_map[i],
                ),
                end_effector_offset,
            )?);
        }
        let legs: [Leg; 6] = legs
            .try_into()
            .map_err(|_| ScuttleError::ConfigError("expected six legs".to_owned()))?;

        let leg_mount_angles =
            core::array::from_fn(|i| (i as f32 * 60.0).to_radians());

        let predefined_positions: BTreeMap<String, [Point3<f32>; 6]> = config
            .predefined_positions
            .iter()
            .map(|(name, positions)| {
                let points =
                    core::array::from_fn(|i| Point3::from(Vector3::from(positions[i])));
                (name.clone(), points)
            })
            .collect();
        let predefined_angle_positions: BTreeMap<String, [JointAngles; 6]> = config
            .predefined_angle_positions
            .iter()
            .map(|(name, angles)| {
                let triples = core::array::from_fn(|i| {
                    JointAngles::new(angles[i][0], angles[i][1], angles[i][2])
                });
                (name.clone(), triples)
            })
            .collect();

        // initial cached state is the low profile pose, positions derived
        // from the angles so both caches agree from the start
        let initial_angles = predefined_angle_positions[LOW_PROFILE_POSITION];
        let mut initial_positions = [Point3::origin(); 6];
        for (i, leg) in legs.iter().enumerate() {
            initial_positions[i] = leg.forward_kinematics(initial_angles[i])?;
        }

        let end_effector_radius = config.hexagon_side_length
            + config.coxa_params.length
            + config.femur_params.length;

        let mut hexapod = Hexapod {
            controller,
            legs,
            leg_mount_angles,
            hexagon_side_length: config.hexagon_side_length,
            end_effector_radius,
            speed: config.speed,
            accel: config.accel,
            leg_to_led: config.leg_to_led,
            predefined_positions,
            predefined_angle_positions,
            gait_defaults: config.gait,
            current_leg_positions: initial_positions,
            current_leg_angles: initial_angles,
        };
        hexapod.set_all_servos_speed(hexapod.speed)?;
        hexapod.set_all_servos_accel(hexapod.accel)?;
        info!("Hexapod initialized");
        Ok(hexapod)
    }

    pub fn legs(&self) -> &[Leg; 6] {
        &self.legs
    }

    pub fn leg_mount_angles(&self) -> &[f32; 6] {
        &self.leg_mount_angles
    }

    pub fn hexagon_side_length(&self) -> f32 {
        self.hexagon_side_length
    }

    /// Distance from body center to the foot with coxa and femur extended
    /// horizontally.
    pub fn end_effector_radius(&self) -> f32 {
        self.end_effector_radius
    }

    pub fn leg_to_led(&self) -> &[u8; 6] {
        &self.leg_to_led
    }

    pub fn gait_defaults(&self) -> &GaitDefaults {
        &self.gait_defaults
    }

    pub fn current_leg_positions(&self) -> &[Point3<f32>; 6] {
        &self.current_leg_positions
    }

    pub fn current_leg_angles(&self) -> &[JointAngles; 6] {
        &self.current_leg_angles
    }

    fn used_channels(&self) -> Vec<u8> {
        let mut channels = Vec::with_capacity(18);
        for leg in &self.legs {
            channels.push(leg.coxa().channel());
            channels.push(leg.femur().channel());
            channels.push(leg.tibia().channel());
        }
        channels
    }

    /// Full channel-space target list for an atomic whole-body write:
    /// every leg channel with its computed target, every unused channel
    /// zeroed, sorted ascending.
    fn servo_targets(&self, angles: &[JointAngles; 6]) -> Vec<(u8, u16)> {
        let mut targets = Vec::with_capacity(CONTROLLER_CHANNELS as usize);
        for (leg, leg_angles) in self.legs.iter().zip(angles.iter()) {
            targets.push((
                leg.coxa().channel(),
                leg.coxa().angle_to_servo_target(leg_angles.coxa),
            ));
            targets.push((
                leg.femur().channel(),
                leg.femur().angle_to_servo_target(leg_angles.femur),
            ));
            targets.push((
                leg.tibia().channel(),
                leg.tibia().angle_to_servo_target(leg_angles.tibia),
            ));
        }
        let used = self.used_channels();
        for channel in 0..CONTROLLER_CHANNELS {
            if !used.contains(&channel) {
                targets.push((channel, 0));
            }
        }
        targets.sort_by_key(|(channel, _)| *channel);
        targets
    }

    /// Move one leg to a position in its local frame.
    pub fn move_leg(
        &mut self,
        leg_index: usize,
        target: Point3<f32>,
        check_soft_limits: bool,
    ) -> ScuttleResult<()> {
        let angles =
            self.legs[leg_index].move_to(self.controller.as_mut(), target, check_soft_limits)?;
        self.current_leg_positions[leg_index] = target;
        self.current_leg_angles[leg_index] = angles;
        debug!(leg = leg_index, ?target, "leg moved");
        Ok(())
    }

    /// Move one leg to explicit joint angles.
    pub fn move_leg_angles(
        &mut self,
        leg_index: usize,
        angles: JointAngles,
        check_soft_limits: bool,
    ) -> ScuttleResult<()> {
        self.legs[leg_index].move_to_angles(self.controller.as_mut(), angles, check_soft_limits)?;
        self.current_leg_angles[leg_index] = angles;
        self.current_leg_positions[leg_index] = self.legs[leg_index].forward_kinematics(angles)?;
        Ok(())
    }

    /// Move all six legs in one atomic controller write.
    ///
    /// All eighteen angles are validated against hard limits before any
    /// command is issued; a rejected move leaves servos and cached state
    /// untouched.
    pub fn move_all_legs(&mut self, positions: &[Point3<f32>; 6]) -> ScuttleResult<()> {
        let mut angles = [JointAngles::default(); 6];
        for (i, (leg, target)) in self.legs.iter().zip(positions.iter()).enumerate() {
            angles[i] = leg.inverse_kinematics(*target)?;
        }
        for (leg, leg_angles) in self.legs.iter().zip(angles.iter()) {
            leg.validate_angles(*leg_angles, false)?;
        }

        let targets = self.servo_targets(&angles);
        self.controller.set_multiple_targets(&targets)?;

        self.current_leg_positions = *positions;
        // angles recomputed from the committed positions keep both caches
        // consistent
        self.current_leg_angles = angles;
        trace!("all legs moved");
        Ok(())
    }

    /// Angle-space twin of `move_all_legs` with the same atomicity contract.
    pub fn move_all_legs_angles(&mut self, angles: &[JointAngles; 6]) -> ScuttleResult<()> {
        for (leg, leg_angles) in self.legs.iter().zip(angles.iter()) {
            leg.validate_angles(*leg_angles, false)?;
        }

        let targets = self.servo_targets(angles);
        self.controller.set_multiple_targets(&targets)?;

        self.current_leg_angles = *angles;
        self.sync_positions_from_angles()?;
        Ok(())
    }

    /// Move the body while keeping the feet planted.
    ///
    /// Translation in mm, rotation in degrees. Computes per-leg deltas via
    /// the body-to-world transform, rotates them into each leg's local frame
    /// and commits the result atomically.
    pub fn move_body(
        &mut self,
        tx: f32,
        ty: f32,
        tz: f32,
        roll: f32,
        pitch: f32,
        yaw: f32,
    ) -> ScuttleResult<()> {
        debug!(tx, ty, tz, roll, pitch, yaw, "moving body");
        let body_deltas = self.body_inverse_kinematics(tx, ty, tz, roll, pitch, yaw);
        let local_deltas = self.body_to_leg_frame_deltas(&body_deltas);

        let targets = core::array::from_fn(|i| self.current_leg_positions[i] + local_deltas[i]);
        self.move_all_legs(&targets)
    }

    /// How far each nominal foot must move in the body frame so the feet
    /// stay fixed in world space under the commanded pose change.
    ///
    /// In this frame (+X right, +Y forward, +Z up) roll is about +X, pitch
    /// about +Y and yaw about +Z. The rotation helper takes its Euler angles
    /// in x, y, z order, so pitch is fed to the x slot and negated roll to
    /// the y slot; translation is inverted because the feet move opposite to
    /// the body.
    fn body_inverse_kinematics(
        &self,
        tx: f32,
        ty: f32,
        tz: f32,
        roll: f32,
        pitch: f32,
        yaw: f32,
    ) -> [Vector3<f32>; 6] {
        let rotation = Rotation3::from_euler_angles(
            pitch.to_radians(),
            (-roll).to_radians(),
            yaw.to_radians(),
        );
        let translation = Vector3::new(-tx, -ty, -tz);

        core::array::from_fn(|i| {
            let theta = self.leg_mount_angles[i];
            let nominal = Point3::new(
                self.end_effector_radius * theta.cos(),
                self.end_effector_radius * theta.sin(),
                -self.legs[i].tibia().length(),
            );
            let transformed = rotation * nominal + translation;
            let delta = transformed - nominal;
            Vector3::new(
                round_to_hundredth(delta.x),
                round_to_hundredth(delta.y),
                round_to_hundredth(delta.z),
            )
        })
    }

    /// Rotate body-frame deltas into each leg's local frame, which is turned
    /// so local +Y points along the leg's outward radial.
    fn body_to_leg_frame_deltas(&self, body_deltas: &[Vector3<f32>; 6]) -> [Vector3<f32>; 6] {
        core::array::from_fn(|i| {
            let theta = self.leg_mount_angles[i];
            let frame = Matrix3::new(
                theta.sin(),
                -theta.cos(),
                0.0,
                theta.cos(),
                theta.sin(),
                0.0,
                0.0,
                0.0,
                1.0,
            );
            let local = frame * body_deltas[i];
            Vector3::new(
                round_to_hundredth(local.x),
                round_to_hundredth(local.y),
                round_to_hundredth(local.z),
            )
        })
    }

    pub fn move_to_position(&mut self, position: PredefinedPosition) -> ScuttleResult<()> {
        info!("Setting all legs to position '{}'", position.key());
        let positions = *self
            .predefined_positions
            .get(position.key())
            .ok_or_else(|| {
                ScuttleError::ConfigError(format!("unknown position '{}'", position.key()))
            })?;
        self.move_all_legs(&positions)
    }

    pub fn move_to_angles_position(&mut self, position: PredefinedPosition) -> ScuttleResult<()> {
        info!("Setting all legs to angles position '{}'", position.key());
        let angles = *self
            .predefined_angle_positions
            .get(position.key())
            .ok_or_else(|| {
                ScuttleError::ConfigError(format!("unknown angles position '{}'", position.key()))
            })?;
        self.move_all_legs_angles(&angles)
    }

    /// Set speed for all leg servos. 1-100 percent, 0 for unlimited.
    pub fn set_all_servos_speed(&mut self, speed: u8) -> ScuttleResult<()> {
        let counts = if speed == 0 {
            warn!("Setting all servos speed to: unlimited");
            0
        } else {
            info!("Setting all servos speed to: {speed}%");
            map_range(speed as i32, 1, 100, 1, 255) as u16
        };
        for channel in self.used_channels() {
            self.controller.set_speed(channel, counts)?;
        }
        self.speed = speed;
        Ok(())
    }

    /// Set acceleration for all leg servos. 1-100 percent, 0 for unlimited.
    pub fn set_all_servos_accel(&mut self, accel: u8) -> ScuttleResult<()> {
        let counts = if accel == 0 {
            warn!("Setting all servos acceleration to: unlimited");
            0
        } else {
            info!("Setting all servos acceleration to: {accel}%");
            map_range(accel as i32, 1, 100, 1, 255) as u16
        };
        for channel in self.used_channels() {
            self.controller.set_acceleration(channel, counts)?;
        }
        self.accel = accel;
        Ok(())
    }

    /// Switch every servo off by writing a zero target to the full channel
    /// space, after a grace delay so the body settles first.
    pub fn deactivate_all_servos(&mut self) -> ScuttleResult<()> {
        info!("Deactivating all servos");
        std::thread::sleep(DEACTIVATION_DELAY);
        let targets: Vec<(u8, u16)> = (0..CONTROLLER_CHANNELS).map(|ch| (ch, 0)).collect();
        self.controller.set_multiple_targets(&targets)?;
        info!("All servos deactivated");
        Ok(())
    }

    pub fn get_moving_state(&mut self) -> ScuttleResult<bool> {
        self.controller.get_moving_state()
    }

    /// Block until all servos report motion complete.
    ///
    /// Waits up to a second for motion to start (the controller reports over
    /// UART with some delay), then polls until movement stops or the stop
    /// event is set.
    pub fn wait_until_motion_complete(
        &mut self,
        stop_event: Option<&AtomicBool>,
    ) -> ScuttleResult<()> {
        let stopped = |event: Option<&AtomicBool>| {
            event.map(|flag| flag.load(Ordering::SeqCst)).unwrap_or(false)
        };

        let start = Instant::now();
        while start.elapsed() < MOTION_START_TIMEOUT && !stopped(stop_event) {
            if self.get_moving_state()? {
                break;
            }
            std::thread::sleep(MOTION_POLL_INTERVAL);
        }

        while !stopped(stop_event) {
            if !self.get_moving_state()? {
                break;
            }
            std::thread::sleep(MOTION_POLL_INTERVAL);
        }
        Ok(())
    }

    /// Apply persisted calibration endpoints to the live joints.
    ///
    /// Invalid entries are rejected with a warning and the configured
    /// defaults kept.
    pub fn apply_calibration(&mut self, calibration: &CalibrationData) -> ScuttleResult<()> {
        for leg_index in 0..6 {
            let Some(leg_calibration) = calibration.leg(leg_index) else {
                continue;
            };
            let joints = [
                (JointName::Coxa, leg_calibration.coxa),
                (JointName::Femur, leg_calibration.femur),
                (JointName::Tibia, leg_calibration.tibia),
            ];
            for (name, joint_calibration) in joints {
                if joint_calibration.is_valid() {
                    self.legs[leg_index].joint_mut(name).update_calibration(
                        joint_calibration.servo_min,
                        joint_calibration.servo_max,
                    )?;
                } else {
                    warn!(
                        leg = leg_index,
                        joint = %name,
                        servo_min = joint_calibration.servo_min,
                        servo_max = joint_calibration.servo_max,
                        "rejecting out-of-range calibration, keeping defaults"
                    );
                }
            }
        }
        Ok(())
    }

    /// Current joint endpoints as a persistable calibration document.
    pub fn calibration_snapshot(&self) -> CalibrationData {
        let mut data = CalibrationData::default();
        for (leg_index, leg) in self.legs.iter().enumerate() {
            let snapshot = |joint: &crate::joint::Joint| JointCalibration {
                servo_min: joint.servo_min(),
                servo_max: joint.servo_max(),
            };
            data.set_leg(
                leg_index,
                LegCalibration {
                    coxa: snapshot(leg.coxa()),
                    femur: snapshot(leg.femur()),
                    tibia: snapshot(leg.tibia()),
                },
            );
        }
        data
    }

    fn sync_positions_from_angles(&mut self) -> ScuttleResult<()> {
        for (i, leg) in self.legs.iter().enumerate() {
            self.current_leg_positions[i] = leg.forward_kinematics(self.current_leg_angles[i])?;
        }
        Ok(())
    }
}
