use nalgebra::Vector3;
use tracing::*;

use crate::error::ScuttleResult;
use crate::hexapod::Hexapod;

// angular rate above which the robot is considered to be moving, deg/s
const GYRO_ACTIVITY_THRESHOLD: f32 = 5.0;
// fraction of the previous compensation kept when decaying back to level
const COMPENSATION_DECAY: f32 = 0.8;
// tilt below which the decay path is taken, degrees
const LEVEL_TILT_THRESHOLD: f32 = 1.0;

/// Inertial measurement source for balance compensation.
///
/// Acceleration in g, angular rate in deg/s, both in the robot frame
/// (+X right, +Y forward, +Z up).
pub trait InertialSensor: Send {
    fn read_acceleration(&mut self) -> ScuttleResult<Vector3<f32>>;

    fn read_angular_rate(&mut self) -> ScuttleResult<Vector3<f32>>;
}

/// IMU driven body pose correction.
///
/// Each `update` reads the sensor, derives roll and pitch from gravity and
/// counteracts the measured tilt with a proportional, clamped `move_body`
/// command. When the robot is level and still, the previous compensation
/// decays back toward zero instead.
pub struct BalanceCompensator {
    compensation_factor: f32,
    min_movement_threshold: f32,
    max_compensation_angle: f32,
    last_compensation: (f32, f32, f32),
}

impl Default for BalanceCompensator {
    fn default() -> Self {
        BalanceCompensator::new(0.1, 0.5, 5.0)
    }
}

impl BalanceCompensator {
    /// `compensation_factor` scales measured tilt to commanded correction,
    /// `min_movement_threshold` is the smallest tilt (degrees) worth acting
    /// on and `max_compensation_angle` clamps the commanded correction.
    pub fn new(
        compensation_factor: f32,
        min_movement_threshold: f32,
        max_compensation_angle: f32,
    ) -> Self {
        BalanceCompensator {
            compensation_factor,
            min_movement_threshold,
            max_compensation_angle,
            last_compensation: (0.0, 0.0, 0.0),
        }
    }

    pub fn last_compensation(&self) -> (f32, f32, f32) {
        self.last_compensation
    }

    /// Tilt angles from the gravity vector, in radians. Yaw is not
    /// observable from the accelerometer and stays zero.
    fn tilt_from_acceleration(acceleration: Vector3<f32>) -> (f32, f32) {
        let roll = acceleration.y.atan2(acceleration.z);
        let pitch = (-acceleration.x).atan2(acceleration.y.hypot(acceleration.z));
        (roll, pitch)
    }

    /// Run one compensation step against the current IMU sample.
    pub fn update(
        &mut self,
        hexapod: &mut Hexapod,
        sensor: &mut dyn InertialSensor,
    ) -> ScuttleResult<()> {
        let acceleration = sensor.read_acceleration()?;
        let (roll, pitch) = Self::tilt_from_acceleration(acceleration);

        let clamp = self.max_compensation_angle;
        let roll_deg = (roll.to_degrees() * self.compensation_factor).clamp(-clamp, clamp);
        let pitch_deg = (pitch.to_degrees() * self.compensation_factor).clamp(-clamp, clamp);

        let angular_rate = sensor.read_angular_rate()?;
        let gyro_magnitude = angular_rate.norm();

        let level_and_still = roll_deg.abs() < LEVEL_TILT_THRESHOLD
            && pitch_deg.abs() < LEVEL_TILT_THRESHOLD
            && gyro_magnitude < GYRO_ACTIVITY_THRESHOLD;

        if level_and_still {
            if self.last_compensation == (0.0, 0.0, 0.0) {
                return Ok(());
            }
            let target_roll = self.last_compensation.0 * COMPENSATION_DECAY;
            let target_pitch = self.last_compensation.1 * COMPENSATION_DECAY;
            debug!(target_roll, target_pitch, "decaying toward level");
            self.apply(hexapod, target_roll, target_pitch, 0.0)?;
        } else if roll_deg.abs() > self.min_movement_threshold
            || pitch_deg.abs() > self.min_movement_threshold
            || gyro_magnitude > GYRO_ACTIVITY_THRESHOLD
        {
            debug!(roll_deg, pitch_deg, "applying balance compensation");
            self.apply(hexapod, roll_deg, pitch_deg, 0.0)?;
        }
        Ok(())
    }

    fn apply(
        &mut self,
        hexapod: &mut Hexapod,
        roll: f32,
        pitch: f32,
        yaw: f32,
    ) -> ScuttleResult<()> {
        match hexapod.move_body(0.0, 0.0, 0.0, roll, pitch, yaw) {
            Ok(()) => {
                self.last_compensation = (roll, pitch, yaw);
                Ok(())
            }
            Err(error) => {
                warn!(%error, "compensation move rejected, restoring last pose");
                let (last_roll, last_pitch, last_yaw) = self.last_compensation;
                if let Err(recovery_error) =
                    hexapod.move_body(0.0, 0.0, 0.0, last_roll, last_pitch, last_yaw)
                {
                    error!(%recovery_error, "failed to restore last compensation");
                }
                Err(error)
            }
        }
    }
}
