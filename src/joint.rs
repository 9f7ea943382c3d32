use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ScuttleError, ScuttleResult};
use crate::scuttle_config::JointParams;
use crate::servo_controller::ServoController;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JointName {
    Coxa,
    Femur,
    Tibia,
}

impl fmt::Display for JointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JointName::Coxa => write!(f, "coxa"),
            JointName::Femur => write!(f, "femur"),
            JointName::Tibia => write!(f, "tibia"),
        }
    }
}

/// One servo driven joint.
///
/// The angle to servo-count mapping is affine between the hard angle limits
/// and the calibrated servo endpoints. Soft limits narrow the usable range
/// per robot without touching the mapping itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    name: JointName,
    leg_index: usize,
    length: f32,
    channel: u8,
    angle_min: f32,
    angle_max: f32,
    angle_limit_min: Option<f32>,
    angle_limit_max: Option<f32>,
    servo_min: u16,
    servo_max: u16,
    invert: bool,
}

impl Joint {
    pub fn new(
        name: JointName,
        leg_index: usize,
        params: &JointParams,
        channel: u8,
    ) -> ScuttleResult<Self> {
        if params.angle_min >= params.angle_max {
            return Err(ScuttleError::ConfigError(format!(
                "leg {} {} angle_min {} must be below angle_max {}",
                leg_index, name, params.angle_min, params.angle_max
            )));
        }
        if params.servo_min >= params.servo_max {
            return Err(ScuttleError::ConfigError(format!(
                "leg {} {} servo_min {} must be below servo_max {}",
                leg_index, name, params.servo_min, params.servo_max
            )));
        }
        Ok(Joint {
            name,
            leg_index,
            length: params.length,
            channel,
            angle_min: params.angle_min,
            angle_max: params.angle_max,
            angle_limit_min: params.angle_limit_min,
            angle_limit_max: params.angle_limit_max,
            servo_min: params.servo_min,
            servo_max: params.servo_max,
            invert: params.invert,
        })
    }

    pub fn name(&self) -> JointName {
        self.name
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn servo_min(&self) -> u16 {
        self.servo_min
    }

    pub fn servo_max(&self) -> u16 {
        self.servo_max
    }

    /// Validate an angle against the hard limits, and against the calibrated
    /// soft limits when requested.
    pub fn validate_angle(&self, angle: f32, check_soft_limits: bool) -> ScuttleResult<()> {
        if angle < self.angle_min || angle > self.angle_max {
            return Err(ScuttleError::AngleOutOfHardLimit {
                leg_index: self.leg_index,
                joint: self.name,
                angle,
                min: self.angle_min,
                max: self.angle_max,
            });
        }
        if check_soft_limits {
            if let Some(limit) = self.angle_limit_min {
                if angle < limit {
                    return Err(ScuttleError::AngleOutOfSoftLimit {
                        leg_index: self.leg_index,
                        joint: self.name,
                        angle,
                        limit,
                    });
                }
            }
            if let Some(limit) = self.angle_limit_max {
                if angle > limit {
                    return Err(ScuttleError::AngleOutOfSoftLimit {
                        leg_index: self.leg_index,
                        joint: self.name,
                        angle,
                        limit,
                    });
                }
            }
        }
        Ok(())
    }

    /// Affine map from degrees to servo counts.
    ///
    /// Inverted joints negate the commanded angle before the mapping so the
    /// same kinematic convention works on mirrored servo mounts.
    pub fn angle_to_servo_target(&self, angle: f32) -> u16 {
        let angle = if self.invert { -angle } else { angle };
        let span = (self.servo_max - self.servo_min) as f32;
        let fraction = (angle - self.angle_min) / (self.angle_max - self.angle_min);
        (self.servo_min as f32 + fraction * span).round() as u16
    }

    /// Validate and command a single joint angle.
    pub fn set_angle(
        &self,
        controller: &mut dyn ServoController,
        angle: f32,
        check_soft_limits: bool,
    ) -> ScuttleResult<()> {
        self.validate_angle(angle, check_soft_limits)?;
        controller.set_target(self.channel, self.angle_to_servo_target(angle))
    }

    /// Replace the calibrated servo endpoints. Does not emit a command.
    pub fn update_calibration(&mut self, servo_min: u16, servo_max: u16) -> ScuttleResult<()> {
        if servo_min >= servo_max {
            return Err(ScuttleError::ConfigError(format!(
                "leg {} {} calibration servo_min {} must be below servo_max {}",
                self.leg_index, self.name, servo_min, servo_max
            )));
        }
        self.servo_min = servo_min;
        self.servo_max = servo_max;
        Ok(())
    }
}
