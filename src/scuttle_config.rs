use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ScuttleError, ScuttleResult};
use crate::gait::GaitParams;
use crate::servo_controller::{CONTROLLER_CHANNELS, SERVO_TARGET_MAX, SERVO_TARGET_MIN};

pub const ZERO_POSITION: &str = "zero";
pub const LOW_PROFILE_POSITION: &str = "low_profile";
pub const HIGH_PROFILE_POSITION: &str = "high_profile";

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct ControllerConfig {
    pub port: String,
    pub baud_rate: u32,
}

/// Parameters shared by the six instances of one joint type.
///
/// `z_offset` is only meaningful on the coxa (vertical pivot offset from the
/// leg base) and `x_offset` only on the tibia.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct JointParams {
    pub length: f32,
    pub angle_min: f32,
    pub angle_max: f32,
    #[serde(default)]
    pub angle_limit_min: Option<f32>,
    #[serde(default)]
    pub angle_limit_max: Option<f32>,
    pub servo_min: u16,
    pub servo_max: u16,
    #[serde(default)]
    pub invert: bool,
    #[serde(default)]
    pub z_offset: f32,
    #[serde(default)]
    pub x_offset: f32,
}

/// Gait parameters as they appear in the configuration file, with the dwell
/// time in seconds.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone, Copy)]
pub struct GaitParamsConfig {
    pub step_radius: f32,
    pub leg_lift_distance: f32,
    pub stance_height: f32,
    pub dwell_time: f32,
    #[serde(default)]
    pub use_full_circle_stance: bool,
}

impl GaitParamsConfig {
    pub fn to_params(self) -> GaitParams {
        GaitParams {
            step_radius: self.step_radius,
            leg_lift_distance: self.leg_lift_distance,
            stance_height: self.stance_height,
            dwell_time: Duration::from_secs_f32(self.dwell_time.max(0.0)),
            use_full_circle_stance: self.use_full_circle_stance,
        }
    }
}

/// Per movement mode gait parameter defaults.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone, Copy)]
pub struct GaitDefaults {
    pub translation: GaitParamsConfig,
    pub rotation: GaitParamsConfig,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct ScuttleConfig {
    pub hexagon_side_length: f32,
    pub controller: ControllerConfig,
    /// Servo speed as a percentage (1-100), 0 for unlimited.
    pub speed: u8,
    /// Servo acceleration as a percentage (1-100), 0 for unlimited.
    pub accel: u8,
    pub coxa_params: JointParams,
    pub femur_params: JointParams,
    pub tibia_params: JointParams,
    pub coxa_channel_map: [u8; 6],
    pub femur_channel_map: [u8; 6],
    pub tibia_channel_map: [u8; 6],
    pub end_effector_offset: [f32; 3],
    /// Leg index to LED index, consumed by the external light service.
    pub leg_to_led: [u8; 6],
    pub predefined_positions: BTreeMap<String, [[f32; 3]; 6]>,
    pub predefined_angle_positions: BTreeMap<String, [[f32; 3]; 6]>,
    pub gait: GaitDefaults,
}

impl ScuttleConfig {
    pub fn load(path: &Path) -> ScuttleResult<ScuttleConfig> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: ScuttleConfig = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ScuttleResult<()> {
        if self.hexagon_side_length <= 0.0 {
            return Err(ScuttleError::ConfigError(
                "hexagon_side_length must be positive".to_owned(),
            ));
        }
        if self.speed > 100 || self.accel > 100 {
            return Err(ScuttleError::ConfigError(
                "speed and accel are percentages (0-100)".to_owned(),
            ));
        }
        validate_joint("coxa", &self.coxa_params)?;
        validate_joint("femur", &self.femur_params)?;
        validate_joint("tibia", &self.tibia_params)?;
        self.validate_channel_maps()?;
        for name in [ZERO_POSITION, LOW_PROFILE_POSITION, HIGH_PROFILE_POSITION] {
            if !self.predefined_positions.contains_key(name) {
                return Err(ScuttleError::ConfigError(format!(
                    "predefined_positions missing '{name}'"
                )));
            }
            if !self.predefined_angle_positions.contains_key(name) {
                return Err(ScuttleError::ConfigError(format!(
                    "predefined_angle_positions missing '{name}'"
                )));
            }
        }
        for params in [&self.gait.translation, &self.gait.rotation] {
            if params.step_radius <= 0.0 {
                return Err(ScuttleError::ConfigError(
                    "gait step_radius must be positive".to_owned(),
                ));
            }
            if params.leg_lift_distance < 0.0 || params.dwell_time < 0.0 {
                return Err(ScuttleError::ConfigError(
                    "gait leg_lift_distance and dwell_time must not be negative".to_owned(),
                ));
            }
        }
        Ok(())
    }

    fn validate_channel_maps(&self) -> ScuttleResult<()> {
        let mut seen = [false; CONTROLLER_CHANNELS as usize];
        let all_channels = self
            .coxa_channel_map
            .iter()
            .chain(self.femur_channel_map.iter())
            .chain(self.tibia_channel_map.iter());
        for &channel in all_channels {
            if channel >= CONTROLLER_CHANNELS {
                return Err(ScuttleError::ConfigError(format!(
                    "channel {channel} outside controller range 0-{}",
                    CONTROLLER_CHANNELS - 1
                )));
            }
            if seen[channel as usize] {
                return Err(ScuttleError::ConfigError(format!(
                    "channel {channel} assigned twice"
                )));
            }
            seen[channel as usize] = true;
        }
        Ok(())
    }
}

fn validate_joint(name: &str, params: &JointParams) -> ScuttleResult<()> {
    if params.length < 0.0 {
        return Err(ScuttleError::ConfigError(format!(
            "{name} length must not be negative"
        )));
    }
    if params.angle_min >= params.angle_max {
        return Err(ScuttleError::ConfigError(format!(
            "{name} angle_min must be below angle_max"
        )));
    }
    if params.servo_min >= params.servo_max {
        return Err(ScuttleError::ConfigError(format!(
            "{name} servo_min must be below servo_max"
        )));
    }
    if params.servo_min < SERVO_TARGET_MIN || params.servo_max > SERVO_TARGET_MAX {
        return Err(ScuttleError::ConfigError(format!(
            "{name} servo endpoints outside valid range {SERVO_TARGET_MIN}-{SERVO_TARGET_MAX}"
        )));
    }
    if let (Some(min), Some(max)) = (params.angle_limit_min, params.angle_limit_max) {
        if min >= max {
            return Err(ScuttleError::ConfigError(format!(
                "{name} angle_limit_min must be below angle_limit_max"
            )));
        }
    }
    Ok(())
}

impl Default for ScuttleConfig {
    fn default() -> Self {
        let mut predefined_positions = BTreeMap::new();
        predefined_positions.insert(ZERO_POSITION.to_owned(), [[0.0, 0.0, 0.0]; 6]);
        predefined_positions.insert(LOW_PROFILE_POSITION.to_owned(), [[0.0, 0.0, 30.0]; 6]);
        predefined_positions.insert(HIGH_PROFILE_POSITION.to_owned(), [[0.0, 0.0, -30.0]; 6]);

        let mut predefined_angle_positions = BTreeMap::new();
        predefined_angle_positions.insert(ZERO_POSITION.to_owned(), [[0.0, 0.0, 0.0]; 6]);
        predefined_angle_positions.insert(LOW_PROFILE_POSITION.to_owned(), [[0.0, 35.0, -30.0]; 6]);
        predefined_angle_positions
            .insert(HIGH_PROFILE_POSITION.to_owned(), [[0.0, -35.0, 40.0]; 6]);

        ScuttleConfig {
            hexagon_side_length: 137.0,
            controller: ControllerConfig {
                port: "/dev/ttyS0".to_owned(),
                baud_rate: 9600,
            },
            speed: 25,
            accel: 10,
            coxa_params: JointParams {
                length: 27.5,
                angle_min: -45.0,
                angle_max: 45.0,
                angle_limit_min: None,
                angle_limit_max: None,
                servo_min: 3968,
                servo_max: 8000,
                invert: false,
                z_offset: 0.0,
                x_offset: 0.0,
            },
            femur_params: JointParams {
                length: 52.5,
                angle_min: -60.0,
                angle_max: 90.0,
                angle_limit_min: None,
                angle_limit_max: None,
                servo_min: 3968,
                servo_max: 8000,
                invert: false,
                z_offset: 0.0,
                x_offset: 0.0,
            },
            tibia_params: JointParams {
                length: 140.0,
                angle_min: -60.0,
                angle_max: 90.0,
                angle_limit_min: None,
                angle_limit_max: None,
                servo_min: 3968,
                servo_max: 8000,
                invert: false,
                z_offset: 0.0,
                x_offset: 0.0,
            },
            coxa_channel_map: [0, 3, 6, 9, 12, 15],
            femur_channel_map: [1, 4, 7, 10, 13, 16],
            tibia_channel_map: [2, 5, 8, 11, 14, 17],
            end_effector_offset: [0.0, 80.0, -140.0],
            leg_to_led: [0, 2, 4, 6, 8, 10],
            predefined_positions,
            predefined_angle_positions,
            gait: GaitDefaults {
                translation: GaitParamsConfig {
                    step_radius: 30.0,
                    leg_lift_distance: 20.0,
                    stance_height: 0.0,
                    dwell_time: 0.5,
                    use_full_circle_stance: false,
                },
                rotation: GaitParamsConfig {
                    step_radius: 25.0,
                    leg_lift_distance: 15.0,
                    stance_height: 0.0,
                    dwell_time: 0.4,
                    use_full_circle_stance: false,
                },
            },
        }
    }
}
