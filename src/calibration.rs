use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::*;

use crate::error::ScuttleResult;
use crate::servo_controller::{SERVO_TARGET_MAX, SERVO_TARGET_MIN};

/// Calibrated servo endpoints for one joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JointCalibration {
    pub servo_min: u16,
    pub servo_max: u16,
}

impl JointCalibration {
    /// Endpoints must be ordered and inside the controller's target range.
    pub fn is_valid(&self) -> bool {
        self.servo_min < self.servo_max
            && self.servo_min >= SERVO_TARGET_MIN
            && self.servo_max <= SERVO_TARGET_MAX
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegCalibration {
    pub coxa: JointCalibration,
    pub femur: JointCalibration,
    pub tibia: JointCalibration,
}

/// Persisted servo calibration, keyed `leg_<n>.<joint>.servo_{min,max}` in
/// the stored JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CalibrationData {
    #[serde(flatten)]
    legs: BTreeMap<String, LegCalibration>,
}

fn leg_key(leg_index: usize) -> String {
    format!("leg_{leg_index}")
}

impl CalibrationData {
    pub fn load(path: &Path) -> ScuttleResult<CalibrationData> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let data: CalibrationData = serde_json::from_reader(reader)?;
        info!("Loaded calibration for {} legs", data.legs.len());
        Ok(data)
    }

    pub fn save(&self, path: &Path) -> ScuttleResult<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    pub fn leg(&self, leg_index: usize) -> Option<&LegCalibration> {
        self.legs.get(&leg_key(leg_index))
    }

    pub fn set_leg(&mut self, leg_index: usize, calibration: LegCalibration) {
        self.legs.insert(leg_key(leg_index), calibration);
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }
}
