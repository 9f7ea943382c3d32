use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::*;

use crate::error::{ScuttleError, ScuttleResult};
use crate::joint::{Joint, JointName};
use crate::scuttle_config::JointParams;
use crate::servo_controller::ServoController;
use crate::utilities::{clamped_acos, round_to_hundredth};

/// Angle offsets normalizing the "femur horizontal, tibia straight down"
/// reference pose to zero joint angles.
pub const FEMUR_ANGLE_OFFSET: f32 = -90.0;
pub const TIBIA_ANGLE_OFFSET: f32 = -90.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JointAngles {
    pub coxa: f32,
    pub femur: f32,
    pub tibia: f32,
}

impl JointAngles {
    pub fn new(coxa: f32, femur: f32, tibia: f32) -> Self {
        Self { coxa, femur, tibia }
    }
}

/// One leg of the hexapod.
///
/// Foot positions are expressed in the leg's local frame: the coxa pivot is
/// the origin, +Y points along the leg's neutral outward direction, +X right
/// of it, +Z up. The end effector offset is added to commanded positions
/// before inverse kinematics and subtracted from forward kinematics results
/// so external callers see a consistent origin.
#[derive(Debug, Clone)]
pub struct Leg {
    index: usize,
    coxa: Joint,
    femur: Joint,
    tibia: Joint,
    coxa_z_offset: f32,
    tibia_x_offset: f32,
    end_effector_offset: Vector3<f32>,
}

impl Leg {
    pub fn new(
        index: usize,
        coxa_params: &JointParams,
        femur_params: &JointParams,
        tibia_params: &JointParams,
        channels: (u8, u8, u8),
        end_effector_offset: Vector3<f32>,
    ) -> ScuttleResult<Self> {
        Ok(Leg {
            index,
            coxa: Joint::new(JointName::Coxa, index, coxa_params, channels.0)?,
            femur: Joint::new(JointName::Femur, index, femur_params, channels.1)?,
            tibia: Joint::new(JointName::Tibia, index, tibia_params, channels.2)?,
            coxa_z_offset: coxa_params.z_offset,
            tibia_x_offset: tibia_params.x_offset,
            end_effector_offset,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn coxa(&self) -> &Joint {
        &self.coxa
    }

    pub fn femur(&self) -> &Joint {
        &self.femur
    }

    pub fn tibia(&self) -> &Joint {
        &self.tibia
    }

    pub fn joint_mut(&mut self, name: JointName) -> &mut Joint {
        match name {
            JointName::Coxa => &mut self.coxa,
            JointName::Femur => &mut self.femur,
            JointName::Tibia => &mut self.tibia,
        }
    }

    pub fn tibia_x_offset(&self) -> f32 {
        self.tibia_x_offset
    }

    fn validate_triangle(&self, a: f32, b: f32, c: f32) -> ScuttleResult<()> {
        // strict violations only, equality is the fully extended boundary
        if a + b < c || a + c < b || b + c < a {
            return Err(ScuttleError::TriangleInequality {
                leg_index: self.index,
                a,
                b,
                c,
            });
        }
        Ok(())
    }

    /// Joint angles in degrees positioning the foot at `target`.
    pub fn inverse_kinematics(&self, target: Point3<f32>) -> ScuttleResult<JointAngles> {
        let x = target.x + self.end_effector_offset.x;
        let y = target.y + self.end_effector_offset.y;
        let z = target.z + self.end_effector_offset.z;

        // +Y is the leg's forward axis, hence the swapped atan2 arguments
        let coxa_angle = x.atan2(y);
        let horizontal_reach = x.hypot(y);
        let femur_to_foot =
            (horizontal_reach - self.coxa.length()).hypot(z - self.coxa_z_offset);
        let max_reach = self.femur.length() + self.tibia.length();
        if femur_to_foot > max_reach {
            return Err(ScuttleError::OutOfReach {
                leg_index: self.index,
                distance: femur_to_foot,
                max_reach,
            });
        }

        // angle of the femur-to-foot line against the vertical
        let alpha1 =
            ((horizontal_reach - self.coxa.length()) / (z - self.coxa_z_offset).abs()).atan();

        self.validate_triangle(self.femur.length(), self.tibia.length(), femur_to_foot)?;

        // angle at the femur pivot between the femur and the femur-to-foot line
        let alpha2 = clamped_acos(
            (self.tibia.length().powi(2) - self.femur.length().powi(2) - femur_to_foot.powi(2))
                / (-2.0 * self.femur.length() * femur_to_foot),
        );
        // angle between femur and tibia
        let beta = clamped_acos(
            (femur_to_foot.powi(2) - self.femur.length().powi(2) - self.tibia.length().powi(2))
                / (-2.0 * self.femur.length() * self.tibia.length()),
        );

        let angles = JointAngles::new(
            round_to_hundredth(coxa_angle.to_degrees()),
            round_to_hundredth(alpha1.to_degrees() + alpha2.to_degrees() + FEMUR_ANGLE_OFFSET),
            round_to_hundredth(beta.to_degrees() + TIBIA_ANGLE_OFFSET),
        );
        trace!(leg = self.index, ?angles, "computed inverse kinematics");
        Ok(angles)
    }

    /// Foot position reached by the given joint angles.
    pub fn forward_kinematics(&self, angles: JointAngles) -> ScuttleResult<Point3<f32>> {
        let coxa_angle = angles.coxa.to_radians();
        let femur_angle = angles.femur.to_radians();
        let beta = (angles.tibia - TIBIA_ANGLE_OFFSET).to_radians();

        let x_coxa = self.coxa.length() * coxa_angle.sin();
        let y_coxa = self.coxa.length() * coxa_angle.cos();

        // horizontal reach of the femur segment at its current angle
        let femur_reach = self.femur.length() * femur_angle.cos();

        // femur-to-foot distance from the femur/tibia triangle
        let femur_to_foot = (self.femur.length().powi(2) + self.tibia.length().powi(2)
            - 2.0 * self.femur.length() * self.tibia.length() * beta.cos())
        .sqrt();
        self.validate_triangle(self.femur.length(), self.tibia.length(), femur_to_foot)?;

        let alpha2 = clamped_acos(
            (self.femur.length().powi(2) + femur_to_foot.powi(2) - self.tibia.length().powi(2))
                / (2.0 * self.femur.length() * femur_to_foot),
        );
        // tilt of the femur-to-foot line below the femur pivot's horizon
        let alpha3 = alpha2 - femur_angle;

        let horizontal = femur_to_foot * alpha3.cos();
        let vertical = femur_to_foot * alpha3.sin();

        let x_tibia = (horizontal - femur_reach) * coxa_angle.sin();
        let y_tibia = (horizontal - femur_reach) * coxa_angle.cos();

        let x = x_coxa + femur_reach * coxa_angle.sin() + x_tibia - self.end_effector_offset.x;
        let y = y_coxa + femur_reach * coxa_angle.cos() + y_tibia - self.end_effector_offset.y;
        let z = -vertical + self.coxa_z_offset - self.end_effector_offset.z;

        Ok(Point3::new(
            round_to_hundredth(x),
            round_to_hundredth(y),
            round_to_hundredth(z),
        ))
    }

    /// Validate an angle triple against every joint's limits.
    ///
    /// Hard limits are always enforced, soft limits only when requested.
    pub fn validate_angles(&self, angles: JointAngles, check_soft_limits: bool) -> ScuttleResult<()> {
        self.coxa.validate_angle(angles.coxa, check_soft_limits)?;
        self.femur.validate_angle(angles.femur, check_soft_limits)?;
        self.tibia.validate_angle(angles.tibia, check_soft_limits)?;
        Ok(())
    }

    /// Move the foot to `target`. Fails atomically: no servo is commanded
    /// unless all three joints validate.
    pub fn move_to(
        &self,
        controller: &mut dyn ServoController,
        target: Point3<f32>,
        check_soft_limits: bool,
    ) -> ScuttleResult<JointAngles> {
        let angles = self.inverse_kinematics(target)?;
        self.validate_angles(angles, check_soft_limits)?;

        self.coxa.set_angle(controller, angles.coxa, check_soft_limits)?;
        self.femur
            .set_angle(controller, angles.femur, check_soft_limits)?;
        self.tibia
            .set_angle(controller, angles.tibia, check_soft_limits)?;
        debug!(leg = self.index, ?angles, "leg moved");
        Ok(angles)
    }

    /// Command joint angles directly. Same atomicity contract as `move_to`.
    pub fn move_to_angles(
        &self,
        controller: &mut dyn ServoController,
        angles: JointAngles,
        check_soft_limits: bool,
    ) -> ScuttleResult<()> {
        self.validate_angles(angles, check_soft_limits)?;

        self.coxa.set_angle(controller, angles.coxa, check_soft_limits)?;
        self.femur
            .set_angle(controller, angles.femur, check_soft_limits)?;
        self.tibia
            .set_angle(controller, angles.tibia, check_soft_limits)?;
        Ok(())
    }
}
