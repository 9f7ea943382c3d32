mod phases;

pub use phases::{GaitKind, GaitPhase, LegSet};

use std::str::FromStr;
use std::time::Duration;

use nalgebra::{Point3, Vector2};
use serde::{Deserialize, Serialize};
use tracing::*;

use crate::error::{ScuttleError, ScuttleResult};

/// Movement direction names accepted from controllers.
///
/// Diagonals use 1/√2 per axis so every named direction has unit magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    ForwardRight,
    ForwardLeft,
    BackwardRight,
    BackwardLeft,
    Neutral,
}

impl Direction {
    /// Direction as a vector in the robot frame (+X right, +Y forward).
    pub fn as_vector(self) -> Vector2<f32> {
        use std::f32::consts::FRAC_1_SQRT_2;
        match self {
            Direction::Forward => Vector2::new(0.0, 1.0),
            Direction::Backward => Vector2::new(0.0, -1.0),
            Direction::Right => Vector2::new(1.0, 0.0),
            Direction::Left => Vector2::new(-1.0, 0.0),
            Direction::ForwardRight => Vector2::new(FRAC_1_SQRT_2, FRAC_1_SQRT_2),
            Direction::ForwardLeft => Vector2::new(-FRAC_1_SQRT_2, FRAC_1_SQRT_2),
            Direction::BackwardRight => Vector2::new(FRAC_1_SQRT_2, -FRAC_1_SQRT_2),
            Direction::BackwardLeft => Vector2::new(-FRAC_1_SQRT_2, -FRAC_1_SQRT_2),
            Direction::Neutral => Vector2::new(0.0, 0.0),
        }
    }
}

impl FromStr for Direction {
    type Err = ScuttleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "forward" => Ok(Direction::Forward),
            "backward" => Ok(Direction::Backward),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            "forward right" => Ok(Direction::ForwardRight),
            "forward left" => Ok(Direction::ForwardLeft),
            "backward right" => Ok(Direction::BackwardRight),
            "backward left" => Ok(Direction::BackwardLeft),
            "neutral" => Ok(Direction::Neutral),
            other => Err(ScuttleError::UnknownDirection(other.to_owned())),
        }
    }
}

/// Tunable gait parameters, distances in mm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaitParams {
    /// Radius of the circular workspace legs are projected onto.
    pub step_radius: f32,
    /// Height swing legs lift over the target.
    pub leg_lift_distance: f32,
    /// Signed offset from the reference foot height. Positive lowers the
    /// feet, raising the body.
    pub stance_height: f32,
    /// Wall clock pause between waypoint commits.
    pub dwell_time: Duration,
    /// Stance legs travel to the opposite side of the circle instead of
    /// returning to its center.
    pub use_full_circle_stance: bool,
}

impl Default for GaitParams {
    fn default() -> Self {
        GaitParams {
            step_radius: 30.0,
            leg_lift_distance: 20.0,
            stance_height: 0.0,
            dwell_time: Duration::from_millis(500),
            use_full_circle_stance: false,
        }
    }
}

/// Per-phase execution specification produced from a phase tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaitState {
    pub phase: GaitPhase,
    pub swing_legs: LegSet,
    pub stance_legs: LegSet,
    pub dwell_time: Duration,
}

/// Ordered waypoints one leg follows through a phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegPath {
    waypoints: Vec<Point3<f32>>,
    current_waypoint_index: usize,
}

impl LegPath {
    pub fn new(waypoints: Vec<Point3<f32>>) -> Self {
        LegPath {
            waypoints,
            current_waypoint_index: 0,
        }
    }

    pub fn waypoints(&self) -> &[Point3<f32>] {
        &self.waypoints
    }

    /// Waypoint at the current index, or the origin if the path is empty.
    pub fn current_target(&self) -> Point3<f32> {
        self.waypoints
            .get(self.current_waypoint_index)
            .copied()
            .unwrap_or_else(Point3::origin)
    }

    /// Step to the next waypoint, reporting whether one existed.
    pub fn advance_to_next_waypoint(&mut self) -> bool {
        if self.current_waypoint_index + 1 < self.waypoints.len() {
            self.current_waypoint_index += 1;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.current_waypoint_index = 0;
    }
}

// Margin keeping the projection well defined at the circle boundary.
const PROJECTION_BOUNDARY_MARGIN: f32 = 0.005;
// Below this angle the direction and point are treated as collinear.
const COLLINEAR_ANGLE_TOLERANCE: f32 = 0.1;

/// Project `point` onto the boundary of a circle of `radius` around the
/// origin, moving along `direction`.
///
/// This is what makes leg targeting direction independent: for any interior
/// point and any direction there is exactly one boundary point reached by
/// travelling along that direction, found here with the law of sines.
pub fn project_point_to_circle(
    radius: f32,
    point: Vector2<f32>,
    direction: Vector2<f32>,
) -> Vector2<f32> {
    if direction.norm() == 0.0 {
        warn!("projection direction has zero magnitude, returning original point");
        return point;
    }
    if point.norm() == 0.0 {
        return direction.normalize() * radius;
    }

    let direction = if direction.norm() > radius - PROJECTION_BOUNDARY_MARGIN {
        direction.normalize() * (radius - PROJECTION_BOUNDARY_MARGIN)
    } else {
        direction
    };

    let angle_beta = 180.0 - direction.angle(&point).to_degrees();
    if angle_beta.abs() < COLLINEAR_ANGLE_TOLERANCE
        || (angle_beta - 180.0).abs() < COLLINEAR_ANGLE_TOLERANCE
    {
        // collinear, the boundary point lies straight along the direction
        return direction.normalize() * radius;
    }

    let length_c = point.norm();
    let sin_gamma = (length_c * angle_beta.to_radians().sin() / radius).clamp(-1.0, 1.0);
    let angle_gamma = sin_gamma.asin().to_degrees();
    let angle_alpha = 180.0 - angle_beta - angle_gamma;
    let projection_length =
        radius * angle_alpha.to_radians().sin() / angle_beta.to_radians().sin();

    point + direction.normalize() * projection_length
}

/// A complete walking pattern: the phase machine of its kind plus the
/// circle-projection targeting state shared by all gaits.
#[derive(Debug, Clone)]
pub struct Gait {
    kind: GaitKind,
    params: GaitParams,
    direction_input: Vector2<f32>,
    rotation_input: f32,
    leg_paths: [LegPath; 6],
}

impl Gait {
    pub fn new(kind: GaitKind, params: GaitParams) -> Self {
        Gait {
            kind,
            params,
            direction_input: Vector2::new(0.0, 0.0),
            rotation_input: 0.0,
            leg_paths: Default::default(),
        }
    }

    pub fn kind(&self) -> GaitKind {
        self.kind
    }

    pub fn params(&self) -> &GaitParams {
        &self.params
    }

    pub fn direction_input(&self) -> Vector2<f32> {
        self.direction_input
    }

    pub fn rotation_input(&self) -> f32 {
        self.rotation_input
    }

    /// Set the movement direction and rotation rate.
    ///
    /// The direction magnitude scales the step length, the rotation sign
    /// picks the turning direction and its magnitude scales the rotation
    /// step. Rotation takes precedence over translation when both are set.
    pub fn set_direction(&mut self, direction: Vector2<f32>, rotation: f32) {
        self.direction_input = direction;
        self.rotation_input = rotation;
    }

    pub fn set_named_direction(&mut self, direction: Direction, rotation: f32) {
        self.set_direction(direction.as_vector(), rotation);
    }

    pub fn state(&self, phase: GaitPhase) -> GaitState {
        GaitState {
            phase,
            swing_legs: phase.swing_legs(),
            stance_legs: phase.stance_legs(),
            dwell_time: self.params.dwell_time,
        }
    }

    pub fn canonical_state(&self) -> GaitState {
        self.state(self.kind.canonical_phase())
    }

    pub fn leg_path(&self, leg_index: usize) -> &LegPath {
        &self.leg_paths[leg_index]
    }

    /// Both inputs zero: the gait marches in place.
    pub fn is_marching_in_place(&self) -> bool {
        self.direction_input.norm() == 0.0 && self.rotation_input == 0.0
    }

    /// Local axes of a leg mounted at `mount_angle` radians: `y` points
    /// outward along the leg, `x` to the right of it.
    fn leg_local_axes(mount_angle: f32) -> (Vector2<f32>, Vector2<f32>) {
        let local_y = Vector2::new(mount_angle.cos(), mount_angle.sin());
        let local_x = Vector2::new(mount_angle.sin(), -mount_angle.cos());
        (local_x, local_y)
    }

    /// Target position for one leg in its local frame.
    ///
    /// `current` is the leg's current foot position, `mount_angle` its
    /// mounting azimuth in radians.
    pub fn calculate_leg_target(
        &self,
        current: Point3<f32>,
        mount_angle: f32,
        is_swing: bool,
    ) -> Point3<f32> {
        if self.is_marching_in_place() {
            // hold x, y and only adjust for the stance height
            return Point3::new(current.x, current.y, -self.params.stance_height);
        }

        let current_2d = Vector2::new(current.x, current.y);

        let target_2d = if self.rotation_input != 0.0 {
            // rotation: every leg moves sideways in its own frame
            let rotation_projection = if self.rotation_input > 0.0 {
                Vector2::new(1.0, 0.0)
            } else {
                Vector2::new(-1.0, 0.0)
            };
            let movement_distance = self.params.step_radius * self.rotation_input.abs();
            if is_swing {
                rotation_projection * movement_distance
            } else if self.params.use_full_circle_stance {
                -rotation_projection * movement_distance
            } else {
                Vector2::new(0.0, 0.0)
            }
        } else {
            // translation: project the global direction onto the leg frame
            let (local_x, local_y) = Self::leg_local_axes(mount_angle);
            let projected = Vector2::new(
                self.direction_input.dot(&local_x),
                self.direction_input.dot(&local_y),
            );
            let movement_distance = self.params.step_radius * self.direction_input.norm();
            if is_swing {
                project_point_to_circle(movement_distance, Vector2::new(0.0, 0.0), projected)
            } else if self.params.use_full_circle_stance {
                project_point_to_circle(movement_distance, current_2d, -projected)
            } else {
                Vector2::new(0.0, 0.0)
            }
        };

        Point3::new(target_2d.x, target_2d.y, -self.params.stance_height)
    }

    /// Plan the waypoint path from `current` to `target` and store it as the
    /// leg's path for this phase.
    ///
    /// Swing legs get the three-phase lift / travel / lower path, stance
    /// legs a direct two-waypoint push.
    pub fn calculate_leg_path(
        &mut self,
        current: Point3<f32>,
        leg_index: usize,
        target: Point3<f32>,
        is_swing: bool,
    ) {
        let lift = self.params.leg_lift_distance;
        let waypoints = if is_swing {
            if self.is_marching_in_place() {
                vec![
                    current,
                    Point3::new(current.x, current.y, current.z + lift),
                    current,
                ]
            } else {
                vec![
                    current,
                    Point3::new(target.x, target.y, target.z + lift),
                    target,
                ]
            }
        } else {
            vec![current, target]
        };
        trace!(leg = leg_index, ?waypoints, "planned leg path");
        self.leg_paths[leg_index] = LegPath::new(waypoints);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn leg_mount_angle(leg_index: usize) -> f32 {
        (leg_index as f32 * 60.0).to_radians()
    }

    #[test]
    fn direction_map_matches_convention() {
        assert_relative_eq!(Direction::Forward.as_vector(), Vector2::new(0.0, 1.0));
        assert_relative_eq!(Direction::Right.as_vector(), Vector2::new(1.0, 0.0));
        let diagonal = Direction::ForwardRight.as_vector();
        assert_relative_eq!(diagonal.x, 0.707, epsilon = 1e-3);
        assert_relative_eq!(diagonal.y, 0.707, epsilon = 1e-3);
        assert_relative_eq!(diagonal.norm(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(Direction::Neutral.as_vector(), Vector2::new(0.0, 0.0));
    }

    #[test]
    fn direction_names_parse() {
        assert_eq!("forward".parse::<Direction>().unwrap(), Direction::Forward);
        assert_eq!(
            "backward left".parse::<Direction>().unwrap(),
            Direction::BackwardLeft
        );
        assert!(matches!(
            "sideways".parse::<Direction>(),
            Err(ScuttleError::UnknownDirection(_))
        ));
    }

    #[test]
    fn projection_from_origin_scales_direction_to_radius() {
        let result =
            project_point_to_circle(80.0, Vector2::new(0.0, 0.0), Vector2::new(1.0, 0.0));
        assert_relative_eq!(result, Vector2::new(80.0, 0.0));
    }

    #[test]
    fn projection_with_zero_direction_returns_point() {
        let point = Vector2::new(12.0, -7.0);
        let result = project_point_to_circle(30.0, point, Vector2::new(0.0, 0.0));
        assert_relative_eq!(result, point);
    }

    #[test]
    fn projection_lands_on_circle_boundary() {
        let result =
            project_point_to_circle(30.0, Vector2::new(10.0, 10.0), Vector2::new(1.0, 0.0));
        assert_relative_eq!(result.norm(), 30.0, epsilon = 1e-3);
        assert_relative_eq!(result.y, 10.0, epsilon = 1e-3);
        assert_relative_eq!(result.x, 28.284, epsilon = 1e-2);
    }

    #[test]
    fn projection_collinear_cases_use_simple_scaling() {
        let along =
            project_point_to_circle(30.0, Vector2::new(10.0, 0.0), Vector2::new(1.0, 0.0));
        assert_relative_eq!(along, Vector2::new(30.0, 0.0), epsilon = 1e-3);

        let against =
            project_point_to_circle(30.0, Vector2::new(10.0, 0.0), Vector2::new(-1.0, 0.0));
        assert_relative_eq!(against, Vector2::new(-30.0, 0.0), epsilon = 1e-3);
    }

    #[test]
    fn projection_clamps_long_directions_at_boundary() {
        let radius = 30.0;
        let direction = Vector2::new(0.0, radius - PROJECTION_BOUNDARY_MARGIN);
        let result = project_point_to_circle(radius, Vector2::new(5.0, 3.0), direction);
        assert_relative_eq!(result.norm(), radius, epsilon = 1e-2);
    }

    #[test]
    fn swing_targets_follow_projected_direction() {
        let mut gait = Gait::new(GaitKind::Tripod, GaitParams::default());
        gait.set_named_direction(Direction::Forward, 0.0);

        // leg 0 mounts at 0°: global forward is -X in its local frame
        let target = gait.calculate_leg_target(Point3::origin(), leg_mount_angle(0), true);
        assert_relative_eq!(target.x, -30.0, epsilon = 1e-3);
        assert_relative_eq!(target.y, 0.0, epsilon = 1e-3);
        assert_relative_eq!(target.z, 0.0);

        // leg 2 mounts at 120°
        let target = gait.calculate_leg_target(Point3::origin(), leg_mount_angle(2), true);
        assert_relative_eq!(target.x, 15.0, epsilon = 1e-2);
        assert_relative_eq!(target.y, 25.98, epsilon = 1e-2);
    }

    #[test]
    fn direction_magnitude_scales_step_length() {
        let mut gait = Gait::new(GaitKind::Tripod, GaitParams::default());
        gait.set_direction(Vector2::new(0.0, 0.5), 0.0);
        let target = gait.calculate_leg_target(Point3::origin(), leg_mount_angle(0), true);
        assert_relative_eq!(target.x, -15.0, epsilon = 1e-3);
    }

    #[test]
    fn half_circle_stance_targets_center() {
        let mut gait = Gait::new(GaitKind::Tripod, GaitParams::default());
        gait.set_named_direction(Direction::Forward, 0.0);
        let target =
            gait.calculate_leg_target(Point3::new(-30.0, 0.0, 0.0), leg_mount_angle(0), false);
        assert_relative_eq!(target, Point3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn full_circle_stance_crosses_to_opposite_side() {
        let params = GaitParams {
            use_full_circle_stance: true,
            ..GaitParams::default()
        };
        let mut gait = Gait::new(GaitKind::Tripod, params);
        gait.set_named_direction(Direction::Forward, 0.0);
        let target =
            gait.calculate_leg_target(Point3::new(-30.0, 0.0, 0.0), leg_mount_angle(0), false);
        // stance direction is +X in leg 0's frame, opposite the swing
        assert_relative_eq!(target, Point3::new(30.0, 0.0, 0.0), epsilon = 1e-2);
    }

    #[test]
    fn rotation_targets_are_identical_in_every_leg_frame() {
        let mut gait = Gait::new(GaitKind::Tripod, GaitParams::default());
        gait.set_named_direction(Direction::Neutral, 1.0);
        for leg_index in 0..6 {
            let target =
                gait.calculate_leg_target(Point3::origin(), leg_mount_angle(leg_index), true);
            assert_relative_eq!(target, Point3::new(30.0, 0.0, 0.0));
        }

        gait.set_named_direction(Direction::Neutral, -0.5);
        let target = gait.calculate_leg_target(Point3::origin(), leg_mount_angle(3), true);
        assert_relative_eq!(target, Point3::new(-15.0, 0.0, 0.0));
    }

    #[test]
    fn rotation_half_circle_stance_pulls_back_to_center() {
        let mut gait = Gait::new(GaitKind::Tripod, GaitParams::default());
        gait.set_named_direction(Direction::Neutral, 1.0);
        for leg_index in 0..6 {
            let target = gait.calculate_leg_target(
                Point3::new(30.0, 0.0, 0.0),
                leg_mount_angle(leg_index),
                false,
            );
            assert_relative_eq!(target, Point3::new(0.0, 0.0, 0.0));
        }
    }

    #[test]
    fn rotation_full_circle_stance_pushes_opposite_the_swing() {
        let params = GaitParams {
            use_full_circle_stance: true,
            ..GaitParams::default()
        };
        let mut gait = Gait::new(GaitKind::Tripod, params);
        gait.set_named_direction(Direction::Neutral, 1.0);
        let target =
            gait.calculate_leg_target(Point3::new(30.0, 0.0, 0.0), leg_mount_angle(0), false);
        assert_relative_eq!(target, Point3::new(-30.0, 0.0, 0.0));

        // reversed rotation mirrors the stance direction
        gait.set_named_direction(Direction::Neutral, -0.5);
        let target =
            gait.calculate_leg_target(Point3::new(-15.0, 0.0, 0.0), leg_mount_angle(4), false);
        assert_relative_eq!(target, Point3::new(15.0, 0.0, 0.0));
    }

    #[test]
    fn swing_path_has_three_phases() {
        let mut gait = Gait::new(GaitKind::Tripod, GaitParams::default());
        gait.set_named_direction(Direction::Forward, 0.0);
        let current = Point3::new(5.0, 0.0, 0.0);
        let target = Point3::new(-30.0, 0.0, 0.0);
        gait.calculate_leg_path(current, 0, target, true);

        let waypoints = gait.leg_path(0).waypoints();
        assert_eq!(waypoints.len(), 3);
        assert_eq!(waypoints[0], current);
        assert_relative_eq!(waypoints[1], Point3::new(-30.0, 0.0, 20.0));
        assert_eq!(waypoints[2], target);
    }

    #[test]
    fn stance_path_is_direct() {
        let mut gait = Gait::new(GaitKind::Tripod, GaitParams::default());
        gait.set_named_direction(Direction::Forward, 0.0);
        let current = Point3::new(-30.0, 0.0, 0.0);
        gait.calculate_leg_path(current, 1, Point3::origin(), false);

        let waypoints = gait.leg_path(1).waypoints();
        assert_eq!(waypoints.len(), 2);
        assert_eq!(waypoints[0], current);
        assert_eq!(waypoints[1], Point3::origin());
    }

    #[test]
    fn marching_in_place_lifts_straight_up() {
        let mut gait = Gait::new(GaitKind::Wave, GaitParams::default());
        gait.set_named_direction(Direction::Neutral, 0.0);
        assert!(gait.is_marching_in_place());

        let current = Point3::new(4.0, -3.0, 0.0);
        let target = gait.calculate_leg_target(current, leg_mount_angle(1), true);
        assert_relative_eq!(target, Point3::new(4.0, -3.0, 0.0));

        gait.calculate_leg_path(current, 1, target, true);
        let waypoints = gait.leg_path(1).waypoints();
        assert_eq!(waypoints.len(), 3);
        assert_eq!(waypoints[0], current);
        assert_relative_eq!(waypoints[1], Point3::new(4.0, -3.0, 20.0));
        assert_eq!(waypoints[2], current);
    }

    #[test]
    fn stance_height_offsets_target_z() {
        let params = GaitParams {
            stance_height: 10.0,
            ..GaitParams::default()
        };
        let mut gait = Gait::new(GaitKind::Tripod, params);
        gait.set_named_direction(Direction::Forward, 0.0);
        let target = gait.calculate_leg_target(Point3::origin(), leg_mount_angle(0), true);
        assert_relative_eq!(target.z, -10.0);
    }

    #[test]
    fn leg_path_navigation() {
        let mut path = LegPath::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
        ]);
        assert_eq!(path.current_target(), Point3::new(0.0, 0.0, 0.0));
        assert!(path.advance_to_next_waypoint());
        assert_eq!(path.current_target(), Point3::new(1.0, 0.0, 0.0));
        assert!(!path.advance_to_next_waypoint());
        path.reset();
        assert_eq!(path.current_target(), Point3::new(0.0, 0.0, 0.0));

        let empty = LegPath::default();
        assert_eq!(empty.current_target(), Point3::origin());
    }
}
