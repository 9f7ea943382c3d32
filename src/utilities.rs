/// Maps a value from one range to another, clamped to the output range.
///
/// Used to convert the configured 1-100 speed and acceleration percentages to
/// the controller's 1-255 count range.
pub fn map_range(value: i32, in_min: i32, in_max: i32, out_min: i32, out_max: i32) -> i32 {
    if value < in_min {
        out_min
    } else if value > in_max {
        out_max
    } else {
        (value - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
    }
}

/// Round to two decimal places and normalize -0.0 to 0.0.
///
/// Kinematics results are rounded to 0.01 (mm or degrees) so cached state
/// compares reliably across inverse/forward round trips.
pub fn round_to_hundredth(value: f32) -> f32 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Arc cosine with the input clamped to the valid [-1, 1] domain.
///
/// Rounding at the workspace boundary can push law-of-cosines ratios a hair
/// outside the domain.
pub fn clamped_acos(value: f32) -> f32 {
    value.clamp(-1.0, 1.0).acos()
}
