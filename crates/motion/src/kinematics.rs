//! CoreXY kinematics: mapping between Cartesian inches and motor steps.
//!
//! Both motors jointly drive both Cartesian axes via crossed belts; each
//! motor corresponds to a 45-degree-rotated axis. For a Cartesian delta
//! (dx, dy) in inches and a step scale in steps-per-inch:
//!
//! ```text
//! m1 = round(step_scale * (dx + dy))
//! m2 = round(step_scale * (dx - dy))
//! ```
//!
//! After rounding, the *actually commanded* Cartesian delta is recomputed
//! from (m1, m2), and all subsequent position tracking uses the recomputed
//! values. Rounding error therefore never accumulates in Cartesian state.

/// Native motor resolution factor: steps per inch of belt travel at full
/// stepping, before the microstep multiplier.
pub const NATIVE_RES_FACTOR: f64 = 1016.0;

/// Longest Cartesian distance that can still round to zero steps on both
/// axes in high-resolution (16x) mode. Segments shorter than this are
/// dropped by the planner.
pub const MAX_STEP_DIST_HR: f64 = 0.000_443;

/// As [`MAX_STEP_DIST_HR`], for low-resolution (8x) mode.
pub const MAX_STEP_DIST_LR: f64 = 0.000_886;

/// Motor microstepping mode. High resolution runs 16x microstepping,
/// low resolution 8x with twice the per-step travel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StepMode {
    /// 16x microstepping ("super" resolution).
    High,
    /// 8x microstepping ("normal" resolution).
    Low,
}

impl StepMode {
    /// The microstep code the controller's enable-motors command expects:
    /// 1 selects 16x, 2 selects 8x.
    pub fn microstep_code(self) -> u8 {
        match self {
            StepMode::High => 1,
            StepMode::Low => 2,
        }
    }

    /// Multiplier applied to the native resolution factor to obtain the
    /// steps-per-inch scale along a 45-degree motor axis.
    pub fn scale_multiplier(self) -> f64 {
        match self {
            StepMode::High => 2.0,
            StepMode::Low => 1.0,
        }
    }

    /// Steps per inch along a 45-degree motor axis, at the standard
    /// native resolution.
    pub fn step_scale(self) -> f64 {
        self.scale_multiplier() * NATIVE_RES_FACTOR
    }

    /// Minimum Cartesian segment length worth commanding in this mode.
    pub fn min_step_dist(self) -> f64 {
        match self {
            StepMode::High => MAX_STEP_DIST_HR,
            StepMode::Low => MAX_STEP_DIST_LR,
        }
    }
}

/// A signed step count pair on the two native motor axes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct MotorSteps {
    pub m1: i32,
    pub m2: i32,
}

impl MotorSteps {
    /// Round a Cartesian delta (inches) onto the motor axes.
    pub fn from_xy(dx: f64, dy: f64, step_scale: f64) -> Self {
        Self {
            m1: (step_scale * (dx + dy)).round() as i32,
            m2: (step_scale * (dx - dy)).round() as i32,
        }
    }

    /// The Cartesian delta (inches) these rounded steps will actually
    /// produce. This, not the requested delta, is what position tracking
    /// must integrate.
    pub fn to_xy(self, step_scale: f64) -> (f64, f64) {
        let d1 = f64::from(self.m1) / (2.0 * step_scale);
        let d2 = f64::from(self.m2) / (2.0 * step_scale);
        (d1 + d2, d1 - d2)
    }

    /// True when neither axis moves a whole step.
    pub fn is_zero(self) -> bool {
        self.m1 == 0 && self.m2 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_x_move_drives_both_motors_equally() {
        let steps = MotorSteps::from_xy(10.0, 0.0, 2032.0);
        assert_eq!(steps.m1, 20320);
        assert_eq!(steps.m2, 20320);
    }

    #[test]
    fn pure_y_move_drives_motors_in_opposition() {
        let steps = MotorSteps::from_xy(0.0, 1.0, 2032.0);
        assert_eq!(steps.m1, 2032);
        assert_eq!(steps.m2, -2032);
    }

    #[test]
    fn round_trip_error_is_below_half_step() {
        let scale = 2032.0;
        for &(dx, dy) in &[
            (0.1234567, -0.7654321),
            (3.0001, 2.9999),
            (-0.000245, 0.000245),
            (11.317, -4.001),
        ] {
            let steps = MotorSteps::from_xy(dx, dy, scale);
            let (rx, ry) = steps.to_xy(scale);
            assert!((rx - dx).abs() < 1.0 / (2.0 * scale), "x err for ({dx},{dy})");
            assert!((ry - dy).abs() < 1.0 / (2.0 * scale), "y err for ({dx},{dy})");
        }
    }

    #[test]
    fn sub_step_delta_rounds_to_zero() {
        let steps = MotorSteps::from_xy(0.0001, 0.0, 2032.0);
        assert!(steps.is_zero());
    }

    #[test]
    fn step_mode_scales() {
        assert_eq!(StepMode::High.step_scale(), 2032.0);
        assert_eq!(StepMode::Low.step_scale(), 1016.0);
        assert_eq!(StepMode::High.microstep_code(), 1);
        assert_eq!(StepMode::Low.microstep_code(), 2);
    }
}
