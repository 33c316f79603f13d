//! Typed configuration: run options and hardware parameters.
//!
//! Options come from the CLI (or an embedding caller) and are validated
//! up front; hardware parameters carry the machine constants, every one
//! overridable from an INI-style `plotter.cfg` so that tuned values never
//! hide as buried literals.

use std::path::Path;

use configparser::ini::Ini;
use motion::kinematics::{MAX_STEP_DIST_HR, MAX_STEP_DIST_LR, NATIVE_RES_FACTOR};

use crate::error::HostError;

/// Operating mode for one invocation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Plot the full document.
    Plot,
    /// Plot only the layer selected by `Options::layer`.
    Layers,
    /// Resume a paused plot from its checkpoint.
    ResPlot,
    /// Pen-up return to the home position of a paused plot.
    ResHome,
    /// Raise the pen and de-energize the motors for manual alignment.
    Align,
    /// Toggle the pen between up and down.
    Toggle,
    /// Lower and then raise the pen once.
    Cycle,
}

/// Validated run options.
#[derive(Debug, Clone)]
pub struct Options {
    pub mode: Mode,
    /// Hardware model, selects the travel envelope (1-7).
    pub model: u8,
    /// 1 = high resolution (16x microstep), 2 = low resolution (8x).
    pub resolution: u8,
    /// Plot each pen-down move at one constant speed.
    pub const_speed: bool,
    /// Pen-down speed, percent of the mode's speed limit (1-110).
    pub speed_pendown: u32,
    /// Pen-up speed, percent of the mode's speed limit (1-200); values
    /// above 110 allow faster non-drawing travel.
    pub speed_penup: u32,
    /// Acceleration scale, percent (1-110).
    pub accel: u32,
    /// Pen-up servo height, percent (0-100).
    pub pen_pos_up: u32,
    /// Pen-down servo height, percent (0-100).
    pub pen_pos_down: u32,
    /// Extra delay after raising the pen, ms.
    pub pen_delay_up: i32,
    /// Extra delay after lowering the pen, ms.
    pub pen_delay_down: i32,
    /// Copies to plot; 0 plots continuously until paused.
    pub copies: u32,
    /// Delay between copies, seconds.
    pub page_delay: u32,
    /// Layer number for `Mode::Layers`.
    pub layer: u32,
    /// Final XY position overrides, inches. After the last layer the
    /// carriage travels here instead of back to the first point.
    pub end_x: Option<f64>,
    pub end_y: Option<f64>,
    /// Path reordering strategy (0-4); recorded for the caller's
    /// optimizer, the core itself never reorders.
    pub reordering: u8,
    /// Report a completion payload for the caller's webhook.
    pub webhook: bool,
    pub webhook_url: Option<String>,
    /// Serial port name; `None` selects the first port found.
    pub port_name: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            mode: Mode::Plot,
            model: 1,
            resolution: 1,
            const_speed: false,
            speed_pendown: 25,
            speed_penup: 75,
            accel: 75,
            pen_pos_up: 60,
            pen_pos_down: 30,
            pen_delay_up: 0,
            pen_delay_down: 0,
            copies: 1,
            page_delay: 15,
            layer: 1,
            end_x: None,
            end_y: None,
            reordering: 0,
            webhook: false,
            webhook_url: None,
            port_name: None,
        }
    }
}

impl Options {
    /// Range-check every enumerated option.
    pub fn validate(&self) -> Result<(), HostError> {
        fn check(name: &str, value: i64, lo: i64, hi: i64) -> Result<(), HostError> {
            if (lo..=hi).contains(&value) {
                Ok(())
            } else {
                Err(HostError::Config(format!(
                    "{name} must be between {lo} and {hi}, got {value}"
                )))
            }
        }
        check("model", i64::from(self.model), 1, 7)?;
        check("resolution", i64::from(self.resolution), 1, 2)?;
        check("speed_pendown", i64::from(self.speed_pendown), 1, 110)?;
        check("speed_penup", i64::from(self.speed_penup), 1, 200)?;
        check("accel", i64::from(self.accel), 1, 110)?;
        check("pen_pos_up", i64::from(self.pen_pos_up), 0, 100)?;
        check("pen_pos_down", i64::from(self.pen_pos_down), 0, 100)?;
        check("reordering", i64::from(self.reordering), 0, 4)?;
        if self.webhook && self.webhook_url.is_none() {
            return Err(HostError::Config("webhook enabled without a webhook_url".into()));
        }
        Ok(())
    }
}

/// Machine constants. Defaults describe the standard hardware; any field
/// may be overridden from the `[plotter]` section of a config file.
#[derive(Debug, Clone)]
pub struct Params {
    /// Steps per inch of belt travel before the microstep multiplier.
    pub native_res_factor: f64,
    /// Hard per-axis rate ceiling, steps per millisecond.
    pub max_step_rate: f64,
    /// Below this rate (steps/ms) an axis is dropped from an interval.
    pub min_step_rate: f64,
    /// Speed limit in high-resolution mode, in/s.
    pub speed_lim_xy_hr: f64,
    /// Speed limit in low-resolution mode, in/s.
    pub speed_lim_xy_lr: f64,
    /// Pen-down acceleration at accel = 100, in/s^2.
    pub accel_rate: f64,
    /// Pen-up acceleration at accel = 100, in/s^2.
    pub accel_rate_pu: f64,
    /// Nominal motion interval duration, seconds.
    pub time_slice: f64,
    /// Cornering aggressiveness; scaled by `cornering_divisor` into the
    /// corner-deviation distance.
    pub cornering: f64,
    pub cornering_divisor: f64,
    /// Junction denominator guard below which a corner counts as
    /// straight-through.
    pub corner_epsilon: f64,
    /// Pen-down speed multipliers for constant-speed mode.
    pub const_speed_factor_hr: f64,
    pub const_speed_factor_lr: f64,
    /// Fraction of the pen-down speed used when a constant-velocity
    /// fallback runs between two zero-velocity endpoints.
    pub zero_speed_fraction: f64,
    /// Positions may exceed travel bounds by this much without clipping.
    pub bounds_tolerance: f64,
    /// Minimum segment lengths by resolution, inches.
    pub max_step_dist_hr: f64,
    pub max_step_dist_lr: f64,
    /// Home position, inches.
    pub start_pos_x: f64,
    pub start_pos_y: f64,
    /// Travel envelope overrides; `None` uses the model table.
    pub x_travel: Option<f64>,
    pub y_travel: Option<f64>,
    /// Supply-voltage ADC reading below which the `voltage` warning is
    /// recorded.
    pub voltage_threshold: u32,
    pub skip_voltage_check: bool,
    /// Servo configuration: position range in controller units and the
    /// sweep duration over the full range, ms.
    pub servo_range_min: u32,
    pub servo_range_max: u32,
    pub servo_sweep_ms: u32,
    pub servo_rate_raise: u32,
    pub servo_rate_lower: u32,
    /// Drive output pin B3 low at motor enable (used by some hardware
    /// revisions for an auxiliary output).
    pub use_b3_out: bool,
    /// Both last-known coordinates under this distance mean the carriage
    /// is already home, so a return-home request is refused.
    pub min_resume_dist: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            native_res_factor: NATIVE_RES_FACTOR,
            max_step_rate: 24.995,
            min_step_rate: 0.002,
            speed_lim_xy_hr: 8.6805,
            speed_lim_xy_lr: 12.0,
            accel_rate: 40.0,
            accel_rate_pu: 60.0,
            time_slice: 0.030,
            cornering: 10.0,
            cornering_divisor: 5000.0,
            corner_epsilon: 1e-4,
            const_speed_factor_hr: 0.4,
            const_speed_factor_lr: 0.25,
            zero_speed_fraction: 0.1,
            bounds_tolerance: 0.003,
            max_step_dist_hr: MAX_STEP_DIST_HR,
            max_step_dist_lr: MAX_STEP_DIST_LR,
            start_pos_x: 0.0,
            start_pos_y: 0.0,
            x_travel: None,
            y_travel: None,
            voltage_threshold: 250,
            skip_voltage_check: false,
            servo_range_min: 9855,
            servo_range_max: 27831,
            servo_sweep_ms: 400,
            servo_rate_raise: 150,
            servo_rate_lower: 150,
            use_b3_out: false,
            min_resume_dist: 0.001,
        }
    }
}

impl Params {
    /// Load parameters from an INI file; any key absent from the file
    /// keeps its built-in default.
    pub fn load(path: &Path) -> Result<Self, HostError> {
        let text = std::fs::read_to_string(path)?;
        let mut ini = Ini::new();
        ini.read(text)
            .map_err(|e| HostError::Config(format!("cannot parse {}: {e}", path.display())))?;
        let mut params = Self::default();

        let section = "plotter";
        let float = |key: &str, slot: &mut f64| -> Result<(), HostError> {
            if let Ok(Some(value)) = ini.getfloat(section, key) {
                if !value.is_finite() {
                    return Err(HostError::Config(format!("{key} must be finite")));
                }
                *slot = value;
            }
            Ok(())
        };
        float("native_res_factor", &mut params.native_res_factor)?;
        float("max_step_rate", &mut params.max_step_rate)?;
        float("min_step_rate", &mut params.min_step_rate)?;
        float("speed_lim_xy_hr", &mut params.speed_lim_xy_hr)?;
        float("speed_lim_xy_lr", &mut params.speed_lim_xy_lr)?;
        float("accel_rate", &mut params.accel_rate)?;
        float("accel_rate_pu", &mut params.accel_rate_pu)?;
        float("time_slice", &mut params.time_slice)?;
        float("cornering", &mut params.cornering)?;
        float("cornering_divisor", &mut params.cornering_divisor)?;
        float("corner_epsilon", &mut params.corner_epsilon)?;
        float("const_speed_factor_hr", &mut params.const_speed_factor_hr)?;
        float("const_speed_factor_lr", &mut params.const_speed_factor_lr)?;
        float("zero_speed_fraction", &mut params.zero_speed_fraction)?;
        float("bounds_tolerance", &mut params.bounds_tolerance)?;
        float("max_step_dist_hr", &mut params.max_step_dist_hr)?;
        float("max_step_dist_lr", &mut params.max_step_dist_lr)?;
        float("start_pos_x", &mut params.start_pos_x)?;
        float("start_pos_y", &mut params.start_pos_y)?;
        float("min_resume_dist", &mut params.min_resume_dist)?;

        if let Ok(Some(value)) = ini.getfloat(section, "x_travel") {
            params.x_travel = Some(value);
        }
        if let Ok(Some(value)) = ini.getfloat(section, "y_travel") {
            params.y_travel = Some(value);
        }
        if let Ok(Some(value)) = ini.getuint(section, "voltage_threshold") {
            params.voltage_threshold = value as u32;
        }
        if let Ok(Some(value)) = ini.getbool(section, "skip_voltage_check") {
            params.skip_voltage_check = value;
        }
        if let Ok(Some(value)) = ini.getuint(section, "servo_range_min") {
            params.servo_range_min = value as u32;
        }
        if let Ok(Some(value)) = ini.getuint(section, "servo_range_max") {
            params.servo_range_max = value as u32;
        }
        if let Ok(Some(value)) = ini.getuint(section, "servo_sweep_ms") {
            params.servo_sweep_ms = value as u32;
        }
        if let Ok(Some(value)) = ini.getbool(section, "use_b3_out") {
            params.use_b3_out = value;
        }

        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<(), HostError> {
        if self.native_res_factor <= 0.0 {
            return Err(HostError::Config("native_res_factor must be positive".into()));
        }
        if self.accel_rate <= 0.0 || self.accel_rate_pu <= 0.0 {
            return Err(HostError::Config("acceleration rates must be positive".into()));
        }
        if self.time_slice <= 0.0 {
            return Err(HostError::Config("time_slice must be positive".into()));
        }
        if self.cornering_divisor <= 0.0 {
            return Err(HostError::Config("cornering_divisor must be positive".into()));
        }
        Ok(())
    }

    /// Travel envelope in inches for a hardware model (1-7), unless
    /// overridden by `x_travel` / `y_travel`.
    pub fn travel(&self, model: u8) -> (f64, f64) {
        let (x, y) = match model {
            2 => (16.93, 11.69), // A3
            3 => (23.42, 8.58),  // XL
            4 => (6.30, 4.00),   // mini kit
            5 => (34.02, 23.39), // A1
            6 => (23.39, 17.01), // A2
            7 => (7.48, 5.51),   // B6
            _ => (11.81, 8.58),  // model 1, letter / A4
        };
        (self.x_travel.unwrap_or(x), self.y_travel.unwrap_or(y))
    }
}
