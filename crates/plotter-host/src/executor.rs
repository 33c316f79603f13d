//! Segment execution: one planned segment to a stream of timed step
//! commands on the controller.
//!
//! Responsibilities, in order: pause check (one node per segment),
//! bounds clamping, CoreXY step mapping with the round-then-recompute
//! discipline, interval generation, and per-interval emission with
//! position bookkeeping. While resume mode is active, intervals are
//! computed but not emitted and the tracked position stays frozen at the
//! physical pen location.

use std::thread;
use std::time::Duration;

use motion::velocity::distance;
use motion::{build_intervals, MotorSteps, ProfileLimits, XyPoint};
use tracing::debug;

use crate::plot::Plotter;
use crate::status::stop_code;

/// Truncate a coordinate to bounds; flag it only when it exceeds them by
/// more than the tolerance.
fn check_limits_tol(value: f64, lower: f64, upper: f64, tolerance: f64) -> (f64, bool) {
    if value > upper {
        return (upper, value > upper + tolerance);
    }
    if value < lower {
        return (lower, value < lower - tolerance);
    }
    (value, false)
}

impl Plotter {
    /// Plot a straight segment from the current position with the given
    /// entry and exit velocities. `ignore_limits` is used by manual
    /// moves that deliberately disregard the travel rectangle.
    pub(crate) fn plot_segment(&mut self, dest: XyPoint, v_i: f64, v_f: f64, ignore_limits: bool) {
        self.pause_res_check();

        if self.status.resume.resume_mode || self.status.stopped != 0 {
            debug!(?dest, v_i, v_f, "skipping segment");
        } else {
            debug!(?dest, v_i, v_f, "executing segment");
        }

        if self.status.stopped != 0 {
            self.status.copies_to_plot = 0;
            return;
        }
        let Some(current) = self.f_curr else { return };

        let mut x_dest = dest.x;
        let mut y_dest = dest.y;
        if !ignore_limits {
            let tolerance = self.params.bounds_tolerance;
            let (x, x_flagged) =
                check_limits_tol(x_dest, self.bounds_min.x, self.bounds_max.x, tolerance);
            let (y, y_flagged) =
                check_limits_tol(y_dest, self.bounds_min.y, self.bounds_max.y, tolerance);
            x_dest = x;
            y_dest = y;
            if x_flagged || y_flagged {
                self.warnings.add("bounds");
            }
        }

        let steps = MotorSteps::from_xy(x_dest - current.x, y_dest - current.y, self.step_scale);
        if steps.is_zero() {
            return; // movement under one motor step
        }

        // The rounded steps, not the request, define the actual motion.
        let (dx_rounded, dy_rounded) = steps.to_xy(self.step_scale);
        let seg_length = distance(dx_rounded, dy_rounded);

        let pen_up = self.pen.status.pen_up.unwrap_or(false);
        self.status.stats.add_dist(pen_up, seg_length);

        let limits = ProfileLimits {
            speed_limit: if pen_up { self.speed_penup } else { self.speed_pendown },
            accel_rate: self.active_accel(pen_up),
            time_slice: self.params.time_slice,
            max_step_rate: self.params.max_step_rate,
            min_step_rate: self.params.min_step_rate,
            const_speed: (self.options.const_speed && !pen_up).then_some(self.speed_pendown),
            zero_speed_fallback: self.speed_pendown * self.params.zero_speed_fraction,
        };
        let moves = build_intervals(steps, seg_length, v_i, v_f, &limits);

        let paces = self
            .status
            .gateway
            .as_ref()
            .map(|gw| gw.paces_motion())
            .unwrap_or(false);

        let mut position = current;
        for timed_move in moves {
            if self.status.resume.resume_mode || self.status.stopped != 0 {
                continue; // computed, not emitted
            }
            let (dx, dy) =
                MotorSteps { m1: timed_move.m1, m2: timed_move.m2 }.to_xy(self.step_scale);
            let new_position = XyPoint::new(position.x + dx, position.y + dy);
            self.status.stats.pt_estimate += u64::from(timed_move.duration_ms);

            let move_failed = match self.status.gateway.as_mut() {
                Some(gateway) => gateway
                    .xy_move(timed_move.m2, timed_move.m1, timed_move.duration_ms)
                    .is_err(),
                None => false,
            };
            if move_failed {
                let node = self.node_count;
                self.emit(&format!("Error: USB connection to plotter lost. [Node {node}]"));
                self.status.stopped = -stop_code::USB_LOST;
                self.status.gateway = None;
                return;
            }
            if paces && timed_move.duration_ms > 50 {
                // Sleep through most of the interval; the margin keeps
                // the next command ready before the controller drains.
                thread::sleep(Duration::from_millis(u64::from(timed_move.duration_ms) - 30));
            }

            debug!(
                m1 = timed_move.m1,
                m2 = timed_move.m2,
                ms = timed_move.duration_ms,
                "xy move"
            );
            position = new_position;
            self.f_curr = Some(new_position);
            self.cp.last_known_x = new_position.x - self.pt_first.x;
            self.cp.last_known_y = new_position.y - self.pt_first.y;
        }
    }
}
