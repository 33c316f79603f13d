//! Interval generation for one planned segment.
//!
//! Slices a straight segment with known entry and exit velocities into a
//! list of fixed-duration constant-velocity step commands. The velocity
//! profile is chosen by a four-way case split:
//!
//! | Case | When | Shape |
//! |---|---|---|
//! | Trapezoid | segment long enough to reach the speed limit | accel, cruise, decel |
//! | Triangle | cannot reach the limit, but fits a real ramp pair | accel to a local peak, decel |
//! | Linear ramp | too short for a triangle (under ~5 intervals) | one velocity interpolation |
//! | Constant velocity | const-speed pen-down mode, or no feasible ramp | single interval |
//!
//! Interval positions are accumulated in inches and may drift slightly
//! from the true segment length; a final scaling pass projects the
//! cumulative distances onto the exact rounded motor-step totals, so the
//! emitted step counts always sum to the requested steps. Per-interval
//! fixups then enforce a 1 ms duration floor, drop axes moving too slowly
//! to command, and stretch durations that would exceed the motor step
//! rate limit.

use tracing::debug;

use crate::kinematics::MotorSteps;

/// Limits and mode switches for interval generation.
#[derive(Debug, Copy, Clone)]
pub struct ProfileLimits {
    /// Maximum travel speed for this segment, in/s.
    pub speed_limit: f64,
    /// Acceleration rate, in/s^2.
    pub accel_rate: f64,
    /// Nominal duration of one interval, seconds.
    pub time_slice: f64,
    /// Hard per-axis rate ceiling, steps per millisecond.
    pub max_step_rate: f64,
    /// Below this per-axis rate (steps/ms) an axis is dropped from the
    /// interval rather than commanded.
    pub min_step_rate: f64,
    /// `Some(v)`: constant-speed pen-down mode at `v` in/s.
    pub const_speed: Option<f64>,
    /// Velocity used when a constant-velocity fallback is needed and both
    /// endpoint velocities are zero.
    pub zero_speed_fallback: f64,
}

/// One timed move: signed step deltas for both motors and a duration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct XyMove {
    pub m1: i32,
    pub m2: i32,
    pub duration_ms: u32,
}

/// Build the timed step intervals covering one segment.
///
/// `steps` is the rounded motor-step total for the segment and
/// `seg_length` the Cartesian length (inches) recomputed from those
/// rounded steps. Entry/exit velocities above the speed limit are
/// clamped, not rejected.
pub fn build_intervals(
    steps: MotorSteps,
    seg_length: f64,
    v_i: f64,
    v_f: f64,
    lim: &ProfileLimits,
) -> Vec<XyMove> {
    if steps.is_zero() || seg_length <= 0.0 {
        return Vec::new();
    }

    let mut vi = v_i.min(lim.speed_limit);
    let vf = v_f.min(lim.speed_limit);

    // Time and distance needed to ramp between each endpoint velocity and
    // the speed limit.
    let t_accel_max = (lim.speed_limit - vi) / lim.accel_rate;
    let t_decel_max = (lim.speed_limit - vf) / lim.accel_rate;
    let accel_dist_max = vi * t_accel_max + 0.5 * lim.accel_rate * t_accel_max * t_accel_max;
    let decel_dist_max = vf * t_decel_max + 0.5 * lim.accel_rate * t_decel_max * t_decel_max;

    let ts = lim.time_slice;

    let mut durations: Vec<u64> = Vec::new(); // cumulative, ms
    let mut dist_marks: Vec<f64> = Vec::new(); // cumulative, inches
    let mut time_elapsed = 0.0f64;
    let mut position = 0.0f64;
    let mut velocity = vi;
    let mut constant_vel_mode = lim.const_speed.is_some();

    if !constant_vel_mode {
        let max_vel_time_estimate = seg_length / lim.speed_limit;

        if seg_length > accel_dist_max + decel_dist_max + ts * lim.speed_limit
            && max_vel_time_estimate > 4.0 * ts
        {
            // Trapezoid: we will reach full cruising speed.
            debug!("profile: trapezoid");
            let speed_max = lim.speed_limit;

            let intervals = (t_accel_max / ts).floor() as u32;
            if intervals > 0 {
                let time_per_interval = t_accel_max / f64::from(intervals);
                let velocity_step = (speed_max - vi) / (f64::from(intervals) + 1.0);
                for _ in 0..intervals {
                    velocity += velocity_step;
                    time_elapsed += time_per_interval;
                    position += velocity * time_per_interval;
                    durations.push((time_elapsed * 1000.0).round() as u64);
                    dist_marks.push(position);
                }
            }

            // Cruise phase, if there is time for at least one interval at
            // full speed. Long cruises are chunked so that each command
            // stays well inside the controller's duration range.
            let coasting_distance = seg_length - (accel_dist_max + decel_dist_max);
            if coasting_distance > ts * speed_max {
                velocity = speed_max;
                let cruise_interval = 20.0 * ts;
                let mut ct = coasting_distance / velocity;
                while ct > cruise_interval {
                    ct -= cruise_interval;
                    time_elapsed += cruise_interval;
                    position += velocity * cruise_interval;
                    durations.push((time_elapsed * 1000.0).round() as u64);
                    dist_marks.push(position);
                }
                time_elapsed += ct;
                position += velocity * ct;
                durations.push((time_elapsed * 1000.0).round() as u64);
                dist_marks.push(position);
            }

            let intervals = (t_decel_max / ts).floor() as u32;
            if intervals > 0 {
                let time_per_interval = t_decel_max / f64::from(intervals);
                let velocity_step = (speed_max - vf) / (f64::from(intervals) + 1.0);
                for _ in 0..intervals {
                    velocity -= velocity_step;
                    time_elapsed += time_per_interval;
                    position += velocity * time_per_interval;
                    durations.push((time_elapsed * 1000.0).round() as u64);
                    dist_marks.push(position);
                }
            }
        } else {
            // Triangle: accelerate to a local peak below the speed limit,
            // then decelerate. When the segment is only slightly shorter
            // than the full ramp pair, a reduced local acceleration keeps
            // the peak off the limit.
            debug!("profile: triangle");
            let ramp_dist = accel_dist_max + decel_dist_max;
            let accel_local = if seg_length >= 0.9 * ramp_dist {
                if ramp_dist == 0.0 {
                    lim.accel_rate
                } else {
                    0.9 * (ramp_dist / seg_length) * lim.accel_rate
                }
            } else {
                lim.accel_rate
            };

            // Quadratic solution for the acceleration time that covers the
            // segment: accel from vi to the peak, decel to vf.
            let mut ta = if accel_local > 0.0 {
                ((2.0 * vi * vi + 2.0 * vf * vf + 4.0 * accel_local * seg_length).sqrt()
                    - 2.0 * vi)
                    / (2.0 * accel_local)
            } else {
                0.0
            };
            let v_peak = vi + accel_local * ta;

            let intervals = (ta / ts).floor() as i64;
            if intervals == 0 {
                ta = 0.0;
            }
            let td = if accel_local > 0.0 {
                ta - (vf - vi) / accel_local
            } else {
                0.0
            };
            let d_intervals = (td / ts).floor() as i64;

            if intervals + d_intervals > 4 {
                if intervals > 0 {
                    let time_per_interval = ta / intervals as f64;
                    let velocity_step = (v_peak - vi) / (intervals as f64 + 1.0);
                    for _ in 0..intervals {
                        velocity += velocity_step;
                        time_elapsed += time_per_interval;
                        position += velocity * time_per_interval;
                        durations.push((time_elapsed * 1000.0).round() as u64);
                        dist_marks.push(position);
                    }
                }
                if d_intervals > 0 {
                    let time_per_interval = td / d_intervals as f64;
                    let velocity_step = (v_peak - vf) / (d_intervals as f64 + 1.0);
                    for _ in 0..d_intervals {
                        velocity -= velocity_step;
                        time_elapsed += time_per_interval;
                        position += velocity * time_per_interval;
                        durations.push((time_elapsed * 1000.0).round() as u64);
                        dist_marks.push(position);
                    }
                }
            } else {
                // Linear ramp: too few intervals for a real triangle.
                // Boost the starting speed toward the peak, then
                // interpolate velocity directly between the endpoints.
                debug!("profile: linear ramp");
                vi = (v_peak + vi) / 2.0;
                velocity = vi;

                let mut local_accel = (vf * vf - vi * vi) / (2.0 * seg_length);
                local_accel = local_accel.clamp(-lim.accel_rate, lim.accel_rate);

                if local_accel == 0.0 {
                    // Equal endpoint velocities: nothing to ramp.
                    constant_vel_mode = true;
                } else {
                    let t_segment = (vf - vi) / local_accel;
                    let intervals = (t_segment / ts).floor() as i64;
                    if intervals > 1 {
                        let time_per_interval = t_segment / intervals as f64;
                        let velocity_step = (vf - vi) / (intervals as f64 + 1.0);
                        for _ in 0..intervals {
                            velocity += velocity_step;
                            time_elapsed += time_per_interval;
                            position += velocity * time_per_interval;
                            durations.push((time_elapsed * 1000.0).round() as u64);
                            dist_marks.push(position);
                        }
                    } else {
                        // Not even two intervals fit; run the whole
                        // segment at the fastest plausible speed.
                        vi = v_peak;
                        constant_vel_mode = true;
                    }
                }
            }
        }
    }

    if constant_vel_mode {
        // Single interval at one fixed velocity.
        velocity = if let Some(v) = lim.const_speed {
            v
        } else if vf > vi {
            vf
        } else if vi > vf {
            vi
        } else if vi > 0.0 {
            vi
        } else {
            lim.zero_speed_fallback
        };
        debug!(velocity, "profile: constant velocity");

        time_elapsed = seg_length / velocity;
        durations.push((time_elapsed * 1000.0).round() as u64);
        dist_marks.push(seg_length);
        position += seg_length;
    }

    // Scale the accumulated distances onto the exact rounded step totals,
    // so the per-interval deltas sum to precisely (m1, m2).
    let mut dest1: Vec<i32> = Vec::with_capacity(dist_marks.len());
    let mut dest2: Vec<i32> = Vec::with_capacity(dist_marks.len());
    for mark in &dist_marks {
        let fraction = mark / position;
        dest1.push((fraction * f64::from(steps.m1)).round() as i32);
        dest2.push((fraction * f64::from(steps.m2)).round() as i32);
    }

    let mut out = Vec::with_capacity(dest1.len());
    let mut prev1 = 0i32;
    let mut prev2 = 0i32;
    let mut prev_time = 0u64;

    for index in 0..dest1.len() {
        let mut move_steps1 = dest1[index] - prev1;
        let mut move_steps2 = dest2[index] - prev2;
        let mut move_time = durations[index].saturating_sub(prev_time);
        prev_time = durations[index];

        move_time = move_time.max(1); // no zero-duration moves

        // An axis below the minimum commandable rate sits out this
        // interval; a later interval makes up the difference.
        if (f64::from(move_steps1) / move_time as f64).abs() < lim.min_step_rate {
            move_steps1 = 0;
        }
        if (f64::from(move_steps2) / move_time as f64).abs() < lim.min_step_rate {
            move_steps2 = 0;
        }

        // Rounding can push an interval over the step-rate ceiling;
        // stretch its duration until both axes are back under.
        while (f64::from(move_steps1) / move_time as f64).abs() >= lim.max_step_rate
            || (f64::from(move_steps2) / move_time as f64).abs() >= lim.max_step_rate
        {
            move_time += 1;
            debug!("profile: stretched interval to avoid overspeed");
        }

        prev1 += move_steps1;
        prev2 += move_steps2;

        if move_steps1 != 0 || move_steps2 != 0 {
            out.push(XyMove {
                m1: move_steps1,
                m2: move_steps2,
                duration_ms: move_time as u32,
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ProfileLimits {
        ProfileLimits {
            speed_limit: 5.0,
            accel_rate: 50.0,
            time_slice: 0.030,
            max_step_rate: 24.995,
            min_step_rate: 0.002,
            const_speed: None,
            zero_speed_fallback: 0.5,
        }
    }

    fn totals(moves: &[XyMove]) -> (i64, i64, u64) {
        moves.iter().fold((0, 0, 0), |(a, b, t), mv| {
            (a + i64::from(mv.m1), b + i64::from(mv.m2), t + u64::from(mv.duration_ms))
        })
    }

    #[test]
    fn zero_steps_is_a_no_op() {
        let moves = build_intervals(MotorSteps { m1: 0, m2: 0 }, 0.0001, 0.0, 0.0, &limits());
        assert!(moves.is_empty());
    }

    #[test]
    fn trapezoid_balances_steps_and_time() {
        // 10 inches along +X at step scale 2032: both motors move 20320
        // steps; 0.1 s accel + 1.9 s cruise + 0.1 s decel.
        let steps = MotorSteps::from_xy(10.0, 0.0, 2032.0);
        let moves = build_intervals(steps, 10.0, 0.0, 0.0, &limits());
        let (m1, m2, time_ms) = totals(&moves);
        assert_eq!(m1, 20320);
        assert_eq!(m2, 20320);
        assert!((time_ms as i64 - 2100).abs() <= 2, "expected ~2100 ms, got {time_ms}");
    }

    #[test]
    fn triangle_balances_steps() {
        // 0.45 inches cannot reach the 5 in/s limit (needs 0.5 in), but
        // still fits an accel/decel ramp pair.
        let steps = MotorSteps::from_xy(0.45, 0.0, 2032.0);
        let (dx, _) = steps.to_xy(2032.0);
        let moves = build_intervals(steps, dx, 0.0, 0.0, &limits());
        assert!(moves.len() > 1, "triangle should produce a ramp pair");
        let (m1, m2, _) = totals(&moves);
        assert_eq!(m1, i64::from(steps.m1));
        assert_eq!(m2, i64::from(steps.m2));
    }

    #[test]
    fn short_segment_falls_back_to_single_interval() {
        let steps = MotorSteps::from_xy(0.01, 0.0, 2032.0);
        let (dx, _) = steps.to_xy(2032.0);
        let moves = build_intervals(steps, dx, 0.0, 0.0, &limits());
        assert_eq!(moves.len(), 1);
        let (m1, _, _) = totals(&moves);
        assert_eq!(m1, i64::from(steps.m1));
    }

    #[test]
    fn const_speed_mode_is_one_interval_at_pen_speed() {
        let lim = ProfileLimits {
            const_speed: Some(2.0),
            ..limits()
        };
        let steps = MotorSteps::from_xy(4.0, 0.0, 2032.0);
        let moves = build_intervals(steps, 4.0, 0.0, 0.0, &lim);
        assert_eq!(moves.len(), 1);
        // 4 inches at 2 in/s = 2000 ms
        assert_eq!(moves[0].duration_ms, 2000);
    }

    #[test]
    fn no_interval_breaks_the_step_rate_ceiling() {
        let lim = limits();
        for &(len, vi, vf) in &[
            (10.0, 0.0, 0.0),
            (0.3, 0.0, 5.0),
            (0.3, 5.0, 0.0),
            (2.0, 3.0, 1.0),
            (0.02, 0.0, 0.0),
        ] {
            let steps = MotorSteps::from_xy(len, len * 0.5, 2032.0);
            let (dx, dy) = steps.to_xy(2032.0);
            let seg = (dx * dx + dy * dy).sqrt();
            for mv in build_intervals(steps, seg, vi, vf, &lim) {
                let dt = f64::from(mv.duration_ms);
                assert!(
                    (f64::from(mv.m1) / dt).abs() < lim.max_step_rate,
                    "m1 overspeed in ({len},{vi},{vf})"
                );
                assert!(
                    (f64::from(mv.m2) / dt).abs() < lim.max_step_rate,
                    "m2 overspeed in ({len},{vi},{vf})"
                );
            }
        }
    }

    #[test]
    fn durations_are_at_least_one_millisecond() {
        let steps = MotorSteps::from_xy(0.05, 0.02, 2032.0);
        let (dx, dy) = steps.to_xy(2032.0);
        let seg = (dx * dx + dy * dy).sqrt();
        for mv in build_intervals(steps, seg, 0.0, 0.0, &limits()) {
            assert!(mv.duration_ms >= 1);
        }
    }

    #[test]
    fn diagonal_move_keeps_one_motor_still() {
        // A pure 45-degree move is a single-motor move in CoreXY.
        let steps = MotorSteps::from_xy(1.0, 1.0, 2032.0);
        assert_eq!(steps.m2, 0);
        let (dx, dy) = steps.to_xy(2032.0);
        let seg = (dx * dx + dy * dy).sqrt();
        let moves = build_intervals(steps, seg, 0.0, 0.0, &limits());
        let (m1, m2, _) = totals(&moves);
        assert_eq!(m1, i64::from(steps.m1));
        assert_eq!(m2, 0);
    }
}
