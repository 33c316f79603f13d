//! Trajectory planner: polyline to velocity-limited segments.
//!
//! Given an ordered polyline in inches, produce the sequence of segments
//! (destination, entry velocity, exit velocity) that covers it under the
//! acceleration limit, the active speed limit, and a junction-velocity
//! cap at every corner.
//!
//! ## Operation
//!
//! 1. Near-zero-length input segments are filtered out, so that every
//!    retained segment moves at least one motor step.
//! 2. A forward pass assigns each interior vertex the highest velocity
//!    reachable from the previous vertex within the segment length, then
//!    caps it by the cornering limit for the turn at that vertex.
//! 3. A reverse pass re-caps velocities so that every segment can also
//!    decelerate to its exit velocity within its own length.
//!
//! The cornering model treats each corner as a smoothed curve of fixed
//! deviation and limits the junction speed to what centripetal
//! acceleration allows around it, after the GRBL-derived heuristic:
//! <https://onehossshay.wordpress.com/2011/09/24/improving_grbl_cornering_algorithm/>

use tracing::debug;

use crate::velocity::{distance, dot, v_final, v_initial};
use crate::XyPoint;

/// Junction radius factor substituted when a corner is effectively
/// straight-through, so the centripetal cap never binds there.
const STRAIGHT_THROUGH_RFACTOR: f64 = 1e5;

/// Limits under which a trajectory is planned.
#[derive(Debug, Copy, Clone)]
pub struct PlanLimits {
    /// Maximum travel speed in the XY plane, in/s.
    pub speed_limit: f64,
    /// Acceleration (and deceleration) rate, in/s^2.
    pub accel_rate: f64,
    /// Corner deviation, inches. Larger values corner faster.
    pub cornering_delta: f64,
    /// Guard below which a corner counts as straight-through.
    pub corner_epsilon: f64,
    /// Segments shorter than this are merged into their successor.
    pub min_step_dist: f64,
}

/// One planned segment: end point plus entry and exit velocities.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PlannedSegment {
    pub dest: XyPoint,
    pub v_entry: f64,
    pub v_exit: f64,
}

/// Plan a full polyline. `path[0]` is the current pen position; the
/// returned segments cover `path[1..]`. Returns an empty plan for inputs
/// with no usable segments.
pub fn plan_trajectory(path: &[XyPoint], limits: &PlanLimits) -> Vec<PlannedSegment> {
    if path.len() < 2 {
        return Vec::new();
    }

    // Simple two-point path: a straight line needs no cornering analysis.
    if path.len() < 3 {
        debug!("plan_trajectory: straight line, not a curve");
        return vec![PlannedSegment {
            dest: path[1],
            v_entry: 0.0,
            v_exit: 0.0,
        }];
    }

    // Walk the input and drop vertices whose distance from the previously
    // retained vertex is below the one-step threshold.
    let mut dists = vec![0.0f64]; // dists[i]: length of the segment arriving at vertex i
    let mut vels = vec![0.0f64]; // vels[i]: speed when arriving at vertex i
    let mut vectors: Vec<XyPoint> = Vec::new(); // unit vector along each retained segment
    let mut trimmed: Vec<XyPoint> = Vec::new(); // retained destinations

    let mut last = path[0];
    for point in &path[1..] {
        let dx = point.x - last.x;
        let dy = point.y - last.y;
        let dist = distance(dx, dy);
        if dist >= limits.min_step_dist {
            dists.push(dist);
            vectors.push(XyPoint::new(dx / dist, dy / dist));
            trimmed.push(*point);
            last = *point;
        }
    }

    let traj_length = dists.len();

    if traj_length < 2 {
        debug!("plan_trajectory: no well-defined segments after trimming");
        return Vec::new();
    }
    if traj_length < 3 {
        debug!("plan_trajectory: single usable segment after trimming");
        return vec![PlannedSegment {
            dest: trimmed[0],
            v_entry: 0.0,
            v_exit: 0.0,
        }];
    }

    // Distance needed to reach full speed from rest: x = v^2 / (2 a).
    let t_max = limits.speed_limit / limits.accel_rate;
    let accel_dist = 0.5 * limits.accel_rate * t_max * t_max;

    let delta = limits.cornering_delta;

    // Forward pass: what speed can each interior vertex be reached at?
    for i in 1..traj_length - 1 {
        let d_current = dists[i];
        let v_prev_exit = vels[i - 1];

        let mut v_current_max = if d_current > accel_dist {
            // Room to reach full speed (or stop fully) within this segment.
            limits.speed_limit
        } else {
            v_final(v_prev_exit, limits.accel_rate, d_current).min(limits.speed_limit)
        };

        // Cornering cap. The dot product of the adjacent unit vectors is
        // the cosine of the deflection between incoming and outgoing
        // directions; the sign flip converts to the cos(pi - theta)
        // convention of the smoothed-corner model.
        let cosine_factor = -dot(vectors[i - 1], vectors[i]);
        let root_factor = ((1.0 - cosine_factor) / 2.0).sqrt();
        let denominator = 1.0 - root_factor;
        let r_factor = if denominator > limits.corner_epsilon {
            (delta * root_factor) / denominator
        } else {
            STRAIGHT_THROUGH_RFACTOR
        };
        let v_junction_max = (limits.accel_rate * r_factor).sqrt();

        v_current_max = v_current_max.min(v_junction_max);
        debug!(vertex = i, v = v_current_max, "forward pass velocity");
        vels.push(v_current_max);
    }
    vels.push(0.0); // Final vertex: full stop.

    // Reverse pass: cap each entry velocity so the segment can decelerate
    // to its exit velocity within its own length.
    for i in (1..traj_length).rev() {
        let v_exit = vels[i];
        let v_entry = vels[i - 1];
        let seg_length = dists[i];

        if v_entry > v_exit && seg_length > 0.0 {
            let v_entry_max = v_initial(v_exit, -limits.accel_rate, seg_length);
            if v_entry_max < v_entry {
                debug!(vertex = i - 1, from = v_entry, to = v_entry_max, "reverse pass cap");
                vels[i - 1] = v_entry_max;
            }
        }
    }

    (0..traj_length - 1)
        .map(|i| PlannedSegment {
            dest: trimmed[i],
            v_entry: vels[i],
            v_exit: vels[i + 1],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> PlanLimits {
        PlanLimits {
            speed_limit: 5.0,
            accel_rate: 50.0,
            cornering_delta: 10.0 / 5000.0,
            corner_epsilon: 1e-4,
            min_step_dist: 0.000_443,
        }
    }

    fn feasible(plan: &[PlannedSegment], start: XyPoint, lim: &PlanLimits) -> bool {
        let mut prev = start;
        for seg in plan {
            let d = distance(seg.dest.x - prev.x, seg.dest.y - prev.y);
            let fwd = seg.v_exit.powi(2) <= seg.v_entry.powi(2) + 2.0 * lim.accel_rate * d + 1e-9;
            let rev = seg.v_entry.powi(2) <= seg.v_exit.powi(2) + 2.0 * lim.accel_rate * d + 1e-9;
            if !(fwd && rev) {
                return false;
            }
            prev = seg.dest;
        }
        true
    }

    #[test]
    fn empty_and_single_point_paths_plan_nothing() {
        assert!(plan_trajectory(&[], &limits()).is_empty());
        assert!(plan_trajectory(&[XyPoint::new(1.0, 1.0)], &limits()).is_empty());
    }

    #[test]
    fn two_point_path_is_one_dead_stop_segment() {
        let plan = plan_trajectory(
            &[XyPoint::new(0.0, 0.0), XyPoint::new(10.0, 0.0)],
            &limits(),
        );
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].v_entry, 0.0);
        assert_eq!(plan[0].v_exit, 0.0);
        assert_eq!(plan[0].dest, XyPoint::new(10.0, 0.0));
    }

    #[test]
    fn near_zero_segments_are_trimmed() {
        let plan = plan_trajectory(
            &[
                XyPoint::new(0.0, 0.0),
                XyPoint::new(0.000_1, 0.0), // below one step, dropped
                XyPoint::new(5.0, 0.0),
            ],
            &limits(),
        );
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].dest, XyPoint::new(5.0, 0.0));
    }

    #[test]
    fn sharp_reversal_stops_at_the_cusp() {
        let plan = plan_trajectory(
            &[
                XyPoint::new(0.0, 0.0),
                XyPoint::new(1.0, 0.0),
                XyPoint::new(0.0, 0.0),
            ],
            &limits(),
        );
        assert_eq!(plan.len(), 2);
        assert!(plan[0].v_exit.abs() < 1e-9, "cusp must be a dead stop");
        assert!(plan[1].v_entry.abs() < 1e-9);
    }

    #[test]
    fn collinear_vertices_cruise_through() {
        let lim = limits();
        let plan = plan_trajectory(
            &[
                XyPoint::new(0.0, 0.0),
                XyPoint::new(5.0, 0.0),
                XyPoint::new(10.0, 0.0),
            ],
            &lim,
        );
        assert_eq!(plan.len(), 2);
        // The junction cap resolves to straight-through; only the speed
        // limit binds at the midpoint.
        assert!((plan[0].v_exit - lim.speed_limit).abs() < 1e-9);
    }

    #[test]
    fn gentle_corner_velocity_is_strictly_interior() {
        let lim = limits();
        let plan = plan_trajectory(
            &[
                XyPoint::new(0.0, 0.0),
                XyPoint::new(5.0, 0.0),
                XyPoint::new(10.0, 1.0),
            ],
            &lim,
        );
        assert_eq!(plan.len(), 2);
        let v1 = plan[0].v_exit;
        assert!(v1 > 0.0, "gentle corner should not force a stop, got {v1}");
        assert!(v1 < lim.speed_limit, "corner must slow below limit, got {v1}");
    }

    #[test]
    fn plans_respect_speed_limit_and_feasibility() {
        let lim = limits();
        let path: Vec<XyPoint> = (0..40)
            .map(|i| {
                let t = f64::from(i) * 0.35;
                XyPoint::new(t.cos() * 3.0 + 3.0, t.sin() * 2.0 + 2.0)
            })
            .collect();
        let plan = plan_trajectory(&path, &lim);
        assert!(!plan.is_empty());
        for seg in &plan {
            assert!(seg.v_entry <= lim.speed_limit + 1e-9);
            assert!(seg.v_exit <= lim.speed_limit + 1e-9);
        }
        assert!(feasible(&plan, path[0], &lim));
    }

    #[test]
    fn plan_starts_and_ends_at_rest() {
        let path = [
            XyPoint::new(0.0, 0.0),
            XyPoint::new(2.0, 0.5),
            XyPoint::new(4.0, 0.0),
            XyPoint::new(6.0, 0.5),
        ];
        let plan = plan_trajectory(&path, &limits());
        assert_eq!(plan.first().unwrap().v_entry, 0.0);
        assert_eq!(plan.last().unwrap().v_exit, 0.0);
    }
}
