//! End-to-end scenarios against the simulated controller: straight
//! lines, reversals, bounds clipping, and the full pause/resume cycle.

use plotter_host::{Mode, Params};
use serde_json::json;
use sim::{
    layered_digest, line_digest, pen_down_moves, run_plot, test_options, test_params,
    zigzag_digest, SmMove,
};

fn sum_axes(moves: &[SmMove]) -> (i64, i64) {
    moves.iter().fold((0, 0), |(a, b), mv| {
        (a + i64::from(mv.axis1), b + i64::from(mv.axis2))
    })
}

#[test]
fn straight_line_plots_a_trapezoid_and_returns_home() {
    let digest = line_digest(&[[0.0, 0.0], [10.0, 0.0]]);
    let mut doc = json!({});
    let run = run_plot(&digest, test_options(), test_params(), &mut doc, |_| {});
    assert_eq!(run.exit, 0);

    // 10 inches of +X at 2032 steps/inch: both motors net 20320 steps
    // while the pen is down.
    let down = pen_down_moves(&run.state);
    assert_eq!(sum_axes(&down), (20320, 20320));

    // Accel 0.1 s + cruise 1.9 s + decel 0.1 s.
    let total_ms: u64 = down.iter().map(|m| u64::from(m.duration_ms)).sum();
    assert!((total_ms as i64 - 2100).abs() <= 2, "expected ~2100 ms, got {total_ms}");

    // Return home leaves the net command stream balanced.
    assert_eq!(run.signed_totals(), (0, 0));
    let position = run.plotter.position().unwrap();
    assert!(position.x.abs() < 1e-9 && position.y.abs() < 1e-9);
}

#[test]
fn no_interval_exceeds_the_step_rate_limit() {
    let digest = zigzag_digest();
    let mut doc = json!({});
    let run = run_plot(&digest, test_options(), test_params(), &mut doc, |_| {});
    assert_eq!(run.exit, 0);
    let params = test_params();
    for mv in run.moves() {
        let dt = f64::from(mv.duration_ms).max(1.0);
        assert!((f64::from(mv.axis1) / dt).abs() < params.max_step_rate);
        assert!((f64::from(mv.axis2) / dt).abs() < params.max_step_rate);
    }
}

#[test]
fn sharp_reversal_comes_back_to_the_start() {
    let digest = line_digest(&[[0.0, 0.0], [1.0, 0.0], [0.0, 0.0]]);
    let mut doc = json!({});
    let run = run_plot(&digest, test_options(), test_params(), &mut doc, |_| {});
    assert_eq!(run.exit, 0);
    // The cusp forces a dead stop; the pen-down stream nets to zero.
    assert_eq!(sum_axes(&pen_down_moves(&run.state)), (0, 0));
    let position = run.plotter.position().unwrap();
    assert!(position.x.abs() < 1e-9 && position.y.abs() < 1e-9);
}

#[test]
fn sub_step_segment_is_a_no_op() {
    let digest = line_digest(&[[0.0, 0.0], [0.0001, 0.0]]);
    let mut doc = json!({});
    let run = run_plot(&digest, test_options(), test_params(), &mut doc, |_| {});
    assert_eq!(run.exit, 0);
    assert!(run.moves().is_empty(), "a sub-step segment must emit nothing");
    let position = run.plotter.position().unwrap();
    assert_eq!((position.x, position.y), (0.0, 0.0));
}

#[test]
fn out_of_bounds_travel_is_clipped_with_a_warning() {
    let digest = line_digest(&[[0.0, 0.0], [100.0, 0.0]]);
    let params = Params {
        x_travel: Some(8.5),
        ..test_params()
    };
    let mut doc = json!({});
    let run = run_plot(&digest, test_options(), params, &mut doc, |_| {});
    assert_eq!(run.exit, 0);
    assert!(run.plotter.warnings.contains("bounds"));

    // Peak cumulative travel on each motor corresponds to x = 8.5 in.
    let mut cumulative = 0i64;
    let mut peak = 0i64;
    for mv in pen_down_moves(&run.state) {
        cumulative += i64::from(mv.axis1);
        peak = peak.max(cumulative);
    }
    assert_eq!(peak, (2032.0f64 * 8.5).round() as i64);
}

#[test]
fn button_pause_then_resume_replays_to_the_same_plot() {
    let digest = zigzag_digest();

    // Reference: one uninterrupted run.
    let mut scratch_doc = json!({});
    let scratch = run_plot(&digest, test_options(), test_params(), &mut scratch_doc, |_| {});
    assert_eq!(scratch.exit, 0);
    let scratch_down = sum_axes(&pen_down_moves(&scratch.state));

    // Paused run: the button latches after the third move.
    let mut doc = json!({});
    let paused = run_plot(&digest, test_options(), test_params(), &mut doc, |state| {
        state.press_button_after_moves = Some(3);
    });
    assert_eq!(paused.exit, 102);
    assert!(paused.message_text().contains("button press"));
    assert!(paused.message_text().contains("resume feature"));

    // The checkpoint captured progress and the pen was raised.
    let checkpoint = doc.get("plotdata").expect("checkpoint must be written");
    assert!(checkpoint["node"].as_u64().unwrap() > 0);
    assert!(checkpoint["paused_x"].as_f64().unwrap() > 0.0);
    let last_pen_op = paused.state.lock().unwrap().pen_ops.last().copied();
    assert_eq!(last_pen_op.map(|(up, _)| up), Some(true), "pen must end raised");

    // Once stopped, no further nonzero move was commanded: the stream
    // ends with the pen raise.
    {
        let state = paused.state.lock().unwrap();
        let last_sp = state.commands.iter().rposition(|c| c.starts_with("SP,1")).unwrap();
        let stray_move = state.commands[last_sp..]
            .iter()
            .any(|c| c.starts_with("SM,") && !c.ends_with(",0,0"));
        assert!(!stray_move, "no timed move may follow the pause");
    }

    // Resume from the checkpoint and finish the plot.
    let mut resume_options = test_options();
    resume_options.mode = Mode::ResPlot;
    let resumed = run_plot(&digest, resume_options, test_params(), &mut doc, |_| {});
    assert_eq!(resumed.exit, 0);

    let paused_down = sum_axes(&pen_down_moves(&paused.state));
    let resumed_down = sum_axes(&pen_down_moves(&resumed.state));
    assert_eq!(
        (paused_down.0 + resumed_down.0, paused_down.1 + resumed_down.1),
        scratch_down,
        "pause plus resume must draw exactly the uninterrupted plot"
    );
    let position = resumed.plotter.position().unwrap();
    assert!(position.x.abs() < 1e-9 && position.y.abs() < 1e-9, "must end at home");

    // A completed plot clears its stored progress.
    assert_eq!(doc["plotdata"]["layer"].as_i64(), Some(-2));
}

#[test]
fn return_home_preserves_the_checkpoint_for_a_later_resume() {
    let digest = zigzag_digest();

    let mut doc = json!({});
    let paused = run_plot(&digest, test_options(), test_params(), &mut doc, |state| {
        state.press_button_after_moves = Some(3);
    });
    assert_eq!(paused.exit, 102);
    let saved_node = doc["plotdata"]["node"].clone();
    let saved_paused_x = doc["plotdata"]["paused_x"].clone();

    // Walk home pen-up.
    let mut home_options = test_options();
    home_options.mode = Mode::ResHome;
    let homed = run_plot(&digest, home_options, test_params(), &mut doc, |_| {});
    assert_eq!(homed.exit, 0);
    let position = homed.plotter.position().unwrap();
    assert!(position.x.abs() < 1e-9 && position.y.abs() < 1e-9);
    assert!(
        pen_down_moves(&homed.state).is_empty(),
        "return home must never draw"
    );

    // The progress record survived the home trip.
    assert_eq!(doc["plotdata"]["node"], saved_node);
    assert_eq!(doc["plotdata"]["paused_x"], saved_paused_x);
    assert!(doc["plotdata"]["last_known_x"].as_f64().unwrap().abs() < 1e-9);

    // Resuming now must first travel back out to the paused position.
    let mut resume_options = test_options();
    resume_options.mode = Mode::ResPlot;
    let resumed = run_plot(&digest, resume_options, test_params(), &mut doc, |_| {});
    assert_eq!(resumed.exit, 0);
    let bootstrap = resumed.moves()[0];
    assert!(
        bootstrap.axis1 != 0 || bootstrap.axis2 != 0,
        "resume after home starts with a real pen-up travel"
    );
    let position = resumed.plotter.position().unwrap();
    assert!(position.x.abs() < 1e-9 && position.y.abs() < 1e-9);
}

#[test]
fn return_home_refuses_when_already_home() {
    let digest = zigzag_digest();
    let mut doc = json!({
        "plotdata": {
            "application": "plotter-host",
            "model": "1",
            "plob_version": "2.1",
            "layer": -1,
            "node": 5,
            "last_path": 1,
            "node_after_path": 4,
            "last_known_x": 0.0,
            "last_known_y": 0.0,
            "paused_x": 1.0,
            "paused_y": 0.5
        }
    });
    let mut options = test_options();
    options.mode = Mode::ResHome;
    let run = run_plot(&digest, options, test_params(), &mut doc, |_| {});
    assert!(run.message_text().contains("already at Home"));
    assert!(run.moves().is_empty());
}

#[test]
fn return_home_requires_resume_data() {
    let digest = zigzag_digest();
    let mut doc = json!({});
    let mut options = test_options();
    options.mode = Mode::ResHome;
    let run = run_plot(&digest, options, test_params(), &mut doc, |_| {});
    assert!(run.message_text().contains("No resume data"));
    assert!(run.moves().is_empty());
}

#[test]
fn bang_layer_pauses_programmatically_and_resumes() {
    let digest = layered_digest(vec![
        ("1".to_string(), vec![vec![[0.0, 0.0], [1.0, 0.0]]]),
        ("!2".to_string(), vec![vec![[1.0, 1.0], [2.0, 1.0]]]),
    ]);

    let mut doc = json!({});
    let run = run_plot(&digest, test_options(), test_params(), &mut doc, |_| {});
    assert_eq!(run.exit, 1, "a bang layer stops with the programmatic code");
    assert!(run.message_text().contains("paused programmatically"));

    let mut resume_options = test_options();
    resume_options.mode = Mode::ResPlot;
    let resumed = run_plot(&digest, resume_options, test_params(), &mut doc, |_| {});
    assert_eq!(resumed.exit, 0);
    // The second layer's path is one inch of +X, pen down.
    assert_eq!(sum_axes(&pen_down_moves(&resumed.state)), (2032, 2032));
}

#[test]
fn layers_mode_plots_only_the_selected_layer() {
    let digest = layered_digest(vec![
        ("1".to_string(), vec![vec![[0.0, 0.0], [3.0, 0.0]]]),
        ("2".to_string(), vec![vec![[0.0, 0.0], [1.0, 1.0]]]),
    ]);
    let mut options = test_options();
    options.mode = Mode::Layers;
    options.layer = 2;
    let mut doc = json!({});
    let run = run_plot(&digest, options, test_params(), &mut doc, |_| {});
    assert_eq!(run.exit, 0);
    // Only layer 2: one inch diagonal, so motor 1 moves 2*2032, motor 2
    // nets zero.
    assert_eq!(sum_axes(&pen_down_moves(&run.state)), (4064, 0));
}

#[test]
fn lost_connection_stops_with_code_104() {
    let digest = zigzag_digest();
    let mut doc = json!({});
    let run = run_plot(&digest, test_options(), test_params(), &mut doc, |state| {
        state.fail_after_moves = Some(2);
    });
    assert_eq!(run.exit, 104);
    assert!(run.message_text().contains("USB connection"));
}

#[test]
fn low_voltage_records_a_warning() {
    let digest = line_digest(&[[0.0, 0.0], [1.0, 0.0]]);
    let mut doc = json!({});
    let run = run_plot(&digest, test_options(), test_params(), &mut doc, |state| {
        state.voltage = 200;
    });
    assert_eq!(run.exit, 0);
    assert!(run.plotter.warnings.contains("voltage"));
    assert!(run.message_text().contains("Low voltage"));
}

#[test]
fn button_press_between_copies_stops_with_code_2() {
    let digest = line_digest(&[[0.0, 0.0], [1.0, 0.0]]);

    // Count the moves in one full copy, then script the press so it can
    // only be noticed in the between-copies delay.
    let mut scratch_doc = json!({});
    let scratch = run_plot(&digest, test_options(), test_params(), &mut scratch_doc, |_| {});
    let moves_per_copy = scratch.moves().len();

    let mut options = test_options();
    options.copies = 2;
    options.page_delay = 1;
    let mut doc = json!({});
    let run = run_plot(&digest, options, test_params(), &mut doc, |state| {
        state.press_button_after_moves = Some(moves_per_copy);
    });
    assert_eq!(run.exit, 2);
    assert!(run.message_text().contains("between copies"));
}

#[test]
fn continuous_mode_keeps_plotting_until_paused() {
    let digest = line_digest(&[[0.0, 0.0], [1.0, 0.0]]);
    let mut options = test_options();
    options.copies = 0; // continuous
    options.page_delay = 0;
    let mut doc = json!({});
    let run = run_plot(&digest, options, test_params(), &mut doc, |state| {
        // Press while the second copy is being drawn. The threshold must
        // land between two of a copy's segment checks, not on the
        // button-priming read at a copy boundary, which would discard it.
        state.press_button_after_moves = Some(20);
    });
    assert_eq!(run.exit, 102);
    assert!(run.moves().len() >= 20, "the plot must run past the first copy");
}

#[test]
fn setup_toggle_only_moves_the_pen() {
    let digest = line_digest(&[[0.0, 0.0], [1.0, 0.0]]);
    let mut options = test_options();
    options.mode = Mode::Toggle;
    let mut doc = json!({});
    let run = run_plot(&digest, options, test_params(), &mut doc, |_| {});
    assert_eq!(run.exit, 0);
    assert!(run.moves().is_empty());
    assert!(!run.state.lock().unwrap().pen_ops.is_empty());
    assert!(doc.get("plotdata").is_none(), "setup modes never checkpoint");
}
