//! One-call plot runner and digest builders for the end-to-end tests.

use std::sync::{Arc, Mutex};

use plotter_host::{DocDigest, Layer, Options, Params, PathItem, Plotter, PLOB_VERSION};
use serde_json::Value;

use crate::fake_ebb::{FakeEbb, FakeEbbState, SmMove};

/// Options tuned so the physical speeds come out in round numbers:
/// pen speeds at 110 percent put the speed limits themselves in effect.
pub fn test_options() -> Options {
    Options {
        speed_pendown: 110,
        speed_penup: 110,
        accel: 100,
        resolution: 1,
        page_delay: 0,
        ..Options::default()
    }
}

/// Params giving 5 in/s speed limit, 50 in/s^2 acceleration, and the
/// standard 2032 steps/inch high-resolution scale.
pub fn test_params() -> Params {
    Params {
        speed_lim_xy_hr: 5.0,
        accel_rate: 50.0,
        accel_rate_pu: 50.0,
        ..Params::default()
    }
}

/// A one-layer digest holding a single polyline.
pub fn line_digest(vertices: &[[f64; 2]]) -> DocDigest {
    layered_digest(vec![("1".to_string(), vec![vertices.to_vec()])])
}

/// A digest with named layers, each holding polylines.
pub fn layered_digest(layers: Vec<(String, Vec<Vec<[f64; 2]>>)>) -> DocDigest {
    DocDigest {
        name: "sim".to_string(),
        width: 11.0,
        height: 8.5,
        plob_version: PLOB_VERSION.to_string(),
        layers: layers
            .into_iter()
            .map(|(name, paths)| Layer {
                name,
                paths: paths.into_iter().map(|vertices| PathItem { vertices }).collect(),
            })
            .collect(),
    }
}

/// The standard multi-segment test path: a zigzag whose corners force
/// the planner through real junction decisions.
pub fn zigzag_digest() -> DocDigest {
    line_digest(&[[0.0, 0.0], [2.0, 0.5], [4.0, 0.0], [6.0, 0.5], [8.0, 0.0]])
}

/// Everything observable after a simulated run.
pub struct Run {
    pub exit: i32,
    pub state: Arc<Mutex<FakeEbbState>>,
    pub messages: Arc<Mutex<Vec<String>>>,
    pub plotter: Plotter,
}

impl Run {
    pub fn moves(&self) -> Vec<SmMove> {
        self.state.lock().unwrap().moves.clone()
    }

    pub fn signed_totals(&self) -> (i64, i64) {
        let state = self.state.lock().unwrap();
        (state.steps1, state.steps2)
    }

    pub fn message_text(&self) -> String {
        self.messages.lock().unwrap().join("\n")
    }
}

/// Run one plot invocation against the simulated controller.
/// `configure` tweaks the controller state (button scripting, voltage)
/// before the run starts; `doc` carries the checkpoint between runs.
pub fn run_plot(
    digest: &DocDigest,
    options: Options,
    params: Params,
    doc: &mut Value,
    configure: impl FnOnce(&mut FakeEbbState),
) -> Run {
    let (link, state) = FakeEbb::new();
    configure(&mut state.lock().unwrap());

    let mut plotter = Plotter::new(options, params).expect("test options must validate");
    let messages: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_messages = messages.clone();
    plotter.set_message_sink(Box::new(move |msg| {
        sink_messages.lock().unwrap().push(msg.to_string());
    }));
    assert!(plotter.attach_link(Box::new(link), false), "simulated connect cannot fail");

    let exit = plotter.run(digest, doc);
    Run { exit, state, messages, plotter }
}

/// Extract the moves commanded while the pen was down, by replaying the
/// recorded command stream.
pub fn pen_down_moves(state: &Arc<Mutex<FakeEbbState>>) -> Vec<SmMove> {
    let state = state.lock().unwrap();
    let mut pen_up = true;
    let mut collected = Vec::new();
    for command in &state.commands {
        if let Some(rest) = command.strip_prefix("SP,") {
            pen_up = rest.starts_with('1');
        } else if let Some(rest) = command.strip_prefix("SM,") {
            let fields: Vec<i64> = rest.split(',').filter_map(|f| f.parse().ok()).collect();
            if fields.len() == 3 && (fields[1] != 0 || fields[2] != 0) && !pen_up {
                collected.push(SmMove {
                    duration_ms: fields[0] as u32,
                    axis1: fields[1] as i32,
                    axis2: fields[2] as i32,
                });
            }
        }
    }
    collected
}
