//! Plot orchestration: walks the document digest layer by layer, drives
//! the trajectory planner and segment executor, and threads the
//! pause/resume state machine through every level.

use motion::{plan_trajectory, PlanLimits, StepMode, XyPoint};
use serde_json::Value;
use tracing::debug;

use crate::config::{Mode, Options, Params};
use crate::digest::{DocDigest, Layer, LayerOverride, LayerProps};
use crate::error::HostError;
use crate::gateway::{EbbGateway, SerialLink};
use crate::pen::Pen;
use crate::plotdata::Checkpoint;
use crate::status::{stop_code, PauseFlag, PlotStatus};
use crate::warnings::Warnings;

/// User-facing message sink, injected by the caller. All pause notices
/// and reports go through this single function.
pub type MessageSink = Box<dyn FnMut(&str) + Send>;

/// The plot engine for one invocation.
pub struct Plotter {
    pub options: Options,
    pub params: Params,
    pub status: PlotStatus,
    pub pen: Pen,
    pub warnings: Warnings,
    message: MessageSink,
    pause_flag: Option<PauseFlag>,

    // Derived speed state, refreshed by enable_motors.
    pub(crate) step_mode: StepMode,
    pub(crate) step_scale: f64,
    pub(crate) speed_pendown: f64,
    pub(crate) speed_penup: f64,
    use_layer_speed: bool,
    layer_speed_pendown: Option<u32>,

    // Position state, inches.
    pub(crate) f_curr: Option<XyPoint>,
    pub(crate) pt_first: XyPoint,
    pub(crate) bounds_min: XyPoint,
    pub(crate) bounds_max: XyPoint,

    // Pause/resume counters.
    pub(crate) node_count: u64,
    pathcount: u32,

    // Values destined for the next checkpoint write.
    pub(crate) cp: Checkpoint,
    resume_data_needs_updating: bool,
}

impl Plotter {
    pub fn new(options: Options, params: Params) -> Result<Self, HostError> {
        options.validate()?;
        let mut plotter = Self {
            options,
            params,
            status: PlotStatus::default(),
            pen: Pen::new(),
            warnings: Warnings::new(),
            message: Box::new(|msg| println!("{msg}")),
            pause_flag: None,
            step_mode: StepMode::High,
            step_scale: 0.0,
            speed_pendown: 0.0,
            speed_penup: 0.0,
            use_layer_speed: false,
            layer_speed_pendown: None,
            f_curr: None,
            pt_first: XyPoint::default(),
            bounds_min: XyPoint::default(),
            bounds_max: XyPoint::default(),
            node_count: 0,
            pathcount: 0,
            cp: Checkpoint::default(),
            resume_data_needs_updating: false,
        };
        plotter.enable_motors(); // initialize speed scales (no port yet)
        Ok(plotter)
    }

    /// Replace the default stdout message sink.
    pub fn set_message_sink(&mut self, sink: MessageSink) {
        self.message = sink;
    }

    /// Install the host's one-shot interrupt flag.
    pub fn set_pause_flag(&mut self, flag: PauseFlag) {
        self.pause_flag = Some(flag);
    }

    /// Wrap a serial link in the controller gateway. `external` marks a
    /// caller-owned port that must stay open after the run. On failure
    /// the run is marked stopped with the connect-failure code.
    pub fn attach_link(&mut self, link: Box<dyn SerialLink>, external: bool) -> bool {
        match EbbGateway::connect(link) {
            Ok((gateway, version)) => {
                self.status.gateway = Some(gateway);
                self.status.fw_version = version;
                self.status.port_is_external = external;
                true
            }
            Err(_) => {
                self.emit("Failed to connect to plotter.");
                self.status.stopped = stop_code::CONNECT_FAILED;
                false
            }
        }
    }

    pub(crate) fn emit(&mut self, msg: &str) {
        (self.message)(msg);
    }

    /// Current pause/resume node counter.
    pub fn node_count(&self) -> u64 {
        self.node_count
    }

    /// Current caller-visible position, inches.
    pub fn position(&self) -> Option<XyPoint> {
        self.f_curr
    }

    /// The progress record that the next checkpoint write would persist.
    pub fn checkpoint(&self) -> &Checkpoint {
        &self.cp
    }

    /// Run one invocation against a digest. `doc` is the caller's
    /// document node; the checkpoint is read from it at start and, for
    /// plotting modes, written back at the end. Returns the exit code:
    /// 0 for normal completion, otherwise the positive pause code.
    pub fn run(&mut self, digest: &DocDigest, doc: &mut Value) -> i32 {
        if self.status.stopped > 0 {
            return self.status.stopped; // e.g. connect failure already recorded
        }
        self.status.stats.reset();
        self.f_curr = Some(XyPoint::new(self.params.start_pos_x, self.params.start_pos_y));
        self.pt_first = XyPoint::new(self.params.start_pos_x, self.params.start_pos_y);
        let (x_travel, y_travel) = self.params.travel(self.options.model);
        self.bounds_min = XyPoint::new(0.0, 0.0);
        self.bounds_max = XyPoint::new(x_travel, y_travel);
        self.node_count = 0;
        self.pathcount = 0;
        self.cp = Checkpoint {
            model: self.options.model.to_string(),
            plob_version: digest.plob_version.clone(),
            ..Checkpoint::default()
        };
        if let Some(saved) = Checkpoint::read_from(doc) {
            self.status.resume.absorb(&saved);
        }
        self.resume_data_needs_updating = false;

        match self.options.mode {
            Mode::Plot | Mode::Layers => self.run_copies(digest),
            Mode::ResPlot | Mode::ResHome => self.run_resume(digest),
            Mode::Align | Mode::Toggle | Mode::Cycle => self.setup_command(),
        }

        if self.resume_data_needs_updating {
            self.cp.write_into(doc);
        }

        if self.status.copies_to_plot == 0 {
            if self.status.stopped == 0
                && matches!(
                    self.options.mode,
                    Mode::Plot | Mode::Layers | Mode::ResPlot | Mode::ResHome
                )
            {
                self.emit("Plot complete.");
                if self.options.webhook {
                    let url = self.options.webhook_url.clone().unwrap_or_default();
                    let name = digest.name.clone();
                    self.emit(&format!("Webhook payload ready: plot {name:?} finished ({url})"));
                }
            }
            for line in self.status.stats.report() {
                self.emit(&line);
            }
            let lifts = self.pen.status.lifts;
            self.emit(&format!("Pen lifts: {lifts}"));
        }

        // Final timed motion command, then release the port unless it was
        // supplied by the caller.
        if let Some(gateway) = self.status.gateway.as_mut() {
            let _ = gateway.timed_pause(10);
        }
        if !self.status.port_is_external {
            self.status.gateway = None;
        }

        for msg in self.warnings.messages() {
            self.emit(&msg);
        }
        self.status.stopped.max(0)
    }

    /// The copies loop shared by plot and layers modes, including the
    /// between-copies page delay with its pause polling.
    fn run_copies(&mut self, digest: &DocDigest) {
        self.status.copies_to_plot = if self.options.copies == 0 {
            -1 // continuous plotting until paused
        } else {
            self.options.copies as i32
        };
        while self.status.copies_to_plot != 0 {
            if self.status.stopped != 0 {
                break; // a pause anywhere ends the copies loop
            }
            self.resume_data_needs_updating = true;
            self.cp.randseed = i64::from(rand::random::<u32>()) + 1;
            self.pathcount = 0;
            self.node_count = 0;
            self.cp.node = 0;
            self.cp.last_path = 0;
            self.cp.node_after_path = 0;
            self.cp.layer = match self.options.mode {
                Mode::Layers => self.options.layer as i32,
                _ => -1, // all layers
            };
            self.status.delay_between_copies = false;
            self.status.copies_to_plot -= 1;
            self.plot_document(digest);
            self.status.delay_between_copies = true;

            if self.status.copies_to_plot == 0 || self.status.stopped != 0 {
                continue; // no delay after the last copy, nor when paused
            }
            let mut time_counter = 10 * self.options.page_delay;
            while time_counter > 0 {
                time_counter -= 1;
                if self.status.copies_to_plot != 0 && self.status.stopped == 0 {
                    self.status.stats.page_delays += 100;
                    self.status.stats.pt_estimate += 100;
                    self.sleep_ms(100);
                    self.pause_res_check();
                    if self.status.stopped != 0 {
                        self.status.copies_to_plot = 0;
                    }
                }
            }
        }
    }

    fn run_resume(&mut self, digest: &DocDigest) {
        self.resume_data_needs_updating = true;
        self.resume_plot_setup();
        if self.status.resume.resume_mode {
            self.status.copies_to_plot = 0;
            self.plot_document(digest);
        } else if self.options.mode == Mode::ResHome {
            // A refused home request leaves the stored checkpoint alone.
            if !self.status.resume.data_read {
                self.resume_data_needs_updating = false;
                self.emit("No resume data found; unable to return home.");
                return;
            }
            if !self.status.resume.layer_found {
                self.resume_data_needs_updating = false;
                self.emit("No in-progress plot data found; unable to return to Home position.");
                return;
            }
            let last_known = self.status.resume.last_known_old;
            if last_known.x.abs() < self.params.min_resume_dist
                && last_known.y.abs() < self.params.min_resume_dist
            {
                self.resume_data_needs_updating = false;
                self.emit("Unable to move to Home. (Is the carriage already at Home?)");
                return;
            }
            self.status.copies_to_plot = 0;
            self.plot_document(digest);
            // Preserve the saved progress so a later resume still works.
            self.cp.node = self.status.resume.node_old;
            self.cp.last_path = self.status.resume.last_path_old;
            self.cp.node_after_path = self.status.resume.last_path_nc_old;
            self.cp.paused_x = self.status.resume.paused_old.x;
            self.cp.paused_y = self.status.resume.paused_old.y;
            self.cp.layer = self.status.resume.layer_old;
            self.cp.randseed = self.status.resume.rand_seed_old;
        } else {
            self.emit("No in-progress plot data found in file; unable to resume.");
        }
    }

    /// Initialization for resuming plots: restore the saved counters and
    /// position, raise the pen, and (for resume-plot) arm resume mode.
    fn resume_plot_setup(&mut self) {
        let layer_old = self.status.resume.layer_old;
        self.status.resume.layer_found =
            self.status.resume.data_read && (-1..1001).contains(&layer_old);
        if !self.status.resume.layer_found || self.status.resume.node_old == 0 {
            return;
        }
        self.cp.last_path = self.status.resume.last_path_old;
        self.cp.node_after_path = self.status.resume.last_path_nc_old;
        self.cp.last_known_x = self.status.resume.last_known_old.x;
        self.cp.last_known_y = self.status.resume.last_known_old.y;
        self.cp.layer = layer_old;
        self.cp.randseed = self.status.resume.rand_seed_old;
        self.cp.row = self.status.resume.row_old;
        self.status.resume.node_target = self.status.resume.node_old;

        self.pen_servo_setup();
        self.pen_raise();
        self.enable_motors();
        if self.options.mode == Mode::ResPlot {
            self.status.resume.resume_mode = true;
        }
        let resume_at = XyPoint::new(
            self.status.resume.last_known_old.x + self.pt_first.x,
            self.status.resume.last_known_old.y + self.pt_first.y,
        );
        self.f_curr = Some(resume_at);
        debug!(layer = layer_old, node_target = self.status.resume.node_target, "resume setup");
    }

    /// Plot one full document pass.
    fn plot_document(&mut self, digest: &DocDigest) {
        if self.status.gateway.is_some() {
            self.check_voltage();
            self.prime_button();
        }
        self.pen_servo_setup();
        self.pen_raise();
        self.enable_motors();

        if matches!(self.options.mode, Mode::ResHome | Mode::ResPlot) {
            if self.status.resume.resume_mode {
                // Pen-up travel to the paused position; emitted for real,
                // so resume mode is lifted just for this one segment.
                let dest = XyPoint::new(
                    self.status.resume.paused_old.x + self.pt_first.x,
                    self.status.resume.paused_old.y + self.pt_first.y,
                );
                self.status.resume.resume_mode = false;
                self.plot_segment(dest, 0.0, 0.0, false);
                self.status.resume.resume_mode = true;
                self.node_count = 0; // cleared only after the travel move
                self.pathcount = 0;
            } else if self.options.mode == Mode::ResHome {
                let home = self.home_point();
                self.plot_segment(home, 0.0, 0.0, false);
                return;
            } else {
                self.emit("Resume plot error; plot terminated.");
                return;
            }
        }

        self.plot_doc_digest(digest);
        self.pen_raise();

        if self.status.stopped == 0 {
            // Return home after a normal plot.
            self.bounds_min = XyPoint::new(0.0, 0.0);
            let home = self.home_point();
            self.node_count = self.status.resume.node_target;
            self.plot_segment(home, 0.0, 0.0, false);
        }

        if self.status.stopped == 0 {
            // Ended normally: clear the stored progress.
            self.cp.layer = -2;
            self.cp.node = 0;
            self.cp.last_path = 0;
            self.cp.node_after_path = 0;
            self.cp.last_known_x = 0.0;
            self.cp.last_known_y = 0.0;
            self.cp.paused_x = 0.0;
            self.cp.paused_y = 0.0;
            self.cp.randseed = 0;
        }
    }

    /// Where the carriage travels after the plot: the first point, with
    /// each axis overridable by a caller-provided end position.
    fn home_point(&self) -> XyPoint {
        XyPoint::new(
            self.options.end_x.unwrap_or(self.pt_first.x),
            self.options.end_y.unwrap_or(self.pt_first.y),
        )
    }

    /// Which layer number to restrict plotting to, if any.
    fn layer_filter(&self) -> Option<u32> {
        match self.options.mode {
            Mode::Layers => Some(self.options.layer),
            Mode::ResPlot | Mode::ResHome if self.status.resume.layer_old >= 0 => {
                Some(self.status.resume.layer_old as u32)
            }
            _ => None,
        }
    }

    /// Step through the digest and plot each layer's paths in order.
    fn plot_doc_digest(&mut self, digest: &DocDigest) {
        let filter = self.layer_filter();
        for layer in &digest.layers {
            if self.status.stopped != 0 {
                return;
            }
            let props = LayerProps::parse(&layer.name);
            if let Some(wanted) = filter {
                if props.layer_number != Some(wanted) {
                    continue;
                }
            }
            self.plot_layer(layer, &props);
        }
    }

    fn plot_layer(&mut self, layer: &Layer, props: &LayerProps) {
        self.pen_end_temp_height();
        let old_use_layer_speed = self.use_layer_speed;
        let old_layer_speed = self.layer_speed_pendown;

        self.pen_raise();
        self.apply_layer_props(props);

        for path in &layer.paths {
            if self.status.stopped != 0 {
                return;
            }
            // In resume mode, skip paths already plotted; on the path
            // where the pause happened, rewind the node counter to its
            // value after the last completed path.
            let mut plot_this_path = true;
            if self.status.resume.resume_mode {
                if self.pathcount < self.status.resume.last_path_old {
                    self.pathcount += 1;
                    plot_this_path = false;
                } else if self.pathcount == self.status.resume.last_path_old {
                    self.node_count = self.status.resume.last_path_nc_old;
                }
            }
            if plot_this_path {
                self.pathcount += 1;
                self.plot_polyline(&path.points());
            }
        }

        // Restore layer-scoped speed state.
        self.use_layer_speed = old_use_layer_speed;
        if self.layer_speed_pendown != old_layer_speed {
            self.layer_speed_pendown = old_layer_speed;
            self.enable_motors();
        }
        self.pen_end_temp_height();
    }

    /// Apply decoded layer-name properties: the `!` pause node and the
    /// height/speed/delay overrides, in their original order.
    fn apply_layer_props(&mut self, props: &LayerProps) {
        if props.pause {
            if self.status.resume.resume_mode {
                if self.pathcount < self.status.resume.last_path_old {
                    // Already executed before the pause; skip over it.
                    self.pathcount += 1;
                }
            } else {
                // A pause counts as a path node for pause/resume.
                self.pathcount += 1;
                self.cp.last_path = self.pathcount;
                self.cp.node_after_path = self.node_count;
                if self.status.stopped == 0 {
                    self.status.stopped = stop_code::PROGRAMMATIC;
                }
                self.pause_res_check();
            }
        }

        let old_speed = self.layer_speed_pendown;
        self.use_layer_speed = false;
        self.layer_speed_pendown = None;

        for layer_override in &props.overrides {
            match *layer_override {
                LayerOverride::Height(height) => self.pen_set_temp_height(height),
                LayerOverride::Speed(speed) => {
                    self.use_layer_speed = true;
                    self.layer_speed_pendown = Some(speed);
                }
                LayerOverride::Delay(ms) => self.layer_delay(ms),
            }
        }

        if self.layer_speed_pendown != old_speed {
            self.enable_motors();
        }
    }

    /// Plot one polyline: pen-up travel to its start, pen down, planned
    /// trajectory, and the post-path progress record.
    fn plot_polyline(&mut self, vertices: &[XyPoint]) {
        if self.status.stopped != 0 {
            debug!("plot_polyline: already stopped");
            return;
        }
        if vertices.len() < 2 {
            debug!("plot_polyline: no full segments in vertex list");
            return;
        }

        self.pen_raise();
        self.plot_segment(vertices[0], 0.0, 0.0, false);
        self.pen_lower();
        self.plan_and_plot(vertices);

        if self.status.stopped == 0 {
            self.cp.last_path = self.pathcount;
            self.cp.node_after_path = self.node_count;
        }
    }

    fn plan_and_plot(&mut self, path: &[XyPoint]) {
        if self.status.stopped != 0 || self.f_curr.is_none() {
            return;
        }
        let limits = self.plan_limits();
        let plan = plan_trajectory(path, &limits);
        for segment in plan {
            self.plot_segment(segment.dest, segment.v_entry, segment.v_exit, false);
        }
    }

    fn plan_limits(&self) -> PlanLimits {
        let pen_up = self.pen.status.pen_up.unwrap_or(false);
        PlanLimits {
            speed_limit: if pen_up { self.speed_penup } else { self.speed_pendown },
            accel_rate: self.active_accel(pen_up),
            cornering_delta: self.params.cornering / self.params.cornering_divisor,
            corner_epsilon: self.params.corner_epsilon,
            min_step_dist: match self.step_mode {
                StepMode::High => self.params.max_step_dist_hr,
                StepMode::Low => self.params.max_step_dist_lr,
            },
        }
    }

    pub(crate) fn active_accel(&self, pen_up: bool) -> f64 {
        let base = if pen_up {
            self.params.accel_rate_pu
        } else {
            self.params.accel_rate
        };
        base * f64::from(self.options.accel) / 100.0
    }

    /// Manage pause and resume. Consulted at the head of every segment;
    /// each consultation that passes counts one node.
    pub(crate) fn pause_res_check(&mut self) {
        if self.status.stopped > 0 {
            return; // already stopped
        }

        // Query the button first; a failed query is handled below as
        // lost connectivity.
        let button_result = self.status.gateway.as_mut().map(|gw| gw.query_button());

        if let Some(flag) = self.pause_flag {
            if flag.take() {
                self.status.stopped = if self.status.delay_between_copies {
                    stop_code::BETWEEN_COPIES
                } else {
                    stop_code::KEYBOARD
                };
            }
        }

        if self.status.stopped == stop_code::PROGRAMMATIC {
            self.emit("Plot paused programmatically.");
        }
        if self.status.stopped == stop_code::KEYBOARD {
            self.emit("Plot paused by keyboard interrupt.");
        }

        let mut button_pressed = false;
        if self.status.stopped == 0 {
            match button_result {
                Some(Ok(pressed)) => button_pressed = pressed,
                Some(Err(_)) => {
                    let node = self.node_count;
                    self.emit(&format!("Error: USB connection to plotter lost. [Node {node}]"));
                    self.status.stopped = stop_code::USB_LOST;
                    self.status.gateway = None;
                }
                None => {}
            }
        }

        if button_pressed {
            if self.status.delay_between_copies {
                self.status.stopped = stop_code::BETWEEN_COPIES;
            } else {
                self.emit("Plot paused by button press.");
                self.status.stopped = stop_code::BUTTON;
            }
        }

        if self.status.stopped == stop_code::BETWEEN_COPIES {
            self.emit("Plot sequence ended between copies.");
        }

        if self.status.stopped != 0 {
            debug!(node = self.node_count, "paused after node");
            if self.options.mode == Mode::ResPlot
                && self.node_count < self.status.resume.node_target
            {
                // Paused again before reaching the resume target: snap to
                // the target so a double pause never rewinds progress.
                self.node_count = self.status.resume.node_target;
            }
        }

        if self.status.stopped < 0 {
            self.cp.node = self.node_count;
            if let Some(current) = self.f_curr {
                self.cp.paused_x = current.x - self.pt_first.x;
                self.cp.paused_y = current.y - self.pt_first.y;
            }
            self.pen_raise();
            if !self.status.delay_between_copies && self.status.stopped != stop_code::USB_LOST {
                self.emit("Use the resume feature to continue.");
            }
            self.status.stopped = -self.status.stopped;
            return; // this segment is not plotted
        }

        self.node_count += 1; // the whole segment counts as one node

        if self.status.resume.resume_mode && self.node_count >= self.status.resume.node_target {
            self.status.resume.resume_mode = false;
            debug!(node = self.node_count, "resuming plot");
            // Layer escapes may have changed pen heights during replay;
            // re-assert them, then reconcile the physical pen with the
            // virtual state.
            self.pen_servo_setup();
            if !self.pen.status.virtual_pen_up {
                self.pen_lower();
            }
        }
    }

    /// Enable motors at the configured resolution and refresh the speed
    /// scales derived from it.
    pub(crate) fn enable_motors(&mut self) {
        let local_speed_pendown = if self.use_layer_speed {
            self.layer_speed_pendown.unwrap_or(self.options.speed_pendown)
        } else {
            self.options.speed_pendown
        };
        let mode = if self.options.resolution == 1 {
            StepMode::High
        } else {
            StepMode::Low
        };
        let enable_failed = match self.status.gateway.as_mut() {
            Some(gateway) => gateway.enable_motors(mode).is_err(),
            None => false,
        };
        if enable_failed {
            self.connection_lost();
            return;
        }
        self.step_mode = mode;
        self.step_scale = mode.scale_multiplier() * self.params.native_res_factor;
        let (speed_lim, const_factor) = match mode {
            StepMode::High => (self.params.speed_lim_xy_hr, self.params.const_speed_factor_hr),
            StepMode::Low => (self.params.speed_lim_xy_lr, self.params.const_speed_factor_lr),
        };
        self.speed_pendown = f64::from(local_speed_pendown) * speed_lim / 110.0;
        self.speed_penup = f64::from(self.options.speed_penup) * speed_lim / 110.0;
        if self.options.const_speed {
            self.speed_pendown *= const_factor;
        }
        if self.params.use_b3_out {
            if let Some(gateway) = self.status.gateway.as_mut() {
                let _ = gateway.pin_output('B', 3, 0);
            }
        }
    }

    /// Setup-mode commands: align, toggle, cycle.
    fn setup_command(&mut self) {
        if self.status.gateway.is_none() {
            return;
        }
        self.check_voltage();
        self.pen_servo_setup();
        match self.options.mode {
            Mode::Align => {
                self.pen_raise();
                let disable_failed = match self.status.gateway.as_mut() {
                    Some(gateway) => gateway.disable_motors().is_err(),
                    None => false,
                };
                if disable_failed {
                    self.connection_lost();
                }
            }
            Mode::Toggle => {
                match self.pen.toggle(&self.options, &self.params, self.status.gateway.as_mut()) {
                    Ok(ms) => self.status.stats.pt_estimate += u64::from(ms),
                    Err(_) => self.connection_lost(),
                }
            }
            Mode::Cycle => {
                match self.pen.cycle(&self.options, &self.params, self.status.gateway.as_mut()) {
                    Ok(ms) => self.status.stats.pt_estimate += u64::from(ms),
                    Err(_) => self.connection_lost(),
                }
            }
            _ => {}
        }
    }

    /// A `+d` layer delay, waited out in short slices so that pause
    /// requests stay responsive.
    fn layer_delay(&mut self, ms: u32) {
        let mut remaining = ms;
        while remaining > 0 {
            if self.status.stopped != 0 {
                return;
            }
            if remaining < 150 {
                self.sleep_ms(u64::from(remaining));
                self.status.stats.pt_estimate += u64::from(remaining);
                remaining = 0;
            } else {
                self.sleep_ms(100);
                self.status.stats.pt_estimate += 100;
                remaining -= 100;
            }
            self.pause_res_check();
        }
    }

    pub(crate) fn sleep_ms(&self, ms: u64) {
        let paces = self
            .status
            .gateway
            .as_ref()
            .map(|gw| gw.paces_motion())
            .unwrap_or(false);
        if paces {
            std::thread::sleep(std::time::Duration::from_millis(ms));
        }
    }

    fn check_voltage(&mut self) {
        if self.params.skip_voltage_check {
            return;
        }
        if let Some(gateway) = self.status.gateway.as_mut() {
            if let Ok(reading) = gateway.query_voltage() {
                if reading < self.params.voltage_threshold {
                    self.warnings.add("voltage");
                }
            }
        }
    }

    /// Read and discard one button report, so a stale latched press
    /// cannot stop the new plot at its first node.
    fn prime_button(&mut self) {
        if let Some(gateway) = self.status.gateway.as_mut() {
            let _ = gateway.query_button();
        }
    }

    pub(crate) fn connection_lost(&mut self) {
        self.emit("Error: USB connection to plotter lost.");
        self.status.stopped = -stop_code::USB_LOST; // positive: terminal
        self.status.gateway = None;
    }

    // Pen wrappers: account the returned durations against the time
    // estimate and convert link failures into the lost-connection stop.

    pub(crate) fn pen_raise(&mut self) {
        let resume_mode = self.status.resume.resume_mode;
        match self
            .pen
            .raise(&self.options, &self.params, self.status.gateway.as_mut(), resume_mode)
        {
            Ok(ms) => self.status.stats.pt_estimate += u64::from(ms),
            Err(_) => self.connection_lost(),
        }
    }

    pub(crate) fn pen_lower(&mut self) {
        let resume_mode = self.status.resume.resume_mode;
        match self
            .pen
            .lower(&self.options, &self.params, self.status.gateway.as_mut(), resume_mode)
        {
            Ok(ms) => self.status.stats.pt_estimate += u64::from(ms),
            Err(_) => self.connection_lost(),
        }
    }

    pub(crate) fn pen_servo_setup(&mut self) {
        if self
            .pen
            .servo_setup(&self.options, &self.params, self.status.gateway.as_mut())
            .is_err()
        {
            self.connection_lost();
        }
    }

    fn pen_set_temp_height(&mut self, height: u32) {
        if self
            .pen
            .set_temp_height(&self.params, height, self.status.gateway.as_mut())
            .is_err()
        {
            self.connection_lost();
        }
    }

    fn pen_end_temp_height(&mut self) {
        if self
            .pen
            .end_temp_height(&self.options, &self.params, self.status.gateway.as_mut())
            .is_err()
        {
            self.connection_lost();
        }
    }
}
