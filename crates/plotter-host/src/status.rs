//! Plot-run state: stop codes, resume bookkeeping, statistics, and the
//! externally settable pause flag.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};

use motion::XyPoint;

use crate::gateway::EbbGateway;
use crate::plotdata::Checkpoint;

/// Exit / pause codes, positive once a pause has been handled.
pub mod stop_code {
    /// Programmatic pause from a `!` layer escape.
    pub const PROGRAMMATIC: i32 = -1;
    /// Paused between copies; a normal stopping point.
    pub const BETWEEN_COPIES: i32 = -2;
    /// Failed to connect at startup (already positive; never transient).
    pub const CONNECT_FAILED: i32 = 101;
    /// Physical pause-button press.
    pub const BUTTON: i32 = -102;
    /// Keyboard interrupt relayed by the host.
    pub const KEYBOARD: i32 = -103;
    /// Lost USB connectivity mid-plot.
    pub const USB_LOST: i32 = -104;
}

/// One-shot pause request flag, set from the host's signal handler and
/// polled (and cleared) by the core at each segment boundary.
#[derive(Copy, Clone)]
pub struct PauseFlag(&'static AtomicBool);

impl PauseFlag {
    pub const fn new(cell: &'static AtomicBool) -> Self {
        Self(cell)
    }

    /// Allocate a fresh flag; handy for tests and embedding callers.
    pub fn fresh() -> Self {
        Self(Box::leak(Box::new(AtomicBool::new(false))))
    }

    /// Request a pause. Safe to call from a signal-handler context.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Consume a pending request, clearing the flag atomically.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Distance and time accumulators for one plot run.
#[derive(Debug, Default, Clone)]
pub struct Stats {
    /// Pen-up travel, inches.
    pub up_travel: f64,
    /// Pen-down travel, inches.
    pub down_travel: f64,
    /// Total time spent in between-copies page delays, ms.
    pub page_delays: u64,
    /// Predicted plot time: commanded move and pen durations, ms.
    pub pt_estimate: u64,
}

impl Stats {
    pub fn reset(&mut self) {
        *self = Stats::default();
    }

    pub fn add_dist(&mut self, pen_up: bool, dist: f64) {
        if pen_up {
            self.up_travel += dist;
        } else {
            self.down_travel += dist;
        }
    }

    /// Human-readable end-of-run report lines.
    pub fn report(&self) -> Vec<String> {
        let total_s = self.pt_estimate / 1000;
        vec![
            format!(
                "Estimated print time: {}:{:02}:{:02}",
                total_s / 3600,
                (total_s / 60) % 60,
                total_s % 60
            ),
            format!(
                "Distance pen-down: {:.2} in, pen-up: {:.2} in",
                self.down_travel, self.up_travel
            ),
        ]
    }
}

/// Bookkeeping for skipping forward to a saved checkpoint.
#[derive(Debug, Clone)]
pub struct ResumeState {
    /// True while replaying the plot without emitting commands.
    pub resume_mode: bool,
    /// Node index at which physical plotting resumes.
    pub node_target: u64,
    /// True once a checkpoint record was successfully read.
    pub data_read: bool,
    /// Whether the saved layer selector was plausible.
    pub layer_found: bool,
    // Saved checkpoint scalars ("old" values from the prior run):
    pub layer_old: i32,
    pub node_old: u64,
    pub last_path_old: u32,
    pub last_path_nc_old: u64,
    pub last_known_old: XyPoint,
    pub paused_old: XyPoint,
    pub rand_seed_old: i64,
    pub row_old: i32,
}

impl Default for ResumeState {
    fn default() -> Self {
        Self {
            resume_mode: false,
            node_target: 0,
            data_read: false,
            layer_found: false,
            layer_old: -2, // sentinel: no saved layer selector
            node_old: 0,
            last_path_old: 0,
            last_path_nc_old: 0,
            last_known_old: XyPoint::default(),
            paused_old: XyPoint::default(),
            rand_seed_old: 1,
            row_old: 0,
        }
    }
}

impl ResumeState {
    /// Absorb a checkpoint read from the document.
    pub fn absorb(&mut self, checkpoint: &Checkpoint) {
        self.data_read = true;
        self.layer_old = checkpoint.layer;
        self.node_old = checkpoint.node;
        self.last_path_old = checkpoint.last_path;
        self.last_path_nc_old = checkpoint.node_after_path;
        self.last_known_old = XyPoint::new(checkpoint.last_known_x, checkpoint.last_known_y);
        self.paused_old = XyPoint::new(checkpoint.paused_x, checkpoint.paused_y);
        self.rand_seed_old = checkpoint.randseed;
        self.row_old = checkpoint.row;
    }
}

/// Mutable state of one plot invocation.
pub struct PlotStatus {
    /// Live controller connection, if any.
    pub gateway: Option<EbbGateway>,
    pub fw_version: String,
    /// 0 running; negative while a pause reason is being processed;
    /// positive (the absolute pause code) once handled.
    pub stopped: i32,
    pub resume: ResumeState,
    /// Remaining copies; -1 plots continuously.
    pub copies_to_plot: i32,
    pub delay_between_copies: bool,
    pub stats: Stats,
    /// Opaque handle to a caller-supplied progress reporter. The core
    /// carries it for the embedding host and never interprets it.
    pub progress: Option<Box<dyn Any + Send>>,
    /// A caller-supplied port must not be closed on exit.
    pub port_is_external: bool,
}

impl Default for PlotStatus {
    fn default() -> Self {
        Self {
            gateway: None,
            fw_version: String::new(),
            stopped: 0,
            resume: ResumeState::default(),
            copies_to_plot: 1,
            delay_between_copies: false,
            stats: Stats::default(),
            progress: None,
            port_is_external: false,
        }
    }
}
