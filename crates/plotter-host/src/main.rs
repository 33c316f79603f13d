//! Command-line entry point for the plotter host.
//!
//! Loads a flattened document digest (JSON "plob"), optionally a
//! hardware parameter file, connects to the motion controller over
//! serial, and runs the selected mode. SIGINT requests a cooperative
//! pause; progress is checkpointed back into the digest file so the
//! plot can be resumed.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use nix::sys::signal::{self, SigHandler, Signal};
use tracing::info;

use plotter_host::{DocDigest, Mode, Options, Params, PauseFlag, Plotter, PortLink};

/// One-shot pause request, set from the SIGINT handler.
static PAUSE_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigint(_: i32) {
    PAUSE_REQUESTED.store(true, std::sync::atomic::Ordering::SeqCst);
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum CliMode {
    /// Plot the full document.
    Plot,
    /// Plot a single layer, selected with --layer.
    Layers,
    /// Resume a paused plot from its checkpoint.
    ResPlot,
    /// Pen-up return to the home position of a paused plot.
    ResHome,
    /// Raise the pen and de-energize the motors for manual alignment.
    Align,
    /// Toggle the pen up or down.
    Toggle,
    /// Lower and raise the pen once.
    Cycle,
}

impl From<CliMode> for Mode {
    fn from(mode: CliMode) -> Mode {
        match mode {
            CliMode::Plot => Mode::Plot,
            CliMode::Layers => Mode::Layers,
            CliMode::ResPlot => Mode::ResPlot,
            CliMode::ResHome => Mode::ResHome,
            CliMode::Align => Mode::Align,
            CliMode::Toggle => Mode::Toggle,
            CliMode::Cycle => Mode::Cycle,
        }
    }
}

/// Host-side driver for a CoreXY pen plotter.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the flattened document digest (JSON plob).
    digest: PathBuf,

    /// Operating mode.
    #[arg(short, long, value_enum, default_value = "plot")]
    mode: CliMode,

    /// Hardware model (1-7); selects the travel envelope.
    #[arg(long, default_value_t = 1)]
    model: u8,

    /// Motor resolution: 1 = high (16x microstep), 2 = low (8x).
    #[arg(short, long, default_value_t = 1)]
    resolution: u8,

    /// Pen-down speed, percent (1-110).
    #[arg(long, default_value_t = 25)]
    speed_pendown: u32,

    /// Pen-up speed, percent (1-200).
    #[arg(long, default_value_t = 75)]
    speed_penup: u32,

    /// Acceleration scale, percent (1-110).
    #[arg(long, default_value_t = 75)]
    accel: u32,

    /// Plot each pen-down move at one constant speed.
    #[arg(long)]
    const_speed: bool,

    /// Pen-up servo height, percent.
    #[arg(long, default_value_t = 60)]
    pen_pos_up: u32,

    /// Pen-down servo height, percent.
    #[arg(long, default_value_t = 30)]
    pen_pos_down: u32,

    /// Copies to plot; 0 repeats until paused.
    #[arg(long, default_value_t = 1)]
    copies: u32,

    /// Delay between copies, seconds.
    #[arg(long, default_value_t = 15)]
    page_delay: u32,

    /// Layer number for layers mode.
    #[arg(short, long, default_value_t = 1)]
    layer: u32,

    /// Final X position, inches; defaults to the first point.
    #[arg(long)]
    end_x: Option<f64>,

    /// Final Y position, inches; defaults to the first point.
    #[arg(long)]
    end_y: Option<f64>,

    /// Serial port name; defaults to the first port found.
    #[arg(short, long)]
    port: Option<String>,

    /// Hardware parameter file (INI).
    #[arg(long)]
    params: Option<PathBuf>,

    /// Report a completion payload for a webhook consumer.
    #[arg(long)]
    webhook: bool,

    #[arg(long)]
    webhook_url: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let params = match &cli.params {
        Some(path) => Params::load(path)?,
        None => Params::default(),
    };

    let options = Options {
        mode: cli.mode.into(),
        model: cli.model,
        resolution: cli.resolution,
        const_speed: cli.const_speed,
        speed_pendown: cli.speed_pendown,
        speed_penup: cli.speed_penup,
        accel: cli.accel,
        pen_pos_up: cli.pen_pos_up,
        pen_pos_down: cli.pen_pos_down,
        copies: cli.copies,
        page_delay: cli.page_delay,
        layer: cli.layer,
        end_x: cli.end_x,
        end_y: cli.end_y,
        webhook: cli.webhook,
        webhook_url: cli.webhook_url.clone(),
        port_name: cli.port.clone(),
        ..Options::default()
    };

    let text = std::fs::read_to_string(&cli.digest)
        .with_context(|| format!("cannot read digest {}", cli.digest.display()))?;
    let digest = DocDigest::from_json(&text)?;
    let mut doc: serde_json::Value = serde_json::from_str(&text)
        .unwrap_or_else(|_| serde_json::json!({}));

    // SIGINT requests a cooperative pause at the next segment boundary;
    // a checkpoint is written before exit.
    let sigint_action = signal::SigAction::new(
        SigHandler::Handler(handle_sigint),
        signal::SaFlags::empty(),
        signal::SigSet::empty(),
    );
    unsafe {
        signal::sigaction(Signal::SIGINT, &sigint_action)
            .context("cannot install SIGINT handler")?;
    }

    let mut plotter = Plotter::new(options, params)?;
    plotter.set_pause_flag(PauseFlag::new(&PAUSE_REQUESTED));

    match PortLink::open(cli.port.as_deref()) {
        Ok(link) => {
            plotter.attach_link(Box::new(link), false);
        }
        Err(e) => {
            eprintln!("Failed to connect to plotter: {e}");
            std::process::exit(101);
        }
    }

    let exit_code = plotter.run(&digest, &mut doc);

    // Persist the updated checkpoint next to the digest content.
    std::fs::write(&cli.digest, serde_json::to_string_pretty(&doc)?)
        .with_context(|| format!("cannot update {}", cli.digest.display()))?;

    if exit_code == 0 {
        info!("plot finished normally");
    } else {
        info!(code = exit_code, "plot stopped");
    }
    std::process::exit(exit_code);
}
