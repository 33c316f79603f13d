//! # Plotter Host
//!
//! Host-side driver core for a two-motor CoreXY pen plotter. Given a
//! flattened document digest, it plans velocity-limited trajectories,
//! slices them into timed step commands for the serial-attached motion
//! controller, and threads pause/resume checkpointing through every
//! level so that a plot can be suspended and continued later.
//!
//! The crate is deliberately single-threaded and sequential: the only
//! asynchrony is a one-shot pause flag the embedding host may set from a
//! signal handler, polled at each segment boundary.

pub mod config;
pub mod digest;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod pen;
pub mod plot;
pub mod plotdata;
pub mod status;
pub mod warnings;

pub use config::{Mode, Options, Params};
pub use digest::{DocDigest, Layer, LayerOverride, LayerProps, PathItem, PLOB_VERSION};
pub use error::HostError;
pub use gateway::{EbbGateway, PortLink, SerialLink};
pub use pen::{Pen, PenStatus};
pub use plot::{MessageSink, Plotter};
pub use plotdata::{Checkpoint, PLOTDATA_TAG};
pub use status::{stop_code, PauseFlag, PlotStatus, ResumeState, Stats};
pub use warnings::Warnings;
