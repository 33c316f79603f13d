//! Simulated controller and test harness for the plotter host.
//!
//! [`FakeEbb`] stands in for the serial-attached motion controller: it
//! interprets the wire protocol, keeps step counters, and can be
//! scripted to press its pause button or drop the connection after a
//! given number of moves. [`harness`] wraps it with digest builders and
//! a one-call plot runner for the end-to-end tests.

pub mod fake_ebb;
pub mod harness;

pub use fake_ebb::{FakeEbb, FakeEbbState, SmMove};
pub use harness::{
    layered_digest, line_digest, pen_down_moves, run_plot, test_options, test_params,
    zigzag_digest, Run,
};
