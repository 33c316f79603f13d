//! Typed implementation of the plotter controller's serial text protocol.
//!
//! The controller speaks a line-oriented ASCII protocol: the host sends a
//! short comma-separated command terminated by `\r`, and the controller
//! answers with an optional data line followed by `OK`. This crate owns
//! both directions: [`Command`] values encode to wire strings, and the
//! [`response`] module parses the controller's answers into typed values.
//!
//! Transport (port discovery, timeouts, retries) is out of scope; the
//! host's gateway owns a serial link and uses this crate purely as a
//! codec.

pub mod commands;
pub mod error;
pub mod response;

pub use commands::{Command, ServoChannel};
pub use error::ProtoError;
pub use response::{MotorMode, StepPosition};
