//! Controller gateway: a typed wrapper over the serial transport.
//!
//! The gateway owns a [`SerialLink`] (real port or simulator) and exposes
//! the controller operations the orchestrator needs: motor enable at a
//! microstepping mode, timed XY moves, pen servo commands, and the
//! status queries. All transport failures surface as
//! [`HostError::ConnectionLost`].

use std::io::{Read, Write};
use std::time::Duration;

use ebb_proto::response::{
    parse_button, parse_motor_modes, parse_steps, parse_version, parse_voltage,
};
use ebb_proto::{Command, ServoChannel, StepPosition};
use motion::StepMode;
use tracing::{debug, warn};

use crate::error::HostError;

/// One request/response exchange with the controller. Implementations
/// return the data portion of the response with the terminal `OK`
/// stripped.
pub trait SerialLink: Send {
    fn roundtrip(&mut self, wire: &str) -> Result<String, HostError>;

    /// Whether commands drive physically moving hardware. The host
    /// sleeps through most of each commanded interval only when they do.
    fn paces_motion(&self) -> bool {
        true
    }
}

/// A blocking serial-port link.
pub struct PortLink {
    port: Box<dyn serialport::SerialPort>,
}

impl PortLink {
    /// Open a link on a named port, or on the first serial port found.
    pub fn open(port_name: Option<&str>) -> Result<Self, HostError> {
        let name = match port_name {
            Some(name) => name.to_string(),
            None => serialport::available_ports()
                .ok()
                .and_then(|ports| ports.into_iter().next())
                .map(|info| info.port_name)
                .ok_or(HostError::ConnectFailed)?,
        };
        let port = serialport::new(&name, 9600)
            .timeout(Duration::from_millis(1000))
            .open()
            .map_err(|e| {
                warn!("failed to open serial port {name}: {e}");
                HostError::ConnectFailed
            })?;
        debug!("opened serial port {name}");
        Ok(Self { port })
    }
}

impl SerialLink for PortLink {
    fn roundtrip(&mut self, wire: &str) -> Result<String, HostError> {
        self.port
            .write_all(wire.as_bytes())
            .map_err(|_| HostError::ConnectionLost)?;

        // Responses are short; accumulate until the terminal OK line.
        let mut response = String::new();
        let mut buf = [0u8; 64];
        loop {
            let n = self.port.read(&mut buf).map_err(|_| HostError::ConnectionLost)?;
            if n == 0 {
                return Err(HostError::ConnectionLost);
            }
            response.push_str(&String::from_utf8_lossy(&buf[..n]));
            if let Some(pos) = response.find("OK") {
                let data = response[..pos].trim().to_string();
                return Ok(data);
            }
            if response.trim_start().starts_with('!') {
                warn!("controller error response: {response:?}");
                return Err(HostError::ConnectionLost);
            }
        }
    }
}

/// Typed controller operations over a serial link.
pub struct EbbGateway {
    link: Box<dyn SerialLink>,
}

impl EbbGateway {
    /// Wrap a link and confirm the controller answers a version query.
    /// Returns the gateway together with the firmware version string.
    pub fn connect(link: Box<dyn SerialLink>) -> Result<(Self, String), HostError> {
        let mut gateway = Self { link };
        let version = gateway.query_version()?;
        debug!("connected to controller, firmware {version}");
        Ok((gateway, version))
    }

    fn command(&mut self, command: &Command) -> Result<String, HostError> {
        self.link.roundtrip(&command.encode())
    }

    pub fn paces_motion(&self) -> bool {
        self.link.paces_motion()
    }

    /// Enable both motors at the given step mode. Idempotent: when the
    /// controller already reports the requested microstepping on both
    /// motors, no enable command is sent. Re-enabling zeroes the
    /// controller's step counters.
    pub fn enable_motors(&mut self, mode: StepMode) -> Result<(), HostError> {
        let code = mode.microstep_code();
        let (m1, m2) = self.query_motor_modes()?;
        if m1.microstep_code() == Some(code) && m2.microstep_code() == Some(code) {
            debug!("motors already enabled at microstep code {code}");
            return Ok(());
        }
        self.command(&Command::EnableMotors { microstep: code })?;
        Ok(())
    }

    pub fn disable_motors(&mut self) -> Result<(), HostError> {
        self.command(&Command::DisableMotors)?;
        Ok(())
    }

    pub fn query_motor_modes(
        &mut self,
    ) -> Result<(ebb_proto::MotorMode, ebb_proto::MotorMode), HostError> {
        let line = self.command(&Command::QueryMotorModes)?;
        Ok(parse_motor_modes(&line)?)
    }

    pub fn query_steps(&mut self) -> Result<StepPosition, HostError> {
        let line = self.command(&Command::QuerySteps)?;
        Ok(parse_steps(&line)?)
    }

    pub fn clear_steps(&mut self) -> Result<(), HostError> {
        self.command(&Command::ClearSteps)?;
        Ok(())
    }

    /// Issue one timed move on the native motor axes. A zero-step move
    /// is a non-issue and no command goes out.
    pub fn xy_move(&mut self, steps2: i32, steps1: i32, duration_ms: u32) -> Result<(), HostError> {
        if steps1 == 0 && steps2 == 0 {
            return Ok(());
        }
        self.command(&Command::StepperMove {
            duration_ms,
            axis1: steps1,
            axis2: steps2,
        })?;
        Ok(())
    }

    pub fn timed_pause(&mut self, duration_ms: u32) -> Result<(), HostError> {
        self.command(&Command::TimedPause { duration_ms })?;
        Ok(())
    }

    /// Query (and clear) the controller's pause-button latch.
    pub fn query_button(&mut self) -> Result<bool, HostError> {
        let line = self.command(&Command::QueryButton)?;
        Ok(parse_button(&line)?)
    }

    /// Raw supply-voltage reading; the caller compares it against its
    /// threshold.
    pub fn query_voltage(&mut self) -> Result<u32, HostError> {
        let line = self.command(&Command::QueryVoltage)?;
        Ok(parse_voltage(&line)?)
    }

    pub fn query_version(&mut self) -> Result<String, HostError> {
        let line = self.command(&Command::QueryVersion)?;
        Ok(parse_version(&line)?)
    }

    pub fn set_pen(&mut self, up: bool, delay_ms: u32) -> Result<(), HostError> {
        self.command(&Command::SetPen { up, delay_ms })?;
        Ok(())
    }

    pub fn servo_config(&mut self, channel: ServoChannel, value: u32) -> Result<(), HostError> {
        self.command(&Command::ServoConfig { channel, value })?;
        Ok(())
    }

    pub fn pin_output(&mut self, port: char, pin: u8, value: u8) -> Result<(), HostError> {
        self.command(&Command::PinOutput { port, pin, value })?;
        Ok(())
    }
}
