//! Typed commands and their wire encoding.
//!
//! Step counts are signed 32-bit integers; durations are positive
//! milliseconds. Every encoded command is terminated with `\r`.

use std::fmt;

/// Servo configuration registers used for the pen-lift servo.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ServoChannel {
    /// Pen-up servo position.
    PositionUp,
    /// Pen-down servo position.
    PositionDown,
    /// Servo sweep rate while raising.
    RateRaise,
    /// Servo sweep rate while lowering.
    RateLower,
}

impl ServoChannel {
    fn register(self) -> u8 {
        match self {
            ServoChannel::PositionUp => 4,
            ServoChannel::PositionDown => 5,
            ServoChannel::RateRaise => 11,
            ServoChannel::RateLower => 12,
        }
    }
}

/// Commands sent from the host to the motion controller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Command {
    /// Enable both motors at a microstep mode (1 = 16x, 2 = 8x).
    EnableMotors { microstep: u8 },
    /// De-energize both motors.
    DisableMotors,
    /// Move both motor axes by signed step counts over a duration.
    StepperMove {
        duration_ms: u32,
        axis1: i32,
        axis2: i32,
    },
    /// Hold position for a duration (a zero-step move).
    TimedPause { duration_ms: u32 },
    /// Raise (`up = true`) or lower the pen, blocking further motion
    /// commands for `delay_ms`.
    SetPen { up: bool, delay_ms: u32 },
    /// Write a pen-servo configuration register.
    ServoConfig { channel: ServoChannel, value: u32 },
    /// Query the global step counters.
    QuerySteps,
    /// Zero the global step counters.
    ClearSteps,
    /// Query (and clear) the onboard pause-button latch.
    QueryButton,
    /// Query the motor enable / microstep states.
    QueryMotorModes,
    /// Query supply current and voltage readings.
    QueryVoltage,
    /// Query the firmware version string.
    QueryVersion,
    /// Configure a digital output pin (port letter, pin, level).
    PinOutput { port: char, pin: u8, value: u8 },
}

impl Command {
    /// The wire form of this command, including the trailing `\r`.
    pub fn encode(&self) -> String {
        format!("{self}\r")
    }

    /// Short command mnemonic, for error reporting.
    pub fn name(&self) -> &'static str {
        match self {
            Command::EnableMotors { .. } => "EM",
            Command::DisableMotors => "EM",
            Command::StepperMove { .. } => "SM",
            Command::TimedPause { .. } => "SM",
            Command::SetPen { .. } => "SP",
            Command::ServoConfig { .. } => "SC",
            Command::QuerySteps => "QS",
            Command::ClearSteps => "CS",
            Command::QueryButton => "QB",
            Command::QueryMotorModes => "QE",
            Command::QueryVoltage => "QC",
            Command::QueryVersion => "V",
            Command::PinOutput { .. } => "PO",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Command::EnableMotors { microstep } => write!(f, "EM,{microstep},{microstep}"),
            Command::DisableMotors => write!(f, "EM,0,0"),
            Command::StepperMove {
                duration_ms,
                axis1,
                axis2,
            } => write!(f, "SM,{duration_ms},{axis1},{axis2}"),
            Command::TimedPause { duration_ms } => write!(f, "SM,{duration_ms},0,0"),
            Command::SetPen { up, delay_ms } => {
                write!(f, "SP,{},{delay_ms}", if up { 1 } else { 0 })
            }
            Command::ServoConfig { channel, value } => {
                write!(f, "SC,{},{value}", channel.register())
            }
            Command::QuerySteps => write!(f, "QS"),
            Command::ClearSteps => write!(f, "CS"),
            Command::QueryButton => write!(f, "QB"),
            Command::QueryMotorModes => write!(f, "QE"),
            Command::QueryVoltage => write!(f, "QC"),
            Command::QueryVersion => write!(f, "V"),
            Command::PinOutput { port, pin, value } => write!(f, "PO,{port},{pin},{value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodings_match_the_wire_format() {
        assert_eq!(Command::EnableMotors { microstep: 1 }.encode(), "EM,1,1\r");
        assert_eq!(Command::DisableMotors.encode(), "EM,0,0\r");
        assert_eq!(
            Command::StepperMove {
                duration_ms: 30,
                axis1: -120,
                axis2: 45
            }
            .encode(),
            "SM,30,-120,45\r"
        );
        assert_eq!(Command::TimedPause { duration_ms: 10 }.encode(), "SM,10,0,0\r");
        assert_eq!(Command::SetPen { up: true, delay_ms: 400 }.encode(), "SP,1,400\r");
        assert_eq!(
            Command::ServoConfig {
                channel: ServoChannel::PositionDown,
                value: 16000
            }
            .encode(),
            "SC,5,16000\r"
        );
        assert_eq!(Command::PinOutput { port: 'B', pin: 3, value: 0 }.encode(), "PO,B,3,0\r");
    }
}
