//! Parsers for the controller's response lines.
//!
//! Responses arrive with the terminal `OK` already stripped by the
//! transport; each parser here receives the data portion only.

use crate::error::ProtoError;

/// Enable / microstep state of one motor, as reported by the controller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MotorMode {
    Disabled,
    Sixteenth,
    Eighth,
    Quarter,
    Half,
    Full,
}

impl MotorMode {
    fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(MotorMode::Disabled),
            16 => Some(MotorMode::Sixteenth),
            8 => Some(MotorMode::Eighth),
            4 => Some(MotorMode::Quarter),
            2 => Some(MotorMode::Half),
            1 => Some(MotorMode::Full),
            _ => None,
        }
    }

    /// The microstep code (as used by enable-motors) this mode
    /// corresponds to, if it is an enabled state.
    pub fn microstep_code(self) -> Option<u8> {
        match self {
            MotorMode::Disabled => None,
            MotorMode::Sixteenth => Some(1),
            MotorMode::Eighth => Some(2),
            MotorMode::Quarter => Some(3),
            MotorMode::Half => Some(4),
            MotorMode::Full => Some(5),
        }
    }
}

/// Global step counter pair, in native steps.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct StepPosition {
    pub axis1: i32,
    pub axis2: i32,
}

fn two_ints<'a>(command: &'static str, line: &'a str) -> Result<(&'a str, &'a str), ProtoError> {
    let mut parts = line.trim().split(',');
    match (parts.next(), parts.next()) {
        (Some(a), Some(b)) => Ok((a.trim(), b.trim())),
        _ => Err(ProtoError::Malformed { command, response: line.to_string() }),
    }
}

/// Parse the `QS` response: `"<axis1>,<axis2>"`.
pub fn parse_steps(line: &str) -> Result<StepPosition, ProtoError> {
    let (a, b) = two_ints("QS", line)?;
    let axis1 = a.parse().map_err(|_| ProtoError::Malformed {
        command: "QS",
        response: line.to_string(),
    })?;
    let axis2 = b.parse().map_err(|_| ProtoError::Malformed {
        command: "QS",
        response: line.to_string(),
    })?;
    Ok(StepPosition { axis1, axis2 })
}

/// Parse the `QB` response: `"0"` or `"1"`. The controller clears its
/// button latch when answering, so a `true` here is a one-shot event.
pub fn parse_button(line: &str) -> Result<bool, ProtoError> {
    match line.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(ProtoError::Malformed { command: "QB", response: line.to_string() }),
    }
}

/// Parse the `QE` response: `"<mode1>,<mode2>"` with power-of-two
/// microstep encodings.
pub fn parse_motor_modes(line: &str) -> Result<(MotorMode, MotorMode), ProtoError> {
    let (a, b) = two_ints("QE", line)?;
    let malformed = || ProtoError::Malformed { command: "QE", response: line.to_string() };
    let m1 = a.parse().ok().and_then(MotorMode::from_raw).ok_or_else(malformed)?;
    let m2 = b.parse().ok().and_then(MotorMode::from_raw).ok_or_else(malformed)?;
    Ok((m1, m2))
}

/// Parse the `QC` response: `"<current>,<voltage>"` raw ADC readings.
/// Returns the voltage reading; the caller compares it against its
/// low-voltage threshold.
pub fn parse_voltage(line: &str) -> Result<u32, ProtoError> {
    let (_, v) = two_ints("QC", line)?;
    v.parse().map_err(|_| ProtoError::Malformed {
        command: "QC",
        response: line.to_string(),
    })
}

/// Extract the bare version number from the `V` response, e.g.
/// `"EBBv13_and_above EB Firmware Version 2.8.1"` yields `"2.8.1"`.
pub fn parse_version(line: &str) -> Result<String, ProtoError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(ProtoError::Malformed { command: "V", response: line.to_string() });
    }
    match trimmed.split("Firmware Version ").nth(1) {
        Some(version) => Ok(version.trim().to_string()),
        None => Ok(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_parse_signed_pairs() {
        assert_eq!(
            parse_steps("1024,-300").unwrap(),
            StepPosition { axis1: 1024, axis2: -300 }
        );
        assert!(parse_steps("1024").is_err());
        assert!(parse_steps("a,b").is_err());
    }

    #[test]
    fn button_is_strictly_binary() {
        assert!(!parse_button("0").unwrap());
        assert!(parse_button("1\r\n").unwrap());
        assert!(parse_button("2").is_err());
    }

    #[test]
    fn motor_modes_decode_microstep_codes() {
        let (m1, m2) = parse_motor_modes("16,16").unwrap();
        assert_eq!(m1, MotorMode::Sixteenth);
        assert_eq!(m1.microstep_code(), Some(1));
        assert_eq!(m2.microstep_code(), Some(1));
        let (m1, _) = parse_motor_modes("0,8").unwrap();
        assert_eq!(m1.microstep_code(), None);
        assert!(parse_motor_modes("7,7").is_err());
    }

    #[test]
    fn voltage_takes_the_second_field() {
        assert_eq!(parse_voltage("0394,0300").unwrap(), 300);
        assert!(parse_voltage("0394").is_err());
    }

    #[test]
    fn version_strips_the_preamble() {
        assert_eq!(
            parse_version("EBBv13_and_above EB Firmware Version 2.8.1").unwrap(),
            "2.8.1"
        );
        assert_eq!(parse_version("2.5.0").unwrap(), "2.5.0");
        assert!(parse_version("  ").is_err());
    }
}
