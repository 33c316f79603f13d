//! Protocol round-trip checks at the wire-string level.

use ebb_proto::response::{parse_motor_modes, parse_steps, parse_version, parse_voltage};
use ebb_proto::{Command, MotorMode, ProtoError, ServoChannel};

#[test]
fn every_command_is_carriage_return_terminated() {
    let commands = [
        Command::EnableMotors { microstep: 2 },
        Command::DisableMotors,
        Command::StepperMove { duration_ms: 1, axis1: 0, axis2: 1 },
        Command::TimedPause { duration_ms: 10 },
        Command::SetPen { up: false, delay_ms: 0 },
        Command::ServoConfig { channel: ServoChannel::RateRaise, value: 150 },
        Command::QuerySteps,
        Command::ClearSteps,
        Command::QueryButton,
        Command::QueryMotorModes,
        Command::QueryVoltage,
        Command::QueryVersion,
        Command::PinOutput { port: 'B', pin: 3, value: 0 },
    ];
    for cmd in commands {
        let wire = cmd.encode();
        assert!(wire.ends_with('\r'), "{wire:?} must end with CR");
        assert!(!wire[..wire.len() - 1].contains('\r'));
        assert!(wire.is_ascii());
    }
}

#[test]
fn step_counts_support_full_signed_range() {
    let cmd = Command::StepperMove {
        duration_ms: 65_000,
        axis1: i32::MIN + 1,
        axis2: i32::MAX,
    };
    let wire = cmd.encode();
    assert!(wire.contains(&(i32::MIN + 1).to_string()));
    assert!(wire.contains(&i32::MAX.to_string()));
}

#[test]
fn responses_round_trip_through_parsers() {
    assert_eq!(parse_steps(" -20320,20320 ").unwrap().axis1, -20320);
    assert_eq!(
        parse_motor_modes("8,8").unwrap(),
        (MotorMode::Eighth, MotorMode::Eighth)
    );
    assert_eq!(parse_voltage("0401,0275").unwrap(), 275);
    assert_eq!(
        parse_version("EBBv13_and_above EB Firmware Version 3.0.2\r\n").unwrap(),
        "3.0.2"
    );
}

#[test]
fn malformed_responses_name_the_command() {
    match parse_steps("garbage") {
        Err(ProtoError::Malformed { command, .. }) => assert_eq!(command, "QS"),
        other => panic!("expected Malformed, got {other:?}"),
    }
}
