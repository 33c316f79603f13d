//! Simulated controller behavior.
//!
//! Implements a minimal but faithful model of the controller's serial
//! protocol: motor enables, timed stepper moves with step accounting,
//! pen servo commands, and the status queries, including the one-shot
//! pause-button latch.

use std::sync::{Arc, Mutex};

use plotter_host::{HostError, SerialLink};
use tracing::debug;

/// One recorded timed move (nonzero step counts).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SmMove {
    pub duration_ms: u32,
    pub axis1: i32,
    pub axis2: i32,
}

/// Observable state of the simulated controller.
#[derive(Debug, Default)]
pub struct FakeEbbState {
    /// Every command received, in wire order (without the trailing CR).
    pub commands: Vec<String>,
    /// Timed moves with at least one nonzero axis.
    pub moves: Vec<SmMove>,
    /// Zero-step timed pauses.
    pub timed_pauses: Vec<u32>,
    /// Pen commands as (up, delay_ms) pairs.
    pub pen_ops: Vec<(bool, u32)>,
    /// Global step counters.
    pub steps1: i64,
    pub steps2: i64,
    /// Raw motor-mode report for `QE` (power-of-two encoding).
    pub motor_raw: (u32, u32),
    /// Supply voltage reading reported by `QC`.
    pub voltage: u32,
    /// Report one button press once this many moves have been received.
    pub press_button_after_moves: Option<usize>,
    /// Fail every exchange once this many moves have been received.
    pub fail_after_moves: Option<usize>,
}

impl FakeEbbState {
    fn new() -> Self {
        Self {
            voltage: 300,
            ..Self::default()
        }
    }
}

/// The simulated controller; hand the link to the host and keep the
/// shared state handle for inspection.
pub struct FakeEbb {
    state: Arc<Mutex<FakeEbbState>>,
}

impl FakeEbb {
    pub fn new() -> (Self, Arc<Mutex<FakeEbbState>>) {
        let state = Arc::new(Mutex::new(FakeEbbState::new()));
        (Self { state: state.clone() }, state)
    }
}

impl SerialLink for FakeEbb {
    fn roundtrip(&mut self, wire: &str) -> Result<String, HostError> {
        let mut state = self.state.lock().expect("fake controller state poisoned");
        if let Some(limit) = state.fail_after_moves {
            if state.moves.len() >= limit {
                return Err(HostError::ConnectionLost);
            }
        }

        let line = wire.trim_end_matches('\r');
        state.commands.push(line.to_string());
        debug!(command = line, "fake controller received");

        let mut parts = line.split(',');
        let op = parts.next().unwrap_or("");
        let next_i64 = |parts: &mut std::str::Split<'_, char>| -> i64 {
            parts.next().and_then(|p| p.trim().parse().ok()).unwrap_or(0)
        };

        let reply = match op {
            "EM" => {
                let microstep = next_i64(&mut parts);
                state.motor_raw = match microstep {
                    1 => (16, 16),
                    2 => (8, 8),
                    _ => (0, 0),
                };
                String::new()
            }
            "SM" => {
                let duration = next_i64(&mut parts) as u32;
                let axis1 = next_i64(&mut parts) as i32;
                let axis2 = next_i64(&mut parts) as i32;
                if axis1 == 0 && axis2 == 0 {
                    state.timed_pauses.push(duration);
                } else {
                    state.moves.push(SmMove { duration_ms: duration, axis1, axis2 });
                    state.steps1 += i64::from(axis1);
                    state.steps2 += i64::from(axis2);
                }
                String::new()
            }
            "SP" => {
                let up = next_i64(&mut parts) == 1;
                let delay = next_i64(&mut parts) as u32;
                state.pen_ops.push((up, delay));
                String::new()
            }
            "SC" | "PO" => String::new(),
            "CS" => {
                state.steps1 = 0;
                state.steps2 = 0;
                String::new()
            }
            "QS" => format!("{},{}", state.steps1, state.steps2),
            "QB" => {
                let due = state
                    .press_button_after_moves
                    .is_some_and(|limit| state.moves.len() >= limit);
                if due {
                    state.press_button_after_moves = None; // latch clears on read
                    "1".to_string()
                } else {
                    "0".to_string()
                }
            }
            "QE" => format!("{},{}", state.motor_raw.0, state.motor_raw.1),
            "QC" => format!("0394,{:04}", state.voltage),
            "V" => "EBBv13_and_above EB Firmware Version 2.8.1".to_string(),
            _ => String::new(),
        };
        Ok(reply)
    }

    fn paces_motion(&self) -> bool {
        false // nothing physically moves; never sleep through intervals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_counters_accumulate_moves() {
        let (mut link, state) = FakeEbb::new();
        link.roundtrip("SM,30,100,-40\r").unwrap();
        link.roundtrip("SM,30,-20,10\r").unwrap();
        let state = state.lock().unwrap();
        assert_eq!(state.steps1, 80);
        assert_eq!(state.steps2, -30);
        assert_eq!(state.moves.len(), 2);
    }

    #[test]
    fn button_latch_clears_on_read() {
        let (mut link, state) = FakeEbb::new();
        state.lock().unwrap().press_button_after_moves = Some(0);
        assert_eq!(link.roundtrip("QB\r").unwrap(), "1");
        assert_eq!(link.roundtrip("QB\r").unwrap(), "0");
    }

    #[test]
    fn zero_step_moves_are_timed_pauses() {
        let (mut link, state) = FakeEbb::new();
        link.roundtrip("SM,10,0,0\r").unwrap();
        let state = state.lock().unwrap();
        assert!(state.moves.is_empty());
        assert_eq!(state.timed_pauses, vec![10]);
    }
}
