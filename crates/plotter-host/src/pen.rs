//! Pen-lift state machine.
//!
//! Tracks the physical pen state and, while resuming, a *virtual* pen
//! state: during resume-mode replay the pen operations record what the
//! pen would be doing without commanding the servo, and the real state
//! is reconciled once the resume target is reached.
//!
//! Every motion-blocking operation returns the duration in milliseconds
//! that the controller will spend on it, so the orchestrator can advance
//! its time estimate.

use ebb_proto::ServoChannel;
use tracing::debug;

use crate::config::{Options, Params};
use crate::error::HostError;
use crate::gateway::EbbGateway;

/// Physical and virtual pen state.
#[derive(Debug, Clone, Default)]
pub struct PenStatus {
    /// Physical state; `None` until first commanded.
    pub pen_up: Option<bool>,
    /// State tracked during resume replay, without servo commands.
    pub virtual_pen_up: bool,
    /// Count of physical lower-to-raise cycles.
    pub lifts: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Pen {
    pub status: PenStatus,
    temp_height: Option<u32>,
}

impl Pen {
    pub fn new() -> Self {
        Self::default()
    }

    /// The active pen-down height percentage, honoring a layer override.
    fn pen_pos_down(&self, options: &Options) -> u32 {
        self.temp_height.unwrap_or(options.pen_pos_down)
    }

    fn servo_units(params: &Params, percent: u32) -> u32 {
        let span = params.servo_range_max.saturating_sub(params.servo_range_min);
        params.servo_range_min + span * percent.min(100) / 100
    }

    /// Duration of a vertical pen transit, ms.
    fn transit_ms(&self, options: &Options, params: &Params, raising: bool) -> u32 {
        let dist = options.pen_pos_up.abs_diff(self.pen_pos_down(options));
        let sweep = dist * params.servo_sweep_ms / 100;
        let extra = if raising {
            options.pen_delay_up
        } else {
            options.pen_delay_down
        };
        (sweep as i64 + i64::from(extra)).max(0) as u32
    }

    /// Raise the pen. Returns the blocking duration in ms; 0 when the
    /// pen is already up or when resume replay suppresses the command.
    pub fn raise(
        &mut self,
        options: &Options,
        params: &Params,
        gateway: Option<&mut EbbGateway>,
        resume_mode: bool,
    ) -> Result<u32, HostError> {
        self.status.virtual_pen_up = true;
        if resume_mode {
            return Ok(0);
        }
        if self.status.pen_up == Some(true) {
            return Ok(0);
        }
        let duration = self.transit_ms(options, params, true);
        if let Some(gw) = gateway {
            gw.set_pen(true, duration)?;
        }
        if self.status.pen_up == Some(false) {
            self.status.lifts += 1;
        }
        self.status.pen_up = Some(true);
        debug!(duration, "pen raised");
        Ok(duration)
    }

    /// Lower the pen. Same contract as [`Pen::raise`].
    pub fn lower(
        &mut self,
        options: &Options,
        params: &Params,
        gateway: Option<&mut EbbGateway>,
        resume_mode: bool,
    ) -> Result<u32, HostError> {
        self.status.virtual_pen_up = false;
        if resume_mode {
            return Ok(0);
        }
        if self.status.pen_up == Some(false) {
            return Ok(0);
        }
        let duration = self.transit_ms(options, params, false);
        if let Some(gw) = gateway {
            gw.set_pen(false, duration)?;
        }
        self.status.pen_up = Some(false);
        debug!(duration, "pen lowered");
        Ok(duration)
    }

    /// Flip the pen state (setup command).
    pub fn toggle(
        &mut self,
        options: &Options,
        params: &Params,
        gateway: Option<&mut EbbGateway>,
    ) -> Result<u32, HostError> {
        if self.status.pen_up == Some(true) {
            self.lower(options, params, gateway, false)
        } else {
            self.raise(options, params, gateway, false)
        }
    }

    /// Lower and then raise the pen once (setup command).
    pub fn cycle(
        &mut self,
        options: &Options,
        params: &Params,
        mut gateway: Option<&mut EbbGateway>,
    ) -> Result<u32, HostError> {
        let down = self.lower(options, params, gateway.as_deref_mut(), false)?;
        let up = self.raise(options, params, gateway, false)?;
        Ok(down + up)
    }

    /// Push the servo configuration (positions and sweep rates) to the
    /// controller. Must run before the first pen command and after any
    /// height change.
    pub fn servo_setup(
        &mut self,
        options: &Options,
        params: &Params,
        gateway: Option<&mut EbbGateway>,
    ) -> Result<(), HostError> {
        let Some(gw) = gateway else { return Ok(()) };
        gw.servo_config(
            ServoChannel::PositionUp,
            Self::servo_units(params, options.pen_pos_up),
        )?;
        gw.servo_config(
            ServoChannel::PositionDown,
            Self::servo_units(params, self.pen_pos_down(options)),
        )?;
        gw.servo_config(ServoChannel::RateRaise, params.servo_rate_raise)?;
        gw.servo_config(ServoChannel::RateLower, params.servo_rate_lower)?;
        Ok(())
    }

    /// Apply a temporary per-layer pen-down height. Takes effect at the
    /// next lower.
    pub fn set_temp_height(
        &mut self,
        params: &Params,
        height: u32,
        gateway: Option<&mut EbbGateway>,
    ) -> Result<(), HostError> {
        self.temp_height = Some(height.min(100));
        if let Some(gw) = gateway {
            gw.servo_config(ServoChannel::PositionDown, Self::servo_units(params, height))?;
        }
        Ok(())
    }

    /// Clear a temporary height override, restoring the configured
    /// pen-down position.
    pub fn end_temp_height(
        &mut self,
        options: &Options,
        params: &Params,
        gateway: Option<&mut EbbGateway>,
    ) -> Result<(), HostError> {
        if self.temp_height.take().is_none() {
            return Ok(());
        }
        if let Some(gw) = gateway {
            gw.servo_config(
                ServoChannel::PositionDown,
                Self::servo_units(params, options.pen_pos_down),
            )?;
        }
        Ok(())
    }

    pub fn has_temp_height(&self) -> bool {
        self.temp_height.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixtures() -> (Options, Params) {
        (Options::default(), Params::default())
    }

    #[test]
    fn raise_is_idempotent() {
        let (options, params) = fixtures();
        let mut pen = Pen::new();
        let first = pen.raise(&options, &params, None, false).unwrap();
        assert!(first > 0);
        let second = pen.raise(&options, &params, None, false).unwrap();
        assert_eq!(second, 0);
        assert_eq!(pen.status.pen_up, Some(true));
    }

    #[test]
    fn lifts_count_lower_to_raise_transitions() {
        let (options, params) = fixtures();
        let mut pen = Pen::new();
        pen.raise(&options, &params, None, false).unwrap();
        assert_eq!(pen.status.lifts, 0, "initial raise is not a lift cycle");
        pen.lower(&options, &params, None, false).unwrap();
        pen.raise(&options, &params, None, false).unwrap();
        pen.lower(&options, &params, None, false).unwrap();
        pen.raise(&options, &params, None, false).unwrap();
        assert_eq!(pen.status.lifts, 2);
    }

    #[test]
    fn resume_mode_tracks_only_the_virtual_pen() {
        let (options, params) = fixtures();
        let mut pen = Pen::new();
        let duration = pen.lower(&options, &params, None, true).unwrap();
        assert_eq!(duration, 0);
        assert!(!pen.status.virtual_pen_up);
        assert_eq!(pen.status.pen_up, None, "physical pen never commanded");
    }

    #[test]
    fn temp_height_changes_transit_distance() {
        let (mut options, params) = fixtures();
        options.pen_pos_up = 60;
        options.pen_pos_down = 30;
        let mut pen = Pen::new();
        let normal = pen.transit_ms(&options, &params, false);
        pen.set_temp_height(&params, 55, None).unwrap();
        let shallow = pen.transit_ms(&options, &params, false);
        assert!(shallow < normal);
        pen.end_temp_height(&options, &params, None).unwrap();
        assert_eq!(pen.transit_ms(&options, &params, false), normal);
    }

    #[test]
    fn cycle_runs_a_full_lower_raise_pair() {
        let (options, params) = fixtures();
        let mut pen = Pen::new();
        let duration = pen.cycle(&options, &params, None).unwrap();
        assert!(duration > 0);
        assert_eq!(pen.status.pen_up, Some(true));
        assert_eq!(pen.status.lifts, 1);
    }
}
