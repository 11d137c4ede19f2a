//! Timed linear ramps of the voltage or current setpoint.

use crate::constants::{DEFAULT_SLEW_SECS, DEFAULT_SLEW_STEPS};
use crate::error::{KoradError, Result};
use crate::protocol::Korad;
use crate::types::Parameter;
use log::{debug, warn};
use std::io::{Read, Write};
use std::time::Duration;

/// One ramp: `step_count` equal increments from `start` to `end` over `duration`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlewPlan {
    pub parameter: Parameter,
    pub start: f64,
    pub end: f64,
    pub step_count: u32,
    pub duration: Duration,
}

impl SlewPlan {
    pub fn new(
        parameter: Parameter,
        start: f64,
        end: f64,
        step_count: u32,
        duration_secs: f64,
    ) -> Result<Self> {
        if step_count == 0 {
            return Err(KoradError::InvalidParameter(
                "slew needs at least one step".to_string(),
            ));
        }
        if !start.is_finite() || !end.is_finite() {
            return Err(KoradError::InvalidParameter(format!(
                "slew endpoints must be finite, got {} -> {}",
                start, end
            )));
        }
        let duration = Duration::try_from_secs_f64(duration_secs).map_err(|_| {
            KoradError::InvalidParameter(format!(
                "slew duration must be a non-negative number of seconds, got {}",
                duration_secs
            ))
        })?;
        Ok(Self {
            parameter,
            start,
            end,
            step_count,
            duration,
        })
    }

    /// Change applied at each step
    pub fn increment(&self) -> f64 {
        (self.end - self.start) / f64::from(self.step_count)
    }

    /// Wait after each step
    pub fn step_interval(&self) -> Duration {
        self.duration / self.step_count
    }

    /// Values sent at each step, before the final corrective write of `end`.
    ///
    /// The running sum stays unrounded; only the transmitted value is rounded.
    pub fn steps(&self) -> impl Iterator<Item = f64> {
        let increment = self.increment();
        let mut value = self.start;
        (0..self.step_count).map(move |_| {
            value += increment;
            round_half_up(value, 3)
        })
    }
}

/// Round to `decimals` places, halves away from negative infinity
pub fn round_half_up(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale + 0.5).floor() / scale
}

impl<P: Read + Write> Korad<P> {
    /// Ramp `parameter` from its current setpoint to `target`.
    ///
    /// Sends `step_count` intermediate setpoints `duration_secs / step_count`
    /// apart, then `target` itself. If reading the start value or any write
    /// fails, the output is switched off before the error is returned.
    pub fn slew(
        &mut self,
        parameter: Parameter,
        target: f64,
        step_count: u32,
        duration_secs: f64,
    ) -> Result<SlewPlan> {
        let start = match self.read_snapshot() {
            Ok(snapshot) => snapshot.setting(parameter),
            Err(e) => return Err(self.abort_slew(e)),
        };
        let plan = SlewPlan::new(parameter, start, target, step_count, duration_secs)?;

        debug!(
            "Slewing {} {:.3} -> {:.3} in {} steps of {:?}",
            parameter,
            plan.start,
            plan.end,
            plan.step_count,
            plan.step_interval()
        );

        if let Err(e) = self.run_slew(&plan) {
            return Err(self.abort_slew(e));
        }
        Ok(plan)
    }

    /// Switch the output off after a failed ramp, handing back the cause
    fn abort_slew(&mut self, cause: KoradError) -> KoradError {
        if let Err(e) = self.disable() {
            warn!("Could not disable output after failed slew: {}", e);
        }
        cause
    }

    /// [`slew`](Self::slew) the voltage with the default 20 steps over 5 s
    pub fn slew_voltage(&mut self, target: f64) -> Result<SlewPlan> {
        self.slew(Parameter::Voltage, target, DEFAULT_SLEW_STEPS, DEFAULT_SLEW_SECS)
    }

    /// [`slew`](Self::slew) the current with the default 20 steps over 5 s
    pub fn slew_current(&mut self, target: f64) -> Result<SlewPlan> {
        self.slew(Parameter::Current, target, DEFAULT_SLEW_STEPS, DEFAULT_SLEW_SECS)
    }

    fn run_slew(&mut self, plan: &SlewPlan) -> Result<()> {
        let interval = plan.step_interval();
        for value in plan.steps() {
            self.set_parameter(plan.parameter, value)?;
            self.clock.sleep(interval);
        }
        self.set_parameter(plan.parameter, plan.end)
    }

    fn set_parameter(&mut self, parameter: Parameter, value: f64) -> Result<()> {
        match parameter {
            Parameter::Voltage => self.set_voltage(value),
            Parameter::Current => self.set_current(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::error::ProtocolError;
    use crate::mock_serial::PanelState;
    use crate::protocol::tests::scripted;

    #[test]
    fn test_plan_derived_fields() {
        let plan = SlewPlan::new(Parameter::Voltage, 3.0, 5.0, 20, 5.0).unwrap();
        assert!((plan.increment() - 0.1).abs() < 1e-12);
        assert_eq!(plan.step_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_plan_rejects_bad_input() {
        assert!(matches!(
            SlewPlan::new(Parameter::Voltage, 3.0, 5.0, 0, 5.0),
            Err(KoradError::InvalidParameter(_))
        ));
        assert!(matches!(
            SlewPlan::new(Parameter::Current, 0.0, 1.0, 5, -1.0),
            Err(KoradError::InvalidParameter(_))
        ));
        assert!(matches!(
            SlewPlan::new(Parameter::Current, 0.0, f64::NAN, 5, 1.0),
            Err(KoradError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_zero_duration_has_zero_interval() {
        let plan = SlewPlan::new(Parameter::Current, 0.5, 1.5, 4, 0.0).unwrap();
        assert_eq!(plan.step_interval(), Duration::ZERO);
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(2.0625, 3), 2.063);
        assert_eq!(round_half_up(1.2344, 3), 1.234);
        assert_eq!(round_half_up(4.0, 3), 4.0);
    }

    #[test]
    fn test_steps_do_not_feed_rounding_back() {
        let plan = SlewPlan::new(Parameter::Voltage, 0.0, 1.0, 3, 0.0).unwrap();
        let steps: Vec<f64> = plan.steps().collect();
        assert_eq!(steps, vec![0.333, 0.667, 1.0]);
    }

    #[test]
    fn test_slew_step_counts_and_final_correction() {
        for count in [1u32, 5, 20] {
            let (mut korad, _, clock) = scripted(PanelState {
                vset: 3.0,
                ..PanelState::default()
            });
            let plan = korad.slew(Parameter::Voltage, 5.0, count, 2.0).unwrap();
            assert_eq!(plan.start, 3.0);

            let commands = korad.port_mut().commands();
            assert_eq!(commands.len(), count as usize + 1, "count {}", count);
            assert!(commands.iter().all(|c| c.starts_with("VSET1:")));
            assert_eq!(commands.last().unwrap(), "VSET1:5.00");
            assert_eq!(clock.now(), Duration::from_secs(2));
        }
    }

    #[test]
    fn test_slew_current_reads_start_from_current_setting() {
        let (mut korad, _, _) = scripted(PanelState {
            iset: 1.0,
            ..PanelState::default()
        });
        korad.slew(Parameter::Current, 2.0, 5, 0.0).unwrap();
        assert_eq!(
            korad.port_mut().commands(),
            vec!["ISET1:1.20", "ISET1:1.40", "ISET1:1.60", "ISET1:1.80", "ISET1:2.00", "ISET1:2.00"]
        );
    }

    #[test]
    fn test_silent_device_disables_output() {
        let (mut korad, _, _) = scripted(PanelState::default());
        korad.port_mut().respond_with(|_| None);
        let result = korad.slew(Parameter::Voltage, 5.0, 5, 0.0);
        assert!(matches!(
            result,
            Err(KoradError::Protocol(ProtocolError::NoResponse { command: "STATUS?" }))
        ));
        assert_eq!(korad.port_mut().commands(), vec!["OUT0"]);
    }

    #[test]
    fn test_failed_step_write_disables_output() {
        let (mut korad, _, _) = scripted(PanelState::default());
        korad.port_mut().fail_writes_starting_with("VSET1:");
        let result = korad.slew(Parameter::Voltage, 5.0, 5, 0.0);
        assert!(matches!(result, Err(KoradError::Io(_))));
        assert_eq!(korad.port_mut().commands(), vec!["OUT0"]);
    }

    #[test]
    fn test_slew_invalid_steps_sends_nothing() {
        let (mut korad, _, _) = scripted(PanelState::default());
        assert!(korad.slew(Parameter::Voltage, 5.0, 0, 1.0).is_err());
        assert!(korad.port_mut().commands().is_empty());
    }
}
