//! CC/CV battery charging with current-threshold and time-limit termination.
//!
//! A session arms the supply (output off, CV ceiling, CC limit, output on),
//! waits for the regulation loop to settle, then polls a snapshot every
//! `poll_interval_seconds` until the measured current tapers to the
//! end-of-charge threshold or the time cap runs out. Whatever happens, the
//! output is switched off before `charge` returns.

use crate::clock::CancelToken;
use crate::constants::*;
use crate::error::{KoradError, Result};
use crate::protocol::Korad;
use crate::sink::{Recorder, SnapshotSink};
use crate::types::Snapshot;
use log::{debug, info, warn};
use std::io::{Read, Write};
use std::time::Duration;

/// Charge parameters, fixed once charging starts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargePlan {
    /// Battery capacity in Ah
    pub capacity_ah: f64,
    /// Constant-current rate in C
    pub rate_c: f64,
    /// Constant-voltage ceiling in volts
    pub cv_voltage: f64,
    /// End-of-charge current in C
    pub cutoff_c: f64,
    pub max_duration_hours: f64,
    pub poll_interval_seconds: u32,
    /// Abort window between disabling the output and arming
    pub arm_delay_seconds: u32,
}

impl ChargePlan {
    /// Plan for a battery of `capacity_ah` with default rates and limits
    pub fn new(capacity_ah: f64) -> Self {
        Self {
            capacity_ah,
            rate_c: DEFAULT_RATE_C,
            cv_voltage: DEFAULT_CV_VOLTAGE,
            cutoff_c: DEFAULT_CUTOFF_C,
            max_duration_hours: DEFAULT_MAX_HOURS,
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECS,
            arm_delay_seconds: CHARGE_ARM_DELAY_SECS,
        }
    }

    pub fn with_rate(mut self, rate_c: f64) -> Self {
        self.rate_c = rate_c;
        self
    }

    pub fn with_cv_voltage(mut self, volts: f64) -> Self {
        self.cv_voltage = volts;
        self
    }

    pub fn with_cutoff(mut self, cutoff_c: f64) -> Self {
        self.cutoff_c = cutoff_c;
        self
    }

    pub fn with_max_hours(mut self, hours: f64) -> Self {
        self.max_duration_hours = hours;
        self
    }

    pub fn with_poll_interval(mut self, seconds: u32) -> Self {
        self.poll_interval_seconds = seconds;
        self
    }

    pub fn with_arm_delay(mut self, seconds: u32) -> Self {
        self.arm_delay_seconds = seconds;
        self
    }

    /// Current limit during the CC phase
    pub fn cc_current(&self) -> f64 {
        self.capacity_ah * self.rate_c
    }

    /// Measured current at or below which the charge is complete
    pub fn eoc_current(&self) -> f64 {
        self.capacity_ah * self.cutoff_c
    }

    /// Time cap as a `Duration`; fails if the hours do not fit one
    pub fn max_duration(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.max_duration_hours * 3600.0).map_err(|_| {
            KoradError::InvalidPlan(format!(
                "maximum duration of {} h is out of range",
                self.max_duration_hours
            ))
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.poll_interval_seconds))
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("capacity", self.capacity_ah),
            ("rate", self.rate_c),
            ("CV voltage", self.cv_voltage),
            ("cutoff", self.cutoff_c),
            ("maximum duration", self.max_duration_hours),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(KoradError::InvalidPlan(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        self.max_duration()?;
        if self.eoc_current() >= self.cc_current() {
            return Err(KoradError::InvalidPlan(format!(
                "cutoff {} C is not below charge rate {} C",
                self.cutoff_c, self.rate_c
            )));
        }
        Ok(())
    }

    /// Human-readable plan, as logged when a session starts
    pub fn summary(&self) -> String {
        let hours = self.max_duration_hours.trunc();
        let minutes = ((self.max_duration_hours - hours) * 60.0).trunc();
        format!(
            "CC: charge at {:.2} A until {:.2} V; CV: continue until current below {:.3} A or {}h{:02}m elapsed",
            self.cc_current(),
            self.cv_voltage,
            self.eoc_current(),
            hours as u64,
            minutes as u64
        )
    }
}

/// Why a session completed normally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    ThresholdReached,
    TimeExpired,
}

/// Why a session was cut short
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeState {
    Armed,
    Charging,
    Completed(CompletionReason),
    Aborted(AbortReason),
}

impl ChargeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChargeState::Completed(_) | ChargeState::Aborted(_))
    }
}

/// Run state of one `charge` call
#[derive(Debug, Clone)]
pub struct ChargeSession {
    pub plan: ChargePlan,
    pub state: ChargeState,
    /// Monotonic time the output was enabled
    pub started_at: Option<Duration>,
    pub deadline: Option<Duration>,
    pub last_snapshot: Option<Snapshot>,
    pub polls: u32,
}

impl ChargeSession {
    fn new(plan: ChargePlan) -> Self {
        Self {
            plan,
            state: ChargeState::Armed,
            started_at: None,
            deadline: None,
            last_snapshot: None,
            polls: 0,
        }
    }

    fn transition(&mut self, next: ChargeState) {
        debug!("Charge state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Move to `Aborted` if the operator asked to stop
    fn interrupted(&mut self, cancel: &CancelToken) -> bool {
        if cancel.is_cancelled() {
            self.transition(ChargeState::Aborted(AbortReason::Interrupted));
        }
        self.state.is_terminal()
    }
}

/// How a session ended
#[derive(Debug, Clone)]
pub struct ChargeReport {
    /// Terminal state
    pub outcome: ChargeState,
    pub polls: u32,
    /// Time from enabling the output to the last poll
    pub elapsed: Duration,
    pub last_snapshot: Option<Snapshot>,
}

impl<P: Read + Write> Korad<P> {
    /// Charge a battery per `plan`, blocking until a terminal state.
    ///
    /// Every snapshot taken while charging goes to `sink` (header first).
    /// `cancel` is checked between steps. On every exit path, errors
    /// included, the output is disabled and the sink finished; failures
    /// during that cleanup are logged, not returned.
    pub fn charge<S: SnapshotSink>(
        &mut self,
        plan: ChargePlan,
        sink: S,
        cancel: &CancelToken,
    ) -> Result<ChargeReport> {
        plan.validate()?;
        info!("Charge plan: {}", plan.summary());

        let mut session = ChargeSession::new(plan);
        let mut recorder = Recorder::new(sink);
        let result = self.run_charge(&mut session, &mut recorder, cancel);

        if let Err(e) = self.disable() {
            warn!("Could not disable output after charge: {}", e);
        }
        if let Err(e) = recorder.finish() {
            warn!("Could not close charge log: {}", e);
        }
        result?;

        let elapsed = match session.started_at {
            Some(start) => self.clock.now().saturating_sub(start),
            None => Duration::ZERO,
        };
        match session.state {
            ChargeState::Completed(reason) => info!("Charging complete ({:?})", reason),
            state => info!("Charging stopped ({:?})", state),
        }
        Ok(ChargeReport {
            outcome: session.state,
            polls: session.polls,
            elapsed,
            last_snapshot: session.last_snapshot,
        })
    }

    fn run_charge<S: SnapshotSink>(
        &mut self,
        session: &mut ChargeSession,
        recorder: &mut Recorder<S>,
        cancel: &CancelToken,
    ) -> Result<()> {
        let plan = session.plan;
        let max_duration = plan.max_duration()?;

        self.disable()?;
        if session.interrupted(cancel) {
            return Ok(());
        }
        self.clock
            .sleep(Duration::from_secs(u64::from(plan.arm_delay_seconds)));
        if session.interrupted(cancel) {
            return Ok(());
        }

        // The CV ceiling has to be in place before the CC limit.
        self.set_voltage(plan.cv_voltage)?;
        self.set_current(plan.cc_current())?;
        self.enable()?;

        let started_at = self.clock.now();
        let deadline = started_at.checked_add(max_duration).ok_or_else(|| {
            KoradError::InvalidPlan("charge deadline is out of range".to_string())
        })?;
        session.started_at = Some(started_at);
        session.deadline = Some(deadline);

        self.clock.sleep(Duration::from_millis(CHARGE_SETTLE_MS));
        if session.interrupted(cancel) {
            return Ok(());
        }
        session.transition(ChargeState::Charging);

        loop {
            let snapshot = self.read_snapshot()?;
            session.polls += 1;
            info!(
                "    {} {} {:.3} V, {:.3} A",
                snapshot.captured_at.iso.format("%Y-%m-%dT%H:%M:%S"),
                snapshot.mode(),
                snapshot.meas_volts(),
                snapshot.meas_curr()
            );
            recorder.record(&snapshot)?;

            let current = snapshot.meas_curr();
            session.last_snapshot = Some(snapshot);

            if current <= plan.eoc_current() {
                session.transition(ChargeState::Completed(CompletionReason::ThresholdReached));
                return Ok(());
            }
            if self.clock.now() >= deadline {
                session.transition(ChargeState::Completed(CompletionReason::TimeExpired));
                return Ok(());
            }
            if session.interrupted(cancel) {
                return Ok(());
            }
            self.clock.sleep(plan.poll_interval());
            if session.interrupted(cancel) {
                return Ok(());
            }
        }
    }
}
