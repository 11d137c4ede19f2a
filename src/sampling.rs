//! Fixed-rate snapshot logging with drift correction.

use crate::clock::CancelToken;
use crate::error::{KoradError, Result};
use crate::protocol::Korad;
use crate::sink::{Recorder, SnapshotSink};
use log::{debug, info, warn};
use std::io::{Read, Write};
use std::time::Duration;

/// Absolute-deadline pacing: each tick is one period after the previous
/// tick's deadline, not after the previous wake-up, so sleep overshoot
/// and capture latency do not accumulate.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    period: Duration,
    deadline: Duration,
}

impl Schedule {
    pub fn new(start: Duration, period: Duration) -> Self {
        Self {
            period,
            deadline: start.saturating_add(period),
        }
    }

    /// Deadline the next sleep aims for
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// How long to sleep given the time now, advancing the deadline by one
    /// period either way. `None` means the tick is already late.
    pub fn next_sleep(&mut self, now: Duration) -> Option<Duration> {
        let sleep = self.deadline.checked_sub(now).filter(|d| !d.is_zero());
        self.deadline = self.deadline.saturating_add(self.period);
        sleep
    }
}

/// What a sampling run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingReport {
    pub captures: u32,
    /// Captures that finished past their deadline and got no sleep
    pub saturated: u32,
    pub interrupted: bool,
}

impl<P: Read + Write> Korad<P> {
    /// Capture snapshots at `rate_hz` for `duration_secs`, feeding `sink`.
    ///
    /// Stops early if `cancel` fires. The sink is finished on every exit
    /// path; if a capture fails the output is also switched off before the
    /// error is returned.
    pub fn sample<S: SnapshotSink>(
        &mut self,
        rate_hz: f64,
        duration_secs: f64,
        sink: S,
        cancel: &CancelToken,
    ) -> Result<SamplingReport> {
        if !(rate_hz.is_finite() && rate_hz > 0.0) {
            return Err(KoradError::InvalidParameter(format!(
                "sample rate must be positive, got {}",
                rate_hz
            )));
        }
        let duration = Duration::try_from_secs_f64(duration_secs).map_err(|_| {
            KoradError::InvalidParameter(format!(
                "sampling duration must be a non-negative number of seconds, got {}",
                duration_secs
            ))
        })?;
        let period = Duration::try_from_secs_f64(1.0 / rate_hz).map_err(|_| {
            KoradError::InvalidParameter(format!(
                "sample rate {} Hz gives a period that is out of range",
                rate_hz
            ))
        })?;
        let start = self.clock.now();
        let end = start.checked_add(duration).ok_or_else(|| {
            KoradError::InvalidParameter(format!(
                "sampling duration of {} seconds is out of range",
                duration_secs
            ))
        })?;

        info!("Sampling at {:.2} Hz for {} seconds", rate_hz, duration_secs);

        let mut recorder = Recorder::new(sink);
        let result = self.run_sampling(start, end, period, &mut recorder, cancel);

        if result.is_err() {
            if let Err(e) = self.disable() {
                warn!("Could not disable output after failed sampling: {}", e);
            }
        }
        if let Err(e) = recorder.finish() {
            warn!("Could not close sample log: {}", e);
        }

        let report = result?;
        info!(
            "Done: {} captures ({} late){}",
            report.captures,
            report.saturated,
            if report.interrupted { ", interrupted" } else { "" }
        );
        Ok(report)
    }

    fn run_sampling<S: SnapshotSink>(
        &mut self,
        start: Duration,
        end: Duration,
        period: Duration,
        recorder: &mut Recorder<S>,
        cancel: &CancelToken,
    ) -> Result<SamplingReport> {
        let mut schedule = Schedule::new(start, period);
        let mut report = SamplingReport {
            captures: 0,
            saturated: 0,
            interrupted: false,
        };

        while self.clock.now() < end {
            if cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }

            let snapshot = self.read_snapshot()?;
            recorder.record(&snapshot)?;
            report.captures += 1;

            match schedule.next_sleep(self.clock.now()) {
                Some(sleep) => self.clock.sleep(sleep),
                None => {
                    report.saturated += 1;
                    debug!("Capture {} overran its period", report.captures);
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::error::ProtocolError;
    use crate::mock_serial::{MockSerial, PanelState};
    use crate::protocol::tests::scripted;
    use crate::sink::MemorySink;

    /// Make each capture take `latency` on the manual clock
    fn with_capture_latency(korad: &mut Korad<MockSerial>, clock: &ManualClock, latency: Duration) {
        let clock = clock.clone();
        let mut panel = PanelState::default();
        korad.port_mut().respond_with(move |line| {
            if line == "IOUT1?" {
                clock.advance(latency);
            }
            panel.answer(line)
        });
    }

    fn capture_times(sink: &MemorySink) -> Vec<f64> {
        sink.column("time_epoch")
            .iter()
            .map(|s| s.parse::<f64>().unwrap())
            .collect()
    }

    #[test]
    fn test_schedule_deadlines_advance_by_period() {
        let period = Duration::from_millis(500);
        let mut schedule = Schedule::new(Duration::ZERO, period);
        assert_eq!(schedule.next_sleep(Duration::from_millis(400)), Some(Duration::from_millis(100)));
        assert_eq!(schedule.deadline(), Duration::from_millis(1000));
        // late tick: no sleep, deadline still moves on
        assert_eq!(schedule.next_sleep(Duration::from_millis(1200)), None);
        assert_eq!(schedule.deadline(), Duration::from_millis(1500));
        assert_eq!(schedule.next_sleep(Duration::from_millis(1500)), None);
        assert_eq!(schedule.deadline(), Duration::from_millis(2000));
    }

    #[test]
    fn test_schedule_saturates_instead_of_overflowing() {
        let start = Duration::MAX - Duration::from_secs(1);
        let mut schedule = Schedule::new(start, Duration::from_secs(10));
        assert_eq!(schedule.deadline(), Duration::MAX);
        assert_eq!(schedule.next_sleep(Duration::ZERO), Some(Duration::MAX));
        assert_eq!(schedule.deadline(), Duration::MAX);
    }

    #[test]
    fn test_two_hz_for_one_second_is_two_captures() {
        let (mut korad, _, clock) = scripted(PanelState::default());
        let mut sink = MemorySink::new();
        let report = korad.sample(2.0, 1.0, &mut sink, &CancelToken::new()).unwrap();

        assert_eq!(report.captures, 2);
        assert_eq!(report.saturated, 0);
        assert_eq!(sink.headers_seen, 1);
        assert_eq!(sink.rows.len(), 2);
        assert!(sink.finished);
        assert_eq!(clock.now(), Duration::from_secs(1));
    }

    #[test]
    fn test_capture_jitter_does_not_shift_cadence() {
        for latency_ms in [0u64, 150, 400] {
            let (mut korad, _, clock) = scripted(PanelState::default());
            with_capture_latency(&mut korad, &clock, Duration::from_millis(latency_ms));
            let mut sink = MemorySink::new();
            let report = korad.sample(2.0, 1.0, &mut sink, &CancelToken::new()).unwrap();

            assert_eq!(report.captures, 2, "latency {} ms", latency_ms);
            let times = capture_times(&sink);
            assert!((times[1] - times[0] - 0.5).abs() < 1e-6, "latency {} ms", latency_ms);
        }
    }

    #[test]
    fn test_long_run_has_no_cumulative_drift() {
        let (mut korad, _, clock) = scripted(PanelState::default());
        with_capture_latency(&mut korad, &clock, Duration::from_millis(70));
        let mut sink = MemorySink::new();
        let report = korad.sample(10.0, 59.95, &mut sink, &CancelToken::new()).unwrap();

        assert_eq!(report.captures, 600);
        let times = capture_times(&sink);
        assert!((times[599] - times[0] - 59.9).abs() < 1e-3);
    }

    #[test]
    fn test_saturation_runs_back_to_back_without_error() {
        let (mut korad, _, clock) = scripted(PanelState::default());
        with_capture_latency(&mut korad, &clock, Duration::from_millis(600));
        let report = korad
            .sample(2.0, 1.0, MemorySink::new(), &CancelToken::new())
            .unwrap();
        assert_eq!(report.captures, 2);
        assert_eq!(report.saturated, 2);
    }

    #[test]
    fn test_cancel_stops_at_loop_boundary() {
        let (mut korad, _, _) = scripted(PanelState::default());
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let mut panel = PanelState::default();
        let mut captures = 0;
        korad.port_mut().respond_with(move |line| {
            if line == "STATUS?" {
                captures += 1;
                if captures == 3 {
                    trigger.cancel();
                }
            }
            panel.answer(line)
        });

        let mut sink = MemorySink::new();
        let report = korad.sample(1.0, 300.0, &mut sink, &cancel).unwrap();
        assert!(report.interrupted);
        assert_eq!(report.captures, 3);
        assert!(sink.finished);
        assert!(korad.port_mut().commands().is_empty());
    }

    #[test]
    fn test_unresponsive_device_disables_output() {
        let (mut korad, _, _) = scripted(PanelState::default());
        korad.port_mut().respond_with(|_| None);
        let mut sink = MemorySink::new();
        let result = korad.sample(1.0, 10.0, &mut sink, &CancelToken::new());
        assert!(matches!(
            result,
            Err(KoradError::Protocol(ProtocolError::NoResponse { .. }))
        ));
        assert!(sink.finished);
        assert_eq!(korad.port_mut().commands(), vec!["OUT0"]);
    }

    #[test]
    fn test_rejects_bad_rate_and_duration() {
        let (mut korad, _, _) = scripted(PanelState::default());
        let cancel = CancelToken::new();
        assert!(korad.sample(0.0, 1.0, MemorySink::new(), &cancel).is_err());
        assert!(korad.sample(f64::INFINITY, 1.0, MemorySink::new(), &cancel).is_err());
        assert!(korad.sample(1.0, -1.0, MemorySink::new(), &cancel).is_err());
        // period or run window too long to represent
        for (rate, duration) in [(1e-300, 1.0), (1.0, 1e300), (1.0, f64::MAX)] {
            assert!(
                matches!(
                    korad.sample(rate, duration, MemorySink::new(), &cancel),
                    Err(KoradError::InvalidParameter(_))
                ),
                "accepted rate {} duration {}",
                rate,
                duration
            );
        }
        assert!(korad.port_mut().written_data().is_empty());
    }
}
