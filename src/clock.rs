//! Time source and cooperative cancellation.
//!
//! Every blocking wait in the crate goes through a [`Clock`], so the slew,
//! charge and sampling loops can be driven by a manual clock in tests. Cancellation is a shared flag that the loops
//! check between a sleep and the next action, never mid-sleep.

use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Source of monotonic time, wall-clock time and blocking sleeps.
pub trait Clock {
    /// Monotonic time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    /// Current wall-clock time.
    fn wall(&self) -> DateTime<Local>;

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// The real clock: `Instant` for monotonic time, `thread::sleep` for waits.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn wall(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Operator abort flag shared between a signal handler and a running loop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the running operation stop at its next loop boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Test clock: time only moves when someone sleeps or calls `advance`.
#[cfg(test)]
#[derive(Debug, Clone)]
pub(crate) struct ManualClock {
    elapsed: Arc<std::sync::Mutex<Duration>>,
    base: DateTime<Local>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new() -> Self {
        use chrono::TimeZone;
        Self {
            elapsed: Arc::new(std::sync::Mutex::new(Duration::ZERO)),
            base: Local.with_ymd_and_hms(2022, 2, 14, 9, 30, 0).unwrap(),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.elapsed.lock().unwrap() += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }

    fn wall(&self) -> DateTime<Local> {
        self.base + chrono::Duration::from_std(self.now()).unwrap()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
