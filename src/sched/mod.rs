//! Drift-compensated polling cadence.
//!
//! The scheduler runs a poll action once per configured interval and
//! corrects for the time the action itself takes. It keeps an
//! intended-start baseline that advances by exactly one interval per
//! cycle; when a cycle finishes with less than a quarter interval to
//! spare, the cycle has fallen behind schedule and the scheduler either
//! resets the baseline to "now + interval" (unbounded runs, or after the
//! process was suspended) or pauses for half an interval once to pull the
//! cadence back (bounded runs). Sleeps tolerate signal interruption by
//! re-measuring and re-issuing shorter sleeps instead of returning early.

mod signal;

pub use signal::{install_resume_handler, resume_flag};

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// How a blocking sleep ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    Completed,
    Interrupted,
}

/// Clock and sleep primitive behind the scheduler.
///
/// `monotonic` is time since an arbitrary origin and never goes backwards;
/// `wall` is epoch seconds for sample timestamps.
pub trait Clock {
    fn monotonic(&self) -> Duration;
    fn wall(&self) -> f64;
    fn sleep(&self, duration: Duration) -> SleepOutcome;
}

/// System clock: `Instant` for cadence, `nanosleep` for interruptible
/// sleeps (std's sleep retries on EINTR internally, which would hide the
/// interruption from the scheduler).
pub struct SysClock {
    origin: Instant,
}

impl SysClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SysClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SysClock {
    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }

    fn wall(&self) -> f64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs_f64(),
            Err(_) => 0.0,
        }
    }

    fn sleep(&self, duration: Duration) -> SleepOutcome {
        let request = libc::timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };
        let rc = unsafe { libc::nanosleep(&request, std::ptr::null_mut()) };
        if rc == 0 {
            SleepOutcome::Completed
        } else {
            SleepOutcome::Interrupted
        }
    }
}

/// Returned by the poll action to continue or end the loop early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleControl {
    Continue,
    Stop,
}

/// Residual waits below this are not worth another sleep syscall.
const SLEEP_RESIDUE: Duration = Duration::from_micros(100);

/// Fixed-cadence driver for the poll loop.
pub struct Scheduler<C: Clock> {
    clock: C,
    interval: Duration,
    /// `None` runs forever.
    cycles: Option<u64>,
    resume: &'static AtomicBool,
    /// The process was observed to have been suspended at least once.
    was_suspended: bool,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(clock: C, interval: Duration, cycles: Option<u64>) -> Self {
        Self::with_resume_flag(clock, interval, cycles, resume_flag())
    }

    /// Like [`Scheduler::new`] with an explicit resume flag, so cadence
    /// decisions can be exercised without delivering signals.
    pub fn with_resume_flag(
        clock: C,
        interval: Duration,
        cycles: Option<u64>,
        resume: &'static AtomicBool,
    ) -> Self {
        Self {
            clock,
            interval,
            cycles,
            resume,
            was_suspended: false,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Runs `poll` once per interval until the cycle count is exhausted,
    /// the action asks to stop, or it fails.
    ///
    /// The action receives the zero-based cycle number. A cycle, once
    /// started, runs to completion including its sleep; there is no
    /// mid-cycle cancellation.
    pub fn run<E>(
        &mut self,
        mut poll: impl FnMut(u64) -> Result<CycleControl, E>,
    ) -> Result<(), E> {
        let mut intended = self.clock.monotonic();
        let mut cycle: u64 = 0;
        loop {
            if poll(cycle)? == CycleControl::Stop {
                return Ok(());
            }
            cycle += 1;
            if let Some(max) = self.cycles
                && cycle >= max
            {
                return Ok(());
            }

            let now = self.clock.monotonic();
            intended += self.interval;
            let remaining = intended.checked_sub(now);
            let behind = match remaining {
                None => true,
                Some(r) => r < self.interval / 4,
            };
            if self.resume.swap(false, Ordering::Relaxed) {
                self.was_suspended = true;
            }

            let pause = if behind {
                if self.cycles.is_none() || self.was_suspended {
                    // Abandon the old cadence rather than fire a burst of
                    // back-to-back polls.
                    tracing::debug!("behind schedule, resetting cadence baseline");
                    intended = now + self.interval;
                    self.interval
                } else {
                    // Bounded run that was never suspended: pause for half
                    // an interval once to pull back toward the cadence.
                    tracing::debug!("behind schedule, pausing half an interval");
                    self.interval / 2
                }
            } else {
                remaining.unwrap_or_default()
            };
            self.sleep_for(pause);
        }
    }

    /// Sleeps for `pause`, re-measuring and re-issuing shorter sleeps when
    /// a signal interrupts the wait.
    fn sleep_for(&self, pause: Duration) {
        let target = self.clock.monotonic() + pause;
        let mut remaining = pause;
        loop {
            match self.clock.sleep(remaining) {
                SleepOutcome::Completed => return,
                SleepOutcome::Interrupted => {
                    match target.checked_sub(self.clock.monotonic()) {
                        Some(left) if left > SLEEP_RESIDUE => remaining = left,
                        _ => return,
                    }
                }
            }
        }
    }
}
