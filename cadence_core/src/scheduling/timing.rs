use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use spin_sleep::SpinSleeper;
use std::time::{Duration, Instant};

/// Anchored period timer for periodic loops.
///
/// Sleeps until the next anchor so that time spent in the cycle is deducted
/// from the sleep. An overrun re-anchors on the current time instead of
/// trying to catch up with a burst of cycles.
pub struct CycleTimer {
    period: Duration,
    next_tick: Instant,
    sleeper: SpinSleeper,
}

impl CycleTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_tick: Instant::now() + period,
            sleeper: SpinSleeper::default(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Restart the schedule one period from now
    pub fn reset(&mut self) {
        self.next_tick = Instant::now() + self.period;
    }

    /// Sleep until the next anchor. Returns true if the anchor had already passed.
    pub fn wait(&mut self) -> bool {
        let now = Instant::now();
        if self.next_tick > now {
            self.sleeper.sleep(self.next_tick - now);
            self.next_tick += self.period;
            false
        } else {
            log::debug!(
                "Cycle overrun: {:?} late for a period of {:?}",
                now.duration_since(self.next_tick),
                self.period
            );
            self.next_tick = now + self.period;
            true
        }
    }
}

/// Wake-up flag for loops that sleep until something happens
#[derive(Default)]
pub struct Wakeup {
    pending: Mutex<bool>,
    ready: Condvar,
}

impl Wakeup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        let mut pending = self.pending.lock();
        *pending = true;
        self.ready.notify_one();
    }

    /// Wait for a notification, consuming it. Returns false on timeout.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut pending = self.pending.lock();
        match timeout {
            None => {
                while !*pending {
                    self.ready.wait(&mut pending);
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !*pending {
                    if self.ready.wait_until(&mut pending, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        std::mem::replace(&mut *pending, false)
    }
}

/// Execution statistics of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TaskStats {
    /// Completed cycles
    pub cycles: u64,
    /// Periodic cycles that missed their anchor
    pub overruns: u64,
    /// Queued commands executed from the task mailbox
    pub commands_executed: u64,
    /// Queued event handlers executed
    pub events_executed: u64,
    pub last_compute: Duration,
    pub avg_compute: Duration,
    pub max_compute: Duration,
    /// Time between the starts of the last two cycles
    pub last_period: Duration,
}

impl TaskStats {
    pub(crate) fn record_cycle(&mut self, compute: Duration, period: Option<Duration>) {
        self.cycles += 1;
        self.last_compute = compute;
        self.max_compute = self.max_compute.max(compute);
        // Running mean in nanoseconds; u128 keeps long runs exact.
        let n = self.cycles as u128;
        let avg = self.avg_compute.as_nanos();
        let next = (avg * (n - 1) + compute.as_nanos()) / n;
        self.avg_compute = Duration::from_nanos(next.min(u64::MAX as u128) as u64);
        if let Some(period) = period {
            self.last_period = period;
        }
    }
}
