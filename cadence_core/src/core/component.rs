use crate::error::CadenceResult;
use crate::params::ComponentParams;
use crate::state::{CycleState, StateTable};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// User code run by a [`Task`](crate::scheduling::Task).
///
/// The task owns the component and calls the hooks on its execution thread;
/// queued commands and event handlers get `&mut` access between cycles, so
/// the component itself needs no locking.
pub trait Component: Send + 'static {
    /// Apply parameters (called once, during create)
    fn configure(&mut self, _params: &ComponentParams) -> CadenceResult<()> {
        Ok(())
    }

    /// Called on the execution thread before the first cycle
    fn startup(&mut self, _ctx: &mut TaskContext<'_>) -> CadenceResult<()> {
        Ok(())
    }

    /// One cycle of work
    fn run(&mut self, ctx: &mut TaskContext<'_>);

    /// Called on the execution thread after the last cycle
    fn cleanup(&mut self, _ctx: &mut TaskContext<'_>) {}
}

/// Per-cycle view of the task handed to the component hooks
pub struct TaskContext<'a> {
    name: &'a str,
    state: &'a mut StateTable,
    kill: &'a AtomicBool,
    period: Option<Duration>,
    cycle: u64,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(
        name: &'a str,
        state: &'a mut StateTable,
        kill: &'a AtomicBool,
        period: Option<Duration>,
        cycle: u64,
    ) -> Self {
        Self {
            name,
            state,
            kill,
            period,
            cycle,
        }
    }

    /// Name of the task
    pub fn name(&self) -> &str {
        self.name
    }

    /// Slot writes of the task's state table; the component is its only writer
    pub fn state(&mut self) -> CycleState<'_> {
        CycleState::new(self.state)
    }

    /// Ticks committed to the state table so far
    pub fn ticks(&self) -> u64 {
        self.state.ticks()
    }

    /// Number of cycles started, counting the current one
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Configured period of a periodic task
    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    pub fn is_kill_requested(&self) -> bool {
        self.kill.load(Ordering::Acquire)
    }

    /// Ask the loop to finish after the current cycle
    pub fn request_kill(&self) {
        self.kill.store(true, Ordering::Release);
    }
}
