use super::config::{SchedulingDiscipline, TaskConfig};
use super::realtime;
use super::timing::{CycleTimer, TaskStats, Wakeup};
use crate::command::{EventWrite, ExecutionResult};
use crate::communication::mailbox::{Mailbox, MailboxSender};
use crate::core::{Component, TaskContext, TaskState};
use crate::error::{CadenceError, CadenceResult};
use crate::interface::{
    InterfaceProvided, InterfaceRequired, ProvidedInterfaceBuilder, Requirement,
    RequiredInterfaceBuilder,
};
use crate::state::{StateTable, StateTableView};
use parking_lot::{Condvar, Mutex, ReentrantMutex};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use std::time::{Duration, Instant};

// Upper bound on one idle wait of a suspended loop.
const SUSPEND_POLL: Duration = Duration::from_millis(50);

/// Provided interface every task carries
pub const SYSTEM_INTERFACE: &str = "System";
/// Event of [`SYSTEM_INTERFACE`] fired with the new state on every transition
pub const STATE_CHANGED_EVENT: &str = "StateChanged";

/// State shared between a task handle and its execution thread
struct TaskShared {
    name: String,
    config: TaskConfig,
    state: Mutex<TaskState>,
    changed: Condvar,
    // Held across a transition and its event so listeners see states in order.
    transitions: ReentrantMutex<()>,
    state_changed: EventWrite<TaskState>,
    running_on: Mutex<Option<ThreadId>>,
    started: AtomicBool,
    kill: AtomicBool,
    suspend: AtomicBool,
    wakeup: Arc<Wakeup>,
    stats: Mutex<TaskStats>,
    provided: Vec<Arc<InterfaceProvided>>,
    required: Vec<Arc<InterfaceRequired>>,
    mailbox: MailboxSender,
    view: StateTableView,
}

impl TaskShared {
    fn state(&self) -> TaskState {
        *self.state.lock()
    }

    fn set_state(&self, next: TaskState) {
        let _order = self.transitions.lock();
        if self.replace_state(next) {
            self.state_changed.fire(&next);
        }
    }

    /// Move to `next` only from one of `from`
    fn transition(&self, from: &[TaskState], next: TaskState) -> bool {
        let _order = self.transitions.lock();
        if !from.contains(&self.state()) {
            return false;
        }
        if self.replace_state(next) {
            self.state_changed.fire(&next);
        }
        true
    }

    fn replace_state(&self, next: TaskState) -> bool {
        let mut state = self.state.lock();
        if *state == next {
            return false;
        }
        log::debug!("Task '{}': {} -> {}", self.name, *state, next);
        *state = next;
        self.changed.notify_all();
        true
    }

    fn on_own_thread(&self) -> bool {
        *self.running_on.lock() == Some(std::thread::current().id())
    }

    fn wait_for_state(&self, target: TaskState, timeout: Option<Duration>) -> bool {
        if self.on_own_thread() && self.state() != target {
            log::warn!(
                "Task '{}': waiting for {} from its own thread would deadlock",
                self.name,
                target
            );
            return false;
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            if *state == target {
                return true;
            }
            if *state == TaskState::Finished {
                return false;
            }
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut state, deadline).timed_out() {
                        return *state == target;
                    }
                }
                None => self.changed.wait(&mut state),
            }
        }
    }

    fn unconnected_mandatory(&self) -> Vec<String> {
        self.required
            .iter()
            .filter(|r| r.requirement() == Requirement::Mandatory && !r.is_connected())
            .map(|r| r.name().to_string())
            .collect()
    }
}

/// What the execution thread owns while the task runs
struct TaskBody<C> {
    component: C,
    table: StateTable,
    mailbox: Mailbox,
    events: Vec<Mailbox>,
}

impl<C: Component> TaskBody<C> {
    /// Disable every entry point and fail whatever is still queued
    fn shut_down(&mut self, shared: &TaskShared) {
        for provided in &shared.provided {
            provided.disable_all();
        }
        for required in &shared.required {
            required.disable_handlers();
        }
        let mut abandoned = self.mailbox.close(ExecutionResult::CommandDisabled);
        for events in &mut self.events {
            abandoned += events.close(ExecutionResult::CommandDisabled);
        }
        if abandoned > 0 {
            log::debug!(
                "Task '{}': {} queued call(s) completed as disabled",
                shared.name,
                abandoned
            );
        }
    }

    fn apply_os_scheduling(&self, shared: &TaskShared) {
        if let Some(priority) = shared.config.realtime_priority {
            if let Err(e) = realtime::set_realtime_priority(priority) {
                log::warn!("Task '{}': {}; running best effort", shared.name, e);
            }
        }
        if let Some(core) = shared.config.cpu_affinity {
            if let Err(e) = realtime::pin_to_cpu(core) {
                log::warn!("Task '{}': {}; running unpinned", shared.name, e);
            }
        }
    }

    /// The execution loop. Returns when killed.
    fn run(&mut self, shared: &TaskShared) {
        *shared.running_on.lock() = Some(std::thread::current().id());
        self.mailbox.bind_to_current_thread();
        for events in &self.events {
            events.bind_to_current_thread();
        }
        self.apply_os_scheduling(shared);

        let period = shared.config.period();
        self.table.set_expected_period(period);
        let mut cycle = 0u64;

        let started = {
            let mut ctx =
                TaskContext::new(&shared.name, &mut self.table, &shared.kill, period, cycle);
            self.component.startup(&mut ctx)
        };
        match started {
            Ok(()) => {
                if shared.transition(&[TaskState::Ready], TaskState::Active) {
                    log::info!("Task '{}' active", shared.name);
                }
            }
            Err(e) => {
                log::error!("Task '{}': startup failed: {}", shared.name, e);
                shared.kill.store(true, Ordering::Release);
            }
        }

        let mut timer = period.map(CycleTimer::new);
        let mut last_start: Option<Instant> = None;

        while !shared.kill.load(Ordering::Acquire) {
            if shared.suspend.load(Ordering::Acquire) {
                self.idle_while_suspended(shared);
                if shared.kill.load(Ordering::Acquire) {
                    break;
                }
                if let Some(timer) = timer.as_mut() {
                    timer.reset();
                }
                last_start = None;
            }

            cycle += 1;
            let cycle_start = Instant::now();
            self.table.start_if_automatic();
            let commands = self.mailbox.execute_all(&mut self.component);
            let mut events = 0;
            for mailbox in &mut self.events {
                events += mailbox.execute_all(&mut self.component);
            }
            {
                let mut ctx =
                    TaskContext::new(&shared.name, &mut self.table, &shared.kill, period, cycle);
                self.component.run(&mut ctx);
            }
            self.table.advance_if_automatic();
            let compute = cycle_start.elapsed();

            {
                let mut stats = shared.stats.lock();
                stats.record_cycle(compute, last_start.map(|last| cycle_start - last));
                stats.commands_executed += commands as u64;
                stats.events_executed += events as u64;
            }
            last_start = Some(cycle_start);

            if shared.kill.load(Ordering::Acquire) {
                break;
            }
            match (&shared.config.discipline, timer.as_mut()) {
                (SchedulingDiscipline::Periodic(_), Some(timer)) => {
                    if timer.wait() {
                        shared.stats.lock().overruns += 1;
                    }
                }
                (SchedulingDiscipline::FromSignal { timeout }, _) => {
                    if self.mailbox.is_empty() {
                        shared.wakeup.wait(*timeout);
                    }
                }
                _ => {}
            }
        }

        shared.transition(&[TaskState::Active, TaskState::Ready], TaskState::Finishing);
        {
            let mut ctx =
                TaskContext::new(&shared.name, &mut self.table, &shared.kill, period, cycle);
            self.component.cleanup(&mut ctx);
        }
        self.shut_down(shared);
        shared.set_state(TaskState::Finished);
        *shared.running_on.lock() = None;
        log::info!("Task '{}' finished after {} cycle(s)", shared.name, cycle);
    }

    fn idle_while_suspended(&mut self, shared: &TaskShared) {
        if shared.transition(&[TaskState::Active], TaskState::Ready) {
            log::info!("Task '{}' suspended", shared.name);
        }
        while shared.suspend.load(Ordering::Acquire) && !shared.kill.load(Ordering::Acquire) {
            shared.wakeup.wait(Some(SUSPEND_POLL));
        }
        if !shared.kill.load(Ordering::Acquire)
            && shared.transition(&[TaskState::Ready], TaskState::Active)
        {
            log::info!("Task '{}' resumed", shared.name);
        }
    }
}

/// A component together with its scheduling machinery.
///
/// All lifecycle operations take `&self` and may be called from any thread.
pub struct Task<C: Component> {
    shared: Arc<TaskShared>,
    body: Mutex<Option<TaskBody<C>>>,
    thread: Mutex<Option<JoinHandle<TaskBody<C>>>>,
}

impl<C: Component> Task<C> {
    pub fn builder(name: &str, component: C) -> TaskBuilder<C> {
        TaskBuilder {
            name: name.to_string(),
            component,
            config: TaskConfig::default(),
            table: None,
            provided: Vec::new(),
            required: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> TaskState {
        self.shared.state()
    }

    pub fn config(&self) -> &TaskConfig {
        &self.shared.config
    }

    /// Apply parameters and finalize the state table; CONSTRUCTED -> READY
    pub fn create(&self) -> CadenceResult<()> {
        let mut body = self.body.lock();
        if !self
            .shared
            .transition(&[TaskState::Constructed], TaskState::Initializing)
        {
            return Err(CadenceError::invalid_state(
                &self.shared.name,
                "create",
                self.shared.state(),
            ));
        }
        let Some(body) = body.as_mut() else {
            self.shared.set_state(TaskState::Constructed);
            return Err(CadenceError::Internal(format!(
                "task '{}' has no component",
                self.shared.name
            )));
        };
        if let Err(e) = body.component.configure(&self.shared.config.params) {
            log::error!("Task '{}': configure failed: {}", self.shared.name, e);
            self.shared.set_state(TaskState::Constructed);
            return Err(e);
        }
        body.table.finalize();
        self.shared.set_state(TaskState::Ready);
        log::debug!("Task '{}' created", self.shared.name);
        Ok(())
    }

    /// READY -> ACTIVE.
    ///
    /// The first start spawns the execution thread, or runs the loop on the
    /// calling thread (until killed) for a task configured to capture it.
    /// Starting a suspended task resumes it.
    pub fn start(&self) -> CadenceResult<()> {
        let mut slot = self.body.lock();
        let state = self.shared.state();
        match state {
            TaskState::Active => return Ok(()),
            TaskState::Ready if self.shared.started.load(Ordering::Acquire) => {
                self.shared.suspend.store(false, Ordering::Release);
                self.shared.wakeup.notify();
                return Ok(());
            }
            TaskState::Ready => {}
            _ => {
                return Err(CadenceError::invalid_state(&self.shared.name, "start", state));
            }
        }

        let missing = self.shared.unconnected_mandatory();
        if !missing.is_empty() {
            log::error!(
                "Task '{}' not started, unconnected required interfaces: {}",
                self.shared.name,
                missing.join(", ")
            );
            return Err(CadenceError::UnconnectedInterfaces {
                task: self.shared.name.clone(),
                interfaces: missing,
            });
        }

        let Some(mut body) = slot.take() else {
            return Err(CadenceError::Internal(format!(
                "task '{}' has no component",
                self.shared.name
            )));
        };
        self.shared.started.store(true, Ordering::Release);

        if self.shared.config.capture_thread {
            drop(slot);
            log::info!(
                "Task '{}' capturing thread {:?}",
                self.shared.name,
                std::thread::current().name()
            );
            body.run(&self.shared);
            *self.body.lock() = Some(body);
            return Ok(());
        }

        let shared = self.shared.clone();
        let spawned = std::thread::Builder::new()
            .name(self.shared.name.clone())
            .spawn(move || {
                body.run(&shared);
                body
            });
        match spawned {
            Ok(handle) => {
                *self.thread.lock() = Some(handle);
                Ok(())
            }
            Err(source) => {
                log::error!(
                    "Task '{}': failed to spawn thread: {}",
                    self.shared.name,
                    source
                );
                self.shared.set_state(TaskState::Finished);
                Err(CadenceError::Spawn {
                    task: self.shared.name.clone(),
                    source,
                })
            }
        }
    }

    /// ACTIVE -> READY at the end of the current cycle.
    ///
    /// A task started but not yet ACTIVE suspends before its first cycle.
    pub fn suspend(&self) -> CadenceResult<()> {
        match self.shared.state() {
            TaskState::Active => {
                self.shared.suspend.store(true, Ordering::Release);
                Ok(())
            }
            TaskState::Ready => {
                if self.shared.started.load(Ordering::Acquire) {
                    self.shared.suspend.store(true, Ordering::Release);
                }
                Ok(())
            }
            state => Err(CadenceError::invalid_state(&self.shared.name, "suspend", state)),
        }
    }

    /// Request termination; allowed from any state.
    ///
    /// A running loop finishes its current cycle, runs `cleanup` and then
    /// reaches FINISHED. A task that never started finishes immediately.
    pub fn kill(&self) {
        let mut slot = self.body.lock();

        if !self.shared.started.load(Ordering::Acquire) {
            self.shared.kill.store(true, Ordering::Release);
            if let Some(body) = slot.as_mut() {
                body.shut_down(&self.shared);
            }
            self.shared.set_state(TaskState::Finished);
            log::info!("Task '{}' finished before starting", self.shared.name);
            return;
        }
        drop(slot);

        // FINISHING is published before the loop can observe the flag.
        if self.shared.transition(
            &[TaskState::Active, TaskState::Ready],
            TaskState::Finishing,
        ) {
            log::debug!("Task '{}': kill requested", self.shared.name);
        }
        self.shared.kill.store(true, Ordering::Release);
        self.shared.wakeup.notify();
    }

    /// Wake a from-signal task
    pub fn signal(&self) {
        self.shared.wakeup.notify();
    }

    /// Block until the task reaches `state`; false on timeout or if it finished first.
    ///
    /// Called from the task's own execution thread it returns false at once
    /// unless the state already matches.
    pub fn wait_for_state(&self, state: TaskState, timeout: Option<Duration>) -> bool {
        self.shared.wait_for_state(state, timeout)
    }

    pub fn wait_to_start(&self, timeout: Option<Duration>) -> bool {
        self.wait_for_state(TaskState::Active, timeout)
    }

    /// Wait for FINISHED and join the execution thread
    pub fn wait_to_terminate(&self, timeout: Option<Duration>) -> bool {
        if !self.wait_for_state(TaskState::Finished, timeout) {
            return false;
        }
        self.join();
        true
    }

    fn join(&self) {
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            match handle.join() {
                Ok(body) => *self.body.lock() = Some(body),
                Err(_) => log::error!("Task '{}': execution thread panicked", self.shared.name),
            }
        }
    }

    /// Take the component back after the task finished
    pub fn take_component(&self) -> Option<C> {
        if self.state() != TaskState::Finished {
            return None;
        }
        self.join();
        self.body.lock().take().map(|body| body.component)
    }

    pub fn provided_interface(&self, name: &str) -> Option<Arc<InterfaceProvided>> {
        self.shared.provided.iter().find(|p| p.name() == name).cloned()
    }

    pub fn required_interface(&self, name: &str) -> Option<Arc<InterfaceRequired>> {
        self.shared.required.iter().find(|r| r.name() == name).cloned()
    }

    pub fn provided_interfaces(&self) -> &[Arc<InterfaceProvided>] {
        &self.shared.provided
    }

    pub fn required_interfaces(&self) -> &[Arc<InterfaceRequired>] {
        &self.shared.required
    }

    /// True between a successful start and FINISHED
    pub fn is_running(&self) -> bool {
        self.shared.started.load(Ordering::Acquire) && self.state() != TaskState::Finished
    }

    /// Event fired with the new state on every transition
    pub fn state_changed(&self) -> &EventWrite<TaskState> {
        &self.shared.state_changed
    }

    /// Reader handle of the task's state table
    pub fn state_table(&self) -> StateTableView {
        self.shared.view.clone()
    }

    pub fn stats(&self) -> TaskStats {
        *self.shared.stats.lock()
    }

    /// Commands waiting in the task mailbox
    pub fn pending_commands(&self) -> usize {
        self.shared.mailbox.len()
    }
}

impl<C: Component> Drop for Task<C> {
    fn drop(&mut self) {
        if self.thread.lock().is_some() {
            self.kill();
            self.join();
        }
    }
}

impl<C: Component> fmt::Debug for Task<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .field("discipline", &self.shared.config.discipline)
            .finish()
    }
}

/// Assembles a [`Task`] from a component, its interfaces and its state table
pub struct TaskBuilder<C> {
    name: String,
    component: C,
    config: TaskConfig,
    table: Option<StateTable>,
    provided: Vec<ProvidedInterfaceBuilder<C>>,
    required: Vec<RequiredInterfaceBuilder<C>>,
}

impl<C: Component> TaskBuilder<C> {
    pub fn config(mut self, config: TaskConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a table whose slots were declared up front
    pub fn state_table(mut self, table: StateTable) -> Self {
        self.table = Some(table);
        self
    }

    pub fn provided(mut self, interface: ProvidedInterfaceBuilder<C>) -> Self {
        self.provided.push(interface);
        self
    }

    pub fn required(mut self, interface: RequiredInterfaceBuilder<C>) -> Self {
        self.required.push(interface);
        self
    }

    pub fn build(self) -> CadenceResult<Task<C>> {
        if self.name.is_empty() {
            return Err(CadenceError::config("task name must not be empty"));
        }
        self.config.validate()?;

        let mut seen = HashSet::from([SYSTEM_INTERFACE]);
        for name in self.provided.iter().map(|p| p.name()) {
            if !seen.insert(name) {
                return Err(CadenceError::DuplicateName {
                    kind: "provided interface",
                    name: name.to_string(),
                    owner: self.name.clone(),
                });
            }
        }
        let mut seen = HashSet::new();
        for name in self.required.iter().map(|r| r.name()) {
            if !seen.insert(name) {
                return Err(CadenceError::DuplicateName {
                    kind: "required interface",
                    name: name.to_string(),
                    owner: self.name.clone(),
                });
            }
        }

        let table = match self.table {
            Some(table) => table,
            None => StateTable::new(&self.name, self.config.state_table_size)?,
        };
        let wakeup = Arc::new(Wakeup::new());
        let mailbox = Mailbox::new(self.name.as_str(), self.config.mailbox_size);
        let sender = mailbox.sender();
        if matches!(self.config.discipline, SchedulingDiscipline::FromSignal { .. }) {
            let wakeup = wakeup.clone();
            sender.set_notify(move || wakeup.notify());
        }

        let mut system = ProvidedInterfaceBuilder::<C>::new(SYSTEM_INTERFACE);
        let state_changed = system.add_event_write::<TaskState>(STATE_CHANGED_EVENT)?;
        let provided = self
            .provided
            .into_iter()
            .chain(std::iter::once(system))
            .map(|p| p.build(&self.name, &sender))
            .collect();
        let mut events = Vec::with_capacity(self.required.len());
        let mut required = Vec::with_capacity(self.required.len());
        for interface in self.required {
            let mailbox = Mailbox::new(
                format!("{}.{}.events", self.name, interface.name()),
                self.config.mailbox_size,
            );
            if interface.has_queued_handlers()
                && matches!(self.config.discipline, SchedulingDiscipline::FromSignal { .. })
            {
                let wakeup = wakeup.clone();
                mailbox.sender().set_notify(move || wakeup.notify());
            }
            required.push(interface.build(&self.name, &mailbox.sender()));
            events.push(mailbox);
        }

        let view = table.view();
        log::debug!(
            "Task '{}' built: {} discipline, mailbox {}, state table {}",
            self.name,
            self.config.discipline.as_str(),
            self.config.mailbox_size,
            table.length()
        );
        Ok(Task {
            shared: Arc::new(TaskShared {
                name: self.name,
                config: self.config,
                state: Mutex::new(TaskState::Constructed),
                changed: Condvar::new(),
                transitions: ReentrantMutex::new(()),
                state_changed,
                running_on: Mutex::new(None),
                started: AtomicBool::new(false),
                kill: AtomicBool::new(false),
                suspend: AtomicBool::new(false),
                wakeup,
                stats: Mutex::new(TaskStats::default()),
                provided,
                required,
                mailbox: sender,
                view,
            }),
            body: Mutex::new(Some(TaskBody {
                component: self.component,
                table,
                mailbox,
                events,
            })),
            thread: Mutex::new(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::FunctionWrite;

    #[derive(Default)]
    struct Counter {
        runs: u64,
        total: i64,
    }

    impl Component for Counter {
        fn run(&mut self, _ctx: &mut TaskContext<'_>) {
            self.runs += 1;
        }
    }

    fn counter_task(config: TaskConfig) -> Task<Counter> {
        let mut prov = ProvidedInterfaceBuilder::<Counter>::new("Prov");
        prov.add_command_write("Add", |c: &mut Counter, v: &i64| c.total += *v)
            .unwrap();
        Task::builder("counter", Counter::default())
            .config(config)
            .provided(prov)
            .build()
            .unwrap()
    }

    #[test]
    fn create_is_required_before_start() {
        let task = counter_task(TaskConfig::continuous());
        assert_eq!(task.state(), TaskState::Constructed);
        assert!(matches!(
            task.start(),
            Err(CadenceError::InvalidState { .. })
        ));
        task.create().unwrap();
        assert_eq!(task.state(), TaskState::Ready);
        assert!(task.create().is_err());
        task.kill();
        assert_eq!(task.state(), TaskState::Finished);
    }

    #[test]
    fn continuous_task_runs_until_killed() {
        let task = counter_task(TaskConfig::continuous());
        task.create().unwrap();
        task.start().unwrap();
        assert!(task.wait_to_start(Some(Duration::from_secs(5))));
        std::thread::sleep(Duration::from_millis(20));
        task.kill();
        assert!(task.wait_to_terminate(Some(Duration::from_secs(5))));
        let component = task.take_component().unwrap();
        assert!(component.runs > 0);
        assert_eq!(task.stats().cycles, component.runs);
    }

    #[test]
    fn suspend_and_resume() {
        let task = counter_task(TaskConfig::periodic(Duration::from_millis(2)));
        task.create().unwrap();
        task.start().unwrap();
        assert!(task.wait_to_start(Some(Duration::from_secs(5))));

        task.suspend().unwrap();
        assert!(task.wait_for_state(TaskState::Ready, Some(Duration::from_secs(5))));
        let frozen = task.stats().cycles;
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(task.stats().cycles, frozen);

        task.start().unwrap();
        assert!(task.wait_to_start(Some(Duration::from_secs(5))));
        task.kill();
        assert!(task.wait_to_terminate(Some(Duration::from_secs(5))));
        assert!(task.stats().cycles > frozen);
    }

    #[test]
    fn killed_task_disables_commands() {
        let task = counter_task(TaskConfig::continuous());
        let add = FunctionWrite::<i64>::new("Add");
        assert!(add
            .slot()
            .bind(task.provided_interface("Prov").unwrap().command("Add")));
        task.create().unwrap();
        task.kill();
        assert_eq!(add.execute(&1), ExecutionResult::CommandDisabled);
    }

    #[test]
    fn duplicate_interface_names_are_rejected() {
        let result = Task::builder("dup", Counter::default())
            .provided(ProvidedInterfaceBuilder::new("P"))
            .provided(ProvidedInterfaceBuilder::new("P"))
            .build();
        assert!(matches!(result, Err(CadenceError::DuplicateName { .. })));
    }

    #[test]
    fn mandatory_required_interface_blocks_start() {
        let task = Task::builder("client", Counter::default())
            .required(RequiredInterfaceBuilder::new("Req"))
            .build()
            .unwrap();
        task.create().unwrap();
        assert!(matches!(
            task.start(),
            Err(CadenceError::UnconnectedInterfaces { .. })
        ));
        assert_eq!(task.state(), TaskState::Ready);

        let mut optional = RequiredInterfaceBuilder::new("Req");
        optional.requirement(Requirement::Optional);
        let task = Task::builder("client", Counter::default())
            .required(optional)
            .build()
            .unwrap();
        task.create().unwrap();
        task.start().unwrap();
        task.kill();
        assert!(task.wait_to_terminate(Some(Duration::from_secs(5))));
    }
    #[test]
    fn system_interface_name_is_reserved() {
        let result = Task::builder("sys", Counter::default())
            .provided(ProvidedInterfaceBuilder::new(SYSTEM_INTERFACE))
            .build();
        assert!(matches!(result, Err(CadenceError::DuplicateName { .. })));

        let task = counter_task(TaskConfig::continuous());
        let system = task.provided_interface(SYSTEM_INTERFACE).unwrap();
        assert!(system.event(STATE_CHANGED_EVENT).is_some());
    }

    struct SlowStart;

    impl Component for SlowStart {
        fn startup(&mut self, _ctx: &mut TaskContext<'_>) -> CadenceResult<()> {
            std::thread::sleep(Duration::from_millis(50));
            Ok(())
        }

        fn run(&mut self, _ctx: &mut TaskContext<'_>) {}
    }

    #[test]
    fn suspend_before_first_cycle_is_kept() {
        let task = Task::builder("slow", SlowStart)
            .config(TaskConfig::periodic(Duration::from_millis(1)))
            .build()
            .unwrap();
        task.create().unwrap();
        task.start().unwrap();
        assert_eq!(task.state(), TaskState::Ready);
        task.suspend().unwrap();

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(task.state(), TaskState::Ready);
        assert_eq!(task.stats().cycles, 0);

        task.start().unwrap();
        assert!(task.wait_to_start(Some(Duration::from_secs(5))));
        task.kill();
        assert!(task.wait_to_terminate(Some(Duration::from_secs(5))));
        assert!(task.stats().cycles > 0);
    }

    type WaitOutcome = (bool, bool, Duration);

    /// Waits on its own task from inside `run`
    struct SelfWaiter {
        task: Arc<Mutex<Option<std::sync::Weak<Task<SelfWaiter>>>>>,
        outcome: Arc<Mutex<Option<WaitOutcome>>>,
    }

    impl Component for SelfWaiter {
        fn run(&mut self, ctx: &mut TaskContext<'_>) {
            let task = self.task.lock().as_ref().and_then(|weak| weak.upgrade());
            if let Some(task) = task {
                let begin = Instant::now();
                let finished = task.wait_for_state(TaskState::Finished, None);
                let active = task.wait_for_state(TaskState::Active, Some(Duration::from_secs(1)));
                *self.outcome.lock() = Some((finished, active, begin.elapsed()));
            }
            ctx.request_kill();
        }
    }

    #[test]
    fn waiting_on_own_state_returns_immediately() {
        let handle = Arc::new(Mutex::new(None));
        let outcome = Arc::new(Mutex::new(None));
        let task = Arc::new(
            Task::builder(
                "waiter",
                SelfWaiter {
                    task: handle.clone(),
                    outcome: outcome.clone(),
                },
            )
            .config(TaskConfig::continuous())
            .build()
            .unwrap(),
        );
        *handle.lock() = Some(Arc::downgrade(&task));
        task.create().unwrap();
        task.start().unwrap();
        assert!(task.wait_to_terminate(Some(Duration::from_secs(5))));

        let (finished, active, elapsed) = outcome.lock().take().unwrap();
        assert!(!finished);
        assert!(active);
        assert!(elapsed < Duration::from_millis(500), "{:?}", elapsed);
    }
}
