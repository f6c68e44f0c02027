// Events, read-shaped commands and rebinding across tasks
use cadence_core::command::{
    CallMode, EventVoid, EventWrite, ExecutionResult, FunctionQualifiedRead, FunctionRead,
    FunctionVoid,
};
use cadence_core::core::{Component, TaskContext, TaskState};
use cadence_core::error::CadenceError;
use cadence_core::interface::{ProvidedInterfaceBuilder, RequiredInterfaceBuilder};
use cadence_core::manager::ComponentManager;
use cadence_core::scheduling::{Task, TaskConfig};
use cadence_core::state::{StateDataId, StateTable};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

struct Robot {
    position: StateDataId<f64>,
    velocity: f64,
}

impl Component for Robot {
    fn run(&mut self, ctx: &mut TaskContext<'_>) {
        *ctx.state().current_mut(self.position).unwrap() += self.velocity;
    }
}

struct Observer {
    received: Arc<Mutex<Vec<i32>>>,
}

impl Component for Observer {
    fn run(&mut self, _ctx: &mut TaskContext<'_>) {}
}

/// Provider with commands, events and a published position
fn robot() -> (Task<Robot>, EventVoid, EventWrite<i32>) {
    let mut table = StateTable::new("robot", 64).unwrap();
    let position = table.add_data("position", 0.0f64).unwrap();
    let reader = table.accessor(position).unwrap();

    let mut prov = ProvidedInterfaceBuilder::<Robot>::new("Robot");
    prov.add_command_write("SetVelocity", |r: &mut Robot, v: &f64| r.velocity = *v)
        .unwrap()
        .add_command_read_state("GetPosition", reader)
        .unwrap()
        .add_command_qualified_read("Scaled", |factor: &f64| factor * 10.0)
        .unwrap();
    let stopped = prov.add_event_void("Stopped").unwrap();
    let counter = prov.add_event_write::<i32>("Counter").unwrap();

    let task = Task::builder(
        "robot",
        Robot {
            position,
            velocity: 0.0,
        },
    )
    .config(TaskConfig::periodic(Duration::from_millis(2)))
    .state_table(table)
    .provided(prov)
    .build()
    .unwrap();
    (task, stopped, counter)
}

#[test]
fn read_state_command_follows_the_table() {
    let (task, _, _) = robot();
    let set_velocity = cadence_core::command::FunctionWrite::<f64>::new("SetVelocity");
    let position = FunctionRead::<f64>::new("GetPosition");
    let scaled = FunctionQualifiedRead::<f64, f64>::new("Scaled");
    let prov = task.provided_interface("Robot").unwrap();
    assert!(set_velocity.slot().bind(prov.command("SetVelocity")));
    assert!(position.slot().bind(prov.command("GetPosition")));
    assert!(scaled.slot().bind(prov.command("Scaled")));

    // Inline reads work before the task runs.
    assert_eq!(position.execute(), Ok(0.0));
    assert_eq!(scaled.execute(&1.5), Ok(15.0));

    task.create().unwrap();
    task.start().unwrap();
    assert_eq!(set_velocity.execute_blocking(&1.0), ExecutionResult::CommandSucceeded);
    assert!(wait_until(Duration::from_secs(2), || position
        .execute()
        .is_ok_and(|p| p >= 5.0)));

    task.kill();
    assert!(task.wait_to_terminate(Some(Duration::from_secs(2))));
}

#[test]
fn wrong_payload_type_is_rejected_without_side_effects() {
    let (task, _, _) = robot();
    let command = task
        .provided_interface("Robot")
        .unwrap()
        .command("SetVelocity")
        .unwrap();
    let wrong = "fast";
    let outcome = command.execute(Some(&wrong as &dyn Any), CallMode::NonBlocking);
    assert_eq!(outcome.result, ExecutionResult::InvalidInputType);
    assert_eq!(task.pending_commands(), 0);
}

#[test]
fn events_reach_queued_and_inline_handlers() {
    let manager = ComponentManager::new();
    let (robot, stopped, counter) = robot();
    manager.add(robot).unwrap();

    let received = Arc::new(Mutex::new(Vec::new()));
    let stops = Arc::new(AtomicU64::new(0));
    let mut req = RequiredInterfaceBuilder::<Observer>::new("Robot");
    req.add_event_handler_write("Counter", |o: &mut Observer, v: &i32| {
        o.received.lock().push(*v)
    })
    .unwrap();
    {
        let stops = stops.clone();
        req.add_event_handler_void_inline("Stopped", move || {
            stops.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }
    let observer = manager
        .add(
            Task::builder(
                "observer",
                Observer {
                    received: received.clone(),
                },
            )
            .config(TaskConfig::from_signal())
            .required(req)
            .build()
            .unwrap(),
        )
        .unwrap();

    manager.connect("observer", "Robot", "robot", "Robot").unwrap();
    assert_eq!(counter.listener_count(), 1);
    assert_eq!(stopped.listener_count(), 1);

    // Inline handlers run on the emitter's thread, even before start.
    assert_eq!(stopped.fire(), ExecutionResult::CommandSucceeded);
    assert_eq!(stops.load(Ordering::SeqCst), 1);

    // Queued handlers wait for the observer's loop.
    assert_eq!(counter.fire(&1), ExecutionResult::CommandSucceeded);
    assert!(received.lock().is_empty());

    manager.create_all().unwrap();
    manager.start_all().unwrap();
    assert_eq!(counter.fire(&2), ExecutionResult::CommandSucceeded);
    assert!(wait_until(Duration::from_secs(2), || received.lock().len() == 2));
    assert_eq!(*received.lock(), vec![1, 2]);
    assert!(observer.stats().events_executed >= 2);

    manager.cleanup(Some(Duration::from_secs(2))).unwrap();
}

#[test]
fn disconnect_allows_reconnect() {
    let manager = ComponentManager::new();
    let (robot, _, counter) = robot();
    manager.add(robot).unwrap();

    let mut req = RequiredInterfaceBuilder::<Observer>::new("Robot");
    let set_velocity = req.add_function_write::<f64>("SetVelocity").unwrap();
    req.add_event_handler_write_inline("Counter", |_: &i32| {}).unwrap();
    manager
        .add(
            Task::builder(
                "observer",
                Observer {
                    received: Arc::default(),
                },
            )
            .required(req)
            .build()
            .unwrap(),
        )
        .unwrap();

    manager.connect("observer", "Robot", "robot", "Robot").unwrap();
    assert!(matches!(
        manager.connect("observer", "Robot", "robot", "Robot"),
        Err(CadenceError::AlreadyConnected { .. })
    ));

    manager.disconnect("observer", "Robot").unwrap();
    assert!(!set_velocity.is_bound());
    assert_eq!(counter.listener_count(), 0);
    assert_eq!(set_velocity.execute(&1.0), ExecutionResult::FunctionNotBound);
    assert!(matches!(
        manager.disconnect("observer", "Robot"),
        Err(CadenceError::NotConnected(_))
    ));

    manager.connect("observer", "Robot", "robot", "Robot").unwrap();
    assert!(set_velocity.is_bound());
    assert_eq!(counter.listener_count(), 1);
}

#[test]
fn shape_mismatch_fails_connect() {
    let manager = ComponentManager::new();
    let (robot, _, _) = robot();
    manager.add(robot).unwrap();

    let mut req = RequiredInterfaceBuilder::<Observer>::new("Robot");
    // Same name, but GetPosition is a read command.
    let wrong = req.add_function_void("GetPosition").unwrap();
    manager
        .add(
            Task::builder(
                "observer",
                Observer {
                    received: Arc::default(),
                },
            )
            .required(req)
            .build()
            .unwrap(),
        )
        .unwrap();

    assert!(matches!(
        manager.connect("observer", "Robot", "robot", "Robot"),
        Err(CadenceError::ConnectFailed { .. })
    ));
    assert!(!wrong.is_bound());
}

/// Calls its own queued command from inside `run`
struct SelfCaller {
    ping: FunctionVoid,
    result: Arc<Mutex<Option<ExecutionResult>>>,
}

impl Component for SelfCaller {
    fn run(&mut self, ctx: &mut TaskContext<'_>) {
        *self.result.lock() = Some(self.ping.execute_blocking());
        ctx.request_kill();
    }
}

#[test]
fn blocking_call_on_own_thread_would_deadlock() {
    let mut prov = ProvidedInterfaceBuilder::<SelfCaller>::new("Prov");
    prov.add_command_void("Ping", |_: &mut SelfCaller| {}).unwrap();
    let result = Arc::new(Mutex::new(None));
    let ping = FunctionVoid::new("Ping");
    let task = Task::builder(
        "loopback",
        SelfCaller {
            ping: ping.clone(),
            result: result.clone(),
        },
    )
    .provided(prov)
    .build()
    .unwrap();
    assert!(ping
        .slot()
        .bind(task.provided_interface("Prov").unwrap().command("Ping")));

    task.create().unwrap();
    task.start().unwrap();
    assert!(task.wait_to_terminate(Some(Duration::from_secs(2))));
    assert_eq!(task.state(), TaskState::Finished);
    assert_eq!(*result.lock(), Some(ExecutionResult::WouldDeadlock));
}
